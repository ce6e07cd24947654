use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// A named background thread running a closure at a fixed interval.
///
/// The closure runs once per interval until [`PeriodicTask::stop`] is
/// called or the task is dropped; shutdown interrupts the current sleep
/// rather than waiting out the interval.
pub struct PeriodicTask {
    shared: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn spawn(
        name: &str,
        interval: Duration,
        mut f: impl FnMut() + Send + 'static,
    ) -> Self {
        let shared = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let (stop, cv) = &*thread_shared;
                let mut stopped = stop.lock();
                loop {
                    if *stopped {
                        return;
                    }
                    let _ = cv.wait_for(&mut stopped, interval);
                    if *stopped {
                        return;
                    }
                    drop(stopped);
                    f();
                    stopped = stop.lock();
                }
            })
            .expect("failed to spawn background thread");
        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Signal the thread to exit and wait for it.
    pub fn stop(&mut self) {
        let (stop, cv) = &*self.shared;
        {
            let mut stopped = stop.lock();
            if *stopped {
                return;
            }
            *stopped = true;
        }
        cv.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_runs_periodically() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut task = PeriodicTask::spawn("test-tick", Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(100));
        task.stop();
        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_stop_is_prompt() {
        let mut task =
            PeriodicTask::spawn("test-slow", Duration::from_secs(3600), || {});
        let started = std::time::Instant::now();
        task.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_double_stop() {
        let mut task = PeriodicTask::spawn("test-double", Duration::from_millis(10), || {});
        task.stop();
        task.stop();
    }
}
