//! Client side of the stat service.
//!
//! [`StatService`] is the trait the filesystem core consumes; it is
//! implemented by [`StatClient`] over TCP and by [`MockStatService`]
//! for tests, which answers from a configurable handler closure.

use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use monofs_types::{FsError, Result};

use crate::proto::{StatRequest, StatResponse, METHOD_ERROR, METHOD_STAT};
use crate::wire::{read_frame, write_frame, Credentials};

pub trait StatService: Send + Sync {
    fn stat(&self, req: &StatRequest) -> Result<StatResponse>;
}

/// `Arc<T>` delegates to `T` for any stat service.
impl<T: StatService + ?Sized> StatService for Arc<T> {
    fn stat(&self, req: &StatRequest) -> Result<StatResponse> {
        (**self).stat(req)
    }
}

/// TCP client for the stat server. One connection per call; stat
/// traffic is a single request/response pair on an infrequent path.
pub struct StatClient {
    addr: String,
    timeout: Duration,
}

impl StatClient {
    /// Validate credentials and build a client for `addr`.
    pub fn connect(addr: &str, creds: &Credentials) -> Result<Self> {
        match creds {
            Credentials::Insecure => Ok(Self {
                addr: addr.to_string(),
                timeout: Duration::from_secs(5),
            }),
            // TLS credential loading belongs to an external collaborator.
            Credentials::Tls { .. } => Err(FsError::Unsupported("TLS stat transport")),
        }
    }

    fn call(&self, method: u16, payload: &[u8]) -> Result<(u16, Vec<u8>)> {
        let mut stream = TcpStream::connect(&self.addr)
            .map_err(|e| FsError::Rpc(format!("connect {}: {e}", self.addr)))?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        write_frame(&mut stream, method, payload)?;
        read_frame(&mut stream)
    }
}

impl StatService for StatClient {
    fn stat(&self, req: &StatRequest) -> Result<StatResponse> {
        let payload = serde_json::to_vec(req)?;
        let (method, body) = self.call(METHOD_STAT, &payload)?;
        match method {
            METHOD_STAT => Ok(serde_json::from_slice(&body)?),
            METHOD_ERROR => Err(FsError::Rpc(
                String::from_utf8_lossy(&body).into_owned(),
            )),
            other => Err(FsError::Rpc(format!("unexpected response method {other}"))),
        }
    }
}

type StatHandler = Box<dyn Fn(&StatRequest) -> Result<StatResponse> + Send + Sync>;

/// A configurable stat service mock.
///
/// Without a handler it reports a fixed healthy filesystem; tests
/// install a closure to script exact numbers or failures.
pub struct MockStatService {
    handler: Mutex<Option<StatHandler>>,
}

impl MockStatService {
    pub fn new() -> Self {
        Self {
            handler: Mutex::new(None),
        }
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn on_stat(
        &self,
        f: impl Fn(&StatRequest) -> Result<StatResponse> + Send + Sync + 'static,
    ) {
        *self.handler.lock() = Some(Box::new(f));
    }
}

impl Default for MockStatService {
    fn default() -> Self {
        Self::new()
    }
}

impl StatService for MockStatService {
    fn stat(&self, req: &StatRequest) -> Result<StatResponse> {
        let guard = self.handler.lock();
        match guard.as_ref() {
            Some(f) => f(req),
            None => Ok(StatResponse {
                id: req.fs.clone(),
                block_size: 4096,
                blocks: 1 << 20,
                blocks_free: 1 << 20,
                blocks_available: 1 << 20,
            }),
        }
    }
}
