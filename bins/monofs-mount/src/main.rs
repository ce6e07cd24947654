//! monofs host process: parse flags, bootstrap logging, connect (or
//! spawn) the stat service, open the filesystem, and mount it.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use monofs_fs::{Config, Monofs};
use monofs_logging::LogConfig;
use monofs_stat::{Credentials, StatClient, StatServer};
use monofs_types::{FsError, Result};

/// monofs: a log-structured user-space filesystem.
#[derive(Parser, Debug)]
#[command(name = "monofs-mount", version, about)]
struct Args {
    /// Path to the mount point.
    #[arg(long)]
    mount_point: PathBuf,

    /// Path to the metadata store.
    #[arg(long, default_value = "/tmp/monofs")]
    inode_path: PathBuf,

    /// Path to the per-file data stores; defaults to
    /// <inode-path>/localDataPath.
    #[arg(long)]
    local_data_path: Option<PathBuf>,

    /// Mount in read-only mode.
    #[arg(long)]
    read_only: bool,

    /// Address of the stat backend server.
    #[arg(long)]
    stat_address: Option<String>,

    /// Certificate directory for the stat connection.
    #[arg(long)]
    cert_dir: Option<PathBuf>,

    /// Run in development mode: debug logging and a local stat server.
    #[arg(long)]
    dev: bool,

    /// Log kernel adapter traffic.
    #[arg(long)]
    fuse_debug: bool,

    /// Attribute-cache capacity.
    #[arg(long, default_value_t = 100)]
    cache_size: usize,

    /// Shutdown grace period in seconds.
    #[arg(long, default_value_t = 60)]
    shutdown_timeout_secs: u64,

    /// Exported filesystem name, optionally suffixed #<snapshot>.
    #[arg(long, default_value = "monofs#head")]
    filesystem_name: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut log_config = if args.dev {
        LogConfig::development()
    } else {
        LogConfig::default()
    };
    if args.fuse_debug {
        log_config.level = "trace".into();
    }
    let _log_guard = monofs_logging::init_logging(&log_config);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let creds = if args.dev {
        tracing::info!("development mode: using insecure credentials");
        Credentials::Insecure
    } else {
        Credentials::resolve(args.cert_dir.clone())?
    };

    let stat_address = match &args.stat_address {
        Some(addr) if !addr.is_empty() => addr.clone(),
        _ if args.dev => {
            // No backend configured: serve stat locally on a free port.
            let local = StatServer::new().start("127.0.0.1:0", &creds)?;
            tracing::info!(%local, "spawned development stat server");
            local.to_string()
        }
        _ => {
            return Err(FsError::Config(
                "--stat-address is required outside development mode".into(),
            ))
        }
    };

    let stat = StatClient::connect(&stat_address, &creds)?;
    let fs = Arc::new(Monofs::new(
        Config {
            path: args.inode_path.clone(),
            local_data_path: args.local_data_path.clone(),
            filesystem_name: args.filesystem_name.clone(),
            cache_size: args.cache_size,
            read_only: args.read_only,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
            ..Config::default()
        },
        Arc::new(stat),
    )?);

    serve(&args, fs.clone())?;

    fs.close()?;
    tracing::info!("clean shutdown");
    Ok(())
}

#[cfg(all(feature = "fuse", target_os = "linux"))]
fn serve(args: &Args, fs: Arc<Monofs>) -> Result<()> {
    tracing::info!(mount_point = %args.mount_point.display(), "mounting");
    monofs_fuse::MonoFuse::new(fs)
        .mount(&args.mount_point, args.read_only)
        .map_err(FsError::Io)
}

#[cfg(not(all(feature = "fuse", target_os = "linux")))]
fn serve(args: &Args, _fs: Arc<Monofs>) -> Result<()> {
    let _ = &args.mount_point;
    Err(FsError::Config(
        "this build has no kernel adapter; rebuild with --features fuse on Linux".into(),
    ))
}
