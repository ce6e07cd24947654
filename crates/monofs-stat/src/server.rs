//! The development stat server.
//!
//! Answers `Stat` with the configured capacity and rejects snapshot
//! methods as unimplemented. Production deployments run the real stat
//! backend; this one exists so `--dev` runs and tests have a live
//! endpoint. Serving requires insecure credentials, which only
//! `MONOFS_DEV_RUN` grants (see [`Credentials::resolve`]).

use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};

use monofs_types::{FsError, Result};

use crate::proto::{
    StatRequest, StatResponse, METHOD_CREATE_SNAPSHOT, METHOD_DELETE_SNAPSHOT,
    METHOD_GET_SNAPSHOT, METHOD_LIST_SNAPSHOTS, METHOD_STAT,
};
use crate::wire::{read_frame, write_error, write_frame, Credentials};

#[derive(Debug, Clone)]
pub struct StatServer {
    block_size: u32,
    blocks: u64,
}

impl StatServer {
    pub fn new() -> Self {
        Self {
            block_size: 4096,
            blocks: 1 << 20,
        }
    }

    pub fn with_capacity(block_size: u32, blocks: u64) -> Self {
        Self { block_size, blocks }
    }

    /// Bind `addr` and serve in background threads; returns the bound
    /// address (useful with port 0). The accept loop runs for the life
    /// of the process.
    pub fn start(self, addr: &str, creds: &Credentials) -> Result<SocketAddr> {
        if let Credentials::Tls { .. } = creds {
            // TLS credential loading belongs to an external collaborator.
            return Err(FsError::Unsupported("TLS stat transport"));
        }
        let listener = TcpListener::bind(addr)
            .map_err(|e| FsError::Rpc(format!("bind {addr}: {e}")))?;
        let local = listener.local_addr()?;
        tracing::info!(%local, "stat server listening");
        std::thread::Builder::new()
            .name("monofs-stat-accept".into())
            .spawn(move || {
                for stream in listener.incoming() {
                    match stream {
                        Ok(stream) => {
                            let server = self.clone();
                            let _ = std::thread::Builder::new()
                                .name("monofs-stat-conn".into())
                                .spawn(move || server.handle_conn(stream));
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "stat accept failed");
                        }
                    }
                }
            })?;
        Ok(local)
    }

    fn handle_conn(&self, mut stream: TcpStream) {
        loop {
            let (method, payload) = match read_frame(&mut stream) {
                Ok(frame) => frame,
                // EOF or a broken peer; either way the conversation is over.
                Err(_) => return,
            };
            if let Err(e) = self.dispatch(&mut stream, method, &payload) {
                tracing::warn!(method, error = %e, "stat request failed");
                return;
            }
        }
    }

    fn dispatch(&self, stream: &mut (impl Write + ?Sized), method: u16, payload: &[u8]) -> Result<()> {
        match method {
            METHOD_STAT => {
                let req: StatRequest = serde_json::from_slice(payload)?;
                let rsp = StatResponse {
                    id: req.fs,
                    block_size: self.block_size,
                    blocks: self.blocks,
                    blocks_free: self.blocks,
                    blocks_available: self.blocks,
                };
                write_frame(stream, METHOD_STAT, &serde_json::to_vec(&rsp)?)
            }
            METHOD_CREATE_SNAPSHOT | METHOD_LIST_SNAPSHOTS | METHOD_DELETE_SNAPSHOT
            | METHOD_GET_SNAPSHOT => write_error(stream, "snapshot management is not implemented"),
            other => write_error(stream, &format!("unknown method {other}")),
        }
    }
}

impl Default for StatServer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{StatClient, StatService};
    use crate::proto::METHOD_ERROR;

    fn start_server(blocks: u64) -> SocketAddr {
        StatServer::with_capacity(4096, blocks)
            .start("127.0.0.1:0", &Credentials::Insecure)
            .unwrap()
    }

    #[test]
    fn test_stat_over_loopback() {
        let addr = start_server(123_456);
        let client =
            StatClient::connect(&addr.to_string(), &Credentials::Insecure).unwrap();
        let rsp = client.stat(&StatRequest { fs: "monofs".into() }).unwrap();
        assert_eq!(rsp.id, "monofs");
        assert_eq!(rsp.block_size, 4096);
        assert_eq!(rsp.blocks, 123_456);
        assert_eq!(rsp.blocks_available, 123_456);
    }

    #[test]
    fn test_multiple_requests_one_connection() {
        let addr = start_server(10);
        let mut stream = TcpStream::connect(addr).unwrap();
        for _ in 0..3 {
            let payload = serde_json::to_vec(&StatRequest { fs: "m".into() }).unwrap();
            write_frame(&mut stream, METHOD_STAT, &payload).unwrap();
            let (method, body) = read_frame(&mut stream).unwrap();
            assert_eq!(method, METHOD_STAT);
            let rsp: StatResponse = serde_json::from_slice(&body).unwrap();
            assert_eq!(rsp.blocks, 10);
        }
    }

    #[test]
    fn test_snapshot_methods_report_unimplemented() {
        let addr = start_server(10);
        let mut stream = TcpStream::connect(addr).unwrap();
        write_frame(&mut stream, METHOD_LIST_SNAPSHOTS, b"{\"fs\":\"m\"}").unwrap();
        let (method, body) = read_frame(&mut stream).unwrap();
        assert_eq!(method, METHOD_ERROR);
        assert!(String::from_utf8_lossy(&body).contains("not implemented"));
    }

    #[test]
    fn test_tls_serving_rejected() {
        let server = StatServer::new();
        let creds = Credentials::Tls {
            cert_dir: "/etc/certs".into(),
        };
        assert!(matches!(
            server.start("127.0.0.1:0", &creds),
            Err(FsError::Unsupported(_))
        ));
    }

    #[test]
    fn test_garbage_frame_drops_connection() {
        let addr = start_server(10);
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(&[0u8; 16]).unwrap();
        // The server hangs up instead of answering garbage.
        assert!(read_frame(&mut stream).is_err());
    }
}
