//! Synchronous wire framing for the stat protocol.
//!
//! Every frame is `[magic: u32 LE][size: u32 LE]` followed by `size`
//! bytes of body: `[method: u16 LE][json payload]`. The same framing is
//! used in both directions; error responses use [`METHOD_ERROR`] with a
//! plain-text payload.

use std::io::{Read, Write};
use std::path::PathBuf;

use bytes::{BufMut, BytesMut};

use monofs_types::{FsError, Result};

use crate::proto::METHOD_ERROR;

pub const WIRE_MAGIC: u32 = 0x4D4F_4E4F; // "ONOM" on the wire, little-endian
pub const FRAME_HEADER_SIZE: usize = 8;
/// Upper bound on one frame body; stat traffic is tiny.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Transport credentials for the stat connection.
///
/// TLS credential loading is owned by an external collaborator; the
/// variant exists so call sites carry the decision, but serving or
/// dialing with it is rejected until that collaborator lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Insecure,
    Tls { cert_dir: PathBuf },
}

impl Credentials {
    /// Resolve credentials the way the host process does: the
    /// `MONOFS_DEV_RUN` environment variable forces insecure mode and
    /// its content is logged as the reason; otherwise a certificate
    /// directory is mandatory.
    pub fn resolve(cert_dir: Option<PathBuf>) -> Result<Self> {
        if let Ok(reason) = std::env::var("MONOFS_DEV_RUN") {
            if !reason.is_empty() {
                tracing::info!(%reason, "using insecure credentials");
                return Ok(Credentials::Insecure);
            }
        }
        match cert_dir {
            Some(dir) if !dir.as_os_str().is_empty() => Ok(Credentials::Tls { cert_dir: dir }),
            _ => Err(FsError::Config(
                "certificate directory is not set and MONOFS_DEV_RUN is not active".into(),
            )),
        }
    }
}

/// Write one frame.
pub fn write_frame(stream: &mut (impl Write + ?Sized), method: u16, payload: &[u8]) -> Result<()> {
    let body_len = 2 + payload.len();
    if body_len > MAX_FRAME_SIZE {
        return Err(FsError::Rpc(format!("frame of {body_len} bytes is too large")));
    }
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + body_len);
    buf.put_u32_le(WIRE_MAGIC);
    buf.put_u32_le(body_len as u32);
    buf.put_u16_le(method);
    buf.extend_from_slice(payload);
    stream.write_all(&buf)?;
    stream.flush()?;
    Ok(())
}

/// Read one frame, returning `(method, payload)`.
pub fn read_frame(stream: &mut impl Read) -> Result<(u16, Vec<u8>)> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    stream.read_exact(&mut header)?;
    let magic = u32::from_le_bytes(header[..4].try_into().unwrap_or_default());
    if magic != WIRE_MAGIC {
        return Err(FsError::Rpc(format!("bad frame magic {magic:#010x}")));
    }
    let body_len = u32::from_le_bytes(header[4..].try_into().unwrap_or_default()) as usize;
    if !(2..=MAX_FRAME_SIZE).contains(&body_len) {
        return Err(FsError::Rpc(format!("bad frame size {body_len}")));
    }
    let mut body = vec![0u8; body_len];
    stream.read_exact(&mut body)?;
    let method = u16::from_le_bytes([body[0], body[1]]);
    body.drain(..2);
    Ok((method, body))
}

/// Write an error response frame.
pub fn write_error(stream: &mut (impl Write + ?Sized), message: &str) -> Result<()> {
    write_frame(stream, METHOD_ERROR, message.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_frame_roundtrip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, 7, b"{\"fs\":\"x\"}").unwrap();
        let (method, payload) = read_frame(&mut Cursor::new(buf)).unwrap();
        assert_eq!(method, 7);
        assert_eq!(payload, b"{\"fs\":\"x\"}");
    }

    #[test]
    fn test_empty_payload() {
        let mut buf = Vec::new();
        write_frame(&mut buf, 3, b"").unwrap();
        let (method, payload) = read_frame(&mut Cursor::new(buf)).unwrap();
        assert_eq!(method, 3);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut buf = Vec::new();
        write_frame(&mut buf, 1, b"x").unwrap();
        buf[0] ^= 0xFF;
        assert!(matches!(
            read_frame(&mut Cursor::new(buf)),
            Err(FsError::Rpc(_))
        ));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&WIRE_MAGIC.to_le_bytes());
        buf.extend_from_slice(&(MAX_FRAME_SIZE as u32 + 1).to_le_bytes());
        assert!(matches!(
            read_frame(&mut Cursor::new(buf)),
            Err(FsError::Rpc(_))
        ));
    }

    #[test]
    fn test_resolve_credentials() {
        // One test, sequential phases: the variable is process-global.
        std::env::set_var("MONOFS_DEV_RUN", "wire-test");
        assert_eq!(Credentials::resolve(None).unwrap(), Credentials::Insecure);

        std::env::remove_var("MONOFS_DEV_RUN");
        assert!(matches!(Credentials::resolve(None), Err(FsError::Config(_))));
        let creds = Credentials::resolve(Some(PathBuf::from("/etc/monofs/certs"))).unwrap();
        assert!(matches!(creds, Credentials::Tls { .. }));
    }
}
