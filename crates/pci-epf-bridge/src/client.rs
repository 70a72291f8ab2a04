//! The bridge's client side of the wire protocol (SPEC_FULL.md §4.3):
//! connect, version handshake, FD handoff, and the synchronous `HDR`/`BAR`
//! queries plus the fire-and-forget `ACCESS_BAR` forward.

use crate::error::BridgeError;
use epc_host::unix_fd::send_fd;
use epc_protocol::{
    AccessBarRequest, AccessType, BarSizeRequest, BarSubtype, HdrRequest, MessageTag,
    PROTOCOL_VERSION,
};
use std::io::{Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Mutex;

/// A connected link to the EPC server. All requests run under one mutex:
/// the wire protocol is strictly request/response per socket (§4.3, §5),
/// so only one in-flight message is ever valid at a time.
pub struct Link {
    stream: Mutex<UnixStream>,
}

impl Link {
    pub fn connect(path: &Path) -> Result<Self, BridgeError> {
        let stream = UnixStream::connect(path).map_err(|source| BridgeError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            stream: Mutex::new(stream),
        })
    }

    /// Sends `VER` and returns the server's reported protocol version.
    pub fn version(&self) -> Result<u32, BridgeError> {
        let mut stream = self.stream.lock().unwrap();
        send_tag(&mut stream, MessageTag::VER)?;
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Convenience wrapper performing the handshake from §4.2 step 2:
    /// fatal if the server's version does not match ours.
    pub fn handshake(&self) -> Result<(), BridgeError> {
        let got = self.version()?;
        if got != PROTOCOL_VERSION {
            return Err(BridgeError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                got,
            });
        }
        Ok(())
    }

    /// Sends `FD` with `fd` as `SCM_RIGHTS` ancillary data.
    pub fn send_shared_fd(&self, fd: RawFd) -> Result<(), BridgeError> {
        let mut stream = self.stream.lock().unwrap();
        send_tag(&mut stream, MessageTag::FD)?;
        send_fd(stream.as_raw_fd(), fd)?;
        Ok(())
    }

    /// `HDR(offset, size)`: returns `config_space[offset..offset+size]`.
    pub fn hdr(&self, offset: u32, size: u32) -> Result<Vec<u8>, BridgeError> {
        let mut stream = self.stream.lock().unwrap();
        send_tag(&mut stream, MessageTag::HDR)?;
        stream.write_all(&HdrRequest { offset, size }.to_bytes())?;
        let mut buf = vec![0u8; size as usize];
        stream.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// `BAR/MASK`: returns `bar_mask`.
    pub fn bar_mask(&self) -> Result<u8, BridgeError> {
        let mut stream = self.stream.lock().unwrap();
        send_tag(&mut stream, MessageTag::BAR)?;
        stream.write_all(&[BarSubtype::MASK])?;
        let mut buf = [0u8; 1];
        stream.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// `BAR/BAR(bar_no)`: returns `bars[bar_no].size`.
    pub fn bar_size(&self, bar_no: u8) -> Result<u64, BridgeError> {
        let mut stream = self.stream.lock().unwrap();
        send_tag(&mut stream, MessageTag::BAR)?;
        stream.write_all(&[BarSubtype::BAR])?;
        stream.write_all(&BarSizeRequest { bar_no }.to_bytes())?;
        let mut buf = [0u8; 8];
        stream.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Forwards a guest BAR write as `ACCESS_BAR`. Fire-and-forget: no
    /// reply is read. A short write aborts the forward but the caller is
    /// expected to only log it, not tear the device down (§4.2).
    pub fn forward_bar_write(
        &self,
        bar_no: u8,
        offset: u64,
        payload: &[u8],
    ) -> Result<(), BridgeError> {
        let mut stream = self.stream.lock().unwrap();
        send_tag(&mut stream, MessageTag::ACCESS_BAR)?;
        stream.write_all(
            &AccessBarRequest {
                offset,
                size: payload.len() as u64,
                kind: AccessType::WRITE,
                bar_no,
            }
            .to_bytes(),
        )?;
        stream.write_all(payload)?;
        Ok(())
    }
}

fn send_tag(stream: &mut UnixStream, tag: u32) -> Result<(), BridgeError> {
    stream.write_all(&tag.to_le_bytes())?;
    Ok(())
}
