//! Wire protocol shared by the EPC target and the EPF bridge.
//!
//! Frames are not length-prefixed: the message *tag* determines the payload
//! shape and the receiver reads exactly the expected number of bytes. All
//! integers are little-endian. This crate only knows how to encode/decode
//! the fixed-shape payloads; the actual `Read`/`Write` over the socket lives
//! in `pci-epc` (server side) and `pci-epf-bridge` (client side).

use std::convert::TryFrom;

/// `0xdeadbeef`, little-endian on the wire.
pub const PROTOCOL_VERSION: u32 = 0xdead_beef;

/// Only the first 256 bytes of the 4096-byte PCI config space are populated,
/// but writes/reads are bounds-checked against the full window.
pub const PCIE_CONFIG_SPACE_SIZE: usize = 4096;

/// Number of BARs a PCI function can expose (BAR0..=BAR5).
pub const BAR_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },
    #[error("unknown message tag: {0}")]
    UnknownTag(u32),
    #[error("unknown BAR subtype: {0}")]
    UnknownBarSubtype(u8),
    #[error("unknown access type: {0}")]
    UnknownAccessType(u8),
    #[error("offset {offset} + size {size} exceeds config space of {PCIE_CONFIG_SPACE_SIZE} bytes")]
    ConfigSpaceOutOfBounds { offset: u32, size: u32 },
    #[error("bar number {0} is out of range (expected 0..=5)")]
    BarNumberOutOfRange(u8),
}

/// Request-side message tags (`u32`, little-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTag {
    /// Protocol version handshake.
    Ver,
    /// Ancillary shared-memfd transfer.
    Fd,
    /// PCI config-space byte range query.
    Hdr,
    /// BAR mask / per-BAR size query.
    Bar,
    /// Fire-and-forget BAR write forwarding.
    AccessBar,
}

impl MessageTag {
    pub const VER: u32 = 0;
    pub const FD: u32 = 1;
    pub const HDR: u32 = 2;
    pub const BAR: u32 = 3;
    pub const ACCESS_BAR: u32 = 4;

    pub fn as_u32(self) -> u32 {
        match self {
            MessageTag::Ver => Self::VER,
            MessageTag::Fd => Self::FD,
            MessageTag::Hdr => Self::HDR,
            MessageTag::Bar => Self::BAR,
            MessageTag::AccessBar => Self::ACCESS_BAR,
        }
    }
}

impl TryFrom<u32> for MessageTag {
    type Error = DecodeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            Self::VER => Ok(MessageTag::Ver),
            Self::FD => Ok(MessageTag::Fd),
            Self::HDR => Ok(MessageTag::Hdr),
            Self::BAR => Ok(MessageTag::Bar),
            Self::ACCESS_BAR => Ok(MessageTag::AccessBar),
            other => Err(DecodeError::UnknownTag(other)),
        }
    }
}

/// `BAR` message subtypes (`u8`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarSubtype {
    /// Reply with `bar_mask`.
    Mask,
    /// Reply with `bars[bar_no].size`.
    Bar,
}

impl BarSubtype {
    pub const MASK: u8 = 1;
    pub const BAR: u8 = 2;
}

impl TryFrom<u8> for BarSubtype {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            Self::MASK => Ok(BarSubtype::Mask),
            Self::BAR => Ok(BarSubtype::Bar),
            other => Err(DecodeError::UnknownBarSubtype(other)),
        }
    }
}

/// `ACCESS_BAR` access kind (`u8`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Read,
    Write,
}

impl AccessType {
    pub const READ: u8 = 0;
    pub const WRITE: u8 = 1;
}

impl TryFrom<u8> for AccessType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            Self::READ => Ok(AccessType::Read),
            Self::WRITE => Ok(AccessType::Write),
            other => Err(DecodeError::UnknownAccessType(other)),
        }
    }
}

fn expect_len(buf: &[u8], expected: usize) -> Result<(), DecodeError> {
    if buf.len() != expected {
        return Err(DecodeError::ShortRead {
            expected,
            got: buf.len(),
        });
    }
    Ok(())
}

/// `HDR` request payload: `{ offset: u32, size: u32 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HdrRequest {
    pub offset: u32,
    pub size: u32,
}

impl HdrRequest {
    pub const WIRE_LEN: usize = 8;

    pub fn to_bytes(self) -> [u8; Self::WIRE_LEN] {
        let mut out = [0u8; Self::WIRE_LEN];
        out[0..4].copy_from_slice(&self.offset.to_le_bytes());
        out[4..8].copy_from_slice(&self.size.to_le_bytes());
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, DecodeError> {
        expect_len(buf, Self::WIRE_LEN)?;
        Ok(Self {
            offset: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            size: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
        })
    }

    /// Validates this request against the (fixed) config-space size.
    pub fn validate(self) -> Result<(), DecodeError> {
        let end = self
            .offset
            .checked_add(self.size)
            .filter(|&end| end as usize <= PCIE_CONFIG_SPACE_SIZE);
        if end.is_none() {
            return Err(DecodeError::ConfigSpaceOutOfBounds {
                offset: self.offset,
                size: self.size,
            });
        }
        Ok(())
    }
}

/// `BAR`/`BAR` request payload: the `bar_no` byte that follows the subtype byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarSizeRequest {
    pub bar_no: u8,
}

impl BarSizeRequest {
    pub const WIRE_LEN: usize = 1;

    pub fn to_bytes(self) -> [u8; Self::WIRE_LEN] {
        [self.bar_no]
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, DecodeError> {
        expect_len(buf, Self::WIRE_LEN)?;
        Ok(Self { bar_no: buf[0] })
    }

    pub fn validate(self) -> Result<(), DecodeError> {
        if self.bar_no as usize >= BAR_COUNT {
            return Err(DecodeError::BarNumberOutOfRange(self.bar_no));
        }
        Ok(())
    }
}

/// `ACCESS_BAR` request payload: `{ offset: u64, size: u64, type: u8, bar_no: u8 }`.
/// The `size` bytes of write payload (for `AccessType::Write`) follow on the
/// wire and are not part of this fixed-shape header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessBarRequest {
    pub offset: u64,
    pub size: u64,
    pub kind: u8,
    pub bar_no: u8,
}

impl AccessBarRequest {
    pub const WIRE_LEN: usize = 8 + 8 + 1 + 1;

    pub fn to_bytes(self) -> [u8; Self::WIRE_LEN] {
        let mut out = [0u8; Self::WIRE_LEN];
        out[0..8].copy_from_slice(&self.offset.to_le_bytes());
        out[8..16].copy_from_slice(&self.size.to_le_bytes());
        out[16] = self.kind;
        out[17] = self.bar_no;
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, DecodeError> {
        expect_len(buf, Self::WIRE_LEN)?;
        Ok(Self {
            offset: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            size: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            kind: buf[16],
            bar_no: buf[17],
        })
    }

    pub fn access_type(self) -> Result<AccessType, DecodeError> {
        AccessType::try_from(self.kind)
    }

    pub fn validate_bar_no(self) -> Result<(), DecodeError> {
        if self.bar_no as usize >= BAR_COUNT {
            return Err(DecodeError::BarNumberOutOfRange(self.bar_no));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_tag_roundtrip() {
        for (raw, tag) in [
            (MessageTag::VER, MessageTag::Ver),
            (MessageTag::FD, MessageTag::Fd),
            (MessageTag::HDR, MessageTag::Hdr),
            (MessageTag::BAR, MessageTag::Bar),
            (MessageTag::ACCESS_BAR, MessageTag::AccessBar),
        ] {
            assert_eq!(MessageTag::try_from(raw), Ok(tag));
            assert_eq!(tag.as_u32(), raw);
        }
    }

    #[test]
    fn message_tag_rejects_unknown() {
        assert_eq!(
            MessageTag::try_from(0xFF),
            Err(DecodeError::UnknownTag(0xFF))
        );
    }

    #[test]
    fn hdr_request_roundtrip() {
        let req = HdrRequest {
            offset: 0x10,
            size: 4,
        };
        let bytes = req.to_bytes();
        assert_eq!(HdrRequest::from_bytes(&bytes), Ok(req));
    }

    #[test]
    fn hdr_request_short_read() {
        assert_eq!(
            HdrRequest::from_bytes(&[0u8; 3]),
            Err(DecodeError::ShortRead {
                expected: 8,
                got: 3
            })
        );
    }

    #[test]
    fn hdr_request_validates_bounds() {
        let ok = HdrRequest {
            offset: 4092,
            size: 4,
        };
        assert!(ok.validate().is_ok());

        let overflow = HdrRequest {
            offset: 4093,
            size: 4,
        };
        assert_eq!(
            overflow.validate(),
            Err(DecodeError::ConfigSpaceOutOfBounds {
                offset: 4093,
                size: 4
            })
        );

        let wraps = HdrRequest {
            offset: u32::MAX,
            size: 1,
        };
        assert!(wraps.validate().is_err());
    }

    #[test]
    fn access_bar_request_roundtrip() {
        let req = AccessBarRequest {
            offset: 0x10,
            size: 4,
            kind: AccessType::WRITE,
            bar_no: 0,
        };
        let bytes = req.to_bytes();
        assert_eq!(AccessBarRequest::from_bytes(&bytes), Ok(req));
        assert_eq!(req.access_type(), Ok(AccessType::Write));
    }

    #[test]
    fn bar_size_request_validates_range() {
        assert!(BarSizeRequest { bar_no: 5 }.validate().is_ok());
        assert_eq!(
            BarSizeRequest { bar_no: 6 }.validate(),
            Err(DecodeError::BarNumberOutOfRange(6))
        );
    }
}
