use epc_protocol::{
    AccessBarRequest, AccessType, BarSizeRequest, BarSubtype, DecodeError, HdrRequest,
    MessageTag, PROTOCOL_VERSION,
};
use std::convert::TryFrom;

#[test]
fn protocol_version_matches_the_spec_constant() {
    assert_eq!(PROTOCOL_VERSION, 0xdead_beef);
    assert_eq!(PROTOCOL_VERSION.to_le_bytes(), [0xef, 0xbe, 0xad, 0xde]);
}

#[test]
fn hdr_request_roundtrip_matches_scenario_2() {
    // spec scenario 2: HDR(offset=0, size=2) over a header `4c 10 00 b5 00 00 00 00`.
    let req = HdrRequest {
        offset: 0,
        size: 2,
    };
    let bytes = req.to_bytes();
    let decoded = HdrRequest::from_bytes(&bytes).expect("decode");
    assert_eq!(decoded, req);
    assert!(decoded.validate().is_ok());
}

#[test]
fn bar_subtype_roundtrip() {
    assert_eq!(BarSubtype::try_from(BarSubtype::MASK), Ok(BarSubtype::Mask));
    assert_eq!(BarSubtype::try_from(BarSubtype::BAR), Ok(BarSubtype::Bar));
    assert_eq!(
        BarSubtype::try_from(0xAA),
        Err(DecodeError::UnknownBarSubtype(0xAA))
    );
}

#[test]
fn bar_size_request_rejects_bar_greater_than_five() {
    let req = BarSizeRequest { bar_no: 7 };
    assert_eq!(
        req.validate(),
        Err(DecodeError::BarNumberOutOfRange(7))
    );
}

#[test]
fn access_bar_request_roundtrip_matches_scenario_4() {
    // spec scenario 4: bridge writes 4 bytes at BAR0 offset 0x10.
    let req = AccessBarRequest {
        offset: 0x10,
        size: 4,
        kind: AccessType::WRITE,
        bar_no: 0,
    };
    let bytes = req.to_bytes();
    let decoded = AccessBarRequest::from_bytes(&bytes).expect("decode");
    assert_eq!(decoded, req);
    assert_eq!(decoded.access_type(), Ok(AccessType::Write));
    assert!(decoded.validate_bar_no().is_ok());
}

#[test]
fn decode_rejects_unknown_message_tag() {
    let err = MessageTag::try_from(0xFFFF_FFFFu32).unwrap_err();
    assert_eq!(err, DecodeError::UnknownTag(0xFFFF_FFFF));
}

#[test]
fn decode_rejects_short_reads() {
    assert_eq!(
        HdrRequest::from_bytes(&[1, 2, 3]),
        Err(DecodeError::ShortRead {
            expected: 8,
            got: 3
        })
    );
    assert_eq!(
        AccessBarRequest::from_bytes(&[0u8; 10]),
        Err(DecodeError::ShortRead {
            expected: 18,
            got: 10
        })
    );
}
