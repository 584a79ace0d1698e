#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Edge-case tests for frames, the registry and payload crypto
//! Boundary conditions, malformed input and concurrent use

use std::sync::Arc;

use bytes::BytesMut;
use refbox_comm::core::frame::decode;
use refbox_comm::error::ProtocolError;
use refbox_comm::utils::crypto::CryptoContext;
use refbox_comm::{wire_identity, Frame, FrameCodec, FrameHeader, MessageRegistry, WireIdentity};
use serde::{Deserialize, Serialize};
use tokio_util::codec::Decoder;

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct Beacon {
    seq: u64,
    team: String,
}
wire_identity!(Beacon, 2000, 1);

#[derive(Debug, Default, Serialize, Deserialize)]
struct Anonymous {
    value: u8,
}
impl WireIdentity for Anonymous {}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HalfDeclared;
impl WireIdentity for HalfDeclared {
    const COMP_ID: Option<i64> = Some(2000);
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OutOfRange;
wire_identity!(OutOfRange, 70_000, 1);

// ============================================================================
// FRAME EDGE CASES
// ============================================================================

#[test]
fn test_frame_empty_payload() {
    let frame = Frame::new(1, 2, Vec::new()).unwrap();
    let bytes = frame.to_bytes();
    assert_eq!(bytes.len(), 8);
    let decoded = Frame::from_datagram(&bytes).expect("Should decode empty payload");
    assert_eq!(decoded.header.payload_size, 0);
}

#[test]
fn test_header_truncated() {
    for len in 0..8 {
        assert!(matches!(
            decode(&[0u8; 8][..len]),
            Err(ProtocolError::InvalidHeader)
        ));
    }
}

#[test]
fn test_header_does_not_check_available_payload() {
    let header = decode(&[0, 1, 0, 2, 0xFF, 0xFF, 0xFF, 0xFF]).unwrap();
    assert_eq!(header.payload_size, u32::MAX);
}

#[test]
fn test_datagram_with_trailing_bytes_rejected() {
    let mut bytes = Frame::new(1, 1, vec![1, 2, 3]).unwrap().to_bytes().to_vec();
    bytes.push(0);
    assert!(matches!(
        Frame::from_datagram(&bytes),
        Err(ProtocolError::TruncatedFrame {
            declared: 3,
            available: 4
        })
    ));
}

#[test]
fn test_codec_rejects_oversized_declaration() {
    let mut codec = FrameCodec::new(1024);
    let header = FrameHeader {
        component_id: 1,
        message_type: 1,
        payload_size: 20_000_000,
    };
    let mut buf = BytesMut::from(&header.to_bytes()[..]);
    assert!(matches!(
        codec.decode(&mut buf),
        Err(ProtocolError::OversizedPacket(20_000_000))
    ));
}

#[test]
fn test_from_parts_mismatch() {
    let header = FrameHeader {
        component_id: 1,
        message_type: 1,
        payload_size: 5,
    };
    assert!(Frame::from_parts(header, bytes::Bytes::from_static(b"abc")).is_err());
}

// ============================================================================
// REGISTRY EDGE CASES
// ============================================================================

#[test]
fn test_self_describing_missing_ids() {
    let registry = MessageRegistry::new();
    assert!(matches!(
        registry.register_self_describing::<Anonymous>(),
        Err(ProtocolError::MissingTypeInfo { .. })
    ));
    assert!(matches!(
        registry.register_self_describing::<HalfDeclared>(),
        Err(ProtocolError::MissingTypeInfo { .. })
    ));
    assert!(registry.is_empty());
}

#[test]
fn test_self_describing_out_of_range() {
    let registry = MessageRegistry::new();
    assert!(matches!(
        registry.register_self_describing::<OutOfRange>(),
        Err(ProtocolError::InvalidTypeId {
            field: "COMP_ID",
            value: 70_000,
            ..
        })
    ));
}

#[test]
fn test_explicit_then_self_describing_collide() {
    let registry = MessageRegistry::new();
    registry.register::<Anonymous>(2000, 1).unwrap();
    assert!(matches!(
        registry.register_self_describing::<Beacon>(),
        Err(ProtocolError::DuplicateType {
            component_id: 2000,
            message_type: 1
        })
    ));

    let registry = MessageRegistry::new();
    registry.register_self_describing::<Beacon>().unwrap();
    assert!(registry.register::<Anonymous>(2000, 1).is_err());
}

#[test]
fn test_unregister_then_reregister() {
    let registry = MessageRegistry::new();
    registry.register_self_describing::<Beacon>().unwrap();
    registry.unregister(2000, 1).unwrap();
    registry.unregister(2000, 1).unwrap();

    assert!(!registry.is_registered(2000, 1));
    assert!(matches!(
        registry.new_instance_by_name(std::any::type_name::<Beacon>()),
        Err(ProtocolError::UnknownTypeName(_))
    ));
    registry.register::<Beacon>(2000, 1).unwrap();
}

#[test]
fn test_deserialize_unregistered() {
    let registry = MessageRegistry::new();
    let header = FrameHeader {
        component_id: 9,
        message_type: 9,
        payload_size: 0,
    };
    let err = registry.deserialize(&header, &[]).unwrap_err();
    assert!(err.is_unregistered());
}

#[test]
fn test_trailing_bytes_permissive_and_strict() {
    let permissive = MessageRegistry::new();
    permissive.register_self_describing::<Beacon>().unwrap();
    let strict = MessageRegistry::new().strict_parsing(true);
    strict.register_self_describing::<Beacon>().unwrap();

    let frame = permissive
        .serialize_message(&Beacon {
            seq: 4,
            team: "Carologistics".into(),
        })
        .unwrap();
    let mut payload = frame.payload.to_vec();
    payload.extend_from_slice(&[0xAA, 0xBB]);
    let header = FrameHeader {
        payload_size: payload.len() as u32,
        ..frame.header
    };

    let parsed = permissive.deserialize(&header, &payload).unwrap();
    assert_eq!(parsed.downcast_ref::<Beacon>().unwrap().seq, 4);
    assert!(matches!(
        strict.deserialize(&header, &payload),
        Err(ProtocolError::DeserializeError(_))
    ));
}

#[test]
fn test_serialize_unknown_schema_by_name() {
    let registry = MessageRegistry::new();
    assert!(matches!(
        registry.serialize_message(&Beacon::default()),
        Err(ProtocolError::UnknownTypeName(_))
    ));
    // explicit keys need no registration on the sending side
    assert!(registry.serialize(7, 7, &Beacon::default()).is_ok());
}

// ============================================================================
// CRYPTO EDGE CASES
// ============================================================================

#[test]
fn test_crypto_empty_plaintext() {
    let ctx = CryptoContext::new("randomkey", "").unwrap();
    let sealed = ctx.seal(&[]).unwrap();
    assert!(ctx.open(&sealed).unwrap().is_empty());
}

#[test]
fn test_crypto_corrupted_ciphertext() {
    let ctx = CryptoContext::new("randomkey", "").unwrap();
    let mut sealed = ctx.seal(b"machine report").unwrap();
    let last = sealed.len() - 1;
    sealed[last] ^= 0x01;
    assert!(matches!(ctx.open(&sealed), Err(ProtocolError::DecryptionFailure)));
}

#[test]
fn test_cipher_mismatch_fails() {
    let x = CryptoContext::new("randomkey", "xchacha20-poly1305").unwrap();
    let c = CryptoContext::new("randomkey", "chacha20-poly1305").unwrap();
    assert!(c.open(&x.seal(b"orders").unwrap()).is_err());
}

#[tokio::test]
async fn test_concurrent_sealing_same_key() {
    let ctx = Arc::new(CryptoContext::new("randomkey", "").unwrap());

    let mut tasks = vec![];
    for i in 0..100 {
        let ctx = Arc::clone(&ctx);
        tasks.push(tokio::spawn(async move {
            let plaintext = format!("message {i}").into_bytes();
            let sealed = ctx.seal(&plaintext).expect("Should encrypt");
            assert_eq!(ctx.open(&sealed).expect("Should decrypt"), plaintext);
        }));
    }

    for task in tasks {
        task.await.expect("Task should complete");
    }
}

// ============================================================================
// ERROR FORMATTING
// ============================================================================

#[test]
fn test_error_display_formatting() {
    let errors = vec![
        ProtocolError::InvalidHeader,
        ProtocolError::OversizedPacket(999),
        ProtocolError::TruncatedFrame {
            declared: 10,
            available: 2,
        },
        ProtocolError::DuplicateType {
            component_id: 1,
            message_type: 2,
        },
        ProtocolError::UnregisteredType {
            component_id: 1,
            message_type: 2,
        },
        ProtocolError::ConnectionClosed,
        ProtocolError::NotConnected,
        ProtocolError::UnknownSession(3),
        ProtocolError::Timeout,
        ProtocolError::EncryptionFailure,
        ProtocolError::DecryptionFailure,
        ProtocolError::UnsupportedCipher("rot13".into()),
        ProtocolError::Io(std::io::Error::other("test error")),
    ];

    for err in errors {
        let display_str = format!("{err}");
        assert!(!display_str.is_empty(), "Error should have display format");
    }
}
