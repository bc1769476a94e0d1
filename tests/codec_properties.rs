//! Property-based tests for the wire codec.

use proptest::prelude::*;
use tplink_smarthome::crypto::{decrypt, encrypt};
use tplink_smarthome::protocol::{HEADER_LEN, decode, encode, read_frame};

/// Arbitrary payloads, empty included.
fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}

proptest! {
    #[test]
    fn prop_frame_roundtrip(plain in payload_strategy()) {
        let frame = encode(&plain).unwrap();
        prop_assert_eq!(decode(&frame).unwrap(), plain);
    }

    #[test]
    fn prop_prefix_is_plaintext_length(plain in payload_strategy()) {
        let frame = encode(&plain).unwrap();
        let announced = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        prop_assert_eq!(announced, plain.len());
        prop_assert_eq!(frame.len(), HEADER_LEN + plain.len());
    }

    #[test]
    fn prop_obfuscation_roundtrip(plain in payload_strategy()) {
        let scrambled = encrypt(&plain);
        prop_assert_eq!(scrambled.len(), plain.len());
        prop_assert_eq!(decrypt(&scrambled), plain);
    }

    #[test]
    fn prop_stream_read_matches_decode(plain in payload_strategy(), trailing in payload_strategy()) {
        let mut wire = encode(&plain).unwrap();
        wire.extend_from_slice(&trailing);
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let mut reader = &wire[..];
        let read = rt.block_on(read_frame(&mut reader)).unwrap();
        prop_assert_eq!(&read, &plain);
        prop_assert_eq!(decode(&wire).unwrap(), plain);
    }
}
