#![cfg(feature = "alloc")]

use packcbor::{decode, encode, encode_size, free, value_eq, SystemAllocator};

fn hex(s: &str) -> Vec<u8> {
    assert_eq!(s.len() % 2, 0);
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

fn round_trips(hex_str: &str) {
    let a = SystemAllocator;
    let bytes = hex(hex_str);
    let v = decode(&a, &bytes).expect("decode");
    let size = encode_size(v);
    let mut out = vec![0u8; size];
    let written = encode(v, &mut out).expect("encode");
    assert_eq!(written, size);
    assert_eq!(out, bytes, "round trip mismatch for {hex_str}");
    free(&a, v);
}

#[test]
fn small_unsigneds_round_trip() {
    for h in ["00", "01", "0a", "17"] {
        round_trips(h);
    }
}

#[test]
fn unsigneds_across_all_length_classes_round_trip() {
    for h in [
        "1818",
        "1819",
        "1864",
        "1903e8",
        "1a000f4240",
        "1b000000e8d4a51000",
        "1bffffffffffffffff",
    ] {
        round_trips(h);
    }
}

#[test]
fn negatives_across_length_classes_round_trip() {
    for h in ["20", "29", "3863", "3903e7", "3bffffffffffffffff"] {
        round_trips(h);
    }
}

#[test]
fn float32_including_infinities_and_nan_round_trip() {
    for h in ["fa47c35000", "fa7f7fffff", "fa7f800000", "fa7fc00000", "faff800000"] {
        round_trips(h);
    }
}

#[test]
fn float64_including_infinities_and_nan_round_trip() {
    for h in [
        "fb3ff199999999999a",
        "fbc010666666666666",
        "fb7ff0000000000000",
        "fb7ff8000000000000",
        "fbfff0000000000000",
    ] {
        round_trips(h);
    }
}

#[test]
fn byte_and_text_strings_round_trip() {
    round_trips("4401020304");
    round_trips("6449455446");
}

#[test]
fn byte_string_length_one_form_round_trips() {
    // 0x58 0x18 = byte string, 1-byte length form, length 24.
    let payload = b"slightly longer than 24!";
    assert_eq!(payload.len(), 24);
    let mut h = String::from("5818");
    for b in payload {
        h.push_str(&format!("{b:02x}"));
    }
    round_trips(&h);
}

#[test]
fn arrays_and_nested_arrays_round_trip() {
    round_trips("83010203");
    round_trips("8301820203820405");
}

#[test]
fn array_length_one_byte_form_round_trips() {
    round_trips("9818010203040506070801020304050607080102030405060708");
}

#[test]
fn maps_round_trip() {
    round_trips("a201020304");
    round_trips("a26161016162820203");
}

#[test]
fn tags_round_trip() {
    round_trips("c074323031332d30332d32315432303a30343a30305a");
    round_trips("c11a514b67b0");
    round_trips("c1fb41d452d9ec200000");
    round_trips("d74401020304");
    round_trips("d818456449455446");
    round_trips("d82076687474703a2f2f7777772e6578616d706c652e636f6d");
}

#[test]
fn encode_size_matches_bytes_actually_written() {
    let a = SystemAllocator;
    for h in ["00", "1a000f4240", "a26161016162820203"] {
        let bytes = hex(h);
        let v = decode(&a, &bytes).unwrap();
        let size = encode_size(v);
        let mut out = vec![0u8; size];
        let written = encode(v, &mut out).unwrap();
        assert_eq!(size, written);
        free(&a, v);
    }
}

#[test]
fn truncated_prefixes_fail_without_panicking() {
    let a = SystemAllocator;
    for h in [
        "1b000000e8d4a51000",
        "83010203",
        "a201020304",
        "c11a514b67b0",
        "4401020304",
    ] {
        let bytes = hex(h);
        for len in 0..bytes.len() {
            assert!(decode(&a, &bytes[..len]).is_err(), "prefix of len {len} of {h} should fail");
        }
    }
}

#[test]
fn decode_then_encode_then_decode_is_structurally_equal() {
    let a = SystemAllocator;
    for h in ["a26161016162820203", "8301820203820405", "c1fb41d452d9ec200000"] {
        let bytes = hex(h);
        let v1 = decode(&a, &bytes).unwrap();
        let size = encode_size(v1);
        let mut out = vec![0u8; size];
        encode(v1, &mut out).unwrap();
        let v2 = decode(&a, &out).unwrap();
        assert!(value_eq(&v1, &v2));
        free(&a, v1);
        free(&a, v2);
    }
}
