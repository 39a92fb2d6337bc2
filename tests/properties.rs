#![cfg(feature = "alloc")]
#![allow(clippy::unwrap_used)]

use proptest::prelude::*;

use packcbor::{decode, encode, encode_size, free, value_eq, SystemAllocator, Value};

fn round_trip_int(i: i64) {
    let a = SystemAllocator;
    let v = Value::make_sint(&a, i).expect("make_sint");
    let size = encode_size(v);
    let mut buf = vec![0u8; size];
    encode(v, &mut buf).expect("encode");
    let back = decode(&a, &buf).expect("decode");
    assert_eq!(back.as_i64().unwrap(), i);
    free(&a, v);
    free(&a, back);
}

proptest! {
    #[test]
    fn integer_sweep_round_trips_through_encode_decode(i in any::<i64>()) {
        round_trip_int(i);
    }

    #[test]
    fn integer_boundaries_round_trip(
        i in prop_oneof![
            Just(i64::MIN),
            Just(i64::MAX),
            Just(0i64),
            Just(-1i64),
            (-1_000_000i64..1_000_000i64),
        ]
    ) {
        round_trip_int(i);
    }

    #[test]
    fn byte_strings_round_trip_through_encode_decode(bytes in proptest::collection::vec(any::<u8>(), 0..300)) {
        let a = SystemAllocator;
        let v = Value::make_bytes(&a, &bytes).unwrap();
        let size = encode_size(v);
        let mut buf = vec![0u8; size];
        encode(v, &mut buf).unwrap();
        let back = decode(&a, &buf).unwrap();
        prop_assert_eq!(back.as_bytes(), Some(bytes.as_slice()));
        free(&a, v);
        free(&a, back);
    }

    #[test]
    fn text_strings_round_trip_through_encode_decode(s in ".{0,200}") {
        let a = SystemAllocator;
        let v = Value::make_text(&a, s.as_bytes()).unwrap();
        let size = encode_size(v);
        let mut buf = vec![0u8; size];
        encode(v, &mut buf).unwrap();
        let back = decode(&a, &buf).unwrap();
        prop_assert_eq!(back.as_text_bytes(), Some(s.as_bytes()));
        free(&a, v);
        free(&a, back);
    }

    #[test]
    fn encode_size_always_matches_bytes_written(i in any::<i64>()) {
        let a = SystemAllocator;
        let v = Value::make_sint(&a, i).unwrap();
        let size = encode_size(v);
        let mut buf = vec![0u8; size];
        let written = encode(v, &mut buf).unwrap();
        prop_assert_eq!(size, written);
        free(&a, v);
    }

    #[test]
    fn nested_arrays_of_ints_satisfy_the_encode_decode_law(items in proptest::collection::vec(any::<i64>(), 0..20)) {
        let a = SystemAllocator;
        let mut arr = Value::make_array(&a, 0).unwrap();
        for &i in &items {
            let item = Value::make_sint(&a, i).unwrap();
            arr = Value::array_append(&a, arr, item).unwrap();
        }
        let size = encode_size(arr);
        let mut buf = vec![0u8; size];
        encode(arr, &mut buf).unwrap();
        let back = decode(&a, &buf).unwrap();
        prop_assert!(value_eq(&arr, &back));
        free(&a, arr);
        free(&a, back);
    }
}

#[test]
fn buffer_too_small_never_panics_for_any_undersized_length() {
    let a = SystemAllocator;
    let v = Value::make_sint(&a, 123_456_789).unwrap();
    let size = encode_size(v);
    for short in 0..size {
        let mut buf = vec![0u8; short];
        assert!(encode(v, &mut buf).is_err());
    }
    free(&a, v);
}
