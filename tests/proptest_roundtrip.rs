//! Property-based round-trip tests for the codec and address parser (§8).

use proptest::prelude::*;
use s7_proto::address;
use s7_proto::types::{S7Type, Value};

proptest! {
    #[test]
    fn bit_roundtrips(v: bool) {
        let encoded = S7Type::Bit.encode(&Value::Bit(v)).unwrap();
        prop_assert_eq!(S7Type::Bit.decode(&encoded).unwrap(), Value::Bit(v));
    }

    #[test]
    fn byte_roundtrips(v: u8) {
        let encoded = S7Type::Byte.encode(&Value::Byte(v)).unwrap();
        prop_assert_eq!(S7Type::Byte.decode(&encoded).unwrap(), Value::Byte(v));
    }

    #[test]
    fn word_roundtrips(v: u16) {
        let encoded = S7Type::Word.encode(&Value::Word(v)).unwrap();
        prop_assert_eq!(S7Type::Word.decode(&encoded).unwrap(), Value::Word(v));
    }

    #[test]
    fn int_roundtrips(v: i16) {
        let encoded = S7Type::Int.encode(&Value::Int(v)).unwrap();
        prop_assert_eq!(S7Type::Int.decode(&encoded).unwrap(), Value::Int(v));
    }

    #[test]
    fn dword_roundtrips(v: u32) {
        let encoded = S7Type::DWord.encode(&Value::DWord(v)).unwrap();
        prop_assert_eq!(S7Type::DWord.decode(&encoded).unwrap(), Value::DWord(v));
    }

    #[test]
    fn dint_roundtrips(v: i32) {
        let encoded = S7Type::DInt.encode(&Value::DInt(v)).unwrap();
        prop_assert_eq!(S7Type::DInt.decode(&encoded).unwrap(), Value::DInt(v));
    }

    #[test]
    fn real_roundtrips(bits: u32) {
        let v = f32::from_bits(bits);
        prop_assume!(v.is_finite());
        let encoded = S7Type::Real.encode(&Value::Real(v)).unwrap();
        let Value::Real(got) = S7Type::Real.decode(&encoded).unwrap() else { panic!("wrong variant") };
        prop_assert_eq!(got.to_bits(), v.to_bits());
    }

    #[test]
    fn s5time_roundtrips(ms in 10i32..=9_990_000) {
        let encoded = S7Type::S5Time.encode(&Value::S5Time(ms as u32)).unwrap();
        let Value::S5Time(got) = S7Type::S5Time.decode(&encoded).unwrap() else { panic!("wrong variant") };
        // S5TIME loses precision below its base-factor granularity; the
        // decoded value must still land within one count step of ms.
        prop_assert!((got as i32 - ms).abs() <= 10_000);
    }

    #[test]
    fn string_roundtrips_within_default_capacity(s in "[ -~]{0,50}") {
        let encoded = S7Type::Str { max_len: 254 }.encode(&Value::Str(s.clone())).unwrap();
        prop_assert_eq!(S7Type::Str { max_len: 254 }.decode(&encoded).unwrap(), Value::Str(s));
    }

    #[test]
    fn db_address_roundtrips_through_display(block in 1u16..=999, byte in 0u32..=8000, bit in 0u8..=7) {
        let text = format!("DB{}.DBX{}.{}", block, byte, bit);
        let parsed = address::parse(&text).unwrap();
        let formatted = parsed.to_string();
        let reparsed = address::parse(&formatted).unwrap();
        prop_assert_eq!(parsed, reparsed);
    }

    #[test]
    fn input_address_roundtrips_through_display(byte in 0u32..=8000, bit in 0u8..=7) {
        let text = format!("I{}.{}", byte, bit);
        let parsed = address::parse(&text).unwrap();
        let reparsed = address::parse(&parsed.to_string()).unwrap();
        prop_assert_eq!(parsed, reparsed);
    }

    #[test]
    fn counter_address_roundtrips(n in 0u16..=999) {
        let text = format!("C{}", n);
        let parsed = address::parse(&text).unwrap();
        let reparsed = address::parse(&parsed.to_string()).unwrap();
        prop_assert_eq!(parsed, reparsed);
    }
}
