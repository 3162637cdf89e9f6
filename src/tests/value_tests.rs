//! Typed value codec tests

#![allow(clippy::unwrap_used)]

use crate::driver::{CTag, SqlTag, NULL_DATA};
use crate::error::Error;
use crate::value::{decode_fixed, encode_fixed, Date, Time, Value};

#[test]
fn fixed_round_trip_all_widths() {
    let cases = vec![
        (Value::Bool(true), CTag::Bit),
        (Value::TinyInt(-7), CTag::STinyInt),
        (Value::UTinyInt(200), CTag::UTinyInt),
        (Value::SmallInt(-12345), CTag::SShort),
        (Value::USmallInt(54321), CTag::UShort),
        (Value::Int(-1_000_000), CTag::SLong),
        (Value::UInt(3_000_000_000), CTag::ULong),
        (Value::BigInt(i64::MIN), CTag::SBigInt),
        (Value::UBigInt(u64::MAX), CTag::UBigInt),
        (Value::Float(1.5), CTag::Float),
        (Value::Double(-2.25), CTag::Double),
    ];
    for (value, c_tag) in cases {
        let mut buf = Vec::new();
        let indicator = encode_fixed(&value, c_tag, &mut buf).unwrap();
        assert_eq!(indicator as usize, c_tag.fixed_size());
        assert_eq!(buf.len(), c_tag.fixed_size());
        assert_eq!(decode_fixed(c_tag, &buf).unwrap(), value);
    }
}

#[test]
fn null_encodes_as_indicator_with_padding() {
    let mut buf = Vec::new();
    let indicator = encode_fixed(&Value::Null, CTag::SBigInt, &mut buf).unwrap();
    assert_eq!(indicator, NULL_DATA);
    assert_eq!(buf, vec![0u8; 8]);
}

#[test]
fn date_wire_format_round_trips() {
    let date = Date {
        year: 1969,
        month: 7,
        day: 20,
    };
    let mut buf = Vec::new();
    encode_fixed(&Value::Date(date), CTag::Date, &mut buf).unwrap();
    assert_eq!(buf.len(), 6);
    assert_eq!(decode_fixed(CTag::Date, &buf).unwrap(), Value::Date(date));
}

#[test]
fn time_wire_format_round_trips() {
    let time = Time {
        hour: 23,
        minute: 59,
        second: 59,
    };
    let mut buf = Vec::new();
    encode_fixed(&Value::Time(time), CTag::Time, &mut buf).unwrap();
    assert_eq!(buf.len(), 6);
    assert_eq!(decode_fixed(CTag::Time, &buf).unwrap(), Value::Time(time));
}

#[test]
fn out_of_range_dates_are_rejected() {
    let mut buf = Vec::new();
    let bad_month = Value::Date(Date {
        year: 2000,
        month: 13,
        day: 1,
    });
    assert!(matches!(
        encode_fixed(&bad_month, CTag::Date, &mut buf),
        Err(Error::ValueOverflow { .. })
    ));
    let bad_year = Value::Date(Date {
        year: 100_000,
        month: 1,
        day: 1,
    });
    assert!(matches!(
        encode_fixed(&bad_year, CTag::Date, &mut buf),
        Err(Error::ValueOverflow { .. })
    ));
}

#[test]
fn out_of_range_time_is_rejected() {
    let mut buf = Vec::new();
    let bad = Value::Time(Time {
        hour: 24,
        minute: 0,
        second: 0,
    });
    assert!(matches!(
        encode_fixed(&bad, CTag::Time, &mut buf),
        Err(Error::ValueOverflow { .. })
    ));
}

#[test]
fn text_is_not_fixed_width() {
    let mut buf = Vec::new();
    assert!(encode_fixed(&Value::Text("x".into()), CTag::Char, &mut buf).is_err());
    assert!(decode_fixed(CTag::Char, b"x").is_err());
}

/// Unsigned values whose sign bit is set under signed reinterpretation
/// promote to the next wider SQL type; 64-bit ones land on NUMERIC.
#[test]
fn unsigned_sql_tags_promote_per_value() {
    assert_eq!(Value::UTinyInt(127).sql_tag(), Some(SqlTag::TinyInt));
    assert_eq!(Value::UTinyInt(128).sql_tag(), Some(SqlTag::SmallInt));
    assert_eq!(Value::USmallInt(32_767).sql_tag(), Some(SqlTag::SmallInt));
    assert_eq!(Value::USmallInt(32_768).sql_tag(), Some(SqlTag::Integer));
    assert_eq!(Value::UInt(2_147_483_647).sql_tag(), Some(SqlTag::Integer));
    assert_eq!(Value::UInt(2_147_483_648).sql_tag(), Some(SqlTag::BigInt));
    assert_eq!(
        Value::UBigInt(i64::MAX as u64).sql_tag(),
        Some(SqlTag::BigInt)
    );
    assert_eq!(
        Value::UBigInt(i64::MAX as u64 + 1).sql_tag(),
        Some(SqlTag::Numeric)
    );
}

#[test]
fn promotion_never_changes_the_buffer_tag() {
    assert_eq!(Value::UTinyInt(128).c_tag(), Some(CTag::UTinyInt));
    assert_eq!(Value::UInt(u32::MAX).c_tag(), Some(CTag::ULong));
    assert_eq!(Value::UBigInt(u64::MAX).c_tag(), Some(CTag::UBigInt));
}

#[test]
fn null_has_no_tags() {
    assert_eq!(Value::Null.c_tag(), None);
    assert_eq!(Value::Null.sql_tag(), None);
}

#[test]
fn option_conversion_maps_none_to_null() {
    assert_eq!(Value::from(None::<i32>), Value::Null);
    assert_eq!(Value::from(Some(5i32)), Value::Int(5));
    assert_eq!(Value::from("abc"), Value::Text("abc".to_string()));
}

#[test]
fn chrono_conversions_round_trip() {
    let nd = chrono::NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    let date = Date::try_from(nd).unwrap();
    assert_eq!(chrono::NaiveDate::try_from(date).unwrap(), nd);

    let nt = chrono::NaiveTime::from_hms_opt(12, 34, 56).unwrap();
    let time = Time::try_from(nt).unwrap();
    assert_eq!(chrono::NaiveTime::try_from(time).unwrap(), nt);

    // A Date the calendar rejects fails on the way back out.
    let bad = Date {
        year: 2023,
        month: 2,
        day: 29,
    };
    assert!(chrono::NaiveDate::try_from(bad).is_err());
}
