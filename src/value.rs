/// Typed value codec
///
/// Maps application values onto the driver's typed-buffer protocol and back.
/// Each scalar kind has a fixed C-level buffer tag selected by its byte
/// width; the SQL-level tag for unsigned integers is chosen per value, with
/// values whose sign bit is set under signed reinterpretation promoted to
/// the next-wider SQL integer type. NULL never travels in-band: it is
/// always the `NULL_DATA` indicator on the side channel.
use crate::decimal::Decimal;
use crate::driver::{CTag, SqlTag, NULL_DATA};
use crate::error::{Error, Result};

/// Calendar date as the driver's three-field record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Date {
    pub year: i32,
    pub month: u8,
    pub day: u8,
}

/// Time of day as the driver's three-field record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Time {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl TryFrom<chrono::NaiveDate> for Date {
    type Error = Error;

    fn try_from(d: chrono::NaiveDate) -> Result<Self> {
        use chrono::Datelike;
        Ok(Date {
            year: d.year(),
            month: d.month() as u8,
            day: d.day() as u8,
        })
    }
}

impl TryFrom<Date> for chrono::NaiveDate {
    type Error = Error;

    fn try_from(d: Date) -> Result<Self> {
        chrono::NaiveDate::from_ymd_opt(d.year, u32::from(d.month), u32::from(d.day))
            .ok_or(Error::ValueOverflow { what: "date" })
    }
}

impl TryFrom<chrono::NaiveTime> for Time {
    type Error = Error;

    fn try_from(t: chrono::NaiveTime) -> Result<Self> {
        use chrono::Timelike;
        Ok(Time {
            hour: t.hour() as u8,
            minute: t.minute() as u8,
            second: t.second() as u8,
        })
    }
}

impl TryFrom<Time> for chrono::NaiveTime {
    type Error = Error;

    fn try_from(t: Time) -> Result<Self> {
        chrono::NaiveTime::from_hms_opt(
            u32::from(t.hour),
            u32::from(t.minute),
            u32::from(t.second),
        )
        .ok_or(Error::ValueOverflow { what: "time" })
    }
}

/// One typed value, or NULL.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    TinyInt(i8),
    UTinyInt(u8),
    SmallInt(i16),
    USmallInt(u16),
    Int(i32),
    UInt(u32),
    BigInt(i64),
    UBigInt(u64),
    Float(f32),
    Double(f64),
    Text(String),
    Date(Date),
    Time(Time),
    Decimal(Decimal),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// C-level buffer tag for this value. NULL has no tag of its own; the
    /// binder takes the tag from the column's non-null values.
    pub fn c_tag(&self) -> Option<CTag> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => CTag::Bit,
            Value::TinyInt(_) => CTag::STinyInt,
            Value::UTinyInt(_) => CTag::UTinyInt,
            Value::SmallInt(_) => CTag::SShort,
            Value::USmallInt(_) => CTag::UShort,
            Value::Int(_) => CTag::SLong,
            Value::UInt(_) => CTag::ULong,
            Value::BigInt(_) => CTag::SBigInt,
            Value::UBigInt(_) => CTag::UBigInt,
            Value::Float(_) => CTag::Float,
            Value::Double(_) => CTag::Double,
            Value::Text(_) | Value::Decimal(_) => CTag::Char,
            Value::Date(_) => CTag::Date,
            Value::Time(_) => CTag::Time,
        })
    }

    /// SQL-level type tag, chosen per value.
    ///
    /// An unsigned integer that is negative when reinterpreted as the
    /// signed type of the same width does not fit that SQL type, so it
    /// bumps to the next wider one. A 64-bit unsigned value past the
    /// signed range has nowhere wider to go and becomes NUMERIC.
    pub fn sql_tag(&self) -> Option<SqlTag> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => SqlTag::Bit,
            Value::TinyInt(_) => SqlTag::TinyInt,
            Value::UTinyInt(v) => {
                if (*v as i8) < 0 {
                    SqlTag::SmallInt
                } else {
                    SqlTag::TinyInt
                }
            }
            Value::SmallInt(_) => SqlTag::SmallInt,
            Value::USmallInt(v) => {
                if (*v as i16) < 0 {
                    SqlTag::Integer
                } else {
                    SqlTag::SmallInt
                }
            }
            Value::Int(_) => SqlTag::Integer,
            Value::UInt(v) => {
                if (*v as i32) < 0 {
                    SqlTag::BigInt
                } else {
                    SqlTag::Integer
                }
            }
            Value::BigInt(_) => SqlTag::BigInt,
            Value::UBigInt(v) => {
                if (*v as i64) < 0 {
                    SqlTag::Numeric
                } else {
                    SqlTag::BigInt
                }
            }
            Value::Float(_) => SqlTag::Real,
            Value::Double(_) => SqlTag::Double,
            Value::Text(_) => SqlTag::Varchar,
            Value::Date(_) => SqlTag::Date,
            Value::Time(_) => SqlTag::Time,
            Value::Decimal(_) => SqlTag::Numeric,
        })
    }

    /// Text form for the variable-length tags (strings and decimals).
    pub(crate) fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Decimal(d) => Some(d.as_str()),
            _ => None,
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v)
            }
        })*
    };
}

value_from! {
    bool => Bool, i8 => TinyInt, u8 => UTinyInt, i16 => SmallInt,
    u16 => USmallInt, i32 => Int, u32 => UInt, i64 => BigInt,
    u64 => UBigInt, f32 => Float, f64 => Double, String => Text,
    Date => Date, Time => Time, Decimal => Decimal,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Encode a fixed-width value into exactly `c_tag.fixed_size()` bytes,
/// appended to `out`, returning the indicator. NULL appends zero padding
/// with a `NULL_DATA` indicator.
pub(crate) fn encode_fixed(value: &Value, c_tag: CTag, out: &mut Vec<u8>) -> Result<isize> {
    let size = c_tag.fixed_size();
    if value.is_null() {
        out.extend(std::iter::repeat(0u8).take(size));
        return Ok(NULL_DATA);
    }
    match value {
        Value::Bool(v) => out.push(u8::from(*v)),
        Value::TinyInt(v) => out.extend(v.to_ne_bytes()),
        Value::UTinyInt(v) => out.extend(v.to_ne_bytes()),
        Value::SmallInt(v) => out.extend(v.to_ne_bytes()),
        Value::USmallInt(v) => out.extend(v.to_ne_bytes()),
        Value::Int(v) => out.extend(v.to_ne_bytes()),
        Value::UInt(v) => out.extend(v.to_ne_bytes()),
        Value::BigInt(v) => out.extend(v.to_ne_bytes()),
        Value::UBigInt(v) => out.extend(v.to_ne_bytes()),
        Value::Float(v) => out.extend(v.to_ne_bytes()),
        Value::Double(v) => out.extend(v.to_ne_bytes()),
        Value::Date(d) => encode_date(*d, out)?,
        Value::Time(t) => encode_time(*t, out)?,
        _ => {
            return Err(Error::protocol(format!(
                "value {value:?} is not fixed-width"
            )))
        }
    }
    Ok(size as isize)
}

/// Decode one fixed-width element back into a [`Value`].
pub(crate) fn decode_fixed(c_tag: CTag, bytes: &[u8]) -> Result<Value> {
    Ok(match c_tag {
        CTag::Bit => Value::Bool(byte(bytes)? != 0),
        CTag::STinyInt => Value::TinyInt(byte(bytes)? as i8),
        CTag::UTinyInt => Value::UTinyInt(byte(bytes)?),
        CTag::SShort => Value::SmallInt(i16::from_ne_bytes(array(bytes)?)),
        CTag::UShort => Value::USmallInt(u16::from_ne_bytes(array(bytes)?)),
        CTag::SLong => Value::Int(i32::from_ne_bytes(array(bytes)?)),
        CTag::ULong => Value::UInt(u32::from_ne_bytes(array(bytes)?)),
        CTag::SBigInt => Value::BigInt(i64::from_ne_bytes(array(bytes)?)),
        CTag::UBigInt => Value::UBigInt(u64::from_ne_bytes(array(bytes)?)),
        CTag::Float => Value::Float(f32::from_ne_bytes(array(bytes)?)),
        CTag::Double => Value::Double(f64::from_ne_bytes(array(bytes)?)),
        CTag::Date => Value::Date(decode_date(bytes)?),
        CTag::Time => Value::Time(decode_time(bytes)?),
        CTag::Char | CTag::Binary | CTag::Bookmark => {
            return Err(Error::protocol(format!("{c_tag:?} is not fixed-width")))
        }
    })
}

/// Wire format: year as i16, month and day as u16, native byte order.
fn encode_date(d: Date, out: &mut Vec<u8>) -> Result<()> {
    let year = i16::try_from(d.year).map_err(|_| Error::ValueOverflow { what: "date year" })?;
    if d.month == 0 || d.month > 12 || d.day == 0 || d.day > 31 {
        return Err(Error::ValueOverflow { what: "date" });
    }
    out.extend(year.to_ne_bytes());
    out.extend(u16::from(d.month).to_ne_bytes());
    out.extend(u16::from(d.day).to_ne_bytes());
    Ok(())
}

fn decode_date(bytes: &[u8]) -> Result<Date> {
    if bytes.len() < 6 {
        return Err(Error::protocol("short date buffer"));
    }
    let year = i16::from_ne_bytes(array(&bytes[0..2])?);
    let month = u16::from_ne_bytes(array(&bytes[2..4])?);
    let day = u16::from_ne_bytes(array(&bytes[4..6])?);
    Ok(Date {
        year: i32::from(year),
        month: u8::try_from(month).map_err(|_| Error::ValueOverflow { what: "date month" })?,
        day: u8::try_from(day).map_err(|_| Error::ValueOverflow { what: "date day" })?,
    })
}

/// Wire format: hour, minute, second as u16 each, native byte order.
fn encode_time(t: Time, out: &mut Vec<u8>) -> Result<()> {
    if t.hour > 23 || t.minute > 59 || t.second > 61 {
        return Err(Error::ValueOverflow { what: "time" });
    }
    out.extend(u16::from(t.hour).to_ne_bytes());
    out.extend(u16::from(t.minute).to_ne_bytes());
    out.extend(u16::from(t.second).to_ne_bytes());
    Ok(())
}

fn decode_time(bytes: &[u8]) -> Result<Time> {
    if bytes.len() < 6 {
        return Err(Error::protocol("short time buffer"));
    }
    let hour = u16::from_ne_bytes(array(&bytes[0..2])?);
    let minute = u16::from_ne_bytes(array(&bytes[2..4])?);
    let second = u16::from_ne_bytes(array(&bytes[4..6])?);
    let overflow = Error::ValueOverflow { what: "time" };
    Ok(Time {
        hour: u8::try_from(hour).map_err(|_| overflow)?,
        minute: u8::try_from(minute).map_err(|_| Error::ValueOverflow { what: "time" })?,
        second: u8::try_from(second).map_err(|_| Error::ValueOverflow { what: "time" })?,
    })
}

fn byte(bytes: &[u8]) -> Result<u8> {
    bytes
        .first()
        .copied()
        .ok_or_else(|| Error::protocol("empty value buffer"))
}

fn array<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .get(..N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Error::protocol("short value buffer"))
}
