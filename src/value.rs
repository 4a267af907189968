//! Typed value codec.
//!
//! `Value` is the tagged union every register's actual/expected slot holds.
//! Encoding and decoding always go through this module; nothing else packs
//! or unpacks bytes.
//!
//! Wire widths: every scalar (UCHAR/CHAR/USHORT/SHORT/UINT/INT/FLOAT/
//! BOOLEAN/BUTTON/SWITCH) occupies a 4-byte little-endian slot, even though
//! [`crate::types::DataType::byte_size`] reports a narrower *logical* size
//! for property metadata. This is deliberate: a multi-register reply packs
//! one 4-byte slot per register regardless of declared width, and the
//! single-register opcodes use the same slot for consistency. STRING/DATE/
//! TIME/DATETIME are the only variable-width, text-encoded exception.

use crate::types::DataType;

/// A decoded register value, or the absence of one.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Uchar(u8),
    Char(i8),
    Ushort(u16),
    Short(i16),
    Uint(u32),
    Int(i32),
    Float(f32),
    Bool(bool),
    /// Enumerated button event code.
    Button(u32),
    /// Enumerated switch state code.
    Switch(u32),
    String(String),
    /// `YYYY-MM-DD`.
    Date(CivilDate),
    /// `HH:MM:SS` with a signed minute UTC offset.
    Time(CivilTime),
    /// Date and time combined, same offset representation as [`CivilTime`].
    DateTime(CivilDate, CivilTime),
}

/// A calendar date, no timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CivilDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

/// A time of day plus a UTC offset in minutes (matches `%z`'s `+HHMM`/`-HHMM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CivilTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub utc_offset_minutes: i16,
}

/// u32 slot value meaning boolean `true`.
const BOOL_TRUE_SLOT: u32 = 0xFF00;
/// u32 slot value meaning boolean `false`.
const BOOL_FALSE_SLOT: u32 = 0x0000;

/// Reserved terminator for space-padded text fields.
pub const TEXT_SPACE_TERMINATOR: u8 = 0x20;

/// Encode a value into its on-wire byte run for the given data type.
///
/// Returns `None` when the value does not match the data type, or when the
/// text representation cannot be produced (e.g. a serial number over 255
/// bytes elsewhere is handled by the builder, not here).
pub fn encode(data_type: DataType, value: &Value) -> Option<Vec<u8>> {
    match (data_type, value) {
        (DataType::Uchar, Value::Uchar(v)) => Some(u32_slot(*v as u32)),
        (DataType::Char, Value::Char(v)) => Some(u32_slot(*v as u8 as u32)),
        (DataType::Ushort, Value::Ushort(v)) => Some(u32_slot(*v as u32)),
        (DataType::Short, Value::Short(v)) => Some(u32_slot(*v as u16 as u32)),
        (DataType::Uint, Value::Uint(v)) => Some(u32_slot(*v)),
        (DataType::Int, Value::Int(v)) => Some(u32_slot(*v as u32)),
        (DataType::Float, Value::Float(v)) => Some(v.to_le_bytes().to_vec()),
        (DataType::Boolean, Value::Bool(v)) => {
            Some(u32_slot(if *v { BOOL_TRUE_SLOT } else { BOOL_FALSE_SLOT }))
        }
        (DataType::Button, Value::Button(v)) => Some(u32_slot(*v)),
        (DataType::Switch, Value::Switch(v)) => Some(u32_slot(*v)),
        (DataType::String, Value::String(s)) => encode_ascii_text(s),
        (DataType::Date, Value::Date(d)) => encode_ascii_text(&format_date(d)),
        (DataType::Time, Value::Time(t)) => encode_ascii_text(&format_time(t)),
        (DataType::DateTime, Value::DateTime(d, t)) => {
            encode_ascii_text(&format_datetime(d, t))
        }
        _ => None,
    }
}

/// Decode a byte run into a value for the given data type.
///
/// `bytes` must already be sliced to the exact field width by the caller
/// (the parser knows the width per opcode/data-type combination); this
/// function never reads past what it is given.
pub fn decode(data_type: DataType, bytes: &[u8]) -> Option<Value> {
    match data_type {
        DataType::Uchar => Some(Value::Uchar(read_u32_slot(bytes)? as u8)),
        DataType::Char => Some(Value::Char(read_u32_slot(bytes)? as u8 as i8)),
        DataType::Ushort => Some(Value::Ushort(read_u32_slot(bytes)? as u16)),
        DataType::Short => Some(Value::Short(read_u32_slot(bytes)? as u16 as i16)),
        DataType::Uint => Some(Value::Uint(read_u32_slot(bytes)?)),
        DataType::Int => Some(Value::Int(read_u32_slot(bytes)? as i32)),
        DataType::Float => {
            let arr: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
            Some(Value::Float(f32::from_le_bytes(arr)))
        }
        DataType::Boolean => match read_u32_slot(bytes)? {
            BOOL_TRUE_SLOT => Some(Value::Bool(true)),
            BOOL_FALSE_SLOT => Some(Value::Bool(false)),
            _ => None,
        },
        DataType::Button => Some(Value::Button(read_u32_slot(bytes)?)),
        DataType::Switch => Some(Value::Switch(read_u32_slot(bytes)?)),
        DataType::String => Some(Value::String(decode_ascii_text(bytes)?)),
        DataType::Date => parse_date(&decode_ascii_text(bytes)?).map(Value::Date),
        DataType::Time => parse_time(&decode_ascii_text(bytes)?).map(Value::Time),
        DataType::DateTime => {
            let text = decode_ascii_text(bytes)?;
            let (date_part, time_part) = text.split_once('T')?;
            Some(Value::DateTime(
                parse_date(date_part)?,
                parse_time(time_part)?,
            ))
        }
        DataType::Enum | DataType::Unknown => None,
    }
}

fn u32_slot(v: u32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

fn read_u32_slot(bytes: &[u8]) -> Option<u32> {
    let arr: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(arr))
}

fn encode_ascii_text(s: &str) -> Option<Vec<u8>> {
    if !s.is_ascii() {
        return None;
    }
    Some(s.as_bytes().to_vec())
}

/// Decode ASCII text, stopping at the first space-byte terminator if one
/// is present.
fn decode_ascii_text(bytes: &[u8]) -> Option<String> {
    let end = bytes
        .iter()
        .position(|&b| b == TEXT_SPACE_TERMINATOR)
        .unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end]).ok().map(str::to_owned)
}

fn format_date(d: &CivilDate) -> String {
    format!("{:04}-{:02}-{:02}", d.year, d.month, d.day)
}

fn format_time(t: &CivilTime) -> String {
    format!(
        "{:02}:{:02}:{:02}{}",
        t.hour,
        t.minute,
        t.second,
        format_offset(t.utc_offset_minutes)
    )
}

fn format_datetime(d: &CivilDate, t: &CivilTime) -> String {
    format!("{}T{}", format_date(d), format_time(t))
}

fn format_offset(offset_minutes: i16) -> String {
    let sign = if offset_minutes < 0 { '-' } else { '+' };
    let abs = offset_minutes.unsigned_abs();
    format!("{sign}{:02}{:02}", abs / 60, abs % 60)
}

/// Parse `YYYY-MM-DD`.
fn parse_date(s: &str) -> Option<CivilDate> {
    let (year, rest) = s.split_once('-')?;
    let (month, day) = rest.split_once('-')?;
    Some(CivilDate {
        year: year.parse().ok()?,
        month: month.parse().ok()?,
        day: day.parse().ok()?,
    })
}

/// Parse `HH:MM:SS[+-]HHMM`.
fn parse_time(s: &str) -> Option<CivilTime> {
    let sign_pos = s.rfind(['+', '-'])?;
    let (clock, offset) = s.split_at(sign_pos);
    let mut parts = clock.split(':');
    let hour = parts.next()?.parse().ok()?;
    let minute = parts.next()?.parse().ok()?;
    let second = parts.next()?.parse().ok()?;
    let utc_offset_minutes = parse_offset(offset)?;
    Some(CivilTime {
        hour,
        minute,
        second,
        utc_offset_minutes,
    })
}

fn parse_offset(s: &str) -> Option<i16> {
    if s.len() != 5 {
        return None;
    }
    let sign: i16 = match &s[..1] {
        "+" => 1,
        "-" => -1,
        _ => return None,
    };
    let hours: i16 = s[1..3].parse().ok()?;
    let minutes: i16 = s[3..5].parse().ok()?;
    Some(sign * (hours * 60 + minutes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint_roundtrips_through_four_byte_slot() {
        let bytes = encode(DataType::Uint, &Value::Uint(42)).unwrap();
        assert_eq!(bytes, vec![0x2A, 0x00, 0x00, 0x00]);
        assert_eq!(decode(DataType::Uint, &bytes), Some(Value::Uint(42)));
    }

    #[test]
    fn ushort_still_occupies_a_four_byte_slot() {
        let bytes = encode(DataType::Ushort, &Value::Ushort(300)).unwrap();
        assert_eq!(bytes.len(), 4);
        assert_eq!(decode(DataType::Ushort, &bytes), Some(Value::Ushort(300)));
    }

    #[test]
    fn float_roundtrips() {
        let bytes = encode(DataType::Float, &Value::Float(1.5)).unwrap();
        assert_eq!(decode(DataType::Float, &bytes), Some(Value::Float(1.5)));
    }

    #[test]
    fn boolean_true_is_0xff00_slot() {
        let bytes = encode(DataType::Boolean, &Value::Bool(true)).unwrap();
        assert_eq!(bytes, vec![0x00, 0xFF, 0x00, 0x00]);
        assert_eq!(decode(DataType::Boolean, &bytes), Some(Value::Bool(true)));
    }

    #[test]
    fn boolean_false_is_zero_slot() {
        let bytes = encode(DataType::Boolean, &Value::Bool(false)).unwrap();
        assert_eq!(decode(DataType::Boolean, &bytes), Some(Value::Bool(false)));
    }

    #[test]
    fn invalid_boolean_slot_fails_to_decode() {
        assert_eq!(decode(DataType::Boolean, &[0x01, 0x00, 0x00, 0x00]), None);
    }

    #[test]
    fn mismatched_value_for_type_fails_to_encode() {
        assert_eq!(encode(DataType::Boolean, &Value::String("hello".into())), None);
    }

    #[test]
    fn string_decode_stops_at_space_terminator() {
        let bytes = b"hi there   ".to_vec();
        assert_eq!(
            decode(DataType::String, &bytes),
            Some(Value::String("hi there".into()))
        );
    }

    #[test]
    fn date_roundtrips() {
        let date = CivilDate { year: 2024, month: 3, day: 9 };
        let bytes = encode(DataType::Date, &Value::Date(date)).unwrap();
        assert_eq!(bytes, b"2024-03-09");
        assert_eq!(decode(DataType::Date, &bytes), Some(Value::Date(date)));
    }

    #[test]
    fn time_roundtrips_with_offset() {
        let time = CivilTime { hour: 13, minute: 5, second: 0, utc_offset_minutes: 60 };
        let bytes = encode(DataType::Time, &Value::Time(time)).unwrap();
        assert_eq!(bytes, b"13:05:00+0100");
        assert_eq!(decode(DataType::Time, &bytes), Some(Value::Time(time)));
    }

    #[test]
    fn time_roundtrips_with_negative_offset() {
        let time = CivilTime { hour: 23, minute: 59, second: 59, utc_offset_minutes: -330 };
        let bytes = encode(DataType::Time, &Value::Time(time)).unwrap();
        assert_eq!(bytes, b"23:59:59-0530");
        assert_eq!(decode(DataType::Time, &bytes), Some(Value::Time(time)));
    }

    #[test]
    fn datetime_roundtrips() {
        let date = CivilDate { year: 2024, month: 3, day: 9 };
        let time = CivilTime { hour: 8, minute: 0, second: 0, utc_offset_minutes: 0 };
        let bytes = encode(DataType::DateTime, &Value::DateTime(date, time)).unwrap();
        assert_eq!(bytes, b"2024-03-09T08:00:00+0000");
        assert_eq!(
            decode(DataType::DateTime, &bytes),
            Some(Value::DateTime(date, time))
        );
    }
}
