use chrono::Timelike;
use uuid::Uuid;

use crate::error::Error;
use crate::operator::{ColumnType, RowValue};

pub const UNSUPPORTED_COLUMN_TYPE_OUTPUT: &str = "[UNSUPPORTED COLUMN TYPE]";

/// Renders one cell as CSV field text.
///
/// Dispatch is on the column's declared type, since several SQL types share a
/// driver representation. Quoting is left to the CSV writer.
pub fn format_value(
    value: &RowValue,
    column_type: &ColumnType,
    null_represent: &str,
) -> Result<String, Error> {
    if let RowValue::Null = value {
        return Ok(null_represent.to_string());
    }

    match (column_type, value) {
        (ColumnType::Integer, RowValue::Int(n)) => Ok(n.to_string()),

        (ColumnType::Boolean, RowValue::Bool(b)) => Ok(bit(*b)),
        (ColumnType::Boolean, RowValue::Int(n)) => Ok(bit(*n != 0)),

        (ColumnType::Float, RowValue::Real(f)) => Ok(format_real(*f)),
        (ColumnType::Float, RowValue::Float(f)) => Ok(format_float(*f)),

        // Already carries its exact scale, never goes through a float
        (ColumnType::Decimal, RowValue::Bytes(raw)) => Ok(String::from_utf8_lossy(raw).into_owned()),
        (ColumnType::Decimal, RowValue::Text(s)) => Ok(s.clone()),

        (ColumnType::Text, RowValue::Text(s)) => Ok(s.clone()),
        (ColumnType::Text, RowValue::Bytes(raw)) => Ok(String::from_utf8_lossy(raw).into_owned()),

        (ColumnType::Date, RowValue::Date(d)) => Ok(d.format("%Y-%m-%d").to_string()),
        (ColumnType::Date, RowValue::DateTime(dt)) => Ok(dt.format("%Y-%m-%d").to_string()),

        (ColumnType::DateTime, RowValue::DateTime(dt)) => {
            Ok(dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        }
        (ColumnType::DateTime2, RowValue::DateTime(dt)) => Ok(format!(
            "{}.{:07}",
            dt.format("%Y-%m-%d %H:%M:%S"),
            (dt.nanosecond() % 1_000_000_000) / 100
        )),
        (ColumnType::SmallDateTime, RowValue::DateTime(dt)) => {
            Ok(dt.format("%Y-%m-%d %H:%M:%S").to_string())
        }

        (ColumnType::UniqueIdentifier, RowValue::Bytes(raw)) => format_guid_bytes(raw),
        (ColumnType::UniqueIdentifier, RowValue::Text(s)) => {
            let guid = Uuid::parse_str(s.trim())
                .map_err(|e| Error::Format(format!("invalid uniqueidentifier {:?}: {}", s, e)))?;
            Ok(upper_hyphenated(&guid))
        }

        (ColumnType::Unsupported(_), _) => Ok(UNSUPPORTED_COLUMN_TYPE_OUTPUT.to_string()),

        (column_type, value) => Err(Error::Format(format!(
            "{} value cannot be formatted as {:?}",
            value_kind(value),
            column_type
        ))),
    }
}

fn bit(b: bool) -> String {
    let out = if b { "1" } else { "0" };
    out.to_string()
}

/// SQL Server sends GUIDs with the first three groups little endian.
fn format_guid_bytes(raw: &[u8]) -> Result<String, Error> {
    let bytes: [u8; 16] = raw.try_into().map_err(|_| {
        Error::Format(format!(
            "invalid uniqueidentifier: expected 16 bytes, got {}",
            raw.len()
        ))
    })?;
    Ok(upper_hyphenated(&Uuid::from_bytes_le(bytes)))
}

fn upper_hyphenated(guid: &Uuid) -> String {
    guid.hyphenated().to_string().to_ascii_uppercase()
}

fn format_real(f: f32) -> String {
    match non_finite(f.is_nan(), f.is_infinite(), f.is_sign_negative()) {
        Some(s) => s.to_string(),
        None => general_layout(&format!("{:e}", f)),
    }
}

fn format_float(f: f64) -> String {
    match non_finite(f.is_nan(), f.is_infinite(), f.is_sign_negative()) {
        Some(s) => s.to_string(),
        None => general_layout(&format!("{:e}", f)),
    }
}

fn non_finite(nan: bool, infinite: bool, negative: bool) -> Option<&'static str> {
    match (nan, infinite, negative) {
        (true, _, _) => Some("NaN"),
        (false, true, false) => Some("+Inf"),
        (false, true, true) => Some("-Inf"),
        _ => None,
    }
}

/// Re-lays the shortest scientific form (`{:e}`) out the way `%g` does:
/// plain digits for exponents in `[-4, 6)`, `d.ddde+XX` otherwise.
fn general_layout(scientific: &str) -> String {
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific.to_string();
    };
    let Ok(exp) = exponent.parse::<i32>() else {
        return scientific.to_string();
    };
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if !(-4..6).contains(&exp) {
        let (lead, rest) = digits.split_at(1);
        let fraction = if rest.is_empty() { String::new() } else { format!(".{}", rest) };
        let exp_sign = if exp < 0 { '-' } else { '+' };
        return format!("{}{}{}e{}{:02}", sign, lead, fraction, exp_sign, exp.abs());
    }

    if exp < 0 {
        let zeros = "0".repeat((-exp - 1) as usize);
        return format!("{}0.{}{}", sign, zeros, digits);
    }

    let int_len = exp as usize + 1;
    if digits.len() <= int_len {
        format!("{}{}{}", sign, digits, "0".repeat(int_len - digits.len()))
    } else {
        let (int_part, fraction) = digits.split_at(int_len);
        format!("{}{}.{}", sign, int_part, fraction)
    }
}

fn value_kind(value: &RowValue) -> &'static str {
    match value {
        RowValue::Null => "null",
        RowValue::Int(_) => "integer",
        RowValue::Bool(_) => "boolean",
        RowValue::Real(_) | RowValue::Float(_) => "floating point",
        RowValue::Text(_) => "text",
        RowValue::Bytes(_) => "binary",
        RowValue::Date(_) => "date",
        RowValue::DateTime(_) => "timestamp",
        RowValue::Opaque => "opaque",
    }
}
