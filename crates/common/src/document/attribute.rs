//! Typed attributes attached to a document version.
//!
//! Each [`AttributeValue`] variant has exactly one text parser (used when
//! values arrive from an API layer) and one byte encoding (used as the leaf
//! value in the core metadata tree).

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::{AttrKey, DocumentError};
use crate::crypto::sha256;

/// Largest number of fractional digits a [`Decimal`] may carry
pub const MAX_DECIMAL_SCALE: u32 = 18;

impl AttrKey {
    /// Derive the key of an attribute from its label
    pub fn from_label(label: &str) -> Result<Self, DocumentError> {
        if label.is_empty() {
            return Err(DocumentError::EmptyLabel);
        }
        Ok(AttrKey::from(sha256(label.as_bytes())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    Integer,
    Decimal,
    String,
    Bytes,
    Timestamp,
}

impl std::fmt::Display for AttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AttributeType::Integer => "integer",
            AttributeType::Decimal => "decimal",
            AttributeType::String => "string",
            AttributeType::Bytes => "bytes",
            AttributeType::Timestamp => "timestamp",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for AttributeType {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "integer" => Ok(AttributeType::Integer),
            "decimal" => Ok(AttributeType::Decimal),
            "string" => Ok(AttributeType::String),
            "bytes" => Ok(AttributeType::Bytes),
            "timestamp" => Ok(AttributeType::Timestamp),
            other => Err(DocumentError::UnknownAttributeType(other.to_string())),
        }
    }
}

/// Fixed point decimal: `mantissa * 10^-scale`
///
/// Always held without trailing fractional zeros, so `1.5` and `1.50` are
/// the same value with the same leaf encoding. Zero carries no sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawDecimal")]
pub struct Decimal {
    mantissa: i128,
    scale: u32,
}

#[derive(Deserialize)]
struct RawDecimal {
    mantissa: i128,
    scale: u32,
}

impl From<RawDecimal> for Decimal {
    fn from(raw: RawDecimal) -> Self {
        Self::new(raw.mantissa, raw.scale)
    }
}

impl Decimal {
    pub fn new(mut mantissa: i128, mut scale: u32) -> Self {
        while scale > 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            scale -= 1;
        }
        Self { mantissa, scale }
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }
}

impl FromStr for Decimal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, digits) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        let (whole, fraction) = match digits.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (digits, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err("no digits".to_string());
        }
        if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(format!("{:?} is not a decimal number", s));
        }
        let scale = fraction.len() as u32;
        if scale > MAX_DECIMAL_SCALE {
            return Err(format!("more than {} fractional digits", MAX_DECIMAL_SCALE));
        }

        let mut mantissa: i128 = 0;
        for b in whole.bytes().chain(fraction.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(b - b'0')))
                .ok_or_else(|| "decimal out of range".to_string())?;
        }
        if negative {
            mantissa = -mantissa;
        }
        Ok(Self::new(mantissa, scale))
    }
}

impl std::fmt::Display for Decimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let digits = self.mantissa.unsigned_abs().to_string();
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{}{}", sign, digits);
        }
        let padded = format!("{:0>width$}", digits, width = scale + 1);
        let (whole, fraction) = padded.split_at(padded.len() - scale);
        write!(f, "{}{}.{}", sign, whole, fraction)
    }
}

/// The value of an attribute, tagged with its type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    Integer(i128),
    Decimal(Decimal),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(OffsetDateTime),
}

impl AttributeValue {
    pub fn attr_type(&self) -> AttributeType {
        match self {
            AttributeValue::Integer(_) => AttributeType::Integer,
            AttributeValue::Decimal(_) => AttributeType::Decimal,
            AttributeValue::String(_) => AttributeType::String,
            AttributeValue::Bytes(_) => AttributeType::Bytes,
            AttributeValue::Timestamp(_) => AttributeType::Timestamp,
        }
    }

    /// Parse the textual form of a value of the given type.
    ///
    /// Bytes are hex (optionally `0x` prefixed), timestamps are RFC 3339.
    pub fn parse(attr_type: AttributeType, raw: &str) -> Result<Self, DocumentError> {
        let invalid = |reason: String| DocumentError::NotValidAttributeType {
            attr_type,
            reason,
        };
        match attr_type {
            AttributeType::Integer => raw
                .parse::<i128>()
                .map(AttributeValue::Integer)
                .map_err(|e| invalid(e.to_string())),
            AttributeType::Decimal => raw.parse::<Decimal>().map(AttributeValue::Decimal).map_err(invalid),
            AttributeType::String => Ok(AttributeValue::String(raw.to_string())),
            AttributeType::Bytes => hex::decode(raw.strip_prefix("0x").unwrap_or(raw))
                .map(AttributeValue::Bytes)
                .map_err(|e| invalid(e.to_string())),
            AttributeType::Timestamp => OffsetDateTime::parse(raw, &Rfc3339)
                .map(AttributeValue::Timestamp)
                .map_err(|e| invalid(e.to_string())),
        }
    }

    /// Leaf encoding of the value
    pub fn encode(&self) -> Vec<u8> {
        match self {
            AttributeValue::Integer(value) => value.to_be_bytes().to_vec(),
            AttributeValue::Decimal(value) => value.to_string().into_bytes(),
            AttributeValue::String(value) => value.as_bytes().to_vec(),
            AttributeValue::Bytes(value) => value.clone(),
            AttributeValue::Timestamp(value) => value.unix_timestamp_nanos().to_be_bytes().to_vec(),
        }
    }

    pub fn as_integer(&self) -> Option<i128> {
        match self {
            AttributeValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(value) => Some(value),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Integer(value) => write!(f, "{}", value),
            AttributeValue::Decimal(value) => write!(f, "{}", value),
            AttributeValue::String(value) => write!(f, "{}", value),
            AttributeValue::Bytes(value) => write!(f, "0x{}", hex::encode(value)),
            AttributeValue::Timestamp(value) => match value.format(&Rfc3339) {
                Ok(formatted) => write!(f, "{}", formatted),
                Err(_) => write!(f, "{}", value),
            },
        }
    }
}

/// A labelled, typed value stored on a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: AttrKey,
    pub label: String,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn new(label: impl Into<String>, value: AttributeValue) -> Result<Self, DocumentError> {
        let label = label.into();
        Ok(Self {
            key: AttrKey::from_label(&label)?,
            label,
            value,
        })
    }

    /// Build an attribute from the textual form of its value
    pub fn parse(label: impl Into<String>, attr_type: AttributeType, raw: &str) -> Result<Self, DocumentError> {
        Self::new(label, AttributeValue::parse(attr_type, raw)?)
    }

    pub fn attr_type(&self) -> AttributeType {
        self.value.attr_type()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_key_is_sha256_of_label() {
        let attr = Attribute::parse("invoice_total", AttributeType::Integer, "42").unwrap();
        assert_eq!(attr.key, AttrKey::from(sha256(b"invoice_total")));
        assert!(matches!(AttrKey::from_label(""), Err(DocumentError::EmptyLabel)));
    }

    #[test]
    fn test_parse_each_type() {
        assert_eq!(
            AttributeValue::parse(AttributeType::Integer, "-17").unwrap(),
            AttributeValue::Integer(-17)
        );
        assert_eq!(
            AttributeValue::parse(AttributeType::Decimal, "-1.050").unwrap(),
            AttributeValue::Decimal(Decimal::new(-105, 2))
        );
        assert_eq!(
            AttributeValue::parse(AttributeType::Bytes, "0xdead").unwrap(),
            AttributeValue::Bytes(vec![0xde, 0xad])
        );
        let ts = AttributeValue::parse(AttributeType::Timestamp, "2024-02-29T12:00:00Z").unwrap();
        assert_eq!(ts.to_string(), "2024-02-29T12:00:00Z");
    }

    #[test]
    fn test_shape_mismatch() {
        for (ty, raw) in [
            (AttributeType::Decimal, "abc"),
            (AttributeType::Decimal, "1.2.3"),
            (AttributeType::Decimal, "."),
            (AttributeType::Integer, "1.5"),
            (AttributeType::Bytes, "xyz"),
            (AttributeType::Timestamp, "yesterday"),
        ] {
            assert!(
                matches!(
                    AttributeValue::parse(ty, raw),
                    Err(DocumentError::NotValidAttributeType { .. })
                ),
                "{} {:?}",
                ty,
                raw
            );
        }
    }

    #[test]
    fn test_decimal_display() {
        for raw in ["0.05", "-12.34", "7", "-0.5", "100"] {
            assert_eq!(raw.parse::<Decimal>().unwrap().to_string(), raw);
        }
        assert_eq!(".5".parse::<Decimal>().unwrap().to_string(), "0.5");
    }

    #[test]
    fn test_decimal_trailing_zeros_are_dropped() {
        let short: Decimal = "1.5".parse().unwrap();
        let long: Decimal = "1.50".parse().unwrap();
        assert_eq!(short, long);
        assert_eq!((long.mantissa(), long.scale()), (15, 1));
        assert_eq!(
            AttributeValue::Decimal(short).encode(),
            AttributeValue::Decimal(long).encode()
        );
        assert_eq!(Decimal::new(1500, 3), short);

        for zero in ["-0", "0.000", "-0.0"] {
            let value: Decimal = zero.parse().unwrap();
            assert_eq!(value, Decimal::new(0, 0));
            assert_eq!(value.to_string(), "0");
        }
    }

    #[test]
    fn test_type_names() {
        for ty in [
            AttributeType::Integer,
            AttributeType::Decimal,
            AttributeType::String,
            AttributeType::Bytes,
            AttributeType::Timestamp,
        ] {
            assert_eq!(ty.to_string().parse::<AttributeType>().unwrap(), ty);
        }
        assert!("float".parse::<AttributeType>().is_err());
    }
}
