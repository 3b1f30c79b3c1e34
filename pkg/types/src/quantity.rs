use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A platform-native resource quantity such as `500m`, `1.5`, `2Gi` or `1e3`.
///
/// The original string is preserved for serialization; equality compares the
/// numeric value so that `1` and `1.0` describe the same quantity.
#[derive(Debug, Clone)]
pub struct Quantity(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity is empty")]
    Empty,
    #[error("invalid number in quantity '{0}'")]
    InvalidNumber(String),
    #[error("unknown suffix '{suffix}' in quantity '{value}'")]
    UnknownSuffix { value: String, suffix: String },
    #[error("quantity '{0}' must not be negative")]
    Negative(String),
}

impl Quantity {
    /// Parse and validate a quantity string. Negative quantities are rejected.
    pub fn parse(s: &str) -> Result<Self, QuantityError> {
        parse_value(s)?;
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value in base units (cores for CPU, bytes for memory and storage).
    pub fn value(&self) -> f64 {
        parse_value(&self.0).unwrap_or(0.0)
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        match (parse_value(&self.0), parse_value(&other.0)) {
            (Ok(a), Ok(b)) => a == b,
            _ => self.0 == other.0,
        }
    }
}

impl std::str::FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

// Observed objects may carry quantities the server canonicalized; keep them as-is.
impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Quantity)
    }
}

/// Parse `<signed number><suffix>` into a value in base units.
fn parse_value(input: &str) -> Result<f64, QuantityError> {
    if input.is_empty() {
        return Err(QuantityError::Empty);
    }

    let (negative, rest) = match input.as_bytes()[0] {
        b'-' => (true, &input[1..]),
        b'+' => (false, &input[1..]),
        _ => (false, input),
    };

    let number_end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let (number, suffix) = rest.split_at(number_end);

    if !number.chars().any(|c| c.is_ascii_digit()) || number.matches('.').count() > 1 {
        return Err(QuantityError::InvalidNumber(input.to_string()));
    }
    let mantissa: f64 = number
        .parse()
        .map_err(|_| QuantityError::InvalidNumber(input.to_string()))?;

    let value = match suffix_scale(input, suffix)? {
        Scale::Binary(multiplier) => mantissa * multiplier,
        Scale::Decimal(exponent) if exponent >= 0 => mantissa * 10f64.powi(exponent),
        Scale::Decimal(exponent) => mantissa / 10f64.powi(-exponent),
    };

    if negative && value != 0.0 {
        return Err(QuantityError::Negative(input.to_string()));
    }
    Ok(value)
}

enum Scale {
    Binary(f64),
    Decimal(i32),
}

fn suffix_scale(input: &str, suffix: &str) -> Result<Scale, QuantityError> {
    let unknown = || QuantityError::UnknownSuffix {
        value: input.to_string(),
        suffix: suffix.to_string(),
    };
    let scale = match suffix {
        "" => Scale::Decimal(0),
        "n" => Scale::Decimal(-9),
        "u" => Scale::Decimal(-6),
        "m" => Scale::Decimal(-3),
        "k" => Scale::Decimal(3),
        "M" => Scale::Decimal(6),
        "G" => Scale::Decimal(9),
        "T" => Scale::Decimal(12),
        "P" => Scale::Decimal(15),
        "E" => Scale::Decimal(18),
        "Ki" => Scale::Binary(1024f64),
        "Mi" => Scale::Binary(1024f64.powi(2)),
        "Gi" => Scale::Binary(1024f64.powi(3)),
        "Ti" => Scale::Binary(1024f64.powi(4)),
        "Pi" => Scale::Binary(1024f64.powi(5)),
        "Ei" => Scale::Binary(1024f64.powi(6)),
        s if s.starts_with('e') || s.starts_with('E') => {
            Scale::Decimal(s[1..].parse().map_err(|_| unknown())?)
        }
        _ => return Err(unknown()),
    };
    Ok(scale)
}
