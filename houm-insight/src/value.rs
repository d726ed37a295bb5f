//! Numbers as the store hands them back, and their conversion into report values.
//!
//! Executors return [`StoreNumber`]s so that fixed-precision decimals survive
//! until the estimator turns them into plain `f64`s at the report boundary.

use serde_json::Value;

/// Maximum decimal scale accepted when parsing decimal text.
const MAX_DECIMAL_SCALE: usize = 38;

/// A numeric value produced by a query executor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoreNumber {
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    /// Fixed-precision decimal: `unscaled * 10^-scale`.
    Decimal { unscaled: i128, scale: i8 },
}

impl StoreNumber {
    /// Converts to a value that can be represented in a JSON report.
    ///
    /// Returns `None` for NaN and infinities.
    pub fn to_report(self) -> Option<f64> {
        let value = match self {
            StoreNumber::Integer(v) => v as f64,
            StoreNumber::Unsigned(v) => v as f64,
            StoreNumber::Float(v) => v,
            StoreNumber::Decimal { unscaled, scale } => {
                unscaled as f64 / 10f64.powi(i32::from(scale))
            }
        };
        value.is_finite().then_some(value)
    }

    /// Reads a number out of a JSON cell.
    ///
    /// Accepts JSON numbers and numeric text; integral text becomes
    /// [`StoreNumber::Integer`] and text with a fraction becomes
    /// [`StoreNumber::Decimal`].
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Some(StoreNumber::Integer(v))
                } else if let Some(v) = n.as_u64() {
                    Some(StoreNumber::Unsigned(v))
                } else {
                    n.as_f64().map(StoreNumber::Float)
                }
            }
            Value::String(s) => Self::parse_text(s),
            _ => None,
        }
    }

    /// Parses decimal text such as `"4500000"`, `"-12.50"` or `"1e6"`.
    pub fn parse_text(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Some(decimal) = Self::parse_plain_decimal(text) {
            return Some(decimal);
        }
        text.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(StoreNumber::Float)
    }

    fn parse_plain_decimal(text: &str) -> Option<Self> {
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let (whole, fraction) = match digits.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (digits, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }
        if !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
            || fraction.len() > MAX_DECIMAL_SCALE
        {
            return None;
        }

        let mut unscaled: i128 = 0;
        for b in whole.bytes().chain(fraction.bytes()) {
            unscaled = unscaled
                .checked_mul(10)?
                .checked_add(i128::from(b - b'0'))?;
        }
        if negative {
            unscaled = -unscaled;
        }

        if fraction.is_empty() {
            i64::try_from(unscaled).ok().map(StoreNumber::Integer)
        } else {
            Some(StoreNumber::Decimal {
                unscaled,
                scale: fraction.len() as i8,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decimal_conversion() {
        let price = StoreNumber::Decimal {
            unscaled: 450_000_050,
            scale: 2,
        };
        assert_eq!(price.to_report(), Some(4_500_000.5));
        assert_eq!(StoreNumber::Integer(-3).to_report(), Some(-3.0));
        assert_eq!(StoreNumber::Float(f64::NAN).to_report(), None);
        assert_eq!(StoreNumber::Float(f64::INFINITY).to_report(), None);
    }

    #[test]
    fn test_from_json_numbers() {
        assert_eq!(
            StoreNumber::from_json(&json!(2500000)),
            Some(StoreNumber::Integer(2_500_000))
        );
        assert_eq!(
            StoreNumber::from_json(&json!(3.5)),
            Some(StoreNumber::Float(3.5))
        );
        assert_eq!(
            StoreNumber::from_json(&json!(u64::MAX)),
            Some(StoreNumber::Unsigned(u64::MAX))
        );
        assert_eq!(StoreNumber::from_json(&json!(null)), None);
        assert_eq!(StoreNumber::from_json(&json!(true)), None);
    }

    #[test]
    fn test_from_json_text() {
        assert_eq!(
            StoreNumber::from_json(&json!("1999")),
            Some(StoreNumber::Integer(1999))
        );
        assert_eq!(
            StoreNumber::from_json(&json!(" -12.50 ")),
            Some(StoreNumber::Decimal {
                unscaled: -1250,
                scale: 2
            })
        );
        assert_eq!(
            StoreNumber::from_json(&json!("1e3")),
            Some(StoreNumber::Float(1000.0))
        );
        assert_eq!(StoreNumber::from_json(&json!("abc")), None);
        assert_eq!(StoreNumber::from_json(&json!("")), None);
        assert_eq!(StoreNumber::from_json(&json!(".")), None);
        assert_eq!(StoreNumber::from_json(&json!("NaN")), None);
    }
}
