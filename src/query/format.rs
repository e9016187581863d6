//! Read-time value formats.
//!
//! Formats are applied when results are displayed or exported. They never
//! alter the values a query returns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormatSpec {
    #[default]
    Plain,
    Number {
        decimals: u8,
    },
    Currency {
        symbol: String,
        decimals: u8,
    },
    /// Fraction rendered as a percentage (`0.25` is `25%`).
    Percent {
        decimals: u8,
    },
    /// Short form with K/M/B suffixes.
    Compact,
}

impl FormatSpec {
    pub fn apply(&self, value: &Value) -> String {
        let number = value.as_f64();
        match (self, number) {
            (_, None) | (FormatSpec::Plain, _) => plain(value),
            (FormatSpec::Number { decimals }, Some(n)) => {
                with_grouping(&format!("{:.*}", *decimals as usize, n))
            }
            (FormatSpec::Currency { symbol, decimals }, Some(n)) => {
                let body = with_grouping(&format!("{:.*}", *decimals as usize, n.abs()));
                if n < 0.0 {
                    format!("-{}{}", symbol, body)
                } else {
                    format!("{}{}", symbol, body)
                }
            }
            (FormatSpec::Percent { decimals }, Some(n)) => {
                format!("{:.*}%", *decimals as usize, n * 100.0)
            }
            (FormatSpec::Compact, Some(n)) => compact(n),
        }
    }
}

/// Unformatted display text for a result value.
pub fn plain(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) => {
                let mut buf = ryu::Buffer::new();
                buf.format(f).to_string()
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Short form: `1500` becomes `1.5K`, `2000000` becomes `2M`.
pub fn compact(n: f64) -> String {
    let abs = n.abs();
    let (scaled, suffix) = if abs >= 1e9 {
        (n / 1e9, "B")
    } else if abs >= 1e6 {
        (n / 1e6, "M")
    } else if abs >= 1e3 {
        (n / 1e3, "K")
    } else {
        (n, "")
    };
    let text = format!("{:.1}", scaled);
    let text = text.strip_suffix(".0").unwrap_or(&text);
    format!("{}{}", text, suffix)
}

fn with_grouping(fixed: &str) -> String {
    let (sign, rest) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed),
    };
    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (rest, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match frac_part {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}
