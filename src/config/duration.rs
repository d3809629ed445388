//! Duration strings used in configuration files (`"2s"`, `"500ms"`, `"555ns"`).

use regex::Regex;
use serde::{Deserialize, Deserializer, Serializer};
use std::sync::OnceLock;
use std::time::Duration;

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*(\d+)\s*(ns|us|µs|ms|s|m|h)\s*$").expect("duration pattern is valid")
    })
}

/// Parse a duration like `"1500ms"` or `"2s"`.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let captures = duration_pattern().captures(value)?;
    let amount: u64 = captures[1].parse().ok()?;

    let duration = match &captures[2] {
        "ns" => Duration::from_nanos(amount),
        "us" | "µs" => Duration::from_micros(amount),
        "ms" => Duration::from_millis(amount),
        "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount.checked_mul(60)?),
        "h" => Duration::from_secs(amount.checked_mul(3600)?),
        _ => return None,
    };

    Some(duration)
}

/// Render a duration in its most compact exact unit.
pub fn format_duration(duration: &Duration) -> String {
    let nanos = duration.as_nanos();

    if nanos == 0 {
        "0s".to_string()
    } else if nanos % 1_000_000_000 == 0 {
        format!("{}s", nanos / 1_000_000_000)
    } else if nanos % 1_000_000 == 0 {
        format!("{}ms", nanos / 1_000_000)
    } else if nanos % 1_000 == 0 {
        format!("{}us", nanos / 1_000)
    } else {
        format!("{}ns", nanos)
    }
}

/// Serde adapter for `Option<Duration>` fields.
pub mod option {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;

        match raw {
            None => Ok(None),
            Some(value) => parse_duration(&value).map(Some).ok_or_else(|| {
                serde::de::Error::custom(format!(
                    "invalid duration '{}', expected a number followed by ns, us, ms, s, m or h",
                    value
                ))
            }),
        }
    }

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_str(&format_duration(duration)),
            None => serializer.serialize_none(),
        }
    }
}
