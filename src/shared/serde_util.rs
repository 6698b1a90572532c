//! Custom serde helpers for the venue's wire formats.

use serde::{Deserialize, Deserializer};

/// Deserializes `null` (or a missing field, with `#[serde(default)]`) as
/// `T::default()`.
///
/// The venue sends `null` for amounts that have not moved yet, e.g.
/// `"dealt_amount": null` on a fresh order.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Timestamps that arrive as RFC 3339 strings, naive ISO strings (taken as
/// UTC), or epoch numbers.
///
/// Numbers below `1e11` are epoch seconds (fractions allowed), anything larger
/// is epoch milliseconds.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    const MILLIS_THRESHOLD: f64 = 1e11;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Raw::deserialize(deserializer)?;
        parse(raw).map_err(serde::de::Error::custom)
    }

    fn parse(raw: Raw) -> Result<DateTime<Utc>, String> {
        match raw {
            Raw::Number(n) => {
                let millis = if n.abs() < MILLIS_THRESHOLD {
                    (n * 1000.0).round() as i64
                } else {
                    n.round() as i64
                };
                DateTime::<Utc>::from_timestamp_millis(millis)
                    .ok_or_else(|| format!("Invalid timestamp: {}", n))
            }
            Raw::Text(s) => {
                if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
                    return Ok(dt.with_timezone(&Utc));
                }
                NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f")
                    .or_else(|_| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f"))
                    .map(|naive| naive.and_utc())
                    .map_err(|e| format!("Invalid timestamp {:?}: {}", s, e))
            }
        }
    }

    /// Same formats, with `null` as `None`.
    pub mod option {
        use super::{parse, Raw};
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer};

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<Raw>::deserialize(deserializer)? {
                Some(raw) => parse(raw).map(Some).map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}
