//! Serde helpers for configuration values

/// Durations as integer seconds, or as a string with a unit suffix
///
/// Accepts `30`, `"30s"`, `"250ms"` and `"2m"`. Whole seconds are written
/// back as plain integers, anything finer as milliseconds.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Timeouts {
///     #[serde(with = "tw_core::config::serde_utils::duration")]
///     create: Duration,
/// }
/// ```
pub mod duration {
    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;
    use std::fmt;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_u64(duration.as_secs())
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DurationVisitor)
    }

    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("seconds as an integer, or a string like \"250ms\", \"30s\", \"2m\"")
        }

        fn visit_u64<E: de::Error>(self, secs: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(secs))
        }

        fn visit_i64<E: de::Error>(self, secs: i64) -> Result<Duration, E> {
            u64::try_from(secs)
                .map(Duration::from_secs)
                .map_err(|_| E::custom("duration must not be negative"))
        }

        fn visit_str<E: de::Error>(self, s: &str) -> Result<Duration, E> {
            parse(s).ok_or_else(|| E::invalid_value(de::Unexpected::Str(s), &self))
        }
    }

    fn parse(s: &str) -> Option<Duration> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);
        let n: u64 = digits.parse().ok()?;
        match unit.trim() {
            "" | "s" => Some(Duration::from_secs(n)),
            "ms" => Some(Duration::from_millis(n)),
            "m" => n.checked_mul(60).map(Duration::from_secs),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct TestConfig {
        #[serde(with = "duration")]
        timeout: Duration,
    }

    fn parse(value: &str) -> Result<Duration, toml::de::Error> {
        toml::from_str::<TestConfig>(&format!("timeout = {}", value)).map(|c| c.timeout)
    }

    #[test]
    fn test_duration_accepts_integers_and_units() {
        assert_eq!(parse("60").unwrap(), Duration::from_secs(60));
        assert_eq!(parse("\"45s\"").unwrap(), Duration::from_secs(45));
        assert_eq!(parse("\"250ms\"").unwrap(), Duration::from_millis(250));
        assert_eq!(parse("\"2m\"").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn test_duration_rejects_garbage() {
        assert!(parse("-5").is_err());
        assert!(parse("\"soon\"").is_err());
        assert!(parse("\"5h\"").is_err());
    }

    #[test]
    fn test_duration_serialize() {
        let whole = TestConfig {
            timeout: Duration::from_secs(30),
        };
        assert_eq!(toml::to_string(&whole).unwrap().trim(), "timeout = 30");

        let fine = TestConfig {
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(toml::to_string(&fine).unwrap().trim(), "timeout = \"1500ms\"");
    }
}
