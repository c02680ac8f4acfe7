use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Literal stored in `lastTested` for a connection that was never tested
pub const NEVER_TESTED: &str = "Never";

/// Current time truncated to milliseconds, the precision of the persisted format
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Current time, bumped past `previous` when the clock has not moved forward
pub fn after(previous: DateTime<Utc>) -> DateTime<Utc> {
    let current = now();
    if current > previous {
        current
    } else {
        previous + Duration::milliseconds(1)
    }
}

/// Format a timestamp as ISO-8601 with millisecond precision and a `Z` suffix
pub fn format(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO-8601 / RFC 3339 timestamp
pub fn parse(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc).trunc_subsecs(3))
}

/// Serde adapter for `DateTime<Utc>` fields stored as ISO-8601 strings
pub mod iso8601 {
    use super::*;

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid ISO-8601 timestamp: {}", raw)))
    }
}

/// When a connection was last tested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastTested {
    #[default]
    Never,
    At(DateTime<Utc>),
}

impl LastTested {
    pub fn at(&self) -> Option<DateTime<Utc>> {
        match self {
            LastTested::Never => None,
            LastTested::At(at) => Some(*at),
        }
    }

    /// Next test timestamp, strictly later than this one
    pub fn next(&self) -> Self {
        match self {
            LastTested::Never => LastTested::At(now()),
            LastTested::At(previous) => LastTested::At(after(*previous)),
        }
    }

    /// Lenient parse used when sanitizing stored records; anything unreadable is `Never`
    pub fn parse_lenient(value: &str) -> Self {
        parse(value).map(LastTested::At).unwrap_or(LastTested::Never)
    }
}

impl Serialize for LastTested {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LastTested::Never => serializer.serialize_str(NEVER_TESTED),
            LastTested::At(at) => serializer.serialize_str(&format(at)),
        }
    }
}

impl<'de> Deserialize<'de> for LastTested {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == NEVER_TESTED {
            return Ok(LastTested::Never);
        }
        parse(&raw)
            .map(LastTested::At)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid lastTested value: {}", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_uses_millis_and_zulu() {
        let ts = parse("2024-05-01T10:20:30.123456Z").unwrap();
        assert_eq!(format(&ts), "2024-05-01T10:20:30.123Z");
    }

    #[test]
    fn test_after_is_strictly_later() {
        let future = now() + Duration::seconds(60);
        assert_eq!(after(future), future + Duration::milliseconds(1));

        let past = now() - Duration::seconds(60);
        assert!(after(past) > past);
    }

    #[test]
    fn test_last_tested_serialization() {
        let never = serde_json::to_string(&LastTested::Never).unwrap();
        assert_eq!(never, "\"Never\"");

        let at = LastTested::At(parse("2024-01-02T03:04:05.006Z").unwrap());
        let json = serde_json::to_string(&at).unwrap();
        assert_eq!(json, "\"2024-01-02T03:04:05.006Z\"");
        assert_eq!(serde_json::from_str::<LastTested>(&json).unwrap(), at);
    }

    #[test]
    fn test_last_tested_next_increases() {
        let first = LastTested::Never.next();
        let second = first.next();
        assert!(second.at().unwrap() > first.at().unwrap());
    }

    #[test]
    fn test_parse_lenient() {
        assert_eq!(LastTested::parse_lenient("Nunca"), LastTested::Never);
        assert!(LastTested::parse_lenient("2024-01-02T03:04:05Z").at().is_some());
    }
}
