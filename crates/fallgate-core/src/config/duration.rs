//! Serde helpers for durations in configuration files.
//!
//! Accepts humantime strings (`"500ms"`, `"1m 30s"`) or plain numbers of
//! seconds. Serializes back to humantime strings.

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(f64),
    Text(String),
}

fn convert<E: serde::de::Error>(raw: RawDuration) -> Result<Duration, E> {
    match raw {
        RawDuration::Seconds(secs) => {
            Duration::try_from_secs_f64(secs)
                .map_err(|e| E::custom(format!("invalid duration: {} seconds ({})", secs, e)))
        }
        RawDuration::Text(text) => humantime::parse_duration(text.trim())
            .map_err(|e| E::custom(format!("invalid duration '{}': {}", text, e))),
    }
}

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    convert(RawDuration::deserialize(deserializer)?)
}

/// Same as the parent module, for `Option<Duration>` fields.
pub mod option {
    use super::{convert, RawDuration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => super::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<RawDuration>::deserialize(deserializer)?
            .map(convert)
            .transpose()
    }
}
