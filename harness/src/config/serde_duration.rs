//! Durations appear in the config file as a plain number of milliseconds.

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

pub mod opt {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;

        Ok(millis.map(Duration::from_millis))
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }
}
