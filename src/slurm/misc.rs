//! Deserialization helpers for the JSON emitted by `scontrol --json` and `squeue --json`.
//!
//! The shape of several values differs between Slurm releases: numbers may be
//! bare or wrapped in `{"set": .., "infinite": .., "number": ..}` objects, and
//! states may be a single string or a list of flags. Values of any other shape
//! decode to the field's default rather than failing the whole record.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum SlurmNumber {
    Bare(i64),
    Wrapped {
        #[serde(default)]
        set: bool,
        #[serde(default)]
        infinite: bool,
        #[serde(default)]
        number: Option<i64>,
    },
    Other(IgnoredAny),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<String>),
    One(String),
    Number(i64),
    Other(IgnoredAny),
}

/// Deserializes a possibly wrapped number; unset, infinite and null values become `None`
pub fn optional_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<SlurmNumber> = Deserialize::deserialize(deserializer)?;

    Ok(match value {
        Some(SlurmNumber::Bare(number)) => Some(number),
        Some(SlurmNumber::Wrapped {
            set: true,
            infinite: false,
            number,
        }) => number,
        Some(SlurmNumber::Other(_)) => {
            tracing::debug!("ignoring malformed number");
            None
        }
        _ => None,
    })
}

/// Deserializes a possibly wrapped number, defaulting to zero
pub fn number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_number(deserializer)?.unwrap_or(0))
}

/// Deserializes either a list of strings or a single comma-separated string;
/// a bare number becomes a single entry
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<OneOrMany> = Deserialize::deserialize(deserializer)?;

    Ok(match value {
        Some(OneOrMany::Many(values)) => values,
        Some(OneOrMany::One(value)) => value
            .split(',')
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
            .collect(),
        Some(OneOrMany::Number(value)) => vec![value.to_string()],
        Some(OneOrMany::Other(_)) => {
            tracing::debug!("ignoring malformed list");
            Vec::new()
        }
        None => Vec::new(),
    })
}

/// Deserializes a state given either as a string or as a list of flags,
/// e.g. `["IDLE", "DRAIN"]` becomes `IDLE+DRAIN`
pub fn state<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<OneOrMany> = Deserialize::deserialize(deserializer)?;

    Ok(match value {
        Some(OneOrMany::Many(values)) => values.join("+"),
        Some(OneOrMany::One(value)) => value,
        Some(OneOrMany::Number(value)) => value.to_string(),
        Some(OneOrMany::Other(_)) => {
            tracing::debug!("ignoring malformed state");
            String::new()
        }
        None => String::new(),
    })
}
