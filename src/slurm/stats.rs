use std::collections::BTreeMap;
use std::time::Duration;

use color_eyre::eyre::bail;
use color_eyre::Result;
use serde::Serialize;

use crate::cache::CacheValue;
use crate::utilities::split_first;

use super::command;

/// Sections after which `sdiag` only prints per-RPC breakdowns, which are not collected
const RPC_SECTIONS: [&[u8]; 2] = [b"Remote Procedure Call statistics", b"Pending RPC statistics"];

/// Scheduler diagnostics as reported by `sdiag`, keyed by snake_case names.
/// Values nested below a section are prefixed by the section, e.g. `schedule_last_cycle`
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Statistics {
    pub values: BTreeMap<String, String>,
}

impl CacheValue for Statistics {
    fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Statistics {
    /// Calls `sdiag` and collects its counters
    pub fn collect(exe: &str, timeout: Duration) -> Result<Statistics> {
        let output = command::run(exe, &[], timeout)?;
        let statistics = Self::parse(&output);
        if statistics.is_empty() {
            bail!("no statistics found in {:?} output", exe);
        }

        Ok(statistics)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.as_str())
    }

    /// Returns the leading integer of a value, e.g. `20` for `20 microseconds`
    pub fn count(&self, key: &str) -> Option<u64> {
        let value = self.get(key)?;
        let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();

        digits.parse().ok()
    }

    pub fn parse(output: &[u8]) -> Statistics {
        let mut values = BTreeMap::new();
        let mut section: Option<String> = None;

        for line in output.split(|&c| c == b'\n') {
            let indented = line.first().is_some_and(|c| c.is_ascii_whitespace());
            let trimmed = line.trim_ascii();
            if trimmed.is_empty() || trimmed.iter().all(|&c| c == b'*') {
                continue;
            }

            if !indented && RPC_SECTIONS.iter().any(|s| trimmed.starts_with(s)) {
                break;
            }

            // The header lines contain timestamps and hence colons of their own
            if let Some(rest) = trimmed.strip_prefix(b"sdiag output at") {
                values.insert("server_time".to_string(), text(rest));
                continue;
            } else if let Some(rest) = trimmed.strip_prefix(b"Data since") {
                values.insert("data_since".to_string(), text(rest));
                continue;
            }

            match split_key_value(trimmed) {
                Some((key, value)) if !value.trim_ascii().is_empty() => {
                    if !indented {
                        section = None;
                    }

                    let key = match &section {
                        Some(section) => format!("{}_{}", section, slug(key)),
                        None => slug(key),
                    };

                    values.insert(key, text(value));
                }
                // Section headers either lack a value or end with a colon
                Some((key, _)) => section = Some(section_name(key)),
                None => section = Some(section_name(trimmed)),
            }
        }

        Statistics { values }
    }
}

/// Splits at the first colon outside parentheses; headers such as
/// `Backfilling stats (WARNING: ...)` carry colons inside their annotations
fn split_key_value(line: &[u8]) -> Option<(&[u8], &[u8])> {
    let mut depth = 0usize;
    for (index, &c) in line.iter().enumerate() {
        match c {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b':' if depth == 0 => return Some((&line[..index], &line[index + 1..])),
            _ => {}
        }
    }

    None
}

fn text(value: &[u8]) -> String {
    String::from_utf8_lossy(value.trim_ascii()).into_owned()
}

/// Converts e.g. `Jobs submitted` to `jobs_submitted`
fn slug(key: &[u8]) -> String {
    let mut slug = String::new();
    for c in String::from_utf8_lossy(key).chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }

    slug.trim_end_matches('_').to_string()
}

fn section_name(header: &[u8]) -> String {
    // Drop units such as `(microseconds)`
    let header = split_first(header, b'(').map_or(header, |(name, _)| name);

    match slug(header).as_str() {
        "main_schedule_statistics" => "schedule".to_string(),
        "backfilling_stats" => "backfill".to_string(),
        other => other.to_string(),
    }
}
