//! Watch-target list parsing.
//!
//! Three JSON shapes are accepted and normalized into one `Vec<WatchTarget>`:
//!
//! - `{"targets": [ {..}, .. ]}`
//! - `{"<id>": {..}, ..}` (keys become fallback ids, in key order)
//! - `[ {..}, .. ]`
//!
//! Anything else, including an empty collection, is rejected.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PixguardError;

/// One normalized watch target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchTarget {
    /// Unique target id.
    pub id: String,
    /// Display label; defaults to the id.
    pub label: String,
    /// Origin of the watched area, as the collaborator's coordinate string.
    pub origin: String,
    /// Reference template path or name.
    pub template: String,
    /// Evaluation interval.
    pub interval: Duration,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTarget {
    id: String,
    label: String,
    origin: String,
    template: String,
    template_path: String,
    interval_seconds: i64,
    interval: i64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TargetDocument {
    Wrapped { targets: Vec<RawTarget> },
    Keyed(BTreeMap<String, RawTarget>),
    Listed(Vec<RawTarget>),
}

fn invalid_format() -> PixguardError {
    PixguardError::InvalidArg("targets json format is invalid".into())
}

fn normalize(
    fallback_id: &str,
    raw: RawTarget,
    default_interval: Duration,
) -> Result<WatchTarget, PixguardError> {
    let label = raw.label.trim().to_owned();
    let mut id = raw.id.trim().to_owned();
    if id.is_empty() {
        id = fallback_id.trim().to_owned();
    }
    if id.is_empty() {
        id.clone_from(&label);
    }
    if id.is_empty() {
        return Err(PixguardError::InvalidArg("target id is empty".into()));
    }
    let label = if label.is_empty() { id.clone() } else { label };

    let origin = raw.origin.trim().to_owned();
    let mut template = raw.template.trim().to_owned();
    if template.is_empty() {
        template = raw.template_path.trim().to_owned();
    }
    if origin.is_empty() || template.is_empty() {
        return Err(PixguardError::InvalidArg(format!(
            "target {id} missing origin/template"
        )));
    }

    let secs = if raw.interval_seconds > 0 {
        raw.interval_seconds
    } else {
        raw.interval
    };
    let interval = u64::try_from(secs)
        .ok()
        .filter(|s| *s > 0)
        .map_or(default_interval, Duration::from_secs);

    Ok(WatchTarget {
        id,
        label,
        origin,
        template,
        interval,
    })
}

/// Parse a watch-target list in any accepted shape.
///
/// # Errors
/// Returns `InvalidArg` for unknown shapes, empty collections, targets without an
/// id, origin or template.
pub fn parse_targets(
    raw: &str,
    default_interval: Duration,
) -> Result<Vec<WatchTarget>, PixguardError> {
    let doc: TargetDocument = serde_json::from_str(raw).map_err(|_| invalid_format())?;
    let entries: Vec<(String, RawTarget)> = match doc {
        TargetDocument::Wrapped { targets } | TargetDocument::Listed(targets) => targets
            .into_iter()
            .enumerate()
            .map(|(i, t)| (i.to_string(), t))
            .collect(),
        TargetDocument::Keyed(map) => map.into_iter().collect(),
    };
    if entries.is_empty() {
        return Err(invalid_format());
    }
    entries
        .into_iter()
        .map(|(fallback, t)| normalize(&fallback, t, default_interval))
        .collect()
}
