//! Decision stamps for reproducibility checks.
//!
//! A stamp records which brain version, which rule set and which context
//! produced a decision. Hashes are 64-bit FNV-1a over a canonical JSON
//! rendering: object keys are sorted and array elements are sorted by their
//! own canonical rendering, so the fingerprint does not depend on input
//! order. This is a fingerprint, not an authenticated digest; collisions are
//! possible and tolerated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version of the decision logic, bumped with the crate.
pub const BRAIN_VERSION: &str = env!("CARGO_PKG_VERSION");

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Provenance attached to every decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecisionStamp {
    pub brain_version: String,
    pub rules_hash: String,
    pub decision_context_hash: String,
    pub decision_timestamp: DateTime<Utc>,
}

impl DecisionStamp {
    /// Same version, rules and context. Timestamps are ignored.
    pub fn is_reproducible_with(&self, other: &DecisionStamp) -> bool {
        compare(self, other).reproducible
    }
}

/// Field-by-field comparison of two stamps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReproducibilityReport {
    pub version_matches: bool,
    pub rules_match: bool,
    pub context_matches: bool,
    pub reproducible: bool,
}

/// Stamp a decision made under `rules` with `context` at `now`.
pub fn stamp<R, C>(rules: &R, context: &C, now: DateTime<Utc>) -> DecisionStamp
where
    R: Serialize + ?Sized,
    C: Serialize + ?Sized,
{
    DecisionStamp {
        brain_version: BRAIN_VERSION.to_string(),
        rules_hash: fingerprint(rules),
        decision_context_hash: fingerprint(context),
        decision_timestamp: now,
    }
}

/// Order-independent fingerprint of any serializable value, as 16 hex chars.
///
/// Values that fail to serialize hash as JSON `null`.
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> String {
    let value = serde_json::to_value(value).unwrap_or(Value::Null);
    format!("{:016x}", fnv1a(canonical_json(&value).as_bytes()))
}

/// Compare two stamps. Mismatches are logged and never treated as errors.
pub fn compare(a: &DecisionStamp, b: &DecisionStamp) -> ReproducibilityReport {
    let version_matches = a.brain_version == b.brain_version;
    let rules_match = a.rules_hash == b.rules_hash;
    let context_matches = a.decision_context_hash == b.decision_context_hash;
    let reproducible = version_matches && rules_match && context_matches;

    if !reproducible {
        tracing::info!(
            version_matches,
            rules_match,
            context_matches,
            "decision not reproducible"
        );
    }

    ReproducibilityReport {
        version_matches,
        rules_match,
        context_matches,
        reproducible,
    }
}

/// Render JSON with sorted keys and sorted array elements.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) => {
            let mut rendered: Vec<String> = items.iter().map(canonical_json).collect();
            rendered.sort();
            format!("[{}]", rendered.join(","))
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", quote(k), canonical_json(v)))
                .collect();
            format!("{{{}}}", body.join(","))
        }
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}
