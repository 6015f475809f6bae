//! tally-config
//!
//! Layered YAML configuration.
//!
//! - Documents merge left to right; later documents override earlier ones
//! - The merged document is rendered as canonical JSON and hashed (SHA-256)
//! - Literal secrets are rejected; YAML carries env var NAMES only
//! - Leaves no consumer reads are reported as unused
//!
//! [`TallyConfig`] is the typed view consumers work with. Device passwords
//! are resolved separately through [`secrets`].

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

pub mod secrets;
mod settings;

pub use settings::*;

/// Leaf strings starting with any of these abort the load.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",
    "sk_live",
    "sk_test",
    "AKIA",
    "-----BEGIN",
    "ghp_",
    "gho_",
    "glpat-",
    "xoxb-",
    "xoxp-",
];

/// JSON-pointer prefixes read by [`TallyConfig`]. A leaf under any of these
/// counts as consumed.
pub const CONSUMED_POINTERS: &[&str] = &[
    "/timezone",
    "/reconcile/previous_day_cutoff",
    "/reconcile/late_checkout_cutoff",
    "/reconcile/inferred_check_in",
    "/reconcile/bulk_duplicate_window_secs",
    "/reconcile/ledger_horizon_hours",
    "/device/timeout_secs",
    "/device/page_size",
    "/device/timezone",
    "/directory",
    "/daemon/bind_addr",
];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}")))
        .collect::<Result<Vec<_>>>()?;
    let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for (i, raw) in yaml_docs.iter().enumerate() {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("invalid yaml (layer {i})"))?;
        // An empty document is YAML null; it overrides nothing.
        if doc.is_null() {
            continue;
        }
        let doc = serde_json::to_value(doc).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, doc);
    }

    reject_secret_literals(&merged)?;

    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(base: Value, over: Value) -> Value {
    match (base, over) {
        (Value::Object(mut base), Value::Object(over)) => {
            for (k, v) in over {
                let prev = base.remove(&k).unwrap_or(Value::Null);
                base.insert(k, deep_merge(prev, v));
            }
            Value::Object(base)
        }
        (_, over) => over,
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn reject_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);
    for ptr in leaves {
        let literal = v.pointer(&ptr).and_then(Value::as_str).unwrap_or_default();
        if looks_like_secret(literal) {
            bail!("CONFIG_SECRET_DETECTED leaf={ptr} value=REDACTED");
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    t.len() >= 8 && SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

// ---------------------------------------------------------------------------
// Unused-key report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Sorted, unique.
    pub consumed_prefixes: Vec<String>,
    /// Sorted.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Report leaves not covered by [`CONSUMED_POINTERS`].
///
/// `Fail` turns a non-empty report into an error; `Warn` always returns it.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let consumed: BTreeSet<String> = CONSUMED_POINTERS.iter().map(|p| normalize_pointer(p)).collect();

    let mut leaves = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        .filter(|leaf| !consumed.iter().any(|c| is_prefix_pointer(c, leaf)))
        .collect();
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        consumed_prefixes: consumed.into_iter().collect(),
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let preview: Vec<&String> = report.unused_leaf_pointers.iter().take(12).collect();
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config leaf key(s). First few: {:?}",
            report.unused_leaf_pointers.len(),
            preview
        );
    }
    Ok(report)
}

/// Leading `/`, no trailing `/` (except the root pointer itself).
fn normalize_pointer(p: &str) -> String {
    let trimmed = p.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// `"/a/b"` covers `"/a/b"` and `"/a/b/c"` but not `"/a/bc"`.
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    prefix == "/"
        || leaf == prefix
        || leaf
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, child) in map {
                let token = k.replace('~', "~0").replace('/', "~1");
                collect_leaf_pointers(child, &format!("{prefix}/{token}"), out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                collect_leaf_pointers(child, &format!("{prefix}/{i}"), out);
            }
        }
        _ if prefix.is_empty() => out.push("/".to_string()),
        _ => out.push(prefix.to_string()),
    }
}
