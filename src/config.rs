//! Runtime configuration: file locations, log filter and generation targets.

/// Filesystem locations and log filter, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bank_path: PathBuf,
    pub shard_dir: PathBuf,
    pub index_path: PathBuf,
    pub rust_log: String,
}

impl Config {
    /// Loads `.env` (if present) and reads the `MATHBANK_*` variables, falling back to
    /// the default `assets/data` layout.
    pub fn from_env() -> Self {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |name: &str, default: &str| {
            PathBuf::from(
                lookup(name)
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| default.to_string()),
            )
        };

        Self {
            bank_path: path("MATHBANK_BANK_PATH", "assets/data/problems.json"),
            shard_dir: path("MATHBANK_SHARD_DIR", "assets/data/problems"),
            index_path: path("MATHBANK_INDEX_PATH", "assets/data/problems_index.json"),
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        }
    }
}

/// Desired number of problems per topic and difficulty.
///
/// Serialized as `{ "<topic>": { "<difficulty>": <count> } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Targets(pub BTreeMap<String, BTreeMap<String, usize>>);

impl Default for Targets {
    fn default() -> Self {
        let table = [
            ("derivatives", [("L1", 100), ("L2", 70)]),
            ("limits", [("L1", 100), ("L2", 65)]),
            ("integrals", [("L1", 100), ("L2", 65)]),
        ];

        Targets(
            table
                .into_iter()
                .map(|(topic, tiers)| {
                    let tiers: BTreeMap<String, usize> = tiers
                        .into_iter()
                        .map(|(tier, count)| (tier.to_string(), count))
                        .collect();
                    (topic.to_string(), tiers)
                })
                .collect(),
        )
    }
}

impl Targets {
    /// Reads targets from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read targets file '{}'", path.display()))?;
        let targets = serde_json::from_str(&text)
            .with_context(|| format!("Targets file '{}' is not a topic -> difficulty -> count map", path.display()))?;
        Ok(targets)
    }

    /// Uses the file when given, the built-in distribution otherwise.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Iterates `(topic, difficulty, target)` in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, usize)> {
        self.0.iter().flat_map(|(topic, tiers)| {
            tiers
                .iter()
                .map(move |(tier, count)| (topic.as_str(), tier.as_str(), *count))
        })
    }
}


use anyhow::Context;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
