//! The bank file: loading, atomic saving, id allocation, merging and backups.

/// The full collection of problem records, in insertion order.
///
/// Records are kept as raw JSON objects so that fields this tool does not know
/// about (and legacy values it has not migrated yet) survive a rewrite untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProblemBank {
    pub records: Vec<Value>,
}

/// Record counts per topic and per difficulty, sorted by label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Distribution {
    pub total: usize,
    pub by_topic: BTreeMap<String, usize>,
    pub by_difficulty: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
}

impl ProblemBank {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Loads the bank, treating a missing file as an empty bank.
    ///
    /// Used by the ingestion paths, where the first merge creates the file.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!("No bank at {}, starting from an empty bank", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Loads the bank, failing if the file is missing or not a JSON array.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open problem bank at '{}'", path.display()))?;
        let reader = BufReader::new(file);

        let bank = serde_json::from_reader(reader).with_context(|| {
            format!(
                "Problem bank at '{}' is not a JSON array of records",
                path.display()
            )
        })?;

        Ok(bank)
    }

    /// Writes the whole bank back in one atomic replace.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        write_json_atomic(path, self)
    }

    /// Computes the next sequence number for a new record.
    ///
    /// Continues from the numeric suffix of the *last* record in bank order, not
    /// the numeric maximum: the bank is append-only and ids are assigned in
    /// increasing order, so the last record carries the highest id.
    pub fn next_id(&self) -> Result<u64, BankError> {
        let Some(last) = self.records.last() else {
            return Ok(1);
        };

        let id = last.get("id").and_then(Value::as_str).unwrap_or_default();
        let digits_start = id
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i);

        let Some(last_sequence) = digits_start.and_then(|start| id[start..].parse::<u64>().ok())
        else {
            return Err(BankError::UnparsableId {
                position: self.records.len(),
                id: last
                    .get("id")
                    .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                    .unwrap_or_default(),
            });
        };

        last_sequence
            .checked_add(1)
            .ok_or_else(|| BankError::IdExhausted { last: id.to_string() })
    }

    /// Appends a normalized batch after the existing records.
    ///
    /// Merging is append-only: no deduplication, existing records are not touched.
    pub fn merge(&self, batch: Vec<Problem>) -> ProblemBank {
        let mut records = Vec::with_capacity(self.records.len() + batch.len());
        records.extend(self.records.iter().cloned());
        records.extend(batch.into_iter().map(Value::from));
        ProblemBank { records }
    }

    /// Counts records per topic, difficulty and type.
    ///
    /// Missing labels are counted under `"unknown"`; a missing `type` counts as `"choice"`.
    pub fn distribution(&self) -> Distribution {
        let mut distribution = Distribution {
            total: self.records.len(),
            ..Default::default()
        };

        for record in &self.records {
            let label = |field: &str, fallback: &str| {
                record
                    .get(field)
                    .and_then(Value::as_str)
                    .unwrap_or(fallback)
                    .to_string()
            };
            *distribution
                .by_topic
                .entry(label("topic", "unknown"))
                .or_insert(0) += 1;
            *distribution
                .by_difficulty
                .entry(label("difficulty", "unknown"))
                .or_insert(0) += 1;
            *distribution
                .by_type
                .entry(label("type", "choice"))
                .or_insert(0) += 1;
        }

        distribution
    }
}

/// Copies the bank file verbatim to a timestamped sibling before it is rewritten.
///
/// The copy is named `<stem>_backup_<YYYYMMDD_HHMMSS>.<ext>`, so backups sort
/// chronologically by name.
pub fn backup_bank(path: &Path) -> anyhow::Result<PathBuf> {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let backup_path = backup_path_for(path, &timestamp.to_string());

    fs::copy(path, &backup_path).with_context(|| {
        format!(
            "Failed to back up '{}' to '{}'",
            path.display(),
            backup_path.display()
        )
    })?;

    Ok(backup_path)
}

fn backup_path_for(path: &Path, timestamp: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "problems".to_string());
    let file_name = match path.extension() {
        Some(ext) => format!("{}_backup_{}.{}", stem, timestamp, ext.to_string_lossy()),
        None => format!("{}_backup_{}", stem, timestamp),
    };
    path.with_file_name(file_name)
}

/// Serializes `value` as pretty JSON and replaces `path` atomically.
///
/// The document is written to a temporary sibling, fsynced, then renamed over
/// the destination, so an interrupted run leaves either the old or the new file.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory '{}'", parent.display()))?;
    }

    let mut content = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize document for '{}'", path.display()))?;
    content.push('\n');

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .with_context(|| format!("Failed to create temp file '{}'", temp_path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write '{}'", temp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to fsync '{}'", temp_path.display()))?;
    drop(file);

    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to move '{}' into place at '{}'",
            temp_path.display(),
            path.display()
        )
    })?;

    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}


use crate::errors::BankError;
use crate::problems::Problem;
use anyhow::Context;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
