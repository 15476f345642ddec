//! Topic partitioning of the bank into shard files plus an index document.
//!
//! Shards are derived data: they can be rebuilt from the bank at any time and
//! the bank file stays the only source of truth.

/// Topic used for records that carry no `topic` label.
pub const UNCATEGORIZED_TOPIC: &str = "uncategorized";

/// All records of one topic, in bank order.
#[derive(Debug, Clone, PartialEq)]
pub struct Shard {
    pub topic: String,
    /// File name of the shard inside the shard directory, e.g. `limits.json`.
    pub file_name: String,
    pub records: Vec<Value>,
}

/// Where a topic's shard lives and how many records it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Shard path relative to the index file's directory.
    pub file: String,
    pub count: usize,
}

/// Topic label to shard location. Serialized as a plain JSON object.
pub type IndexDocument = BTreeMap<String, IndexEntry>;

/// The result of partitioning: shards in first-seen topic order, plus their index.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub shards: Vec<Shard>,
    pub index: IndexDocument,
}

/// Replaces path separators so a topic label can be used as a file name.
pub fn shard_file_name(topic: &str) -> String {
    format!("{}.json", topic.replace(['/', '\\'], "_"))
}

/// Groups the bank by topic and builds the index.
///
/// Each shard keeps its records in bank order. Shard locations in the index are
/// prefixed with `shard_dir_name`, the directory name as seen from the index file.
///
/// # Errors
/// Fails with [`BankError::ShardNameCollision`] when two distinct topics map to
/// the same file name (e.g. `a/b` and `a_b`), since one shard would overwrite the other.
pub fn partition(bank: &ProblemBank, shard_dir_name: &str) -> Result<Partition, BankError> {
    let mut shards: Vec<Shard> = Vec::new();
    let mut by_topic: HashMap<String, usize> = HashMap::new();
    let mut by_file: HashMap<String, String> = HashMap::new();

    for record in &bank.records {
        let topic = record
            .get("topic")
            .and_then(Value::as_str)
            .unwrap_or(UNCATEGORIZED_TOPIC);

        let slot = match by_topic.get(topic) {
            Some(&slot) => slot,
            None => {
                let file_name = shard_file_name(topic);
                if let Some(first) = by_file.get(&file_name) {
                    return Err(BankError::ShardNameCollision {
                        first: first.clone(),
                        second: topic.to_string(),
                        file: file_name,
                    });
                }
                by_file.insert(file_name.clone(), topic.to_string());
                by_topic.insert(topic.to_string(), shards.len());
                shards.push(Shard {
                    topic: topic.to_string(),
                    file_name,
                    records: Vec::new(),
                });
                shards.len() - 1
            }
        };

        shards[slot].records.push(record.clone());
    }

    let index = shards
        .iter()
        .map(|shard| {
            let entry = IndexEntry {
                file: format!("{}/{}", shard_dir_name, shard.file_name),
                count: shard.records.len(),
            };
            (shard.topic.clone(), entry)
        })
        .collect();

    Ok(Partition { shards, index })
}

/// Partitions the bank and writes one shard file per topic plus the index file.
///
/// Every file is replaced atomically. Shard paths in the index are relative to
/// the index file's directory when the shard directory sits beneath it.
pub fn write_partition(
    bank: &ProblemBank,
    shard_dir: &Path,
    index_path: &Path,
) -> anyhow::Result<Partition> {
    let index_dir = index_path.parent().unwrap_or_else(|| Path::new(""));
    let relative_dir = shard_dir
        .strip_prefix(index_dir)
        .unwrap_or(shard_dir)
        .to_string_lossy()
        .replace('\\', "/");

    let partition = partition(bank, &relative_dir)?;

    fs::create_dir_all(shard_dir)
        .with_context(|| format!("Failed to create shard directory '{}'", shard_dir.display()))?;

    for shard in &partition.shards {
        let shard_path = shard_dir.join(&shard.file_name);
        write_json_atomic(&shard_path, &shard.records)
            .with_context(|| format!("Failed to write shard for topic '{}'", shard.topic))?;
        tracing::info!(
            "{}: {} problems -> {}",
            shard.topic,
            shard.records.len(),
            shard_path.display()
        );
    }

    write_json_atomic(index_path, &partition.index)?;
    tracing::info!("Index written to {}", index_path.display());

    Ok(partition)
}

/// Loads the index document written by [`write_partition`].
pub fn load_index(index_path: &Path) -> anyhow::Result<IndexDocument> {
    let text = fs::read_to_string(index_path)
        .with_context(|| format!("Failed to read index '{}'", index_path.display()))?;
    let index = serde_json::from_str(&text)
        .with_context(|| format!("Index '{}' is not a valid index document", index_path.display()))?;
    Ok(index)
}

/// Reads a single topic's records through the index, without loading the full bank.
///
/// Returns `Ok(None)` if the topic is not in the index.
pub fn load_topic(index_path: &Path, topic: &str) -> anyhow::Result<Option<ProblemBank>> {
    let index = load_index(index_path)?;
    let Some(entry) = index.get(topic) else {
        return Ok(None);
    };

    let index_dir = index_path.parent().unwrap_or_else(|| Path::new(""));
    let shard = ProblemBank::load(&index_dir.join(&entry.file))?;
    Ok(Some(shard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(id: &str, topic: &str) -> Value {
        json!({ "id": id, "topic": topic })
    }

    fn sample_bank() -> ProblemBank {
        ProblemBank::new(vec![
            record("p1", "limits"),
            record("p2", "derivatives"),
            record("p3", "limits"),
            json!({ "id": "p4" }),
            record("p5", "derivatives"),
        ])
    }

    fn ids(records: &[Value]) -> Vec<&str> {
        records.iter().map(|r| r["id"].as_str().unwrap()).collect()
    }

    #[test]
    fn groups_by_topic_in_bank_order() {
        let partition = partition(&sample_bank(), "problems").unwrap();

        let topics: Vec<&str> = partition.shards.iter().map(|s| s.topic.as_str()).collect();
        assert_eq!(topics, vec!["limits", "derivatives", UNCATEGORIZED_TOPIC]);
        assert_eq!(ids(&partition.shards[0].records), vec!["p1", "p3"]);
        assert_eq!(ids(&partition.shards[1].records), vec!["p2", "p5"]);
        assert_eq!(ids(&partition.shards[2].records), vec!["p4"]);
    }

    #[test]
    fn index_counts_sum_to_bank_size() {
        let bank = sample_bank();
        let partition = partition(&bank, "problems").unwrap();

        let total: usize = partition.index.values().map(|e| e.count).sum();
        assert_eq!(total, bank.len());
        assert_eq!(
            partition.index["limits"],
            IndexEntry {
                file: "problems/limits.json".to_string(),
                count: 2
            }
        );
    }

    #[test]
    fn regrouping_shards_reproduces_bank_grouping() {
        let bank = sample_bank();
        let partition = partition(&bank, "problems").unwrap();

        let mut flattened: Vec<Value> = partition
            .shards
            .iter()
            .rev()
            .flat_map(|s| s.records.clone())
            .collect();
        flattened.sort_by_key(|r| r["id"].as_str().unwrap().to_string());
        let regrouped = super::partition(&ProblemBank::new(flattened), "problems").unwrap();

        for shard in &partition.shards {
            let other = regrouped
                .shards
                .iter()
                .find(|s| s.topic == shard.topic)
                .unwrap();
            assert_eq!(other.records, shard.records);
        }
    }

    #[test]
    fn partition_is_idempotent() {
        let bank = sample_bank();
        assert_eq!(
            partition(&bank, "problems").unwrap(),
            partition(&bank, "problems").unwrap()
        );
    }

    #[test]
    fn separators_become_underscores() {
        assert_eq!(shard_file_name("limits/continuity"), "limits_continuity.json");
        assert_eq!(shard_file_name("a\\b"), "a_b.json");
        assert_eq!(shard_file_name("积分"), "积分.json");
    }

    #[test]
    fn colliding_topics_are_rejected() {
        let bank = ProblemBank::new(vec![record("p1", "a/b"), record("p2", "a_b")]);
        match partition(&bank, "problems") {
            Err(BankError::ShardNameCollision { first, second, file }) => {
                assert_eq!(first, "a/b");
                assert_eq!(second, "a_b");
                assert_eq!(file, "a_b.json");
            }
            other => panic!("expected collision, got {:?}", other),
        }
    }

    #[test]
    fn written_shards_are_reachable_through_the_index() {
        let dir = TempDir::new().unwrap();
        let shard_dir = dir.path().join("problems");
        let index_path = dir.path().join("problems_index.json");

        write_partition(&sample_bank(), &shard_dir, &index_path).unwrap();

        let index = load_index(&index_path).unwrap();
        assert_eq!(index["derivatives"].file, "problems/derivatives.json");
        assert!(shard_dir.join("limits.json").exists());

        let limits = load_topic(&index_path, "limits").unwrap().unwrap();
        assert_eq!(ids(&limits.records), vec!["p1", "p3"]);
        assert!(load_topic(&index_path, "series").unwrap().is_none());
    }
}

use crate::errors::BankError;
use crate::problem_bank::{ProblemBank, write_json_atomic};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
