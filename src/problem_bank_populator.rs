//! Filling the bank: deficits against targets, batched generation, merging.

/// Missing problems per `(topic, difficulty)` pair.
pub type Deficits = BTreeMap<(String, String), usize>;

/// One generation request: `count` problems for a single topic/difficulty pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub topic: String,
    pub difficulty: String,
    pub count: usize,
}

/// Raw candidates returned for one request, still carrying the request's labels.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateBatch {
    pub topic: String,
    pub difficulty: String,
    pub problems: Vec<RawProblem>,
}

/// A request that produced nothing. The run continues without it.
#[derive(Debug)]
pub struct FailedBatch {
    pub request: BatchRequest,
    pub error: IngestError,
}

/// What a population run did to the bank.
#[derive(Debug)]
pub struct PopulateSummary {
    pub added: usize,
    pub total: usize,
    pub failed: Vec<FailedBatch>,
    /// Validation of the bank as written. `None` when nothing was written.
    pub report: Option<ValidationReport>,
}

/// Compares the bank's current distribution with the targets.
///
/// Every targeted pair appears in the result; pairs already at or above their
/// target map to 0. Records outside the targeted pairs are ignored.
pub fn compute_deficits(bank: &ProblemBank, targets: &Targets) -> Deficits {
    let mut current: HashMap<(&str, &str), usize> = HashMap::new();
    for record in &bank.records {
        let topic = record.get("topic").and_then(Value::as_str);
        let difficulty = record.get("difficulty").and_then(Value::as_str);
        if let (Some(topic), Some(difficulty)) = (topic, difficulty) {
            *current.entry((topic, difficulty)).or_insert(0) += 1;
        }
    }

    targets
        .iter()
        .map(|(topic, difficulty, target)| {
            let have = current.get(&(topic, difficulty)).copied().unwrap_or(0);
            (
                (topic.to_string(), difficulty.to_string()),
                target.saturating_sub(have),
            )
        })
        .collect()
}

/// Splits each deficit into requests of at most `batch_size` problems.
pub fn plan_batches(deficits: &Deficits, batch_size: usize) -> Vec<BatchRequest> {
    let batch_size = batch_size.max(1);
    let mut plan = Vec::new();

    for ((topic, difficulty), &needed) in deficits {
        let mut remaining = needed;
        while remaining > 0 {
            let count = remaining.min(batch_size);
            plan.push(BatchRequest {
                topic: topic.clone(),
                difficulty: difficulty.clone(),
                count,
            });
            remaining -= count;
        }
    }

    plan
}

/// Asks the source for one batch and parses the reply.
pub async fn fetch_batch(
    source: &dyn ContentSource,
    request: &BatchRequest,
) -> Result<CandidateBatch, IngestError> {
    let prompt = generation_prompt(&request.topic, &request.difficulty, request.count);
    let content = source.fetch(&prompt).await?;
    let problems = parse_candidates(&content)?;

    Ok(CandidateBatch {
        topic: request.topic.clone(),
        difficulty: request.difficulty.clone(),
        problems,
    })
}

/// Normalizes the batches and appends them to the bank.
///
/// Ids continue from the bank's last record and are assigned in batch order,
/// then candidate order within each batch.
pub fn ingest(bank: &ProblemBank, batches: Vec<CandidateBatch>) -> Result<ProblemBank, BankError> {
    let mut sequence = Some(bank.next_id()?);
    let mut normalized = Vec::new();

    for batch in batches {
        for raw in batch.problems {
            let id = sequence.ok_or_else(|| BankError::IdExhausted {
                last: format_id(u64::MAX),
            })?;
            normalized.push(normalize(raw, &batch.topic, &batch.difficulty, id));
            sequence = id.checked_add(1);
        }
    }

    Ok(bank.merge(normalized))
}

/// Runs every request against the source and folds the results into the bank file.
///
/// A request that fails (source unavailable, malformed reply) is logged and
/// skipped; the others still land. The bank is written once, atomically, and
/// only if at least one problem was produced. The written bank is then validated.
///
/// # Errors
/// Only run-level failures: an unreadable bank file, an id that cannot be
/// continued, or an unwritable destination. The id is checked before the first
/// request goes out.
pub async fn populate_problem_bank(
    source: &dyn ContentSource,
    bank_path: &Path,
    plan: &[BatchRequest],
) -> anyhow::Result<PopulateSummary> {
    // Step 1: Load the current bank. A missing file means an empty bank.
    let bank = load_appendable_bank(bank_path)?;

    // Step 2: Collect candidates batch by batch.
    let mut batches = Vec::new();
    let mut failed = Vec::new();
    for (i, request) in plan.iter().enumerate() {
        tracing::info!(
            "Batch {}/{}: {} x {} - {} via {}",
            i + 1,
            plan.len(),
            request.count,
            request.topic,
            request.difficulty,
            source.name()
        );
        match fetch_batch(source, request).await {
            Ok(batch) => {
                tracing::info!("Received {} candidates", batch.problems.len());
                batches.push(batch);
            }
            Err(error) => {
                tracing::warn!("Batch produced no problems: {}", error);
                failed.push(FailedBatch {
                    request: request.clone(),
                    error,
                });
            }
        }
    }

    // Step 3 and 4: Merge, write, validate.
    commit_batches(&bank, bank_path, batches, failed)
}

/// Merges a file of raw candidates into the bank under one topic and difficulty.
///
/// Unlike a generation run there is a single input, so an unreadable or
/// malformed file is an error rather than a skipped batch.
pub async fn merge_candidate_file(
    source: &FileSource,
    bank_path: &Path,
    topic: &str,
    difficulty: &str,
) -> anyhow::Result<PopulateSummary> {
    let bank = load_appendable_bank(bank_path)?;

    tracing::info!(
        "Reading candidates for {} - {} from {}",
        topic,
        difficulty,
        source.path().display()
    );
    let content = source.read().await?;
    let problems = parse_candidates(&content)
        .with_context(|| format!("No candidates in '{}'", source.path().display()))?;
    tracing::info!("Read {} candidates", problems.len());

    let batch = CandidateBatch {
        topic: topic.to_string(),
        difficulty: difficulty.to_string(),
        problems,
    };
    commit_batches(&bank, bank_path, vec![batch], Vec::new())
}

/// Loads the bank and makes sure new ids can be continued from it.
fn load_appendable_bank(bank_path: &Path) -> anyhow::Result<ProblemBank> {
    let bank = ProblemBank::load_or_default(bank_path)?;
    bank.next_id()
        .with_context(|| format!("Cannot append to bank '{}'", bank_path.display()))?;
    Ok(bank)
}

fn commit_batches(
    bank: &ProblemBank,
    bank_path: &Path,
    batches: Vec<CandidateBatch>,
    failed: Vec<FailedBatch>,
) -> anyhow::Result<PopulateSummary> {
    let added: usize = batches.iter().map(|b| b.problems.len()).sum();
    if added == 0 {
        return Ok(PopulateSummary {
            added,
            total: bank.len(),
            failed,
            report: None,
        });
    }

    // Step 3: Normalize, merge and write back in one pass.
    let merged = ingest(bank, batches)
        .with_context(|| format!("Cannot append to bank '{}'", bank_path.display()))?;
    merged.save(bank_path)?;
    tracing::info!(
        "Added {} problems, bank now holds {} ({})",
        added,
        merged.len(),
        bank_path.display()
    );

    // Step 4: Validate what was written.
    let report = validate_bank(&merged);

    Ok(PopulateSummary {
        added,
        total: merged.len(),
        failed,
        report: Some(report),
    })
}


use crate::candidates::parse_candidates;
use crate::config::Targets;
use crate::content_source::{ContentSource, FileSource, generation_prompt};
use crate::errors::{BankError, IngestError};
use crate::problem_bank::ProblemBank;
use crate::problems::{RawProblem, format_id, normalize};
use crate::validation::{ValidationReport, validate_bank};
use anyhow::Context;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
