//! Legacy-to-current rewrite of stored records.

/// How legacy difficulty tiers map onto the current tier vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierMap {
    /// Legacy label -> current label.
    pub renames: BTreeMap<String, String>,
    /// Labels that are already current and pass through unchanged.
    pub current: BTreeSet<String>,
    /// Tier assigned to records whose difficulty is missing or unrecognized.
    pub baseline: String,
}

impl Default for TierMap {
    fn default() -> Self {
        let renames = [("基础", "L1"), ("进阶", "L2"), ("basic", "L1"), ("advanced", "L2")];
        TierMap::new(
            renames
                .into_iter()
                .map(|(from, to)| (from.to_string(), to.to_string())),
            ["L1", "L2", "L3"].into_iter().map(str::to_string),
            "L1",
        )
    }
}

impl TierMap {
    /// Builds a tier map. Rename targets and the baseline always count as current
    /// tiers, so a second migration pass never touches an already-renamed record.
    pub fn new(
        renames: impl IntoIterator<Item = (String, String)>,
        current: impl IntoIterator<Item = String>,
        baseline: &str,
    ) -> Self {
        let renames: BTreeMap<String, String> = renames.into_iter().collect();
        let mut current: BTreeSet<String> = current.into_iter().collect();
        current.extend(renames.values().cloned());
        current.insert(baseline.to_string());

        TierMap {
            renames,
            current,
            baseline: baseline.to_string(),
        }
    }
}

/// A difficulty value that was neither legacy nor current and got reset to the baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct TierCorrection {
    pub id: Option<String>,
    /// The value found, `None` when the field was missing.
    pub found: Option<Value>,
    pub assigned: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOutcome {
    pub bank: ProblemBank,
    /// Records whose `difficulty` actually changed. Added `type`/`answerType`/`answerExpr`
    /// fields do not count.
    pub migrated_count: usize,
    pub corrections: Vec<TierCorrection>,
}

/// Rewrites legacy field values across the whole bank.
///
/// For every record: renames a legacy `difficulty` through the tier map, resets
/// unrecognized or missing difficulties to the baseline tier, and adds `type`
/// (`"choice"`), `answerType` and `answerExpr` (`null`) where absent. All other
/// fields pass through untouched. Running it again on its own output changes nothing.
pub fn migrate(bank: &ProblemBank, tiers: &TierMap) -> MigrationOutcome {
    let mut records = bank.records.clone();
    let mut migrated_count = 0;
    let mut corrections = Vec::new();

    for record in records.iter_mut() {
        let Some(fields) = record.as_object_mut() else {
            tracing::warn!("Skipping non-object record during migration");
            continue;
        };

        let difficulty = fields.get("difficulty");
        let current_label = difficulty.and_then(Value::as_str);

        let replacement = match current_label {
            Some(label) if tiers.current.contains(label) => None,
            Some(label) if tiers.renames.contains_key(label) => Some(tiers.renames[label].clone()),
            _ => {
                let id = fields.get("id").and_then(Value::as_str).map(str::to_string);
                let found = difficulty.map_or_else(|| "<missing>".to_string(), |v| v.to_string());
                tracing::warn!(
                    "Problem {} has unrecognized difficulty {}, setting it to {}",
                    id.as_deref().unwrap_or("<no id>"),
                    found,
                    tiers.baseline
                );
                corrections.push(TierCorrection {
                    id,
                    found: difficulty.cloned(),
                    assigned: tiers.baseline.clone(),
                });
                Some(tiers.baseline.clone())
            }
        };

        if let Some(tier) = replacement {
            fields.insert("difficulty".to_string(), Value::String(tier));
            migrated_count += 1;
        }

        if !fields.contains_key("type") {
            fields.insert("type".to_string(), Value::String(CHOICE_TYPE.to_string()));
        }
        for optional in ["answerType", "answerExpr"] {
            if !fields.contains_key(optional) {
                fields.insert(optional.to_string(), Value::Null);
            }
        }
    }

    MigrationOutcome {
        bank: ProblemBank::new(records),
        migrated_count,
        corrections,
    }
}

/// The only question kind populated today.
pub const CHOICE_TYPE: &str = "choice";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy_bank() -> ProblemBank {
        ProblemBank::new(vec![
            json!({ "id": "p1", "difficulty": "基础", "source": "manual" }),
            json!({ "id": "p2", "difficulty": "进阶" }),
            json!({ "id": "p3", "difficulty": "L3", "type": "fill", "answerType": "expr", "answerExpr": "x^2" }),
            json!({ "id": "p4", "difficulty": "hard" }),
            json!({ "id": "p5" }),
        ])
    }

    #[test]
    fn renames_legacy_tiers_and_resets_unknown_ones() {
        let outcome = migrate(&legacy_bank(), &TierMap::default());
        let difficulties: Vec<&str> = outcome
            .bank
            .records
            .iter()
            .map(|r| r["difficulty"].as_str().unwrap())
            .collect();

        assert_eq!(difficulties, vec!["L1", "L2", "L3", "L1", "L1"]);
        assert_eq!(outcome.migrated_count, 4);

        assert_eq!(outcome.corrections.len(), 2);
        assert_eq!(outcome.corrections[0].id.as_deref(), Some("p4"));
        assert_eq!(outcome.corrections[0].found, Some(json!("hard")));
        assert_eq!(outcome.corrections[1].found, None);
    }

    #[test]
    fn non_string_difficulty_is_reported_as_found() {
        let bank = ProblemBank::new(vec![json!({ "id": "p7", "difficulty": 2 })]);
        let outcome = migrate(&bank, &TierMap::default());

        assert_eq!(outcome.bank.records[0]["difficulty"], "L1");
        assert_eq!(outcome.corrections[0].found, Some(json!(2)));
        assert_eq!(outcome.corrections[0].id.as_deref(), Some("p7"));
    }

    #[test]
    fn adds_type_fields_without_counting_them() {
        let bank = ProblemBank::new(vec![json!({ "id": "p1", "difficulty": "L2" })]);
        let outcome = migrate(&bank, &TierMap::default());

        assert_eq!(outcome.migrated_count, 0);
        assert_eq!(
            outcome.bank.records[0],
            json!({
                "id": "p1",
                "difficulty": "L2",
                "type": "choice",
                "answerType": null,
                "answerExpr": null
            })
        );
    }

    #[test]
    fn existing_fields_pass_through() {
        let outcome = migrate(&legacy_bank(), &TierMap::default());
        assert_eq!(outcome.bank.records[0]["source"], "manual");
        assert_eq!(outcome.bank.records[2]["type"], "fill");
        assert_eq!(outcome.bank.records[2]["answerExpr"], "x^2");
    }

    #[test]
    fn second_pass_changes_nothing() {
        let tiers = TierMap::default();
        let first = migrate(&legacy_bank(), &tiers);
        let second = migrate(&first.bank, &tiers);

        assert_eq!(second.bank, first.bank);
        assert_eq!(second.migrated_count, 0);
        assert!(second.corrections.is_empty());
    }

    #[test]
    fn custom_rename_targets_are_treated_as_current() {
        let tiers = TierMap::new(
            [("easy".to_string(), "T0".to_string())],
            ["T1".to_string()],
            "T1",
        );
        let bank = ProblemBank::new(vec![json!({ "id": "p1", "difficulty": "easy" })]);

        let first = migrate(&bank, &tiers);
        assert_eq!(first.bank.records[0]["difficulty"], "T0");

        let second = migrate(&first.bank, &tiers);
        assert_eq!(second.migrated_count, 0);
    }

    #[test]
    fn input_bank_is_not_mutated() {
        let bank = legacy_bank();
        let before = bank.clone();
        let _ = migrate(&bank, &TierMap::default());
        assert_eq!(bank, before);
    }
}

use crate::problem_bank::ProblemBank;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
