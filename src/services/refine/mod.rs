use crate::error::{PipelineError, Result};
use crate::models::{
    CandidateRec, FieldSchema, FieldType, InteractionSignal, RecordSchema, RefinedRec,
};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Recommendation Refiner
///
/// For a single user, takes the items the user has already seen plus a bag
/// of candidate recommendations and produces at most `num_recs` unique,
/// unseen items, ranked by (optionally diversity-adjusted) weight.
///
/// Pipeline per user:
/// 1. Drop candidates whose item the user has seen
/// 2. Deduplicate by item, keeping the max-weight occurrence
/// 3. Compute `diversity_adj_weight` (pass-through when adjustment is off)
/// 4. Sort, truncate to `num_recs`, assign 1-based ranks
///
/// Diversity adjustment groups candidates by `reason` and discounts the
/// r-th heaviest member of a group to `weight / (r + 2)`, so a strategy
/// that floods the candidate pool cannot monopolize the final list.
///
/// All weight sorts break ties on the item id ascending, making the output
/// reproducible for equal weights.
pub struct RecommendationRefiner {
    num_recs: usize,
    diversity_adjust: bool,
}

impl RecommendationRefiner {
    pub fn new(num_recs: usize, diversity_adjust: bool) -> Self {
        Self {
            num_recs,
            diversity_adjust,
        }
    }

    /// Construction from the host engine's string arguments.
    pub fn from_args(num_recs: &str, diversity_adjust: &str) -> Result<Self> {
        let num_recs: usize = num_recs.parse().map_err(|_| {
            PipelineError::Config(format!(
                "num_recs must be a non-negative integer, got '{}'",
                num_recs
            ))
        })?;
        let diversity_adjust: bool = diversity_adjust.parse().map_err(|_| {
            PipelineError::Config(format!(
                "diversity_adjust must be 'true' or 'false', got '{}'",
                diversity_adjust
            ))
        })?;
        Ok(Self::new(num_recs, diversity_adjust))
    }

    /// Refine one user's candidates against that user's seen-item signals.
    pub fn refine(
        &self,
        seen_signals: &[InteractionSignal],
        candidates: &[CandidateRec],
    ) -> Vec<RefinedRec> {
        let seen: HashSet<&str> = seen_signals.iter().map(|s| s.item.as_str()).collect();

        // Unseen candidates, deduplicated by item. A strictly greater weight
        // replaces the stored occurrence; an equal one does not, so the
        // first-scanned occurrence wins ties.
        let mut best: HashMap<String, CandidateRec> = HashMap::new();
        for candidate in candidates {
            if seen.contains(candidate.item.as_str()) {
                continue;
            }
            match best.get(&candidate.item) {
                Some(existing) if candidate.weight <= existing.weight => {}
                _ => {
                    best.insert(candidate.item.clone(), candidate.clone());
                }
            }
        }
        let survivors: Vec<CandidateRec> = best.into_values().collect();
        let eligible = survivors.len();

        let mut adjusted: Vec<(CandidateRec, f32)> = if self.diversity_adjust {
            diversity_adjusted(survivors)
        } else {
            survivors
                .into_iter()
                .map(|candidate| {
                    let weight = candidate.weight;
                    (candidate, weight)
                })
                .collect()
        };

        adjusted.sort_by(|a, b| rank_order(a.1, &a.0.item, b.1, &b.0.item));

        let output: Vec<RefinedRec> = adjusted
            .into_iter()
            .take(self.num_recs)
            .enumerate()
            .map(|(i, (candidate, diversity_adj_weight))| RefinedRec {
                candidate,
                diversity_adj_weight,
                rank: (i + 1) as i32,
            })
            .collect();

        debug!(
            candidate_count = candidates.len(),
            eligible,
            returned = output.len(),
            diversity_adjust = self.diversity_adjust,
            "Refined user recommendations"
        );

        output
    }

    /// Declares the output record shape: the candidate fields plus the two
    /// refinement fields appended at the end.
    pub fn output_schema(&self, _input: &RecordSchema) -> RecordSchema {
        RecordSchema::new(vec![
            FieldSchema::new("user", FieldType::Chararray),
            FieldSchema::new("item", FieldType::Chararray),
            FieldSchema::new("weight", FieldType::Float),
            FieldSchema::new("reason", FieldType::Chararray),
            FieldSchema::new("user_link", FieldType::Float),
            FieldSchema::new("item_link", FieldType::Float),
            FieldSchema::new("diversity_adj_weight", FieldType::Float),
            FieldSchema::new("rank", FieldType::Integer),
        ])
    }
}

/// Weight-descending order with the item id ascending as tie-break.
fn rank_order(a_weight: f32, a_item: &str, b_weight: f32, b_item: &str) -> Ordering {
    b_weight
        .partial_cmp(&a_weight)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a_item.cmp(b_item))
}

/// Group candidates by reason and discount repeat members: the candidate at
/// zero-based rank r within its weight-sorted group gets `weight / (r + 2)`.
/// A candidate without a reason forms its own singleton group, so it still
/// receives `weight / 2` rather than being left without an adjusted weight.
fn diversity_adjusted(survivors: Vec<CandidateRec>) -> Vec<(CandidateRec, f32)> {
    let mut groups: HashMap<String, Vec<CandidateRec>> = HashMap::new();
    let mut singletons: Vec<CandidateRec> = Vec::new();

    for candidate in survivors {
        match &candidate.reason {
            Some(reason) => groups.entry(reason.clone()).or_default().push(candidate),
            None => singletons.push(candidate),
        }
    }

    let mut adjusted = Vec::new();
    for mut members in groups.into_values() {
        members.sort_by(|a, b| rank_order(a.weight, &a.item, b.weight, &b.item));
        for (rank, candidate) in members.into_iter().enumerate() {
            let discounted = candidate.weight / (rank as f32 + 2.0);
            adjusted.push((candidate, discounted));
        }
    }
    for candidate in singletons {
        let discounted = candidate.weight / 2.0;
        adjusted.push((candidate, discounted));
    }

    adjusted
}
