//! Auto-fill selection: pick the best item of a freshly added batch and
//! propose date/location values for the parent form.
//!
//! Ranking is a pure function over the batch ([`select_candidate`]) kept
//! apart from the form rules ([`propose`]) so either can be tested alone.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{AutoFillProposal, ExtractedMetadata, FormField, FormState};

/// Tie-break among several GPS-bearing items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidatePolicy {
    /// First item in selection order wins.
    #[default]
    FirstInSelection,
    /// Earliest capture time wins; items without one rank last, ties keep
    /// selection order.
    EarliestCapture,
}

/// Index of the best candidate in `batch`.
///
/// An item with GPS coordinates always beats one with only a capture time.
/// Returns `None` when no item has either.
pub fn select_candidate(batch: &[ExtractedMetadata], policy: CandidatePolicy) -> Option<usize> {
    best_by(batch, policy, |m| m.has_location()).or_else(|| best_by(batch, policy, |m| m.captured_at.is_some()))
}

fn best_by(
    batch: &[ExtractedMetadata],
    policy: CandidatePolicy,
    eligible: impl Fn(&ExtractedMetadata) -> bool,
) -> Option<usize> {
    let mut candidates = batch.iter().enumerate().filter(|(_, m)| eligible(m));
    match policy {
        CandidatePolicy::FirstInSelection => candidates.next().map(|(i, _)| i),
        // min_by_key keeps the first of equal keys
        CandidatePolicy::EarliestCapture => candidates
            .min_by_key(|(_, m)| (m.captured_at.is_none(), m.captured_at))
            .map(|(i, _)| i),
    }
}

/// Build the proposal for one added batch against the current form.
///
/// - Location comes from the best GPS-bearing item, only if the form's
///   location is still empty.
/// - Date comes from the same item's capture time, or the best item with a
///   capture time if that one has none, only while the form date is still
///   at its default.
pub fn propose(
    batch: &[ExtractedMetadata],
    form: &FormState,
    policy: CandidatePolicy,
) -> AutoFillProposal {
    let mut proposal = AutoFillProposal::default();
    let Some(candidate) = select_candidate(batch, policy) else {
        debug!(batch_size = batch.len(), "No auto-fill candidate in batch");
        return proposal;
    };

    let chosen = &batch[candidate];
    let mut filled = BTreeSet::new();

    if form.location_is_empty() {
        if let Some(point) = chosen.location {
            proposal.location = Some(point);
            proposal.place_name = chosen.place_name.clone();
            filled.insert(FormField::Location);
        }
    }

    if form.date_is_default() {
        let date = chosen.captured_at.or_else(|| {
            best_by(batch, policy, |m| m.captured_at.is_some()).and_then(|i| batch[i].captured_at)
        });
        if let Some(date) = date {
            proposal.date = Some(date);
            filled.insert(FormField::Date);
        }
    }

    proposal.filled_fields = filled;
    debug!(
        candidate,
        batch_size = batch.len(),
        filled = %proposal.summary(),
        "Auto-fill proposal built"
    );
    proposal
}
