//! Applies a reviewer's verdict to a chain of entity ids.
//!
//! Wire contract: `ids = [x0, x1, ..., xn]` names the `n` candidate pairs
//! `(x0, x1), (x1, x2), ..., (xn-1, xn)`. Each pair is resolved on its own;
//! a confirmed pair marks its earlier id canonical.

use crate::dto::ReviewOutcome;
use crate::error::ServiceError;
use crate::store::CandidateStore;
use tracing::{debug, info, warn};

/// Zips adjacent ids of a chain into the pairs it names.
pub fn chain_pairs(ids: &[String]) -> impl Iterator<Item = (&str, &str)> {
    ids.windows(2).map(|w| (w[0].as_str(), w[1].as_str()))
}

pub async fn record_verdict<S>(
    store: &S,
    project: &str,
    campaign: &str,
    ids: &[String],
    verdict: bool,
    canonical_type: &str,
) -> Result<ReviewOutcome, ServiceError>
where
    S: CandidateStore + ?Sized,
{
    let mut outcome = ReviewOutcome::default();
    let mut failures = Vec::new();

    for (first, second) in chain_pairs(ids) {
        if first == second {
            debug!(project, campaign, id = first, "ignoring pair of identical ids");
            outcome.skipped += 1;
            continue;
        }
        let applied = match store
            .set_verdict(project, campaign, first, second, verdict)
            .await
        {
            Ok(applied) => applied,
            Err(err) => {
                warn!(project, campaign, first, second, error = %err.msg, "verdict write failed");
                failures.push(err);
                continue;
            }
        };
        if !applied {
            debug!(project, campaign, first, second, "pair already reviewed or unknown");
            outcome.skipped += 1;
            continue;
        }
        outcome.reviewed += 1;

        if verdict {
            match store.mark_entity_canonical(project, first, canonical_type).await {
                Ok(true) => outcome.canonical += 1,
                Ok(false) => warn!(project, id = first, "canonical entity not found"),
                Err(err) => {
                    warn!(project, id = first, error = %err.msg, "canonical marking failed");
                    failures.push(err);
                }
            }
        }
    }

    info!(
        project,
        campaign,
        verdict,
        reviewed = outcome.reviewed,
        skipped = outcome.skipped,
        canonical = outcome.canonical,
        failed = failures.len(),
        "recorded verdict"
    );
    match ServiceError::combine(failures) {
        Some(err) => Err(err),
        None => Ok(outcome),
    }
}
