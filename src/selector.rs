use crate::config::SelectionPolicy;
use crate::dto::OpenCluster;
use crate::error::ServiceError;
use crate::store::CandidateStore;
use std::cmp::Ordering;
use tracing::debug;

/// Picks a cluster that still has unreviewed pairs, or `None` when the
/// campaign is exhausted (or unknown).
///
/// With a `min_score` floor, only clusters holding an unreviewed pair at or
/// above it are eligible: a cluster whose pairs would all be hidden from the
/// listing is never served.
pub async fn select_open_cluster<S>(
    store: &S,
    project: &str,
    campaign: &str,
    policy: SelectionPolicy,
    min_score: Option<f64>,
) -> Result<Option<i64>, ServiceError>
where
    S: CandidateStore + ?Sized,
{
    let open = store.open_clusters(project, campaign).await?;
    let selected = pick(&open, policy, min_score);
    debug!(
        project,
        campaign,
        open = open.len(),
        ?selected,
        %policy,
        ?min_score,
        "selected open cluster"
    );
    Ok(selected)
}

fn pick(open: &[OpenCluster], policy: SelectionPolicy, min_score: Option<f64>) -> Option<i64> {
    let candidates = open
        .iter()
        .filter(|c| c.unreviewed > 0)
        .filter(|c| min_score.map_or(true, |floor| c.best_score >= floor));
    match policy {
        SelectionPolicy::LowestId => candidates.map(|c| c.cluster).min(),
        SelectionPolicy::HighestScore => candidates
            .max_by(|x, y| {
                x.best_score
                    .partial_cmp(&y.best_score)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| y.cluster.cmp(&x.cluster))
            })
            .map(|c| c.cluster),
    }
}
