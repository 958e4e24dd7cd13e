//! Persistence capability over entity records and candidate pairs.
//!
//! The engine only talks to storage through [`CandidateStore`]. Every method
//! failing with a [`ServiceError`] is a storage failure and is propagated as is.

mod dynamo;
mod memory;

pub use dynamo::DynamoStore;
pub use memory::InMemoryStore;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::dto::{CandidatePair, Entity, OpenCluster};
use crate::error::ServiceError;

#[async_trait]
pub trait CandidateStore: Send + Sync {
    async fn entity_by_id(&self, project: &str, id: &str) -> Result<Option<Entity>, ServiceError>;

    /// All pairs carrying `cluster`, reviewed or not.
    async fn pairs_in_cluster(
        &self,
        project: &str,
        campaign: &str,
        cluster: i64,
    ) -> Result<Vec<CandidatePair>, ServiceError>;

    /// Sets `type = marker` on an existing entity. Returns `false` when the
    /// entity does not exist; never creates one.
    async fn mark_entity_canonical(
        &self,
        project: &str,
        id: &str,
        marker: &str,
    ) -> Result<bool, ServiceError>;

    /// Atomically sets the verdict on the pair `{first, second}` if it exists
    /// and has no verdict yet. A confirmed pair also records `first` as its
    /// canonical entity. Returns `false` when no eligible pair was found.
    async fn set_verdict(
        &self,
        project: &str,
        campaign: &str,
        first: &str,
        second: &str,
        verdict: bool,
    ) -> Result<bool, ServiceError>;

    async fn count_checked(&self, project: &str, campaign: &str) -> Result<u64, ServiceError>;

    async fn count_unreviewed_in_cluster(
        &self,
        project: &str,
        campaign: &str,
        cluster: i64,
    ) -> Result<u64, ServiceError>;

    /// Clusters holding at least one unreviewed pair, in no particular order.
    async fn open_clusters(
        &self,
        project: &str,
        campaign: &str,
    ) -> Result<Vec<OpenCluster>, ServiceError>;

    async fn reviewed_pairs(
        &self,
        project: &str,
        campaign: &str,
    ) -> Result<Vec<CandidatePair>, ServiceError>;
}

/// Groups unreviewed pairs by cluster, keeping each cluster's count and best
/// score. Shared by every store so selection sees the same summary.
pub(crate) fn summarize_open_clusters<I>(unreviewed: I) -> Vec<OpenCluster>
where
    I: IntoIterator<Item = CandidatePair>,
{
    let mut clusters: HashMap<i64, OpenCluster> = HashMap::new();
    for pair in unreviewed {
        let open = clusters.entry(pair.cluster).or_insert(OpenCluster {
            cluster: pair.cluster,
            unreviewed: 0,
            best_score: f64::NEG_INFINITY,
        });
        open.unreviewed += 1;
        open.best_score = open.best_score.max(pair.score);
    }
    clusters.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_cluster_summary_keeps_best_score() {
        let mut summary = summarize_open_clusters(vec![
            CandidatePair::new("a", "b", 2, 0.3),
            CandidatePair::new("b", "c", 2, 0.8),
            CandidatePair::new("d", "e", 5, 0.1),
        ]);
        summary.sort_by_key(|c| c.cluster);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].unreviewed, 2);
        assert_eq!(summary[0].best_score, 0.8);
        assert_eq!(summary[1].cluster, 5);
    }
}
