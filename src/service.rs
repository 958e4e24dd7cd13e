//! Review façade composing the counters, the cluster selector and the
//! recorder over one [`CandidateStore`].

use std::collections::{BTreeSet, HashSet};

use futures::future::{join_all, try_join_all};
use tracing::{info, warn};

use crate::config::ReviewConfig;
use crate::counters::{count_checked, count_remaining_in_cluster};
use crate::dto::{CandidatePair, DuplicatesBatch, ReviewOutcome};
use crate::error::ServiceError;
use crate::export::verdicts_csv;
use crate::recorder;
use crate::selector::select_open_cluster;
use crate::store::CandidateStore;

pub struct ReviewService<S> {
    store: S,
    config: ReviewConfig,
}

impl<S: CandidateStore> ReviewService<S> {
    pub fn new(store: S, config: ReviewConfig) -> Self {
        ReviewService { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    /// Serves up to `limit` entity records from `cluster`, or from an open
    /// cluster chosen by the selector when none is given. Counters always
    /// reflect full totals.
    pub async fn fetch_batch(
        &self,
        project: &str,
        campaign: &str,
        limit: usize,
        cluster: Option<i64>,
    ) -> Result<DuplicatesBatch, ServiceError> {
        if limit == 0 {
            return Err(ServiceError::bad_request("limit must be positive"));
        }
        let checked = count_checked(&self.store, project, campaign).await?;
        let cluster = match cluster {
            Some(cluster) => cluster,
            None => {
                match select_open_cluster(
                    &self.store,
                    project,
                    campaign,
                    self.config.selection,
                    self.config.min_listed_score,
                )
                .await?
                {
                    Some(cluster) => cluster,
                    None => {
                        info!(project, campaign, checked, "no open cluster left");
                        return Ok(DuplicatesBatch::exhausted(checked));
                    }
                }
            }
        };
        let remaining = count_remaining_in_cluster(&self.store, project, campaign, cluster).await?;

        let pairs = self
            .store
            .pairs_in_cluster(project, campaign, cluster)
            .await?;
        let ids = listed_entity_ids(pairs, self.config.min_listed_score);
        let limit = limit.min(self.config.max_batch_size);
        let duplicates = self.resolve_entities(project, &ids, limit).await?;

        info!(
            project,
            campaign,
            cluster,
            served = duplicates.len(),
            remaining,
            checked,
            "served duplicates batch"
        );
        Ok(DuplicatesBatch {
            number_of_duplicates_left_for_cluster: remaining,
            number_duplicates_already_checked: checked,
            duplicates,
            cluster,
        })
    }

    /// Applies `verdict` to every adjacent pair of `ids`.
    pub async fn record_verdict(
        &self,
        project: &str,
        campaign: &str,
        ids: &[String],
        verdict: bool,
    ) -> Result<ReviewOutcome, ServiceError> {
        recorder::record_verdict(
            &self.store,
            project,
            campaign,
            ids,
            verdict,
            &self.config.canonical_type,
        )
        .await
    }

    /// Re-applies the canonical marker recorded on every confirmed pair.
    /// Returns the number of entities marked.
    pub async fn reconcile_canonical(
        &self,
        project: &str,
        campaign: &str,
    ) -> Result<usize, ServiceError> {
        let reviewed = self.store.reviewed_pairs(project, campaign).await?;
        let mut canonical = BTreeSet::new();
        for pair in reviewed.into_iter().filter(|p| p.verdict == Some(true)) {
            match &pair.canonical {
                Some(id) => {
                    canonical.insert(id.clone());
                }
                None => {
                    warn!(project, campaign, pair = %pair.key(), "confirmed pair has no canonical id")
                }
            }
        }

        let marker = self.config.canonical_type.as_str();
        let results = join_all(
            canonical
                .iter()
                .map(|id| self.store.mark_entity_canonical(project, id, marker)),
        )
        .await;

        let mut marked = 0;
        let mut failures = Vec::new();
        for (id, result) in canonical.iter().zip(results) {
            match result {
                Ok(true) => marked += 1,
                Ok(false) => warn!(project, id = id.as_str(), "canonical entity not found"),
                Err(err) => failures.push(err),
            }
        }
        info!(project, campaign, marked, failed = failures.len(), "reconciled canonical entities");
        match ServiceError::combine(failures) {
            Some(err) => Err(err),
            None => Ok(marked),
        }
    }

    /// CSV of every reviewed pair of the campaign, with its row count.
    pub async fn export_verdicts(
        &self,
        project: &str,
        campaign: &str,
    ) -> Result<(Vec<u8>, usize), ServiceError> {
        let reviewed = self.store.reviewed_pairs(project, campaign).await?;
        let (object, rows) = verdicts_csv(reviewed)?;
        info!(project, campaign, rows, "exported verdicts");
        Ok((object, rows))
    }

    async fn resolve_entities(
        &self,
        project: &str,
        ids: &[String],
        limit: usize,
    ) -> Result<Vec<String>, ServiceError> {
        let mut duplicates = Vec::with_capacity(limit.min(ids.len()));
        let mut pending = ids;
        while duplicates.len() < limit && !pending.is_empty() {
            let take = (limit - duplicates.len()).min(pending.len());
            let (chunk, rest) = pending.split_at(take);
            pending = rest;
            let entities = try_join_all(
                chunk
                    .iter()
                    .map(|id| self.store.entity_by_id(project, id)),
            )
            .await?;
            for (id, entity) in chunk.iter().zip(entities) {
                match entity {
                    Some(entity) => duplicates.push(
                        serde_json::to_string(&entity)
                            .map_err(ServiceError::internal_server_error)?,
                    ),
                    None => warn!(project, id = id.as_str(), "candidate entity not found"),
                }
            }
        }
        Ok(duplicates)
    }
}

/// Entity ids of the unreviewed pairs, best score first, each id once.
fn listed_entity_ids(pairs: Vec<CandidatePair>, min_score: Option<f64>) -> Vec<String> {
    let mut pairs: Vec<CandidatePair> = pairs
        .into_iter()
        .filter(|pair| !pair.is_reviewed())
        .filter(|pair| min_score.map_or(true, |min| pair.score >= min))
        .collect();
    pairs.sort_by(|x, y| {
        y.score
            .partial_cmp(&x.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| x.key().cmp(&y.key()))
    });

    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for pair in pairs {
        for id in [pair.id_a, pair.id_b] {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectionPolicy;
    use crate::dto::Entity;
    use crate::store::InMemoryStore;
    use serde_json::{json, Value};

    async fn titled_store(pairs: &[(&str, &str, i64, f64)]) -> InMemoryStore {
        let store = InMemoryStore::new();
        for (a, b, cluster, score) in pairs {
            for id in [a, b] {
                store
                    .insert_entity("p", Entity::new(id).with_field("title", json!(format!("title-{}", id))))
                    .await;
            }
            store
                .insert_pair("p", "c", CandidatePair::new(a, b, *cluster, *score))
                .await;
        }
        store
    }

    fn titles(batch: &DuplicatesBatch) -> Vec<String> {
        batch
            .duplicates
            .iter()
            .map(|raw| {
                let value: Value = serde_json::from_str(raw).unwrap();
                value["title"].as_str().unwrap().to_string()
            })
            .collect()
    }

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn listed_ids_follow_score_and_skip_reviewed() {
        let mut reviewed = CandidatePair::new("z", "y", 1, 1.0);
        reviewed.verdict = Some(false);
        let listed = listed_entity_ids(
            vec![
                CandidatePair::new("1", "2", 1, 0.3),
                CandidatePair::new("3", "2", 1, 0.9),
                reviewed,
            ],
            None,
        );
        assert_eq!(listed, vec!["3", "2", "1"]);
    }

    #[test]
    fn score_floor_hides_weak_pairs() {
        let listed = listed_entity_ids(
            vec![
                CandidatePair::new("3", "4", 2, 0.3),
                CandidatePair::new("4", "5", 2, 0.9),
            ],
            Some(0.5),
        );
        assert_eq!(listed, vec!["4", "5"]);
    }

    #[tokio::test]
    async fn explicit_cluster_serves_distinct_entities_up_to_limit() {
        let store = titled_store(&[
            ("1", "2", 1, 0.9),
            ("2", "3", 1, 0.9),
            ("3", "4", 2, 0.3),
            ("4", "5", 2, 0.9),
        ])
        .await;
        let service = ReviewService::new(store, ReviewConfig::default());

        let batch = service.fetch_batch("p", "c", 3, Some(1)).await.unwrap();
        assert_eq!(batch.cluster, 1);
        let mut served = titles(&batch);
        served.sort();
        assert_eq!(served, vec!["title-1", "title-2", "title-3"]);

        let batch = service.fetch_batch("p", "c", 2, Some(1)).await.unwrap();
        assert_eq!(batch.duplicates.len(), 2);
        assert_eq!(batch.number_of_duplicates_left_for_cluster, 2);
        for title in titles(&batch) {
            assert!(["title-1", "title-2", "title-3"].contains(&title.as_str()));
        }
    }

    #[tokio::test]
    async fn limit_does_not_change_remaining_count() {
        let store = titled_store(&[("a", "b", 1, 0.9), ("b", "c", 1, 0.8), ("c", "d", 1, 0.7)]).await;
        let service = ReviewService::new(store, ReviewConfig::default());

        let batch = service.fetch_batch("p", "c", 2, Some(1)).await.unwrap();
        assert_eq!(batch.duplicates.len(), 2);
        assert_eq!(batch.number_of_duplicates_left_for_cluster, 3);
        assert_eq!(batch.number_duplicates_already_checked, 0);
    }

    #[tokio::test]
    async fn score_floor_from_config_applies_to_listing_only() {
        let store = titled_store(&[("3", "4", 2, 0.3), ("4", "5", 2, 0.9)]).await;
        let config = ReviewConfig {
            min_listed_score: Some(0.5),
            ..ReviewConfig::default()
        };
        let service = ReviewService::new(store, config);

        let batch = service.fetch_batch("p", "c", 3, Some(2)).await.unwrap();
        let mut served = titles(&batch);
        served.sort();
        assert_eq!(served, vec!["title-4", "title-5"]);
        assert_eq!(batch.number_of_duplicates_left_for_cluster, 2);
    }

    #[tokio::test]
    async fn max_batch_size_caps_limit() {
        let store = titled_store(&[("a", "b", 1, 0.9), ("b", "c", 1, 0.8)]).await;
        let config = ReviewConfig {
            max_batch_size: 1,
            ..ReviewConfig::default()
        };
        let service = ReviewService::new(store, config);
        let batch = service.fetch_batch("p", "c", 10, Some(1)).await.unwrap();
        assert_eq!(batch.duplicates.len(), 1);
    }

    #[tokio::test]
    async fn zero_limit_is_a_bad_request() {
        let service = ReviewService::new(InMemoryStore::new(), ReviewConfig::default());
        let err = service.fetch_batch("p", "c", 0, None).await.unwrap_err();
        assert_eq!(err.status, crate::response::Status::BadRequest);
    }

    #[tokio::test]
    async fn missing_entities_are_skipped_and_backfilled() {
        let store = titled_store(&[("b", "c", 1, 0.5)]).await;
        store.insert_pair("p", "c", CandidatePair::new("ghost", "a", 1, 0.9)).await;
        store.insert_entity("p", Entity::new("a").with_field("title", json!("title-a"))).await;
        let service = ReviewService::new(store, ReviewConfig::default());

        let batch = service.fetch_batch("p", "c", 2, Some(1)).await.unwrap();
        assert_eq!(titles(&batch), vec!["title-a", "title-b"]);
    }

    #[tokio::test]
    async fn unknown_campaign_reports_no_cluster() {
        let service = ReviewService::new(InMemoryStore::new(), ReviewConfig::default());
        let batch = service.fetch_batch("nope", "nope", 3, None).await.unwrap();
        assert_eq!(batch, DuplicatesBatch::exhausted(0));
    }

    #[tokio::test]
    async fn highest_score_policy_serves_strongest_cluster_first() {
        let store = titled_store(&[("a", "b", 1, 0.4), ("c", "d", 2, 0.95)]).await;
        let config = ReviewConfig {
            selection: SelectionPolicy::HighestScore,
            ..ReviewConfig::default()
        };
        let service = ReviewService::new(store, config);
        let batch = service.fetch_batch("p", "c", 5, None).await.unwrap();
        assert_eq!(batch.cluster, 2);
    }

    #[tokio::test]
    async fn score_floor_steers_selection_to_listable_clusters() {
        let store = titled_store(&[("a", "b", 1, 0.2), ("c", "d", 2, 0.9)]).await;
        let config = ReviewConfig {
            min_listed_score: Some(0.5),
            ..ReviewConfig::default()
        };
        let service = ReviewService::new(store, config);

        for _ in 0..2 {
            let batch = service.fetch_batch("p", "c", 10, None).await.unwrap();
            assert_eq!(batch.cluster, 2);
            assert_eq!(titles(&batch), vec!["title-c", "title-d"]);
            assert_eq!(batch.number_of_duplicates_left_for_cluster, 1);
        }

        service.record_verdict("p", "c", &ids(&["c", "d"]), true).await.unwrap();
        let batch = service.fetch_batch("p", "c", 10, None).await.unwrap();
        assert_eq!(batch, DuplicatesBatch::exhausted(1));

        // The weak pair is still reachable by asking for its cluster.
        let batch = service.fetch_batch("p", "c", 10, Some(1)).await.unwrap();
        assert!(batch.duplicates.is_empty());
        assert_eq!(batch.number_of_duplicates_left_for_cluster, 1);
    }

    #[tokio::test]
    async fn reconcile_restores_lost_canonical_marks() {
        let store = titled_store(&[("a", "b", 1, 0.9), ("b", "c", 1, 0.9), ("d", "e", 2, 0.9)]).await;
        let service = ReviewService::new(store, ReviewConfig::default());
        service.record_verdict("p", "c", &ids(&["a", "b", "c"]), true).await.unwrap();
        service.record_verdict("p", "c", &ids(&["d", "e"]), false).await.unwrap();

        service.store().clear_entity_type("p", "a").await;
        service.store().clear_entity_type("p", "b").await;

        assert_eq!(service.reconcile_canonical("p", "c").await.unwrap(), 2);
        for id in ["a", "b"] {
            let entity = service.store().entity_by_id("p", id).await.unwrap().unwrap();
            assert_eq!(entity.kind.as_deref(), Some("canonical"));
        }
        let d = service.store().entity_by_id("p", "d").await.unwrap().unwrap();
        assert_eq!(d.kind, None);
    }

    #[tokio::test]
    async fn custom_marker_is_written() {
        let store = titled_store(&[("a", "b", 1, 0.9)]).await;
        let config = ReviewConfig {
            canonical_type: "super_publication".to_string(),
            ..ReviewConfig::default()
        };
        let service = ReviewService::new(store, config);
        service.record_verdict("p", "c", &ids(&["a", "b"]), true).await.unwrap();
        let a = service.store().entity_by_id("p", "a").await.unwrap().unwrap();
        assert_eq!(a.kind.as_deref(), Some("super_publication"));
    }

    #[tokio::test]
    async fn export_lists_reviewed_pairs() {
        let store = titled_store(&[("a", "b", 1, 0.9), ("c", "d", 2, 0.9)]).await;
        let service = ReviewService::new(store, ReviewConfig::default());
        service.record_verdict("p", "c", &ids(&["b", "a"]), true).await.unwrap();

        let (object, rows) = service.export_verdicts("p", "c").await.unwrap();
        assert_eq!(rows, 1);
        let text = String::from_utf8(object).unwrap();
        assert!(text.ends_with("a,b,1,0.9,true,b\n"));
    }
}
