//! In-memory `CandidateStore`.
//!
//! Everything lives in maps behind a `tokio::sync::RwLock`; the conditional
//! verdict update happens under a single write guard.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{summarize_open_clusters, CandidateStore};
use crate::dto::{CandidatePair, Entity, OpenCluster, PairKey};
use crate::error::ServiceError;

type CampaignKey = (String, String);

#[derive(Default)]
pub struct InMemoryStore {
    entities: RwLock<HashMap<String, HashMap<String, Entity>>>,
    pairs: RwLock<HashMap<CampaignKey, HashMap<PairKey, CandidatePair>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_entity(&self, project: &str, entity: Entity) {
        let mut entities = self.entities.write().await;
        entities
            .entry(project.to_string())
            .or_default()
            .insert(entity.id.clone(), entity);
    }

    /// Adds a pair; an existing pair with the same id set is replaced.
    pub async fn insert_pair(&self, project: &str, campaign: &str, pair: CandidatePair) {
        let mut pairs = self.pairs.write().await;
        pairs
            .entry(campaign_key(project, campaign))
            .or_default()
            .insert(pair.key(), pair);
    }

    pub async fn pair(&self, project: &str, campaign: &str, a: &str, b: &str) -> Option<CandidatePair> {
        let pairs = self.pairs.read().await;
        pairs
            .get(&campaign_key(project, campaign))
            .and_then(|campaign_pairs| campaign_pairs.get(&PairKey::new(a, b)))
            .cloned()
    }

    /// Drops an entity's `type`, as if a canonical marking never happened.
    pub async fn clear_entity_type(&self, project: &str, id: &str) {
        let mut entities = self.entities.write().await;
        if let Some(entity) = entities.get_mut(project).and_then(|p| p.get_mut(id)) {
            entity.kind = None;
        }
    }

    async fn campaign_pairs<F>(&self, project: &str, campaign: &str, keep: F) -> Vec<CandidatePair>
    where
        F: Fn(&CandidatePair) -> bool,
    {
        let pairs = self.pairs.read().await;
        pairs
            .get(&campaign_key(project, campaign))
            .map(|campaign_pairs| {
                campaign_pairs
                    .values()
                    .filter(|pair| keep(*pair))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn campaign_key(project: &str, campaign: &str) -> CampaignKey {
    (project.to_string(), campaign.to_string())
}

#[async_trait]
impl CandidateStore for InMemoryStore {
    async fn entity_by_id(&self, project: &str, id: &str) -> Result<Option<Entity>, ServiceError> {
        let entities = self.entities.read().await;
        Ok(entities.get(project).and_then(|p| p.get(id)).cloned())
    }

    async fn pairs_in_cluster(
        &self,
        project: &str,
        campaign: &str,
        cluster: i64,
    ) -> Result<Vec<CandidatePair>, ServiceError> {
        Ok(self
            .campaign_pairs(project, campaign, |pair| pair.cluster == cluster)
            .await)
    }

    async fn mark_entity_canonical(
        &self,
        project: &str,
        id: &str,
        marker: &str,
    ) -> Result<bool, ServiceError> {
        let mut entities = self.entities.write().await;
        match entities.get_mut(project).and_then(|p| p.get_mut(id)) {
            Some(entity) => {
                entity.kind = Some(marker.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_verdict(
        &self,
        project: &str,
        campaign: &str,
        first: &str,
        second: &str,
        verdict: bool,
    ) -> Result<bool, ServiceError> {
        let mut pairs = self.pairs.write().await;
        let pair = pairs
            .get_mut(&campaign_key(project, campaign))
            .and_then(|campaign_pairs| campaign_pairs.get_mut(&PairKey::new(first, second)));
        match pair {
            Some(pair) if pair.verdict.is_none() => {
                pair.verdict = Some(verdict);
                if verdict {
                    pair.canonical = Some(first.to_string());
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_checked(&self, project: &str, campaign: &str) -> Result<u64, ServiceError> {
        let pairs = self.pairs.read().await;
        Ok(pairs
            .get(&campaign_key(project, campaign))
            .map_or(0, |campaign_pairs| {
                campaign_pairs.values().filter(|p| p.is_reviewed()).count() as u64
            }))
    }

    async fn count_unreviewed_in_cluster(
        &self,
        project: &str,
        campaign: &str,
        cluster: i64,
    ) -> Result<u64, ServiceError> {
        let pairs = self.pairs.read().await;
        Ok(pairs
            .get(&campaign_key(project, campaign))
            .map_or(0, |campaign_pairs| {
                campaign_pairs
                    .values()
                    .filter(|p| p.cluster == cluster && !p.is_reviewed())
                    .count() as u64
            }))
    }

    async fn open_clusters(
        &self,
        project: &str,
        campaign: &str,
    ) -> Result<Vec<OpenCluster>, ServiceError> {
        let unreviewed = self
            .campaign_pairs(project, campaign, |pair| !pair.is_reviewed())
            .await;
        Ok(summarize_open_clusters(unreviewed))
    }

    async fn reviewed_pairs(
        &self,
        project: &str,
        campaign: &str,
    ) -> Result<Vec<CandidatePair>, ServiceError> {
        Ok(self
            .campaign_pairs(project, campaign, CandidatePair::is_reviewed)
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.insert_entity("p", Entity::new("a")).await;
        store.insert_entity("p", Entity::new("b")).await;
        store
            .insert_pair("p", "c", CandidatePair::new("a", "b", 1, 0.9))
            .await;
        store
    }

    #[tokio::test]
    async fn set_verdict_matches_either_order_once() {
        let store = seeded().await;
        assert!(store.set_verdict("p", "c", "b", "a", true).await.unwrap());
        assert!(!store.set_verdict("p", "c", "a", "b", false).await.unwrap());

        let pair = store.pair("p", "c", "a", "b").await.unwrap();
        assert_eq!(pair.verdict, Some(true));
        assert_eq!(pair.canonical.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn set_verdict_on_unknown_pair_is_noop() {
        let store = seeded().await;
        assert!(!store.set_verdict("p", "c", "a", "z", true).await.unwrap());
        assert!(!store.set_verdict("p", "other", "a", "b", true).await.unwrap());
        assert_eq!(store.count_checked("p", "c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn mark_canonical_never_creates_entities() {
        let store = seeded().await;
        assert!(store.mark_entity_canonical("p", "a", "canonical").await.unwrap());
        assert!(store.mark_entity_canonical("p", "a", "canonical").await.unwrap());
        assert!(!store.mark_entity_canonical("p", "ghost", "canonical").await.unwrap());
        assert!(store.entity_by_id("p", "ghost").await.unwrap().is_none());
        let a = store.entity_by_id("p", "a").await.unwrap().unwrap();
        assert_eq!(a.kind.as_deref(), Some("canonical"));
    }
}
