use crate::error::ServiceError;
use crate::store::CandidateStore;
use tracing::debug;

/// Pairs of the whole campaign that already carry a verdict, whatever its value.
pub async fn count_checked<S>(store: &S, project: &str, campaign: &str) -> Result<u64, ServiceError>
where
    S: CandidateStore + ?Sized,
{
    let checked = store.count_checked(project, campaign).await?;
    debug!(project, campaign, checked, "counted checked pairs");
    Ok(checked)
}

pub async fn count_remaining_in_cluster<S>(
    store: &S,
    project: &str,
    campaign: &str,
    cluster: i64,
) -> Result<u64, ServiceError>
where
    S: CandidateStore + ?Sized,
{
    let remaining = store
        .count_unreviewed_in_cluster(project, campaign, cluster)
        .await?;
    debug!(project, campaign, cluster, remaining, "counted remaining pairs");
    Ok(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::CandidatePair;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn checked_is_campaign_wide_and_remaining_is_per_cluster() {
        let store = InMemoryStore::new();
        store.insert_pair("p", "c", CandidatePair::new("a", "b", 1, 0.9)).await;
        store.insert_pair("p", "c", CandidatePair::new("b", "c", 1, 0.9)).await;
        store.insert_pair("p", "c", CandidatePair::new("d", "e", 2, 0.4)).await;
        store.insert_pair("p", "other", CandidatePair::new("x", "y", 1, 0.4)).await;

        store.set_verdict("p", "c", "a", "b", true).await.unwrap();
        store.set_verdict("p", "c", "d", "e", false).await.unwrap();

        assert_eq!(count_checked(&store, "p", "c").await.unwrap(), 2);
        assert_eq!(count_remaining_in_cluster(&store, "p", "c", 1).await.unwrap(), 1);
        assert_eq!(count_remaining_in_cluster(&store, "p", "c", 2).await.unwrap(), 0);
        assert_eq!(count_checked(&store, "p", "other").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_campaign_counts_zero() {
        let store = InMemoryStore::new();
        assert_eq!(count_checked(&store, "nope", "nope").await.unwrap(), 0);
        assert_eq!(count_remaining_in_cluster(&store, "nope", "nope", 7).await.unwrap(), 0);
    }
}
