use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A reviewable record living in a project collection.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Entity {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Entity {
    pub fn new(id: &str) -> Self {
        Entity {
            id: id.to_string(),
            kind: None,
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: Value) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }
}

/// Unordered identifier set of a candidate pair, stored low id first.
///
/// Renders as `{low}|{high}`, which is also the pair's storage key. Ids
/// containing [`PairKey::SEPARATOR`] would make that rendering ambiguous
/// (`a|b` + `c` and `a` + `b|c` both give `a|b|c`); stores keyed on the
/// rendered form refuse them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    low: String,
    high: String,
}

impl PairKey {
    pub const SEPARATOR: char = '|';

    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            PairKey {
                low: a.to_string(),
                high: b.to_string(),
            }
        } else {
            PairKey {
                low: b.to_string(),
                high: a.to_string(),
            }
        }
    }

    pub fn low(&self) -> &str {
        &self.low
    }

    pub fn high(&self) -> &str {
        &self.high
    }

    pub fn is_valid_id(id: &str) -> bool {
        !id.contains(Self::SEPARATOR)
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}{}", self.low, Self::SEPARATOR, self.high)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CandidatePair {
    pub id_a: String,
    pub id_b: String,
    pub cluster: i64,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<bool>,
    /// Entity marked canonical when the pair was confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
}

impl CandidatePair {
    pub fn new(id_a: &str, id_b: &str, cluster: i64, score: f64) -> Self {
        CandidatePair {
            id_a: id_a.to_string(),
            id_b: id_b.to_string(),
            cluster,
            score,
            verdict: None,
            canonical: None,
        }
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(&self.id_a, &self.id_b)
    }

    pub fn is_reviewed(&self) -> bool {
        self.verdict.is_some()
    }
}

/// Aggregate view of a cluster that still has unreviewed pairs.
#[derive(Clone, Debug, PartialEq)]
pub struct OpenCluster {
    pub cluster: i64,
    pub unreviewed: u64,
    pub best_score: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GiveMeDuplicates {
    pub project: String,
    pub campaign: String,
    pub limit: usize,
    #[serde(default)]
    pub cluster_id: Option<i64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DuplicateHumanCheck {
    pub project: String,
    pub campaign: String,
    pub ids: Vec<String>,
    pub verdict: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CampaignRef {
    pub project: String,
    pub campaign: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ExportTarget {
    pub project: String,
    pub campaign: String,
    pub bucket: String,
    pub key: String,
}

/// One batch served to a reviewer.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct DuplicatesBatch {
    pub number_of_duplicates_left_for_cluster: u64,
    pub number_duplicates_already_checked: u64,
    pub duplicates: Vec<String>,
    pub cluster: i64,
}

impl DuplicatesBatch {
    pub const NO_CLUSTER: i64 = -1;

    pub fn exhausted(already_checked: u64) -> Self {
        DuplicatesBatch {
            number_of_duplicates_left_for_cluster: 0,
            number_duplicates_already_checked: already_checked,
            duplicates: vec![],
            cluster: Self::NO_CLUSTER,
        }
    }
}

/// Result of applying one verdict to a chain of ids.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ReviewOutcome {
    pub reviewed: usize,
    pub skipped: usize,
    pub canonical: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pair_key_ignores_order() {
        assert_eq!(PairKey::new("b", "a"), PairKey::new("a", "b"));
        assert_eq!(PairKey::new("b", "a").to_string(), "a|b");
    }

    #[test]
    fn ids_holding_the_separator_are_invalid() {
        assert!(PairKey::is_valid_id("doc-17"));
        assert!(!PairKey::is_valid_id("a|b"));
        assert_eq!(
            PairKey::new("a|b", "c").to_string(),
            PairKey::new("a", "b|c").to_string()
        );
    }

    #[test]
    fn entity_serializes_payload_inline() {
        let mut entity = Entity::new("e1").with_field("title", json!("Dune"));
        entity.kind = Some("canonical".to_string());
        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(value, json!({"id": "e1", "type": "canonical", "title": "Dune"}));
    }

    #[test]
    fn give_me_duplicates_cluster_is_optional() {
        let req: GiveMeDuplicates =
            serde_json::from_value(json!({"project": "p", "campaign": "c", "limit": 3})).unwrap();
        assert_eq!(req.cluster_id, None);
        assert_eq!(req.limit, 3);
    }
}
