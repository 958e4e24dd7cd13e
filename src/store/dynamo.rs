//! DynamoDB-backed `CandidateStore`.
//!
//! Entity table: partition key `project`, sort key `id`.
//! Pair table: partition key `campaign_key` (`{project}#{campaign}`), sort key
//! `pair_key` (`{low}|{high}`). Projects holding `#` and entity ids holding `|`
//! are refused with a bad request, since their keys would collide.

use std::collections::HashMap;

use async_trait::async_trait;
use rusoto_core::RusotoError;
use rusoto_dynamodb::{
    AttributeValue, DynamoDb, DynamoDbClient, GetItemInput, QueryInput, UpdateItemError,
    UpdateItemInput,
};
use serde_json::{Map, Number, Value};
use tracing::debug;

use super::{summarize_open_clusters, CandidateStore};
use crate::config::TableNames;
use crate::dto::{CandidatePair, Entity, OpenCluster, PairKey};
use crate::error::ServiceError;

type Item = HashMap<String, AttributeValue>;

const UNREVIEWED: &str = "attribute_not_exists(verdict)";
const REVIEWED: &str = "attribute_exists(verdict)";
const CAMPAIGN_SEPARATOR: char = '#';

pub struct DynamoStore {
    client: DynamoDbClient,
    tables: TableNames,
}

impl DynamoStore {
    pub fn new(client: DynamoDbClient, tables: TableNames) -> Self {
        DynamoStore { client, tables }
    }

    fn campaign_query(
        &self,
        project: &str,
        campaign: &str,
        filter: Option<String>,
    ) -> Result<QueryInput, ServiceError> {
        let values = HashMap::from([(
            String::from(":ck"),
            string_value(&campaign_key(project, campaign)?),
        )]);
        let names = filter
            .as_deref()
            .filter(|filter| filter.contains("#cluster"))
            .map(|_| HashMap::from([(String::from("#cluster"), String::from("cluster"))]));
        Ok(QueryInput {
            table_name: self.tables.pairs.clone(),
            key_condition_expression: Some(String::from("campaign_key = :ck")),
            filter_expression: filter,
            expression_attribute_names: names,
            expression_attribute_values: Some(values),
            consistent_read: Some(true),
            ..Default::default()
        })
    }

    fn cluster_query(
        &self,
        project: &str,
        campaign: &str,
        cluster: i64,
        extra: Option<&str>,
    ) -> Result<QueryInput, ServiceError> {
        let filter = match extra {
            Some(extra) => format!("#cluster = :cluster AND {}", extra),
            None => String::from("#cluster = :cluster"),
        };
        let mut input = self.campaign_query(project, campaign, Some(filter))?;
        if let Some(values) = input.expression_attribute_values.as_mut() {
            values.insert(String::from(":cluster"), number_value(cluster));
        }
        Ok(input)
    }

    /// Sets the marker only on an entity that already exists.
    fn canonical_update(&self, project: &str, id: &str, marker: &str) -> UpdateItemInput {
        UpdateItemInput {
            table_name: self.tables.entities.clone(),
            key: entity_key(project, id),
            update_expression: Some(String::from("SET #type = :marker")),
            condition_expression: Some(String::from("attribute_exists(id)")),
            expression_attribute_names: Some(HashMap::from([(
                String::from("#type"),
                String::from("type"),
            )])),
            expression_attribute_values: Some(HashMap::from([(
                String::from(":marker"),
                string_value(marker),
            )])),
            ..Default::default()
        }
    }

    /// Writes the verdict only on an existing pair that has none yet. A
    /// confirmation records `first` as the canonical entity in the same write.
    fn verdict_update(
        &self,
        project: &str,
        campaign: &str,
        first: &str,
        second: &str,
        verdict: bool,
    ) -> Result<UpdateItemInput, ServiceError> {
        let mut values = HashMap::from([(
            String::from(":verdict"),
            AttributeValue {
                bool: Some(verdict),
                ..Default::default()
            },
        )]);
        let update = if verdict {
            values.insert(String::from(":canonical"), string_value(first));
            "SET verdict = :verdict, canonical = :canonical"
        } else {
            "SET verdict = :verdict"
        };
        Ok(UpdateItemInput {
            table_name: self.tables.pairs.clone(),
            key: pair_item_key(project, campaign, first, second)?,
            update_expression: Some(update.to_string()),
            condition_expression: Some(format!("attribute_exists(pair_key) AND {}", UNREVIEWED)),
            expression_attribute_values: Some(values),
            ..Default::default()
        })
    }

    async fn query_items(&self, input: QueryInput) -> Result<Vec<Item>, ServiceError> {
        let mut items = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let mut request = input.clone();
            request.exclusive_start_key = start_key.take();
            let output = self
                .client
                .query(request)
                .await
                .map_err(ServiceError::internal_server_error)?;
            items.extend(output.items.unwrap_or_default());
            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }
        Ok(items)
    }

    async fn query_count(&self, mut input: QueryInput) -> Result<u64, ServiceError> {
        input.select = Some(String::from("COUNT"));
        let mut total = 0u64;
        let mut start_key: Option<Item> = None;
        loop {
            let mut request = input.clone();
            request.exclusive_start_key = start_key.take();
            let output = self
                .client
                .query(request)
                .await
                .map_err(ServiceError::internal_server_error)?;
            total += output.count.unwrap_or(0).max(0) as u64;
            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }
        Ok(total)
    }

    async fn query_pairs(&self, input: QueryInput) -> Result<Vec<CandidatePair>, ServiceError> {
        self.query_items(input)
            .await?
            .iter()
            .map(pair_from_item)
            .collect()
    }
}

#[async_trait]
impl CandidateStore for DynamoStore {
    async fn entity_by_id(&self, project: &str, id: &str) -> Result<Option<Entity>, ServiceError> {
        let request = GetItemInput {
            table_name: self.tables.entities.clone(),
            key: entity_key(project, id),
            consistent_read: Some(true),
            ..Default::default()
        };
        let output = self
            .client
            .get_item(request)
            .await
            .map_err(ServiceError::internal_server_error)?;
        output.item.as_ref().map(entity_from_item).transpose()
    }

    async fn pairs_in_cluster(
        &self,
        project: &str,
        campaign: &str,
        cluster: i64,
    ) -> Result<Vec<CandidatePair>, ServiceError> {
        self.query_pairs(self.cluster_query(project, campaign, cluster, None)?)
            .await
    }

    async fn mark_entity_canonical(
        &self,
        project: &str,
        id: &str,
        marker: &str,
    ) -> Result<bool, ServiceError> {
        let request = self.canonical_update(project, id, marker);
        match self.client.update_item(request).await {
            Ok(_) => Ok(true),
            Err(RusotoError::Service(UpdateItemError::ConditionalCheckFailed(_))) => {
                debug!(project, id, "entity to mark canonical does not exist");
                Ok(false)
            }
            Err(err) => Err(ServiceError::internal_server_error(err)),
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
        let request = self.verdict_update(project, campaign, first, second, verdict)?;
        match self.client.update_item(request).await {
            Ok(_) => Ok(true),
            Err(RusotoError::Service(UpdateItemError::ConditionalCheckFailed(_))) => Ok(false),
            Err(err) => Err(ServiceError::internal_server_error(err)),
        }
    }

    async fn count_checked(&self, project: &str, campaign: &str) -> Result<u64, ServiceError> {
        self.query_count(self.campaign_query(project, campaign, Some(REVIEWED.to_string()))?)
            .await
    }

    async fn count_unreviewed_in_cluster(
        &self,
        project: &str,
        campaign: &str,
        cluster: i64,
    ) -> Result<u64, ServiceError> {
        self.query_count(self.cluster_query(project, campaign, cluster, Some(UNREVIEWED))?)
            .await
    }

    async fn open_clusters(
        &self,
        project: &str,
        campaign: &str,
    ) -> Result<Vec<OpenCluster>, ServiceError> {
        let unreviewed = self
            .query_pairs(self.campaign_query(project, campaign, Some(UNREVIEWED.to_string()))?)
            .await?;
        Ok(summarize_open_clusters(unreviewed))
    }

    async fn reviewed_pairs(
        &self,
        project: &str,
        campaign: &str,
    ) -> Result<Vec<CandidatePair>, ServiceError> {
        self.query_pairs(self.campaign_query(project, campaign, Some(REVIEWED.to_string()))?)
            .await
    }
}

fn campaign_key(project: &str, campaign: &str) -> Result<String, ServiceError> {
    if project.contains(CAMPAIGN_SEPARATOR) {
        return Err(ServiceError::bad_request(format!(
            "Project '{}' must not contain '{}'",
            project, CAMPAIGN_SEPARATOR
        )));
    }
    Ok(format!("{}{}{}", project, CAMPAIGN_SEPARATOR, campaign))
}

fn entity_key(project: &str, id: &str) -> Item {
    HashMap::from([
        (String::from("project"), string_value(project)),
        (String::from("id"), string_value(id)),
    ])
}

fn pair_item_key(project: &str, campaign: &str, a: &str, b: &str) -> Result<Item, ServiceError> {
    if let Some(id) = [a, b].into_iter().find(|id| !PairKey::is_valid_id(id)) {
        return Err(ServiceError::bad_request(format!(
            "Entity id '{}' must not contain '{}'",
            id,
            PairKey::SEPARATOR
        )));
    }
    Ok(HashMap::from([
        (
            String::from("campaign_key"),
            string_value(&campaign_key(project, campaign)?),
        ),
        (
            String::from("pair_key"),
            string_value(&PairKey::new(a, b).to_string()),
        ),
    ]))
}

fn string_value(value: &str) -> AttributeValue {
    AttributeValue {
        s: Some(value.to_string()),
        ..Default::default()
    }
}

fn number_value(value: i64) -> AttributeValue {
    AttributeValue {
        n: Some(value.to_string()),
        ..Default::default()
    }
}

fn required_string(item: &Item, name: &str) -> Result<String, ServiceError> {
    item.get(name)
        .and_then(|value| value.s.clone())
        .ok_or_else(|| {
            ServiceError::internal_server_error(format!(
                "Item is missing string attribute '{}'",
                name
            ))
        })
}

fn required_number<T>(item: &Item, name: &str) -> Result<T, ServiceError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = item
        .get(name)
        .and_then(|value| value.n.as_deref())
        .ok_or_else(|| {
            ServiceError::internal_server_error(format!(
                "Item is missing number attribute '{}'",
                name
            ))
        })?;
    raw.parse().map_err(|err| {
        ServiceError::internal_server_error(format!(
            "Unable to parse attribute '{}' ({}): {}",
            name, raw, err
        ))
    })
}

fn pair_from_item(item: &Item) -> Result<CandidatePair, ServiceError> {
    Ok(CandidatePair {
        id_a: required_string(item, "id_a")?,
        id_b: required_string(item, "id_b")?,
        cluster: required_number(item, "cluster")?,
        score: required_number(item, "score")?,
        verdict: item.get("verdict").and_then(|value| value.bool),
        canonical: item.get("canonical").and_then(|value| value.s.clone()),
    })
}

fn entity_from_item(item: &Item) -> Result<Entity, ServiceError> {
    let fields: Map<String, Value> = item
        .iter()
        .filter(|(name, _)| !matches!(name.as_str(), "project" | "id" | "type"))
        .map(|(name, value)| (name.clone(), attribute_to_json(value)))
        .collect();
    Ok(Entity {
        id: required_string(item, "id")?,
        kind: item.get("type").and_then(|value| value.s.clone()),
        fields,
    })
}

fn attribute_to_json(value: &AttributeValue) -> Value {
    if let Some(s) = &value.s {
        return Value::String(s.clone());
    }
    if let Some(n) = &value.n {
        return number_to_json(n);
    }
    if let Some(b) = value.bool {
        return Value::Bool(b);
    }
    if let Some(m) = &value.m {
        return Value::Object(
            m.iter()
                .map(|(k, v)| (k.clone(), attribute_to_json(v)))
                .collect(),
        );
    }
    if let Some(l) = &value.l {
        return Value::Array(l.iter().map(attribute_to_json).collect());
    }
    if let Some(ss) = &value.ss {
        return Value::Array(ss.iter().cloned().map(Value::String).collect());
    }
    if let Some(ns) = &value.ns {
        return Value::Array(ns.iter().map(|n| number_to_json(n)).collect());
    }
    Value::Null
}

fn number_to_json(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::Number(int.into());
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(raw.to_string()))
}
