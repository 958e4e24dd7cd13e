use crate::error::ServiceError;
use crate::util::{get_env_var, parse_env_var_or};
use std::env;
use std::fmt;
use std::str::FromStr;

/// How the selector breaks ties between several open clusters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectionPolicy {
    #[default]
    LowestId,
    HighestScore,
}

impl FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lowest-id" => Ok(SelectionPolicy::LowestId),
            "highest-score" => Ok(SelectionPolicy::HighestScore),
            other => Err(format!(
                "unknown cluster selection '{}', expected 'lowest-id' or 'highest-score'",
                other
            )),
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SelectionPolicy::LowestId => write!(f, "lowest-id"),
            SelectionPolicy::HighestScore => write!(f, "highest-score"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReviewConfig {
    /// Value written to an entity's `type` when it becomes canonical.
    pub canonical_type: String,
    pub selection: SelectionPolicy,
    /// Pairs scoring below this are counted but never listed.
    pub min_listed_score: Option<f64>,
    pub max_batch_size: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        ReviewConfig {
            canonical_type: String::from("canonical"),
            selection: SelectionPolicy::LowestId,
            min_listed_score: None,
            max_batch_size: 100,
        }
    }
}

impl ReviewConfig {
    pub fn from_env() -> Result<Self, ServiceError> {
        let defaults = ReviewConfig::default();
        let min_listed_score = match env::var("MIN_LISTED_SCORE") {
            Ok(val) => Some(val.trim().parse::<f64>().map_err(|err| {
                ServiceError::internal_server_error(format!(
                    "Unable to parse environment variable 'MIN_LISTED_SCORE' ({}): {}",
                    val, err
                ))
            })?),
            Err(_) => None,
        };
        let config = ReviewConfig {
            canonical_type: parse_env_var_or("CANONICAL_TYPE", defaults.canonical_type)?,
            selection: parse_env_var_or("CLUSTER_SELECTION", defaults.selection)?,
            min_listed_score,
            max_batch_size: parse_env_var_or("MAX_BATCH_SIZE", defaults.max_batch_size)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.canonical_type.trim().is_empty() {
            return Err(ServiceError::internal_server_error(
                "CANONICAL_TYPE must not be empty",
            ));
        }
        if self.max_batch_size == 0 {
            return Err(ServiceError::internal_server_error(
                "MAX_BATCH_SIZE must be positive",
            ));
        }
        Ok(())
    }
}

/// DynamoDB table names backing the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableNames {
    pub entities: String,
    pub pairs: String,
}

impl TableNames {
    pub fn from_env() -> Result<Self, ServiceError> {
        Ok(TableNames {
            entities: get_env_var("ENTITY_TABLE")?,
            pairs: get_env_var("PAIR_TABLE")?,
        })
    }
}
