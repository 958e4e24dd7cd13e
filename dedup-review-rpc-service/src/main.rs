mod dispatch;

use dedup_review_service::config::{ReviewConfig, TableNames};
use dedup_review_service::error::ServiceError;
use dedup_review_service::response::make_response_payload;
use dedup_review_service::store::DynamoStore;
use dedup_review_service::util::get_region;
use dedup_review_service::ReviewService;
use dispatch::{dispatch, RpcCall};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use lazy_static::lazy_static;
use rusoto_core::{Client, Region};
use rusoto_dynamodb::DynamoDbClient;
use rusoto_s3::S3Client;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

lazy_static! {
    // AWS Region
    static ref REGION: Region = get_region().unwrap();
    // Entity and pair tables
    static ref TABLES: TableNames = TableNames::from_env().unwrap();
    // Review behaviour
    static ref CONFIG: ReviewConfig = ReviewConfig::from_env().unwrap();
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .without_time()
        .init();
    run(service_fn(process)).await?;
    Ok(())
}

async fn process(event: LambdaEvent<Value>) -> Result<Value, Error> {
    let (payload, _context) = event.into_parts();
    let result = handle(payload).await;
    if let Err(err) = &result {
        tracing::warn!(status = ?err.status, error = %err.msg, "call failed");
    }
    make_response_payload(result)
}

async fn handle(payload: Value) -> Result<Value, ServiceError> {
    let call = RpcCall::from_event(payload)?;
    let dynamo = DynamoDbClient::new_with_client(Client::shared(), REGION.clone());
    let service = ReviewService::new(DynamoStore::new(dynamo, TABLES.clone()), CONFIG.clone());
    let s3 = S3Client::new_with_client(Client::shared(), REGION.clone());
    dispatch(&service, &s3, call).await
}
