use async_trait::async_trait;
use dedup_review_service::dto::{
    CampaignRef, DuplicateHumanCheck, ExportTarget, GiveMeDuplicates,
};
use dedup_review_service::error::ServiceError;
use dedup_review_service::store::CandidateStore;
use dedup_review_service::util::upload_object_to_s3;
use dedup_review_service::ReviewService;
use rusoto_s3::S3Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

/// One remote call, decoded from `{"method": ..., "params": {...}}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum RpcCall {
    GiveMeDuplicates(GiveMeDuplicates),
    DuplicateHumanCheck(DuplicateHumanCheck),
    ReconcileCanonical(CampaignRef),
    ExportVerdicts(ExportTarget),
}

impl RpcCall {
    pub fn from_event(payload: Value) -> Result<Self, ServiceError> {
        serde_json::from_value(payload).map_err(ServiceError::bad_request)
    }

    fn method(&self) -> &'static str {
        match self {
            RpcCall::GiveMeDuplicates(_) => "give_me_duplicates",
            RpcCall::DuplicateHumanCheck(_) => "duplicate_human_check",
            RpcCall::ReconcileCanonical(_) => "reconcile_canonical",
            RpcCall::ExportVerdicts(_) => "export_verdicts",
        }
    }
}

/// Destination for exported objects.
#[async_trait]
pub trait ObjectSink: Send + Sync {
    async fn put(&self, bucket: String, key: String, object: Vec<u8>) -> Result<(), ServiceError>;
}

#[async_trait]
impl ObjectSink for S3Client {
    async fn put(&self, bucket: String, key: String, object: Vec<u8>) -> Result<(), ServiceError> {
        upload_object_to_s3(self, object, bucket, key).await
    }
}

pub async fn dispatch<S, O>(
    service: &ReviewService<S>,
    sink: &O,
    call: RpcCall,
) -> Result<Value, ServiceError>
where
    S: CandidateStore,
    O: ObjectSink,
{
    info!(method = call.method(), "dispatching call");
    match call {
        RpcCall::GiveMeDuplicates(req) => {
            let batch = service
                .fetch_batch(&req.project, &req.campaign, req.limit, req.cluster_id)
                .await?;
            serde_json::to_value(batch).map_err(ServiceError::internal_server_error)
        }
        RpcCall::DuplicateHumanCheck(req) => {
            let outcome = service
                .record_verdict(&req.project, &req.campaign, &req.ids, req.verdict)
                .await?;
            serde_json::to_value(outcome).map_err(ServiceError::internal_server_error)
        }
        RpcCall::ReconcileCanonical(req) => {
            let marked = service
                .reconcile_canonical(&req.project, &req.campaign)
                .await?;
            Ok(json!({ "marked": marked }))
        }
        RpcCall::ExportVerdicts(req) => {
            let (object, rows) = service
                .export_verdicts(&req.project, &req.campaign)
                .await?;
            sink.put(req.bucket.clone(), req.key.clone(), object).await?;
            Ok(json!({ "bucket": req.bucket, "key": req.key, "rows": rows }))
        }
    }
}
