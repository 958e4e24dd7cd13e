use crate::error::ServiceError;
use crate::response::Status;
use rusoto_core::Region;
use rusoto_s3::{PutObjectRequest, S3Client, S3};
use std::env;
use std::str::FromStr;

pub fn get_region() -> Result<Region, ServiceError> {
    match env::var("REGION") {
        Ok(val) => Region::from_str(val.as_str()).map_err(|_| ServiceError {
            msg: format!("Unable to parse region {}", val),
            status: Status::InternalServerError,
        }),
        _ => Err(ServiceError::internal_server_error(
            "Environment variable 'REGION' not found",
        )),
    }
}

pub fn get_env_var(name: &str) -> Result<String, ServiceError> {
    env::var(name).map_err(|_| {
        ServiceError::internal_server_error(&format!("Environment variable '{}' not found", name))
    })
}

/// Reads an optional variable and parses it, falling back to `default` when unset.
pub fn parse_env_var_or<T>(name: &str, default: T) -> Result<T, ServiceError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val.trim().parse().map_err(|err| {
            ServiceError::internal_server_error(format!(
                "Unable to parse environment variable '{}' ({}): {}",
                name, val, err
            ))
        }),
        Err(_) => Ok(default),
    }
}

pub async fn upload_object_to_s3(
    client: &S3Client,
    object: Vec<u8>,
    bucket: String,
    key: String,
) -> Result<(), ServiceError> {
    let request = PutObjectRequest {
        bucket,
        key,
        body: Some(object.into()),
        content_type: Some("text/csv".to_string()),
        ..Default::default()
    };
    client
        .put_object(request)
        .await
        .map(|_| ())
        .map_err(ServiceError::internal_server_error)
}
