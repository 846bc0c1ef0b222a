//! S3 and S3-compatible object stores
//!
//! Requests are signed with SigV4. With `endpoint` set the connector uses
//! path-style addressing against `baseURL`; otherwise it addresses
//! `<bucket>.s3.<region>.amazonaws.com`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use futures::future::join_all;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{
    ConnectionResult, MetaInfoResult, Options, ResourceType, Row, RuntimeResult, ValidateResult,
};
use tracing::{debug, warn};

use super::aws::{canonical_query, presign_query, sign, uri_encode, AwsCredentials, SigningRequest};
use super::common::{flexible_bool, flexible_u64, http_client, transport_error};
use super::traits::{decode_action, decode_resource, require_action, require_resource, Connector};

const SERVICE: &str = "s3";
const DEFAULT_EXPIRY_MINUTES: u64 = 5;
/// SigV4 presigned URLs are valid for at most seven days
const MAX_EXPIRY_MINUTES: u64 = 7 * 24 * 60;
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Deserialize)]
struct S3Options {
    #[serde(default)]
    region: String,
    #[serde(default, rename = "bucketName")]
    bucket_name: String,
    #[serde(default, rename = "accessKeyID")]
    access_key_id: String,
    #[serde(default, rename = "secretAccessKey")]
    secret_access_key: String,
    #[serde(default, deserialize_with = "flexible_bool")]
    endpoint: bool,
    #[serde(default, rename = "baseURL")]
    base_url: String,
    #[serde(default)]
    acl: String,
}

impl S3Options {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let opts: Self = decode_resource(options)?;
        require_resource(&opts.region, "region")?;
        if opts.endpoint {
            require_resource(&opts.base_url, "baseURL")?;
            url::Url::parse(&opts.base_url)
                .map_err(|e| SwitchyardError::InvalidResource(format!("baseURL: {}", e)))?;
        }
        Ok(opts)
    }

    fn credentials(&self) -> AwsCredentials {
        AwsCredentials {
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListArgs {
    #[serde(default)]
    bucket_name: String,
    #[serde(default)]
    prefix: String,
    #[serde(default)]
    delimiter: String,
    #[serde(default, deserialize_with = "flexible_u64")]
    max_keys: Option<u64>,
    #[serde(default, rename = "signedURL", deserialize_with = "flexible_bool")]
    signed_url: bool,
    /// Presigned URL lifetime in minutes
    #[serde(default, deserialize_with = "flexible_u64")]
    expiry: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectArgs {
    #[serde(default)]
    bucket_name: String,
    #[serde(default)]
    object_key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchDeleteArgs {
    #[serde(default)]
    bucket_name: String,
    #[serde(default)]
    object_key_list: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadArgs {
    #[serde(default)]
    bucket_name: String,
    #[serde(default)]
    object_key: String,
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    object_data: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchUploadArgs {
    #[serde(default)]
    bucket_name: String,
    #[serde(default)]
    content_type: Vec<String>,
    #[serde(default)]
    object_key_list: Vec<String>,
    #[serde(default)]
    object_data_list: Vec<String>,
}

/// An S3 action: the command plus its arguments
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "commands", content = "commandArgs", rename_all = "camelCase")]
enum S3Command {
    List(ListArgs),
    Read(ObjectArgs),
    Download(ObjectArgs),
    Delete(ObjectArgs),
    BatchDelete(BatchDeleteArgs),
    Upload(UploadArgs),
    BatchUpload(BatchUploadArgs),
}

impl S3Command {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let mut options = options.clone();
        match options.get("commandArgs") {
            None | Some(Value::Null) => {
                options.insert("commandArgs".to_string(), json!({}));
            }
            Some(Value::String(s)) => {
                let args: Value = if s.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(s)
                        .map_err(|e| SwitchyardError::InvalidAction(format!("commandArgs: {}", e)))?
                };
                options.insert("commandArgs".to_string(), args);
            }
            Some(_) => {}
        }

        let command: Self = decode_action(&options)?;
        match &command {
            S3Command::Read(args) | S3Command::Download(args) | S3Command::Delete(args) => {
                require_action(&args.object_key, "objectKey")?
            }
            S3Command::Upload(args) => require_action(&args.object_key, "objectKey")?,
            S3Command::BatchDelete(args) if args.object_key_list.is_empty() => {
                return Err(SwitchyardError::InvalidAction(
                    "objectKeyList must not be empty".to_string(),
                ))
            }
            S3Command::BatchUpload(args) => {
                if args.object_key_list.is_empty() {
                    return Err(SwitchyardError::InvalidAction(
                        "objectKeyList must not be empty".to_string(),
                    ));
                }
                if args.object_key_list.len() != args.object_data_list.len() {
                    return Err(SwitchyardError::InvalidAction(
                        "objectKeyList and objectDataList differ in length".to_string(),
                    ));
                }
            }
            _ => {}
        }
        Ok(command)
    }

    fn bucket_name(&self) -> &str {
        match self {
            S3Command::List(args) => &args.bucket_name,
            S3Command::Read(args) | S3Command::Download(args) | S3Command::Delete(args) => {
                &args.bucket_name
            }
            S3Command::BatchDelete(args) => &args.bucket_name,
            S3Command::Upload(args) => &args.bucket_name,
            S3Command::BatchUpload(args) => &args.bucket_name,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            S3Command::List(_) => "list",
            S3Command::Read(_) => "read",
            S3Command::Download(_) => "download",
            S3Command::Delete(_) => "delete",
            S3Command::BatchDelete(_) => "batchDelete",
            S3Command::Upload(_) => "upload",
            S3Command::BatchUpload(_) => "batchUpload",
        }
    }
}

/// Bucket from the command, falling back to the resource's
fn effective_bucket<'a>(command: &'a S3Command, opts: &'a S3Options) -> Result<&'a str, SwitchyardError> {
    let bucket = command.bucket_name().trim();
    if !bucket.is_empty() {
        return Ok(bucket);
    }
    let bucket = opts.bucket_name.trim();
    if !bucket.is_empty() {
        return Ok(bucket);
    }
    Err(SwitchyardError::InvalidAction("bucketName is required".to_string()))
}

/// Decode an upload payload: URL-unescape, then standard base64
fn decode_payload(data: &str) -> Result<Vec<u8>, SwitchyardError> {
    let unescaped = urlencoding::decode(data)
        .map_err(|e| SwitchyardError::InvalidAction(format!("objectData: {}", e)))?;
    STANDARD
        .decode(unescaped.trim().as_bytes())
        .map_err(|e| SwitchyardError::InvalidAction(format!("objectData is not base64: {}", e)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    contents: Vec<ObjectEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectEntry {
    key: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    last_modified: String,
    #[serde(default)]
    e_tag: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListAllMyBucketsResult {
    #[serde(default)]
    buckets: BucketList,
}

#[derive(Debug, Default, Deserialize)]
struct BucketList {
    #[serde(rename = "Bucket", default)]
    bucket: Vec<BucketEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BucketEntry {
    name: String,
}

/// Where a request goes: scheme, host (with port) and encoded path
#[derive(Debug, Clone, PartialEq)]
struct Location {
    scheme: String,
    host: String,
    path: String,
}

impl Location {
    fn url(&self, query: &str) -> String {
        if query.is_empty() {
            format!("{}://{}{}", self.scheme, self.host, self.path)
        } else {
            format!("{}://{}{}?{}", self.scheme, self.host, self.path, query)
        }
    }
}

/// One signed client bound to a resource
struct S3Client<'a> {
    opts: &'a S3Options,
    creds: AwsCredentials,
    http: reqwest::Client,
}

impl<'a> S3Client<'a> {
    fn new(opts: &'a S3Options, config: &RuntimeConfig) -> Result<Self, SwitchyardError> {
        Ok(Self {
            opts,
            creds: opts.credentials(),
            http: http_client(config)?,
        })
    }

    /// Resolve the location of a bucket (or the service root) and key
    fn locate(&self, bucket: Option<&str>, key: &str) -> Result<Location, SwitchyardError> {
        let encoded_key = uri_encode(key, true);
        if self.opts.endpoint {
            let base = url::Url::parse(&self.opts.base_url)
                .map_err(|e| SwitchyardError::InvalidResource(format!("baseURL: {}", e)))?;
            let host = match (base.host_str(), base.port()) {
                (Some(host), Some(port)) => format!("{}:{}", host, port),
                (Some(host), None) => host.to_string(),
                (None, _) => {
                    return Err(SwitchyardError::InvalidResource(
                        "baseURL has no host".to_string(),
                    ))
                }
            };
            let mut path = base.path().trim_end_matches('/').to_string();
            if let Some(bucket) = bucket {
                path.push('/');
                path.push_str(&uri_encode(bucket, false));
            }
            path.push('/');
            path.push_str(&encoded_key);
            return Ok(Location {
                scheme: base.scheme().to_string(),
                host,
                path,
            });
        }

        let host = match bucket {
            Some(bucket) => format!("{}.s3.{}.amazonaws.com", bucket, self.opts.region),
            None => format!("s3.{}.amazonaws.com", self.opts.region),
        };
        Ok(Location {
            scheme: "https".to_string(),
            host,
            path: format!("/{}", encoded_key),
        })
    }

    async fn send(
        &self,
        method: Method,
        location: &Location,
        query: &[(String, String)],
        headers: &[(String, String)],
        payload: Vec<u8>,
    ) -> Result<reqwest::Response, SwitchyardError> {
        let signed = sign(
            &self.creds,
            &self.opts.region,
            SERVICE,
            &SigningRequest {
                method: method.as_str(),
                host: &location.host,
                path: &location.path,
                query,
                headers,
                payload: &payload,
            },
            Utc::now(),
        )?;

        let mut request = self
            .http
            .request(method, location.url(&canonical_query(query)));
        for (name, value) in signed {
            request = request.header(name, value);
        }
        if !payload.is_empty() {
            request = request.body(payload);
        }
        let response = request
            .send()
            .await
            .map_err(|e| transport_error("S3", e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SwitchyardError::OperationFailed(format!(
            "S3 request failed (HTTP {}): {}",
            status.as_u16(),
            body.chars().take(500).collect::<String>()
        )))
    }

    async fn list_buckets(&self) -> Result<Vec<String>, SwitchyardError> {
        let location = self.locate(None, "")?;
        let response = self.send(Method::GET, &location, &[], &[], Vec::new()).await?;
        let body = read_text(response).await?;
        let parsed: ListAllMyBucketsResult = quick_xml::de::from_str(&body)
            .map_err(|e| SwitchyardError::OperationFailed(format!("S3: invalid XML: {}", e)))?;
        Ok(parsed.buckets.bucket.into_iter().map(|b| b.name).collect())
    }

    async fn list(&self, bucket: &str, args: &ListArgs) -> Result<Vec<Row>, SwitchyardError> {
        let location = self.locate(Some(bucket), "")?;
        let mut query = vec![("list-type".to_string(), "2".to_string())];
        if !args.prefix.is_empty() {
            query.push(("prefix".to_string(), args.prefix.clone()));
        }
        if !args.delimiter.is_empty() {
            query.push(("delimiter".to_string(), args.delimiter.clone()));
        }
        if let Some(max_keys) = args.max_keys.filter(|k| *k > 0) {
            query.push(("max-keys".to_string(), max_keys.to_string()));
        }

        let response = self.send(Method::GET, &location, &query, &[], Vec::new()).await?;
        let body = read_text(response).await?;
        let parsed: ListBucketResult = quick_xml::de::from_str(&body)
            .map_err(|e| SwitchyardError::OperationFailed(format!("S3: invalid XML: {}", e)))?;

        let expiry_minutes = args
            .expiry
            .filter(|m| *m > 0)
            .unwrap_or(DEFAULT_EXPIRY_MINUTES)
            .min(MAX_EXPIRY_MINUTES);
        let mut rows = Vec::with_capacity(parsed.contents.len());
        for entry in parsed.contents {
            let mut row = Row::new();
            if args.signed_url {
                let (url, expired_at) = self.presign_get(bucket, &entry.key, expiry_minutes)?;
                row.insert("signedURL".to_string(), Value::String(url));
                row.insert("expiredAt".to_string(), Value::String(expired_at));
            }
            row.insert("key".to_string(), Value::String(entry.key));
            row.insert("size".to_string(), json!(entry.size));
            row.insert("lastModified".to_string(), Value::String(entry.last_modified));
            row.insert("eTag".to_string(), Value::String(entry.e_tag));
            rows.push(row);
        }
        Ok(rows)
    }

    /// Presigned GET URL and its RFC 3339 expiry
    fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        minutes: u64,
    ) -> Result<(String, String), SwitchyardError> {
        let location = self.locate(Some(bucket), key)?;
        let now = Utc::now();
        let query = presign_query(
            &self.creds,
            &self.opts.region,
            SERVICE,
            &SigningRequest {
                method: "GET",
                host: &location.host,
                path: &location.path,
                query: &[],
                headers: &[],
                payload: b"",
            },
            minutes * 60,
            now,
        )?;
        let expired_at = now + chrono::Duration::minutes(minutes as i64);
        Ok((location.url(&query), expired_at.to_rfc3339()))
    }

    /// Fetch an object, enforcing the size ceiling before and after the download
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        ceiling: u64,
    ) -> Result<(Vec<u8>, String), SwitchyardError> {
        let location = self.locate(Some(bucket), key)?;

        let head = self.send(Method::HEAD, &location, &[], &[], Vec::new()).await?;
        let declared = head
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if let Some(size) = declared.filter(|size| *size > ceiling) {
            return Err(SwitchyardError::OversizeObject { size, limit: ceiling });
        }

        let response = self.send(Method::GET, &location, &[], &[], Vec::new()).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SwitchyardError::OperationFailed(format!("S3: {}", e)))?;
        let size = bytes.len() as u64;
        if size > ceiling {
            return Err(SwitchyardError::OversizeObject { size, limit: ceiling });
        }
        Ok((bytes.to_vec(), content_type))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), SwitchyardError> {
        let location = self.locate(Some(bucket), key)?;
        self.send(Method::DELETE, &location, &[], &[], Vec::new()).await?;
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        data: &str,
        ceiling: u64,
    ) -> Result<(), SwitchyardError> {
        let bytes = decode_payload(data)?;
        let size = bytes.len() as u64;
        if size > ceiling {
            return Err(SwitchyardError::OversizeObject { size, limit: ceiling });
        }

        let location = self.locate(Some(bucket), key)?;
        let content_type = if content_type.trim().is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            content_type
        };
        let mut headers = vec![("content-type".to_string(), content_type.to_string())];
        if !self.opts.acl.is_empty() {
            headers.push(("x-amz-acl".to_string(), self.opts.acl.clone()));
        }
        self.send(Method::PUT, &location, &[], &headers, bytes).await?;
        Ok(())
    }
}

async fn read_text(response: reqwest::Response) -> Result<String, SwitchyardError> {
    response
        .text()
        .await
        .map_err(|e| SwitchyardError::OperationFailed(format!("S3: {}", e)))
}

/// `{count, success, failure: [keys]}`
fn batch_row(keys: &[String], outcomes: Vec<Result<(), SwitchyardError>>) -> Row {
    let mut failure = Vec::new();
    for (key, outcome) in keys.iter().zip(outcomes) {
        if let Err(e) = outcome {
            warn!(key = %key, error = %e, "S3 batch item failed");
            failure.push(Value::String(key.clone()));
        }
    }
    let mut row = Row::new();
    row.insert("count".to_string(), json!(keys.len()));
    row.insert("success".to_string(), json!(keys.len() - failure.len()));
    row.insert("failure".to_string(), Value::Array(failure));
    row
}

/// S3 connector
pub struct S3Connector {
    config: Arc<RuntimeConfig>,
}

impl S3Connector {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for S3Connector {
    fn resource_type(&self) -> ResourceType {
        ResourceType::S3
    }

    fn validate_resource_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        S3Options::decode(options)?;
        Ok(ValidateResult::valid())
    }

    fn validate_action_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        S3Command::decode(options)?;
        Ok(ValidateResult::valid())
    }

    async fn test_connection(&self, options: &Options) -> Result<ConnectionResult, SwitchyardError> {
        let opts = S3Options::decode(options)?;
        S3Client::new(&opts, &self.config)?
            .list_buckets()
            .await
            .map_err(|e| SwitchyardError::ConnectFailed(e.to_string()))?;
        Ok(ConnectionResult::success())
    }

    async fn get_meta_info(&self, options: &Options) -> Result<MetaInfoResult, SwitchyardError> {
        let opts = S3Options::decode(options)?;
        let buckets = S3Client::new(&opts, &self.config)?.list_buckets().await?;
        Ok(MetaInfoResult::new(HashMap::from([(
            "buckets".to_string(),
            json!(buckets),
        )])))
    }

    async fn run(
        &self,
        resource_options: &Options,
        action_options: &Options,
    ) -> Result<RuntimeResult, SwitchyardError> {
        let opts = S3Options::decode(resource_options)?;
        let command = S3Command::decode(action_options)?;
        let bucket = effective_bucket(&command, &opts)?;
        let client = S3Client::new(&opts, &self.config)?;
        let ceiling = self.config.s3_max_object_size();

        debug!(command = command.name(), bucket = %bucket, "S3 request");
        match &command {
            S3Command::List(args) => Ok(RuntimeResult::with_rows(client.list(bucket, args).await?)),
            S3Command::Read(args) => {
                let (bytes, _) = client.get_object(bucket, &args.object_key, ceiling).await?;
                let mut row = Row::new();
                row.insert("objectData".to_string(), Value::String(STANDARD.encode(bytes)));
                Ok(RuntimeResult::single(row))
            }
            S3Command::Download(args) => {
                let (bytes, content_type) =
                    client.get_object(bucket, &args.object_key, ceiling).await?;
                let mut row = Row::new();
                row.insert("objectData".to_string(), Value::String(STANDARD.encode(bytes)));
                Ok(RuntimeResult::single(row)
                    .with_extra("Download", Value::Bool(true))
                    .with_extra("ContentType", Value::String(content_type))
                    .with_extra("ObjectKey", Value::String(args.object_key.clone())))
            }
            S3Command::Delete(args) => {
                client.delete_object(bucket, &args.object_key).await?;
                Ok(RuntimeResult::empty())
            }
            S3Command::BatchDelete(args) => {
                let outcomes = join_all(
                    args.object_key_list
                        .iter()
                        .map(|key| client.delete_object(bucket, key)),
                )
                .await;
                Ok(RuntimeResult::single(batch_row(&args.object_key_list, outcomes)))
            }
            S3Command::Upload(args) => {
                client
                    .put_object(bucket, &args.object_key, &args.content_type, &args.object_data, ceiling)
                    .await?;
                Ok(RuntimeResult::empty())
            }
            S3Command::BatchUpload(args) => {
                let uploads = args
                    .object_key_list
                    .iter()
                    .zip(&args.object_data_list)
                    .enumerate()
                    .map(|(i, (key, data))| {
                        let content_type = args.content_type.get(i).map(String::as_str).unwrap_or("");
                        client.put_object(bucket, key, content_type, data, ceiling)
                    });
                let outcomes = join_all(uploads).await;
                Ok(RuntimeResult::single(batch_row(&args.object_key_list, outcomes)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(value: Value) -> Options {
        value.as_object().cloned().unwrap()
    }

    fn resource(server: &MockServer) -> Options {
        options(json!({
            "region": "us-east-1",
            "accessKeyID": "AKID",
            "secretAccessKey": "SECRET",
            "endpoint": true,
            "baseURL": server.uri()
        }))
    }

    fn connector(ceiling: u64) -> S3Connector {
        S3Connector::new(Arc::new(RuntimeConfig {
            s3_max_object_size: Some(ceiling),
            ..RuntimeConfig::default()
        }))
    }

    #[test]
    fn test_resource_validation() {
        let connector = connector(10);
        assert!(matches!(
            connector.validate_resource_options(&options(json!({"bucketName": "b"}))),
            Err(SwitchyardError::InvalidResource(m)) if m.contains("region")
        ));
        assert!(matches!(
            connector.validate_resource_options(&options(json!({"region": "eu-west-1", "endpoint": true}))),
            Err(SwitchyardError::InvalidResource(m)) if m.contains("baseURL")
        ));
        assert!(connector
            .validate_resource_options(&options(json!({"region": "eu-west-1"})))
            .is_ok());
    }

    #[test]
    fn test_action_decoding() {
        let command = S3Command::decode(&options(json!({
            "commands": "list",
            "commandArgs": "{\"prefix\": \"logs/\", \"signedURL\": true, \"expiry\": \"10\"}"
        })))
        .unwrap();
        match command {
            S3Command::List(args) => {
                assert_eq!(args.prefix, "logs/");
                assert!(args.signed_url);
                assert_eq!(args.expiry, Some(10));
            }
            other => panic!("unexpected command {:?}", other),
        }

        assert!(matches!(
            S3Command::decode(&options(json!({"commands": "read", "commandArgs": {}}))),
            Err(SwitchyardError::InvalidAction(m)) if m.contains("objectKey")
        ));
        assert!(matches!(
            S3Command::decode(&options(json!({"commands": "rename"}))),
            Err(SwitchyardError::InvalidAction(_))
        ));
        assert!(matches!(
            S3Command::decode(&options(json!({
                "commands": "batchUpload",
                "commandArgs": {"objectKeyList": ["a", "b"], "objectDataList": ["aGk="]}
            }))),
            Err(SwitchyardError::InvalidAction(_))
        ));
    }

    #[test]
    fn test_effective_bucket() {
        let opts = S3Options::decode(&options(json!({"region": "r", "bucketName": "fallback"}))).unwrap();
        let scoped = S3Command::decode(&options(json!({
            "commands": "delete",
            "commandArgs": {"bucketName": "scoped", "objectKey": "k"}
        })))
        .unwrap();
        assert_eq!(effective_bucket(&scoped, &opts).unwrap(), "scoped");

        let unscoped = S3Command::decode(&options(json!({
            "commands": "delete",
            "commandArgs": {"objectKey": "k"}
        })))
        .unwrap();
        assert_eq!(effective_bucket(&unscoped, &opts).unwrap(), "fallback");

        let bare = S3Options::decode(&options(json!({"region": "r"}))).unwrap();
        assert!(matches!(
            effective_bucket(&unscoped, &bare),
            Err(SwitchyardError::InvalidAction(_))
        ));
    }

    #[test]
    fn test_virtual_host_location() {
        let opts = S3Options::decode(&options(json!({"region": "eu-west-1"}))).unwrap();
        let client = S3Client::new(&opts, &RuntimeConfig::default()).unwrap();
        let location = client.locate(Some("media"), "photos/a b.png").unwrap();
        assert_eq!(location.host, "media.s3.eu-west-1.amazonaws.com");
        assert_eq!(location.path, "/photos/a%20b.png");
        assert_eq!(
            location.url(""),
            "https://media.s3.eu-west-1.amazonaws.com/photos/a%20b.png"
        );
    }

    #[test]
    fn test_decode_payload_unescapes() {
        assert_eq!(decode_payload("aGVsbG8%3D").unwrap(), b"hello");
        assert!(decode_payload("not base64!").is_err());
    }

    #[tokio::test]
    async fn test_upload_then_read_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/b/k"))
            .and(body_bytes(b"hello".to_vec()))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/b/k"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b/k"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/plain")
                    .set_body_bytes(b"hello".to_vec()),
            )
            .mount(&server)
            .await;

        let connector = connector(1024);
        let resource = resource(&server);
        let encoded = STANDARD.encode(b"hello");
        connector
            .run(
                &resource,
                &options(json!({
                    "commands": "upload",
                    "commandArgs": {"bucketName": "b", "objectKey": "k", "objectData": encoded}
                })),
            )
            .await
            .unwrap();

        let result = connector
            .run(
                &resource,
                &options(json!({
                    "commands": "read",
                    "commandArgs": {"bucketName": "b", "objectKey": "k"}
                })),
            )
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0]["objectData"], json!(encoded));

        let download = connector
            .run(
                &resource,
                &options(json!({
                    "commands": "download",
                    "commandArgs": {"bucketName": "b", "objectKey": "k"}
                })),
            )
            .await
            .unwrap();
        assert_eq!(download.extra["Download"], json!(true));
        assert_eq!(download.extra["ContentType"], json!("text/plain"));
        assert_eq!(download.extra["ObjectKey"], json!("k"));
    }

    #[tokio::test]
    async fn test_read_ceiling_boundary() {
        let server = MockServer::start().await;
        for (key, body) in [("/b/exact", b"12345".to_vec()), ("/b/over", b"123456".to_vec())] {
            Mock::given(method("HEAD"))
                .and(path(key))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path(key))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
                .mount(&server)
                .await;
        }

        let connector = connector(5);
        let resource = resource(&server);
        let read = |key: &str| {
            options(json!({"commands": "read", "commandArgs": {"bucketName": "b", "objectKey": key}}))
        };

        assert!(connector.run(&resource, &read("exact")).await.is_ok());
        let err = connector.run(&resource, &read("over")).await.unwrap_err();
        assert!(matches!(err, SwitchyardError::OversizeObject { size: 6, limit: 5 }));
    }

    #[tokio::test]
    async fn test_upload_over_ceiling_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = connector(4)
            .run(
                &resource(&server),
                &options(json!({
                    "commands": "upload",
                    "commandArgs": {"bucketName": "b", "objectKey": "k", "objectData": STANDARD.encode(b"hello")}
                })),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::OversizeObject { size: 5, limit: 4 }));
    }

    #[tokio::test]
    async fn test_list_with_signed_urls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/b/"))
            .and(query_param("list-type", "2"))
            .and(query_param("prefix", "docs/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>b</Name>
  <Contents><Key>docs/a.txt</Key><LastModified>2024-01-01T00:00:00.000Z</LastModified><ETag>"e1"</ETag><Size>3</Size></Contents>
  <Contents><Key>docs/b.txt</Key><LastModified>2024-01-02T00:00:00.000Z</LastModified><ETag>"e2"</ETag><Size>7</Size></Contents>
</ListBucketResult>"#,
            ))
            .mount(&server)
            .await;

        let result = connector(1024)
            .run(
                &resource(&server),
                &options(json!({
                    "commands": "list",
                    "commandArgs": {"bucketName": "b", "prefix": "docs/", "signedURL": true, "expiry": 2}
                })),
            )
            .await
            .unwrap();

        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0]["key"], json!("docs/a.txt"));
        assert_eq!(result.rows[1]["size"], json!(7));
        let url = result.rows[0]["signedURL"].as_str().unwrap();
        assert!(url.contains("/b/docs/a.txt?"));
        assert!(url.contains("X-Amz-Expires=120"));
        assert!(chrono::DateTime::parse_from_rfc3339(result.rows[0]["expiredAt"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_batch_delete_reports_failures() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/b/ok"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/b/denied"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let result = connector(1024)
            .run(
                &resource(&server),
                &options(json!({
                    "commands": "batchDelete",
                    "commandArgs": {"bucketName": "b", "objectKeyList": ["ok", "denied"]}
                })),
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.rows[0]["count"], json!(2));
        assert_eq!(result.rows[0]["success"], json!(1));
        assert_eq!(result.rows[0]["failure"], json!(["denied"]));
    }

    #[tokio::test]
    async fn test_meta_lists_buckets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header("x-amz-content-sha256", super::super::aws::hex_sha256(b"").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<ListAllMyBucketsResult><Buckets><Bucket><Name>one</Name></Bucket>\
                 <Bucket><Name>two</Name></Bucket></Buckets></ListAllMyBucketsResult>",
            ))
            .mount(&server)
            .await;

        let meta = connector(1024).get_meta_info(&resource(&server)).await.unwrap();
        assert_eq!(meta.schema["buckets"], json!(["one", "two"]));
    }
}
