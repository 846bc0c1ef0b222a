//! AWS Signature Version 4 signing shared by the S3 and DynamoDB connectors

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use switchyard_core::SwitchyardError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Payload hash sentinel used by presigned URLs
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Static access key pair
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// The parts of a request covered by the signature
#[derive(Debug, Clone)]
pub struct SigningRequest<'a> {
    pub method: &'a str,
    pub host: &'a str,
    /// Already URI-encoded path, starting with `/`
    pub path: &'a str,
    pub query: &'a [(String, String)],
    /// Extra headers to sign besides `host`, `x-amz-date` and `x-amz-content-sha256`
    pub headers: &'a [(String, String)],
    pub payload: &'a [u8],
}

pub fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SwitchyardError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| SwitchyardError::Internal(format!("HMAC key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// `kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")`
fn signing_key(
    secret: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, SwitchyardError> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding; `/` is kept when encoding object-key paths
pub fn uri_encode(s: &str, keep_slash: bool) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char)
            }
            b'/' if keep_slash => result.push('/'),
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}

/// Sorted, encoded query string
pub fn canonical_query(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_encode(k, false), uri_encode(v, false)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

struct Scope {
    amz_date: String,
    credential_scope: String,
    key: Vec<u8>,
}

impl Scope {
    fn new(
        creds: &AwsCredentials,
        region: &str,
        service: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, SwitchyardError> {
        let date_stamp = now.format("%Y%m%d").to_string();
        Ok(Self {
            amz_date: now.format("%Y%m%dT%H%M%SZ").to_string(),
            credential_scope: format!("{}/{}/{}/aws4_request", date_stamp, region, service),
            key: signing_key(&creds.secret_access_key, &date_stamp, region, service)?,
        })
    }

    fn signature(&self, canonical_request: &str) -> Result<String, SwitchyardError> {
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            self.amz_date,
            self.credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );
        Ok(hex::encode(hmac_sha256(&self.key, string_to_sign.as_bytes())?))
    }
}

/// Sign a request; returns the headers to attach (excluding `host`)
pub fn sign(
    creds: &AwsCredentials,
    region: &str,
    service: &str,
    request: &SigningRequest<'_>,
    now: DateTime<Utc>,
) -> Result<Vec<(String, String)>, SwitchyardError> {
    let scope = Scope::new(creds, region, service, now)?;
    let payload_hash = hex_sha256(request.payload);

    let mut headers: Vec<(String, String)> = vec![
        ("host".to_string(), request.host.to_string()),
        ("x-amz-content-sha256".to_string(), payload_hash.clone()),
        ("x-amz-date".to_string(), scope.amz_date.clone()),
    ];
    headers.extend(
        request
            .headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string())),
    );
    headers.sort();

    let signed_headers = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        request.path,
        canonical_query(request.query),
        canonical_headers,
        signed_headers,
        payload_hash
    );

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM,
        creds.access_key_id,
        scope.credential_scope,
        signed_headers,
        scope.signature(&canonical_request)?
    );

    Ok(headers
        .into_iter()
        .filter(|(k, _)| k != "host")
        .chain(std::iter::once(("authorization".to_string(), authorization)))
        .collect())
}

/// Build the query string of a presigned URL valid for `expires_secs`
///
/// Only the method, host and path of `request` are signed.
pub fn presign_query(
    creds: &AwsCredentials,
    region: &str,
    service: &str,
    request: &SigningRequest<'_>,
    expires_secs: u64,
    now: DateTime<Utc>,
) -> Result<String, SwitchyardError> {
    let scope = Scope::new(creds, region, service, now)?;
    let mut query = vec![
        ("X-Amz-Algorithm".to_string(), ALGORITHM.to_string()),
        (
            "X-Amz-Credential".to_string(),
            format!("{}/{}", creds.access_key_id, scope.credential_scope),
        ),
        ("X-Amz-Date".to_string(), scope.amz_date.clone()),
        ("X-Amz-Expires".to_string(), expires_secs.to_string()),
        ("X-Amz-SignedHeaders".to_string(), "host".to_string()),
    ];

    let canonical_request = format!(
        "{}\n{}\n{}\nhost:{}\n\nhost\n{}",
        request.method,
        request.path,
        canonical_query(&query),
        request.host,
        UNSIGNED_PAYLOAD
    );
    query.push(("X-Amz-Signature".to_string(), scope.signature(&canonical_request)?));
    Ok(canonical_query(&query))
}
