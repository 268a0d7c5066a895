//! S3-compatible remote folder provider.
//!
//! Treats a bucket prefix as the data folder: lists spreadsheets with
//! `ListObjectsV2`, downloads them with `GetObject`, and stores uploads with
//! `PutObject`. Requests are signed with AWS Signature V4 using the pure-Rust
//! `hmac` + `sha2` crates, so MinIO and other S3-compatible services work via
//! `endpoint_url`.
//!
//! # Configuration
//!
//! ```toml
//! [source]
//! provider = "s3"
//!
//! [source.s3]
//! bucket = "fcr-exports"
//! prefix = "daily/"
//! region = "ap-south-1"
//! # endpoint_url = "http://localhost:9000"   # MinIO, path-style
//! ```
//!
//! # Environment Variables
//!
//! - `AWS_ACCESS_KEY_ID` (required)
//! - `AWS_SECRET_ACCESS_KEY` (required)
//! - `AWS_SESSION_TOKEN` (optional)
//!
//! Missing credentials, HTTP failures, and non-2xx listing responses all
//! surface as [`IngestError::SourceUnavailable`], distinct from an empty
//! prefix.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::S3FolderConfig;
use crate::error::{IngestError, IngestResult};
use crate::models::SourceFile;
use crate::sources::{describe_file, validate_upload};
use crate::traits::FolderProvider;

type HmacSha256 = Hmac<Sha256>;

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const XLS_CONTENT_TYPE: &str = "application/vnd.ms-excel";

pub struct S3Provider {
    config: S3FolderConfig,
    client: reqwest::Client,
}

impl S3Provider {
    pub fn new(config: S3FolderConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn unavailable(&self, reason: impl std::fmt::Display) -> IngestError {
        IngestError::unavailable(self.name(), reason)
    }

    fn key_for(&self, name: &str) -> String {
        let prefix = self.config.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        }
    }

    async fn list_objects(&self, creds: &AwsCredentials) -> IngestResult<Vec<S3Object>> {
        let endpoint = Endpoint::for_config(&self.config);
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
            ];
            if !self.config.prefix.is_empty() {
                query.push(("prefix".to_string(), self.config.prefix.clone()));
            }
            if let Some(ref token) = continuation_token {
                query.push(("continuation-token".to_string(), token.clone()));
            }

            let request = SignedRequest::new(
                "GET",
                &endpoint,
                endpoint.object_path(""),
                query,
                b"",
            );
            let resp = request
                .build(&self.client, creds, &self.config.region, Utc::now())
                .send()
                .await
                .map_err(|e| self.unavailable(format!("ListObjectsV2 request failed: {}", e)))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(self.unavailable(format!(
                    "ListObjectsV2 failed (HTTP {}): {}",
                    status,
                    body.chars().take(500).collect::<String>()
                )));
            }

            let xml_body = resp
                .text()
                .await
                .map_err(|e| self.unavailable(format!("reading listing: {}", e)))?;
            let page = parse_list_objects_response(&xml_body);
            objects.extend(page.objects);

            match (page.is_truncated, page.next_token) {
                (true, Some(token)) => continuation_token = Some(token),
                _ => break,
            }
        }

        Ok(objects)
    }
}

#[async_trait]
impl FolderProvider for S3Provider {
    fn name(&self) -> String {
        format!("s3://{}/{}", self.config.bucket, self.config.prefix)
    }

    async fn list(&self) -> IngestResult<Vec<SourceFile>> {
        let creds = AwsCredentials::from_env().map_err(|e| self.unavailable(e))?;
        let objects = self.list_objects(&creds).await?;

        let mut files: Vec<SourceFile> = objects
            .iter()
            .filter_map(|obj| {
                let name = obj.key.rsplit('/').next().unwrap_or(&obj.key);
                describe_file(&obj.key, name, obj.last_modified, obj.size)
            })
            .collect();
        files.sort_by(|a, b| a.handle.cmp(&b.handle));
        Ok(files)
    }

    async fn open(&self, file: &SourceFile) -> IngestResult<Vec<u8>> {
        let creds = AwsCredentials::from_env().map_err(|e| self.unavailable(e))?;
        let endpoint = Endpoint::for_config(&self.config);
        let request = SignedRequest::new(
            "GET",
            &endpoint,
            endpoint.object_path(&file.handle),
            Vec::new(),
            b"",
        );

        let resp = request
            .build(&self.client, &creds, &self.config.region, Utc::now())
            .send()
            .await
            .map_err(|e| IngestError::malformed(&file.name, format!("GetObject failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(IngestError::malformed(
                &file.name,
                format!("GetObject failed (HTTP {})", resp.status()),
            ));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| IngestError::malformed(&file.name, e))?;
        Ok(bytes.to_vec())
    }

    async fn upload(&self, name: &str, bytes: &[u8]) -> IngestResult<SourceFile> {
        validate_upload(name, bytes)?;
        let creds = AwsCredentials::from_env().map_err(|e| self.unavailable(e))?;
        let endpoint = Endpoint::for_config(&self.config);
        let key = self.key_for(name);

        let content_type = if name.to_ascii_lowercase().ends_with(".xls") {
            XLS_CONTENT_TYPE
        } else {
            XLSX_CONTENT_TYPE
        };

        let request = SignedRequest::new("PUT", &endpoint, endpoint.object_path(&key), Vec::new(), bytes);
        let resp = request
            .build(&self.client, &creds, &self.config.region, Utc::now())
            .header("Content-Type", content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| self.unavailable(format!("PutObject failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(self.unavailable(format!(
                "PutObject failed (HTTP {}) for key '{}'",
                resp.status(),
                key
            )));
        }
        log::info!("uploaded s3://{}/{}", self.config.bucket, key);

        describe_file(&key, name, Utc::now(), bytes.len() as u64)
            .ok_or_else(|| IngestError::invalid_upload(name, "not an ingestible file name"))
    }
}

// ============ AWS Credentials ============

struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let access_key_id = lookup("AWS_ACCESS_KEY_ID")
            .filter(|v| !v.is_empty())
            .ok_or("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = lookup("AWS_SECRET_ACCESS_KEY")
            .filter(|v| !v.is_empty())
            .ok_or("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = lookup("AWS_SESSION_TOKEN").filter(|v| !v.is_empty());

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

// ============ Request signing ============

/// Where requests go: virtual-hosted AWS, or path-style custom endpoint.
struct Endpoint {
    scheme: &'static str,
    host: String,
    /// `""` for virtual-hosted style, `"/<bucket>"` for path style.
    bucket_path: String,
}

impl Endpoint {
    fn for_config(config: &S3FolderConfig) -> Self {
        match config.endpoint_url {
            Some(ref endpoint) => {
                let scheme = if endpoint.starts_with("http://") {
                    "http"
                } else {
                    "https"
                };
                let host = endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string();
                Self {
                    scheme,
                    host,
                    bucket_path: format!("/{}", uri_encode(&config.bucket)),
                }
            }
            None => Self {
                scheme: "https",
                host: format!("{}.s3.{}.amazonaws.com", config.bucket, config.region),
                bucket_path: String::new(),
            },
        }
    }

    /// Canonical URI path for an object key (`""` = bucket root).
    fn object_path(&self, key: &str) -> String {
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        format!("{}/{}", self.bucket_path, encoded_key)
    }
}

struct SignedRequest<'a> {
    method: &'static str,
    endpoint: &'a Endpoint,
    path: String,
    query: Vec<(String, String)>,
    payload_hash: String,
}

impl<'a> SignedRequest<'a> {
    fn new(
        method: &'static str,
        endpoint: &'a Endpoint,
        path: String,
        mut query: Vec<(String, String)>,
        payload: &[u8],
    ) -> Self {
        query.sort();
        Self {
            method,
            endpoint,
            path,
            query,
            payload_hash: hex_sha256(payload),
        }
    }

    fn canonical_query(&self) -> String {
        self.query
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Headers that take part in the signature, sorted by name.
    fn signed_headers(
        &self,
        creds: &AwsCredentials,
        amz_date: &str,
    ) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("host", self.endpoint.host.clone()),
            ("x-amz-content-sha256", self.payload_hash.clone()),
            ("x-amz-date", amz_date.to_string()),
        ];
        if let Some(ref token) = creds.session_token {
            headers.push(("x-amz-security-token", token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(b.0));
        headers
    }

    fn authorization(&self, creds: &AwsCredentials, region: &str, now: DateTime<Utc>) -> String {
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let headers = self.signed_headers(creds, &amz_date);

        let signed_header_names = headers
            .iter()
            .map(|(k, _)| *k)
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            self.method,
            self.path,
            self.canonical_query(),
            canonical_headers,
            signed_header_names,
            self.payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, region, "s3");
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            creds.access_key_id, credential_scope, signed_header_names, signature
        )
    }

    fn build(
        &self,
        client: &reqwest::Client,
        creds: &AwsCredentials,
        region: &str,
        now: DateTime<Utc>,
    ) -> reqwest::RequestBuilder {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let mut url = format!("{}://{}{}", self.endpoint.scheme, self.endpoint.host, self.path);
        let query = self.canonical_query();
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }

        let method = if self.method == "PUT" {
            reqwest::Method::PUT
        } else {
            reqwest::Method::GET
        };
        let mut builder = client
            .request(method, &url)
            .header("Authorization", self.authorization(creds, region, now))
            .header("x-amz-content-sha256", &self.payload_hash)
            .header("x-amz-date", &amz_date);
        if let Some(ref token) = creds.session_token {
            builder = builder.header("x-amz-security-token", token);
        }
        builder
    }
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// AWS SigV4 signing key: HMAC chain over date, region, service, "aws4_request".
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding; only `A-Z a-z 0-9 - _ . ~` pass through.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}

// ============ Listing response ============

struct S3Object {
    key: String,
    last_modified: DateTime<Utc>,
    size: u64,
}

struct ListPage {
    objects: Vec<S3Object>,
    is_truncated: bool,
    next_token: Option<String>,
}

fn parse_list_objects_response(xml: &str) -> ListPage {
    let mut objects = Vec::new();
    let is_truncated = extract_xml_value(xml, "IsTruncated")
        .map(|v| v == "true")
        .unwrap_or(false);
    let next_token = extract_xml_value(xml, "NextContinuationToken");

    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];
        remaining = &remaining[block_start + end + "</Contents>".len()..];

        let key = extract_xml_value(block, "Key").unwrap_or_default();
        if key.is_empty() || key.ends_with('/') {
            continue;
        }

        let last_modified = extract_xml_value(block, "LastModified")
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| DateTime::<Utc>::from(std::time::SystemTime::UNIX_EPOCH));
        let size = extract_xml_value(block, "Size")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        objects.push(S3Object {
            key: unescape_xml(&key),
            last_modified,
            size,
        });
    }

    ListPage {
        objects,
        is_truncated,
        next_token,
    }
}

/// Text content of the first `<tag>` (simple, non-nested).
fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let value_start = xml.find(&open)? + open.len();
    let end = xml[value_start..].find(&close)?;
    Some(xml[value_start..value_start + end].to_string())
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
