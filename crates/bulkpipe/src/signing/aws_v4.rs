//! 🔒 AWS Signature Version 4 — proving who we are, one HMAC at a time.
//!
//! 🎬 *[a request leaves the process. it is wearing a lanyard.]*
//! *["Credential=AKID.../20150830/us-east-1/es/aws4_request," reads the lanyard.]*
//! *[the bouncer recomputes the signature. it matches. the bouncer nods.]*
//!
//! ## Knowledge Graph 🧠
//! - Canonical request = method, URI, query, headers, signed-header list, body hash
//! - String to sign = algorithm, timestamp, scope, hash(canonical request)
//! - Signing key = HMAC chain: secret → date → region → service → "aws4_request"
//! - Signature = hex(HMAC(signing key, string to sign))
//! - Pure: same request + same credentials + same timestamp = same signature

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Request;
use reqwest::header::{AUTHORIZATION, HOST, HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};

use super::credentials::Credentials;
use crate::error::{PipelineError, Result};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const X_AMZ_DATE: HeaderName = HeaderName::from_static("x-amz-date");
const X_AMZ_SECURITY_TOKEN: HeaderName = HeaderName::from_static("x-amz-security-token");

/// ✍️ Signs requests with one set of credentials. Holds no mutable state.
#[derive(Debug, Clone)]
pub struct AwsV4Signer {
    credentials: Credentials,
}

impl AwsV4Signer {
    /// 🏗️ Empty keys are rejected up front. A blank secret is not a secret,
    /// it's a confession.
    pub fn new(credentials: Credentials) -> Result<Self> {
        if credentials.access_key_id().is_empty() {
            return Err(PipelineError::configuration("not a valid access key: it is empty"));
        }
        if credentials.secret_access_key().is_empty() {
            return Err(PipelineError::configuration("not a valid secret key: it is empty"));
        }
        Ok(Self { credentials })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// 🚀 Sign with the wall clock.
    pub fn sign(&self, request: &mut Request, service: &str, region: &str) -> Result<()> {
        self.sign_at(request, service, region, Utc::now())
    }

    /// 🎯 Sign as of `timestamp`. Adds `host` (if missing), `x-amz-date`,
    /// `Authorization`, and `x-amz-security-token` when a session token exists.
    pub fn sign_at(
        &self,
        request: &mut Request,
        service: &str,
        region: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        if service.is_empty() {
            return Err(PipelineError::configuration("not a valid service: it is empty"));
        }
        if region.is_empty() {
            return Err(PipelineError::configuration("not a valid region: it is empty"));
        }

        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = timestamp.format("%Y%m%d").to_string();

        if !request.headers().contains_key(HOST) {
            let host = host_header_value(request)?;
            request.headers_mut().insert(HOST, header_value(&host)?);
        }
        request
            .headers_mut()
            .insert(X_AMZ_DATE, header_value(&amz_date)?);

        let payload_hash = match request.body() {
            None => hex_sha256(b""),
            Some(body) => hex_sha256(body.as_bytes().ok_or_else(|| {
                PipelineError::configuration("streaming request bodies cannot be signed")
            })?),
        };

        let (canonical_headers, signed_headers) = canonical_headers(request.headers());
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            request.method().as_str(),
            canonical_uri(request.url().path()),
            canonical_query(request.url()),
            canonical_headers,
            signed_headers,
            payload_hash,
        );

        let credential_scope = format!("{date_stamp}/{region}/{service}/aws4_request");
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{credential_scope}\n{}",
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = signing_key(
            self.credentials.secret_access_key(),
            &date_stamp,
            region,
            service,
        );
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            self.credentials.access_key_id(),
        );
        request
            .headers_mut()
            .insert(AUTHORIZATION, header_value(&authorization)?);

        // 🔑 added after signing, so it rides along unsigned
        if let Some(token) = self.credentials.session_token() {
            request
                .headers_mut()
                .insert(X_AMZ_SECURITY_TOKEN, header_value(token)?);
        }

        Ok(())
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| PipelineError::configuration(format!("invalid header value {value:?}: {e}")))
}

fn host_header_value(request: &Request) -> Result<String> {
    let url = request.url();
    let host = url
        .host_str()
        .ok_or_else(|| PipelineError::configuration(format!("request url {url} has no host")))?;
    // 🔧 Url::port() is None for the scheme's default port, which is exactly when Host omits it
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn hex_sha256(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// 🔑 `HMAC(HMAC(HMAC(HMAC("AWS4"+secret, date), region), service), "aws4_request")`
pub(crate) fn signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_secret = format!("AWS4{secret}");
    let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// 🔧 RFC 3986 encoding over the unreserved set. Everything else, `*` included,
/// becomes `%XX` with uppercase hex.
fn uri_encode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

/// 📐 Each `/`-separated segment encoded on its own. The path from `Url` is already
/// percent-encoded once, so this yields the double encoding non-S3 services expect.
fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

fn canonical_query(url: &reqwest::Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| (uri_encode(&key), uri_encode(&value)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// 📋 Returns (`name:v1,v2\n` lines, `name1;name2`). HeaderMap keys are already
/// lower-case; sorting them is on us.
fn canonical_headers(headers: &HeaderMap) -> (String, String) {
    let mut names: Vec<&HeaderName> = headers.keys().collect();
    names.sort_by(|a, b| a.as_str().cmp(b.as_str()));

    let mut canonical = String::new();
    for name in &names {
        let values = headers
            .get_all(*name)
            .iter()
            .map(|value| String::from_utf8_lossy(value.as_bytes()).trim().to_string())
            .collect::<Vec<_>>()
            .join(",");
        canonical.push_str(name.as_str());
        canonical.push(':');
        canonical.push_str(&values);
        canonical.push('\n');
    }

    let signed = names
        .iter()
        .map(|name| name.as_str())
        .collect::<Vec<_>>()
        .join(";");
    (canonical, signed)
}
