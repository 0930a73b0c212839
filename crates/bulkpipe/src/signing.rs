//! 🔏 Signing — SigV4 for the managed flavor of Elasticsearch.
//!
//! 🎬 *[a request approaches the gate of `search-logs.us-east-1.es.amazonaws.com`]*
//! *[the guard squints. "papers."]*
//! *[the request produces an Authorization header, an x-amz-date, and a nervous smile.]*
//!
//! Self-hosted clusters don't care about any of this; requests to them pass through
//! untouched. Only hosts ending in `.<region>.es.amazonaws.com` get the paperwork.
//!
//! 🧠 Knowledge graph:
//! - `aws_v4` → the pure algorithm (canonical request, key derivation, header stamping)
//! - `credentials` → providers + the single-flight TTL cache
//! - `ElasticsearchSigner` → glues the two together for service `es`, shared by every sink

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use reqwest::Request;
use tracing::trace;

pub mod aws_v4;
pub mod credentials;

pub use aws_v4::AwsV4Signer;
pub use credentials::{
    AwsSdkCredentialProvider, CredentialCache, CredentialProvider, Credentials,
    DEFAULT_CREDENTIAL_TTL, StaticCredentialProvider,
};

use crate::error::{PipelineError, Result};

/// 📡 The SigV4 service name for the managed Elasticsearch service.
pub const ELASTICSEARCH_SERVICE: &str = "es";

static MANAGED_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.([^.]+)\.es\.amazonaws\.com$").expect("managed host pattern is valid")
});

/// 🗺️ The region of a managed host, or `None` for anything else.
///
/// `search-logs.us-west-2.es.amazonaws.com` → `Some("us-west-2")`.
pub fn managed_region(host: &str) -> Option<String> {
    MANAGED_HOST
        .captures(host)
        .and_then(|captures| captures.get(1))
        .map(|region| region.as_str().to_string())
}

/// 🔏 One signer per pipeline, shared by every sink through an `Arc`.
#[derive(Debug)]
pub struct ElasticsearchSigner {
    credentials: CredentialCache,
}

impl ElasticsearchSigner {
    pub fn new(provider: Arc<dyn CredentialProvider>, ttl: Duration) -> Self {
        Self {
            credentials: CredentialCache::new(provider, ttl),
        }
    }

    /// ✍️ Sign for service `es` in `region`, with credentials from the cache.
    pub async fn sign(&self, request: &mut Request, region: &str) -> Result<()> {
        let signer = self.credentials.signer().await?;
        signer.sign(request, ELASTICSEARCH_SERVICE, region)
    }

    /// 🎯 Sign only when the request's host is a managed one. Returns whether it did.
    pub async fn sign_if_managed(&self, request: &mut Request) -> Result<bool> {
        let host = request
            .url()
            .host_str()
            .ok_or_else(|| PipelineError::configuration("request URL has no host"))?;
        let Some(region) = managed_region(host) else {
            trace!("🚪 {host} is not a managed host, sending unsigned");
            return Ok(false);
        };
        self.sign(request, &region).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    fn the_signer() -> ElasticsearchSigner {
        let provider = StaticCredentialProvider::new(Credentials::new("AKIDEXAMPLE", "secret", None));
        ElasticsearchSigner::new(Arc::new(provider), DEFAULT_CREDENTIAL_TTL)
    }

    #[test]
    fn the_one_where_the_region_hides_in_the_hostname() {
        assert_eq!(
            managed_region("search-logs-abc123.us-west-2.es.amazonaws.com").as_deref(),
            Some("us-west-2")
        );
        assert_eq!(
            managed_region("SEARCH.EU-CENTRAL-1.ES.AMAZONAWS.COM").as_deref(),
            Some("EU-CENTRAL-1")
        );
        assert_eq!(managed_region("localhost"), None);
        assert_eq!(managed_region("es.amazonaws.com"), None);
        assert_eq!(managed_region("search.us-east-1.es.amazonaws.com.evil.io"), None);
    }

    #[tokio::test]
    async fn the_one_where_a_managed_host_gets_the_paperwork() -> anyhow::Result<()> {
        let the_url = "https://search-logs.us-east-1.es.amazonaws.com/_bulk".parse()?;
        let mut the_request = Request::new(Method::POST, the_url);

        assert!(the_signer().sign_if_managed(&mut the_request).await?);
        let the_auth = the_request.headers()["authorization"].to_str()?;
        assert!(the_auth.contains("/us-east-1/es/aws4_request"), "scope was {the_auth}");
        assert!(the_request.headers().contains_key("x-amz-date"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_self_hosted_cluster_is_left_alone() -> anyhow::Result<()> {
        let the_url = "http://localhost:9200/_bulk".parse()?;
        let mut the_request = Request::new(Method::POST, the_url);

        assert!(!the_signer().sign_if_managed(&mut the_request).await?);
        assert!(the_request.headers().is_empty());
        Ok(())
    }
}
