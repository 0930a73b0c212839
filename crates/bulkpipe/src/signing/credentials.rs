//! 🔑 Credentials — where the keys come from, and how long we trust them.
//!
//! 🎬 *[sixty seconds on the clock. forty requests at the door.]*
//! *[one of them goes to fetch fresh keys. the other thirty-nine wait politely.]*
//! *[nobody calls the provider twice. nobody.]*
//!
//! 🧠 Knowledge graph:
//! - `CredentialProvider` trait → Static and AWS SDK default-chain impls
//! - `CredentialCache` → wraps a provider, hands out `Arc<AwsV4Signer>`, refreshes after `ttl`
//! - Single-flight: the async mutex is held across the expiry check AND the provider call,
//!   so concurrent callers during a miss all wait on one refresh

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;
use tracing::debug;

use super::aws_v4::AwsV4Signer;
use crate::error::{PipelineError, Result};

/// ⏱️ How long a fetched set of credentials is trusted.
pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(60);

/// 🔒 Access key, secret key, maybe a session token. Debug output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// 🚰 Somewhere credentials come from. Opaque to the pipeline.
#[async_trait]
pub trait CredentialProvider: Send + Sync + fmt::Debug {
    async fn fetch(&self) -> Result<Credentials>;
}

/// 📌 The same credentials, every time.
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credentials: Credentials,
}

impl StaticCredentialProvider {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn fetch(&self) -> Result<Credentials> {
        Ok(self.credentials.clone())
    }
}

/// ☁️ The AWS SDK's default credential chain: environment, shared profile files,
/// web identity, ECS container and EC2 instance metadata, in the SDK's order.
///
/// The SDK config is loaded lazily on first fetch, once. Every fetch after that asks
/// the resolved chain again, so rotating role credentials come through when the
/// `CredentialCache` in front of this expires.
#[derive(Debug, Default)]
pub struct AwsSdkCredentialProvider {
    resolved: OnceCell<SharedCredentialsProvider>,
}

impl AwsSdkCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 🔌 Skip the default chain and ask this SDK provider instead.
    pub fn from_provider(provider: SharedCredentialsProvider) -> Self {
        Self {
            resolved: OnceCell::new_with(Some(provider)),
        }
    }

    async fn chain(&self) -> Result<&SharedCredentialsProvider> {
        self.resolved
            .get_or_try_init(|| async {
                // 🔧 env vars → ~/.aws/config → web identity → container → IMDS → hope.
                let the_sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
                the_sdk_config.credentials_provider().ok_or_else(|| {
                    PipelineError::credential(
                        "the AWS SDK config came back without a credentials provider",
                    )
                })
            })
            .await
    }
}

#[async_trait]
impl CredentialProvider for AwsSdkCredentialProvider {
    async fn fetch(&self) -> Result<Credentials> {
        let the_chain = self.chain().await?;
        let the_sdk_credentials = the_chain
            .provide_credentials()
            .await
            .map_err(|err| PipelineError::credential(describe_sdk_error(&err)))?;
        Ok(Credentials::new(
            the_sdk_credentials.access_key_id(),
            the_sdk_credentials.secret_access_key(),
            the_sdk_credentials.session_token().map(str::to_string),
        ))
    }
}

/// 🧅 The SDK's top-level message is generic; the useful part sits in the sources.
fn describe_sdk_error(err: &(dyn std::error::Error + 'static)) -> String {
    let mut the_story = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        the_story.push_str(": ");
        the_story.push_str(&inner.to_string());
        cause = inner.source();
    }
    the_story
}

#[derive(Debug)]
struct CachedSigner {
    signer: Arc<AwsV4Signer>,
    fetched_at: Instant,
}

/// ⏳ A signer built from credentials no older than `ttl`.
#[derive(Debug)]
pub struct CredentialCache {
    provider: Arc<dyn CredentialProvider>,
    ttl: Duration,
    slot: Mutex<Option<CachedSigner>>,
}

impl CredentialCache {
    pub fn new(provider: Arc<dyn CredentialProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// 🔑 The cached signer, refreshed through the provider when stale.
    ///
    /// The lock is held while fetching. Callers arriving mid-refresh queue on the
    /// lock and find a fresh entry when they get in.
    pub async fn signer(&self) -> Result<Arc<AwsV4Signer>> {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&cached.signer));
            }
        }

        debug!("🔑 Credential cache is cold or stale, fetching from {:?}", self.provider);
        let credentials = self.provider.fetch().await?;
        let signer = Arc::new(AwsV4Signer::new(credentials)?);
        *slot = Some(CachedSigner {
            signer: Arc::clone(&signer),
            fetched_at: Instant::now(),
        });
        Ok(signer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_credential_types::provider::error::CredentialsError;
    use aws_credential_types::provider::future as sdk_future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 🧪 Counts its calls and dawdles a bit, so concurrent callers overlap.
    #[derive(Debug, Default)]
    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CredentialProvider for CountingProvider {
        async fn fetch(&self) -> Result<Credentials> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Credentials::new(format!("akid-{n}"), "secret", None))
        }
    }

    #[derive(Debug)]
    struct BrokenProvider;

    #[async_trait]
    impl CredentialProvider for BrokenProvider {
        async fn fetch(&self) -> Result<Credentials> {
            Err(PipelineError::credential("the vault is on fire"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_forty_callers_share_one_refresh() -> anyhow::Result<()> {
        let provider = Arc::new(CountingProvider::default());
        let cache = Arc::new(CredentialCache::new(provider.clone(), DEFAULT_CREDENTIAL_TTL));

        let the_crowd = (0..40).map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.signer().await })
        });
        for the_caller in futures::future::join_all(the_crowd).await {
            let signer = the_caller??;
            assert_eq!(signer.credentials().access_key_id(), "akid-1");
        }

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_credentials_expire_after_a_minute() -> anyhow::Result<()> {
        let provider = Arc::new(CountingProvider::default());
        let cache = CredentialCache::new(provider.clone(), DEFAULT_CREDENTIAL_TTL);

        assert_eq!(cache.signer().await?.credentials().access_key_id(), "akid-1");
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.signer().await?.credentials().access_key_id(), "akid-1");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.signer().await?.credentials().access_key_id(), "akid-2");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_failed_fetch_is_a_credential_error() {
        let cache = CredentialCache::new(Arc::new(BrokenProvider), DEFAULT_CREDENTIAL_TTL);
        assert!(matches!(cache.signer().await, Err(PipelineError::Credential(_))));
    }

    #[tokio::test]
    async fn the_one_where_empty_keys_never_make_it_into_the_cache() {
        let provider = StaticCredentialProvider::new(Credentials::new("", "secret", None));
        let cache = CredentialCache::new(Arc::new(provider), DEFAULT_CREDENTIAL_TTL);
        assert!(matches!(cache.signer().await, Err(PipelineError::Configuration(_))));
    }

    /// 🚪 An SDK provider that never has anything to give.
    #[derive(Debug)]
    struct LockedOutSdkProvider;

    impl ProvideCredentials for LockedOutSdkProvider {
        fn provide_credentials<'a>(&'a self) -> sdk_future::ProvideCredentials<'a>
        where
            Self: 'a,
        {
            sdk_future::ProvideCredentials::ready(Err(CredentialsError::not_loaded(
                "no instance metadata out here in the desert",
            )))
        }
    }

    #[tokio::test]
    async fn the_one_where_the_sdk_hands_over_its_keys() -> anyhow::Result<()> {
        let the_sdk_creds =
            aws_credential_types::Credentials::new("AKIDSDK", "shh", Some("tok".into()), None, "test");
        let provider =
            AwsSdkCredentialProvider::from_provider(SharedCredentialsProvider::new(the_sdk_creds));

        let credentials = provider.fetch().await?;
        assert_eq!(credentials.access_key_id(), "AKIDSDK");
        assert_eq!(credentials.secret_access_key(), "shh");
        assert_eq!(credentials.session_token(), Some("tok"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_sdk_comes_up_empty_and_says_why() {
        let provider = AwsSdkCredentialProvider::from_provider(SharedCredentialsProvider::new(
            LockedOutSdkProvider,
        ));

        match provider.fetch().await {
            Err(PipelineError::Credential(reason)) => {
                assert!(reason.contains("out here in the desert"), "got: {reason}")
            }
            other => panic!("💀 expected a credential error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_cache_asks_the_sdk_again_after_expiry() -> anyhow::Result<()> {
        let the_sdk_creds =
            aws_credential_types::Credentials::new("AKIDSDK", "shh", None, None, "test");
        let provider =
            AwsSdkCredentialProvider::from_provider(SharedCredentialsProvider::new(the_sdk_creds));
        let cache = CredentialCache::new(Arc::new(provider), DEFAULT_CREDENTIAL_TTL);

        let the_first = cache.signer().await?;
        tokio::time::advance(Duration::from_secs(61)).await;
        let the_second = cache.signer().await?;

        assert!(!Arc::ptr_eq(&the_first, &the_second));
        assert_eq!(the_second.credentials().access_key_id(), "AKIDSDK");
        Ok(())
    }

    #[test]
    fn the_one_where_debug_output_keeps_secrets_secret() {
        let the_creds = Credentials::new("AKID", "super-secret", Some("tok".into()));
        let the_debug = format!("{the_creds:?}");
        assert!(the_debug.contains("AKID"));
        assert!(!the_debug.contains("super-secret"));
        assert!(!the_debug.contains("tok\""));
    }
}
