//! 💀 The error taxonomy — four ways for a bulk pipeline to ruin your night.
//!
//! Everything in here is fatal at the point it happens. There are no retries.
//! There is no "maybe next batch". There is only the error, and the context chain
//! that `anyhow` stacks on top of it on its way up to `Pipeline::shutdown`.
//!
//! 🧠 Knowledge graph:
//! - `Configuration` → bad constructor args, caught at build or sign time
//! - `Serialization` → a document that refused to become JSON
//! - `Delivery` → the cluster said no (non-2xx) or the network said nothing
//! - `Credential` → the credential provider came back empty-handed
//! - Workers wrap these in `anyhow::Error`; callers can fish them back out with
//!   `err.chain().find_map(|c| c.downcast_ref::<PipelineError>())` 🎣

use thiserror::Error;

/// 🏷️ A typed, named, fatal failure. The pipeline's four horsemen.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 🔧 Somebody handed us an empty secret key, a zero-byte threshold, or a URL
    /// that is more of a vibe than an address.
    #[error("💀 configuration error: {0}")]
    Configuration(String),

    /// 📦 The payload could not be encoded as JSON.
    #[error("💀 serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 📡 The endpoint rejected the batch, or we never reached it.
    #[error("💀 delivery to {url} failed: {reason}")]
    Delivery {
        url: String,
        reason: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// 🔑 The credential provider could not produce credentials.
    #[error("💀 credential error: {0}")]
    Credential(String),
}

impl PipelineError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn credential(message: impl Into<String>) -> Self {
        Self::Credential(message.into())
    }
}

/// 🎯 Result alias for the typed leaf operations (serializer, signer, endpoint parsing).
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
