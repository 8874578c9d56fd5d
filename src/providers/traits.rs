use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::time::Duration;
use thiserror::Error;

/// Image uploaded by the caller. Lives for one request and is never persisted.
#[derive(Debug, Clone)]
pub struct ImageBlob {
    bytes: Vec<u8>,
    mime_type: String,
}

impl ImageBlob {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Standard base64 of the raw bytes.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<payload>` form used by chat-style vision endpoints.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} timed out after {after:?}")]
    Timeout {
        provider: &'static str,
        after: Duration,
    },

    #[error("{provider} returned no content")]
    EmptyContent { provider: &'static str },

    #[error("{provider} returned an unexpected format: {message}")]
    InvalidFormat {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} found no ingredients on any of {endpoints} endpoint(s)")]
    NoDetections {
        provider: &'static str,
        endpoints: usize,
    },

    #[error("{provider} failed on all {endpoints} endpoint(s), last error: {last}")]
    Exhausted {
        provider: &'static str,
        endpoints: usize,
        last: String,
    },
}

impl ProviderError {
    pub fn provider(&self) -> &'static str {
        match self {
            ProviderError::Transport { provider, .. }
            | ProviderError::Status { provider, .. }
            | ProviderError::Timeout { provider, .. }
            | ProviderError::EmptyContent { provider }
            | ProviderError::InvalidFormat { provider, .. }
            | ProviderError::NoDetections { provider, .. }
            | ProviderError::Exhausted { provider, .. } => provider,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 401/403: the key is wrong or lacks access to the model.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }

    /// Maps a reqwest failure, folding its timeout flavour into `Timeout`.
    ///
    /// The URL is stripped first: some upstreams take their key as a query
    /// parameter and it must not reach logs or error messages.
    pub fn from_reqwest(provider: &'static str, err: reqwest::Error, deadline: Duration) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout {
                provider,
                after: deadline,
            }
        } else {
            ProviderError::Transport {
                provider,
                message: err.without_url().to_string(),
            }
        }
    }
}

/// Multimodal language model that reads ingredient names off a photo.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    async fn detect(&self, image: &ImageBlob) -> Result<Vec<String>, ProviderError>;

    fn provider_name(&self) -> &'static str;
}

/// Specialized object detector, possibly spread over several model endpoints.
#[async_trait]
pub trait DetectionProvider: Send + Sync {
    async fn detect(&self, image: &ImageBlob) -> Result<Vec<String>, ProviderError>;

    fn provider_name(&self) -> &'static str;
}

/// Plain text chat model with a fixed system message.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;

    fn get_model_info(&self) -> &str;
}
