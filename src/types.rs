use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing_error::SpanTrace;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// The prompt was empty or unusable before anything was submitted upstream.
    #[error("format error: {0}")]
    Format(String),

    /// The provider answered with its own error envelope.
    #[error("upstream error: {message} (type: {kind})")]
    Upstream { message: String, kind: String },

    /// No known envelope matched. `recovered` is the raw fragment as delivered.
    #[error("parser error: cannot parse response")]
    Parse { recovered: String },

    #[error("request cancelled")]
    Cancelled,

    /// The caller's sink refused a chunk.
    #[error("sink rejected output: {0}")]
    Hook(String),

    #[error("task error: {0}")]
    Task(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String, SpanTrace),
}

impl GatewayError {
    /// Short machine-readable code, used in log lines and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Format(_) => "FORMAT_ERROR",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::Parse { .. } => "PARSE_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::Hook(_) => "HOOK_ERROR",
            Self::Task(_) => "TASK_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Network(_) => "NETWORK_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Internal(_, _) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug)]
pub struct ObservedError {
    pub inner: GatewayError,
    pub span_trace: SpanTrace,
}

impl ObservedError {
    /// Best-effort payload attached to a parse failure, if any.
    pub fn recovered_text(&self) -> Option<&str> {
        match &self.inner {
            GatewayError::Parse { recovered } => Some(recovered.as_str()),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.inner, GatewayError::Cancelled)
    }
}

impl fmt::Display for ObservedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for ObservedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.inner)
    }
}

impl<E> From<E> for ObservedError
where
    E: Into<GatewayError>,
{
    fn from(error: E) -> Self {
        Self {
            inner: error.into(),
            span_trace: SpanTrace::capture(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ObservedError>;

/// --- CONVERSATION ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Image>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Low,
    High,
    #[default]
    Auto,
}

/// Image attachment. Dimensions are optional; an image whose size is unknown
/// is costed with a flat estimate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub detail: ImageDetail,
}

impl Image {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            width: None,
            height: None,
            detail: ImageDetail::Auto,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn count_tokens(&self, model: &str) -> u32 {
        crate::token_counting::TokenEstimator::estimate_image_tokens(model, self)
    }
}

/// --- PROVIDER WIRE TYPES ---

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<RawFunction>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RawFunction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Partial tool invocations carried by a single delta.
pub type ToolCalls = Vec<ToolCallDelta>;
