//! Provider envelopes.
//!
//! A repaired fragment decodes into at most one [`Envelope`]. Decoders are
//! tried in a fixed order and the first structural match wins. Each decoder
//! also tries the fragment with its last character dropped (truncated writes
//! often leave a dangling delimiter) and with its open structures closed,
//! both as-is and after dropping that delimiter.

use crate::json_repair::{close_open_structures, close_truncated, strip_last_char};
use crate::types::ToolCalls;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Payload either sits under the `data` key produced by fragment repair, or
/// is the bare provider object.
#[derive(Deserialize)]
#[serde(untagged)]
enum Framed<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Framed<T> {
    fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } => data,
            Self::Bare(inner) => inner,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ChatDelta {
    pub choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ChatChoice {
    pub delta: DeltaBody,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct DeltaBody {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<ToolCalls>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CompletionLegacy {
    pub choices: Vec<CompletionChoice>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CompletionChoice {
    pub text: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ErrorBody {
    Detailed {
        #[serde(default)]
        message: String,
        #[serde(default, rename = "type")]
        kind: Option<String>,
    },
    Plain(String),
}

impl ErrorEnvelope {
    pub fn message(&self) -> &str {
        match &self.error {
            ErrorBody::Detailed { message, .. } => message,
            ErrorBody::Plain(message) => message,
        }
    }

    pub fn kind(&self) -> &str {
        match &self.error {
            ErrorBody::Detailed { kind: Some(kind), .. } => kind,
            _ => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    ChatDelta(ChatDelta),
    CompletionLegacy(CompletionLegacy),
    Error(ErrorEnvelope),
}

impl Envelope {
    /// Text carried by the first choice; empty when there are no choices.
    pub fn content(&self) -> &str {
        match self {
            Self::ChatDelta(delta) => delta
                .choices
                .first()
                .and_then(|c| c.delta.content.as_deref())
                .unwrap_or_default(),
            Self::CompletionLegacy(completion) => completion
                .choices
                .first()
                .map(|c| c.text.as_str())
                .unwrap_or_default(),
            Self::Error(_) => "",
        }
    }

    pub fn into_tool_calls(self) -> Option<ToolCalls> {
        match self {
            Self::ChatDelta(delta) => delta.choices.into_iter().next()?.delta.tool_calls,
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChatDelta(_) => "chat_delta",
            Self::CompletionLegacy(_) => "completion_legacy",
            Self::Error(_) => "error",
        }
    }
}

/// Texts to try for one decode attempt, in order.
fn candidates<'a>(fragment: &'a str, extra_suffix: Option<char>) -> Vec<Cow<'a, str>> {
    let mut out: Vec<Cow<'a, str>> = vec![Cow::Borrowed(fragment)];
    if let Some(stripped) = strip_last_char(fragment) {
        out.push(Cow::Borrowed(stripped));
    }
    if let Some(suffix) = extra_suffix {
        let mut appended = fragment.to_string();
        appended.push(suffix);
        out.push(Cow::Owned(appended));
    }
    if let Some(closed) = close_open_structures(fragment) {
        out.push(Cow::Owned(closed));
    }
    // Repair appends a `}` after whatever the write cut off on, so the
    // dangling delimiter only shows up once that brace is stripped again.
    if let Some(closed) = strip_last_char(fragment).and_then(close_truncated) {
        out.push(Cow::Owned(closed));
    }
    out
}

fn decode_framed<T: DeserializeOwned>(fragment: &str, extra_suffix: Option<char>) -> Option<T> {
    if !fragment.starts_with('{') {
        return None;
    }
    candidates(fragment, extra_suffix)
        .iter()
        .find_map(|text| serde_json::from_str::<Framed<T>>(text).ok())
        .map(Framed::into_inner)
}

pub fn decode_chat(fragment: &str) -> Option<Envelope> {
    decode_framed::<ChatDelta>(fragment, None).map(Envelope::ChatDelta)
}

pub fn decode_completion(fragment: &str) -> Option<Envelope> {
    decode_framed::<CompletionLegacy>(fragment, None).map(Envelope::CompletionLegacy)
}

/// The error decoder also tolerates a single missing closer.
pub fn decode_error(fragment: &str) -> Option<ErrorEnvelope> {
    decode_framed::<ErrorEnvelope>(fragment, Some('}'))
}

type Decoder = fn(&str) -> Option<Envelope>;

/// Content-bearing decoders, in priority order. The flag marks decoders that
/// only run when legacy completion mode is requested.
const CONTENT_DECODERS: &[(Decoder, bool)] = &[(decode_chat, false), (decode_completion, true)];

/// Tries every content decoder in order and stops at the first match.
pub fn decode_content(fragment: &str, legacy: bool) -> Option<Envelope> {
    CONTENT_DECODERS
        .iter()
        .filter(|(_, legacy_only)| legacy || !legacy_only)
        .find_map(|(decode, _)| decode(fragment))
}
