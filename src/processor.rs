//! Chat fragment processor.
//!
//! Turns one raw fragment (plus whatever the previous fragment left unparsed)
//! into a decoded delta, an end-of-stream signal, or a classified error.

use crate::buffer::Buffer;
use crate::constants::{RAW_SNIPPET_CHARS, STREAM_DONE_SENTINELS};
use crate::envelope::{decode_content, decode_error};
use crate::json_repair::{is_json_complete, process_format};
use crate::str_utils::{self, extract_urls};
use crate::token_counting::TokenEstimator;
use crate::types::{GatewayError, Message, Result};

/// Number of extra passes allowed with the carry-over merged in.
const MAX_MERGE_PASSES: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// A decoded delta. `text` may be empty, e.g. for tool-call-only chunks;
    /// `merged` is set when it only decoded with the carry-over prepended.
    Delta { text: String, merged: bool },
    /// The provider signalled a clean end of stream.
    Done,
}

pub fn is_done(item: &str) -> bool {
    STREAM_DONE_SENTINELS.contains(&item)
}

/// Decodes one fragment.
///
/// `carry` is the raw text of the previous fragment that failed to parse, or
/// empty. When the fragment alone does not decode, `carry + data` gets exactly
/// one more pass with an empty carry, so the merge can never chain.
///
/// Tool-call deltas are recorded on `buffer`; the returned text is not written
/// to it, that is left to the caller.
pub fn process_line(buffer: &mut Buffer, legacy: bool, carry: &str, data: &str) -> Result<LineOutcome> {
    let mut raw = data.to_string();
    let mut carry = carry;
    let mut attempted: Vec<String> = Vec::with_capacity(MAX_MERGE_PASSES + 1);

    for pass in 0..=MAX_MERGE_PASSES {
        let item = process_format(&raw);
        if is_done(&item) {
            tracing::debug!("[PROCESSOR] End of stream marker on pass {}", pass);
            return Ok(LineOutcome::Done);
        }

        if let Some(envelope) = decode_content(&item, legacy) {
            let content = envelope.content().to_string();
            tracing::debug!(
                "[PROCESSOR] Decoded {} on pass {} ({} chars)",
                envelope.kind(),
                pass,
                content.len()
            );
            buffer.set_tool_calls(envelope.into_tool_calls());
            return Ok(LineOutcome::Delta {
                text: content,
                merged: pass > 0,
            });
        }

        attempted.push(item);
        if carry.is_empty() {
            break;
        }
        raw = format!("{}{}", carry, data);
        carry = "";
    }

    for item in &attempted {
        if let Some(err) = decode_error(item) {
            if !err.message().is_empty() {
                return Err(GatewayError::Upstream {
                    message: err.message().to_string(),
                    kind: err.kind().to_string(),
                }
                .into());
            }
        }
    }

    let last = attempted.last().map(String::as_str).unwrap_or_default();
    tracing::warn!(
        "cannot parse response (balanced: {}): {}",
        is_json_complete(last),
        str_utils::first_n_chars_lossy(last, RAW_SNIPPET_CHARS)
    );
    Err(GatewayError::Parse {
        recovered: data.to_string(),
    }
    .into())
}

/// Vision models expect image URLs up front: URLs found in the last message
/// are prepended to its content.
pub fn format_vision_messages(model: &str, mut messages: Vec<Message>) -> Vec<Message> {
    if !TokenEstimator::is_vision_model(model) {
        return messages;
    }
    if let Some(last) = messages.last_mut() {
        let urls = extract_urls(&last.content);
        if !urls.is_empty() {
            last.content = format!("{} {}", urls.join(" "), last.content);
        }
    }
    messages
}
