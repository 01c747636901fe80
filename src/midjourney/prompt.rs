//! Prompt preparation and follow-up command parsing.

use crate::config::MidjourneyConfig;
use crate::constants::{
    IMAGINE_COMMAND, MAX_ACTIONS, REROLL_COMMAND, UPSCALE_COMMAND, VARIATION_COMMAND,
};
use crate::types::{GatewayError, Message, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskAction {
    Imagine,
    Upscale,
    Variation,
    Reroll,
}

impl TaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imagine => "IMAGINE",
            Self::Upscale => "UPSCALE",
            Self::Variation => "VARIATION",
            Self::Reroll => "REROLL",
        }
    }

    pub fn command(&self) -> &'static str {
        match self {
            Self::Imagine => IMAGINE_COMMAND,
            Self::Upscale => UPSCALE_COMMAND,
            Self::Variation => VARIATION_COMMAND,
            Self::Reroll => REROLL_COMMAND,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Imagine, Self::Upscale, Self::Variation, Self::Reroll]
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(name))
    }

    pub fn from_command(token: &str) -> Option<Self> {
        [Self::Imagine, Self::Upscale, Self::Variation, Self::Reroll]
            .into_iter()
            .find(|action| action.command().eq_ignore_ascii_case(token))
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRequest {
    Imagine {
        prompt: String,
    },
    /// Follow-up on a finished task. `index` is 1-based and absent for rerolls.
    Change {
        action: TaskAction,
        task_id: String,
        index: Option<u8>,
    },
}

impl TaskRequest {
    pub fn action(&self) -> TaskAction {
        match self {
            Self::Imagine { .. } => TaskAction::Imagine,
            Self::Change { action, .. } => *action,
        }
    }
}

fn format_error(reason: impl Into<String>) -> GatewayError {
    GatewayError::Format(reason.into())
}

/// Speed token for a model variant; unknown models get the default mode.
pub fn mode_token<'a>(config: &'a MidjourneyConfig, model: &str) -> &'a str {
    config
        .mode_tokens
        .get(model)
        .map(String::as_str)
        .unwrap_or(config.default_mode.as_str())
}

/// Drops every renderer-mode token the user typed and appends the one chosen
/// by `model`.
pub fn clean_prompt(config: &MidjourneyConfig, model: &str, prompt: &str) -> String {
    let mut words: Vec<&str> = prompt
        .split_whitespace()
        .filter(|word| !config.renderer_modes.iter().any(|mode| mode == word))
        .collect();
    words.push(mode_token(config, model));
    words.join(" ")
}

/// Action links come back either as the command (`/UPSCALE 42 1`), as its
/// hyphenated path form (`/UPSCALE-42-1`), or as the full virtual URL.
fn normalize_command(config: &MidjourneyConfig, words: &[&str]) -> Vec<String> {
    let Some(first) = words.first() else {
        return Vec::new();
    };
    let host = config.virtual_host.trim_end_matches('/');
    let head = first.strip_prefix(host).unwrap_or(first);

    let mut out: Vec<String> = Vec::with_capacity(words.len() + 2);
    match head.split_once('-') {
        Some((command, rest))
            if head.starts_with('/') && TaskAction::from_command(command).is_some() =>
        {
            out.push(command.to_string());
            out.extend(rest.split('-').filter(|s| !s.is_empty()).map(str::to_string));
        }
        _ => out.push(head.to_string()),
    }
    out.extend(words[1..].iter().map(|w| w.to_string()));
    out
}

fn parse_index(raw: Option<&String>, action: TaskAction) -> Result<u8> {
    let index = raw
        .and_then(|s| s.parse::<u8>().ok())
        .ok_or_else(|| format_error(format!("{} requires an image index", action.command())))?;
    if !(1..=MAX_ACTIONS).contains(&index) {
        return Err(format_error(format!("image index must be between 1 and {}", MAX_ACTIONS)).into());
    }
    Ok(index)
}

/// Splits a cleaned prompt into the action to submit.
pub fn extract_prompt(config: &MidjourneyConfig, prompt: &str) -> Result<TaskRequest> {
    let words: Vec<&str> = prompt.split_whitespace().collect();
    let words = normalize_command(config, &words);
    let is_mode = |word: &str| config.renderer_modes.iter().any(|mode| mode == word);

    let action = words
        .first()
        .and_then(|w| TaskAction::from_command(w))
        .unwrap_or(TaskAction::Imagine);

    match action {
        TaskAction::Imagine => {
            let explicit = words
                .first()
                .map(|w| w.eq_ignore_ascii_case(IMAGINE_COMMAND))
                .unwrap_or(false);
            let body: Vec<&str> = words[usize::from(explicit)..].iter().map(String::as_str).collect();
            if body.iter().all(|w| is_mode(*w)) {
                return Err(format_error("please provide available prompt").into());
            }
            Ok(TaskRequest::Imagine {
                prompt: body.join(" "),
            })
        }
        TaskAction::Upscale | TaskAction::Variation | TaskAction::Reroll => {
            let task_id = words
                .get(1)
                .filter(|w| !is_mode(w.as_str()))
                .ok_or_else(|| format_error(format!("{} requires a task id", action.command())))?
                .clone();
            let index = match action {
                TaskAction::Reroll => None,
                _ => Some(parse_index(words.get(2), action)?),
            };
            Ok(TaskRequest::Change {
                action,
                task_id,
                index,
            })
        }
    }
}

/// The request for a conversation: the last message, cleaned and parsed.
pub fn request_from_messages(
    config: &MidjourneyConfig,
    model: &str,
    messages: &[Message],
) -> Result<TaskRequest> {
    let last = messages
        .last()
        .ok_or_else(|| format_error("please provide available prompt"))?;
    extract_prompt(config, &clean_prompt(config, model, &last.content))
}
