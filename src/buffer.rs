//! Per-request accumulator.
//!
//! One `Buffer` exists per in-flight request. Every mutator takes `&mut self`,
//! so a buffer cannot be written from two places at once; callers that move it
//! across tasks must hand it over rather than share it. Once the stream ends the
//! buffer is only read, by the billing step.

use crate::constants::IMAGE_QUOTA_RATIO;
use crate::pricing::QuotaTable;
use crate::token_counting::TokenEstimator;
use crate::types::{Image, Message, ToolCalls};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Buffer {
    model: String,
    quota: f32,
    input_tokens: usize,
    data: String,
    latest: String,
    cursor: usize,
    times: usize,
    images: Vec<Image>,
    tool_calls: Option<ToolCalls>,
    table: Arc<QuotaTable>,
}

impl Buffer {
    pub fn new(model: impl Into<String>, history: &[Message], table: Arc<QuotaTable>) -> Self {
        let model = model.into();
        let quota = table.input_quota(&model, history);
        let input_tokens = TokenEstimator::estimate_history_tokens(&model, history);
        Self {
            model,
            quota,
            input_tokens,
            data: String::new(),
            latest: String::new(),
            cursor: 0,
            times: 0,
            images: Vec::new(),
            tool_calls: None,
            table,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Appends a chunk. The cursor always equals the accumulated length.
    pub fn write(&mut self, text: &str) {
        self.data.push_str(text);
        self.cursor += text.len();
        self.times += 1;
        self.latest.clear();
        self.latest.push_str(text);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write(&String::from_utf8_lossy(bytes));
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn write_count(&self) -> usize {
        self.times
    }

    pub fn latest_chunk(&self) -> &str {
        &self.latest
    }

    /// Input quota plus one output weight per write, recomputed on every call.
    pub fn get_quota(&self) -> f32 {
        self.quota + self.table.output_quota(&self.model, self.times)
    }

    pub fn set_images(&mut self, images: Vec<Image>) {
        let cost: f32 = images
            .iter()
            .map(|image| image.count_tokens(&self.model) as f32 * IMAGE_QUOTA_RATIO)
            .sum();
        self.quota += cost;
        self.images = images;
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    /// A missing or empty delta never clears the calls already recorded.
    pub fn set_tool_calls(&mut self, tool_calls: Option<ToolCalls>) {
        match tool_calls {
            Some(calls) if !calls.is_empty() => self.tool_calls = Some(calls),
            _ => {}
        }
    }

    pub fn tool_calls(&self) -> Option<&ToolCalls> {
        self.tool_calls.as_ref()
    }

    pub fn is_function_calling(&self) -> bool {
        self.tool_calls.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0 && !self.is_function_calling()
    }

    pub fn read(&self) -> &str {
        &self.data
    }

    pub fn read_with_default<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.is_empty() || (self.data.trim().is_empty() && !self.is_function_calling()) {
            return fallback;
        }
        &self.data
    }

    pub fn count_input_tokens(&self) -> usize {
        self.input_tokens
    }

    pub fn count_output_tokens(&self) -> usize {
        self.times
    }

    pub fn count_tokens(&self) -> usize {
        self.count_input_tokens() + self.count_output_tokens()
    }
}
