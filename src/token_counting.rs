//! Token Counting Utility
//!
//! Heuristic token counts for conversation history and image attachments.

use crate::constants::{UNKNOWN_IMAGE_TOKENS, VISION_MODEL_PREFIXES};
use crate::types::{Image, ImageDetail, Message};

const TOKENS_PER_MESSAGE: usize = 3;
const REPLY_PRIMING_TOKENS: usize = 3;

const IMAGE_BASE_TOKENS: u32 = 85;
const IMAGE_TILE_TOKENS: u32 = 170;
const IMAGE_TILE_SIZE: u32 = 512;
const IMAGE_MAX_SIDE: f64 = 2048.0;
const IMAGE_SHORT_SIDE: f64 = 768.0;

pub struct TokenEstimator;

impl TokenEstimator {
    pub fn estimate_history_tokens(model: &str, history: &[Message]) -> usize {
        if history.is_empty() {
            return 0;
        }
        let messages: usize = history
            .iter()
            .map(|m| Self::estimate_message_tokens(model, m))
            .sum();
        messages + REPLY_PRIMING_TOKENS
    }

    pub fn estimate_message_tokens(model: &str, message: &Message) -> usize {
        let images: usize = message
            .attachments
            .iter()
            .map(|image| Self::estimate_image_tokens(model, image) as usize)
            .sum();
        TOKENS_PER_MESSAGE + Self::estimate_text_tokens(&message.content) + images
    }

    /// Lightweight heuristic: ~3 chars per token, which errs on the side of
    /// overcounting code and non-English text.
    pub fn estimate_text_tokens(text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        (text.len() / 3).max(1)
    }

    pub fn is_vision_model(model: &str) -> bool {
        VISION_MODEL_PREFIXES.iter().any(|p| model.starts_with(p))
    }

    /// Tile-based image cost. Non-vision models are not billed for images.
    pub fn estimate_image_tokens(model: &str, image: &Image) -> u32 {
        if !Self::is_vision_model(model) {
            return 0;
        }
        if image.detail == ImageDetail::Low {
            return IMAGE_BASE_TOKENS;
        }
        let (width, height) = match (image.width, image.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w as f64, h as f64),
            _ => return UNKNOWN_IMAGE_TOKENS,
        };

        let fit = (IMAGE_MAX_SIDE / width.max(height)).min(1.0);
        let (width, height) = (width * fit, height * fit);
        let shrink = (IMAGE_SHORT_SIDE / width.min(height)).min(1.0);
        let (width, height) = (width * shrink, height * shrink);

        let tiles_x = (width / IMAGE_TILE_SIZE as f64).ceil() as u32;
        let tiles_y = (height / IMAGE_TILE_SIZE as f64).ceil() as u32;
        IMAGE_BASE_TOKENS + IMAGE_TILE_TOKENS * tiles_x * tiles_y
    }
}
