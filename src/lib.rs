#![allow(clippy::manual_unwrap_or_default)]
#![allow(clippy::manual_unwrap_or)]

pub mod buffer;
pub mod config;
pub mod constants;
pub mod envelope;
pub mod json_repair;
pub mod logging;
pub mod main_helper;
pub mod midjourney;
pub mod pricing;
pub mod processor;
pub mod str_utils;
pub mod streaming;
pub mod token_counting;
pub mod types;

pub use types::*;

pub use buffer::Buffer;
pub use config::{GatewayConfig, MidjourneyConfig};
pub use main_helper::{AppState, Args};
