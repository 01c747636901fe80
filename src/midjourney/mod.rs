//! Asynchronous image tasks rendered into a chat stream.

pub mod client;
pub mod orchestrator;
pub mod prompt;
pub mod render;

pub use client::{HttpTaskClient, TaskClient, TaskSnapshot, TaskStatus};
pub use orchestrator::TaskOrchestrator;
pub use prompt::{clean_prompt, extract_prompt, TaskAction, TaskRequest};
pub use render::ProgressRenderer;
