/// Repaired fragments that mark the end of an upstream stream.
pub const STREAM_DONE_SENTINELS: &[&str] = &[
    "{data: [DONE]}",
    "{data: [DONE]}}",
    "{[DONE]}",
    "{data:}",
    "{data:}}",
];

/// Share of an image's token cost that is billed when attached to a buffer.
pub const IMAGE_QUOTA_RATIO: f32 = 0.7;

/// Flat estimate for an image whose dimensions are unknown.
pub const UNKNOWN_IMAGE_TOKENS: u32 = 1000;

/// Models that accept image input and are billed for it.
pub const VISION_MODEL_PREFIXES: &[&str] = &["gpt-4-vision", "gpt-4o", "gpt-4-turbo"];

/// Log snippet length for raw payloads.
pub const RAW_SNIPPET_CHARS: usize = 200;

/// Midjourney task vocabulary
pub const MAX_ACTIONS: u8 = 4;

pub const IMAGINE_COMMAND: &str = "/IMAGINE";
pub const UPSCALE_COMMAND: &str = "/UPSCALE";
pub const VARIATION_COMMAND: &str = "/VARIATION";
pub const REROLL_COMMAND: &str = "/REROLL";

pub const RELAX_MODE: &str = "--relax";
pub const FAST_MODE: &str = "--fast";
pub const TURBO_MODE: &str = "--turbo";

/// Tokens the renderer understands as speed selectors; stripped from user prompts.
pub const RENDERER_MODES: &[&str] = &[RELAX_MODE, FAST_MODE, TURBO_MODE];

pub const MIDJOURNEY_MODEL: &str = "midjourney";
pub const MIDJOURNEY_FAST_MODEL: &str = "midjourney-fast";
pub const MIDJOURNEY_TURBO_MODEL: &str = "midjourney-turbo";

pub const DEFAULT_VIRTUAL_HOST: &str = "https://chat.virtual";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1500;

/// midjourney-proxy submission result codes that mean "accepted"
pub const SUBMIT_OK_CODES: &[i64] = &[1, 21, 22];
pub const MJ_SECRET_HEADER: &str = "mj-api-secret";
