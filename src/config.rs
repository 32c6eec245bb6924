//! Session configuration consumed by the bridge at session start.
//!
//! The recognized options mirror what a host UI would collect: a system
//! prompt, a prebuilt voice, and the search-tool toggle. Credential loading
//! is the caller's problem; the bridge receives the API key as an opaque
//! string.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gemini Live WebSocket endpoint (BidiGenerateContent).
pub const LIVE_WS_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent";

/// Model used for both the live session and the one-shot describer.
pub const MODEL_ID: &str = "gemini-2.0-flash-exp";

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a friendly assistant. Respond verbally in a casual, helpful tone.";

// ── Voice selection ────────────────────────────────────────────────

/// Prebuilt voices accepted by the live endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceName {
    #[default]
    Puck,
    Charon,
    Kore,
    Fenrir,
    Aoede,
}

impl VoiceName {
    /// Wire name as the API expects it.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Puck => "Puck",
            Self::Charon => "Charon",
            Self::Kore => "Kore",
            Self::Fenrir => "Fenrir",
            Self::Aoede => "Aoede",
        }
    }

    /// Parse from a user-supplied name (case-insensitive).
    pub fn from_str_code(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "puck" => Some(Self::Puck),
            "charon" => Some(Self::Charon),
            "kore" => Some(Self::Kore),
            "fenrir" => Some(Self::Fenrir),
            "aoede" => Some(Self::Aoede),
            _ => None,
        }
    }

    /// All selectable voices.
    pub fn all() -> &'static [VoiceName] {
        &[
            Self::Puck,
            Self::Charon,
            Self::Kore,
            Self::Fenrir,
            Self::Aoede,
        ]
    }
}

// ── Gate parameters ────────────────────────────────────────────────

/// Voice-activity gate parameters.
///
/// The classic values (0.8 probability, 512-sample frames) are defaults,
/// not constants; nothing suggests they were tuned rather than chosen, so
/// they stay adjustable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Speech-probability threshold, inclusive: a score equal to the
    /// threshold counts as speech.
    pub threshold: f32,
    /// Expected samples per frame at 16 kHz mono.
    pub frame_samples: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            frame_samples: 512,
        }
    }
}

// ── Bridge configuration ───────────────────────────────────────────

/// Everything one session needs to reach the upstream service.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Gemini API key, supplied by the host environment.
    pub api_key: String,
    /// Model identifier (without the `models/` prefix).
    pub model: String,
    /// Live WebSocket endpoint, overridable for testing.
    pub endpoint: String,
    /// System instruction sent in the setup message.
    pub system_prompt: String,
    /// Prebuilt voice for synthesized output.
    pub voice: VoiceName,
    /// Whether the Google Search tool is attached to the session.
    pub search_enabled: bool,
    /// Voice-activity gate parameters.
    pub gate: GateConfig,
    /// Bound on the wait for the setup acknowledgement.
    pub handshake_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: MODEL_ID.to_string(),
            endpoint: LIVE_WS_URL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            voice: VoiceName::default(),
            search_enabled: true,
            gate: GateConfig::default(),
            handshake_timeout: Duration::from_secs(15),
        }
    }
}
