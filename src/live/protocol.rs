//! Wire framing for the Gemini Live endpoint.
//!
//! Outbound messages use the snake_case field names of the v1alpha wire
//! protocol (`setup`, `generation_config`, `realtime_input`,
//! `media_chunks`); inbound frames arrive with camelCase keys
//! (`serverContent`, `modelTurn`, `inlineData`, `turnComplete`).
//!
//! Decode failures are non-fatal by design: a frame that does not parse
//! yields a single [`ServerEvent::Malformed`], and a well-formed frame
//! missing expected fields simply yields fewer events.

use base64::Engine;
use serde::Serialize;

use super::ServerEvent;
use crate::config::BridgeConfig;

/// MIME tag attached to outbound PCM chunks.
pub const AUDIO_MIME: &str = "audio/pcm";

// ── Setup message (first frame of the handshake) ───────────────────

#[derive(Debug, Serialize)]
pub struct SetupMessage {
    pub setup: SetupPayload,
}

#[derive(Debug, Serialize)]
pub struct SetupPayload {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: SystemInstruction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolConfig>>,
}

#[derive(Debug, Serialize)]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Serialize)]
pub struct SystemInstruction {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ToolConfig {
    pub google_search: EmptyObject,
}

#[derive(Debug, Serialize)]
pub struct EmptyObject {}

/// Build the setup message for a bridge session: model, audio response
/// modality, voice selection, system instruction, and (optionally) the
/// Google Search tool.
pub fn build_setup_message(config: &BridgeConfig) -> SetupMessage {
    let tools = config.search_enabled.then(|| {
        vec![ToolConfig {
            google_search: EmptyObject {},
        }]
    });

    SetupMessage {
        setup: SetupPayload {
            model: format!("models/{}", config.model),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: config.voice.as_str().to_string(),
                        },
                    },
                },
            },
            system_instruction: SystemInstruction {
                parts: vec![TextPart {
                    text: config.system_prompt.clone(),
                }],
            },
            tools,
        },
    }
}

// ── Steady-state input message ─────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

/// One base64-encoded PCM chunk with its MIME tag.
#[derive(Debug, Serialize)]
pub struct MediaChunk {
    pub data: String,
    pub mime_type: String,
}

/// Wrap raw PCM bytes in a `realtime_input` frame.
pub fn build_audio_message(pcm: &[u8]) -> RealtimeInputMessage {
    let data = base64::engine::general_purpose::STANDARD.encode(pcm);
    RealtimeInputMessage {
        realtime_input: RealtimeInput {
            media_chunks: vec![MediaChunk {
                data,
                mime_type: AUDIO_MIME.to_string(),
            }],
        },
    }
}

// ── Inbound decoder ────────────────────────────────────────────────

/// Decode one inbound JSON frame into zero or more events.
///
/// Ordering matters: audio/text parts come before any `TurnComplete` in
/// the same frame, so a turn never appears to close before its last chunk.
pub fn parse_server_message(json_text: &str) -> Vec<ServerEvent> {
    let value: serde_json::Value = match serde_json::from_str(json_text) {
        Ok(v) => v,
        Err(e) => return vec![ServerEvent::Malformed(format!("unparseable frame: {e}"))],
    };

    let mut events = Vec::new();

    if value.get("setupComplete").is_some() {
        events.push(ServerEvent::SetupAck);
    }

    if let Some(content) = value.get("serverContent") {
        if let Some(parts) = content
            .pointer("/modelTurn/parts")
            .and_then(|v| v.as_array())
        {
            for part in parts {
                if let Some(data_b64) = part
                    .pointer("/inlineData/data")
                    .and_then(|v| v.as_str())
                {
                    match base64::engine::general_purpose::STANDARD.decode(data_b64) {
                        Ok(audio) => events.push(ServerEvent::AudioChunk(audio)),
                        Err(e) => events.push(ServerEvent::Malformed(format!(
                            "undecodable audio part: {e}"
                        ))),
                    }
                }
                if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
                    events.push(ServerEvent::TextChunk(text.to_string()));
                }
            }
        }

        if content.get("turnComplete").and_then(|v| v.as_bool()) == Some(true) {
            events.push(ServerEvent::TurnComplete);
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VoiceName;

    #[test]
    fn setup_message_uses_snake_case_wire_keys() {
        let config = BridgeConfig {
            voice: VoiceName::Kore,
            ..BridgeConfig::default()
        };
        let json = serde_json::to_string(&build_setup_message(&config)).unwrap();

        assert!(json.contains("\"setup\""));
        assert!(json.contains("\"generation_config\""));
        assert!(json.contains("\"response_modalities\":[\"AUDIO\"]"));
        assert!(json.contains("\"prebuilt_voice_config\""));
        assert!(json.contains("\"voice_name\":\"Kore\""));
        assert!(json.contains("\"system_instruction\""));
        assert!(json.contains("models/gemini-2.0-flash-exp"));
    }

    #[test]
    fn setup_message_includes_search_tool_when_enabled() {
        let config = BridgeConfig {
            search_enabled: true,
            ..BridgeConfig::default()
        };
        let json = serde_json::to_string(&build_setup_message(&config)).unwrap();
        assert!(json.contains("\"google_search\":{}"));
    }

    #[test]
    fn setup_message_omits_tools_when_disabled() {
        let config = BridgeConfig {
            search_enabled: false,
            ..BridgeConfig::default()
        };
        let json = serde_json::to_string(&build_setup_message(&config)).unwrap();
        assert!(!json.contains("tools"));
        assert!(!json.contains("google_search"));
    }

    #[test]
    fn audio_message_encodes_base64_pcm() {
        let pcm = vec![0u8, 1, 2, 3, 4, 5];
        let msg = build_audio_message(&pcm);
        let json = serde_json::to_string(&msg).unwrap();

        assert!(json.contains("\"realtime_input\""));
        assert!(json.contains("\"media_chunks\""));
        assert!(json.contains("\"mime_type\":\"audio/pcm\""));

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&msg.realtime_input.media_chunks[0].data)
            .unwrap();
        assert_eq!(decoded, pcm);
    }

    #[test]
    fn parse_setup_ack() {
        let events = parse_server_message(r#"{"setupComplete": {}}"#);
        assert_eq!(events, vec![ServerEvent::SetupAck]);
    }

    #[test]
    fn parse_turn_complete() {
        let events = parse_server_message(r#"{"serverContent": {"turnComplete": true}}"#);
        assert_eq!(events, vec![ServerEvent::TurnComplete]);
    }

    #[test]
    fn parse_audio_part() {
        let b64 = base64::engine::general_purpose::STANDARD.encode([10u8, 20, 30]);
        let json = format!(
            r#"{{"serverContent": {{"modelTurn": {{"parts": [{{"inlineData": {{"mimeType": "audio/pcm;rate=24000", "data": "{b64}"}}}}]}}}}}}"#
        );
        let events = parse_server_message(&json);
        assert_eq!(events, vec![ServerEvent::AudioChunk(vec![10, 20, 30])]);
    }

    #[test]
    fn parse_text_part() {
        let json = r#"{"serverContent": {"modelTurn": {"parts": [{"text": "Hello"}]}}}"#;
        let events = parse_server_message(json);
        assert_eq!(events, vec![ServerEvent::TextChunk("Hello".into())]);
    }

    #[test]
    fn parts_precede_turn_complete_in_a_combined_frame() {
        let b64 = base64::engine::general_purpose::STANDARD.encode([1u8]);
        let json = format!(
            r#"{{"serverContent": {{"modelTurn": {{"parts": [{{"inlineData": {{"data": "{b64}"}}}}, {{"text": "done"}}]}}, "turnComplete": true}}}}"#
        );
        let events = parse_server_message(&json);
        assert_eq!(
            events,
            vec![
                ServerEvent::AudioChunk(vec![1]),
                ServerEvent::TextChunk("done".into()),
                ServerEvent::TurnComplete,
            ]
        );
    }

    #[test]
    fn parse_invalid_json_yields_malformed() {
        let events = parse_server_message("not json at all");
        assert!(matches!(events.as_slice(), [ServerEvent::Malformed(_)]));
    }

    #[test]
    fn parse_bad_audio_base64_yields_malformed() {
        let json = r#"{"serverContent": {"modelTurn": {"parts": [{"inlineData": {"data": "@@@"}}]}}}"#;
        let events = parse_server_message(json);
        assert!(matches!(events.as_slice(), [ServerEvent::Malformed(_)]));
    }

    #[test]
    fn parse_frame_with_nothing_interesting_yields_no_events() {
        assert!(parse_server_message(r#"{"usageMetadata": {"totalTokens": 5}}"#).is_empty());
        assert!(parse_server_message(r#"{"serverContent": {}}"#).is_empty());
    }
}
