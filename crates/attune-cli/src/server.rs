use std::sync::Arc;

use attune_core::{Biometrics, ConsentUpdate, DataRetention, TurnContext, export_profile_json};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::engine::SessionEngine;

const ANONYMOUS_USER: &str = "anonymous";

#[derive(Clone)]
pub struct AttuneServer {
    engine: Arc<SessionEngine>,
    tool_router: ToolRouter<Self>,
}

impl AttuneServer {
    pub fn new(engine: Arc<SessionEngine>) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }
}

// --- Tool parameter types ---

#[derive(Debug, Deserialize, JsonSchema)]
struct ProcessMessageRequest {
    /// The user's message for this turn
    message: String,
    /// Stable user identifier. Defaults to "anonymous".
    user_id: Option<String>,
    /// Conversation identifier. A new session is started when omitted.
    session_id: Option<String>,
    /// Self-reported energy from 0 (empty) to 10 (full)
    energy: Option<u8>,
    /// Heart rate in beats per minute. Only used with biometric consent.
    heart_rate_bpm: Option<u16>,
    /// Heart-rate variability in milliseconds. Only used with biometric consent.
    hrv_ms: Option<u16>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ProfileRequest {
    /// User whose profile to return
    user_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ConsentRequest {
    /// User whose consent to change
    user_id: String,
    /// Allow decode mode (pattern analysis) when asked for
    decode_mode: Option<bool>,
    /// Include a voice delivery hint in responses
    voice_output: Option<bool>,
    /// The user is speaking through a microphone
    mic_input: Option<bool>,
    /// Allow heart rate and HRV to inform responses
    biometric_sharing: Option<bool>,
    /// One of "session_only", "thirty_days", "indefinite"
    data_retention: Option<String>,
}

fn turn_context(req: &ProcessMessageRequest) -> TurnContext {
    let biometrics = (req.heart_rate_bpm.is_some() || req.hrv_ms.is_some()).then(|| Biometrics {
        heart_rate_bpm: req.heart_rate_bpm,
        hrv_ms: req.hrv_ms,
    });
    TurnContext {
        energy: req.energy,
        biometrics,
    }
}

#[tool_router]
impl AttuneServer {
    #[tool(
        description = "Run one conversational turn. Detects adaptive patterns and crisis language, computes the user's nervous-system state, picks a response mode (crisis, decode, real_talk, companion) and returns the reply with the detected patterns, up to three suggestions and timing metadata. Pass the returned session_id back on the next turn to keep the conversation together."
    )]
    async fn process_message(
        &self,
        Parameters(req): Parameters<ProcessMessageRequest>,
    ) -> Result<CallToolResult, McpError> {
        let user_id = req.user_id.as_deref().unwrap_or(ANONYMOUS_USER);
        let session_id = req
            .session_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let context = turn_context(&req);

        let response = self
            .engine
            .process_message(&session_id, user_id, &req.message, &context)
            .await;

        let json = serde_json::to_string_pretty(&response)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(
        description = "Return a user's learned profile (baseline, somatic patterns, what works, consent, communication style, relationship depth) as versioned JSON."
    )]
    async fn get_profile(
        &self,
        Parameters(req): Parameters<ProfileRequest>,
    ) -> Result<CallToolResult, McpError> {
        let profile = self.engine.profile(&req.user_id).await;
        let json = export_profile_json(&profile)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(
        description = "Change a user's consent. Only the fields provided are updated. Consent is only ever changed by this call, never inferred from conversation."
    )]
    async fn set_consent(
        &self,
        Parameters(req): Parameters<ConsentRequest>,
    ) -> Result<CallToolResult, McpError> {
        let data_retention = match req.data_retention.as_deref() {
            Some(s) => Some(DataRetention::parse(s).ok_or_else(|| {
                McpError::invalid_params(
                    format!(
                        "data_retention must be one of session_only, thirty_days, indefinite (got {s:?})"
                    ),
                    None,
                )
            })?),
            None => None,
        };
        let update = ConsentUpdate {
            decode_mode: req.decode_mode,
            voice_output: req.voice_output,
            mic_input: req.mic_input,
            biometric_sharing: req.biometric_sharing,
            data_retention,
        };

        let profile = self
            .engine
            .set_consent(&req.user_id, &update)
            .await
            .map_err(|e| McpError::internal_error(format!("{e:#}"), None))?;

        let consent = &profile.consent;
        let result = serde_json::json!({
            "userId": profile.user_id,
            "consent": {
                "voiceOutput": consent.voice_output,
                "micInput": consent.mic_input,
                "dataRetention": consent.data_retention.as_str(),
                "biometricSharing": consent.biometric_sharing,
                "decodeMode": consent.decode_mode,
            },
        });
        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&result).unwrap_or_default(),
        )]))
    }
}

#[tool_handler]
impl ServerHandler for AttuneServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Attune is a conversational companion that reads nervous-system state from what \
                 the user writes and answers in one of four modes.\n\n\
                 USAGE:\n\
                 1. Call process_message for every user turn. Reuse the session_id it returns.\n\
                 2. Relay the response text as written. When mode is crisis the response is a fixed \
                    resource message; never shorten or paraphrase it.\n\
                 3. Call set_consent only when the user explicitly asks to change a setting.\n\
                 4. get_profile shows what has been learned about a user."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
