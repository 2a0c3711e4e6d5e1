//! Nervous-system-aware conversation core.
//!
//! Tags free text with weighted adaptive codes, gates crisis language,
//! derives a per-turn nervous-system state, routes each turn to one of four
//! response modes and synthesizes a provider-agnostic prompt from that state
//! plus a learned per-user profile.
//!
//! Zero I/O: no transport, no persistence, no model calls.

pub mod codes;
pub mod constants;
pub mod context;
pub mod crisis;
pub mod fallback;
pub mod history;
pub mod learning;
pub mod lexicon;
pub mod profile;
pub mod prompt;
pub mod router;
pub mod serde_compat;
pub mod state;
pub mod time;

pub use codes::{AdaptiveCode, CodeKind, detect_codes, has_code, overall_intensity, suggests_crisis_level};
pub use context::{Biometrics, TurnContext};
pub use crisis::{CRISIS_RESOURCES, CRISIS_STEPS, CrisisCategory, CrisisVerdict, classify_crisis};
pub use fallback::{fallback_response, suggestions};
pub use history::{ConversationMessage, Role};
pub use learning::{LearningSummary, Outcome, PreviousOffer, TurnObservation, learn_from_turn};
pub use profile::{
    Consent, ConsentUpdate, DataRetention, RelationshipDimension, SomaticPattern, StyleDial,
    UserProfile,
};
pub use prompt::{Prompt, PromptContext, build_prompt};
pub use router::{Mode, select_mode};
pub use serde_compat::{CURRENT_VERSION, export_profile_json, import_profile_json};
pub use state::{
    DominantEmotion, NervousState, QuantumEmotionalState, Trend, VoiceStyle, compute_state,
    compute_state_at,
};
