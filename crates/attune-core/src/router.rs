//! Mode router: picks one response strategy per turn.
//!
//! Order: crisis gate, explicit one-turn override, consented decode request,
//! then therapeutic vs. real-talk keyword classification. Nothing here
//! persists; an override applies to the turn that contains it.

use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::crisis::CrisisVerdict;
use crate::lexicon::PhraseBattery;
use crate::profile::UserProfile;
use crate::state::QuantumEmotionalState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Crisis,
    Decode,
    RealTalk,
    Companion,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Crisis, Mode::Decode, Mode::RealTalk, Mode::Companion];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Crisis => "crisis",
            Mode::Decode => "decode",
            Mode::RealTalk => "real_talk",
            Mode::Companion => "companion",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static DECODE_REQUEST: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "decode_request",
        &[
            "why do i",
            "why am i",
            "why does this",
            "why can't i",
            "how did i get",
            "how did i end up",
            "what's the pattern",
            "whats the pattern",
            "where does this come from",
            "where is this coming from",
            "decode",
        ],
    )
});

static THERAPEUTIC: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "therapeutic",
        &[
            "panic*",
            "trauma*",
            "trigger*",
            "anxious",
            "anxiety",
            "overwhelm*",
            "drowning",
            "scared",
            "afraid",
            "grief",
            "grieving",
            "lonely",
            "abuse*",
            "depress*",
            "ptsd",
            "flashback*",
            "numb",
            "crying",
            "heartbroken",
            "shame",
            "ashamed",
            "hurt",
        ],
    )
});

static REAL_TALK: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "real_talk",
        &[
            "resume",
            "résumé",
            "cv",
            "career",
            "job",
            "interview",
            "salary",
            "raise",
            "promotion",
            "boss",
            "manager",
            "email",
            "meeting",
            "deadline",
            "project",
            "budget",
            "portfolio",
            "linkedin",
            "cover letter",
            "negotiat*",
            "client*",
            "pitch",
            "invoice",
            "schedule",
            "plan",
        ],
    )
});

static REAL_TALK_OVERRIDE: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "real_talk_override",
        &["talk normal", "talk normally", "switch to real talk", "real talk mode", "just be normal"],
    )
});

static SUPPORT_OVERRIDE: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "support_override",
        &["need support", "need some support", "switch to support", "companion mode"],
    )
});

static DECODE_OVERRIDE: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new("decode_override", &["decode this", "decode mode", "switch to decode"])
});

/// Explicit user request for a mode in this message, if any.
///
/// A support request outranks a real-talk request in the same message.
pub fn explicit_override(message: &str) -> Option<Mode> {
    if SUPPORT_OVERRIDE.is_match(message) {
        Some(Mode::Companion)
    } else if REAL_TALK_OVERRIDE.is_match(message) {
        Some(Mode::RealTalk)
    } else if DECODE_OVERRIDE.is_match(message) {
        Some(Mode::Decode)
    } else {
        None
    }
}

pub fn is_decode_request(message: &str) -> bool {
    DECODE_REQUEST.is_match(message)
}

/// Choose the response strategy for this turn.
///
/// Decode is only ever returned when the profile has decode consent.
pub fn select_mode(
    message: &str,
    verdict: &CrisisVerdict,
    _state: &QuantumEmotionalState,
    profile: &UserProfile,
) -> Mode {
    if verdict.is_crisis {
        return Mode::Crisis;
    }

    let decode_allowed = profile.consent.decode_mode;
    match explicit_override(message) {
        Some(Mode::Decode) if !decode_allowed => {}
        Some(mode) => return mode,
        None => {}
    }

    if decode_allowed && is_decode_request(message) {
        return Mode::Decode;
    }

    if THERAPEUTIC.is_match(message) {
        Mode::Companion
    } else if REAL_TALK.is_match(message) {
        Mode::RealTalk
    } else {
        Mode::Companion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::detect_codes;
    use crate::crisis::classify_crisis;
    use crate::state::compute_state_at;

    fn route(message: &str, profile: &UserProfile) -> Mode {
        let verdict = classify_crisis(message);
        let state = compute_state_at(&detect_codes(message), &[], 0);
        select_mode(message, &verdict, &state, profile)
    }

    fn consenting() -> UserProfile {
        let mut p = UserProfile::new_at("u", 0);
        p.consent.decode_mode = true;
        p
    }

    #[test]
    fn test_crisis_is_unconditional() {
        let p = consenting();
        assert_eq!(route("talk normal, I want to end it", &p), Mode::Crisis);
        assert_eq!(route("decode this, I want to die", &p), Mode::Crisis);
    }

    #[test]
    fn test_decode_requires_consent() {
        let msg = "Why do I always say yes to everything?";
        assert_eq!(route(msg, &UserProfile::new_at("u", 0)), Mode::Companion);
        assert_eq!(route(msg, &consenting()), Mode::Decode);
    }

    #[test]
    fn test_decode_override_requires_consent() {
        let msg = "decode this for me";
        assert_ne!(route(msg, &UserProfile::new_at("u", 0)), Mode::Decode);
        assert_eq!(route(msg, &consenting()), Mode::Decode);
    }

    #[test]
    fn test_therapeutic_wins_ties() {
        let p = UserProfile::new_at("u", 0);
        assert_eq!(route("I feel so anxious before my job interview", &p), Mode::Companion);
    }

    #[test]
    fn test_real_talk_keywords() {
        let p = UserProfile::new_at("u", 0);
        assert_eq!(
            route("Should I send this resume or rewrite the summary?", &p),
            Mode::RealTalk
        );
        assert_eq!(route("how do I negotiate salary", &p), Mode::RealTalk);
    }

    #[test]
    fn test_default_is_companion() {
        let p = UserProfile::new_at("u", 0);
        assert_eq!(route("hey", &p), Mode::Companion);
        assert_eq!(route("", &p), Mode::Companion);
    }

    #[test]
    fn test_overrides_beat_keywords() {
        let p = UserProfile::new_at("u", 0);
        assert_eq!(route("talk normal, I'm anxious about nothing", &p), Mode::RealTalk);
        assert_eq!(route("I need support with this resume", &p), Mode::Companion);
    }

    #[test]
    fn test_override_is_one_turn_only() {
        let p = UserProfile::new_at("u", 0);
        assert_eq!(route("switch to real talk", &p), Mode::RealTalk);
        // The next message carries no override and no keywords.
        assert_eq!(route("ok so", &p), Mode::Companion);
    }

    #[test]
    fn test_mode_wire_names() {
        assert_eq!(serde_json::to_string(&Mode::RealTalk).unwrap(), "\"real_talk\"");
        assert_eq!(Mode::parse("decode"), Some(Mode::Decode));
        assert_eq!(Mode::parse("nope"), None);
    }
}
