//! Quantum emotional state: the per-turn nervous-system descriptor derived
//! from detected codes and recent history.
//!
//! The primary state and dominant emotion come from the current turn only.
//! Recent history shapes `intensity` and `trend`. Body signals are a static
//! lookup by dominant emotion, not read from the message text.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codes::{AdaptiveCode, CodeKind, detect_codes, has_code, overall_intensity};
use crate::constants::{
    CURRENT_TURN_WEIGHT, ENGAGED_MEAN, HISTORY_WINDOW, MAX_BLENDED_STATES, OVERWHELM_MEAN,
};
use crate::crisis::CrisisVerdict;
use crate::history::{ConversationMessage, recent_user_messages};
use crate::time::now_unix_secs;

/// Coarse regulation bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NervousState {
    /// Safe and social.
    Ventral,
    /// Mobilized: fight, flight, fawn.
    Sympathetic,
    /// Shutdown and collapse.
    Dorsal,
}

impl NervousState {
    pub fn as_str(self) -> &'static str {
        match self {
            NervousState::Ventral => "ventral",
            NervousState::Sympathetic => "sympathetic",
            NervousState::Dorsal => "dorsal",
        }
    }
}

impl fmt::Display for NervousState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DominantEmotion {
    Grounded,
    Engaged,
    Activated,
    Overwhelmed,
    Shutdown,
    Crisis,
}

impl DominantEmotion {
    pub fn as_str(self) -> &'static str {
        match self {
            DominantEmotion::Grounded => "grounded",
            DominantEmotion::Engaged => "engaged",
            DominantEmotion::Activated => "activated",
            DominantEmotion::Overwhelmed => "overwhelmed",
            DominantEmotion::Shutdown => "shutdown",
            DominantEmotion::Crisis => "crisis",
        }
    }

    /// Static body-region table.
    pub fn body_signals(self) -> BTreeSet<BodySignal> {
        use BodySignal::*;
        let regions: &[BodySignal] = match self {
            DominantEmotion::Grounded => &[Breath, Belly],
            DominantEmotion::Engaged => &[Face, Hands],
            DominantEmotion::Activated | DominantEmotion::Overwhelmed => &[Chest, Shoulders, Jaw],
            DominantEmotion::Shutdown => &[WholeBody, Limbs],
            DominantEmotion::Crisis => &[Chest, Throat, WholeBody],
        };
        regions.iter().copied().collect()
    }

    /// Delivery hint for the voice collaborator.
    pub fn voice_style(self) -> VoiceStyle {
        match self {
            DominantEmotion::Grounded => VoiceStyle::Warm,
            DominantEmotion::Engaged => VoiceStyle::Bright,
            DominantEmotion::Activated => VoiceStyle::Slow,
            DominantEmotion::Overwhelmed => VoiceStyle::Soothing,
            DominantEmotion::Shutdown => VoiceStyle::Gentle,
            DominantEmotion::Crisis => VoiceStyle::Steady,
        }
    }
}

impl fmt::Display for DominantEmotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodySignal {
    Chest,
    Shoulders,
    Jaw,
    Throat,
    Breath,
    Belly,
    Face,
    Hands,
    Limbs,
    WholeBody,
}

impl BodySignal {
    pub fn as_str(self) -> &'static str {
        match self {
            BodySignal::Chest => "chest",
            BodySignal::Shoulders => "shoulders",
            BodySignal::Jaw => "jaw",
            BodySignal::Throat => "throat",
            BodySignal::Breath => "breath",
            BodySignal::Belly => "belly",
            BodySignal::Face => "face",
            BodySignal::Hands => "hands",
            BodySignal::Limbs => "limbs",
            BodySignal::WholeBody => "whole_body",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceStyle {
    Warm,
    Bright,
    Slow,
    Soothing,
    Gentle,
    Steady,
}

/// Direction of intensity relative to the recent window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Steady,
    Falling,
}

/// Intensity delta (in points) that counts as a change of trend.
const TREND_THRESHOLD: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantumEmotionalState {
    pub primary_state: NervousState,
    pub blended_states: Vec<(NervousState, u8)>,
    pub dominant_emotion: DominantEmotion,
    pub body_signals: BTreeSet<BodySignal>,
    pub intensity: u8,
    pub trend: Trend,
    pub timestamp: u64,
}

impl QuantumEmotionalState {
    /// State reported for a crisis verdict; bypasses code-based mapping.
    pub fn crisis(verdict: &CrisisVerdict) -> Self {
        Self {
            primary_state: NervousState::Sympathetic,
            blended_states: Vec::new(),
            dominant_emotion: DominantEmotion::Crisis,
            body_signals: DominantEmotion::Crisis.body_signals(),
            intensity: verdict.severity,
            trend: Trend::Rising,
            timestamp: now_unix_secs(),
        }
    }

    /// One-line description for responses and prompts.
    pub fn describe(&self) -> String {
        let mut out = format!(
            "{} ({}) at {}/100",
            self.primary_state, self.dominant_emotion, self.intensity
        );
        if !self.blended_states.is_empty() {
            let blended: Vec<String> = self
                .blended_states
                .iter()
                .map(|(s, i)| format!("{s} {i}"))
                .collect();
            out.push_str(&format!(", blended with {}", blended.join(", ")));
        }
        match self.trend {
            Trend::Rising => out.push_str(", rising"),
            Trend::Falling => out.push_str(", settling"),
            Trend::Steady => {}
        }
        out
    }

    pub fn body_signal_names(&self) -> Vec<&'static str> {
        self.body_signals.iter().map(|b| b.as_str()).collect()
    }
}

/// Compute the state for the current turn.
///
/// `history` holds the turns *before* the current message.
pub fn compute_state(codes: &[AdaptiveCode], history: &[ConversationMessage]) -> QuantumEmotionalState {
    compute_state_at(codes, history, now_unix_secs())
}

pub fn compute_state_at(
    codes: &[AdaptiveCode],
    history: &[ConversationMessage],
    timestamp: u64,
) -> QuantumEmotionalState {
    let mean = overall_intensity(codes);

    let (primary_state, dominant_emotion, primary_code) =
        if has_code(codes, CodeKind::NervousSystemActivation) {
            let emotion = if mean > OVERWHELM_MEAN {
                DominantEmotion::Overwhelmed
            } else {
                DominantEmotion::Activated
            };
            (NervousState::Sympathetic, emotion, Some(CodeKind::NervousSystemActivation))
        } else if has_code(codes, CodeKind::DismissalDefense) {
            (NervousState::Dorsal, DominantEmotion::Shutdown, Some(CodeKind::DismissalDefense))
        } else if has_code(codes, CodeKind::Overwhelm) {
            (NervousState::Sympathetic, DominantEmotion::Overwhelmed, Some(CodeKind::Overwhelm))
        } else if mean > ENGAGED_MEAN {
            (NervousState::Sympathetic, DominantEmotion::Engaged, None)
        } else {
            (NervousState::Ventral, DominantEmotion::Grounded, None)
        };

    // Secondary codes keep their own bucket even when it disagrees with the primary.
    let blended_states = codes
        .iter()
        .filter(|c| Some(c.code) != primary_code)
        .take(MAX_BLENDED_STATES)
        .map(|c| (c.code.state_bucket(), c.intensity))
        .collect();

    let (intensity, trend) = blend_with_history(mean, history);

    QuantumEmotionalState {
        primary_state,
        blended_states,
        dominant_emotion,
        body_signals: dominant_emotion.body_signals(),
        intensity,
        trend,
        timestamp,
    }
}

fn blend_with_history(current: f64, history: &[ConversationMessage]) -> (u8, Trend) {
    let recent = recent_user_messages(history, HISTORY_WINDOW);
    if recent.is_empty() {
        return (to_intensity(current), Trend::Steady);
    }

    let recent_mean = recent
        .iter()
        .map(|m| overall_intensity(&detect_codes(&m.content)))
        .sum::<f64>()
        / recent.len() as f64;

    let blended = CURRENT_TURN_WEIGHT * current + (1.0 - CURRENT_TURN_WEIGHT) * recent_mean;
    let trend = if current - recent_mean > TREND_THRESHOLD {
        Trend::Rising
    } else if recent_mean - current > TREND_THRESHOLD {
        Trend::Falling
    } else {
        Trend::Steady
    };
    (to_intensity(blended), trend)
}

fn to_intensity(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crisis::classify_crisis;
    use crate::history::Role;

    fn state_for(message: &str) -> QuantumEmotionalState {
        compute_state_at(&detect_codes(message), &[], 0)
    }

    #[test]
    fn test_overwhelm_and_boundary_violation() {
        let s = state_for("I can't say no to one more favor, I feel like I'm drowning");
        assert_eq!(s.primary_state, NervousState::Sympathetic);
        assert_eq!(s.dominant_emotion, DominantEmotion::Overwhelmed);
        // Boundary violation rides along as a blended sympathetic signal.
        assert_eq!(s.blended_states, vec![(NervousState::Sympathetic, 70)]);
        assert_eq!(s.intensity, 73);
    }

    #[test]
    fn test_activation_alone_is_activated() {
        let s = state_for("my heart is racing");
        assert_eq!(s.primary_state, NervousState::Sympathetic);
        assert_eq!(s.dominant_emotion, DominantEmotion::Activated);
        assert!(s.body_signals.contains(&BodySignal::Chest));
        assert!(s.body_signals.contains(&BodySignal::Jaw));
    }

    #[test]
    fn test_activation_above_threshold_is_overwhelmed() {
        let codes = vec![
            AdaptiveCode {
                code: CodeKind::NervousSystemActivation,
                intensity: 85,
                trigger_keywords: vec![],
            },
            AdaptiveCode {
                code: CodeKind::Overwhelm,
                intensity: 80,
                trigger_keywords: vec![],
            },
        ];
        let s = compute_state_at(&codes, &[], 0);
        assert_eq!(s.dominant_emotion, DominantEmotion::Overwhelmed);
    }

    #[test]
    fn test_dismissal_defense_is_dorsal() {
        let s = state_for("it's fine, it's just too much");
        assert_eq!(s.primary_state, NervousState::Dorsal);
        assert_eq!(s.dominant_emotion, DominantEmotion::Shutdown);
        assert_eq!(s.body_signal_names(), vec!["limbs", "whole_body"]);
        // Overwhelm blends in as sympathetic: the disagreement is kept.
        assert_eq!(s.blended_states, vec![(NervousState::Sympathetic, 75)]);
    }

    #[test]
    fn test_activation_wins_over_dismissal() {
        let s = state_for("whatever, I'm anxious and it's too much");
        assert_eq!(s.primary_state, NervousState::Sympathetic);
    }

    #[test]
    fn test_engaged_above_fifty() {
        let s = state_for("I keep putting it off");
        assert_eq!(s.primary_state, NervousState::Sympathetic);
        assert_eq!(s.dominant_emotion, DominantEmotion::Engaged);
    }

    #[test]
    fn test_default_grounded() {
        let s = state_for("Let's brainstorm the prototype");
        assert_eq!(s.primary_state, NervousState::Ventral);
        assert_eq!(s.dominant_emotion, DominantEmotion::Grounded);

        let empty = state_for("");
        assert_eq!(empty.primary_state, NervousState::Ventral);
        assert_eq!(empty.intensity, 0);
        assert!(empty.blended_states.is_empty());
    }

    #[test]
    fn test_blended_states_capped_at_two_in_detection_order() {
        let s = state_for(
            "I'm exhausted, I don't want to disappoint anyone, they took advantage, \
             I can't decide, my jaw is sore",
        );
        assert_eq!(s.dominant_emotion, DominantEmotion::Overwhelmed);
        assert_eq!(
            s.blended_states,
            vec![(NervousState::Sympathetic, 60), (NervousState::Sympathetic, 70)]
        );
    }

    #[test]
    fn test_history_rising_trend() {
        let history = vec![
            ConversationMessage::at(Role::User, "just checking in", 1),
            ConversationMessage::at(Role::Assistant, "hi", 2),
        ];
        let codes = detect_codes("my heart is racing");
        let s = compute_state_at(&codes, &history, 3);
        assert_eq!(s.trend, Trend::Rising);
        // 0.7 * 80 + 0.3 * 0
        assert_eq!(s.intensity, 56);
    }

    #[test]
    fn test_history_falling_trend() {
        let history = vec![ConversationMessage::at(Role::User, "I'm so anxious", 1)];
        let s = compute_state_at(&[], &history, 2);
        assert_eq!(s.trend, Trend::Falling);
        assert_eq!(s.primary_state, NervousState::Ventral);
    }

    #[test]
    fn test_crisis_state() {
        let v = classify_crisis("I want to end it");
        let s = QuantumEmotionalState::crisis(&v);
        assert_eq!(s.dominant_emotion, DominantEmotion::Crisis);
        assert_eq!(s.intensity, 95);
    }

    #[test]
    fn test_describe() {
        let s = state_for("it's fine, it's just too much");
        assert_eq!(
            s.describe(),
            "dorsal (shutdown) at 70/100, blended with sympathetic 75"
        );
    }

    #[test]
    fn test_voice_style_table() {
        assert_eq!(DominantEmotion::Overwhelmed.voice_style(), VoiceStyle::Soothing);
        assert_eq!(DominantEmotion::Crisis.voice_style(), VoiceStyle::Steady);
    }
}
