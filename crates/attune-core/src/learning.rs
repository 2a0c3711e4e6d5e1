//! End-of-turn profile learning.
//!
//! All dial movement goes through the clamped profile mutators. Consent is
//! read here, never written.

use std::sync::LazyLock;

use crate::codes::AdaptiveCode;
use crate::lexicon::PhraseBattery;
use crate::profile::{RelationshipDimension, StyleDial, UserProfile};
use crate::router::Mode;
use crate::state::{NervousState, QuantumEmotionalState};

static WORKED: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "outcome_worked",
        &["that helped", "that worked", "it helped", "it worked", "that really helped", "helped a lot"],
    )
});

static DIDNT_WORK: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "outcome_didnt_work",
        &[
            "didn't help",
            "didnt help",
            "did not help",
            "didn't work",
            "didnt work",
            "did not work",
            "not helping",
        ],
    )
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Worked,
    DidntWork,
}

/// Explicit outcome feedback in `message`. Negative phrasing wins when both appear.
pub fn detect_outcome(message: &str) -> Option<Outcome> {
    if DIDNT_WORK.is_match(message) {
        Some(Outcome::DidntWork)
    } else if WORKED.is_match(message) {
        Some(Outcome::Worked)
    } else {
        None
    }
}

/// What the previous assistant turn offered, carried by the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviousOffer {
    pub suggestion: Option<String>,
    pub somatic_pattern: Option<String>,
}

pub struct TurnObservation<'a> {
    pub message: &'a str,
    pub mode: Mode,
    pub codes: &'a [AdaptiveCode],
    pub state: &'a QuantumEmotionalState,
    pub previous: &'a PreviousOffer,
    pub now: u64,
}

/// What a turn taught us, for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LearningSummary {
    pub somatic_patterns: Vec<String>,
    pub outcome: Option<Outcome>,
}

fn somatic_intensity(code_intensity: u8) -> u8 {
    (code_intensity / 20).clamp(1, 5)
}

/// Apply every learning rule for one completed turn.
pub fn learn_from_turn(profile: &mut UserProfile, turn: &TurnObservation<'_>) -> LearningSummary {
    let mut summary = LearningSummary::default();

    profile.deepen_relationship(RelationshipDimension::Familiarity);
    profile.observe_state(turn.state.primary_state);

    if !turn.codes.is_empty() {
        profile.deepen_relationship(RelationshipDimension::Attunement);
    }

    for code in turn.codes {
        profile.adaptive_patterns.flag(code.code);

        let first_trigger = code.trigger_keywords.first().map(String::as_str).unwrap_or("");
        match code.code.state_bucket() {
            NervousState::Sympathetic | NervousState::Dorsal => {
                profile.add_trigger_pattern(code.code.label());
                for kw in &code.trigger_keywords {
                    profile.add_stress_signal(kw);
                }
            }
            NervousState::Ventral if turn.state.primary_state == NervousState::Ventral => {
                for kw in &code.trigger_keywords {
                    profile.add_safety_signal(kw);
                }
            }
            NervousState::Ventral => {}
        }

        if code.code.is_somatic() {
            let pattern = profile.record_somatic_pattern(code.code.label(), first_trigger, None, turn.now);
            pattern.intensity = somatic_intensity(code.intensity);
            summary.somatic_patterns.push(code.code.label().to_string());
        }
    }

    if let (Some(outcome), Some(offered)) = (detect_outcome(turn.message), turn.previous.suggestion.as_deref()) {
        let worked = outcome == Outcome::Worked;
        profile.record_outcome(offered, worked, turn.now);
        if worked {
            if let Some(pattern) = turn.previous.somatic_pattern.as_deref() {
                if let Some(sp) = profile.somatic_patterns.get_mut(pattern) {
                    sp.successful_interventions.insert(offered.to_string());
                }
            }
            profile.deepen_relationship(RelationshipDimension::Trust);
        }
        summary.outcome = Some(outcome);
    }

    match turn.mode {
        Mode::RealTalk => profile.nudge_style(StyleDial::Directness),
        Mode::Companion => profile.nudge_style(StyleDial::Warmth),
        Mode::Decode => profile.nudge_style(StyleDial::Depth),
        Mode::Crisis => {}
    }

    profile.touch(turn.now);
    summary
}
