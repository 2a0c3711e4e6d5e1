//! Adaptive-code detection: a fixed battery of lexical matchers that tag a
//! message with weighted behavioral / nervous-system patterns.
//!
//! Matchers run independently and fire at most once per message. Emission
//! order is declaration order, never severity order.

use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::constants::CRISIS_LEVEL_MEAN;
use crate::lexicon::PhraseBattery;
use crate::state::NervousState;

/// Tag for a detected pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CodeKind {
    Overwhelm,
    PeoplePleasing,
    BoundaryViolation,
    DismissalDefense,
    DesignThinking,
    DecisionAvoidance,
    NervousSystemActivation,
    SomaticAwareness,
    BoundarySetting,
}

impl CodeKind {
    /// All codes in matcher declaration order.
    pub const ALL: [CodeKind; 9] = [
        CodeKind::Overwhelm,
        CodeKind::PeoplePleasing,
        CodeKind::BoundaryViolation,
        CodeKind::DismissalDefense,
        CodeKind::DesignThinking,
        CodeKind::DecisionAvoidance,
        CodeKind::NervousSystemActivation,
        CodeKind::SomaticAwareness,
        CodeKind::BoundarySetting,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CodeKind::Overwhelm => "OVERWHELM",
            CodeKind::PeoplePleasing => "PEOPLE_PLEASING",
            CodeKind::BoundaryViolation => "BOUNDARY_VIOLATION",
            CodeKind::DismissalDefense => "DISMISSAL_DEFENSE",
            CodeKind::DesignThinking => "DESIGN_THINKING",
            CodeKind::DecisionAvoidance => "DECISION_AVOIDANCE",
            CodeKind::NervousSystemActivation => "NERVOUS_SYSTEM_ACTIVATION",
            CodeKind::SomaticAwareness => "SOMATIC_AWARENESS",
            CodeKind::BoundarySetting => "BOUNDARY_SETTING",
        }
    }

    /// Plain-language name used in prompts and somatic pattern keys.
    pub fn label(self) -> &'static str {
        match self {
            CodeKind::Overwhelm => "overwhelm",
            CodeKind::PeoplePleasing => "people-pleasing",
            CodeKind::BoundaryViolation => "boundary violation",
            CodeKind::DismissalDefense => "dismissal as defense",
            CodeKind::DesignThinking => "design thinking",
            CodeKind::DecisionAvoidance => "decision avoidance",
            CodeKind::NervousSystemActivation => "nervous-system activation",
            CodeKind::SomaticAwareness => "somatic awareness",
            CodeKind::BoundarySetting => "boundary setting",
        }
    }

    pub fn base_intensity(self) -> u8 {
        match self {
            CodeKind::Overwhelm => 75,
            CodeKind::PeoplePleasing => 60,
            CodeKind::BoundaryViolation => 70,
            CodeKind::DismissalDefense => 65,
            CodeKind::DesignThinking => 40,
            CodeKind::DecisionAvoidance => 55,
            CodeKind::NervousSystemActivation => 80,
            CodeKind::SomaticAwareness => 50,
            CodeKind::BoundarySetting => 45,
        }
    }

    /// Nervous-system bucket this code points at on its own.
    pub fn state_bucket(self) -> NervousState {
        match self {
            CodeKind::Overwhelm
            | CodeKind::PeoplePleasing
            | CodeKind::BoundaryViolation
            | CodeKind::NervousSystemActivation => NervousState::Sympathetic,
            CodeKind::DismissalDefense | CodeKind::DecisionAvoidance => NervousState::Dorsal,
            CodeKind::DesignThinking | CodeKind::SomaticAwareness | CodeKind::BoundarySetting => {
                NervousState::Ventral
            }
        }
    }

    /// Codes that carry a body-level signal worth remembering as a somatic pattern.
    pub fn is_somatic(self) -> bool {
        matches!(
            self,
            CodeKind::Overwhelm | CodeKind::NervousSystemActivation | CodeKind::SomaticAwareness
        )
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for CodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected pattern with its weight and the phrases that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptiveCode {
    pub code: CodeKind,
    pub intensity: u8,
    pub trigger_keywords: Vec<String>,
}

static OVERWHELM: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "overwhelm",
        &[
            "overwhelm*",
            "too much",
            "drowning",
            "can't keep up",
            "cant keep up",
            "can't cope",
            "falling apart",
            "so much to do",
            "exhausted",
            "burned out",
            "burnt out",
            "at my limit",
            "swamped",
            "buried",
        ],
    )
});

static PEOPLE_PLEASING: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "people_pleasing",
        &[
            "make everyone happy",
            "don't want to disappoint",
            "dont want to disappoint",
            "let them down",
            "let everyone down",
            "sorry to bother",
            "whatever you want",
            "keep the peace",
            "need them to like me",
            "what they want",
        ],
    )
});

static BOUNDARY_VIOLATION: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "boundary_violation",
        &[
            "can't say no",
            "cant say no",
            "one more favor",
            "another favor",
            "always asking me",
            "took advantage",
            "taking advantage",
            "crossed the line",
            "without asking",
            "walk all over",
            "walked all over",
            "guilt trip*",
            "expected me to",
        ],
    )
});

static DISMISSAL: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "dismissal",
        &[
            "it's fine",
            "its fine",
            "i'm fine",
            "im fine",
            "whatever",
            "doesn't matter",
            "doesnt matter",
            "no big deal",
            "not a big deal",
            "it's nothing",
            "don't care",
            "i'll manage",
        ],
    )
});

static DESIGN_THINKING: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "design_thinking",
        &[
            "prototype*",
            "wireframe*",
            "mockup*",
            "user flow",
            "brainstorm*",
            "sketch*",
            "mood board",
            "iterate",
            "design*",
        ],
    )
});

static DECISION_AVOIDANCE: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "decision_avoidance",
        &[
            "can't decide",
            "cant decide",
            "putting it off",
            "putting off",
            "keep avoiding",
            "avoiding it",
            "procrastinat*",
            "don't know what to do",
            "not sure what to do",
            "stuck between",
            "kick the can",
        ],
    )
});

static ACTIVATION: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "activation",
        &[
            "heart racing",
            "heart is racing",
            "heart pounding",
            "anxious",
            "anxiety",
            "on edge",
            "shaking",
            "jittery",
            "wired",
            "adrenaline",
            "can't sit still",
            "panicking",
            "freaking out",
            "tense",
        ],
    )
});

static SOMATIC: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "somatic",
        &[
            "my body",
            "tight chest",
            "chest is tight",
            "chest feels tight",
            "shoulders",
            "jaw",
            "stomach",
            "breathing",
            "breath",
            "tension",
            "gut",
            "throat",
            "headache",
        ],
    )
});

static BOUNDARY_SETTING: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "boundary_setting",
        &[
            "i said no",
            "said no",
            "set a boundary",
            "setting boundaries",
            "boundaries",
            "protect my time",
            "not available",
            "pushed back",
            "i'm not doing",
        ],
    )
});

fn code(kind: CodeKind, trigger_keywords: Vec<String>) -> AdaptiveCode {
    AdaptiveCode {
        code: kind,
        intensity: kind.base_intensity(),
        trigger_keywords,
    }
}

/// Run every matcher against `message`.
///
/// Empty or whitespace-only input yields no codes.
pub fn detect_codes(message: &str) -> Vec<AdaptiveCode> {
    if message.trim().is_empty() {
        return Vec::new();
    }

    let overwhelm_hits = OVERWHELM.matches(message);
    let mut codes = Vec::new();

    for kind in CodeKind::ALL {
        let hits = match kind {
            CodeKind::Overwhelm => overwhelm_hits.clone(),
            CodeKind::PeoplePleasing => PEOPLE_PLEASING.matches(message),
            CodeKind::BoundaryViolation => BOUNDARY_VIOLATION.matches(message),
            // Dismissal only counts as a defense when overwhelm is stated alongside it.
            CodeKind::DismissalDefense => {
                let dismissal = DISMISSAL.matches(message);
                if dismissal.is_empty() || overwhelm_hits.is_empty() {
                    Vec::new()
                } else {
                    dismissal
                        .into_iter()
                        .chain(overwhelm_hits.iter().cloned())
                        .collect()
                }
            }
            CodeKind::DesignThinking => DESIGN_THINKING.matches(message),
            CodeKind::DecisionAvoidance => DECISION_AVOIDANCE.matches(message),
            CodeKind::NervousSystemActivation => ACTIVATION.matches(message),
            CodeKind::SomaticAwareness => SOMATIC.matches(message),
            CodeKind::BoundarySetting => BOUNDARY_SETTING.matches(message),
        };
        if !hits.is_empty() {
            codes.push(code(kind, hits));
        }
    }

    codes
}

/// Arithmetic mean of code intensities, 0 when empty.
pub fn overall_intensity(codes: &[AdaptiveCode]) -> f64 {
    if codes.is_empty() {
        return 0.0;
    }
    codes.iter().map(|c| f64::from(c.intensity)).sum::<f64>() / codes.len() as f64
}

/// Softer crisis signal: mean intensity above the crisis level.
pub fn suggests_crisis_level(codes: &[AdaptiveCode]) -> bool {
    overall_intensity(codes) > CRISIS_LEVEL_MEAN
}

pub fn has_code(codes: &[AdaptiveCode], kind: CodeKind) -> bool {
    codes.iter().any(|c| c.code == kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(codes: &[AdaptiveCode]) -> Vec<CodeKind> {
        codes.iter().map(|c| c.code).collect()
    }

    #[test]
    fn test_favor_and_drowning() {
        let codes = detect_codes("I can't say no to one more favor, I feel like I'm drowning");
        assert_eq!(
            kinds(&codes),
            vec![CodeKind::Overwhelm, CodeKind::BoundaryViolation]
        );
        assert_eq!(codes[0].trigger_keywords, vec!["drowning"]);
        assert_eq!(
            codes[1].trigger_keywords,
            vec!["can't say no", "one more favor"]
        );
    }

    #[test]
    fn test_empty_message_has_no_codes() {
        assert!(detect_codes("").is_empty());
        assert!(detect_codes("   \n\t").is_empty());
    }

    #[test]
    fn test_dismissal_alone_does_not_fire() {
        let codes = detect_codes("it's fine, whatever");
        assert!(!has_code(&codes, CodeKind::DismissalDefense));
    }

    #[test]
    fn test_dismissal_with_overwhelm_fires() {
        let codes = detect_codes("It's fine, it's just too much right now");
        assert_eq!(
            kinds(&codes),
            vec![CodeKind::Overwhelm, CodeKind::DismissalDefense]
        );
        let defense = &codes[1];
        assert!(defense.trigger_keywords.contains(&"it's fine".to_string()));
        assert!(defense.trigger_keywords.contains(&"too much".to_string()));
    }

    #[test]
    fn test_fires_once_per_category() {
        let codes = detect_codes("anxious anxious anxious, so anxious and on edge");
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].code, CodeKind::NervousSystemActivation);
        assert_eq!(codes[0].trigger_keywords, vec!["anxious", "on edge"]);
    }

    #[test]
    fn test_emission_follows_declaration_order() {
        // Boundary setting mentioned first, overwhelm last.
        let codes = detect_codes("I finally said no. My jaw hurts. I'm exhausted.");
        assert_eq!(
            kinds(&codes),
            vec![
                CodeKind::Overwhelm,
                CodeKind::SomaticAwareness,
                CodeKind::BoundarySetting
            ]
        );
    }

    #[test]
    fn test_case_insensitive() {
        let codes = detect_codes("OVERWHELMED AND BURNED OUT");
        assert_eq!(kinds(&codes), vec![CodeKind::Overwhelm]);
    }

    #[test]
    fn test_base_intensities() {
        for kind in CodeKind::ALL {
            assert!(kind.base_intensity() <= 100);
        }
        let codes = detect_codes("my heart is racing");
        assert_eq!(codes[0].intensity, 80);
    }

    #[test]
    fn test_overall_intensity() {
        assert_eq!(overall_intensity(&[]), 0.0);
        let codes = detect_codes("I can't say no to one more favor, I feel like I'm drowning");
        assert!((overall_intensity(&codes) - 72.5).abs() < 1e-9);
    }

    #[test]
    fn test_suggests_crisis_level() {
        let high = vec![
            code(CodeKind::NervousSystemActivation, vec![]),
            AdaptiveCode {
                code: CodeKind::Overwhelm,
                intensity: 95,
                trigger_keywords: vec![],
            },
        ];
        assert!(suggests_crisis_level(&high));
        assert!(!suggests_crisis_level(&detect_codes("my heart is racing")));
        assert!(!suggests_crisis_level(&[]));
    }

    #[test]
    fn test_parse_roundtrips_names() {
        for kind in CodeKind::ALL {
            assert_eq!(CodeKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(CodeKind::parse("overwhelm"), Some(CodeKind::Overwhelm));
        assert_eq!(CodeKind::parse("nope"), None);
    }

    #[test]
    fn test_serde_uses_screaming_case() {
        let json = serde_json::to_string(&CodeKind::BoundaryViolation).unwrap();
        assert_eq!(json, "\"BOUNDARY_VIOLATION\"");
    }
}
