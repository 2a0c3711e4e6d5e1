//! Crisis gate.
//!
//! Five phrase batteries checked in a fixed priority order; the first match
//! wins. This is lexical, not semantic: false negatives are a known limit,
//! which is why a crisis verdict always ships with static resource text.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::lexicon::PhraseBattery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrisisCategory {
    Suicidal,
    SelfHarm,
    SevereDissociation,
    AcutePanic,
    None,
}

impl CrisisCategory {
    pub fn severity(self) -> u8 {
        match self {
            CrisisCategory::Suicidal => 95,
            CrisisCategory::SelfHarm => 90,
            CrisisCategory::AcutePanic => 85,
            CrisisCategory::SevereDissociation => 80,
            CrisisCategory::None => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CrisisCategory::Suicidal => "suicidal",
            CrisisCategory::SelfHarm => "self_harm",
            CrisisCategory::SevereDissociation => "severe_dissociation",
            CrisisCategory::AcutePanic => "acute_panic",
            CrisisCategory::None => "none",
        }
    }
}

impl fmt::Display for CrisisCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrisisVerdict {
    pub is_crisis: bool,
    pub category: CrisisCategory,
    pub severity: u8,
    pub immediate_risks: BTreeSet<String>,
}

impl CrisisVerdict {
    pub fn none() -> Self {
        Self {
            is_crisis: false,
            category: CrisisCategory::None,
            severity: 0,
            immediate_risks: BTreeSet::new(),
        }
    }
}

/// Fixed safety payload. Never generated, never routed through a model.
pub const CRISIS_RESOURCES: &str = "\
I'm really glad you told me. What you're feeling right now matters, and you don't have to carry it alone.

Please reach out for immediate support:
- Call or text 988 (Suicide & Crisis Lifeline, 24/7, US)
- Text HOME to 741741 (Crisis Text Line, 24/7)
- If you are in immediate danger, call 911 or your local emergency number now

Right now, if you can:
1. Move away from anything you could use to hurt yourself.
2. Put both feet on the floor and breathe out slowly, longer than you breathe in.
3. Call or message one person you trust and tell them you need them with you.

I'm here, and I'll stay with you while you reach out.";

/// Immediate-action steps returned as suggestions alongside a crisis verdict.
pub const CRISIS_STEPS: [&str; 3] = [
    "Call or text 988 now",
    "Text HOME to 741741",
    "Call 911 if you are in immediate danger",
];

static SUICIDAL: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "suicidal",
        &[
            "kill myself",
            "killing myself",
            "want to die",
            "wanna die",
            "end my life",
            "end it all",
            "want to end it",
            "wanna end it",
            "going to end it",
            "gonna end it",
            "suicid*",
            "no point anymore",
            "no point in living",
            "no reason to live",
            "better off without me",
            "better off dead",
            "don't want to be here anymore",
            "don't want to live",
        ],
    )
});

static SELF_HARM: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "self_harm",
        &[
            "cut myself",
            "cutting myself",
            "hurt myself",
            "hurting myself",
            "self harm",
            "self-harm",
            "burn myself",
            "punish myself",
        ],
    )
});

static ACUTE_PANIC: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "acute_panic",
        &[
            "panic attack",
            "can't breathe",
            "cant breathe",
            "think i'm dying",
            "think im dying",
            "heart is going to explode",
            "losing control",
            "going to pass out",
        ],
    )
});

static SEVERE_DISSOCIATION: LazyLock<PhraseBattery> = LazyLock::new(|| {
    PhraseBattery::new(
        "severe_dissociation",
        &[
            "nothing feels real",
            "nothing is real",
            "outside my body",
            "out of my body",
            "can't feel anything",
            "watching myself from",
            "don't know who i am",
            "dissociat*",
        ],
    )
});

/// Classify `message` against the crisis batteries, highest severity first.
pub fn classify_crisis(message: &str) -> CrisisVerdict {
    let batteries: [(CrisisCategory, &PhraseBattery); 4] = [
        (CrisisCategory::Suicidal, &SUICIDAL),
        (CrisisCategory::SelfHarm, &SELF_HARM),
        (CrisisCategory::AcutePanic, &ACUTE_PANIC),
        (CrisisCategory::SevereDissociation, &SEVERE_DISSOCIATION),
    ];

    for (category, battery) in batteries {
        let hits = battery.matches(message);
        if !hits.is_empty() {
            return CrisisVerdict {
                is_crisis: true,
                category,
                severity: category.severity(),
                immediate_risks: hits.into_iter().collect(),
            };
        }
    }

    CrisisVerdict::none()
}
