//! Long-lived per-user nervous-system profile and its mutation rules.
//!
//! Dials only move by fixed clamped steps. Consent is an input: nothing in
//! this module's learning paths writes to it; only [`UserProfile::set_consent`]
//! does, and that is reserved for explicit user action.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::codes::CodeKind;
use crate::constants::{DIAL_MAX, DIAL_STEP, DORMANCY_PERIOD_SECS, MIN_LEARNING_RATE};
use crate::state::NervousState;
use crate::time::now_unix_secs;

/// Cap on free-text signal sets kept in the baseline.
const SIGNAL_SET_CAP: usize = 25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub relationship_start: u64,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub last_seen: u64,
    #[serde(default)]
    pub baseline: Baseline,
    #[serde(default)]
    pub somatic_patterns: BTreeMap<String, SomaticPattern>,
    #[serde(default)]
    pub meta_learning: MetaLearning,
    #[serde(default)]
    pub adaptive_patterns: AdaptivePatterns,
    #[serde(default)]
    pub consent: Consent,
    #[serde(default)]
    pub communication_style: CommunicationStyle,
    #[serde(default)]
    pub relationship_depth: RelationshipDepth,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub baseline_state: NervousState,
    #[serde(default)]
    pub state_counts: BTreeMap<NervousState, u32>,
    #[serde(default)]
    pub stress_signals: BTreeSet<String>,
    #[serde(default)]
    pub safety_signals: BTreeSet<String>,
    #[serde(default)]
    pub trigger_patterns: BTreeSet<String>,
}

impl Default for Baseline {
    fn default() -> Self {
        Self {
            baseline_state: NervousState::Ventral,
            state_counts: BTreeMap::new(),
            stress_signals: BTreeSet::new(),
            safety_signals: BTreeSet::new(),
            trigger_patterns: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Rare,
    Occasional,
    Frequent,
    Chronic,
}

impl Frequency {
    pub fn from_occurrences(n: u32) -> Self {
        match n {
            0 | 1 => Frequency::Rare,
            2..=4 => Frequency::Occasional,
            5..=9 => Frequency::Frequent,
            _ => Frequency::Chronic,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Rare => "rare",
            Frequency::Occasional => "occasional",
            Frequency::Frequent => "frequent",
            Frequency::Chronic => "chronic",
        }
    }
}

/// A named recurring body-level response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SomaticPattern {
    pub pattern: String,
    pub triggers: BTreeSet<String>,
    pub successful_interventions: BTreeSet<String>,
    pub frequency: Frequency,
    pub occurrences: u32,
    pub last_occurrence: u64,
    /// 1 (faint) to 5 (overpowering).
    pub intensity: u8,
}

impl SomaticPattern {
    fn new(pattern: &str, at: u64) -> Self {
        Self {
            pattern: pattern.to_string(),
            triggers: BTreeSet::new(),
            successful_interventions: BTreeSet::new(),
            frequency: Frequency::Rare,
            occurrences: 0,
            last_occurrence: at,
            intensity: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionRecord {
    pub intervention: String,
    pub worked: bool,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaLearning {
    /// Insertion-ordered, no duplicates.
    pub what_works: Vec<String>,
    /// Insertion-ordered, no duplicates, disjoint from `what_works`.
    pub what_doesnt: Vec<String>,
    pub intervention_history: Vec<InterventionRecord>,
    pub learning_rate: f64,
}

impl Default for MetaLearning {
    fn default() -> Self {
        Self {
            what_works: Vec::new(),
            what_doesnt: Vec::new(),
            intervention_history: Vec::new(),
            learning_rate: 1.0,
        }
    }
}

/// Known dispositions, set once observed and never cleared by inference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptivePatterns {
    pub people_pleasing: bool,
    pub boundary_struggles: bool,
    pub overwhelm_prone: bool,
    pub dismissal_defense: bool,
    pub decision_avoidance: bool,
    pub design_thinker: bool,
    pub body_aware: bool,
    pub boundary_builder: bool,
}

impl AdaptivePatterns {
    pub fn flag(&mut self, code: CodeKind) {
        match code {
            CodeKind::PeoplePleasing => self.people_pleasing = true,
            CodeKind::BoundaryViolation => self.boundary_struggles = true,
            CodeKind::Overwhelm | CodeKind::NervousSystemActivation => self.overwhelm_prone = true,
            CodeKind::DismissalDefense => self.dismissal_defense = true,
            CodeKind::DecisionAvoidance => self.decision_avoidance = true,
            CodeKind::DesignThinking => self.design_thinker = true,
            CodeKind::SomaticAwareness => self.body_aware = true,
            CodeKind::BoundarySetting => self.boundary_builder = true,
        }
    }

    /// Names of the flags currently set.
    pub fn active(&self) -> Vec<&'static str> {
        [
            (self.people_pleasing, "people-pleasing"),
            (self.boundary_struggles, "boundary struggles"),
            (self.overwhelm_prone, "prone to overwhelm"),
            (self.dismissal_defense, "dismisses own needs under stress"),
            (self.decision_avoidance, "avoids decisions under load"),
            (self.design_thinker, "design thinker"),
            (self.body_aware, "body-aware"),
            (self.boundary_builder, "actively building boundaries"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataRetention {
    /// Nothing is written to durable storage.
    SessionOnly,
    /// Written, purged thirty days after the last update.
    #[default]
    ThirtyDays,
    Indefinite,
}

impl DataRetention {
    pub fn as_str(self) -> &'static str {
        match self {
            DataRetention::SessionOnly => "session_only",
            DataRetention::ThirtyDays => "thirty_days",
            DataRetention::Indefinite => "indefinite",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "session_only" => Some(DataRetention::SessionOnly),
            "thirty_days" => Some(DataRetention::ThirtyDays),
            "indefinite" => Some(DataRetention::Indefinite),
            _ => None,
        }
    }

    pub fn persists(self) -> bool {
        self != DataRetention::SessionOnly
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consent {
    pub mic_input: bool,
    pub voice_output: bool,
    pub data_retention: DataRetention,
    pub biometric_sharing: bool,
    pub decode_mode: bool,
}

/// Partial consent change requested by the user. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentUpdate {
    pub mic_input: Option<bool>,
    pub voice_output: Option<bool>,
    pub data_retention: Option<DataRetention>,
    pub biometric_sharing: Option<bool>,
    pub decode_mode: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunicationStyle {
    pub directness: u8,
    pub warmth: u8,
    pub playfulness: u8,
    pub depth: u8,
}

impl Default for CommunicationStyle {
    fn default() -> Self {
        Self {
            directness: 50,
            warmth: 60,
            playfulness: 40,
            depth: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDepth {
    pub trust: u8,
    pub familiarity: u8,
    pub attunement: u8,
}

impl Default for RelationshipDepth {
    fn default() -> Self {
        Self {
            trust: 20,
            familiarity: 0,
            attunement: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipDimension {
    Trust,
    Familiarity,
    Attunement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleDial {
    Directness,
    Warmth,
    Playfulness,
    Depth,
}

fn step_dial(dial: &mut u8) {
    *dial = dial.saturating_add(DIAL_STEP).min(DIAL_MAX);
}

/// Insert into an insertion-ordered set, returning true if it was new.
fn push_unique(list: &mut Vec<String>, item: &str) -> bool {
    if list.iter().any(|x| x == item) {
        return false;
    }
    list.push(item.to_string());
    true
}

fn insert_capped(set: &mut BTreeSet<String>, item: &str) {
    if set.len() < SIGNAL_SET_CAP || set.contains(item) {
        set.insert(item.to_string());
    }
}

impl UserProfile {
    /// Fresh profile with default dials and the most conservative consent.
    pub fn new(user_id: &str) -> Self {
        Self::new_at(user_id, now_unix_secs())
    }

    pub fn new_at(user_id: &str, now: u64) -> Self {
        Self {
            user_id: user_id.to_string(),
            name: None,
            relationship_start: now,
            timezone: default_timezone(),
            last_seen: now,
            baseline: Baseline::default(),
            somatic_patterns: BTreeMap::new(),
            meta_learning: MetaLearning::default(),
            adaptive_patterns: AdaptivePatterns::default(),
            consent: Consent::default(),
            communication_style: CommunicationStyle::default(),
            relationship_depth: RelationshipDepth::default(),
        }
    }

    /// Upsert a somatic pattern keyed by name.
    ///
    /// New triggers and interventions are unioned into the existing sets,
    /// so repeating the same call never grows them.
    pub fn record_somatic_pattern(
        &mut self,
        pattern: &str,
        trigger: &str,
        intervention: Option<&str>,
        at: u64,
    ) -> &mut SomaticPattern {
        let entry = self
            .somatic_patterns
            .entry(pattern.to_string())
            .or_insert_with(|| SomaticPattern::new(pattern, at));

        if !trigger.is_empty() {
            entry.triggers.insert(trigger.to_string());
        }
        if let Some(intervention) = intervention.filter(|i| !i.is_empty()) {
            entry.successful_interventions.insert(intervention.to_string());
        }
        entry.occurrences = entry.occurrences.saturating_add(1);
        entry.frequency = Frequency::from_occurrences(entry.occurrences);
        entry.last_occurrence = entry.last_occurrence.max(at);
        entry
    }

    /// Increment one relationship dial by the fixed step, clamped to 100.
    pub fn deepen_relationship(&mut self, dimension: RelationshipDimension) {
        let depth = &mut self.relationship_depth;
        match dimension {
            RelationshipDimension::Trust => step_dial(&mut depth.trust),
            RelationshipDimension::Familiarity => step_dial(&mut depth.familiarity),
            RelationshipDimension::Attunement => step_dial(&mut depth.attunement),
        }
    }

    /// Increment one communication-style dial by the fixed step, clamped to 100.
    pub fn nudge_style(&mut self, dial: StyleDial) {
        let style = &mut self.communication_style;
        match dial {
            StyleDial::Directness => step_dial(&mut style.directness),
            StyleDial::Warmth => step_dial(&mut style.warmth),
            StyleDial::Playfulness => step_dial(&mut style.playfulness),
            StyleDial::Depth => step_dial(&mut style.depth),
        }
    }

    /// Record whether an intervention helped. Latest evidence wins: an
    /// intervention moves between `what_works` and `what_doesnt`.
    pub fn record_outcome(&mut self, intervention: &str, worked: bool, at: u64) {
        let learning = &mut self.meta_learning;
        let (target, other) = if worked {
            (&mut learning.what_works, &mut learning.what_doesnt)
        } else {
            (&mut learning.what_doesnt, &mut learning.what_works)
        };
        other.retain(|x| x != intervention);
        push_unique(target, intervention);

        learning.intervention_history.push(InterventionRecord {
            intervention: intervention.to_string(),
            worked,
            timestamp: at,
        });
        let n = learning.intervention_history.len() as f64;
        learning.learning_rate = (1.0 / (1.0 + n / 10.0)).max(MIN_LEARNING_RATE);
    }

    /// Tally the turn's primary state and refresh the baseline to the mode.
    /// Ties keep the calmer state.
    pub fn observe_state(&mut self, state: NervousState) {
        let baseline = &mut self.baseline;
        *baseline.state_counts.entry(state).or_insert(0) += 1;
        if let Some((&most, _)) = baseline
            .state_counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        {
            baseline.baseline_state = most;
        }
    }

    pub fn add_stress_signal(&mut self, signal: &str) {
        insert_capped(&mut self.baseline.stress_signals, signal);
    }

    pub fn add_safety_signal(&mut self, signal: &str) {
        insert_capped(&mut self.baseline.safety_signals, signal);
    }

    pub fn add_trigger_pattern(&mut self, pattern: &str) {
        insert_capped(&mut self.baseline.trigger_patterns, pattern);
    }

    /// Apply an explicit consent change from the user.
    pub fn set_consent(&mut self, update: &ConsentUpdate) {
        let consent = &mut self.consent;
        if let Some(v) = update.mic_input {
            consent.mic_input = v;
        }
        if let Some(v) = update.voice_output {
            consent.voice_output = v;
        }
        if let Some(v) = update.data_retention {
            consent.data_retention = v;
        }
        if let Some(v) = update.biometric_sharing {
            consent.biometric_sharing = v;
        }
        if let Some(v) = update.decode_mode {
            consent.decode_mode = v;
        }
    }

    /// Relationship dials lose one point per full dormancy period since
    /// `last_seen`, never dropping below their defaults. Style dials are
    /// untouched. Returns the number of periods applied.
    pub fn apply_dormancy_decay(&mut self, now: u64) -> u64 {
        let periods = now.saturating_sub(self.last_seen) / DORMANCY_PERIOD_SECS;
        if periods == 0 {
            return 0;
        }
        let floor = RelationshipDepth::default();
        let loss = u8::try_from(periods).unwrap_or(u8::MAX);
        let depth = &mut self.relationship_depth;
        depth.trust = depth.trust.saturating_sub(loss).max(floor.trust.min(depth.trust));
        depth.familiarity = depth
            .familiarity
            .saturating_sub(loss)
            .max(floor.familiarity.min(depth.familiarity));
        depth.attunement = depth
            .attunement
            .saturating_sub(loss)
            .max(floor.attunement.min(depth.attunement));
        periods
    }

    pub fn touch(&mut self, now: u64) {
        self.last_seen = self.last_seen.max(now);
    }
}
