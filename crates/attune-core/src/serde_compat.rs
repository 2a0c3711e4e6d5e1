//! JSON wire format for profile export and import.
//!
//! The wire format uses camelCase field names and a version envelope. Import
//! re-applies the profile invariants (dial clamps, somatic intensity range,
//! disjoint outcome lists) so a hand-edited file cannot smuggle in bad state.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::Error as _;
use serde::{Deserialize, Serialize};

use crate::constants::DIAL_MAX;
use crate::profile::{
    AdaptivePatterns, Baseline, CommunicationStyle, Consent, DataRetention, Frequency,
    InterventionRecord, MetaLearning, RelationshipDepth, SomaticPattern, UserProfile,
};
use crate::state::NervousState;
use crate::time::now_iso8601;

pub const CURRENT_VERSION: &str = "1";

// --- Wire format types ---

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WireExport {
    pub version: String,
    #[serde(default)]
    pub exported_at: String,
    pub profile: WireProfile,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WireProfile {
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub relationship_start: u64,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub last_seen: u64,
    #[serde(default)]
    pub baseline: WireBaseline,
    #[serde(default)]
    pub somatic_patterns: Vec<WireSomaticPattern>,
    #[serde(default)]
    pub meta_learning: WireMetaLearning,
    #[serde(default)]
    pub adaptive_patterns: WireAdaptivePatterns,
    #[serde(default)]
    pub consent: WireConsent,
    #[serde(default)]
    pub communication_style: Option<WireCommunicationStyle>,
    #[serde(default)]
    pub relationship_depth: Option<WireRelationshipDepth>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct WireBaseline {
    pub baseline_state: Option<NervousState>,
    pub state_counts: BTreeMap<NervousState, u32>,
    pub stress_signals: Vec<String>,
    pub safety_signals: Vec<String>,
    pub trigger_patterns: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WireSomaticPattern {
    pub pattern: String,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub successful_interventions: Vec<String>,
    #[serde(default)]
    pub occurrences: u32,
    #[serde(default)]
    pub last_occurrence: u64,
    #[serde(default = "default_somatic_intensity")]
    pub intensity: u8,
}

fn default_somatic_intensity() -> u8 {
    3
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct WireMetaLearning {
    pub what_works: Vec<String>,
    pub what_doesnt: Vec<String>,
    pub intervention_history: Vec<WireIntervention>,
    pub learning_rate: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WireIntervention {
    pub intervention: String,
    pub worked: bool,
    #[serde(default)]
    pub timestamp: u64,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct WireAdaptivePatterns {
    pub people_pleasing: bool,
    pub boundary_struggles: bool,
    pub overwhelm_prone: bool,
    pub dismissal_defense: bool,
    pub decision_avoidance: bool,
    pub design_thinker: bool,
    pub body_aware: bool,
    pub boundary_builder: bool,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct WireConsent {
    pub mic_input: bool,
    pub voice_output: bool,
    pub data_retention: DataRetention,
    pub biometric_sharing: bool,
    pub decode_mode: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct WireCommunicationStyle {
    pub directness: u8,
    pub warmth: u8,
    pub playfulness: u8,
    pub depth: u8,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct WireRelationshipDepth {
    pub trust: u8,
    pub familiarity: u8,
    pub attunement: u8,
}

// --- Conversion ---

fn clamp_dial(v: u8) -> u8 {
    v.min(DIAL_MAX)
}

fn dedup_ordered(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

impl WireProfile {
    pub fn into_profile(self) -> UserProfile {
        let defaults = UserProfile::new_at(&self.user_id, self.relationship_start);

        let somatic_patterns = self
            .somatic_patterns
            .into_iter()
            .map(|w| {
                let pattern = SomaticPattern {
                    pattern: w.pattern.clone(),
                    triggers: w.triggers.into_iter().collect(),
                    successful_interventions: w.successful_interventions.into_iter().collect(),
                    frequency: Frequency::from_occurrences(w.occurrences),
                    occurrences: w.occurrences,
                    last_occurrence: w.last_occurrence,
                    intensity: w.intensity.clamp(1, 5),
                };
                (w.pattern, pattern)
            })
            .collect();

        let what_works = dedup_ordered(self.meta_learning.what_works);
        let what_doesnt: Vec<String> = dedup_ordered(self.meta_learning.what_doesnt)
            .into_iter()
            .filter(|x| !what_works.contains(x))
            .collect();
        let meta_learning = MetaLearning {
            what_works,
            what_doesnt,
            intervention_history: self
                .meta_learning
                .intervention_history
                .into_iter()
                .map(|w| InterventionRecord {
                    intervention: w.intervention,
                    worked: w.worked,
                    timestamp: w.timestamp,
                })
                .collect(),
            learning_rate: self
                .meta_learning
                .learning_rate
                .unwrap_or(1.0)
                .clamp(0.0, 1.0),
        };

        let a = self.adaptive_patterns;
        let c = self.consent;

        UserProfile {
            name: self.name,
            timezone: self.timezone.unwrap_or(defaults.timezone.clone()),
            last_seen: self.last_seen.max(self.relationship_start),
            baseline: Baseline {
                baseline_state: self.baseline.baseline_state.unwrap_or(NervousState::Ventral),
                state_counts: self.baseline.state_counts,
                stress_signals: self.baseline.stress_signals.into_iter().collect(),
                safety_signals: self.baseline.safety_signals.into_iter().collect(),
                trigger_patterns: self.baseline.trigger_patterns.into_iter().collect(),
            },
            somatic_patterns,
            meta_learning,
            adaptive_patterns: AdaptivePatterns {
                people_pleasing: a.people_pleasing,
                boundary_struggles: a.boundary_struggles,
                overwhelm_prone: a.overwhelm_prone,
                dismissal_defense: a.dismissal_defense,
                decision_avoidance: a.decision_avoidance,
                design_thinker: a.design_thinker,
                body_aware: a.body_aware,
                boundary_builder: a.boundary_builder,
            },
            consent: Consent {
                mic_input: c.mic_input,
                voice_output: c.voice_output,
                data_retention: c.data_retention,
                biometric_sharing: c.biometric_sharing,
                decode_mode: c.decode_mode,
            },
            communication_style: self
                .communication_style
                .map(|s| CommunicationStyle {
                    directness: clamp_dial(s.directness),
                    warmth: clamp_dial(s.warmth),
                    playfulness: clamp_dial(s.playfulness),
                    depth: clamp_dial(s.depth),
                })
                .unwrap_or(defaults.communication_style),
            relationship_depth: self
                .relationship_depth
                .map(|d| RelationshipDepth {
                    trust: clamp_dial(d.trust),
                    familiarity: clamp_dial(d.familiarity),
                    attunement: clamp_dial(d.attunement),
                })
                .unwrap_or(defaults.relationship_depth),
            ..defaults
        }
    }

    pub fn from_profile(p: &UserProfile) -> Self {
        let set_to_vec = |s: &BTreeSet<String>| s.iter().cloned().collect::<Vec<_>>();
        let a = &p.adaptive_patterns;
        let c = &p.consent;

        WireProfile {
            user_id: p.user_id.clone(),
            name: p.name.clone(),
            relationship_start: p.relationship_start,
            timezone: Some(p.timezone.clone()),
            last_seen: p.last_seen,
            baseline: WireBaseline {
                baseline_state: Some(p.baseline.baseline_state),
                state_counts: p.baseline.state_counts.clone(),
                stress_signals: set_to_vec(&p.baseline.stress_signals),
                safety_signals: set_to_vec(&p.baseline.safety_signals),
                trigger_patterns: set_to_vec(&p.baseline.trigger_patterns),
            },
            somatic_patterns: p
                .somatic_patterns
                .values()
                .map(|sp| WireSomaticPattern {
                    pattern: sp.pattern.clone(),
                    triggers: set_to_vec(&sp.triggers),
                    successful_interventions: set_to_vec(&sp.successful_interventions),
                    occurrences: sp.occurrences,
                    last_occurrence: sp.last_occurrence,
                    intensity: sp.intensity,
                })
                .collect(),
            meta_learning: WireMetaLearning {
                what_works: p.meta_learning.what_works.clone(),
                what_doesnt: p.meta_learning.what_doesnt.clone(),
                intervention_history: p
                    .meta_learning
                    .intervention_history
                    .iter()
                    .map(|r| WireIntervention {
                        intervention: r.intervention.clone(),
                        worked: r.worked,
                        timestamp: r.timestamp,
                    })
                    .collect(),
                learning_rate: Some(p.meta_learning.learning_rate),
            },
            adaptive_patterns: WireAdaptivePatterns {
                people_pleasing: a.people_pleasing,
                boundary_struggles: a.boundary_struggles,
                overwhelm_prone: a.overwhelm_prone,
                dismissal_defense: a.dismissal_defense,
                decision_avoidance: a.decision_avoidance,
                design_thinker: a.design_thinker,
                body_aware: a.body_aware,
                boundary_builder: a.boundary_builder,
            },
            consent: WireConsent {
                mic_input: c.mic_input,
                voice_output: c.voice_output,
                data_retention: c.data_retention,
                biometric_sharing: c.biometric_sharing,
                decode_mode: c.decode_mode,
            },
            communication_style: Some(WireCommunicationStyle {
                directness: p.communication_style.directness,
                warmth: p.communication_style.warmth,
                playfulness: p.communication_style.playfulness,
                depth: p.communication_style.depth,
            }),
            relationship_depth: Some(WireRelationshipDepth {
                trust: p.relationship_depth.trust,
                familiarity: p.relationship_depth.familiarity,
                attunement: p.relationship_depth.attunement,
            }),
        }
    }
}

/// Import a profile from the JSON wire format.
pub fn import_profile_json(json: &str) -> Result<UserProfile, serde_json::Error> {
    let wire: WireExport = serde_json::from_str(json)?;
    if wire.version != CURRENT_VERSION {
        return Err(serde_json::Error::custom(format!(
            "unsupported profile export version '{}' (expected '{CURRENT_VERSION}')",
            wire.version
        )));
    }
    if wire.profile.user_id.trim().is_empty() {
        return Err(serde_json::Error::custom("profile export has an empty userId"));
    }
    Ok(wire.profile.into_profile())
}

/// Export a profile to the JSON wire format.
pub fn export_profile_json(profile: &UserProfile) -> Result<String, serde_json::Error> {
    let wire = WireExport {
        version: CURRENT_VERSION.to_string(),
        exported_at: now_iso8601(),
        profile: WireProfile::from_profile(profile),
    };
    serde_json::to_string_pretty(&wire)
}
