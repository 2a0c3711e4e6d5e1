use serde::{Deserialize, Serialize};

use crate::profile::Consent;

/// Optional per-turn signals supplied by the caller alongside the message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnContext {
    /// Self-reported energy, 0 (empty) to 10 (full).
    #[serde(default)]
    pub energy: Option<u8>,
    #[serde(default)]
    pub biometrics: Option<Biometrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Biometrics {
    #[serde(default)]
    pub heart_rate_bpm: Option<u16>,
    #[serde(default)]
    pub hrv_ms: Option<u16>,
}

impl TurnContext {
    pub fn is_empty(&self) -> bool {
        self.energy.is_none() && self.biometrics.is_none()
    }

    /// Prompt-ready lines for this context. Biometric readings are dropped
    /// unless the user has consented to sharing them.
    pub fn describe(&self, consent: &Consent) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(energy) = self.energy {
            lines.push(format!("Self-reported energy: {}/10", energy.min(10)));
        }
        if let Some(bio) = &self.biometrics {
            if consent.biometric_sharing {
                if let Some(hr) = bio.heart_rate_bpm {
                    lines.push(format!("Heart rate: {hr} bpm"));
                }
                if let Some(hrv) = bio.hrv_ms {
                    lines.push(format!("Heart-rate variability: {hrv} ms"));
                }
            }
        }
        lines
    }
}
