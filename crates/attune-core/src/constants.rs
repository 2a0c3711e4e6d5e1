/// Mean code intensity above which the detector reports a crisis-level load.
/// Soft signal only; the crisis classifier is the gate.
pub const CRISIS_LEVEL_MEAN: f64 = 85.0;

/// Mean intensity above which activation reads as overwhelm.
pub const OVERWHELM_MEAN: f64 = 80.0;

/// Mean intensity above which an otherwise unremarkable turn reads as engaged.
pub const ENGAGED_MEAN: f64 = 50.0;

/// Number of prior user messages re-scored when computing state.
pub const HISTORY_WINDOW: usize = 5;

/// Weight of the current turn when blending with recent history.
pub const CURRENT_TURN_WEIGHT: f64 = 0.7;

/// Maximum secondary states carried alongside the primary.
pub const MAX_BLENDED_STATES: usize = 2;

/// History turns interpolated into the companion prompt.
pub const COMPANION_HISTORY_TURNS: usize = 10;

/// Fixed increment applied to relationship and style dials.
pub const DIAL_STEP: u8 = 1;

/// Upper bound for every profile dial.
pub const DIAL_MAX: u8 = 100;

/// Seconds in one day.
pub const DAY_SECS: u64 = 86_400;

/// Dormancy period after which relationship dials start to decay (30 days).
pub const DORMANCY_PERIOD_SECS: u64 = 30 * DAY_SECS;

/// Floor for the meta-learning rate.
pub const MIN_LEARNING_RATE: f64 = 0.1;

/// Maximum suggestions returned with a response.
pub const MAX_SUGGESTIONS: usize = 3;
