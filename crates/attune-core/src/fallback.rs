//! Local responses used when no model is reachable, plus the short
//! suggestion list returned with every turn.

use crate::codes::{AdaptiveCode, CodeKind};
use crate::constants::MAX_SUGGESTIONS;
use crate::crisis::{CRISIS_RESOURCES, CRISIS_STEPS};
use crate::router::Mode;
use crate::state::{DominantEmotion, QuantumEmotionalState};

fn code_suggestion(code: CodeKind) -> &'static str {
    match code {
        CodeKind::Overwhelm => "Pick one thing you can set down today",
        CodeKind::PeoplePleasing => "Before answering, check what you actually want",
        CodeKind::BoundaryViolation => "Draft one short, kind no you could say",
        CodeKind::DismissalDefense => "Name one need you've been waving off",
        CodeKind::DesignThinking => "Sketch the roughest version first",
        CodeKind::DecisionAvoidance => "Make the smallest next decision, not the whole one",
        CodeKind::NervousSystemActivation => "Breathe out slower than you breathe in, five times",
        CodeKind::SomaticAwareness => "Rest a hand where you feel it and just notice",
        CodeKind::BoundarySetting => "Notice how holding that boundary feels in your body",
    }
}

fn emotion_suggestions(emotion: DominantEmotion) -> &'static [&'static str] {
    match emotion {
        DominantEmotion::Grounded => &["Keep doing what's working", "Take a moment to enjoy this"],
        DominantEmotion::Engaged => &["Put your focus on one thread", "Take a short break in an hour"],
        DominantEmotion::Activated => &["Drop your shoulders and unclench your jaw", "Take a two-minute walk"],
        DominantEmotion::Overwhelmed => &["Press your feet into the floor", "Write down the three loudest things"],
        DominantEmotion::Shutdown => &["Get a glass of water", "Wrap yourself in something warm"],
        DominantEmotion::Crisis => &CRISIS_STEPS,
    }
}

/// Up to three short suggestions: code-specific first, then state-based.
pub fn suggestions(state: &QuantumEmotionalState, codes: &[AdaptiveCode]) -> Vec<String> {
    if state.dominant_emotion == DominantEmotion::Crisis {
        return CRISIS_STEPS.iter().map(|s| s.to_string()).collect();
    }

    let mut out: Vec<String> = Vec::with_capacity(MAX_SUGGESTIONS);
    let candidates = codes
        .iter()
        .map(|c| code_suggestion(c.code))
        .chain(emotion_suggestions(state.dominant_emotion).iter().copied());
    for s in candidates {
        if out.len() == MAX_SUGGESTIONS {
            break;
        }
        if !out.iter().any(|x| x == s) {
            out.push(s.to_string());
        }
    }
    out
}

fn opening(emotion: DominantEmotion) -> &'static str {
    match emotion {
        DominantEmotion::Grounded => "It sounds like you're on fairly steady ground right now.",
        DominantEmotion::Engaged => "You sound switched on and in the middle of things.",
        DominantEmotion::Activated => "It sounds like your system is revved up right now.",
        DominantEmotion::Overwhelmed => "That sounds like a lot landing on you at once.",
        DominantEmotion::Shutdown => "It sounds like part of you has gone quiet to get through this.",
        DominantEmotion::Crisis => "I'm here with you.",
    }
}

/// Template reply built from the already-computed codes and state.
///
/// Deterministic; used when every provider has failed or timed out.
pub fn fallback_response(mode: Mode, codes: &[AdaptiveCode], state: &QuantumEmotionalState) -> String {
    if mode == Mode::Crisis {
        return CRISIS_RESOURCES.to_string();
    }

    let named = codes.first().map(|c| c.code.label());
    let suggestion = suggestions(state, codes)
        .into_iter()
        .next()
        .unwrap_or_else(|| "Take one slow breath before the next thing".to_string());

    match mode {
        Mode::RealTalk => {
            let mut reply = String::from(
                "I can't give you my full take right now, but here's the short version: \
                 go with the option you'd be comfortable defending tomorrow, and keep it simple.",
            );
            if let Some(label) = named {
                reply.push_str(&format!(" I'm also hearing a bit of {label} in there, so watch for that."));
            }
            reply
        }
        Mode::Decode => {
            let pattern = named.unwrap_or("this pattern");
            format!(
                "{} What you're describing looks like {pattern}. Patterns like this usually \
                 started as protection, something that once kept you safe or connected. \
                 It's worth asking what it's protecting now, and what it's costing you. \
                 We can unpack it more together in a moment.",
                opening(state.dominant_emotion)
            )
        }
        Mode::Companion | Mode::Crisis => {
            let mut reply = opening(state.dominant_emotion).to_string();
            if let Some(label) = named {
                reply.push_str(&format!(
                    " I'm noticing some {label} in what you wrote, and that makes sense given what you're carrying."
                ));
            }
            reply.push_str(&format!(
                "\n\nYou don't have to solve all of it right now. One small thing: {}.",
                suggestion.to_lowercase()
            ));
            reply
        }
    }
}
