//! Per-mode prompt synthesis.
//!
//! Each [`Mode`] maps to exactly one synthesizer through [`synthesizer`].
//! Every section a synthesizer emits is always present; empty profile data
//! is rendered as a "still learning" placeholder so the prompt shape stays
//! stable turn to turn.

use crate::codes::AdaptiveCode;
use crate::constants::COMPANION_HISTORY_TURNS;
use crate::context::TurnContext;
use crate::crisis::CRISIS_RESOURCES;
use crate::history::{ConversationMessage, tail};
use crate::profile::UserProfile;
use crate::router::Mode;
use crate::state::QuantumEmotionalState;
use crate::time::describe_span;

/// Turns of history shown to the real-talk persona.
const REAL_TALK_HISTORY_TURNS: usize = 4;

pub const STILL_LEARNING: &str = "Still learning";

/// Everything a synthesizer may read. Borrowed for the duration of one turn.
pub struct PromptContext<'a> {
    pub message: &'a str,
    /// Turns before the current message.
    pub history: &'a [ConversationMessage],
    pub state: &'a QuantumEmotionalState,
    pub codes: &'a [AdaptiveCode],
    pub profile: &'a UserProfile,
    pub turn: &'a TurnContext,
    pub now: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub mode: Mode,
    pub text: String,
}

impl Prompt {
    /// Crisis prompts are delivered as-is; every other mode goes to the model.
    pub fn needs_model(&self) -> bool {
        self.mode != Mode::Crisis
    }
}

pub type Synthesizer = fn(&PromptContext<'_>) -> String;

pub fn synthesizer(mode: Mode) -> Synthesizer {
    match mode {
        Mode::Crisis => crisis_prompt,
        Mode::Decode => decode_prompt,
        Mode::RealTalk => real_talk_prompt,
        Mode::Companion => companion_prompt,
    }
}

pub fn build_prompt(mode: Mode, ctx: &PromptContext<'_>) -> Prompt {
    Prompt {
        mode,
        text: synthesizer(mode)(ctx),
    }
}

fn crisis_prompt(_ctx: &PromptContext<'_>) -> String {
    CRISIS_RESOURCES.to_string()
}

fn decode_prompt(ctx: &PromptContext<'_>) -> String {
    let mut lines = vec![
        "You help someone understand one of their own patterns. You are curious, \
         warm and precise. You explain; you do not fix."
            .to_string(),
    ];

    section(&mut lines, "Candidate pattern");
    lines.push(match ctx.codes.first() {
        Some(code) => format!(
            "{} (triggered by: {})",
            code.code.label(),
            quoted(&code.trigger_keywords)
        ),
        None => "No named pattern detected. Find the one in their words.".to_string(),
    });

    section(&mut lines, "Current state");
    lines.push(ctx.state.describe());

    section(&mut lines, "Active codes");
    lines.extend(code_lines(ctx.codes));

    section(&mut lines, "Decode framework");
    lines.push(
        "Walk through these six steps in order:\n\
         1. Name the pattern in plain language.\n\
         2. Purpose: what is it trying to do for them?\n\
         3. Origins: where might they have learned it?\n\
         4. Body memory: where does it live in the body when it fires?\n\
         5. Adaptive value: how did it once protect them?\n\
         6. Cost: what does it cost them now?"
            .to_string(),
    );

    section(&mut lines, "What has helped before");
    lines.extend(list_lines(&ctx.profile.meta_learning.what_works));

    push_turn_context(&mut lines, ctx);

    section(&mut lines, "How to respond");
    lines.push(
        "Offer compassionate pattern analysis, not advice. No action items, no \
         diagnoses. Speak to them directly and end with one question that invites \
         them to check the analysis against their own experience."
            .to_string(),
    );

    section(&mut lines, "Their message");
    lines.push(ctx.message.to_string());
    lines.join("\n")
}

fn real_talk_prompt(ctx: &PromptContext<'_>) -> String {
    let style = &ctx.profile.communication_style;
    let mut lines = vec![
        "You are a sharp, friendly peer. Talk casually and directly, like a smart \
         friend who happens to know the topic. No therapy language, no clinical \
         framing, no lectures. Give a clear opinion when asked for one."
            .to_string(),
        format!(
            "Directness preference: {}/100. Playfulness: {}/100.",
            style.directness, style.playfulness
        ),
    ];

    section(&mut lines, "Recent conversation");
    lines.extend(history_lines(tail(ctx.history, REAL_TALK_HISTORY_TURNS)));

    section(&mut lines, "Escalation");
    lines.push(
        "If anything they say starts to sound like crisis, panic, self-harm or \
         shutting down, stop the casual register. Say what you noticed and offer to \
         switch into support mode before going on."
            .to_string(),
    );

    section(&mut lines, "Their message");
    lines.push(ctx.message.to_string());
    lines.join("\n")
}

fn companion_prompt(ctx: &PromptContext<'_>) -> String {
    let profile = ctx.profile;
    let who = profile.name.as_deref().unwrap_or("this person");
    let mut lines = vec![format!(
        "You are a steady, attuned companion for {who}. You know them over time. \
         Speak like a person, not a clinician."
    )];

    section(&mut lines, "Current state");
    lines.push(ctx.state.describe());
    lines.push(format!(
        "Likely felt in: {}",
        ctx.state.body_signal_names().join(", ")
    ));

    section(&mut lines, "Detected patterns");
    lines.extend(code_lines(ctx.codes));

    section(&mut lines, "Relationship");
    let depth = &profile.relationship_depth;
    lines.push(format!(
        "Known for {}. Trust {}/100, familiarity {}/100, attunement {}/100.",
        describe_span(ctx.now.saturating_sub(profile.relationship_start)),
        depth.trust,
        depth.familiarity,
        depth.attunement
    ));
    lines.push(format!("Usual baseline: {}.", profile.baseline.baseline_state));

    section(&mut lines, "Communication style");
    let style = &profile.communication_style;
    lines.push(format!(
        "Directness {}/100, warmth {}/100, playfulness {}/100, depth {}/100.",
        style.directness, style.warmth, style.playfulness, style.depth
    ));

    section(&mut lines, "Known dispositions");
    let dispositions: Vec<String> = profile
        .adaptive_patterns
        .active()
        .into_iter()
        .map(String::from)
        .collect();
    lines.extend(list_lines(&dispositions));

    section(&mut lines, "Somatic patterns");
    if profile.somatic_patterns.is_empty() {
        lines.push(format!("{STILL_LEARNING}: no somatic patterns recorded yet."));
    }
    for sp in profile.somatic_patterns.values() {
        let mut line = format!(
            "- {} ({}, intensity {}/5)",
            sp.pattern,
            sp.frequency.as_str(),
            sp.intensity
        );
        if !sp.triggers.is_empty() {
            let triggers: Vec<&str> = sp.triggers.iter().map(String::as_str).collect();
            line.push_str(&format!("; triggers: {}", triggers.join(", ")));
        }
        if !sp.successful_interventions.is_empty() {
            let helped: Vec<&str> = sp.successful_interventions.iter().map(String::as_str).collect();
            line.push_str(&format!("; eased by: {}", helped.join(", ")));
        }
        lines.push(line);
    }

    section(&mut lines, "What works");
    lines.extend(list_lines(&profile.meta_learning.what_works));

    section(&mut lines, "What doesn't work");
    lines.extend(list_lines(&profile.meta_learning.what_doesnt));

    section(&mut lines, "Consent boundaries");
    let consent = &profile.consent;
    lines.push(format!(
        "- Pattern decoding: {}",
        if consent.decode_mode {
            "allowed when they ask"
        } else {
            "not consented; do not analyze where their patterns come from"
        }
    ));
    lines.push(format!(
        "- Biometrics: {}",
        if consent.biometric_sharing { "shared" } else { "not shared; do not ask for readings" }
    ));
    lines.push(format!("- Memory: {}", consent.data_retention.as_str()));

    push_turn_context(&mut lines, ctx);

    section(&mut lines, "Recent conversation");
    lines.extend(history_lines(tail(ctx.history, COMPANION_HISTORY_TURNS)));

    section(&mut lines, "How to respond");
    lines.push(
        "Write a few short paragraphs. Reflect what you hear before offering anything. \
         Stay non-clinical: no diagnoses, no labels they did not use. Respect every \
         consent boundary above. Lean on what has worked for them and avoid what has not."
            .to_string(),
    );

    section(&mut lines, "Embodied suggestion");
    lines.push(
        "Close with exactly one embodied suggestion: a single small physical action \
         they can do right now, matched to where their body is holding this. Never \
         more than one."
            .to_string(),
    );

    section(&mut lines, "Their message");
    lines.push(ctx.message.to_string());
    lines.join("\n")
}

/// Blank line, then a `## title` heading.
fn section(lines: &mut Vec<String>, title: &str) {
    lines.push(String::new());
    lines.push(format!("## {title}"));
}

fn quoted(items: &[String]) -> String {
    items.iter().map(|k| format!("\"{k}\"")).collect::<Vec<_>>().join(", ")
}

fn list_lines(items: &[String]) -> Vec<String> {
    if items.is_empty() {
        return vec![format!("{STILL_LEARNING}: nothing recorded yet.")];
    }
    items.iter().map(|item| format!("- {item}")).collect()
}

fn code_lines(codes: &[AdaptiveCode]) -> Vec<String> {
    if codes.is_empty() {
        return vec!["None detected this turn.".to_string()];
    }
    codes
        .iter()
        .map(|c| {
            format!(
                "- {} [{}] intensity {}: {}",
                c.code.label(),
                c.code.as_str(),
                c.intensity,
                quoted(&c.trigger_keywords)
            )
        })
        .collect()
}

fn history_lines(turns: &[ConversationMessage]) -> Vec<String> {
    if turns.is_empty() {
        return vec![format!("{STILL_LEARNING}: this is the start of the conversation.")];
    }
    turns
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect()
}

fn push_turn_context(lines: &mut Vec<String>, ctx: &PromptContext<'_>) {
    let observed = ctx.turn.describe(&ctx.profile.consent);
    if observed.is_empty() {
        return;
    }
    section(lines, "Right now");
    lines.extend(observed.into_iter().map(|line| format!("- {line}")));
}
