//! Integration tests exercising the full turn pipeline:
//! detect → crisis gate → state → route → prompt → learn, plus profile export.

use attune_core::{
    CRISIS_RESOURCES, CodeKind, ConversationMessage, CrisisCategory, DominantEmotion, Mode,
    NervousState, PreviousOffer, Prompt, PromptContext, RelationshipDimension, StyleDial,
    TurnContext, TurnObservation, UserProfile, build_prompt, classify_crisis, compute_state_at,
    detect_codes, export_profile_json, fallback_response, import_profile_json, learn_from_turn,
    select_mode,
};
use proptest::prelude::*;

struct Turn {
    codes: Vec<CodeKind>,
    verdict_category: CrisisCategory,
    severity: u8,
    primary: NervousState,
    emotion: DominantEmotion,
    mode: Mode,
    prompt: Prompt,
}

fn run_turn(message: &str, history: &[ConversationMessage], profile: &UserProfile) -> Turn {
    let codes = detect_codes(message);
    let verdict = classify_crisis(message);
    let state = if verdict.is_crisis {
        attune_core::QuantumEmotionalState::crisis(&verdict)
    } else {
        compute_state_at(&codes, history, 1_000)
    };
    let mode = select_mode(message, &verdict, &state, profile);
    let turn = TurnContext::default();
    let ctx = PromptContext {
        message,
        history,
        state: &state,
        codes: &codes,
        profile,
        turn: &turn,
        now: 1_000,
    };
    Turn {
        codes: codes.iter().map(|c| c.code).collect(),
        verdict_category: verdict.category,
        severity: verdict.severity,
        primary: state.primary_state,
        emotion: state.dominant_emotion,
        mode,
        prompt: build_prompt(mode, &ctx),
    }
}

/// Overwhelm plus a boundary violation lands in companion mode with the
/// profile's known interventions in the prompt.
#[test]
fn drowning_in_favors_routes_to_companion() {
    let mut profile = UserProfile::new_at("u1", 0);
    profile.meta_learning.what_works.push("feet on the floor".into());

    let turn = run_turn(
        "I can't say no to one more favor, I feel like I'm drowning",
        &[],
        &profile,
    );

    assert_eq!(turn.codes, vec![CodeKind::Overwhelm, CodeKind::BoundaryViolation]);
    assert_eq!(turn.verdict_category, CrisisCategory::None);
    assert_eq!(turn.primary, NervousState::Sympathetic);
    assert_eq!(turn.emotion, DominantEmotion::Overwhelmed);
    assert_eq!(turn.mode, Mode::Companion);
    assert!(turn.prompt.text.contains("feet on the floor"));
    assert!(turn.prompt.text.contains("OVERWHELM"));
    assert!(turn.prompt.text.contains("BOUNDARY_VIOLATION"));
}

#[test]
fn suicidal_message_yields_fixed_payload() {
    let profile = UserProfile::new_at("u1", 0);
    let turn = run_turn("I want to end it, there's no point anymore", &[], &profile);

    assert_eq!(turn.verdict_category, CrisisCategory::Suicidal);
    assert_eq!(turn.severity, 95);
    assert_eq!(turn.mode, Mode::Crisis);
    assert_eq!(turn.prompt.text, CRISIS_RESOURCES);
    assert!(!turn.prompt.needs_model());
}

#[test]
fn resume_question_routes_to_real_talk_without_somatic_invitation() {
    let mut profile = UserProfile::new_at("u1", 0);
    profile.record_somatic_pattern("tight chest", "deadlines", None, 0);

    let turn = run_turn("Should I send this resume or rewrite the summary?", &[], &profile);

    assert_eq!(turn.mode, Mode::RealTalk);
    let text = turn.prompt.text.to_lowercase();
    assert!(!text.contains("embodied"));
    assert!(!text.contains("somatic"));
    assert!(!text.contains("tight chest"));
}

#[test]
fn decode_never_without_consent() {
    let mut profile = UserProfile::new_at("u1", 0);
    for message in [
        "why do I always do this",
        "decode this",
        "what's the pattern here",
        "how did I get here",
    ] {
        assert_ne!(run_turn(message, &[], &profile).mode, Mode::Decode, "{message}");
    }

    profile.consent.decode_mode = true;
    assert_eq!(run_turn("why do I always do this", &[], &profile).mode, Mode::Decode);
}

/// A short conversation: learning accumulates across turns and the
/// companion prompt reflects it.
#[test]
fn multi_turn_learning_feeds_the_next_prompt() {
    let mut profile = UserProfile::new_at("u1", 0);
    let mut history: Vec<ConversationMessage> = Vec::new();
    let mut previous = PreviousOffer::default();

    let script = [
        "my chest is tight and I'm so anxious",
        "that helped, thanks",
        "still anxious though",
    ];

    for (i, message) in script.iter().enumerate() {
        let now = 1_000 + i as u64;
        let codes = detect_codes(message);
        let verdict = classify_crisis(message);
        let state = compute_state_at(&codes, &history, now);
        let mode = select_mode(message, &verdict, &state, &profile);
        let reply = fallback_response(mode, &codes, &state);

        learn_from_turn(
            &mut profile,
            &TurnObservation {
                message,
                mode,
                codes: &codes,
                state: &state,
                previous: &previous,
                now,
            },
        );

        previous = PreviousOffer {
            suggestion: attune_core::suggestions(&state, &codes).into_iter().next(),
            somatic_pattern: codes
                .iter()
                .find(|c| c.code.is_somatic())
                .map(|c| c.code.label().to_string()),
        };
        history.push(ConversationMessage::at(attune_core::Role::User, message, now));
        history.push(ConversationMessage::at(attune_core::Role::Assistant, &reply, now));
    }

    assert_eq!(profile.relationship_depth.familiarity, 3);
    assert_eq!(
        profile.meta_learning.what_works,
        vec!["Breathe out slower than you breathe in, five times"]
    );
    assert_eq!(profile.relationship_depth.trust, 21);
    assert!(
        profile.somatic_patterns["nervous-system activation"]
            .successful_interventions
            .contains("Breathe out slower than you breathe in, five times")
    );

    let turn = run_turn("anxious again", &history, &profile);
    assert_eq!(turn.mode, Mode::Companion);
    assert!(turn.prompt.text.contains("Breathe out slower"));
    assert!(turn.prompt.text.contains("nervous-system activation"));
}

#[test]
fn profile_survives_export_import() {
    let mut profile = UserProfile::new_at("u1", 0);
    profile.record_somatic_pattern("jaw", "meetings", Some("stretch"), 5);
    profile.deepen_relationship(RelationshipDimension::Trust);
    profile.nudge_style(StyleDial::Depth);

    let json = export_profile_json(&profile).unwrap();
    let restored = import_profile_json(&json).unwrap();
    assert_eq!(restored, profile);
}

const FILLER_WORDS: &[&str] = &[
    "the", "coffee", "blue", "tuesday", "window", "and", "later", "maybe", "garden", "quietly",
];

fn filler() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(FILLER_WORDS), 0..12).prop_map(|w| w.join(" "))
}

proptest! {
    /// Appending unrelated words never removes a detected code.
    #[test]
    fn filler_never_removes_codes(
        base in prop::sample::select(vec![
            "I can't say no to one more favor, I feel like I'm drowning",
            "my jaw is tense and I'm anxious",
            "it's fine, I'm just overwhelmed",
            "I keep putting it off",
            "I said no and protected my time",
        ]),
        before in filler(),
        after in filler(),
    ) {
        let base_codes: Vec<CodeKind> = detect_codes(base).iter().map(|c| c.code).collect();
        let padded = format!("{before} {base} {after}");
        let padded_codes: Vec<CodeKind> = detect_codes(&padded).iter().map(|c| c.code).collect();
        for code in base_codes {
            prop_assert!(padded_codes.contains(&code), "{code} lost in {padded:?}");
        }
    }

    /// No sequence of increments escapes [0, 100].
    #[test]
    fn dials_stay_in_range(steps in prop::collection::vec(0u8..7, 0..400)) {
        let mut p = UserProfile::new_at("u", 0);
        for s in steps {
            match s {
                0 => p.deepen_relationship(RelationshipDimension::Trust),
                1 => p.deepen_relationship(RelationshipDimension::Familiarity),
                2 => p.deepen_relationship(RelationshipDimension::Attunement),
                3 => p.nudge_style(StyleDial::Directness),
                4 => p.nudge_style(StyleDial::Warmth),
                5 => p.nudge_style(StyleDial::Playfulness),
                _ => p.nudge_style(StyleDial::Depth),
            }
        }
        let d = p.relationship_depth;
        let s = p.communication_style;
        for v in [d.trust, d.familiarity, d.attunement, s.directness, s.warmth, s.playfulness, s.depth] {
            prop_assert!(v <= 100);
        }
    }

    /// Upserting the same somatic observation twice never grows its sets.
    #[test]
    fn somatic_upsert_is_idempotent(pattern in "[a-z]{1,12}", trigger in "[a-z ]{1,20}") {
        let mut p = UserProfile::new_at("u", 0);
        p.record_somatic_pattern(&pattern, &trigger, Some("walk"), 1);
        let once = p.somatic_patterns[&pattern].clone();
        p.record_somatic_pattern(&pattern, &trigger, Some("walk"), 1);
        let twice = &p.somatic_patterns[&pattern];
        prop_assert_eq!(once.triggers.len(), twice.triggers.len());
        prop_assert_eq!(once.successful_interventions.len(), twice.successful_interventions.len());
    }
}
