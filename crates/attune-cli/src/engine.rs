//! Session engine: one full turn per call.
//!
//! Sessions live in an LRU cache with idle expiry. Each session has its own
//! async mutex held for the whole turn, and each user has one too, so two
//! sessions of the same user cannot interleave profile updates. Distinct
//! users never wait on each other except for brief map access.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use lru::LruCache;
use serde::Serialize;
use tokio::sync::Mutex;

use attune_core::time::{now_unix_secs, unix_to_iso8601};
use attune_core::{
    AdaptiveCode, CRISIS_RESOURCES, ConsentUpdate, ConversationMessage, CrisisCategory,
    CrisisVerdict, Mode, PreviousOffer, PromptContext, QuantumEmotionalState, Role, TurnContext, TurnObservation, UserProfile,
    VoiceStyle, build_prompt, classify_crisis, compute_state_at, detect_codes, fallback_response,
    learn_from_turn, select_mode, suggestions,
};
use attune_store::{ProfileRepository, PurgeReport};

use crate::config::Config;
use crate::gateway::{CompletionGateway, GatewayError};

/// Returned in place of a reply when a turn fails internally.
pub const RECALIBRATION_MESSAGE: &str =
    "I'm having a moment recalibrating on my end. Give me a second and say that again?";

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub session_capacity: NonZeroUsize,
    pub session_ttl: Duration,
    pub history_limit: usize,
    pub dormancy_decay: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            session_capacity: NonZeroUsize::new(256).unwrap_or(NonZeroUsize::MIN),
            session_ttl: Duration::from_secs(3600),
            history_limit: 50,
            dormancy_decay: true,
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            session_capacity: NonZeroUsize::new(config.sessions.capacity)
                .unwrap_or(NonZeroUsize::MIN),
            session_ttl: Duration::from_secs(config.sessions.ttl_secs),
            history_limit: config.engine.history_limit.max(2),
            dormancy_decay: config.engine.dormancy_decay,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedPatterns {
    pub codes: Vec<AdaptiveCode>,
    pub quantum_state_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crisis_category: Option<CrisisCategory>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub response_time_ms: u64,
    pub timestamp: String,
    pub session_id: String,
    pub user_id: String,
    /// True when the reply came from local templates instead of a model.
    pub fallback: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    pub success: bool,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_patterns: Option<DetectedPatterns>,
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_style: Option<VoiceStyle>,
    pub metadata: ResponseMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct Session {
    user_id: String,
    history: Vec<ConversationMessage>,
    previous: PreviousOffer,
}

struct SessionSlot {
    session: Arc<Mutex<Session>>,
    touched: Instant,
}

struct TurnOutcome {
    response: String,
    mode: Mode,
    codes: Vec<AdaptiveCode>,
    state: QuantumEmotionalState,
    crisis: Option<CrisisCategory>,
    suggestions: Vec<String>,
    voice_style: Option<VoiceStyle>,
    fallback: bool,
}

pub struct SessionEngine {
    gateway: Arc<dyn CompletionGateway>,
    repo: Mutex<Box<dyn ProfileRepository>>,
    sessions: Mutex<LruCache<String, SessionSlot>>,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Profiles of users whose retention is session-only. Never written to
    /// the repository, and bounded like the session cache.
    ephemeral_profiles: Mutex<LruCache<String, UserProfile>>,
    settings: EngineSettings,
}

impl SessionEngine {
    pub fn new(
        gateway: Arc<dyn CompletionGateway>,
        repo: Box<dyn ProfileRepository>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            gateway,
            repo: Mutex::new(repo),
            sessions: Mutex::new(LruCache::new(settings.session_capacity)),
            user_locks: Mutex::new(HashMap::new()),
            ephemeral_profiles: Mutex::new(LruCache::new(settings.session_capacity)),
            settings,
        }
    }

    /// Run one turn. Never fails: internal errors degrade to a
    /// recalibration reply with `success: false`, or to the crisis resources
    /// when the message itself is a crisis.
    pub async fn process_message(
        &self,
        session_id: &str,
        user_id: &str,
        message: &str,
        context: &TurnContext,
    ) -> TurnResponse {
        let started = Instant::now();
        let verdict = classify_crisis(message);
        let result = self
            .run_turn(session_id, user_id, message, context, &verdict)
            .await;
        let metadata = |fallback| ResponseMetadata {
            response_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            timestamp: unix_to_iso8601(now_unix_secs()),
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            fallback,
        };

        match result {
            Ok(turn) => TurnResponse {
                success: true,
                response: turn.response,
                mode: Some(turn.mode),
                detected_patterns: Some(DetectedPatterns {
                    codes: turn.codes,
                    quantum_state_description: turn.state.describe(),
                    crisis_category: turn.crisis,
                }),
                suggestions: turn.suggestions,
                voice_style: turn.voice_style,
                metadata: metadata(turn.fallback),
                error: None,
            },
            Err(e) if verdict.is_crisis => {
                tracing::error!(session_id, category = %verdict.category, error = %format!("{e:#}"), "crisis turn failed, sending resources");
                let state = QuantumEmotionalState::crisis(&verdict);
                let codes = detect_codes(message);
                TurnResponse {
                    success: false,
                    response: CRISIS_RESOURCES.to_string(),
                    mode: Some(Mode::Crisis),
                    suggestions: suggestions(&state, &codes),
                    detected_patterns: Some(DetectedPatterns {
                        codes,
                        quantum_state_description: state.describe(),
                        crisis_category: Some(verdict.category),
                    }),
                    voice_style: None,
                    metadata: metadata(false),
                    error: Some(format!("{e:#}")),
                }
            }
            Err(e) => {
                tracing::error!(session_id, error = %format!("{e:#}"), "turn failed, sending recalibration reply");
                TurnResponse {
                    success: false,
                    response: RECALIBRATION_MESSAGE.to_string(),
                    mode: None,
                    detected_patterns: None,
                    suggestions: Vec::new(),
                    voice_style: None,
                    metadata: metadata(false),
                    error: Some(format!("{e:#}")),
                }
            }
        }
    }

    async fn run_turn(
        &self,
        session_id: &str,
        user_id: &str,
        message: &str,
        context: &TurnContext,
        verdict: &CrisisVerdict,
    ) -> Result<TurnOutcome> {
        let slot = self.session(session_id, user_id).await?;
        let mut session = slot.lock().await;
        if session.user_id != user_id {
            anyhow::bail!("session {session_id} belongs to another user");
        }

        let user_lock = self.user_lock(user_id).await;
        let _user_guard = user_lock.lock().await;

        let now = now_unix_secs();
        let mut profile = self.load_profile(user_id, now).await;
        if self.settings.dormancy_decay {
            let periods = profile.apply_dormancy_decay(now);
            if periods > 0 {
                tracing::debug!(user_id, periods, "relationship dials decayed after dormancy");
            }
        }

        let codes = detect_codes(message);
        let state = if verdict.is_crisis {
            tracing::warn!(category = %verdict.category, severity = verdict.severity, "crisis verdict");
            QuantumEmotionalState::crisis(verdict)
        } else {
            compute_state_at(&codes, &session.history, now)
        };
        let mode = select_mode(message, verdict, &state, &profile);
        tracing::debug!(
            %mode,
            codes = ?codes.iter().map(|c| c.code.as_str()).collect::<Vec<_>>(),
            state = %state.describe(),
            "mode selected"
        );

        let prompt = build_prompt(
            mode,
            &PromptContext {
                message,
                history: &session.history,
                state: &state,
                codes: &codes,
                profile: &profile,
                turn: context,
                now,
            },
        );

        let (response, fallback) = if prompt.needs_model() {
            match self.gateway.complete(&prompt.text, message).await {
                Ok(text) => (text, false),
                Err(GatewayError::NoProviders) => (fallback_response(mode, &codes, &state), true),
                Err(e) => {
                    tracing::warn!(error = %e, "completion failed, using local fallback");
                    (fallback_response(mode, &codes, &state), true)
                }
            }
        } else {
            (prompt.text, false)
        };

        let turn_suggestions = suggestions(&state, &codes);
        let summary = learn_from_turn(
            &mut profile,
            &TurnObservation {
                message,
                mode,
                codes: &codes,
                state: &state,
                previous: &session.previous,
                now,
            },
        );
        if let Some(outcome) = summary.outcome {
            tracing::debug!(user_id, ?outcome, "recorded intervention outcome");
        }
        let previous = if mode == Mode::Crisis {
            PreviousOffer::default()
        } else {
            PreviousOffer {
                suggestion: turn_suggestions.first().cloned(),
                somatic_pattern: codes
                    .iter()
                    .find(|c| c.code.is_somatic())
                    .map(|c| c.code.label().to_string()),
            }
        };

        let turn_messages = [
            ConversationMessage::at(Role::User, message, now),
            ConversationMessage::at(Role::Assistant, &response, now),
        ];
        if let Err(e) = self.persist(session_id, &profile, &turn_messages, now).await {
            // Resources are still delivered; everything else aborts the turn.
            if mode != Mode::Crisis {
                return Err(e);
            }
            tracing::error!(user_id, error = %format!("{e:#}"), "crisis turn not persisted");
        }

        // The session only records turns whose reply is actually sent.
        session.history.extend(turn_messages);
        let overflow = session.history.len().saturating_sub(self.settings.history_limit);
        session.history.drain(..overflow);
        session.previous = previous;

        Ok(TurnOutcome {
            response,
            mode,
            crisis: verdict.is_crisis.then_some(verdict.category),
            voice_style: profile
                .consent
                .voice_output
                .then(|| state.dominant_emotion.voice_style()),
            codes,
            state,
            suggestions: turn_suggestions,
            fallback,
        })
    }

    /// Session handle for `session_id`, created (and its transcript
    /// reloaded) if absent or idle past the TTL. The map lock is not held
    /// while the transcript loads.
    async fn session(&self, session_id: &str, user_id: &str) -> Result<Arc<Mutex<Session>>> {
        if let Some(session) = self.live_session(&mut *self.sessions.lock().await, session_id) {
            return Ok(session);
        }

        let history = self
            .repo
            .lock()
            .await
            .load_session(session_id, user_id, self.settings.history_limit)
            .context("failed to load session transcript")?;

        let mut sessions = self.sessions.lock().await;
        // A concurrent first turn may have created it meanwhile.
        if let Some(session) = self.live_session(&mut sessions, session_id) {
            return Ok(session);
        }
        let session = Arc::new(Mutex::new(Session {
            user_id: user_id.to_string(),
            history,
            previous: PreviousOffer::default(),
        }));
        if let Some((evicted, _)) = sessions.push(
            session_id.to_string(),
            SessionSlot {
                session: Arc::clone(&session),
                touched: Instant::now(),
            },
        ) && evicted != session_id
        {
            tracing::debug!(session_id = %evicted, "evicted least recently used session");
        }
        Ok(session)
    }

    fn live_session(
        &self,
        sessions: &mut LruCache<String, SessionSlot>,
        session_id: &str,
    ) -> Option<Arc<Mutex<Session>>> {
        let slot = sessions.get_mut(session_id)?;
        if slot.touched.elapsed() > self.settings.session_ttl {
            tracing::debug!(session_id, "session expired");
            return None;
        }
        slot.touched = Instant::now();
        Some(Arc::clone(&slot.session))
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        if locks.len() > self.settings.session_capacity.get() * 4 {
            // Only drop locks nobody else holds a handle to.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(locks.entry(user_id.to_string()).or_default())
    }

    async fn load_profile(&self, user_id: &str, now: u64) -> UserProfile {
        if let Some(profile) = self.ephemeral_profiles.lock().await.get(user_id) {
            return profile.clone();
        }
        self.repo.lock().await.get_or_create(user_id, now)
    }

    async fn persist(
        &self,
        session_id: &str,
        profile: &UserProfile,
        messages: &[ConversationMessage],
        now: u64,
    ) -> Result<()> {
        let retention = profile.consent.data_retention;
        {
            let mut repo = self.repo.lock().await;
            repo.save_profile(profile, now)
                .context("failed to save profile")?;
            for m in messages {
                repo.append_message(session_id, &profile.user_id, m, retention)
                    .context("failed to append transcript")?;
            }
        }

        let mut ephemeral = self.ephemeral_profiles.lock().await;
        if retention.persists() {
            ephemeral.pop(&profile.user_id);
        } else if let Some((evicted, _)) = ephemeral.push(profile.user_id.clone(), profile.clone())
            && evicted != profile.user_id
        {
            tracing::debug!(user_id = %evicted, "dropped least recently used session-only profile");
        }
        Ok(())
    }

    /// Current profile for `user_id`, or the default a first turn would start from.
    pub async fn profile(&self, user_id: &str) -> UserProfile {
        self.load_profile(user_id, now_unix_secs()).await
    }

    /// Apply an explicit consent change and persist it under the new policy.
    pub async fn set_consent(&self, user_id: &str, update: &ConsentUpdate) -> Result<UserProfile> {
        let user_lock = self.user_lock(user_id).await;
        let _guard = user_lock.lock().await;

        let now = now_unix_secs();
        let mut profile = self.load_profile(user_id, now).await;
        profile.set_consent(update);
        tracing::info!(user_id, retention = %profile.consent.data_retention.as_str(), "consent updated");
        self.persist("", &profile, &[], now).await?;
        Ok(profile)
    }

    /// Replace the stored profile for `profile.user_id` with an imported one.
    pub async fn import_profile(&self, profile: UserProfile) -> Result<()> {
        let user_lock = self.user_lock(&profile.user_id).await;
        let _guard = user_lock.lock().await;
        self.persist("", &profile, &[], now_unix_secs()).await
    }

    /// Drop 30-day data older than the retention window.
    pub async fn purge(&self) -> Result<PurgeReport> {
        let report = self
            .repo
            .lock()
            .await
            .purge_expired(now_unix_secs())
            .context("purge failed")?;
        tracing::info!(profiles = report.profiles, messages = report.messages, "purged expired data");
        Ok(report)
    }

    /// Flush the repository's write-ahead log. Called on shutdown.
    pub async fn checkpoint(&self) {
        match self.repo.lock().await.checkpoint() {
            Ok(()) => tracing::info!("WAL checkpoint complete"),
            Err(e) => tracing::warn!("WAL checkpoint failed: {e}"),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::ScriptedGateway;
    use crate::gateway::FailoverGateway;
    use attune_core::{CRISIS_STEPS, DataRetention};
    use attune_store::{MemoryRepository, Store, StoreError};

    /// Reads find nothing, every write fails.
    struct ReadOnlyRepository;

    impl ProfileRepository for ReadOnlyRepository {
        fn load_profile(&self, _user_id: &str) -> attune_store::Result<Option<UserProfile>> {
            Ok(None)
        }

        fn save_profile(&mut self, _profile: &UserProfile, _now: u64) -> attune_store::Result<bool> {
            Err(StoreError::InvalidData("disk full".into()))
        }

        fn append_message(
            &mut self,
            _session_id: &str,
            _user_id: &str,
            _message: &ConversationMessage,
            _retention: DataRetention,
        ) -> attune_store::Result<bool> {
            Err(StoreError::InvalidData("disk full".into()))
        }

        fn load_session(
            &self,
            _session_id: &str,
            _user_id: &str,
            _limit: usize,
        ) -> attune_store::Result<Vec<ConversationMessage>> {
            Ok(Vec::new())
        }

        fn purge_expired(&mut self, _now: u64) -> attune_store::Result<PurgeReport> {
            Ok(PurgeReport::default())
        }
    }

    fn offline_engine(repo: Box<dyn ProfileRepository>, settings: EngineSettings) -> SessionEngine {
        SessionEngine::new(
            Arc::new(FailoverGateway::new(vec![], Duration::from_secs(1))),
            repo,
            settings,
        )
    }

    fn engine_with(providers: Vec<Arc<ScriptedGateway>>) -> SessionEngine {
        let gateway = FailoverGateway::new(
            providers
                .into_iter()
                .map(|p| p as Arc<dyn CompletionGateway>)
                .collect(),
            Duration::from_millis(200),
        );
        SessionEngine::new(
            Arc::new(gateway),
            Box::new(MemoryRepository::new()),
            EngineSettings::default(),
        )
    }

    fn no_context() -> TurnContext {
        TurnContext::default()
    }

    #[tokio::test]
    async fn test_companion_turn_uses_model() {
        let model = ScriptedGateway::ok("primary", "I hear you.");
        let engine = engine_with(vec![model.clone()]);

        let r = engine
            .process_message(
                "s1",
                "u1",
                "I can't say no to one more favor, I feel like I'm drowning",
                &no_context(),
            )
            .await;

        assert!(r.success);
        assert_eq!(r.response, "I hear you.");
        assert_eq!(r.mode, Some(Mode::Companion));
        let patterns = r.detected_patterns.unwrap();
        let kinds: Vec<&str> = patterns.codes.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(kinds, vec!["OVERWHELM", "BOUNDARY_VIOLATION"]);
        assert!(patterns.quantum_state_description.starts_with("sympathetic (overwhelmed)"));
        assert!(!r.suggestions.is_empty());
        assert!(!r.metadata.fallback);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_crisis_makes_no_gateway_call() {
        let model = ScriptedGateway::ok("primary", "should not be used");
        let engine = engine_with(vec![model.clone()]);

        let r = engine
            .process_message("s1", "u1", "I want to end it, there's no point anymore", &no_context())
            .await;

        assert!(r.success);
        assert_eq!(r.mode, Some(Mode::Crisis));
        assert_eq!(r.response, CRISIS_RESOURCES);
        assert_eq!(
            r.detected_patterns.unwrap().crisis_category,
            Some(CrisisCategory::Suicidal)
        );
        assert_eq!(r.suggestions.len(), 3);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_all_providers_failing_still_succeeds() {
        let primary = ScriptedGateway::failing("primary");
        let secondary = ScriptedGateway::slow("secondary", Duration::from_secs(30));
        let engine = engine_with(vec![primary.clone(), secondary.clone()]);

        let r = engine
            .process_message("s1", "u1", "I'm so anxious and my chest is tight", &no_context())
            .await;

        assert!(r.success);
        assert!(r.metadata.fallback);
        assert!(r.error.is_none());
        assert!(!r.response.is_empty());
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_real_talk_turn() {
        let engine = engine_with(vec![]);
        let r = engine
            .process_message(
                "s1",
                "u1",
                "Should I send this resume or rewrite the summary?",
                &no_context(),
            )
            .await;
        assert_eq!(r.mode, Some(Mode::RealTalk));
        assert!(r.metadata.fallback);
    }

    #[tokio::test]
    async fn test_profile_learns_across_turns() {
        let engine = engine_with(vec![ScriptedGateway::ok("p", "ok")]);
        engine
            .process_message("s1", "u1", "I'm so anxious", &no_context())
            .await;
        let r = engine
            .process_message("s1", "u1", "that helped", &no_context())
            .await;
        assert!(r.success);

        let profile = engine.profile("u1").await;
        assert_eq!(profile.relationship_depth.familiarity, 2);
        assert_eq!(
            profile.meta_learning.what_works,
            vec!["Breathe out slower than you breathe in, five times"]
        );
        assert!(profile.somatic_patterns.contains_key("nervous-system activation"));
    }

    #[tokio::test]
    async fn test_history_feeds_trend() {
        let engine = engine_with(vec![]);
        engine
            .process_message("s1", "u1", "hello", &no_context())
            .await;
        let r = engine
            .process_message("s1", "u1", "I'm anxious and overwhelmed", &no_context())
            .await;
        let desc = r.detected_patterns.unwrap().quantum_state_description;
        assert!(desc.ends_with("rising"), "{desc}");
    }

    #[tokio::test]
    async fn test_session_of_another_user_is_rejected() {
        let engine = engine_with(vec![]);
        engine.process_message("s1", "alice", "hi", &no_context()).await;
        let r = engine.process_message("s1", "mallory", "hi", &no_context()).await;
        assert!(!r.success);
        assert_eq!(r.response, RECALIBRATION_MESSAGE);
        assert!(r.error.unwrap().contains("another user"));
        assert!(r.mode.is_none());
    }

    #[tokio::test]
    async fn test_decode_requires_consent_end_to_end() {
        let engine = engine_with(vec![]);
        let msg = "why do I always say yes to everything";
        let r = engine.process_message("s1", "u1", msg, &no_context()).await;
        assert_eq!(r.mode, Some(Mode::Companion));

        engine
            .set_consent(
                "u1",
                &ConsentUpdate {
                    decode_mode: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let r = engine.process_message("s1", "u1", msg, &no_context()).await;
        assert_eq!(r.mode, Some(Mode::Decode));
    }

    #[tokio::test]
    async fn test_voice_style_only_with_consent() {
        let engine = engine_with(vec![]);
        let r = engine.process_message("s1", "u1", "hi", &no_context()).await;
        assert!(r.voice_style.is_none());

        engine
            .set_consent(
                "u1",
                &ConsentUpdate {
                    voice_output: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let r = engine.process_message("s1", "u1", "hi", &no_context()).await;
        assert_eq!(r.voice_style, Some(VoiceStyle::Warm));
    }

    #[tokio::test]
    async fn test_session_only_users_are_never_written() {
        let store = Store::open_in_memory().unwrap();
        let engine = offline_engine(Box::new(store), EngineSettings::default());
        engine
            .set_consent(
                "ghost",
                &ConsentUpdate {
                    data_retention: Some(DataRetention::SessionOnly),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        engine.process_message("s1", "ghost", "I'm anxious", &no_context()).await;

        // Learning still happens in memory.
        let p = engine.profile("ghost").await;
        assert_eq!(p.relationship_depth.familiarity, 1);
        assert_eq!(p.consent.data_retention, DataRetention::SessionOnly);

        let repo = engine.repo.lock().await;
        assert!(repo.load_profile("ghost").unwrap().is_none());
        assert!(repo.load_session("s1", "ghost", 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_session_reloads_transcript() {
        let mut settings = EngineSettings::default();
        settings.session_ttl = Duration::ZERO;
        let engine = offline_engine(Box::new(MemoryRepository::new()), settings);
        engine.process_message("s1", "u1", "hello", &no_context()).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        engine.process_message("s1", "u1", "again", &no_context()).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let session = engine.session("s1", "u1").await.unwrap();
        let history = &session.lock().await.history;
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "hello");
    }

    #[tokio::test]
    async fn test_lru_bounds_session_count() {
        let mut settings = EngineSettings::default();
        settings.session_capacity = NonZeroUsize::new(2).unwrap();
        let engine = offline_engine(Box::new(MemoryRepository::new()), settings);
        for s in ["a", "b", "c"] {
            engine.process_message(s, "u1", "hi", &no_context()).await;
        }
        assert_eq!(engine.session_count().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_sessions_of_one_user_keep_all_updates() {
        let engine = Arc::new(engine_with(vec![ScriptedGateway::ok("p", "ok")]));
        let mut handles = Vec::new();
        for i in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine
                    .process_message(&format!("s{i}"), "shared", "hello", &TurnContext::default())
                    .await
            }));
        }
        for h in handles {
            assert!(h.await.unwrap().success);
        }
        assert_eq!(engine.profile("shared").await.relationship_depth.familiarity, 8);
    }

    #[tokio::test]
    async fn test_crisis_survives_failed_write() {
        let engine = offline_engine(Box::new(ReadOnlyRepository), EngineSettings::default());
        let r = engine
            .process_message("s1", "u1", "I want to end it, there's no point anymore", &no_context())
            .await;

        assert_eq!(r.mode, Some(Mode::Crisis));
        assert!(r.response.contains("988"));
        assert_eq!(r.suggestions, CRISIS_STEPS.map(String::from).to_vec());
    }

    #[tokio::test]
    async fn test_crisis_in_foreign_session_still_gets_resources() {
        let engine = engine_with(vec![]);
        engine.process_message("s1", "alice", "hi", &no_context()).await;
        let r = engine
            .process_message("s1", "bob", "I want to kill myself", &no_context())
            .await;

        assert!(!r.success);
        assert!(r.error.unwrap().contains("another user"));
        assert_eq!(r.mode, Some(Mode::Crisis));
        assert!(r.response.contains("988"));
        assert_eq!(
            r.detected_patterns.unwrap().crisis_category,
            Some(CrisisCategory::Suicidal)
        );
        assert_eq!(r.suggestions.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_session_untouched() {
        let engine = offline_engine(Box::new(ReadOnlyRepository), EngineSettings::default());
        let r = engine.process_message("s1", "u1", "hello", &no_context()).await;
        assert!(!r.success);
        assert_eq!(r.response, RECALIBRATION_MESSAGE);

        let session = engine.session("s1", "u1").await.unwrap();
        let session = session.lock().await;
        assert!(session.history.is_empty());
        assert!(session.previous.suggestion.is_none());
    }

    #[tokio::test]
    async fn test_session_only_profiles_are_bounded() {
        let mut settings = EngineSettings::default();
        settings.session_capacity = NonZeroUsize::new(2).unwrap();
        let engine = offline_engine(Box::new(MemoryRepository::new()), settings);
        let session_only = ConsentUpdate {
            data_retention: Some(DataRetention::SessionOnly),
            ..Default::default()
        };
        for user in ["u1", "u2", "u3"] {
            engine.set_consent(user, &session_only).await.unwrap();
        }

        assert_eq!(engine.ephemeral_profiles.lock().await.len(), 2);
        assert_eq!(
            engine.profile("u3").await.consent.data_retention,
            DataRetention::SessionOnly
        );
        // The oldest one is forgotten, as after a restart.
        assert_eq!(
            engine.profile("u1").await.consent.data_retention,
            DataRetention::ThirtyDays
        );
    }

    #[tokio::test]
    async fn test_concurrent_first_turns_share_one_session() {
        let engine = Arc::new(engine_with(vec![]));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine
                    .process_message("s1", "u1", "hello", &TurnContext::default())
                    .await
            }));
        }
        for h in handles {
            assert!(h.await.unwrap().success);
        }

        assert_eq!(engine.session_count().await, 1);
        let session = engine.session("s1", "u1").await.unwrap();
        assert_eq!(session.lock().await.history.len(), 8);
    }
}
