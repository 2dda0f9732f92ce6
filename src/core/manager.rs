//! Session orchestration: owns every live session, gates frames locally,
//! calls the matcher and mints tokens.
//!
//! Each session sits behind its own async mutex. A frame is processed to
//! completion while that lock is held, so a concurrent `submit_frame` on the
//! same session fails fast with `SessionBusy`. The registry lock is only ever
//! held for short synchronous sections and never across an await.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::common::config::Config;
use crate::common::error::{AuthError, Result};
use crate::core::centering::CenteringEvaluator;
use crate::core::clock::{Clock, SystemClock};
use crate::core::consent::{ConsentCategory, ConsentDecision, ConsentGate, ConsentStore};
use crate::core::frame::Frame;
use crate::core::matcher::{EnrollVerdict, Matcher, MatcherError, Probe};
use crate::core::quality::{QualityReport, QualityScorer, RejectionReason};
use crate::core::session::{AttemptOutcome, AttemptRecord, MatcherVerdict, Mode, Session, SessionState};
use crate::core::token::{Token, TokenIssuer};

pub type SessionId = Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct SessionHandle {
    pub id: SessionId,
    pub user_id: String,
    pub mode: Mode,
    pub state: SessionState,
    pub expires_at: DateTime<Utc>,
    pub deny_reason: Option<String>,
}

/// Result of one `submit_frame` call that reached a definitive outcome.
#[derive(Debug, Clone, Serialize)]
pub struct FrameOutcome {
    pub state: SessionState,
    pub quality_score: f32,
    pub centered: bool,
    pub attempts_remaining: u32,
    pub rejection: Option<RejectionReason>,
    pub matcher: Option<MatcherVerdict>,
    pub suggestions: Vec<String>,
}

/// Read-only projection of a session for UI layers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub user_id: String,
    pub mode: Mode,
    pub state: SessionState,
    pub attempts: usize,
    pub attempts_remaining: u32,
    pub max_attempts: u32,
    pub frames_scored: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_quality: Option<QualityReport>,
    pub deny_reason: Option<String>,
}

impl SessionSnapshot {
    fn of(session: &Session) -> Self {
        Self {
            id: session.id(),
            user_id: session.user_id().to_string(),
            mode: session.mode(),
            state: session.state(),
            attempts: session.attempts().len(),
            attempts_remaining: session.attempts_remaining(),
            max_attempts: session.max_attempts(),
            frames_scored: session.frames_scored(),
            created_at: session.created_at(),
            expires_at: session.expires_at(),
            last_quality: session.last_report().cloned(),
            deny_reason: session.deny_reason().map(str::to_string),
        }
    }
}

struct SessionSlot {
    user_id: String,
    expires_at: DateTime<Utc>,
    session: AsyncMutex<Session>,
    cancel: CancellationToken,
    deadline: CancellationToken,
    consent_revoked: AtomicBool,
    published: Mutex<SessionSnapshot>,
}

impl SessionSlot {
    fn new(session: Session) -> Self {
        Self {
            user_id: session.user_id().to_string(),
            expires_at: session.expires_at(),
            published: Mutex::new(SessionSnapshot::of(&session)),
            session: AsyncMutex::new(session),
            cancel: CancellationToken::new(),
            deadline: CancellationToken::new(),
            consent_revoked: AtomicBool::new(false),
        }
    }

    fn published(&self) -> SessionSnapshot {
        self.published.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Checks the deadline without the session lock. Once passed, an
    /// in-flight matcher call is woken and ends as expired.
    fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        if now > self.expires_at {
            self.deadline.cancel();
            return true;
        }
        false
    }
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<SessionId, Arc<SessionSlot>>,
    active_by_user: HashMap<String, SessionId>,
    cooldowns: HashMap<String, DateTime<Utc>>,
}

enum MatcherCall {
    Finished(std::result::Result<MatcherVerdict, MatcherError>),
    Aborted,
    Expired,
}

impl MatcherCall {
    fn audit_outcome(&self) -> &'static str {
        match self {
            MatcherCall::Aborted => "aborted",
            MatcherCall::Expired => "expired",
            MatcherCall::Finished(Err(_)) => "transport_error",
            MatcherCall::Finished(Ok(verdict)) => match verdict {
                MatcherVerdict::Compared(_) if verdict.is_positive() => "matched",
                MatcherVerdict::Compared(_) => "no_match",
                MatcherVerdict::Enrolled { .. } if verdict.is_positive() => "enrolled",
                MatcherVerdict::Enrolled { .. } => "enroll_rejected",
            },
        }
    }
}

pub struct SessionManager {
    config: Config,
    scorer: QualityScorer,
    gate: ConsentGate,
    issuer: TokenIssuer,
    matcher: Arc<dyn Matcher>,
    consent: Arc<dyn ConsentStore>,
    clock: Arc<dyn Clock>,
    registry: Mutex<Registry>,
}

impl SessionManager {
    pub fn new(config: Config, matcher: Arc<dyn Matcher>, consent: Arc<dyn ConsentStore>) -> Result<Self> {
        config.validate()?;

        let scorer = QualityScorer::new(
            config.quality.clone(),
            CenteringEvaluator::new(&config.centering),
        );
        let gate = ConsentGate::new(&config.consent);
        let issuer = TokenIssuer::new(&config.token)?;

        Ok(Self {
            config,
            scorer,
            gate,
            issuer,
            matcher,
            consent,
            clock: Arc::new(SystemClock),
            registry: Mutex::new(Registry::default()),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn token_issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, session_id: SessionId) -> Result<Arc<SessionSlot>> {
        self.registry()
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or_else(|| AuthError::SessionNotFound(session_id.to_string()))
    }

    /// Opens a session for `user_id` and runs the consent check once.
    ///
    /// A denied session is still returned (in `Denied`) so that later calls
    /// against it report `ConsentDenied`.
    pub async fn start(&self, user_id: &str, mode: Mode) -> Result<SessionHandle> {
        validate_user_id(user_id)?;
        let now = self.clock.now();

        let slot = {
            let mut registry = self.registry();

            if let Some(until) = registry.cooldowns.get(user_id).copied() {
                if until > now {
                    let retry_after_secs = ceil_secs(until - now);
                    tracing::warn!(user_id, retry_after_secs, "Start rejected, user is cooling down");
                    return Err(AuthError::CoolingDown { retry_after_secs });
                }
                registry.cooldowns.remove(user_id);
            }

            if let Some(existing_id) = registry.active_by_user.get(user_id).copied() {
                if let Some(existing) = registry.sessions.get(&existing_id) {
                    let live = match existing.session.try_lock() {
                        Ok(mut session) => {
                            self.refresh(existing, &mut session, now);
                            !session.state().is_terminal()
                        }
                        Err(_) => !existing.deadline_passed(now),
                    };
                    if live {
                        tracing::warn!(user_id, session_id = %existing_id, "User already has an active session");
                        return Err(AuthError::SessionAlreadyActive(user_id.to_string()));
                    }
                }
            }

            let ttl = Duration::seconds(self.config.session.ttl_secs as i64);
            let mut session = Session::new(user_id, mode, self.config.session.max_attempts, now, ttl);
            session.begin_consent()?;

            let id = session.id();
            let slot = Arc::new(SessionSlot::new(session));
            registry.sessions.insert(id, slot.clone());
            registry.active_by_user.insert(user_id.to_string(), id);
            slot
        };

        let decision = self.gate.check(self.consent.as_ref(), user_id, mode).await;

        let mut session = slot.session.lock().await;
        let now = self.clock.now();
        self.refresh(&slot, &mut session, now);
        if !session.state().is_terminal() {
            match decision {
                ConsentDecision::Allow => session.consent_granted()?,
                ConsentDecision::Deny(reason) => session.deny(&reason),
            }
        }
        self.publish(&slot, &session);

        tracing::info!(
            session_id = %session.id(),
            user_id,
            %mode,
            state = %session.state(),
            "Session started"
        );

        Ok(SessionHandle {
            id: session.id(),
            user_id: user_id.to_string(),
            mode,
            state: session.state(),
            expires_at: session.expires_at(),
            deny_reason: session.deny_reason().map(str::to_string),
        })
    }

    /// Scores a frame and, if it passes locally, submits it to the matcher.
    ///
    /// Local rejections and matcher no-match come back as `Ok(FrameOutcome)`.
    /// Transport failures return `TransportError` and leave the attempt budget
    /// untouched.
    pub async fn submit_frame(&self, session_id: SessionId, frame: Frame) -> Result<FrameOutcome> {
        let slot = self.slot(session_id)?;
        let mut session = match slot.session.try_lock() {
            Ok(session) => session,
            Err(_) if slot.deadline_passed(self.clock.now()) => return Err(AuthError::SessionExpired),
            Err(_) => return Err(AuthError::SessionBusy),
        };

        let now = self.clock.now();
        self.refresh(&slot, &mut session, now);
        if session.state() != SessionState::AwaitingFrame {
            return Err(terminal_error(&session));
        }

        session.begin_scoring()?;
        let (report, rejection) = self.scorer.gate(frame.face.as_ref(), frame.size);
        let suggestions = report.get_improvement_suggestions(self.scorer.config());
        session.record_report(report.clone());

        if let Some(reason) = rejection {
            let state = session.record_rejection(AttemptRecord::local_rejection(&report, reason, now))?;
            if state == SessionState::Lockout {
                self.start_cooldown(session.user_id(), now);
            }
            self.publish(&slot, &session);

            return Ok(FrameOutcome {
                state,
                quality_score: report.overall_score,
                centered: report.centered,
                attempts_remaining: session.attempts_remaining(),
                rejection: Some(reason),
                matcher: None,
                suggestions,
            });
        }

        session.begin_submitting()?;
        self.publish(&slot, &session);

        let user_id = session.user_id().to_string();
        let mode = session.mode();
        let probe = Probe::new(frame.payload);
        let remaining = (session.expires_at() - now)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);

        let call = tokio::select! {
            biased;
            _ = slot.cancel.cancelled() => MatcherCall::Aborted,
            _ = slot.deadline.cancelled() => MatcherCall::Expired,
            _ = tokio::time::sleep(remaining) => MatcherCall::Expired,
            result = self.call_matcher(mode, &probe, &user_id) => MatcherCall::Finished(result),
        };

        tracing::info!(
            target: "audit",
            session_id = %session_id,
            user_id = %user_id,
            categories = %categories_label(self.gate.required_for(mode)),
            %mode,
            outcome = call.audit_outcome(),
            "Biometric data access"
        );

        let now = self.clock.now();
        let verdict = match call {
            MatcherCall::Aborted => {
                session.abort();
                self.publish(&slot, &session);
                return Err(AuthError::SessionAborted);
            }
            MatcherCall::Expired => {
                session.expire();
                self.publish(&slot, &session);
                return Err(AuthError::SessionExpired);
            }
            MatcherCall::Finished(Err(e)) => {
                self.refresh(&slot, &mut session, now);
                if session.state().is_terminal() {
                    return Err(terminal_error(&session));
                }
                tracing::warn!(
                    session_id = %session_id,
                    user_id = %user_id,
                    error = %e,
                    "Matcher transport error, attempt not counted"
                );
                session.return_to_frame()?;
                self.publish(&slot, &session);
                return Err(AuthError::TransportError(e.0));
            }
            MatcherCall::Finished(Ok(verdict)) => verdict,
        };

        self.refresh(&slot, &mut session, now);
        if session.state().is_terminal() {
            return Err(terminal_error(&session));
        }

        let record = AttemptRecord::from_verdict(&report, verdict.clone(), now);
        let state = if record.outcome == AttemptOutcome::Accepted {
            let token = match self.issuer.issue(&user_id, now) {
                Ok(token) => token,
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "Token issuance failed");
                    session.return_to_frame()?;
                    self.publish(&slot, &session);
                    return Err(e);
                }
            };
            session.accept(record, token)?;
            SessionState::Accepted
        } else {
            let state = session.record_rejection(record)?;
            if state == SessionState::Lockout {
                self.start_cooldown(&user_id, now);
            }
            state
        };
        self.publish(&slot, &session);

        Ok(FrameOutcome {
            state,
            quality_score: report.overall_score,
            centered: report.centered,
            attempts_remaining: session.attempts_remaining(),
            rejection: None,
            matcher: Some(verdict),
            suggestions,
        })
    }

    /// Terminates a live session. An in-flight matcher call is cancelled and not counted.
    pub fn abort(&self, session_id: SessionId) -> Result<()> {
        let slot = self.slot(session_id)?;
        slot.cancel.cancel();

        if let Ok(mut session) = slot.session.try_lock() {
            let now = self.clock.now();
            self.refresh(&slot, &mut session, now);
        }

        tracing::info!(session_id = %session_id, user_id = %slot.user_id, "Abort requested");
        Ok(())
    }

    pub fn get_token(&self, session_id: SessionId) -> Result<Token> {
        let slot = self.slot(session_id)?;
        let mut session = match slot.session.try_lock() {
            Ok(session) => session,
            Err(_) if slot.deadline_passed(self.clock.now()) => {
                return Err(AuthError::TokenUnavailable(SessionState::Expired))
            }
            Err(_) => return Err(AuthError::SessionBusy),
        };

        let now = self.clock.now();
        self.refresh(&slot, &mut session, now);

        match session.result_token() {
            Some(token) if session.state() == SessionState::Accepted => {
                if token.is_expired_at(now) {
                    Err(AuthError::TokenExpired)
                } else {
                    Ok(token.clone())
                }
            }
            _ => Err(AuthError::TokenUnavailable(session.state())),
        }
    }

    /// Current projection of a session. While a frame is in flight this is the
    /// snapshot published when the matcher call started, reported as `Expired`
    /// once the deadline has passed.
    pub fn status(&self, session_id: SessionId) -> Result<SessionSnapshot> {
        let slot = self.slot(session_id)?;
        let now = self.clock.now();
        if let Ok(mut session) = slot.session.try_lock() {
            self.refresh(&slot, &mut session, now);
            return Ok(SessionSnapshot::of(&session));
        }

        let mut snapshot = slot.published();
        if !snapshot.state.is_terminal() && slot.deadline_passed(now) {
            snapshot.state = SessionState::Expired;
        }
        Ok(snapshot)
    }

    /// Marks the user's live session as revoked. It is denied on its next interaction.
    pub fn notify_consent_revoked(&self, user_id: &str) -> bool {
        let slot = {
            let registry = self.registry();
            registry
                .active_by_user
                .get(user_id)
                .and_then(|id| registry.sessions.get(id))
                .cloned()
        };

        match slot {
            Some(slot) => {
                slot.consent_revoked.store(true, Ordering::SeqCst);
                tracing::info!(user_id, "Consent revocation recorded for active session");
                true
            }
            None => false,
        }
    }

    /// Drops terminal sessions and elapsed cooldowns. Returns how many sessions were removed.
    pub fn reap_finished(&self) -> usize {
        let now = self.clock.now();
        let mut registry = self.registry();

        let finished: Vec<SessionId> = registry
            .sessions
            .iter()
            .filter(|(_, slot)| match slot.session.try_lock() {
                Ok(mut session) => {
                    self.refresh(slot, &mut session, now);
                    session.state().is_terminal()
                }
                Err(_) => false,
            })
            .map(|(id, _)| *id)
            .collect();

        for id in &finished {
            if let Some(slot) = registry.sessions.remove(id) {
                if registry.active_by_user.get(&slot.user_id) == Some(id) {
                    registry.active_by_user.remove(&slot.user_id);
                }
            }
        }
        registry.cooldowns.retain(|_, until| *until > now);

        if !finished.is_empty() {
            tracing::debug!(reaped = finished.len(), "Reaped finished sessions");
        }
        finished.len()
    }

    pub fn session_count(&self) -> usize {
        self.registry().sessions.len()
    }

    async fn call_matcher(
        &self,
        mode: Mode,
        probe: &Probe,
        user_id: &str,
    ) -> std::result::Result<MatcherVerdict, MatcherError> {
        match mode {
            Mode::Enroll => self.matcher.enroll(probe, user_id).await.map(|verdict| match verdict {
                EnrollVerdict::Accepted => MatcherVerdict::Enrolled { accepted: true, reason: None },
                EnrollVerdict::Rejected(reason) => MatcherVerdict::Enrolled {
                    accepted: false,
                    reason: Some(reason),
                },
            }),
            Mode::Verify => self
                .matcher
                .compare(probe, user_id)
                .await
                .map(MatcherVerdict::Compared),
        }
    }

    /// Applies pending abort, revocation and expiry signals, in that order.
    fn refresh(&self, slot: &SessionSlot, session: &mut Session, now: DateTime<Utc>) {
        if session.state().is_terminal() {
            return;
        }

        if slot.cancel.is_cancelled() {
            session.abort();
        } else if slot.consent_revoked.load(Ordering::SeqCst) {
            session.deny("consent revoked");
        } else if session.is_expired_at(now) {
            session.expire();
        }
        self.publish(slot, session);
    }

    fn publish(&self, slot: &SessionSlot, session: &Session) {
        *slot.published.lock().unwrap_or_else(PoisonError::into_inner) = SessionSnapshot::of(session);
    }

    fn start_cooldown(&self, user_id: &str, now: DateTime<Utc>) {
        let secs = self.config.session.lockout_cooldown_secs;
        if secs == 0 {
            return;
        }
        let until = now + Duration::seconds(secs as i64);
        self.registry().cooldowns.insert(user_id.to_string(), until);
        tracing::info!(user_id, cooldown_secs = secs, "Lockout cooldown started");
    }
}

fn terminal_error(session: &Session) -> AuthError {
    match session.state() {
        SessionState::Denied => AuthError::ConsentDenied(
            session.deny_reason().unwrap_or("consent denied").to_string(),
        ),
        SessionState::Lockout => AuthError::RetryExhausted,
        SessionState::Expired => AuthError::SessionExpired,
        SessionState::Aborted => AuthError::SessionAborted,
        SessionState::Accepted => AuthError::SessionCompleted,
        other => AuthError::Other(anyhow::anyhow!(
            "Session cannot take frames in state {}", other
        )),
    }
}

fn categories_label(categories: &[ConsentCategory]) -> String {
    categories.iter().map(ConsentCategory::as_str).collect::<Vec<_>>().join(",")
}

fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() || user_id.len() > 128 {
        return Err(AuthError::InvalidUser(user_id.to_string()));
    }
    Ok(())
}

fn ceil_secs(d: Duration) -> u64 {
    let ms = d.num_milliseconds().max(0);
    (((ms + 999) / 1000).max(1)) as u64
}
