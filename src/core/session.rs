//! Per-session state and its legal transitions.
//!
//! Forward path: `Idle -> AwaitingConsent -> AwaitingFrame -> Scoring ->
//! Submitting -> Accepted`. `Scoring` and `Submitting` fall back to
//! `AwaitingFrame` on a retryable outcome or to `Lockout` once the budget is
//! spent. `Expired`, `Denied` and `Aborted` can be entered from any
//! non-terminal state. Terminal states are never left.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::common::error::{AuthError, Result};
use crate::core::matcher::MatchResult;
use crate::core::quality::{QualityReport, RejectionReason};
use crate::core::retry::{BudgetDecision, RetryBudget};
use crate::core::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Enroll,
    Verify,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Enroll => f.write_str("enroll"),
            Mode::Verify => f.write_str("verify"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    AwaitingConsent,
    AwaitingFrame,
    Scoring,
    Submitting,
    Accepted,
    Lockout,
    Expired,
    Denied,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Accepted
                | SessionState::Lockout
                | SessionState::Expired
                | SessionState::Denied
                | SessionState::Aborted
        )
    }

    fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        if self.is_terminal() {
            return false;
        }
        if matches!(next, Expired | Denied | Aborted) {
            return true;
        }

        matches!(
            (self, next),
            (Idle, AwaitingConsent)
                | (AwaitingConsent, AwaitingFrame)
                | (AwaitingFrame, Scoring)
                | (Scoring, AwaitingFrame)
                | (Scoring, Submitting)
                | (Scoring, Lockout)
                | (Submitting, AwaitingFrame)
                | (Submitting, Accepted)
                | (Submitting, Lockout)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    RejectedLocally,
    RejectedByMatcher,
    Accepted,
}

/// What the matcher said about a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatcherVerdict {
    Compared(MatchResult),
    Enrolled { accepted: bool, reason: Option<String> },
}

impl MatcherVerdict {
    pub fn is_positive(&self) -> bool {
        match self {
            MatcherVerdict::Compared(result) => result.is_match,
            MatcherVerdict::Enrolled { accepted, .. } => *accepted,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub quality_score: f32,
    pub centered: bool,
    pub rejection: Option<RejectionReason>,
    pub matcher_result: Option<MatcherVerdict>,
    pub outcome: AttemptOutcome,
    pub timestamp: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn local_rejection(report: &QualityReport, reason: RejectionReason, at: DateTime<Utc>) -> Self {
        Self {
            quality_score: report.overall_score,
            centered: report.centered,
            rejection: Some(reason),
            matcher_result: None,
            outcome: AttemptOutcome::RejectedLocally,
            timestamp: at,
        }
    }

    pub fn from_verdict(report: &QualityReport, verdict: MatcherVerdict, at: DateTime<Utc>) -> Self {
        let outcome = if verdict.is_positive() {
            AttemptOutcome::Accepted
        } else {
            AttemptOutcome::RejectedByMatcher
        };
        Self {
            quality_score: report.overall_score,
            centered: report.centered,
            rejection: None,
            matcher_result: Some(verdict),
            outcome,
            timestamp: at,
        }
    }
}

pub struct Session {
    id: Uuid,
    mode: Mode,
    user_id: String,
    state: SessionState,
    attempts: Vec<AttemptRecord>,
    budget: RetryBudget,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    result_token: Option<Token>,
    last_report: Option<QualityReport>,
    frames_scored: u32,
    deny_reason: Option<String>,
}

impl Session {
    pub fn new(user_id: &str, mode: Mode, max_attempts: u32, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            user_id: user_id.to_string(),
            state: SessionState::Idle,
            attempts: Vec::new(),
            budget: RetryBudget::new(max_attempts),
            created_at: now,
            expires_at: now + ttl,
            result_token: None,
            last_report: None,
            frames_scored: 0,
            deny_reason: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.budget.remaining()
    }

    pub fn max_attempts(&self) -> u32 {
        self.budget.max_attempts()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn result_token(&self) -> Option<&Token> {
        self.result_token.as_ref()
    }

    pub fn last_report(&self) -> Option<&QualityReport> {
        self.last_report.as_ref()
    }

    pub fn frames_scored(&self) -> u32 {
        self.frames_scored
    }

    pub fn deny_reason(&self) -> Option<&str> {
        self.deny_reason.as_deref()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(AuthError::Other(anyhow::anyhow!(
                "Illegal session transition {} -> {}", self.state, next
            )));
        }

        tracing::debug!(
            session_id = %self.id,
            user_id = %self.user_id,
            from = %self.state,
            to = %next,
            "Session transition"
        );
        self.state = next;
        Ok(())
    }

    pub fn begin_consent(&mut self) -> Result<()> {
        self.transition(SessionState::AwaitingConsent)
    }

    pub fn consent_granted(&mut self) -> Result<()> {
        self.transition(SessionState::AwaitingFrame)
    }

    pub fn begin_scoring(&mut self) -> Result<()> {
        self.transition(SessionState::Scoring)?;
        self.frames_scored += 1;
        Ok(())
    }

    pub fn record_report(&mut self, report: QualityReport) {
        self.last_report = Some(report);
    }

    pub fn begin_submitting(&mut self) -> Result<()> {
        self.transition(SessionState::Submitting)
    }

    /// Appends a non-accepted attempt and moves to `AwaitingFrame` or `Lockout`.
    pub fn record_rejection(&mut self, record: AttemptRecord) -> Result<SessionState> {
        if record.outcome == AttemptOutcome::Accepted {
            return Err(AuthError::Other(anyhow::anyhow!(
                "Accepted attempt recorded as rejection"
            )));
        }
        if self.budget.is_exhausted() {
            return Err(AuthError::RetryExhausted);
        }

        let next = match self.budget.record_attempt(record.outcome) {
            BudgetDecision::Continue => SessionState::AwaitingFrame,
            BudgetDecision::Exhausted => SessionState::Lockout,
        };
        self.transition(next)?;
        if let Some(reason) = record.rejection {
            tracing::debug!(session_id = %self.id, ?reason, "Frame rejected locally");
        }
        self.attempts.push(record);

        if next == SessionState::Lockout {
            tracing::warn!(
                session_id = %self.id,
                user_id = %self.user_id,
                attempts = self.attempts.len(),
                "Retry budget exhausted, session locked out"
            );
        }
        Ok(next)
    }

    /// Appends the accepted attempt and stores the token. Only legal from `Submitting`.
    pub fn accept(&mut self, record: AttemptRecord, token: Token) -> Result<()> {
        if record.outcome != AttemptOutcome::Accepted {
            return Err(AuthError::Other(anyhow::anyhow!(
                "Rejected attempt recorded as acceptance"
            )));
        }
        self.transition(SessionState::Accepted)?;
        self.budget.record_attempt(record.outcome);
        self.attempts.push(record);
        self.result_token = Some(token);

        tracing::info!(
            session_id = %self.id,
            user_id = %self.user_id,
            mode = %self.mode,
            attempts = self.attempts.len(),
            "Session accepted"
        );
        Ok(())
    }

    /// Leaves `Submitting` without recording an attempt.
    pub fn return_to_frame(&mut self) -> Result<()> {
        self.transition(SessionState::AwaitingFrame)
    }

    pub fn deny(&mut self, reason: &str) {
        if self.terminate(SessionState::Denied) {
            tracing::warn!(session_id = %self.id, user_id = %self.user_id, reason, "Session denied");
            self.deny_reason = Some(reason.to_string());
        }
    }

    pub fn expire(&mut self) {
        if self.terminate(SessionState::Expired) {
            tracing::info!(session_id = %self.id, user_id = %self.user_id, "Session expired");
        }
    }

    pub fn abort(&mut self) {
        if self.terminate(SessionState::Aborted) {
            tracing::info!(session_id = %self.id, user_id = %self.user_id, "Session aborted");
        }
    }

    fn terminate(&mut self, to: SessionState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.transition(to).is_ok()
    }
}
