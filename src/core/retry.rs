//! Bounded attempt budget for a single session.
//!
//! Every non-accepted outcome that is definitive (local rejection or a
//! matcher no-match) spends one attempt. Transport failures and
//! cancellations never reach the budget. Once the budget is spent the
//! session locks out; any cooldown before a new session is the caller's
//! policy.

use crate::core::session::AttemptOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetDecision {
    Continue,
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct RetryBudget {
    max_attempts: u32,
    used: u32,
}

impl RetryBudget {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts, used: 0 }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.max_attempts
    }

    /// Counts the attempt and reports whether another one is allowed.
    pub fn record_attempt(&mut self, outcome: AttemptOutcome) -> BudgetDecision {
        if self.used < self.max_attempts {
            self.used += 1;
        }

        if outcome != AttemptOutcome::Accepted && self.is_exhausted() {
            BudgetDecision::Exhausted
        } else {
            BudgetDecision::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausts_at_max() {
        let mut budget = RetryBudget::new(3);
        assert_eq!(budget.record_attempt(AttemptOutcome::RejectedLocally), BudgetDecision::Continue);
        assert_eq!(budget.record_attempt(AttemptOutcome::RejectedByMatcher), BudgetDecision::Continue);
        assert_eq!(budget.remaining(), 1);
        assert_eq!(budget.record_attempt(AttemptOutcome::RejectedByMatcher), BudgetDecision::Exhausted);
        assert!(budget.is_exhausted());
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_accept_on_last_attempt_is_not_exhausted() {
        let mut budget = RetryBudget::new(2);
        budget.record_attempt(AttemptOutcome::RejectedLocally);
        assert_eq!(budget.record_attempt(AttemptOutcome::Accepted), BudgetDecision::Continue);
    }

    #[test]
    fn test_single_attempt_budget() {
        let mut budget = RetryBudget::new(1);
        assert_eq!(budget.record_attempt(AttemptOutcome::RejectedLocally), BudgetDecision::Exhausted);
    }

    #[test]
    fn test_used_never_exceeds_max() {
        let mut budget = RetryBudget::new(1);
        budget.record_attempt(AttemptOutcome::RejectedLocally);
        budget.record_attempt(AttemptOutcome::RejectedLocally);
        assert_eq!(budget.used(), 1);
    }
}
