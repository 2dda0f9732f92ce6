pub mod centering;
pub mod clock;
pub mod consent;
pub mod frame;
pub mod manager;
pub mod matcher;
pub mod quality;
pub mod retry;
pub mod session;
pub mod token;

pub use centering::CenteringEvaluator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use consent::{ConsentCategory, ConsentDecision, ConsentGate, ConsentState, ConsentStore};
pub use frame::{FaceBox, Frame, FrameSize};
pub use manager::{FrameOutcome, SessionHandle, SessionId, SessionManager, SessionSnapshot};
pub use matcher::{EnrollVerdict, MatchResult, Matcher, MatcherError, Probe};
pub use quality::{QualityReport, QualityScorer, RejectionReason};
pub use retry::{BudgetDecision, RetryBudget};
pub use session::{AttemptOutcome, AttemptRecord, MatcherVerdict, Mode, Session, SessionState};
pub use token::{Claims, Token, TokenIssuer};
