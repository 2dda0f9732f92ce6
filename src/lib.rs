// Core modules
pub mod common;
pub mod core;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use common::{AuthError, Config, DevMode, Result};
pub use self::core::{
    ConsentCategory, ConsentStore, FaceBox, Frame, FrameOutcome, FrameSize, Matcher, Mode, SessionHandle,
    SessionManager, SessionSnapshot, SessionState, Token,
};
pub use service::RemoteMatcher;
pub use storage::{FileConsentStore, MemoryConsentStore};
