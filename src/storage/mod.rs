pub mod consent_store;

pub use consent_store::{FileConsentStore, MemoryConsentStore};
