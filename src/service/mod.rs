pub mod client;
pub mod protocol;

pub use client::{read_message, write_message, RemoteMatcher};
pub use protocol::{MatchVerdict, MatcherRequest, MatcherResponse, ProbeRequest};
