//! Shared doubles for the session integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use facegate::core::{EnrollVerdict, MatchResult, Matcher, MatcherError, Probe};
use facegate::{
    Config, ConsentCategory, FaceBox, Frame, FrameSize, MemoryConsentStore, SessionManager,
};

/// Matcher that plays back scripted compare results and remembers enrolled payloads.
#[derive(Default)]
pub struct FakeMatcher {
    calls: AtomicUsize,
    script: Mutex<VecDeque<Result<MatchResult, MatcherError>>>,
    enrolled: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeMatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues compare answers. Once the script runs out, compare checks the enrolled payload.
    pub fn scripted(results: Vec<Result<MatchResult, MatcherError>>) -> Arc<Self> {
        let matcher = Self::default();
        *matcher.script.lock().unwrap() = results.into();
        Arc::new(matcher)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Matcher for FakeMatcher {
    async fn enroll(&self, probe: &Probe, user_id: &str) -> Result<EnrollVerdict, MatcherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut enrolled = self.enrolled.lock().unwrap();
        if enrolled.contains_key(user_id) {
            return Ok(EnrollVerdict::Rejected("already enrolled".into()));
        }
        enrolled.insert(user_id.to_string(), probe.payload.clone());
        Ok(EnrollVerdict::Accepted)
    }

    async fn compare(&self, probe: &Probe, user_id: &str) -> Result<MatchResult, MatcherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        let is_match = self.enrolled.lock().unwrap().get(user_id) == Some(&probe.payload);
        Ok(MatchResult {
            is_match,
            confidence: if is_match { 0.97 } else { 0.12 },
        })
    }
}

/// Matcher that blocks every call until released, announcing when a call starts.
#[derive(Default)]
pub struct GatedMatcher {
    calls: AtomicUsize,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedMatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Matcher for GatedMatcher {
    async fn enroll(&self, _probe: &Probe, _user_id: &str) -> Result<EnrollVerdict, MatcherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(EnrollVerdict::Accepted)
    }

    async fn compare(&self, _probe: &Probe, _user_id: &str) -> Result<MatchResult, MatcherError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(MatchResult { is_match: true, confidence: 0.99 })
    }
}

pub fn no_match() -> Result<MatchResult, MatcherError> {
    Ok(MatchResult { is_match: false, confidence: 0.2 })
}

pub fn matched() -> Result<MatchResult, MatcherError> {
    Ok(MatchResult { is_match: true, confidence: 0.95 })
}

pub fn transport_failure() -> Result<MatchResult, MatcherError> {
    Err(MatcherError("connection reset".into()))
}

pub fn consenting(users: &[&str]) -> Arc<MemoryConsentStore> {
    let store = MemoryConsentStore::new();
    for user in users {
        store.set(user, ConsentCategory::FacialData, true);
    }
    Arc::new(store)
}

pub fn manager(matcher: Arc<dyn Matcher>, consent: Arc<MemoryConsentStore>) -> SessionManager {
    SessionManager::new(test_config(), matcher, consent).unwrap()
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.token.secret = "integration-secret".to_string();
    config
}

/// 160px face in the middle of a VGA frame with a confident detection.
pub fn good_frame(payload: &[u8]) -> Frame {
    Frame::new(
        payload.to_vec(),
        FrameSize::new(640, 480),
        Some(FaceBox::new(240.0, 160.0, 400.0, 320.0).with_confidence(0.95)),
    )
}

/// Centered but far too small and weakly detected.
pub fn low_quality_frame() -> Frame {
    Frame::new(
        vec![9],
        FrameSize::new(640, 480),
        Some(FaceBox::new(300.0, 220.0, 340.0, 260.0).with_confidence(0.4)),
    )
}

pub fn off_center_frame() -> Frame {
    Frame::new(
        vec![9],
        FrameSize::new(640, 480),
        Some(FaceBox::new(10.0, 10.0, 170.0, 170.0).with_confidence(0.95)),
    )
}

/// Off-centre but well sized and certain, which lands exactly on the pass threshold.
pub fn off_center_confident_frame() -> Frame {
    Frame::new(
        vec![7],
        FrameSize::new(640, 480),
        Some(FaceBox::new(10.0, 10.0, 170.0, 170.0).with_confidence(1.0)),
    )
}

pub fn empty_frame() -> Frame {
    Frame::new(vec![9], FrameSize::new(640, 480), None)
}
