use crate::common::config::CenteringConfig;
use crate::core::frame::{FaceBox, FrameSize};

/// Decides whether a face centroid sits inside the central band of the frame.
#[derive(Debug, Clone)]
pub struct CenteringEvaluator {
    band: f32,
}

impl CenteringEvaluator {
    pub fn new(config: &CenteringConfig) -> Self {
        Self { band: config.band }
    }

    pub fn is_centered(&self, face: &FaceBox, frame: FrameSize) -> bool {
        if frame.is_empty() || face.is_degenerate() {
            return false;
        }

        let (cx, cy) = face.centroid();
        let width = frame.width as f32;
        let height = frame.height as f32;

        let lo = (1.0 - self.band) / 2.0;
        let hi = (1.0 + self.band) / 2.0;

        (lo * width..=hi * width).contains(&cx) && (lo * height..=hi * height).contains(&cy)
    }
}

impl Default for CenteringEvaluator {
    fn default() -> Self {
        Self::new(&CenteringConfig::default())
    }
}
