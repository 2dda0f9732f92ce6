use serde::{Deserialize, Serialize};

/// Detected face bounding box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Detector confidence in [0,1], when the upstream detector reports one.
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl FaceBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2, confidence: None }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn centroid(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Zero/negative area or non-finite coordinates.
    pub fn is_degenerate(&self) -> bool {
        let coords = [self.x1, self.y1, self.x2, self.y2];
        coords.iter().any(|c| !c.is_finite()) || self.width() <= 0.0 || self.height() <= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A captured frame as handed over by the capture layer. The payload is never decoded here.
#[derive(Debug, Clone)]
pub struct Frame {
    pub payload: Vec<u8>,
    pub size: FrameSize,
    pub face: Option<FaceBox>,
}

impl Frame {
    pub fn new(payload: Vec<u8>, size: FrameSize, face: Option<FaceBox>) -> Self {
        Self { payload, size, face }
    }
}
