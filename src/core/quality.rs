use serde::{Deserialize, Serialize};

use crate::common::config::QualityConfig;
use crate::core::centering::CenteringEvaluator;
use crate::core::frame::{FaceBox, FrameSize};

/// Why a frame was turned away before reaching the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    NoFaceDetected,
    NotCentered,
    LowQuality,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub detection_confidence: f32,
    /// Face width/height rescaled to the reference resolution.
    pub face_width_ref: f32,
    pub face_height_ref: f32,
    pub size_ok: bool,
    pub centered: bool,
    pub overall_score: f32,
}

impl QualityReport {
    fn empty() -> Self {
        Self {
            detection_confidence: 0.0,
            face_width_ref: 0.0,
            face_height_ref: 0.0,
            size_ok: false,
            centered: false,
            overall_score: 0.0,
        }
    }

    pub fn meets_minimum_requirements(&self, min_quality: f32) -> bool {
        self.overall_score >= min_quality
    }

    pub fn get_quality_assessment(&self) -> String {
        let quality_level = if self.overall_score >= 0.9 {
            "Excellent"
        } else if self.overall_score >= 0.7 {
            "Good"
        } else if self.overall_score >= 0.4 {
            "Poor"
        } else {
            "Very Poor"
        };

        format!("Quality: {} (score: {:.2})", quality_level, self.overall_score)
    }

    pub fn get_improvement_suggestions(&self, config: &QualityConfig) -> Vec<String> {
        let mut suggestions = Vec::new();

        if self.overall_score == 0.0 && !self.size_ok && !self.centered {
            suggestions.push("No usable face found - look straight at the camera".to_string());
            return suggestions;
        }

        let smaller_side = self.face_width_ref.min(self.face_height_ref);
        let larger_side = self.face_width_ref.max(self.face_height_ref);
        if smaller_side < config.min_face_px {
            suggestions.push("Face is too small - move closer to the camera".to_string());
        } else if larger_side > config.max_face_px {
            suggestions.push("Face is too large - move back from the camera".to_string());
        }

        if !self.centered {
            suggestions.push("Center your face in the camera view".to_string());
        }

        if self.detection_confidence < 0.7 {
            suggestions.push("Improve lighting so your face is clearly visible".to_string());
        }

        suggestions
    }
}

/// Weighted size/centering/confidence score that gates frames before any matcher call.
#[derive(Debug, Clone)]
pub struct QualityScorer {
    config: QualityConfig,
    centering: CenteringEvaluator,
}

impl QualityScorer {
    pub fn new(config: QualityConfig, centering: CenteringEvaluator) -> Self {
        Self { config, centering }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    pub fn score(&self, face: &FaceBox, frame: FrameSize) -> f32 {
        self.evaluate(face, frame).overall_score
    }

    pub fn evaluate(&self, face: &FaceBox, frame: FrameSize) -> QualityReport {
        if frame.is_empty() || face.is_degenerate() {
            return QualityReport::empty();
        }

        let scale_x = self.config.reference_width as f32 / frame.width as f32;
        let scale_y = self.config.reference_height as f32 / frame.height as f32;
        let face_width_ref = face.width() * scale_x;
        let face_height_ref = face.height() * scale_y;

        let range = self.config.min_face_px..=self.config.max_face_px;
        let size_ok = range.contains(&face_width_ref) && range.contains(&face_height_ref);
        let centered = self.centering.is_centered(face, frame);
        let detection_confidence = face
            .confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(1.0);

        let overall_score = (self.config.size_weight * if size_ok { 1.0 } else { 0.0 }
            + self.config.centering_weight * if centered { 1.0 } else { 0.0 }
            + self.config.baseline_weight * detection_confidence)
            .clamp(0.0, 1.0);

        QualityReport {
            detection_confidence,
            face_width_ref,
            face_height_ref,
            size_ok,
            centered,
            overall_score,
        }
    }

    /// Scores an optional detection and returns the local rejection, if any.
    ///
    /// The composite threshold decides pass or fail. A failing frame whose face
    /// is off-centre is reported as `NotCentered` so the caller can prompt the
    /// user. With `require_centered` set, off-centre frames fail regardless of score.
    pub fn gate(&self, face: Option<&FaceBox>, frame: FrameSize) -> (QualityReport, Option<RejectionReason>) {
        let face = match face {
            Some(face) if !face.is_degenerate() && !frame.is_empty() => face,
            _ => return (QualityReport::empty(), Some(RejectionReason::NoFaceDetected)),
        };

        let report = self.evaluate(face, frame);
        let passes = report.meets_minimum_requirements(self.config.pass_threshold);
        let rejection = if self.config.require_centered && !report.centered {
            Some(RejectionReason::NotCentered)
        } else if passes {
            None
        } else if !report.centered {
            Some(RejectionReason::NotCentered)
        } else {
            Some(RejectionReason::LowQuality)
        };

        tracing::debug!(
            score = report.overall_score,
            size_ok = report.size_ok,
            centered = report.centered,
            rejection = ?rejection,
            "Frame scored"
        );

        (report, rejection)
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(QualityConfig::default(), CenteringEvaluator::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VGA: FrameSize = FrameSize { width: 640, height: 480 };

    fn good_face() -> FaceBox {
        FaceBox::new(250.0, 170.0, 390.0, 310.0)
    }

    #[test]
    fn test_perfect_frame_scores_one() {
        let scorer = QualityScorer::default();
        let report = scorer.evaluate(&good_face(), VGA);
        assert!(report.size_ok);
        assert!(report.centered);
        assert!((report.overall_score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_detector_confidence_replaces_baseline() {
        let scorer = QualityScorer::default();
        let score = scorer.score(&good_face().with_confidence(0.5), VGA);
        assert!((score - 0.85).abs() < 1e-6);
    }

    #[test]
    fn test_small_face_fails_size_term() {
        let scorer = QualityScorer::default();
        let face = FaceBox::new(300.0, 220.0, 340.0, 260.0);
        let report = scorer.evaluate(&face, VGA);
        assert!(!report.size_ok);
        assert!(report.centered);
        assert!((report.overall_score - 0.6).abs() < 1e-6);
        assert!(!report.meets_minimum_requirements(0.7));
    }

    #[test]
    fn test_size_rescaled_to_reference_resolution() {
        let scorer = QualityScorer::default();
        // 280px box on a 1280x960 frame is 140px at 640x480
        let face = FaceBox::new(500.0, 340.0, 780.0, 620.0);
        let report = scorer.evaluate(&face, FrameSize::new(1280, 960));
        assert!((report.face_width_ref - 140.0).abs() < 1e-3);
        assert!(report.size_ok);
    }

    #[test]
    fn test_zero_area_scores_zero() {
        let scorer = QualityScorer::default();
        let face = FaceBox::new(320.0, 240.0, 320.0, 300.0);
        assert_eq!(scorer.score(&face, VGA), 0.0);
    }

    #[test]
    fn test_non_finite_box_scores_zero() {
        let scorer = QualityScorer::default();
        let face = FaceBox::new(f32::NAN, 170.0, 390.0, 310.0);
        assert_eq!(scorer.score(&face, VGA), 0.0);
    }

    #[test]
    fn test_gate_no_face() {
        let scorer = QualityScorer::default();
        let (report, rejection) = scorer.gate(None, VGA);
        assert_eq!(rejection, Some(RejectionReason::NoFaceDetected));
        assert_eq!(report.overall_score, 0.0);
    }

    #[test]
    fn test_gate_not_centered() {
        let scorer = QualityScorer::default();
        let face = FaceBox::new(10.0, 10.0, 150.0, 150.0).with_confidence(0.8);
        let (report, rejection) = scorer.gate(Some(&face), VGA);
        assert!(report.overall_score < 0.7);
        assert_eq!(rejection, Some(RejectionReason::NotCentered));
    }

    #[test]
    fn test_off_centre_face_at_threshold_passes() {
        let scorer = QualityScorer::default();
        let face = FaceBox::new(10.0, 10.0, 170.0, 170.0).with_confidence(1.0);
        let (report, rejection) = scorer.gate(Some(&face), VGA);
        assert!(!report.centered);
        assert!(report.overall_score >= 0.7);
        assert_eq!(rejection, None);
    }

    #[test]
    fn test_require_centered_rejects_regardless_of_score() {
        let config = QualityConfig {
            require_centered: true,
            ..QualityConfig::default()
        };
        let scorer = QualityScorer::new(config, CenteringEvaluator::default());
        let face = FaceBox::new(10.0, 10.0, 170.0, 170.0).with_confidence(1.0);
        let (_, rejection) = scorer.gate(Some(&face), VGA);
        assert_eq!(rejection, Some(RejectionReason::NotCentered));
    }

    #[test]
    fn test_gate_low_quality() {
        let scorer = QualityScorer::default();
        let face = FaceBox::new(300.0, 220.0, 340.0, 260.0);
        let (_, rejection) = scorer.gate(Some(&face), VGA);
        assert_eq!(rejection, Some(RejectionReason::LowQuality));
    }

    #[test]
    fn test_gate_passes() {
        let scorer = QualityScorer::default();
        let (report, rejection) = scorer.gate(Some(&good_face()), VGA);
        assert_eq!(rejection, None);
        assert!(report.overall_score >= 0.7);
    }

    #[test]
    fn test_suggestions() {
        let scorer = QualityScorer::default();
        let tiny = FaceBox::new(10.0, 10.0, 40.0, 40.0).with_confidence(0.4);
        let report = scorer.evaluate(&tiny, VGA);
        let suggestions = report.get_improvement_suggestions(scorer.config());
        assert!(suggestions.iter().any(|s| s.contains("too small")));
        assert!(suggestions.iter().any(|s| s.contains("Center")));
        assert!(suggestions.iter().any(|s| s.contains("lighting")));
    }

    #[test]
    fn test_assessment_text() {
        let scorer = QualityScorer::default();
        let report = scorer.evaluate(&good_face(), VGA);
        assert_eq!(report.get_quality_assessment(), "Quality: Excellent (score: 1.00)");
    }
}
