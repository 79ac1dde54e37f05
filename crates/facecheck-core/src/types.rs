use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Bounding box for a detected face, in source-frame pixels.
///
/// Analyzers report boxes as `[x, y, width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x, y, width, height]: [f32; 4]) -> Self {
        Self { x, y, width, height }
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

/// Liveness result attached to a detected face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AntiSpoof {
    /// Confidence in [0, 1] that the subject is live rather than a replay.
    pub score: f64,
}

/// One face as reported by the biometric analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedFace {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub embedding: Vec<f32>,
    /// Absent when the analyzer ran without its anti-spoof stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub antispoof: Option<AntiSpoof>,
}

impl DetectedFace {
    pub fn antispoof_score(&self) -> Option<f64> {
        self.antispoof.map(|a| a.score)
    }
}

/// Face embedding accepted for submission.
///
/// Immutable once produced. On the wire it is the comma-joined decimal
/// rendering of its values, sent verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Dimensionality as produced by the analyzer's model.
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Comma-separated wire form, e.g. `0.12,-0.5,1`.
    pub fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Embedding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

impl Serialize for Embedding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_wire_format() {
        let e = Embedding::new(vec![0.5, -1.0, 0.25]);
        assert_eq!(e.to_wire(), "0.5,-1,0.25");
        assert_eq!(e.dim(), 3);
    }

    #[test]
    fn test_embedding_serializes_as_string() {
        let e = Embedding::new(vec![1.5, 2.0]);
        let body = serde_json::json!({ "embedding": e });
        assert_eq!(body["embedding"], "1.5,2");
    }

    #[test]
    fn test_detected_face_from_analyzer_json() {
        let json = r#"{"box":[10,20,100,120],"embedding":[0.1,0.2],"antispoof":{"score":0.87}}"#;
        let face: DetectedFace = serde_json::from_str(json).unwrap();
        assert_eq!(face.bbox.width, 100.0);
        assert_eq!(face.embedding.len(), 2);
        assert_eq!(face.antispoof_score(), Some(0.87));
    }

    #[test]
    fn test_detected_face_without_antispoof() {
        let json = r#"{"box":[0,0,1,1],"embedding":[0.3]}"#;
        let face: DetectedFace = serde_json::from_str(json).unwrap();
        assert!(face.antispoof_score().is_none());
    }
}
