use serde::{Deserialize, Serialize};

pub const MIN_CONFIDENCE: f32 = 0.0;
pub const MAX_CONFIDENCE: f32 = 100.0;

/// A recognized token with its axis-aligned box.
/// `confidence` is on the 0–100 scale regardless of which engine produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenBox {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: f32,
}

impl TokenBox {
    pub fn new(
        text: impl Into<String>,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        confidence: f32,
    ) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            width,
            height,
            confidence: clamp_confidence(confidence),
        }
    }
}

/// Output of one recognition adapter invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RecognitionOutput {
    pub full_text: String,
    pub average_confidence: f32,
    /// Reading order as emitted by the engine.
    pub boxes: Vec<TokenBox>,
}

impl RecognitionOutput {
    /// `("", 0, [])`: what a failed or fully filtered-out adapter yields.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an output from the surviving tokens: space-joined text and the
    /// arithmetic mean of their confidences (0 when nothing survived).
    pub fn from_tokens(boxes: Vec<TokenBox>) -> Self {
        if boxes.is_empty() {
            return Self::empty();
        }
        let full_text = boxes
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let sum: f32 = boxes.iter().map(|b| b.confidence).sum();
        let average_confidence = clamp_confidence(sum / boxes.len() as f32);
        Self {
            full_text,
            average_confidence,
            boxes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.full_text.is_empty() && self.boxes.is_empty()
    }
}

pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        return MIN_CONFIDENCE;
    }
    value.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_box_clamps_confidence() {
        assert_eq!(TokenBox::new("a", 0, 0, 1, 1, 130.0).confidence, 100.0);
        assert_eq!(TokenBox::new("a", 0, 0, 1, 1, -4.0).confidence, 0.0);
        assert_eq!(TokenBox::new("a", 0, 0, 1, 1, f32::NAN).confidence, 0.0);
    }

    #[test]
    fn from_tokens_joins_and_averages() {
        let out = RecognitionOutput::from_tokens(vec![
            TokenBox::new("Invoice", 10, 10, 60, 12, 90.0),
            TokenBox::new("#42", 75, 10, 25, 12, 70.0),
        ]);
        assert_eq!(out.full_text, "Invoice #42");
        assert_eq!(out.average_confidence, 80.0);
        assert_eq!(out.boxes.len(), 2);
    }

    #[test]
    fn from_no_tokens_is_empty() {
        let out = RecognitionOutput::from_tokens(vec![]);
        assert_eq!(out, RecognitionOutput::empty());
        assert!(out.is_empty());
        assert_eq!(out.average_confidence, 0.0);
    }
}
