use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::recognition::TokenBox;

/// A single extracted value. Shape depends on the field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        FieldValue::List(items)
    }
}

/// Field name → value. Keys vary by document type; absent means "not found".
pub type ExtractedFields = BTreeMap<String, FieldValue>;

/// The complete result of processing one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OcrResult {
    pub text: String,
    /// 0–100.
    pub confidence: f32,
    pub bounding_boxes: Vec<TokenBox>,
    pub extracted_data: ExtractedFields,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_value_serializes_untagged() {
        let mut fields = ExtractedFields::new();
        fields.insert("invoice_number".into(), "INV-1".into());
        fields.insert("total_amount".into(), 1250.0.into());
        fields.insert("emails".into(), vec!["a@b.com".to_string()].into());

        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["invoice_number"], "INV-1");
        assert_eq!(json["total_amount"], 1250.0);
        assert_eq!(json["emails"][0], "a@b.com");
    }

    #[test]
    fn accessors_match_variant() {
        assert_eq!(FieldValue::from("x").as_text(), Some("x"));
        assert_eq!(FieldValue::from(2.5).as_number(), Some(2.5));
        assert!(FieldValue::from(2.5).as_text().is_none());
        assert_eq!(
            FieldValue::from(vec!["a".to_string()]).as_list(),
            Some(&["a".to_string()][..])
        );
    }
}
