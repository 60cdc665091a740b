use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Document-type hint that selects the field-extraction ruleset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    Receipt,
    Contract,
    #[default]
    General,
}

impl DocumentType {
    pub const ALL: [DocumentType; 4] = [
        DocumentType::Invoice,
        DocumentType::Receipt,
        DocumentType::Contract,
        DocumentType::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::Receipt => "receipt",
            DocumentType::Contract => "contract",
            DocumentType::General => "general",
        }
    }

    /// Map a caller-supplied tag onto a document type.
    /// Anything unrecognized routes to `General`; this never fails.
    pub fn parse_lenient(tag: &str) -> Self {
        tag.parse().unwrap_or(DocumentType::General)
    }

    /// Catalog entry for this type.
    pub fn info(self) -> &'static DocumentTypeInfo {
        DOCUMENT_TYPES
            .iter()
            .find(|info| info.kind == self)
            .unwrap_or(&DOCUMENT_TYPES[DOCUMENT_TYPES.len() - 1])
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown document type: '{0}'")]
pub struct UnknownDocumentType(pub String);

impl std::str::FromStr for DocumentType {
    type Err = UnknownDocumentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "invoice" => Ok(DocumentType::Invoice),
            "receipt" => Ok(DocumentType::Receipt),
            "contract" => Ok(DocumentType::Contract),
            "general" => Ok(DocumentType::General),
            other => Err(UnknownDocumentType(other.to_string())),
        }
    }
}

/// One row of the static capability catalog.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentTypeInfo {
    #[serde(rename = "type")]
    pub kind: DocumentType,
    pub description: &'static str,
    pub credits_required: u32,
}

pub const DOCUMENT_TYPES: &[DocumentTypeInfo] = &[
    DocumentTypeInfo {
        kind: DocumentType::Invoice,
        description: "Business invoices with vendor, amounts, and dates",
        credits_required: 5,
    },
    DocumentTypeInfo {
        kind: DocumentType::Receipt,
        description: "Purchase receipts and transaction records",
        credits_required: 3,
    },
    DocumentTypeInfo {
        kind: DocumentType::Contract,
        description: "Legal contracts and agreements",
        credits_required: 8,
    },
    DocumentTypeInfo {
        kind: DocumentType::General,
        description: "General document text extraction",
        credits_required: 2,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn display_roundtrip() {
        for kind in DocumentType::ALL {
            assert_eq!(DocumentType::from_str(&kind.to_string()).unwrap(), kind);
        }
    }

    #[test]
    fn strict_parse_rejects_unknown() {
        assert_eq!(
            DocumentType::from_str("passport"),
            Err(UnknownDocumentType("passport".into()))
        );
    }

    #[test]
    fn lenient_parse_falls_back_to_general() {
        assert_eq!(DocumentType::parse_lenient("passport"), DocumentType::General);
        assert_eq!(DocumentType::parse_lenient(""), DocumentType::General);
        assert_eq!(DocumentType::parse_lenient("  Invoice "), DocumentType::Invoice);
        assert_eq!(DocumentType::parse_lenient("RECEIPT"), DocumentType::Receipt);
    }

    #[test]
    fn catalog_covers_every_type() {
        for kind in DocumentType::ALL {
            assert_eq!(kind.info().kind, kind);
        }
        assert_eq!(DocumentType::Contract.info().credits_required, 8);
    }

    #[test]
    fn catalog_serializes_type_tag() {
        let json = serde_json::to_value(DocumentType::Invoice.info()).unwrap();
        assert_eq!(json["type"], "invoice");
        assert_eq!(json["credits_required"], 5);
    }
}
