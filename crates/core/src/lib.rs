pub mod document;
pub mod fields;
pub mod recognition;

pub use document::{DocumentType, DocumentTypeInfo, UnknownDocumentType, DOCUMENT_TYPES};
pub use fields::{ExtractedFields, FieldValue, OcrResult};
pub use recognition::{
    clamp_confidence, RecognitionOutput, TokenBox, MAX_CONFIDENCE, MIN_CONFIDENCE,
};
