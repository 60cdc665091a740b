pub mod arbiter;
pub mod config;
pub mod extract;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod workers;

pub use arbiter::combine;
pub use config::{PipelineConfig, PreprocessConfig};
pub use extract::{extract, Extractor};
pub use pipeline::{DocumentProcessor, PipelineError};
pub use preprocess::{preprocess, DecodeError, Raster};
pub use recognizer::{
    DenseAdapter, DenseEngine, DenseWord, FixedDenseEngine, FixedPolygonEngine, OcrError,
    PolygonAdapter, PolygonEngine, PolygonRegion, Recognizer, UnavailableEngine,
};
pub use workers::{DenseHandle, DenseWorkerPool};

#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::TesseractEngine;

#[cfg(feature = "onnx")]
pub use recognizer::onnx_backend::OnnxPolygonEngine;
