//! Composition root for the two recognition adapters. A backend that is not
//! compiled in (or not configured) is replaced by an engine that always
//! fails, so the pipeline degrades to the other adapter instead of refusing
//! to start.

use std::sync::Arc;

use docsift_ocr::{DenseAdapter, DocumentProcessor, PolygonAdapter, Recognizer, UnavailableEngine};
use tracing::{error, warn};

use crate::config::ServerConfig;

pub fn build_processor(config: &ServerConfig) -> anyhow::Result<DocumentProcessor> {
    let dense = dense_recognizer(config)?;
    let polygon = polygon_recognizer(config)?;
    if dense.is_none() && polygon.is_none() {
        error!(
            "no recognition engine available; every upload will fail with 502. \
             Build with `--features tesseract,onnx` and set engines.onnx_model_dir"
        );
    }
    let dense = dense.unwrap_or_else(|| {
        warn!("dense adapter disabled (`tesseract` feature off)");
        Arc::new(DenseAdapter::new(UnavailableEngine { feature: "tesseract" }))
    });
    let polygon = polygon.unwrap_or_else(|| {
        warn!("polygon adapter disabled (`onnx` feature off or no model directory)");
        Arc::new(PolygonAdapter::new(UnavailableEngine { feature: "onnx" }))
    });
    Ok(DocumentProcessor::new(dense, polygon, config.pipeline.clone()))
}

#[cfg(feature = "tesseract")]
fn dense_recognizer(config: &ServerConfig) -> anyhow::Result<Option<Arc<dyn Recognizer>>> {
    use anyhow::Context;
    let engines = &config.engines;
    let engine = docsift_ocr::TesseractEngine::new(
        engines.tessdata_path.clone(),
        &engines.tesseract_lang,
        engines.tesseract_workers,
    )
    .context("initialising tesseract")?;
    tracing::info!(
        lang = %engines.tesseract_lang,
        workers = engines.tesseract_workers,
        "dense adapter: tesseract"
    );
    Ok(Some(Arc::new(DenseAdapter::new(engine))))
}

#[cfg(not(feature = "tesseract"))]
fn dense_recognizer(_config: &ServerConfig) -> anyhow::Result<Option<Arc<dyn Recognizer>>> {
    Ok(None)
}

#[cfg(feature = "onnx")]
fn polygon_recognizer(config: &ServerConfig) -> anyhow::Result<Option<Arc<dyn Recognizer>>> {
    use anyhow::Context;
    let Some(dir) = config.engines.onnx_model_dir.as_deref() else {
        return Ok(None);
    };
    let engine = docsift_ocr::OnnxPolygonEngine::from_dir(dir)
        .with_context(|| format!("loading ONNX models from {}", dir.display()))?;
    tracing::info!(model_dir = %dir.display(), "polygon adapter: onnx");
    Ok(Some(Arc::new(PolygonAdapter::new(engine))))
}

#[cfg(not(feature = "onnx"))]
fn polygon_recognizer(_config: &ServerConfig) -> anyhow::Result<Option<Arc<dyn Recognizer>>> {
    Ok(None)
}
