use docsift_core::{RecognitionOutput, TokenBox};
use thiserror::Error;
use tracing::{debug, warn};

use crate::preprocess::Raster;

#[derive(Debug, Clone, Error)]
pub enum OcrError {
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Failed to encode raster for the engine: {0}")]
    ImageEncode(String),
    #[error("Failed to load OCR model: {0}")]
    ModelLoad(String),
    #[error("OCR backend not available, build with the `{0}` feature")]
    NotAvailable(&'static str),
}

/// Dense-engine confidences are 0–100; tokens at or below this are dropped.
pub const DENSE_MIN_CONFIDENCE: f32 = 30.0;
/// Polygon-engine confidences are 0–1; tokens at or below this are dropped.
pub const POLYGON_MIN_CONFIDENCE: f32 = 0.3;

/// One row of a dense line/word engine's output (Tesseract-style).
#[derive(Debug, Clone, PartialEq)]
pub struct DenseWord {
    pub text: String,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    /// 0–100, or negative for rows that are not words.
    pub confidence: f32,
}

/// One detected region of a polygon engine (quadrilateral boxes, 0–1 scores).
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonRegion {
    pub quad: [(f32, f32); 4],
    pub text: String,
    pub confidence: f32,
}

/// Raw engine producing word rows with axis-aligned boxes.
pub trait DenseEngine: Send + Sync {
    fn read_words(&self, raster: &Raster) -> Result<Vec<DenseWord>, OcrError>;
}

/// Raw engine producing free-form quadrilateral regions.
pub trait PolygonEngine: Send + Sync {
    fn read_regions(&self, raster: &Raster) -> Result<Vec<PolygonRegion>, OcrError>;
}

/// A recognition backend as seen by the pipeline.
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn try_recognize(&self, raster: &Raster) -> Result<RecognitionOutput, OcrError>;

    /// Convenience for running one adapter on its own. Never fails: any
    /// engine error is logged and replaced by an empty output.
    fn recognize(&self, raster: &Raster) -> RecognitionOutput {
        or_empty(self.name(), self.try_recognize(raster))
    }
}

/// A failed adapter run degrades to an empty output.
pub fn or_empty(adapter: &str, result: Result<RecognitionOutput, OcrError>) -> RecognitionOutput {
    result.unwrap_or_else(|e| {
        warn!(adapter, error = %e, "recognition failed, using empty output");
        RecognitionOutput::empty()
    })
}

// ── Adapter A: dense words ────────────────────────────────────────────────────

pub struct DenseAdapter<E> {
    engine: E,
}

impl<E: DenseEngine> DenseAdapter<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }
}

impl<E: DenseEngine> Recognizer for DenseAdapter<E> {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn try_recognize(&self, raster: &Raster) -> Result<RecognitionOutput, OcrError> {
        let words = self.engine.read_words(raster)?;
        let total = words.len();
        let kept: Vec<TokenBox> = words
            .into_iter()
            .filter(|w| w.confidence > DENSE_MIN_CONFIDENCE)
            .filter_map(|w| {
                let text = w.text.trim();
                if text.is_empty() {
                    return None;
                }
                Some(TokenBox::new(text, w.left, w.top, w.width, w.height, w.confidence))
            })
            .collect();
        debug!(adapter = "dense", total, kept = kept.len(), "filtered tokens");
        Ok(RecognitionOutput::from_tokens(kept))
    }
}

// ── Adapter B: polygon regions ────────────────────────────────────────────────

pub struct PolygonAdapter<E> {
    engine: E,
}

impl<E: PolygonEngine> PolygonAdapter<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }
}

impl<E: PolygonEngine> Recognizer for PolygonAdapter<E> {
    fn name(&self) -> &'static str {
        "polygon"
    }

    fn try_recognize(&self, raster: &Raster) -> Result<RecognitionOutput, OcrError> {
        let regions = self.engine.read_regions(raster)?;
        let total = regions.len();
        let kept: Vec<TokenBox> = regions
            .into_iter()
            .filter(|r| r.confidence > POLYGON_MIN_CONFIDENCE)
            .map(|r| {
                let (x, y, width, height) = quad_to_rect(&r.quad);
                TokenBox::new(r.text, x, y, width, height, r.confidence * 100.0)
            })
            .collect();
        debug!(adapter = "polygon", total, kept = kept.len(), "filtered tokens");
        Ok(RecognitionOutput::from_tokens(kept))
    }
}

/// Axis-aligned `(x, y, width, height)` of a quadrilateral, truncated to integers.
pub fn quad_to_rect(quad: &[(f32, f32); 4]) -> (i32, i32, i32, i32) {
    let min_x = quad.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
    let max_x = quad.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
    let min_y = quad.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
    let max_y = quad.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);
    (
        min_x as i32,
        min_y as i32,
        (max_x - min_x) as i32,
        (max_y - min_y) as i32,
    )
}

// ── Fixed engines (always available, used for tests and demos) ────────────────

/// Returns a preset word list regardless of the raster.
pub struct FixedDenseEngine {
    pub words: Vec<DenseWord>,
}

impl FixedDenseEngine {
    pub fn new(words: Vec<DenseWord>) -> Self {
        Self { words }
    }
}

impl DenseEngine for FixedDenseEngine {
    fn read_words(&self, _raster: &Raster) -> Result<Vec<DenseWord>, OcrError> {
        Ok(self.words.clone())
    }
}

/// Returns a preset region list regardless of the raster.
pub struct FixedPolygonEngine {
    pub regions: Vec<PolygonRegion>,
}

impl FixedPolygonEngine {
    pub fn new(regions: Vec<PolygonRegion>) -> Self {
        Self { regions }
    }
}

impl PolygonEngine for FixedPolygonEngine {
    fn read_regions(&self, _raster: &Raster) -> Result<Vec<PolygonRegion>, OcrError> {
        Ok(self.regions.clone())
    }
}

/// Stands in for a backend that was not compiled in.
pub struct UnavailableEngine {
    pub feature: &'static str,
}

impl DenseEngine for UnavailableEngine {
    fn read_words(&self, _raster: &Raster) -> Result<Vec<DenseWord>, OcrError> {
        Err(OcrError::NotAvailable(self.feature))
    }
}

impl PolygonEngine for UnavailableEngine {
    fn read_regions(&self, _raster: &Raster) -> Result<Vec<PolygonRegion>, OcrError> {
        Err(OcrError::NotAvailable(self.feature))
    }
}

// ── Tesseract TSV ─────────────────────────────────────────────────────────────

/// Parse Tesseract's TSV word table
/// (`level page block par line word left top width height conf text`).
/// Header and malformed rows are skipped.
pub fn parse_tesseract_tsv(tsv: &str) -> Vec<DenseWord> {
    tsv.lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 11 {
                return None;
            }
            let num = |i: usize| cols[i].trim().parse::<i32>().ok();
            Some(DenseWord {
                left: num(6)?,
                top: num(7)?,
                width: num(8)?,
                height: num(9)?,
                confidence: cols[10].trim().parse::<f32>().ok()?,
                text: cols.get(11).copied().unwrap_or("").to_string(),
            })
        })
        .collect()
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{parse_tesseract_tsv, DenseEngine, DenseWord, OcrError};
    use crate::preprocess::Raster;
    use crate::workers::{DenseHandle, DenseWorkerPool};
    use leptess::LepTess;

    struct TesseractHandle(LepTess);

    impl DenseHandle for TesseractHandle {
        fn read_words(&mut self, raster: &Raster) -> Result<Vec<DenseWord>, OcrError> {
            let png = raster.to_png().map_err(|e| OcrError::ImageEncode(e.to_string()))?;
            self.0
                .set_image_from_mem(&png)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            let tsv = self.0.get_tsv_text(0).map_err(|e| OcrError::Engine(e.to_string()))?;
            Ok(parse_tesseract_tsv(&tsv))
        }
    }

    /// Tesseract handles are not thread-safe, so each one lives on its own
    /// worker thread. Language data is loaded once per worker, up front.
    pub struct TesseractEngine {
        pool: DenseWorkerPool,
    }

    impl TesseractEngine {
        pub fn new(
            data_path: Option<String>,
            lang: &str,
            workers: usize,
        ) -> Result<Self, OcrError> {
            let lang = lang.to_string();
            let pool = DenseWorkerPool::spawn("tesseract", workers, move || {
                LepTess::new(data_path.as_deref(), &lang)
                    .map(TesseractHandle)
                    .map_err(|e| OcrError::ModelLoad(e.to_string()))
            })?;
            Ok(Self { pool })
        }
    }

    impl DenseEngine for TesseractEngine {
        fn read_words(&self, raster: &Raster) -> Result<Vec<DenseWord>, OcrError> {
            self.pool.read_words(raster)
        }
    }
}

// ── ONNX polygon backend (optional, gated behind `onnx` feature) ──────────────

#[cfg(feature = "onnx")]
pub mod onnx_backend {
    use super::{OcrError, PolygonEngine, PolygonRegion};
    use crate::preprocess::Raster;
    use image::DynamicImage;
    use std::path::Path;
    use std::sync::Mutex;
    use tracing::info;

    pub struct OnnxPolygonEngine {
        engine: Mutex<pure_onnx_ocr::engine::OcrEngine>,
    }

    impl OnnxPolygonEngine {
        /// Loads `det.onnx`, `rec.onnx` and `dict.txt` from `model_dir`.
        pub fn from_dir(model_dir: &Path) -> Result<Self, OcrError> {
            let engine = pure_onnx_ocr::engine::OcrEngineBuilder::new()
                .det_model_path(&model_dir.join("det.onnx"))
                .rec_model_path(&model_dir.join("rec.onnx"))
                .dictionary_path(&model_dir.join("dict.txt"))
                .build()
                .map_err(|e| OcrError::ModelLoad(e.to_string()))?;
            info!("Loaded ONNX OCR models from {}", model_dir.display());
            Ok(Self { engine: Mutex::new(engine) })
        }
    }

    impl PolygonEngine for OnnxPolygonEngine {
        fn read_regions(&self, raster: &Raster) -> Result<Vec<PolygonRegion>, OcrError> {
            let image = DynamicImage::ImageLuma8(raster.as_image().clone());
            let engine = self
                .engine
                .lock()
                .map_err(|_| OcrError::Engine("ONNX engine lock poisoned".into()))?;
            let results = engine
                .run_from_image(&image)
                .map_err(|e| OcrError::Engine(e.to_string()))?;

            Ok(results
                .iter()
                .map(|r| {
                    let mut quad = [(0f32, 0f32); 4];
                    for (i, c) in r.bounding_box.exterior().coords().take(4).enumerate() {
                        quad[i] = (c.x as f32, c.y as f32);
                    }
                    PolygonRegion { quad, text: r.text.clone(), confidence: r.confidence as f32 }
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageBuffer, Luma};

    fn raster() -> Raster {
        let img: GrayImage = ImageBuffer::from_fn(4, 4, |_, _| Luma([255u8]));
        Raster::new(img).unwrap()
    }

    fn word(text: &str, confidence: f32) -> DenseWord {
        DenseWord { text: text.into(), left: 1, top: 2, width: 3, height: 4, confidence }
    }

    fn region(text: &str, confidence: f32) -> PolygonRegion {
        PolygonRegion {
            quad: [(10.7, 5.2), (50.9, 6.0), (51.3, 20.8), (9.9, 19.5)],
            text: text.into(),
            confidence,
        }
    }

    struct FailingEngine;

    impl DenseEngine for FailingEngine {
        fn read_words(&self, _raster: &Raster) -> Result<Vec<DenseWord>, OcrError> {
            Err(OcrError::Engine("boom".into()))
        }
    }

    #[test]
    fn dense_filters_low_confidence_and_blank_words() {
        let adapter = DenseAdapter::new(FixedDenseEngine::new(vec![
            word("", -1.0),
            word("ACME", 96.0),
            word("noise", 30.0),
            word("   ", 88.0),
            word(" Corp ", 80.0),
        ]));
        let out = adapter.try_recognize(&raster()).unwrap();
        assert_eq!(out.full_text, "ACME Corp");
        assert_eq!(out.average_confidence, 88.0);
        assert_eq!(out.boxes[1].text, "Corp");
        assert_eq!(out.boxes[1].x, 1);
    }

    #[test]
    fn dense_with_nothing_surviving_is_empty() {
        let adapter = DenseAdapter::new(FixedDenseEngine::new(vec![word("faint", 12.0)]));
        assert_eq!(adapter.recognize(&raster()), RecognitionOutput::empty());
    }

    #[test]
    fn polygon_rescales_confidence() {
        let adapter = PolygonAdapter::new(FixedPolygonEngine::new(vec![
            region("Total", 0.9),
            region("smudge", 0.3),
            region("$5.50", 0.7),
        ]));
        let out = adapter.try_recognize(&raster()).unwrap();
        assert_eq!(out.full_text, "Total $5.50");
        assert!((out.average_confidence - 80.0).abs() < 1e-4);
        assert!((out.boxes[0].confidence - 90.0).abs() < 1e-4);
    }

    #[test]
    fn polygon_boxes_are_axis_aligned() {
        let adapter = PolygonAdapter::new(FixedPolygonEngine::new(vec![region("x", 0.5)]));
        let b = &adapter.try_recognize(&raster()).unwrap().boxes[0];
        assert_eq!((b.x, b.y, b.width, b.height), (9, 5, 41, 15));
    }

    #[test]
    fn quad_to_rect_truncates() {
        let quad = [(0.0, 0.0), (10.9, 0.0), (10.9, 4.99), (0.0, 4.99)];
        assert_eq!(quad_to_rect(&quad), (0, 0, 10, 4));
    }

    #[test]
    fn failure_is_absorbed_by_recognize() {
        let adapter = DenseAdapter::new(FailingEngine);
        assert!(adapter.try_recognize(&raster()).is_err());
        assert_eq!(adapter.recognize(&raster()), RecognitionOutput::empty());
    }

    #[test]
    fn unavailable_engine_reports_feature() {
        let adapter = PolygonAdapter::new(UnavailableEngine { feature: "onnx" });
        let err = adapter.try_recognize(&raster()).unwrap_err();
        assert!(err.to_string().contains("onnx"));
    }

    #[test]
    fn parses_tesseract_tsv_rows() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
                   1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t\n\
                   5\t1\t1\t1\t1\t1\t36\t92\t120\t18\t95.512\tInvoice\n\
                   5\t1\t1\t1\t1\t2\t170\t92\t90\t18\t41\t#INV-7\n\
                   garbage line\n";
        let words = parse_tesseract_tsv(tsv);
        assert_eq!(words.len(), 3);
        assert_eq!(words[0].confidence, -1.0);
        assert_eq!(words[0].text, "");
        assert_eq!(words[1].text, "Invoice");
        let w = &words[1];
        assert_eq!((w.left, w.top, w.width, w.height), (36, 92, 120, 18));
        assert_eq!(words[2].confidence, 41.0);
    }

    #[test]
    fn tsv_feeds_dense_adapter() {
        let tsv = "5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t90\tHello\n\
                   5\t1\t1\t1\t1\t2\t12\t0\t10\t10\t20\tx\n";
        let adapter = DenseAdapter::new(FixedDenseEngine::new(parse_tesseract_tsv(tsv)));
        assert_eq!(adapter.recognize(&raster()).full_text, "Hello");
    }
}
