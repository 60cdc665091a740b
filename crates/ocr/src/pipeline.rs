use std::sync::Arc;
use std::time::{Duration, Instant};

use docsift_core::{clamp_confidence, DocumentType, OcrResult, RecognitionOutput};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::arbiter;
use crate::config::PipelineConfig;
use crate::extract::extract;
use crate::preprocess::{preprocess, DecodeError, Raster};
use crate::recognizer::{
    or_empty, DenseAdapter, DenseEngine, OcrError, PolygonAdapter, PolygonEngine, Recognizer,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Image preprocessing failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("Both recognition adapters failed: {first}; {second}")]
    Recognition { first: OcrError, second: OcrError },
    #[error("Document processing exceeded {0:?}")]
    Timeout(Duration),
    #[error("Worker task failed: {0}")]
    Join(String),
}

impl PipelineError {
    /// Only a timeout is worth retrying; a bad upload stays bad.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Timeout(_))
    }
}

/// Orchestrates: preprocess → two adapters in parallel → arbitrate → extract.
///
/// Cheap to clone; engines are shared behind `Arc` so model state is loaded
/// once and reused by every request.
#[derive(Clone)]
pub struct DocumentProcessor {
    first: Arc<dyn Recognizer>,
    second: Arc<dyn Recognizer>,
    config: Arc<PipelineConfig>,
}

impl DocumentProcessor {
    /// `first` wins confidence ties.
    pub fn new(
        first: Arc<dyn Recognizer>,
        second: Arc<dyn Recognizer>,
        config: PipelineConfig,
    ) -> Self {
        Self { first, second, config: Arc::new(config) }
    }

    /// Dense engine as adapter A, polygon engine as adapter B.
    pub fn from_engines<D, P>(dense: D, polygon: P, config: PipelineConfig) -> Self
    where
        D: DenseEngine + 'static,
        P: PolygonEngine + 'static,
    {
        Self::new(
            Arc::new(DenseAdapter::new(dense)),
            Arc::new(PolygonAdapter::new(polygon)),
            config,
        )
    }

    /// Process one uploaded image. Unknown `document_type` tags fall back to
    /// general extraction.
    pub async fn process_document(
        &self,
        image_bytes: &[u8],
        document_type: &str,
    ) -> Result<OcrResult, PipelineError> {
        let kind = DocumentType::parse_lenient(document_type);
        let run = self.run(image_bytes.to_vec(), kind);
        match self.config.timeout() {
            // Blocking workers already spawned run to completion and are dropped.
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| PipelineError::Timeout(limit))?,
            None => run.await,
        }
    }

    async fn run(&self, data: Vec<u8>, kind: DocumentType) -> Result<OcrResult, PipelineError> {
        let started = Instant::now();
        let preprocess_cfg = self.config.preprocess.clone();
        let raster = tokio::task::spawn_blocking(move || preprocess(&data, &preprocess_cfg))
            .await
            .map_err(|e| PipelineError::Join(e.to_string()))??;
        debug!(
            width = raster.width(),
            height = raster.height(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "preprocessed image"
        );

        let raster = Arc::new(raster);
        let (first, second) = tokio::join!(
            spawn_recognizer(Arc::clone(&self.first), Arc::clone(&raster)),
            spawn_recognizer(Arc::clone(&self.second), Arc::clone(&raster)),
        );
        self.assemble(first, second, kind, started)
    }

    /// Synchronous variant for callers outside a runtime. Adapters still run
    /// concurrently on scoped threads. No timeout is applied.
    pub fn process_blocking(
        &self,
        image_bytes: &[u8],
        document_type: &str,
    ) -> Result<OcrResult, PipelineError> {
        let kind = DocumentType::parse_lenient(document_type);
        let started = Instant::now();
        let raster = preprocess(image_bytes, &self.config.preprocess)?;

        let (first, second) = std::thread::scope(|scope| {
            let a = scope.spawn(|| self.first.try_recognize(&raster));
            let b = scope.spawn(|| self.second.try_recognize(&raster));
            (
                a.join().unwrap_or_else(|_| Err(panicked(self.first.name()))),
                b.join().unwrap_or_else(|_| Err(panicked(self.second.name()))),
            )
        });
        self.assemble(first, second, kind, started)
    }

    fn assemble(
        &self,
        first: Result<RecognitionOutput, OcrError>,
        second: Result<RecognitionOutput, OcrError>,
        kind: DocumentType,
        started: Instant,
    ) -> Result<OcrResult, PipelineError> {
        let (first, second) = match (first, second) {
            (Err(first), Err(second)) => {
                warn!(%first, %second, "both recognition adapters failed");
                return Err(PipelineError::Recognition { first, second });
            }
            (first, second) => (
                or_empty(self.first.name(), first),
                or_empty(self.second.name(), second),
            ),
        };

        let best = arbiter::combine(first, second);
        let extracted_data = extract(&best.full_text, kind);

        info!(
            document_type = %kind,
            confidence = best.average_confidence,
            tokens = best.boxes.len(),
            fields = extracted_data.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "processed document"
        );

        Ok(OcrResult {
            text: best.full_text,
            confidence: clamp_confidence(best.average_confidence),
            bounding_boxes: best.boxes,
            extracted_data,
        })
    }
}

async fn spawn_recognizer(
    recognizer: Arc<dyn Recognizer>,
    raster: Arc<Raster>,
) -> Result<RecognitionOutput, OcrError> {
    let name = recognizer.name();
    tokio::task::spawn_blocking(move || recognizer.try_recognize(&raster))
        .await
        .unwrap_or_else(|_| Err(panicked(name)))
}

fn panicked(name: &str) -> OcrError {
    OcrError::Engine(format!("{name} worker panicked"))
}


// ── Tests ─────────────────────────────────────────────────────────────────────
