use serde::Deserialize;
use std::time::Duration;

/// Tunables for the preprocessing stage. Defaults mirror the classic
/// fast-NL-means / Gaussian adaptive-threshold settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Images whose longer side exceeds this are downscaled before anything else.
    pub max_dimension: u32,
    /// NL-means filter strength.
    pub denoise_strength: f32,
    /// Side of the square patch compared by NL-means (odd).
    pub denoise_template_window: u32,
    /// Side of the square neighbourhood searched by NL-means (odd).
    pub denoise_search_window: u32,
    /// Gaussian window for the adaptive threshold (odd, >= 3).
    pub threshold_block_size: u32,
    /// Constant subtracted from the local weighted mean.
    pub threshold_c: i32,
    /// Skew angles at or below this (degrees) are left alone.
    pub deskew_deadband_degrees: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_dimension: 2800,
            denoise_strength: 3.0,
            denoise_template_window: 7,
            denoise_search_window: 21,
            threshold_block_size: 11,
            threshold_c: 2,
            deskew_deadband_degrees: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub preprocess: PreprocessConfig,
    /// Budget for one whole `process_document` call. `None` waits indefinitely.
    pub timeout_ms: Option<u64>,
}

impl PipelineConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classic_settings() {
        let cfg = PreprocessConfig::default();
        assert_eq!(cfg.threshold_block_size, 11);
        assert_eq!(cfg.threshold_c, 2);
        assert_eq!(cfg.denoise_template_window, 7);
        assert_eq!(cfg.denoise_search_window, 21);
        assert_eq!(cfg.deskew_deadband_degrees, 0.5);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: PipelineConfig = toml::from_str(
            r#"
            timeout_ms = 30000

            [preprocess]
            threshold_c = 4
            "#,
        )
        .unwrap();
        assert_eq!(cfg.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.preprocess.threshold_c, 4);
        assert_eq!(cfg.preprocess.threshold_block_size, 11);
    }

    #[test]
    fn no_timeout_by_default() {
        assert_eq!(PipelineConfig::default().timeout(), None);
    }
}
