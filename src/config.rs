use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::PipelineOptions;
use crate::contact_sheet::{ContactSheetBuilder, DEFAULT_MAX_COLUMNS, DEFAULT_THUMBNAIL_WIDTH};
use crate::detect::DetectionParams;

const DEFAULT_DB_PATH: &str = "users.db";
const DEFAULT_CASCADE_PATH: &str = "haarcascade_frontalface_default.xml";
const DEFAULT_INTERVAL_SECS: f64 = 1.0;
const DEFAULT_WORKERS: usize = 1;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AnalysisConfigFile {
    db_path: Option<String>,
    detector: Option<DetectorConfigFile>,
    sampling: Option<SamplingConfigFile>,
    contact_sheet: Option<ContactSheetConfigFile>,
    pipeline: Option<PipelineConfigFile>,
    scorer: Option<ScorerConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    cascade_path: Option<PathBuf>,
    scale_factor: Option<f64>,
    min_neighbors: Option<u32>,
    min_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplingConfigFile {
    interval_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct ContactSheetConfigFile {
    max_columns: Option<u32>,
    thumbnail_width: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    workers: Option<usize>,
    timeout_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct ScorerConfigFile {
    seed: Option<u64>,
}

/// Runtime settings: defaults, then the file named by `DEEPSECURE_CONFIG`,
/// then `DEEPSECURE_*` environment overrides.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub db_path: String,
    pub cascade_path: PathBuf,
    pub detection: DetectionParams,
    pub interval_secs: f64,
    pub max_columns: u32,
    pub thumbnail_width: u32,
    pub workers: usize,
    pub timeout: Option<Duration>,
    /// `None` seeds the scorer from entropy.
    pub scorer_seed: Option<u64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            cascade_path: PathBuf::from(DEFAULT_CASCADE_PATH),
            detection: DetectionParams::default(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            max_columns: DEFAULT_MAX_COLUMNS,
            thumbnail_width: DEFAULT_THUMBNAIL_WIDTH,
            workers: DEFAULT_WORKERS,
            timeout: None,
            scorer_seed: None,
        }
    }
}

impl AnalysisConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DEEPSECURE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AnalysisConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let detector = file.detector.unwrap_or_default();
        let pipeline = file.pipeline.unwrap_or_default();
        let sheet = file.contact_sheet.unwrap_or_default();

        let timeout = pipeline
            .timeout_secs
            .map(|secs| parse_timeout(secs, "pipeline.timeout_secs"))
            .transpose()?
            .flatten();

        Ok(Self {
            db_path: file.db_path.unwrap_or(defaults.db_path),
            cascade_path: detector.cascade_path.unwrap_or(defaults.cascade_path),
            detection: DetectionParams {
                scale_factor: detector
                    .scale_factor
                    .unwrap_or(defaults.detection.scale_factor),
                min_neighbors: detector
                    .min_neighbors
                    .unwrap_or(defaults.detection.min_neighbors),
                min_size: detector.min_size.unwrap_or(defaults.detection.min_size),
            },
            interval_secs: file
                .sampling
                .and_then(|sampling| sampling.interval_secs)
                .unwrap_or(defaults.interval_secs),
            max_columns: sheet.max_columns.unwrap_or(defaults.max_columns),
            thumbnail_width: sheet.thumbnail_width.unwrap_or(defaults.thumbnail_width),
            workers: pipeline.workers.unwrap_or(defaults.workers),
            timeout,
            scorer_seed: file.scorer.and_then(|scorer| scorer.seed),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("DEEPSECURE_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(path) = std::env::var("DEEPSECURE_CASCADE_PATH") {
            if !path.trim().is_empty() {
                self.cascade_path = PathBuf::from(path);
            }
        }
        if let Ok(interval) = std::env::var("DEEPSECURE_SAMPLE_INTERVAL") {
            self.interval_secs = interval.trim().parse().map_err(|_| {
                anyhow!("DEEPSECURE_SAMPLE_INTERVAL must be a number of seconds")
            })?;
        }
        if let Ok(workers) = std::env::var("DEEPSECURE_WORKERS") {
            self.workers = workers
                .trim()
                .parse()
                .map_err(|_| anyhow!("DEEPSECURE_WORKERS must be a non-negative integer"))?;
        }
        if let Ok(timeout) = std::env::var("DEEPSECURE_TIMEOUT_SECS") {
            let secs: f64 = timeout
                .trim()
                .parse()
                .map_err(|_| anyhow!("DEEPSECURE_TIMEOUT_SECS must be a number of seconds"))?;
            self.timeout = parse_timeout(secs, "DEEPSECURE_TIMEOUT_SECS")?;
        }
        if let Ok(seed) = std::env::var("DEEPSECURE_SCORER_SEED") {
            self.scorer_seed = Some(
                seed.trim()
                    .parse()
                    .map_err(|_| anyhow!("DEEPSECURE_SCORER_SEED must be an unsigned integer"))?,
            );
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.detection.validate()?;
        if !self.interval_secs.is_finite() || self.interval_secs <= 0.0 {
            return Err(anyhow!(
                "sampling interval must be greater than zero (got {})",
                self.interval_secs
            ));
        }
        if self.max_columns == 0 {
            return Err(anyhow!("contact sheet max_columns must be at least 1"));
        }
        if self.thumbnail_width == 0 {
            return Err(anyhow!("contact sheet thumbnail_width must be at least 1"));
        }
        self.workers = self.workers.max(1);
        Ok(())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            interval_secs: self.interval_secs,
            workers: self.workers,
            timeout: self.timeout,
        }
    }

    pub fn contact_sheet_builder(&self) -> ContactSheetBuilder {
        ContactSheetBuilder::new(self.max_columns, self.thumbnail_width)
    }
}

/// Zero disables the timeout; negative, non-finite or unrepresentable values are rejected.
pub fn parse_timeout(secs: f64, what: &str) -> Result<Option<Duration>> {
    if secs == 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|_| anyhow!("{} must be a non-negative number of seconds", what))
}

fn read_config_file(path: &Path) -> Result<AnalysisConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
