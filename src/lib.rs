//! DeepSecure analysis kernel
//!
//! Media forensics helpers behind the `deepsecure` command line tool.
//!
//! # Architecture
//!
//! A video analysis is a straight pipeline:
//!
//! 1. **Sample**: the upload is spooled to a scoped temp file and decoded; one
//!    frame is kept every `interval` seconds of stream time.
//! 2. **Detect**: a Haar cascade face detector runs on each sampled frame,
//!    optionally across worker threads, with per-frame failure isolation.
//! 3. **Annotate**: frames with faces get a red-boxed PNG copy.
//! 4. **Contact sheet**: all sampled frames are tiled into one captioned PNG.
//! 5. **Score**: a pluggable `Scorer` attaches deepfake and gait verdicts.
//!
//! The verdicts come from a seeded placeholder scorer; nothing here judges
//! whether media is actually synthetic.
//!
//! # Module Structure
//!
//! - `frame`: Frame, BoundingBox, DetectionResult
//! - `ingest`: FrameSampler and container decoders (Y4M, FFmpeg)
//! - `detect`: FaceDetector trait, Haar cascade (OpenCV with `detect-opencv`), lazy loading
//! - `annotate`, `contact_sheet`, `encode`: PNG outputs
//! - `score`: Scorer trait and the seeded reference scorer
//! - `analysis`: video pipeline, image and text analysis
//! - `auth`: SQLite credential store
//! - `config`: file + environment settings

use anyhow::Result;
use rand::RngCore;
use rusqlite::{Connection, OpenFlags};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod analysis;
pub mod annotate;
pub mod auth;
pub mod config;
pub mod contact_sheet;
pub mod detect;
pub mod encode;
pub mod frame;
pub mod ingest;
pub mod score;

pub use analysis::{
    analyze_image, analyze_text, FrameInfo, FrameStatus, ImageAnalysisRecord, PipelineOptions,
    TextAnalysisRecord, VideoAnalysisPipeline, VideoAnalysisRecord,
};
pub use annotate::Annotator;
pub use auth::{AuthError, CredentialStore, RegisterError, SqliteCredentialStore, UserInfo};
pub use config::AnalysisConfig;
pub use contact_sheet::{ContactSheet, ContactSheetBuilder};
pub use detect::{DetectionParams, FaceDetector, HaarDetector, LazyDetector, StubDetector};
#[cfg(feature = "detect-opencv")]
pub use detect::OpenCvHaarDetector;
pub use encode::EncodedImage;
pub use frame::{BoundingBox, DetectionResult, Frame, DEFAULT_FPS};
pub use ingest::{FrameSampler, SampledVideo};
pub use score::{Label, Scorer, SeededScorer, Sentiment, TextVerdict, Verdict, VideoVerdict};

/// A private shared-cache in-memory SQLite URI, unique per call.
pub fn shared_memory_uri() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "file:deepsecure_{:x}?mode=memory&cache=shared",
        u64::from_le_bytes(bytes)
    )
}

pub(crate) fn open_db_connection(db_path: &str) -> Result<Connection> {
    if db_path.starts_with("file:") {
        return Ok(Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?);
    }
    Ok(Connection::open(db_path)?)
}

pub(crate) fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}
