use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::{FrameInfo, FrameStatus};
use crate::annotate::Annotator;
use crate::contact_sheet::{ContactSheet, ContactSheetBuilder};
use crate::detect::FaceDetector;
use crate::frame::{DetectionResult, Frame};
use crate::ingest::FrameSampler;
use crate::score::{clamp_percent, Label, Scorer};

/// Knobs for one pipeline run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineOptions {
    /// Seconds between sampled frames (raised to at least 1).
    pub interval_secs: f64,
    /// Detection threads; 0 and 1 both mean "run on the calling thread".
    pub workers: usize,
    /// Wall-clock budget for the detection pass.
    pub timeout: Option<Duration>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            interval_secs: 1.0,
            workers: 1,
            timeout: None,
        }
    }
}

/// Everything one video analysis produced.
#[derive(Debug, Serialize)]
pub struct VideoAnalysisRecord {
    pub verdict: Label,
    pub confidence: f64,
    pub gait_ok: bool,
    pub gait_confidence: f64,
    /// One entry per sampled frame, ascending by index.
    pub frames: Vec<FrameInfo>,
    pub contact_sheet: Option<ContactSheet>,
    pub source_sha256: String,
    pub sample_stride: u64,
    pub source_fps: f64,
    pub interval_secs: f64,
    /// The detection pass hit its deadline; some frames are `timed_out`.
    pub timed_out: bool,
}

impl VideoAnalysisRecord {
    /// Frames that have at least one face.
    pub fn frames_with_faces(&self) -> impl Iterator<Item = &FrameInfo> {
        self.frames.iter().filter(|f| !f.faces.is_empty())
    }
}

/// Sample -> detect (+ annotate) -> contact sheet -> score.
///
/// The detector and scorer are injected; the pipeline owns no global state and
/// can be shared across threads.
pub struct VideoAnalysisPipeline {
    detector: Arc<dyn FaceDetector>,
    scorer: Arc<dyn Scorer>,
    sampler: FrameSampler,
    annotator: Annotator,
    contact_sheet: ContactSheetBuilder,
    options: PipelineOptions,
}

impl VideoAnalysisPipeline {
    pub fn new(detector: Arc<dyn FaceDetector>, scorer: Arc<dyn Scorer>) -> Self {
        Self {
            detector,
            scorer,
            sampler: FrameSampler::new(),
            annotator: Annotator::new(),
            contact_sheet: ContactSheetBuilder::default(),
            options: PipelineOptions::default(),
        }
    }

    pub fn with_sampler(mut self, sampler: FrameSampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_contact_sheet(mut self, builder: ContactSheetBuilder) -> Self {
        self.contact_sheet = builder;
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Analyse one video. Never fails: bad input produces a record with no frames.
    pub fn run<R: Read>(&self, video: R) -> VideoAnalysisRecord {
        let started = Instant::now();
        let sampled = self.sampler.sample(video, self.options.interval_secs);
        let sampled_frames = Arc::new(sampled.frames);

        let (frames, timed_out) = self.detect_all(&sampled_frames);

        let contact_sheet = match self.contact_sheet.build(&sampled_frames) {
            Ok(sheet) => sheet,
            Err(e) => {
                log::warn!("contact sheet skipped: {:#}", e);
                None
            }
        };

        let scores = self.scorer.score_video(&sampled_frames);
        let faces: usize = frames.iter().map(|f| f.faces.len()).sum();
        log::info!(
            "video analysed in {:?}: {} frames, {} faces, verdict {} ({:.1}%){}",
            started.elapsed(),
            frames.len(),
            faces,
            scores.deepfake.verdict,
            scores.deepfake.confidence,
            if timed_out { ", timed out" } else { "" }
        );

        VideoAnalysisRecord {
            verdict: scores.deepfake.verdict,
            confidence: clamp_percent(scores.deepfake.confidence),
            gait_ok: scores.gait_ok,
            gait_confidence: clamp_percent(scores.gait_confidence),
            frames,
            contact_sheet,
            source_sha256: sampled.source_sha256,
            sample_stride: sampled.stride,
            source_fps: sampled.fps,
            interval_secs: sampled.interval_secs,
            timed_out,
        }
    }

    /// Per-frame detection results in input order, and whether the deadline hit.
    ///
    /// Worker threads are detached. When the deadline passes this returns at once;
    /// a worker stuck inside the detector finishes (or hangs) on its own and its
    /// late result is dropped.
    fn detect_all(&self, frames: &Arc<Vec<Frame>>) -> (Vec<FrameInfo>, bool) {
        let workers = self.options.workers.max(1).min(frames.len().max(1));
        let deadline = self
            .options
            .timeout
            .and_then(|t| Instant::now().checked_add(t));
        if workers == 1 && deadline.is_none() {
            return (self.detect_inline(frames), false);
        }

        let next = Arc::new(AtomicUsize::new(0));
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<(usize, FrameInfo)>();
        let mut spawned = 0;
        for worker in 0..workers {
            let job = DetectJob {
                detector: Arc::clone(&self.detector),
                annotator: self.annotator,
                frames: Arc::clone(frames),
                next: Arc::clone(&next),
                cancel: Arc::clone(&cancel),
                tx: tx.clone(),
            };
            match thread::Builder::new()
                .name(format!("deepsecure-detect-{}", worker))
                .spawn(move || job.run())
            {
                Ok(_) => spawned += 1,
                Err(e) => log::warn!("could not start detection worker {}: {}", worker, e),
            }
        }
        drop(tx);
        if spawned == 0 {
            return (self.detect_inline(frames), false);
        }

        let mut slots: Vec<Option<FrameInfo>> = (0..frames.len()).map(|_| None).collect();
        let mut timed_out = false;
        loop {
            let received = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        Err(RecvTimeoutError::Timeout)
                    } else {
                        rx.recv_timeout(left)
                    }
                }
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok((pos, info)) => slots[pos] = Some(info),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    timed_out = true;
                    break;
                }
            }
        }
        cancel.store(true, Ordering::Relaxed);

        timed_out &= slots.iter().any(Option::is_none);
        if timed_out {
            let missing = slots.iter().filter(|s| s.is_none()).count();
            log::warn!(
                "detection deadline passed; {} of {} frames timed out",
                missing,
                frames.len()
            );
        }

        let infos = slots
            .into_iter()
            .zip(frames.iter())
            .map(|(slot, frame)| match slot {
                Some(info) => info,
                None if timed_out => FrameInfo::timed_out(frame),
                None => FrameInfo::failed(frame),
            })
            .collect();
        (infos, timed_out)
    }

    fn detect_inline(&self, frames: &[Frame]) -> Vec<FrameInfo> {
        frames
            .iter()
            .map(|f| process_frame(self.detector.as_ref(), &self.annotator, f))
            .collect()
    }
}

/// State one detached detection worker owns.
struct DetectJob {
    detector: Arc<dyn FaceDetector>,
    annotator: Annotator,
    frames: Arc<Vec<Frame>>,
    next: Arc<AtomicUsize>,
    cancel: Arc<AtomicBool>,
    tx: mpsc::Sender<(usize, FrameInfo)>,
}

impl DetectJob {
    fn run(self) {
        while !self.cancel.load(Ordering::Relaxed) {
            let pos = self.next.fetch_add(1, Ordering::Relaxed);
            let Some(frame) = self.frames.get(pos) else {
                break;
            };
            let info = process_frame(self.detector.as_ref(), &self.annotator, frame);
            // The collector is gone once the deadline has passed.
            if self.tx.send((pos, info)).is_err() {
                break;
            }
        }
    }
}

/// Detect and annotate one frame. Errors and panics stay inside this frame.
fn process_frame(detector: &dyn FaceDetector, annotator: &Annotator, frame: &Frame) -> FrameInfo {
    let detected = panic::catch_unwind(AssertUnwindSafe(|| detector.detect(frame)));
    let detection = match detected {
        Ok(Ok(faces)) => DetectionResult::for_frame(frame, faces),
        Ok(Err(e)) => {
            log::warn!("frame {}: detection failed: {:#}", frame.index(), e);
            return FrameInfo::failed(frame);
        }
        Err(_) => {
            log::warn!("frame {}: detector panicked", frame.index());
            return FrameInfo::failed(frame);
        }
    };

    let annotated_image = if detection.is_empty() {
        None
    } else {
        match annotator.annotate(frame, &detection.faces) {
            Ok(image) => Some(image),
            Err(e) => {
                log::warn!("frame {}: annotation failed: {:#}", frame.index(), e);
                None
            }
        }
    };
    log::debug!(
        "frame {} @ {:.2}s: {} face(s)",
        detection.index,
        detection.timestamp,
        detection.faces.len()
    );

    FrameInfo {
        index: detection.index,
        timestamp: detection.timestamp,
        faces: detection.faces,
        annotated_image,
        status: FrameStatus::Detected,
    }
}
