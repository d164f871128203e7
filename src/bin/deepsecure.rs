//! deepsecure - analyse videos, images and text from the command line.
//!
//! Reports are printed to stdout as JSON. Annotated frames and contact sheets
//! are written as PNG files under `--out` and listed in the report.

use anyhow::{anyhow, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde_json::{json, Value};
use std::fs::{self, File};
use std::io::{BufReader, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use deepsecure::config::parse_timeout;
use deepsecure::{
    analyze_image, analyze_text, AnalysisConfig, Annotator, CredentialStore, EncodedImage,
    FaceDetector, LazyDetector, RegisterError, Scorer, SeededScorer, SqliteCredentialStore,
    VideoAnalysisPipeline,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value_t = ui::UiMode::Auto, global = true)]
    ui: ui::UiMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample a video, detect faces per frame and build a contact sheet.
    Video(VideoArgs),
    /// Detect faces in a single still image.
    Image(ImageArgs),
    /// Sentiment and similarity for a block of text.
    Text(TextArgs),
    /// Create a user in the credential store.
    Register(RegisterArgs),
    /// Check a user's credentials.
    Login(LoginArgs),
    /// List registered users, newest first.
    Users(DbArgs),
}

#[derive(ClapArgs, Debug)]
struct DetectorArgs {
    /// Haar cascade XML (overrides DEEPSECURE_CASCADE_PATH)
    #[arg(long, value_name = "PATH")]
    cascade: Option<PathBuf>,
    /// Seed for the placeholder scorer (overrides DEEPSECURE_SCORER_SEED)
    #[arg(long)]
    seed: Option<u64>,
    /// Directory for PNG outputs
    #[arg(long, default_value = "deepsecure_out")]
    out: PathBuf,
}

#[derive(ClapArgs, Debug)]
struct VideoArgs {
    /// Video file (Y4M, or any FFmpeg container with the ingest-ffmpeg feature)
    path: PathBuf,
    /// Seconds between sampled frames (minimum 1)
    #[arg(long)]
    interval: Option<f64>,
    /// Detection worker threads
    #[arg(long)]
    workers: Option<usize>,
    /// Wall-clock budget for face detection, in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<f64>,
    #[command(flatten)]
    detector: DetectorArgs,
}

#[derive(ClapArgs, Debug)]
struct ImageArgs {
    /// Image file (PNG or JPEG)
    path: PathBuf,
    #[command(flatten)]
    detector: DetectorArgs,
}

#[derive(ClapArgs, Debug)]
struct TextArgs {
    /// Text to analyse; read from stdin when omitted
    text: Option<String>,
    /// Seed for the placeholder scorer
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(ClapArgs, Debug)]
struct DbArgs {
    /// SQLite database (overrides DEEPSECURE_DB_PATH)
    #[arg(long)]
    db: Option<String>,
}

#[derive(ClapArgs, Debug)]
struct RegisterArgs {
    #[arg(long)]
    email: String,
    #[arg(long, env = "DEEPSECURE_PASSWORD", hide_env_values = true)]
    password: String,
    #[arg(long, default_value = "")]
    full_name: String,
    #[command(flatten)]
    db: DbArgs,
}

#[derive(ClapArgs, Debug)]
struct LoginArgs {
    #[arg(long)]
    email: String,
    #[arg(long, env = "DEEPSECURE_PASSWORD", hide_env_values = true)]
    password: String,
    #[command(flatten)]
    db: DbArgs,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::new(cli.ui, is_tty, !stdout_is_tty);

    let cfg = AnalysisConfig::load().context("load configuration")?;

    let report = match cli.command {
        Command::Video(args) => run_video(&ui, cfg, args)?,
        Command::Image(args) => run_image(&ui, cfg, args)?,
        Command::Text(args) => run_text(cfg, args)?,
        Command::Register(args) => run_register(cfg, args)?,
        Command::Login(args) => run_login(cfg, args)?,
        Command::Users(args) => {
            let mut store = open_store(&cfg, &args)?;
            serde_json::to_value(store.list_users()?)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn scorer(cfg: &AnalysisConfig, seed: Option<u64>) -> Arc<dyn Scorer> {
    Arc::new(SeededScorer::new(seed.or(cfg.scorer_seed)))
}

fn load_detector(
    ui: &ui::Ui,
    cfg: &AnalysisConfig,
    args: &DetectorArgs,
) -> Result<Arc<dyn FaceDetector>> {
    let path = args
        .cascade
        .clone()
        .unwrap_or_else(|| cfg.cascade_path.clone());
    let _stage = ui.stage("Load face detector");
    let detector = LazyDetector::haar(path.clone(), cfg.detection);
    detector
        .warm_up()
        .with_context(|| format!("cannot use cascade {}", path.display()))?;
    Ok(Arc::new(detector))
}

fn run_video(ui: &ui::Ui, mut cfg: AnalysisConfig, args: VideoArgs) -> Result<Value> {
    if let Some(interval) = args.interval {
        cfg.interval_secs = interval;
    }
    if let Some(workers) = args.workers {
        cfg.workers = workers.max(1);
    }
    if let Some(timeout) = args.timeout {
        cfg.timeout = parse_timeout(timeout, "--timeout")?;
    }

    let detector = load_detector(ui, &cfg, &args.detector)?;
    let pipeline = VideoAnalysisPipeline::new(detector, scorer(&cfg, args.detector.seed))
        .with_contact_sheet(cfg.contact_sheet_builder())
        .with_options(cfg.pipeline_options());

    let file = File::open(&args.path)
        .with_context(|| format!("failed to open {}", args.path.display()))?;
    let record = {
        let mut stage = ui.stage("Analyse video");
        let record = pipeline.run(BufReader::new(file));
        stage.summary(format!("{} frames", record.frames.len()));
        record
    };

    let mut written = Vec::new();
    {
        let _stage = ui.stage("Write images");
        let out = &args.detector.out;
        for frame in record.frames_with_faces() {
            if let Some(image) = &frame.annotated_image {
                let name = format!("frame_{:06}.png", frame.index);
                written.push(write_png(out, &name, image)?);
            }
        }
        if let Some(sheet) = &record.contact_sheet {
            written.push(write_png(out, "contact_sheet.png", &sheet.image)?);
        }
    }

    let mut report = serde_json::to_value(&record)?;
    report["written"] = json!(written);
    Ok(report)
}

fn run_image(ui: &ui::Ui, cfg: AnalysisConfig, args: ImageArgs) -> Result<Value> {
    let bytes =
        fs::read(&args.path).with_context(|| format!("failed to read {}", args.path.display()))?;
    let detector = load_detector(ui, &cfg, &args.detector)?;
    let record = {
        let _stage = ui.stage("Analyse image");
        analyze_image(
            &bytes,
            detector.as_ref(),
            &Annotator::new(),
            scorer(&cfg, args.detector.seed).as_ref(),
        )?
    };

    let mut written = Vec::new();
    if let Some(image) = &record.annotated_image {
        written.push(write_png(&args.detector.out, "annotated.png", image)?);
    }
    let mut report = serde_json::to_value(&record)?;
    report["written"] = json!(written);
    Ok(report)
}

fn run_text(cfg: AnalysisConfig, args: TextArgs) -> Result<Value> {
    let text = match args.text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read text from stdin")?;
            buf
        }
    };
    if text.trim().is_empty() {
        return Err(anyhow!("no text to analyse"));
    }
    let record = analyze_text(&text, scorer(&cfg, args.seed).as_ref());
    Ok(serde_json::to_value(record)?)
}

fn open_store(cfg: &AnalysisConfig, args: &DbArgs) -> Result<SqliteCredentialStore> {
    let db_path = args.db.as_deref().unwrap_or(&cfg.db_path);
    SqliteCredentialStore::open(db_path)
        .with_context(|| format!("failed to open credential store {}", db_path))
}

fn run_register(cfg: AnalysisConfig, args: RegisterArgs) -> Result<Value> {
    let mut store = open_store(&cfg, &args.db)?;
    match store.register(&args.email, &args.password, &args.full_name) {
        Ok(()) => Ok(json!({ "ok": true, "message": "Registration successful." })),
        Err(RegisterError::Store(e)) => Err(e),
        Err(e) => Ok(json!({ "ok": false, "message": e.to_string() })),
    }
}

fn run_login(cfg: AnalysisConfig, args: LoginArgs) -> Result<Value> {
    let mut store = open_store(&cfg, &args.db)?;
    match store.authenticate(&args.email, &args.password) {
        Ok(user) => Ok(json!({ "ok": true, "user": user })),
        Err(deepsecure::AuthError::Store(e)) => Err(e),
        Err(e) => Ok(json!({ "ok": false, "message": e.to_string() })),
    }
}

fn write_png(dir: &Path, name: &str, image: &EncodedImage) -> Result<String> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(name);
    fs::write(&path, &image.png).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path.display().to_string())
}
