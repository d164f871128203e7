use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fmt::Display;
use std::time::{Duration, Instant};

/// How stage progress is shown on stderr.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum UiMode {
    /// Spinner on a terminal, plain lines otherwise.
    #[default]
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    /// Stdout is piped; spinners would interleave with the JSON report.
    stdout_piped: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, stdout_piped: bool) -> Self {
        Self {
            mode,
            is_tty,
            stdout_piped,
        }
    }

    fn pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.stdout_piped,
                UiMode::Plain => false,
            }
    }

    /// Start a named stage. It is reported finished when the guard drops.
    pub fn stage(&self, name: &str) -> Stage {
        if self.pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}..."));
            Stage::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            Stage::new(name.to_string(), None)
        }
    }
}

pub struct Stage {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    summary: Option<String>,
}

impl Stage {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
            summary: None,
        }
    }

    /// Short result shown next to the stage name when it finishes.
    pub fn summary(&mut self, summary: impl Display) {
        self.summary = Some(summary.to_string());
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        let elapsed = format_duration(self.start.elapsed());
        let message = match &self.summary {
            Some(summary) => format!("done: {}: {} ({})", self.name, summary, elapsed),
            None => format!("done: {} ({})", self.name, elapsed),
        };
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
