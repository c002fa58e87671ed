//! Polling progress monitor for a running stage.
//!
//! pg_dump and pg_restore expose no total-work estimate, so progress is the
//! rate of observed change of a side channel: the growing dump file, or the
//! newest line pg_restore appended to the diagnostic log.

use indicatif::{HumanBytes, ProgressBar, ProgressStyle as BarStyle};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Spinner redraw rate, independent of the polling interval.
const SPINNER_TICK: Duration = Duration::from_millis(120);

/// What the monitor watches.
#[derive(Debug, Clone)]
pub enum SignalSource {
    /// Current size of a file being written.
    ArtifactSize(PathBuf),
    /// Newest complete line appended to a log after `offset`.
    LogTail { path: PathBuf, offset: u64 },
}

/// One sample of the signal source.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Observation {
    #[serde(skip)]
    pub elapsed: Duration,
    /// Artifact size in bytes (artifact sources only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    /// Bytes per second since the previous sample.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_per_sec: Option<f64>,
    /// Newest log line (log sources only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    /// Log lines seen so far (log sources only).
    pub lines_seen: u64,
}

impl Observation {
    /// Single-line rendering.
    pub fn render(&self, label: &str) -> String {
        let mut out = format!("{} [{}]", label, format_elapsed(self.elapsed));
        if let Some(bytes) = self.bytes {
            out.push_str(&format!(" {} written", HumanBytes(bytes)));
            if let Some(rate) = self.bytes_per_sec {
                out.push_str(&format!(" ({}/s)", HumanBytes(rate.max(0.0) as u64)));
            }
        }
        if let Some(ref line) = self.line {
            out.push_str(&format!(" #{} {}", self.lines_seen, line));
        }
        out
    }
}

/// Where rendered progress goes.
pub trait ProgressSink: Send {
    /// Replace the current progress line.
    fn update(&mut self, line: &str);

    /// Erase the progress line.
    fn clear(&mut self);
}

/// Spinner line on stderr; long lines are cut to the terminal width.
#[derive(Default)]
pub struct TerminalSink {
    bar: Option<ProgressBar>,
}

fn spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        BarStyle::default_spinner()
            .template("{spinner:.green} {wide_msg}")
            .unwrap_or_else(|_| BarStyle::default_spinner()),
    );
    bar.enable_steady_tick(SPINNER_TICK);
    bar
}

impl ProgressSink for TerminalSink {
    fn update(&mut self, line: &str) {
        self.bar
            .get_or_insert_with(spinner)
            .set_message(line.to_string());
    }

    fn clear(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Discards everything.
pub struct SilentSink;

impl ProgressSink for SilentSink {
    fn update(&mut self, _line: &str) {}
    fn clear(&mut self) {}
}

/// Keeps every rendered line; `None` marks a clear.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub lines: Arc<Mutex<Vec<Option<String>>>>,
}

impl ProgressSink for RecordingSink {
    fn update(&mut self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(Some(line.to_string()));
        }
    }

    fn clear(&mut self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(None);
        }
    }
}

/// How stage progress is displayed.
#[derive(Clone, Default)]
pub enum ProgressStyle {
    /// Single rewritten line on stderr.
    Terminal,
    /// No rendering; observations are still published.
    #[default]
    Silent,
    /// Capture rendered lines.
    Recording(RecordingSink),
}

impl ProgressStyle {
    /// Terminal when stderr is a TTY, otherwise silent.
    pub fn auto() -> Self {
        if std::io::stderr().is_terminal() {
            ProgressStyle::Terminal
        } else {
            ProgressStyle::Silent
        }
    }

    pub fn sink(&self) -> Box<dyn ProgressSink> {
        match self {
            ProgressStyle::Terminal => Box::new(TerminalSink::default()),
            ProgressStyle::Silent => Box::new(SilentSink),
            ProgressStyle::Recording(sink) => Box::new(sink.clone()),
        }
    }
}

/// Observes a signal source at a fixed interval until told the child exited.
pub struct ProgressMonitor {
    label: String,
    source: SignalSource,
    interval: Duration,
    started: Instant,
    last_sample: Option<(Instant, u64)>,
    pending: Vec<u8>,
    last_line: Option<String>,
    lines_seen: u64,
}

impl ProgressMonitor {
    pub fn new(label: impl Into<String>, source: SignalSource, interval: Duration) -> Self {
        Self {
            label: label.into(),
            source,
            interval,
            started: Instant::now(),
            last_sample: None,
            pending: Vec::new(),
            last_line: None,
            lines_seen: 0,
        }
    }

    /// Poll until `child_exited` is cancelled, then clear the line.
    ///
    /// Only reads the signal source; it never touches the child process.
    pub async fn run(
        mut self,
        mut sink: Box<dyn ProgressSink>,
        child_exited: CancellationToken,
        published: watch::Sender<Option<Observation>>,
    ) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = child_exited.cancelled() => break,
                _ = ticker.tick() => {
                    let observation = self.observe().await;
                    sink.update(&observation.render(&self.label));
                    let _ = published.send(Some(observation));
                }
            }
        }

        // One last sample so the final size/line is published.
        let observation = self.observe().await;
        let _ = published.send(Some(observation));
        sink.clear();
    }

    /// Take one sample of the signal source.
    pub async fn observe(&mut self) -> Observation {
        let now = Instant::now();
        let elapsed = now.duration_since(self.started);

        match self.source.clone() {
            SignalSource::ArtifactSize(path) => {
                let bytes = tokio::fs::metadata(&path)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(0);
                let bytes_per_sec = self.last_sample.and_then(|(at, prev)| {
                    let secs = now.duration_since(at).as_secs_f64();
                    (secs > 0.0).then(|| bytes.saturating_sub(prev) as f64 / secs)
                });
                self.last_sample = Some((now, bytes));
                Observation {
                    elapsed,
                    bytes: Some(bytes),
                    bytes_per_sec,
                    ..Default::default()
                }
            }
            SignalSource::LogTail { path, offset } => {
                let read = read_appended(&path, offset).await;
                if let Ok(chunk) = read {
                    if let SignalSource::LogTail { offset, .. } = &mut self.source {
                        *offset += chunk.len() as u64;
                    }
                    self.consume(&chunk);
                }
                Observation {
                    elapsed,
                    line: self.last_line.clone(),
                    lines_seen: self.lines_seen,
                    ..Default::default()
                }
            }
        }
    }

    fn consume(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                self.lines_seen += 1;
                self.last_line = Some(text);
            }
        }
    }
}

async fn read_appended(path: &std::path::Path, offset: u64) -> std::io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// `mm:ss`, or `h:mm:ss` past an hour.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 3600 {
        format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else {
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}
