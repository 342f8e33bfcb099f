//! Sequence-to-MP4 conversion runner
//!
//! Builds the external FFmpeg command line from user settings, runs it on a
//! worker thread and streams its combined output into a bounded event
//! channel drained by the UI. Cancellation is cooperative: the flag is
//! checked between output lines.

use std::io::{BufRead, BufReader};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Default encoder binary, resolved through PATH
pub const DEFAULT_ENCODER: &str = "ffmpeg";

/// Capacity of the log-event queue between worker and UI
const EVENT_QUEUE_CAP: usize = 1024;

/// Conversion settings (persistent via app state)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversionSettings {
    pub input_folder: PathBuf,
    pub output_file: PathBuf,
    /// Decimal string so NTSC rates like "23.976" survive round-trips verbatim
    pub frame_rate: String,
    /// CRF, lower = higher quality
    pub quality: u32,
    pub preset: Preset,
    /// printf-style template with one zero-padded placeholder, e.g. "%04d"
    pub file_pattern: String,
    pub file_extension: String,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            input_folder: PathBuf::new(),
            output_file: PathBuf::new(),
            frame_rate: "24".to_string(),
            quality: 18,
            preset: Preset::Slow,
            file_pattern: "%04d".to_string(),
            file_extension: "png".to_string(),
        }
    }
}

impl ConversionSettings {
    /// Input template passed to `-i`: `<folder>/<pattern>.<ext>`
    pub fn input_template(&self) -> PathBuf {
        self.input_folder
            .join(format!("{}.{}", self.file_pattern, self.file_extension))
    }
}

/// x264 speed/quality trade-off tier, fastest to slowest
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
}

impl Preset {
    pub fn all() -> &'static [Preset] {
        &[
            Preset::Ultrafast,
            Preset::Superfast,
            Preset::Veryfast,
            Preset::Faster,
            Preset::Fast,
            Preset::Medium,
            Preset::Slow,
            Preset::Slower,
            Preset::Veryslow,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Ultrafast => "ultrafast",
            Preset::Superfast => "superfast",
            Preset::Veryfast => "veryfast",
            Preset::Faster => "faster",
            Preset::Fast => "fast",
            Preset::Medium => "medium",
            Preset::Slow => "slow",
            Preset::Slower => "slower",
            Preset::Veryslow => "veryslow",
        }
    }

    /// Parse an ffmpeg preset name (CLI override)
    pub fn from_name(name: &str) -> Option<Preset> {
        Preset::all().iter().copied().find(|p| p.as_str() == name)
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of a conversion, shared between UI and worker.
///
/// Terminal variants (Completed/Cancelled) are visible between process exit
/// and the terminal log line; the state always returns to Idle afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    CancelRequested,
    /// Process exited with the carried code (0 = success)
    Completed(i32),
    Cancelled,
}

/// Events streamed from the worker to the UI
#[derive(Clone, Debug)]
pub enum RunEvent {
    Log(String),
    Finished(RunOutcome),
}

/// Terminal outcome of a run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failed(i32),
    Cancelled,
    /// Launch failure or unexpected worker error
    Error(String),
}

/// Conversion errors
#[derive(Debug)]
pub enum ConvertError {
    InvalidSettings(&'static str),
    Spawn(std::io::Error),
    NonZeroExit(i32),
    Cancelled,
}

impl std::fmt::Display for ConvertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConvertError::InvalidSettings(what) => write!(f, "Invalid settings: {}", what),
            ConvertError::Spawn(e) => write!(f, "Failed to launch encoder: {}", e),
            ConvertError::NonZeroExit(code) => {
                write!(f, "Conversion failed with return code: {}", code)
            }
            ConvertError::Cancelled => write!(f, "Conversion cancelled by user"),
        }
    }
}

impl std::error::Error for ConvertError {}

/// Build the FFmpeg argument vector for the given settings.
///
/// `-framerate` and `-i` must precede the codec options, `-y` must precede
/// the output path.
pub fn build_ffmpeg_args(settings: &ConversionSettings) -> Vec<String> {
    vec![
        "-framerate".to_string(),
        settings.frame_rate.clone(),
        "-i".to_string(),
        settings.input_template().to_string_lossy().into_owned(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        settings.preset.as_str().to_string(),
        "-crf".to_string(),
        settings.quality.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-y".to_string(),
        settings.output_file.to_string_lossy().into_owned(),
    ]
}

/// Owns the worker lifecycle for one conversion at a time.
pub struct ConversionRunner {
    encoder: String,
    state: Arc<Mutex<RunState>>,
    events: Option<Receiver<RunEvent>>,
    worker: Option<JoinHandle<()>>,
}

impl Default for ConversionRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionRunner {
    pub fn new() -> Self {
        Self {
            encoder: DEFAULT_ENCODER.to_string(),
            state: Arc::new(Mutex::new(RunState::Idle)),
            events: None,
            worker: None,
        }
    }

    /// Use a different encoder binary (CLI `--ffmpeg` override)
    pub fn set_encoder(&mut self, encoder: impl Into<String>) {
        self.encoder = encoder.into();
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap()
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.state(), RunState::Idle)
    }

    /// Event stream of the current/last run, drained by the UI
    pub fn events(&self) -> Option<&Receiver<RunEvent>> {
        self.events.as_ref()
    }

    /// Start a conversion on a background worker thread.
    ///
    /// No-op while a run is active. Fails with InvalidSettings before any
    /// process is launched when required fields are empty.
    pub fn start(&mut self, settings: &ConversionSettings) -> Result<(), ConvertError> {
        if self.is_running() {
            debug!("start() ignored: a conversion is already running");
            return Ok(());
        }

        if settings.input_folder.as_os_str().is_empty() {
            return Err(ConvertError::InvalidSettings("input folder is not set"));
        }
        if settings.output_file.as_os_str().is_empty() {
            return Err(ConvertError::InvalidSettings("output file is not set"));
        }

        // Reap the previous worker before replacing the channel
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }

        let (tx, rx) = bounded(EVENT_QUEUE_CAP);
        self.events = Some(rx);
        *self.state.lock().unwrap() = RunState::Running;

        let encoder = self.encoder.clone();
        let settings = settings.clone();
        let state = Arc::clone(&self.state);
        self.worker = Some(thread::spawn(move || {
            run_worker(&encoder, &settings, &state, &tx);
        }));

        Ok(())
    }

    /// Request cancellation of the active run. Never blocks; the worker
    /// notices the flag between output lines and kills the process.
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == RunState::Running {
            *state = RunState::CancelRequested;
            info!("Conversion cancel requested");
        }
    }
}

/// Worker entry point: run the conversion, then emit the terminal log line
/// and Finished event, restoring Idle in all cases (including panics).
fn run_worker(
    encoder: &str,
    settings: &ConversionSettings,
    state: &Arc<Mutex<RunState>>,
    tx: &Sender<RunEvent>,
) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| convert(encoder, settings, state, tx)));

    let (terminal_state, message, outcome) = match result {
        Ok(Ok(())) => (
            RunState::Completed(0),
            "Conversion completed successfully!".to_string(),
            RunOutcome::Success,
        ),
        Ok(Err(ConvertError::Cancelled)) => (
            RunState::Cancelled,
            "Conversion cancelled".to_string(),
            RunOutcome::Cancelled,
        ),
        Ok(Err(ConvertError::NonZeroExit(code))) => (
            RunState::Completed(code),
            format!("Conversion failed with return code: {}", code),
            RunOutcome::Failed(code),
        ),
        Ok(Err(e)) => (
            RunState::Completed(-1),
            format!("Error: {}", e),
            RunOutcome::Error(e.to_string()),
        ),
        Err(_) => (
            RunState::Completed(-1),
            "Error: conversion worker panicked".to_string(),
            RunOutcome::Error("conversion worker panicked".to_string()),
        ),
    };

    match &outcome {
        RunOutcome::Success | RunOutcome::Cancelled => info!("{}", message),
        _ => warn!("{}", message),
    }

    *state.lock().unwrap() = terminal_state;
    let _ = tx.send(RunEvent::Log(message));
    *state.lock().unwrap() = RunState::Idle;
    let _ = tx.send(RunEvent::Finished(outcome));
}

/// Spawn the encoder and pump its output until exit or cancellation.
fn convert(
    encoder: &str,
    settings: &ConversionSettings,
    state: &Arc<Mutex<RunState>>,
    tx: &Sender<RunEvent>,
) -> Result<(), ConvertError> {
    let args = build_ffmpeg_args(settings);

    let _ = tx.send(RunEvent::Log("Starting conversion...".to_string()));
    let _ = tx.send(RunEvent::Log(format!(
        "Input: {}",
        settings.input_template().display()
    )));
    let _ = tx.send(RunEvent::Log(format!(
        "Output: {}",
        settings.output_file.display()
    )));
    let _ = tx.send(RunEvent::Log(format!(
        "Frame Rate: {} fps",
        settings.frame_rate
    )));
    let _ = tx.send(RunEvent::Log(format!("Quality: CRF {}", settings.quality)));
    let _ = tx.send(RunEvent::Log(format!("Preset: {}", settings.preset)));
    let _ = tx.send(RunEvent::Log(format!(
        "Command: {} {}",
        encoder,
        args.join(" ")
    )));
    info!(
        "Spawning {} for {}",
        encoder,
        settings.input_template().display()
    );

    let mut child = Command::new(encoder)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(ConvertError::Spawn)?;

    // Merge stdout and stderr into one line stream; the channel is the
    // combiner, so the cancel check below stays line-granular.
    let (line_tx, line_rx) = mpsc::channel::<String>();
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_line_reader(stdout, line_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_line_reader(stderr, line_tx.clone()));
    }
    drop(line_tx);

    let mut cancelled = false;
    for line in line_rx {
        if *state.lock().unwrap() == RunState::CancelRequested {
            let _ = child.kill();
            cancelled = true;
            break;
        }
        let line = line.trim();
        if !line.is_empty() {
            let _ = tx.send(RunEvent::Log(line.to_string()));
        }
    }

    let status = child.wait().map_err(ConvertError::Spawn)?;
    for handle in readers {
        let _ = handle.join();
    }

    if cancelled {
        return Err(ConvertError::Cancelled);
    }
    if status.success() {
        Ok(())
    } else {
        Err(ConvertError::NonZeroExit(status.code().unwrap_or(-1)))
    }
}

/// Forward lines from a child pipe into the merged line channel
fn spawn_line_reader<R: std::io::Read + Send + 'static>(
    pipe: R,
    tx: mpsc::Sender<String>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let reader = BufReader::new(pipe);
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    fn settings_for(input: &str, output: &str) -> ConversionSettings {
        ConversionSettings {
            input_folder: PathBuf::from(input),
            output_file: PathBuf::from(output),
            ..Default::default()
        }
    }

    #[test]
    fn test_ffmpeg_args_order() {
        let mut settings = settings_for("/shots/sq010", "/shots/sq010.mp4");
        settings.frame_rate = "23.976".to_string();
        settings.quality = 21;
        settings.preset = Preset::Medium;
        settings.file_pattern = "frame_%04d".to_string();
        settings.file_extension = "exr".to_string();

        let args = build_ffmpeg_args(&settings);
        assert_eq!(
            args,
            vec![
                "-framerate",
                "23.976",
                "-i",
                "/shots/sq010/frame_%04d.exr",
                "-c:v",
                "libx264",
                "-preset",
                "medium",
                "-crf",
                "21",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
                "-y",
                "/shots/sq010.mp4",
            ]
        );
    }

    #[test]
    fn test_start_rejects_empty_output() {
        let mut runner = ConversionRunner::new();
        let settings = settings_for("/shots/sq010", "");

        let result = runner.start(&settings);
        assert!(matches!(result, Err(ConvertError::InvalidSettings(_))));
        assert_eq!(runner.state(), RunState::Idle);
        assert!(runner.events().is_none());
    }

    #[test]
    fn test_start_rejects_empty_input() {
        let mut runner = ConversionRunner::new();
        let settings = settings_for("", "/shots/out.mp4");
        assert!(matches!(
            runner.start(&settings),
            Err(ConvertError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_preset_names_round_trip() {
        for preset in Preset::all() {
            assert_eq!(Preset::from_name(preset.as_str()), Some(*preset));
        }
        assert_eq!(Preset::from_name("warp9"), None);
    }

    #[test]
    fn test_input_template_join() {
        let settings = settings_for("/a/b", "/a/b.mp4");
        assert_eq!(settings.input_template(), Path::new("/a/b/%04d.png"));
    }

    // Runner tests below drive a stub encoder script instead of ffmpeg.

    #[cfg(unix)]
    fn stub_encoder(tag: &str, script_body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!("seq2mp4_stub_{}.sh", tag));
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script_body)).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    /// Drain events until Finished, collecting log lines on the way
    fn wait_for_outcome(runner: &ConversionRunner) -> (Vec<String>, RunOutcome) {
        let rx = runner.events().expect("runner has no event stream");
        let mut lines = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_secs(10)) {
                Ok(RunEvent::Log(line)) => lines.push(line),
                Ok(RunEvent::Finished(outcome)) => return (lines, outcome),
                Err(e) => panic!("no terminal event: {}", e),
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_successful_run() {
        let stub = stub_encoder("ok", "echo frame 1\necho frame 2\nexit 0");
        let mut runner = ConversionRunner::new();
        runner.set_encoder(stub.to_string_lossy().into_owned());

        runner
            .start(&settings_for("/tmp/in", "/tmp/out.mp4"))
            .unwrap();
        let (lines, outcome) = wait_for_outcome(&runner);

        assert_eq!(outcome, RunOutcome::Success);
        assert!(lines.iter().any(|l| l == "frame 1"));
        assert!(lines.iter().any(|l| l.contains("completed successfully")));
        assert_eq!(runner.state(), RunState::Idle);
        let _ = std::fs::remove_file(stub);
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_reports_code() {
        let stub = stub_encoder("fail", "echo boom >&2\nexit 1");
        let mut runner = ConversionRunner::new();
        runner.set_encoder(stub.to_string_lossy().into_owned());

        runner
            .start(&settings_for("/tmp/in", "/tmp/out.mp4"))
            .unwrap();
        let (lines, outcome) = wait_for_outcome(&runner);

        assert_eq!(outcome, RunOutcome::Failed(1));
        // stderr lines are part of the combined stream
        assert!(lines.iter().any(|l| l == "boom"));
        assert_eq!(runner.state(), RunState::Idle);
        let _ = std::fs::remove_file(stub);
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_kills_process_and_restores_idle() {
        let stub = stub_encoder("loop", "while :; do echo tick; sleep 0.05; done");
        let mut runner = ConversionRunner::new();
        runner.set_encoder(stub.to_string_lossy().into_owned());

        runner
            .start(&settings_for("/tmp/in", "/tmp/out.mp4"))
            .unwrap();

        // Wait for the first tick so the run is demonstrably alive
        let rx = runner.events().unwrap();
        loop {
            match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                RunEvent::Log(line) if line == "tick" => break,
                RunEvent::Log(_) => continue,
                RunEvent::Finished(o) => panic!("finished before cancel: {:?}", o),
            }
        }

        runner.cancel();
        let (_, outcome) = wait_for_outcome(&runner);
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(runner.state(), RunState::Idle);

        // A new run is accepted after cancellation
        let stub2 = stub_encoder("after_cancel", "exit 0");
        runner.set_encoder(stub2.to_string_lossy().into_owned());
        runner
            .start(&settings_for("/tmp/in", "/tmp/out.mp4"))
            .unwrap();
        let (_, outcome) = wait_for_outcome(&runner);
        assert_eq!(outcome, RunOutcome::Success);

        let _ = std::fs::remove_file(stub);
        let _ = std::fs::remove_file(stub2);
    }

    #[cfg(unix)]
    #[test]
    fn test_start_while_running_is_noop() {
        let stub = stub_encoder("busy", "while :; do echo tick; sleep 0.05; done");
        let mut runner = ConversionRunner::new();
        runner.set_encoder(stub.to_string_lossy().into_owned());

        runner
            .start(&settings_for("/tmp/in", "/tmp/out.mp4"))
            .unwrap();
        assert_eq!(runner.state(), RunState::Running);

        // Second start is accepted but does nothing
        runner
            .start(&settings_for("/tmp/other", "/tmp/other.mp4"))
            .unwrap();
        assert_eq!(runner.state(), RunState::Running);

        runner.cancel();
        let (_, outcome) = wait_for_outcome(&runner);
        assert_eq!(outcome, RunOutcome::Cancelled);
        let _ = std::fs::remove_file(stub);
    }

    #[test]
    fn test_missing_encoder_reports_launch_error() {
        let mut runner = ConversionRunner::new();
        runner.set_encoder("/nonexistent/seq2mp4-encoder");

        runner
            .start(&settings_for("/tmp/in", "/tmp/out.mp4"))
            .unwrap();
        let (lines, outcome) = wait_for_outcome(&runner);

        assert!(matches!(outcome, RunOutcome::Error(_)));
        assert!(lines.iter().any(|l| l.starts_with("Error:")));
        assert_eq!(runner.state(), RunState::Idle);
    }

    #[test]
    fn test_cancel_when_idle_is_noop() {
        let runner = ConversionRunner::new();
        runner.cancel();
        assert_eq!(runner.state(), RunState::Idle);
    }
}
