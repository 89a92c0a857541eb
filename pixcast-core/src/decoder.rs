//! The external decoder process.
//!
//! The decoder (ffmpeg by default) pulls the compositor's stream and
//! writes raw RGBA frames at the pipeline's resolution to its stdout.
//! [`DecoderProcess`] owns the child: dropping it kills the process, so
//! every exit path out of a session tears the decoder down.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, PixcastError};
use crate::frame::FrameSpec;

/// How long shutdown waits for buffered stderr output.
const STDERR_GRACE: Duration = Duration::from_millis(200);

// ── DecoderConfig ────────────────────────────────────────────────

/// How to launch the decoder.
///
/// `args` and `input_template` may contain placeholders:
///
/// | Placeholder | Replaced with                         |
/// |-------------|---------------------------------------|
/// | `{stream}`  | stream identifier (input template only) |
/// | `{input}`   | rendered input template               |
/// | `{width}`   | frame width                           |
/// | `{height}`  | frame height                          |
/// | `{fps}`     | output frame rate                     |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    pub program: String,
    pub args: Vec<String>,
    pub input_template: String,
    pub fps: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        let args = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-i",
            "{input}",
            "-an",
            "-vf",
            "scale={width}:{height}",
            "-pix_fmt",
            "rgba",
            "-r",
            "{fps}",
            "-f",
            "rawvideo",
            "pipe:1",
        ];
        Self {
            program: "ffmpeg".into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            input_template: "rtmp://127.0.0.1:1935/live/{stream}".into(),
            fps: 30,
        }
    }
}

impl DecoderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.program.trim().is_empty() {
            return Err(ConfigError::EmptyProgram);
        }
        if self.fps == 0 {
            return Err(ConfigError::ZeroFrameRate);
        }
        Ok(())
    }

    /// Input reference for `stream`.
    pub fn input_for(&self, stream: &str) -> String {
        self.input_template.replace("{stream}", stream)
    }

    /// Arguments with every placeholder filled in.
    pub fn render_args(&self, stream: &str, spec: &FrameSpec) -> Vec<String> {
        let input = self.input_for(stream);
        let width = spec.width().to_string();
        let height = spec.height().to_string();
        let fps = self.fps.to_string();

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input)
                    .replace("{width}", &width)
                    .replace("{height}", &height)
                    .replace("{fps}", &fps)
            })
            .collect()
    }

    fn command(&self, stream: &str, spec: &FrameSpec) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.render_args(stream, spec))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

// ── DecoderProcess ───────────────────────────────────────────────

/// A running decoder. Killed when dropped.
#[derive(Debug)]
pub struct DecoderProcess {
    child: Child,
    program: String,
    stderr_task: Option<JoinHandle<()>>,
}

impl DecoderProcess {
    /// Launch the decoder for `stream` and hand back its stdout.
    pub fn spawn(
        config: &DecoderConfig,
        stream: &str,
        spec: &FrameSpec,
    ) -> Result<(Self, ChildStdout), PixcastError> {
        let mut child = config
            .command(stream, spec)
            .spawn()
            .map_err(|source| PixcastError::Spawn {
                program: config.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(PixcastError::MissingStdout)?;
        let stderr_task = child.stderr.take().map(forward_stderr);

        info!(
            program = %config.program,
            pid = child.id(),
            stream,
            %spec,
            fps = config.fps,
            "decoder started"
        );

        Ok((
            Self {
                child,
                program: config.program.clone(),
                stderr_task,
            },
            stdout,
        ))
    }

    /// OS process id, `None` once the process has been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kill the decoder if it is still running and reap it.
    pub async fn shutdown(mut self) -> std::io::Result<ExitStatus> {
        if self.child.try_wait()?.is_none() {
            // Already-exited races are fine; wait() below reports the status.
            let _ = self.child.start_kill();
        }
        let status = self.child.wait().await?;

        // Give the last stderr lines a moment to reach the log.
        if let Some(task) = self.stderr_task.take() {
            let _ = tokio::time::timeout(STDERR_GRACE, task).await;
        }

        if status.success() {
            info!(program = %self.program, "decoder exited");
        } else {
            warn!(program = %self.program, %status, "decoder exited abnormally");
        }
        Ok(status)
    }
}

impl Drop for DecoderProcess {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

/// Log decoder stderr line by line until it closes.
fn forward_stderr(stderr: ChildStderr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.to_ascii_lowercase().contains("error") {
                warn!(decoder = %line, "decoder reported an error");
            } else {
                debug!(decoder = %line);
            }
        }
    })
}

// ── Tests ────────────────────────────────────────────────────────
