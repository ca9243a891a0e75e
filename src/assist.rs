//! Optional generation assist.
//!
//! An assist receives the normalized batch as context and may return
//! alternative script text. Its output is only ever stored next to the
//! generated scripts; the deterministic generator stays authoritative.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::ast::NormalizedMapping;
use crate::config::{AssistConfig, DEFAULT_ASSIST_TIMEOUT_SECS};
use crate::error::{MigrtError, MigrtResult};

/// A capability that suggests additional code for a batch.
pub trait GenerationAssist {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Return suggested script text for `prompt`.
    fn suggest(&self, prompt: &str) -> MigrtResult<String>;
}

/// Build the assist prompt for a normalized batch.
pub fn build_prompt(mappings: &[NormalizedMapping]) -> MigrtResult<String> {
    let mut prompt =
        String::from("Generate PL/SQL code for Oracle to migrate data from the following tables:\n\n");
    prompt.push_str(&serde_json::to_string_pretty(mappings)?);
    prompt.push_str(
        "\n\nThe code should include variable declarations, error handling, source data retrieval, \
         necessary transformations, and insertion into destination tables. \
         Use BULK COLLECT and FORALL where possible to improve performance.",
    );
    prompt.push_str(
        "\n\nFor each table mapping, create a separate package named migrt_[target_table]. \
         Also create a main script that calls all packages.",
    );
    prompt.push_str(
        "\n\nFor value maps in the transforms, implement CASE statements that fall back to the original value.",
    );
    prompt.push_str(
        "\n\nFor KEY related inserts, implement MERGE INTO statements to insert/update the related lookup tables.",
    );
    Ok(prompt)
}

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs an external program: prompt on stdin, suggestion on stdout.
///
/// The program is killed once it outlives its timeout.
pub struct CommandAssist {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandAssist {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(DEFAULT_ASSIST_TIMEOUT_SECS),
        }
    }

    pub fn from_config(config: &AssistConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
            .with_timeout(Duration::from_secs(config.timeout_secs))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<thread::JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(reader: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader.and_then(|r| r.join().ok()).unwrap_or_default()
}

impl GenerationAssist for CommandAssist {
    fn name(&self) -> &str {
        &self.program
    }

    fn suggest(&self, prompt: &str) -> MigrtResult<String> {
        info!("Requesting suggestion from assist '{}'", self.program);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MigrtError::Assist(format!("failed to start '{}': {}", self.program, e)))?;

        // stdin and both output pipes are serviced off-thread while the
        // child is polled against the deadline.
        let writer = child.stdin.take().map(|mut stdin| {
            let prompt = prompt.to_string();
            thread::spawn(move || stdin.write_all(prompt.as_bytes()))
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            let now = Instant::now();
            if now >= deadline {
                if let Err(e) = child.kill() {
                    warn!("Failed to kill assist '{}': {}", self.program, e);
                }
                let _ = child.wait();
                return Err(MigrtError::Assist(format!(
                    "'{}' timed out after {}s",
                    self.program,
                    self.timeout.as_secs_f64()
                )));
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        };

        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                // The child may exit without reading its whole input.
                Ok(Err(e)) => debug!("Assist stdin closed early: {}", e),
                Err(_) => return Err(MigrtError::Assist("stdin writer panicked".to_string())),
            }
        }
        let stdout = collect(stdout);
        let stderr = collect(stderr);

        if !status.success() {
            return Err(MigrtError::Assist(format!(
                "'{}' exited with {}: {}",
                self.program,
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&stdout).into_owned();
        debug!("Assist returned {} bytes", text.len());
        Ok(text)
    }
}
