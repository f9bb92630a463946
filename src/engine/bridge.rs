use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, trace};

use super::intent::Intent;

/// Failure of a single engine invocation.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {}: {}", exit_label(.code), .output.trim())]
    Failed {
        command: String,
        code: Option<i32>,
        output: String,
    },
    #[error("could not decode output of `{command}`: {source}")]
    Decode {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "signal".to_string(),
    }
}

/// Runs engine argument vectors and reports their combined output.
///
/// Implementations must be shareable across the fan-out worker threads.
pub trait Executor: Send + Sync {
    /// Run `args` and return the combined stdout/stderr on success.
    fn invoke(&self, args: &[String]) -> Result<String, BridgeError>;

    fn execute(&self, intent: &Intent) -> Result<String, BridgeError> {
        self.invoke(&intent.to_args())
    }
}

/// Executes intents as subordinate processes of the engine binary.
///
/// The prefix carries the program plus the global flags (namespace, address)
/// already resolved by the CLI, so every child sees the same runtime.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: String,
    prefix: Vec<String>,
}

impl ProcessExecutor {
    /// Returns `None` when the prefix is empty.
    pub fn new(argv_prefix: &[String]) -> Option<Self> {
        let (program, prefix) = argv_prefix.split_first()?;
        Some(Self {
            program: program.clone(),
            prefix: prefix.to_vec(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Executor for ProcessExecutor {
    fn invoke(&self, args: &[String]) -> Result<String, BridgeError> {
        debug!(program = %self.program, args = ?args, "invoking engine");

        let mut child = Command::new(&self.program)
            .args(&self.prefix)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| BridgeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let log_buf = Mutex::new(String::new());

        // Both pipes drain concurrently so neither can fill up and stall the child.
        let status = std::thread::scope(|scope| {
            if let Some(out) = stdout {
                scope.spawn(|| drain(out, &log_buf));
            }
            if let Some(err) = stderr {
                scope.spawn(|| drain(err, &log_buf));
            }
            child.wait()
        });

        let output = log_buf.into_inner().unwrap_or_else(|e| e.into_inner());
        let status = status.map_err(|source| BridgeError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if status.success() {
            Ok(output)
        } else {
            Err(BridgeError::Failed {
                command: args.join(" "),
                code: status.code(),
                output,
            })
        }
    }
}

// Reads to EOF past undecodable bytes so the child never writes into a closed pipe.
fn drain<R: Read>(reader: R, buf: &Mutex<String>) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                trace!(line = %text.trim_end(), "engine output");
                if let Ok(mut buf) = buf.lock() {
                    buf.push_str(&text);
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}
