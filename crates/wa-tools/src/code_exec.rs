//! Sandboxed code execution tool
//!
//! Runs model-written code in a fresh interpreter process and returns
//! exactly what it printed. With isolation on (the default) the child gets
//! an empty environment, no stdin and resource limits, and runs inside a
//! filesystem jail that only exposes read-only system directories and an
//! empty working directory. The network is cut off unless `deny_network`
//! is turned off. The jail needs Linux user namespaces; if they cannot be
//! created the code does not run.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};
use wa_core::{CodeExecutionConfig, Error, Result, Tool};

const SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";
const MAX_FILE_BYTES: u64 = 16 * 1024 * 1024;
const MAX_OPEN_FILES: u64 = 64;
const STDERR_TAIL_CHARS: usize = 2000;

/// Locate an interpreter on the current `PATH`.
pub fn resolve_interpreter(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|full| full.is_file())
}

/// Python execution in an isolated child process
pub struct CodeExecutionTool {
    config: CodeExecutionConfig,
}

impl CodeExecutionTool {
    pub const NAME: &'static str = "Python";

    /// # Errors
    /// `UnsandboxedExecution` when isolation is off, or unavailable on this
    /// platform, and `allow_unsandboxed` was not set.
    pub fn new(config: CodeExecutionConfig) -> Result<Self> {
        #[cfg(not(target_os = "linux"))]
        if config.isolate {
            if !config.allow_unsandboxed {
                return Err(Error::UnsandboxedExecution(
                    "the filesystem jail needs Linux; set allow_unsandboxed = true to run \
                     model-written code with resource limits only"
                        .to_string(),
                ));
            }
            warn!("Code execution runs WITHOUT a filesystem or network jail on this platform");
        }

        if !config.isolate {
            if !config.allow_unsandboxed {
                return Err(Error::UnsandboxedExecution(
                    "code_execution.isolate is false; set allow_unsandboxed = true to run \
                     model-written code without isolation"
                        .to_string(),
                ));
            }
            warn!("Code execution is running WITHOUT isolation");
        }
        Ok(Self { config })
    }

    /// Run `code` and return its standard output.
    ///
    /// # Errors
    /// `ToolExecution` on timeout, non-zero exit (with the stderr tail) or
    /// when the interpreter cannot be started.
    pub async fn run(&self, code: &str) -> Result<String> {
        let interpreter = resolve_interpreter(&self.config.interpreter)
            .and_then(|path| path.canonicalize().ok())
            .ok_or_else(|| {
                Error::ToolExecution(format!("interpreter not found: {}", self.config.interpreter))
            })?;
        let scratch = tempfile::tempdir()?;

        let mut command = Command::new(&interpreter);
        command
            .arg("-I")
            .arg("-c")
            .arg(code)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if self.config.isolate {
            command
                .env_clear()
                .env("PATH", SANDBOX_PATH)
                .current_dir(scratch.path());
            #[cfg(unix)]
            self.confine(&mut command, scratch.path(), &interpreter)?;
        }

        debug!(
            interpreter = %interpreter.display(),
            isolate = self.config.isolate,
            "Executing code"
        );

        let mut child = command.spawn().map_err(|e| {
            warn!("Interpreter did not start: {}", e);
            Error::ToolExecution(format!("failed to start {}: {}", interpreter.display(), e))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ToolExecution("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::ToolExecution("stderr was not captured".to_string()))?;

        let limit = self.config.max_output_bytes;
        let duration = Duration::from_secs(self.config.timeout_secs);
        let outcome = timeout(duration, async {
            tokio::try_join!(
                read_capped(stdout, limit),
                read_capped(stderr, limit),
                child.wait()
            )
        })
        .await;

        let ((out, out_truncated), (err, _), status) = match outcome {
            Ok(result) => result?,
            Err(_) => {
                let _ = child.kill().await;
                return Err(Error::ToolExecution(format!(
                    "code execution timed out after {}s",
                    self.config.timeout_secs
                )));
            }
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&err);
            return Err(Error::ToolExecution(format!(
                "exited with {}: {}",
                status,
                tail(stderr.trim_end(), STDERR_TAIL_CHARS)
            )));
        }

        let mut output = String::from_utf8_lossy(&out).into_owned();
        if out_truncated {
            output.push_str("\n... [output truncated]");
        }
        Ok(output)
    }

    /// Install the jail and resource limits, applied in the child between
    /// fork and exec.
    #[cfg(unix)]
    fn confine(&self, command: &mut Command, scratch: &Path, interpreter: &Path) -> Result<()> {
        let limits = Limits::from(&self.config);

        #[cfg(target_os = "linux")]
        let jail = crate::sandbox::Jail::prepare(scratch, interpreter, self.config.deny_network)
            .map_err(|e| Error::ToolExecution(format!("failed to prepare sandbox: {}", e)))?;
        #[cfg(not(target_os = "linux"))]
        let _ = (scratch, interpreter);

        // SAFETY: the closure only makes syscalls on data prepared above.
        unsafe {
            command.pre_exec(move || {
                #[cfg(target_os = "linux")]
                jail.enter()?;
                limits.apply()
            });
        }
        Ok(())
    }
}

/// Read at most `limit` bytes, then drain the rest so the child never blocks.
async fn read_capped<R>(mut reader: R, limit: usize) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    (&mut reader).take(limit as u64).read_to_end(&mut buf).await?;
    let rest = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok((buf, rest > 0))
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let start = text
        .char_indices()
        .nth(count - max_chars)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &text[start..]
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
type Resource = libc::__rlimit_resource_t;
#[cfg(all(unix, not(all(target_os = "linux", target_env = "gnu"))))]
type Resource = libc::c_int;

/// Lower a resource limit, never above the inherited hard limit.
#[cfg(unix)]
fn set_limit(resource: Resource, value: u64) -> std::io::Result<()> {
    let mut current = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if unsafe { libc::getrlimit(resource, &mut current) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    let mut value = value as libc::rlim_t;
    if current.rlim_max != libc::RLIM_INFINITY && current.rlim_max < value {
        value = current.rlim_max;
    }
    let limit = libc::rlimit {
        rlim_cur: value,
        rlim_max: value,
    };
    if unsafe { libc::setrlimit(resource, &limit) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(unix)]
struct Limits {
    cpu_secs: u64,
    memory_bytes: u64,
}

#[cfg(unix)]
impl From<&CodeExecutionConfig> for Limits {
    fn from(config: &CodeExecutionConfig) -> Self {
        Self {
            cpu_secs: config.cpu_secs.max(1),
            memory_bytes: config.memory_mb.saturating_mul(1024 * 1024),
        }
    }
}

#[cfg(unix)]
impl Limits {
    fn apply(&self) -> std::io::Result<()> {
        set_limit(libc::RLIMIT_CPU, self.cpu_secs)?;
        set_limit(libc::RLIMIT_AS, self.memory_bytes)?;
        set_limit(libc::RLIMIT_FSIZE, MAX_FILE_BYTES)?;
        set_limit(libc::RLIMIT_NOFILE, MAX_OPEN_FILES)?;
        set_limit(libc::RLIMIT_CORE, 0)
    }
}

#[async_trait]
impl Tool for CodeExecutionTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Runs Python code in an isolated sandbox and returns exactly what it prints to standard \
         output. Use print() to see any result. The input to this tool should be valid Python \
         source code. It cannot reach the network or the warehouse, and it only sees its own \
         empty working directory."
    }

    async fn invoke(&self, input: &str) -> Result<String> {
        self.run(input).await
    }
}
