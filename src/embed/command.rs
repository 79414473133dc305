//! External-process provider: `<program> [args..] embed_batch`, texts as a
//! JSON array on stdin, `{"embeddings": [[..]]}` or `{"error": ".."}` on stdout.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;

use super::{EmbeddingProvider, ProviderDescriptor, ProviderError};

/// Default model name reported for the sentence-transformers helper.
pub const DEFAULT_COMMAND_MODEL: &str = "all-MiniLM-L6-v2";

/// Runs one process per batch and kills it after the timeout.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    program: PathBuf,
    args: Vec<String>,
    model: String,
    dimension: usize,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct CommandReply {
    #[serde(default)]
    embeddings: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    error: Option<String>,
}

impl CommandProvider {
    /// Provider invoking `program` with `args` followed by `embed_batch`.
    pub fn new(
        program: impl Into<PathBuf>,
        args: Vec<String>,
        model: impl Into<String>,
        dimension: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            model: model.into(),
            dimension,
            timeout,
        }
    }

    fn run(&self, payload: Vec<u8>) -> Result<String, ProviderError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("embed_batch")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                ProviderError::Unavailable(format!("failed to start {:?}: {err}", self.program))
            })?;
        let started = Instant::now();

        // Batches can exceed the pipe buffer, so stdin is fed off the timeout loop.
        let stdin = child.stdin.take();
        let writer = thread::spawn(move || match stdin {
            Some(mut stdin) => stdin.write_all(&payload),
            None => Ok(()),
        });
        let stdout = child.stdout.take();
        let reader = thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut stdout) = stdout {
                let _ = stdout.read_to_string(&mut buf);
            }
            buf
        });
        let stderr = child.stderr.take();
        let err_reader = thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut buf);
            }
            buf
        });

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ProviderError::Timeout(self.timeout));
                }
                Ok(None) => thread::sleep(Duration::from_millis(20)),
                Err(err) => {
                    let _ = child.kill();
                    return Err(ProviderError::Unavailable(format!(
                        "failed to wait on {:?}: {err}",
                        self.program
                    )));
                }
            }
        };

        let written = writer.join().unwrap_or(Ok(()));
        let stdout = reader.join().unwrap_or_default();
        let stderr = err_reader.join().unwrap_or_default();
        if !status.success() {
            // The helper prints `{"error": ..}` before exiting non-zero.
            if let Ok(CommandReply {
                error: Some(message),
                ..
            }) = serde_json::from_str::<CommandReply>(stdout.trim())
            {
                return Err(ProviderError::BadResponse(message));
            }
            if let Err(err) = written {
                return Err(ProviderError::Unavailable(format!(
                    "failed to write to {:?}: {err}",
                    self.program
                )));
            }
            return Err(ProviderError::Unavailable(format!(
                "{:?} exited with {status}: {}",
                self.program,
                stderr.trim()
            )));
        }
        Ok(stdout)
    }
}

impl EmbeddingProvider for CommandProvider {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            provider: "command".into(),
            model: self.model.clone(),
            dimension: self.dimension,
        }
    }

    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let payload = serde_json::to_vec(inputs)
            .map_err(|err| ProviderError::BadResponse(format!("cannot encode batch: {err}")))?;
        let stdout = self.run(payload)?;
        let reply: CommandReply = serde_json::from_str(stdout.trim())
            .map_err(|err| ProviderError::BadResponse(format!("unparseable reply: {err}")))?;
        if let Some(message) = reply.error {
            return Err(ProviderError::BadResponse(message));
        }
        let embeddings = reply
            .embeddings
            .ok_or_else(|| ProviderError::BadResponse("reply has no embeddings".into()))?;
        if embeddings.len() != inputs.len() {
            return Err(ProviderError::CountMismatch {
                expected: inputs.len(),
                found: embeddings.len(),
            });
        }
        Ok(embeddings)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str, timeout: Duration) -> CommandProvider {
        CommandProvider::new(
            "sh",
            vec!["-c".into(), script.into(), "helper".into()],
            "unit",
            2,
            timeout,
        )
    }

    #[test]
    fn parses_embeddings_reply() {
        let provider = shell(
            r#"cat >/dev/null; echo '{"embeddings": [[1.0, 0.0], [0.0, 1.0]]}'"#,
            Duration::from_secs(5),
        );
        let vectors = provider.embed_batch(&["a", "b"]).expect("embeddings");
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn error_reply_is_structured() {
        let provider = shell(
            r#"cat >/dev/null; echo '{"error": "model not loaded"}'; exit 1"#,
            Duration::from_secs(5),
        );
        let err = provider.embed_batch(&["a"]).unwrap_err();
        assert!(matches!(err, ProviderError::BadResponse(ref msg) if msg == "model not loaded"));
    }

    #[test]
    fn slow_helper_times_out() {
        let provider = shell("sleep 5", Duration::from_millis(200));
        let err = provider.embed_batch(&["a"]).unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[test]
    fn helper_ignoring_stdin_still_times_out() {
        let provider = shell("sleep 5", Duration::from_millis(300));
        let text = "ゴルフ".repeat(20_000);
        let batch = [text.as_str(); 4];
        let started = Instant::now();
        let err = provider.embed_batch(&batch).unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn missing_program_is_unavailable() {
        let provider = CommandProvider::new(
            "/nonexistent/embedding-helper",
            Vec::new(),
            "unit",
            2,
            Duration::from_secs(1),
        );
        let err = provider.embed_batch(&["a"]).unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }
}
