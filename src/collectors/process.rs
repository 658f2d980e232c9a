use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};

// Kills and reaps the child when dropped.
struct ChildGuard {
    child: Child,
    stderr: Option<JoinHandle<Option<String>>>,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// How a command ended.
#[derive(Debug)]
pub struct Exited {
    pub status: ExitStatus,
    /// Last non-blank line the command wrote to stderr.
    pub stderr_tail: Option<String>,
}

/// Holds a running external command so that a thread other than the one
/// reading its output can terminate it. Clones share the same slot; the
/// process is killed when it is replaced, killed, or the last clone drops.
#[derive(Clone, Default)]
pub struct ChildSlot {
    inner: Arc<Mutex<Option<ChildGuard>>>,
}

impl ChildSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `program` with stdout piped and stores it in the slot. Stderr is
    /// drained on a helper thread that keeps its last line for [`Self::wait`].
    pub fn spawn(&self, program: &str, args: &[&str]) -> Result<ChildStdout> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to run {program} {}", args.join(" ")))?;
        let stdout = child
            .stdout
            .take()
            .with_context(|| format!("{program} has no stdout pipe"))?;
        let stderr = child
            .stderr
            .take()
            .map(|pipe| thread::spawn(move || last_line(BufReader::new(pipe))));
        if let Ok(mut slot) = self.inner.lock() {
            *slot = Some(ChildGuard { child, stderr });
        }
        Ok(stdout)
    }

    pub fn kill(&self) {
        let guard = self.inner.lock().ok().and_then(|mut slot| slot.take());
        drop(guard);
    }

    /// Waits for the held process to exit and empties the slot.
    pub fn wait(&self) -> Option<Exited> {
        let mut guard = self.inner.lock().ok().and_then(|mut slot| slot.take())?;
        let status = guard.child.wait().ok()?;
        let stderr_tail = guard.stderr.take().and_then(|h| h.join().ok()).flatten();
        Some(Exited { status, stderr_tail })
    }

    #[cfg(test)]
    pub fn is_occupied(&self) -> bool {
        self.inner.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

/// Reads `reader` line by line until EOF, a read error, or `sink` returns
/// `false`. Lines are decoded lossily and lose their line terminator.
///
/// Returns `true` when the reader ran dry, `false` when `sink` stopped it.
pub fn for_each_line<R: BufRead>(mut reader: R, mut sink: impl FnMut(&str) -> bool) -> bool {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => return true,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if !sink(line.trim_end_matches(|c| c == '\n' || c == '\r')) {
                    return false;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "reading command output failed");
                return true;
            }
        }
    }
}

fn last_line<R: BufRead>(reader: R) -> Option<String> {
    let mut last = None;
    for_each_line(reader, |line| {
        let line = line.trim();
        if !line.is_empty() {
            last = Some(line.to_string());
        }
        true
    });
    last
}
