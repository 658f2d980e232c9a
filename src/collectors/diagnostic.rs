use std::io::BufReader;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::collectors::capture::CHANNEL_CAPACITY;
use crate::collectors::process::{for_each_line, ChildSlot};
use crate::collectors::sanitize::sanitize;

pub const DIAGNOSTIC_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one cooperative poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Continue,
    Finished,
}

/// A dashboard diagnostic: started once, then polled once per UI tick until
/// it reports [`Progress::Finished`]. Polling never blocks.
pub trait Diagnostic {
    fn title(&self) -> &str;

    /// Short description of what is being run, shown next to the title.
    fn source(&self) -> String;

    fn start(&mut self);

    fn poll(&mut self) -> Progress;

    fn log(&self) -> &[String];

    fn is_finished(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateCommand {
    pub program: &'static str,
    pub args: &'static [&'static str],
}

impl CandidateCommand {
    pub const fn new(program: &'static str, args: &'static [&'static str]) -> Self {
        Self { program, args }
    }

    fn display(&self) -> String {
        std::iter::once(self.program)
            .chain(self.args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs the first candidate command that can be started and streams its
/// trimmed, non-empty output lines into the log.
pub struct CommandDiagnostic {
    title: String,
    candidates: Vec<CandidateCommand>,
    timeout: Duration,
    rx: Option<Receiver<String>>,
    running: Arc<AtomicBool>,
    child: ChildSlot,
    handle: Option<thread::JoinHandle<()>>,
    started_at: Option<Instant>,
    timed_out: bool,
    log: Vec<String>,
    finished: bool,
}

impl CommandDiagnostic {
    pub fn new(title: impl Into<String>, candidates: Vec<CandidateCommand>) -> Self {
        Self {
            title: title.into(),
            candidates,
            timeout: DIAGNOSTIC_TIMEOUT,
            rx: None,
            running: Arc::new(AtomicBool::new(false)),
            child: ChildSlot::new(),
            handle: None,
            started_at: None,
            timed_out: false,
            log: Vec::new(),
            finished: false,
        }
    }

    #[cfg(test)]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn arp_table() -> Self {
        Self::new(
            "ARP table",
            vec![
                CandidateCommand::new("ip", &["neigh", "show"]),
                CandidateCommand::new("arp", &["-n"]),
            ],
        )
    }

    pub fn routing_table() -> Self {
        Self::new(
            "Routing table",
            vec![
                CandidateCommand::new("ip", &["route", "show"]),
                CandidateCommand::new("netstat", &["-rn"]),
            ],
        )
    }

    #[cfg(test)]
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.child.kill();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Diagnostic for CommandDiagnostic {
    fn title(&self) -> &str {
        &self.title
    }

    fn source(&self) -> String {
        self.candidates.iter().map(CandidateCommand::display).collect::<Vec<_>>().join(" / ")
    }

    fn start(&mut self) {
        if self.rx.is_some() || self.finished {
            return;
        }
        let (tx, rx) = mpsc::sync_channel(CHANNEL_CAPACITY);
        self.running.store(true, Ordering::SeqCst);

        let candidates = self.candidates.clone();
        let running = Arc::clone(&self.running);
        let child = self.child.clone();
        self.handle = Some(thread::spawn(move || run_candidates(&candidates, &tx, &running, &child)));
        self.rx = Some(rx);
        self.started_at = Some(Instant::now());
        info!(title = %self.title, "diagnostic started");
    }

    fn poll(&mut self) -> Progress {
        if self.finished {
            return Progress::Finished;
        }
        let Some(rx) = self.rx.as_ref() else {
            return Progress::Continue;
        };

        if !self.timed_out && self.started_at.is_some_and(|t| t.elapsed() >= self.timeout) {
            warn!(title = %self.title, timeout = ?self.timeout, "diagnostic timed out");
            self.timed_out = true;
            self.child.kill();
        }

        match rx.try_recv() {
            Ok(line) => {
                self.log.push(sanitize(&line));
                Progress::Continue
            }
            Err(TryRecvError::Empty) => Progress::Continue,
            Err(TryRecvError::Disconnected) => {
                self.finished = true;
                self.rx = None;
                self.stop();
                info!(title = %self.title, lines = self.log.len(), "diagnostic finished");
                Progress::Finished
            }
        }
    }

    fn log(&self) -> &[String] {
        &self.log
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for CommandDiagnostic {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_candidates(candidates: &[CandidateCommand], tx: &SyncSender<String>, running: &AtomicBool, child: &ChildSlot) {
    for cmd in candidates {
        let stdout = match child.spawn(cmd.program, cmd.args) {
            Ok(stdout) => stdout,
            Err(e) => {
                debug!(command = %cmd.display(), error = %e, "candidate command unavailable");
                continue;
            }
        };
        if !running.load(Ordering::SeqCst) {
            child.kill();
            return;
        }
        for_each_line(BufReader::new(stdout), |line| {
            let line = line.trim();
            if line.is_empty() {
                return running.load(Ordering::Relaxed);
            }
            match tx.try_send(line.to_string()) {
                Ok(()) | Err(TrySendError::Full(_)) => running.load(Ordering::Relaxed),
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
        if let Some(exit) = child.wait() {
            debug!(
                command = %cmd.display(),
                status = %exit.status,
                stderr = exit.stderr_tail.as_deref().unwrap_or(""),
                "candidate command exited"
            );
        }
        return;
    }

    let tried: Vec<String> = candidates.iter().map(|c| format!("'{}'", c.display())).collect();
    let _ = tx.try_send(format!(
        "could not run {} (permission or binary missing)",
        tried.join(" or ")
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(diag: &mut CommandDiagnostic) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while diag.poll() == Progress::Continue {
            assert!(Instant::now() < deadline, "diagnostic never finished");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_poll_before_start_continues() {
        let mut diag = CommandDiagnostic::arp_table();
        assert_eq!(diag.poll(), Progress::Continue);
        assert!(!diag.is_finished());
        assert!(diag.log().is_empty());
    }

    #[test]
    fn test_source_lists_candidates() {
        let diag = CommandDiagnostic::arp_table();
        assert_eq!(diag.title(), "ARP table");
        assert_eq!(diag.source(), "ip neigh show / arp -n");
    }

    #[test]
    fn test_all_candidates_missing_reports_message() {
        let mut diag = CommandDiagnostic::new(
            "Missing",
            vec![
                CandidateCommand::new("framewatch-missing-a", &[]),
                CandidateCommand::new("framewatch-missing-b", &["-x"]),
            ],
        );
        diag.start();
        drive(&mut diag);
        assert!(diag.is_finished());
        assert_eq!(
            diag.log(),
            ["could not run 'framewatch-missing-a' or 'framewatch-missing-b -x' (permission or binary missing)"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_streams_trimmed_lines_from_first_runnable() {
        let mut diag = CommandDiagnostic::new(
            "Echo",
            vec![
                CandidateCommand::new("framewatch-missing-a", &[]),
                CandidateCommand::new("printf", &["  one  \\n\\n two\\n"]),
            ],
        );
        diag.start();
        drive(&mut diag);
        assert_eq!(diag.log(), ["one", "two"]);
        assert_eq!(diag.poll(), Progress::Finished);
    }

    #[cfg(unix)]
    #[test]
    fn test_output_is_sanitized() {
        let mut diag = CommandDiagnostic::new("Esc", vec![CandidateCommand::new("printf", &["\\033[31mred\\033[0m\\n"])]);
        diag.start();
        drive(&mut diag);
        assert_eq!(diag.log(), ["red"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_command() {
        let mut diag = CommandDiagnostic::new("Slow", vec![CandidateCommand::new("sleep", &["30"])])
            .with_timeout(Duration::from_millis(50));
        diag.start();
        let started = Instant::now();
        drive(&mut diag);
        assert!(diag.timed_out());
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(diag.log().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_start_twice_is_noop() {
        let mut diag = CommandDiagnostic::new("Echo", vec![CandidateCommand::new("echo", &["hi"])]);
        diag.start();
        diag.start();
        drive(&mut diag);
        assert_eq!(diag.log(), ["hi"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_drop_while_running_returns() {
        let mut diag = CommandDiagnostic::new("Slow", vec![CandidateCommand::new("sleep", &["30"])]);
        diag.start();
        let started = Instant::now();
        drop(diag);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
