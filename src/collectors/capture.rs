use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use tracing::{debug, error, info, warn};

use crate::collectors::classify::{classify, CaptureTime, LinkLayer, RawFrame};
use crate::collectors::fallback::parse_line;
use crate::collectors::process::{for_each_line, ChildSlot};
use crate::collectors::record::ClassifiedRecord;

/// Records in flight between the capture thread and the UI.
pub const CHANNEL_CAPACITY: usize = 256;

pub const TOOL_PROGRAM: &str = "tcpdump";

/// Where captured traffic comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SourceKind {
    /// Live pcap handle, falling back to the dump tool.
    #[default]
    Auto,
    /// Live pcap handle only.
    Live,
    /// Text output of `tcpdump` only.
    Tool,
}

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub interface: String,
    pub source: SourceKind,
    /// Program run for the tool source.
    pub tool: String,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            interface: "any".into(),
            source: SourceKind::Auto,
            tool: TOOL_PROGRAM.into(),
        }
    }
}

/// Send counters kept by the producer, reported when it stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub sent: u64,
    pub dropped: u64,
}

/// Offers `record` without blocking. A full channel drops it. Returns `false`
/// once the receiving side is gone.
pub fn deliver(tx: &SyncSender<ClassifiedRecord>, record: ClassifiedRecord, stats: &mut Delivery) -> bool {
    match tx.try_send(record) {
        Ok(()) => {
            stats.sent += 1;
            true
        }
        Err(TrySendError::Full(_)) => {
            stats.dropped += 1;
            true
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}

/// Background producer feeding classified records into a bounded channel.
pub struct CaptureWorker {
    running: Arc<AtomicBool>,
    child: ChildSlot,
    handle: Option<thread::JoinHandle<()>>,
}

impl CaptureWorker {
    pub fn start(options: CaptureOptions) -> (Self, Receiver<ClassifiedRecord>) {
        let (tx, rx) = mpsc::sync_channel(CHANNEL_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));
        let child = ChildSlot::new();

        let flag = Arc::clone(&running);
        let slot = child.clone();
        let handle = thread::spawn(move || run(options, tx, flag, slot));

        let worker = Self {
            running,
            child,
            handle: Some(handle),
        };
        (worker, rx)
    }

    /// Signals the producer, unblocks it and waits for it to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.child.kill();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(options: CaptureOptions, tx: SyncSender<ClassifiedRecord>, running: Arc<AtomicBool>, child: ChildSlot) {
    info!(interface = %options.interface, source = ?options.source, "capture worker started");
    let mut stats = Delivery::default();

    let opened = match options.source {
        SourceKind::Live => open_live(&options.interface).map(|cap| pump_frames(cap, &tx, &running, &mut stats)),
        SourceKind::Tool => capture_tool(&options, &tx, &running, &child, &mut stats),
        SourceKind::Auto => match open_live(&options.interface) {
            Ok(cap) => {
                pump_frames(cap, &tx, &running, &mut stats);
                Ok(())
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), tool = %options.tool, "live capture unavailable, falling back to the dump tool");
                capture_tool(&options, &tx, &running, &child, &mut stats)
            }
        },
    };
    child.kill();

    if let Err(e) = opened {
        error!(error = %format!("{e:#}"), "capture source could not be opened");
    }
    debug!(dropped = stats.dropped, "records dropped on a full channel");
    info!(sent = stats.sent, dropped = stats.dropped, "capture worker stopped");
}

// ── Live capture ────────────────────────────────────────────

fn open_live(interface: &str) -> Result<pcap::Capture<pcap::Active>> {
    // Promiscuous first; some interfaces (loopback, `any`) refuse it.
    let open = |promisc: bool| {
        pcap::Capture::from_device(interface)
            .and_then(|c| c.promisc(promisc).snaplen(65535).timeout(100).immediate_mode(true).open())
    };
    open(true)
        .or_else(|_| open(false))
        .with_context(|| format!("opening live capture on {interface}"))
}

fn pump_frames(
    mut cap: pcap::Capture<pcap::Active>,
    tx: &SyncSender<ClassifiedRecord>,
    running: &AtomicBool,
    stats: &mut Delivery,
) {
    let link = LinkLayer::from_dlt(cap.get_datalink().0);
    debug!(?link, "live capture opened");

    while running.load(Ordering::Relaxed) {
        match cap.next_packet() {
            Ok(packet) => {
                let frame = RawFrame {
                    data: packet.data,
                    time: CaptureTime::from_timeval(packet.header.ts.tv_sec as i64, packet.header.ts.tv_usec as i64),
                    link,
                };
                if !deliver(tx, classify(&frame), stats) {
                    break;
                }
            }
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(e) => {
                warn!(error = %e, "live capture ended");
                break;
            }
        }
    }
}

// ── Dump tool ───────────────────────────────────────────────

pub fn tool_args(interface: &str) -> [&str; 5] {
    ["-l", "-n", "-tt", "-i", interface]
}

fn capture_tool(
    options: &CaptureOptions,
    tx: &SyncSender<ClassifiedRecord>,
    running: &AtomicBool,
    child: &ChildSlot,
    stats: &mut Delivery,
) -> Result<()> {
    run_tool(&options.tool, &tool_args(&options.interface), tx, running, child, stats)
}

/// Streams `program`'s output into the channel. A program that fails before
/// producing a single line could not open its source, which is an error.
fn run_tool(
    program: &str,
    args: &[&str],
    tx: &SyncSender<ClassifiedRecord>,
    running: &AtomicBool,
    child: &ChildSlot,
    stats: &mut Delivery,
) -> Result<()> {
    let stdout = child.spawn(program, args)?;
    // stop() may have run before the child was installed.
    if !running.load(Ordering::SeqCst) {
        return Ok(());
    }
    let exhausted = pump_lines(BufReader::new(stdout), tx, running, stats);
    if !exhausted || !running.load(Ordering::SeqCst) {
        return Ok(());
    }

    let Some(exit) = child.wait() else {
        return Ok(());
    };
    if exit.status.success() {
        return Ok(());
    }
    let detail = exit.stderr_tail.unwrap_or_else(|| "no error output".into());
    if stats.sent + stats.dropped == 0 {
        bail!("{program} exited with {}: {detail}", exit.status);
    }
    warn!(program, status = %exit.status, detail = %detail, "dump tool exited with an error");
    Ok(())
}

/// Parses each non-blank line of `reader` and offers it to the channel until
/// EOF, cancellation, or a disconnected receiver. Returns `true` only when the
/// reader ran dry.
pub fn pump_lines<R: BufRead>(
    reader: R,
    tx: &SyncSender<ClassifiedRecord>,
    running: &AtomicBool,
    stats: &mut Delivery,
) -> bool {
    for_each_line(reader, |line| {
        if !running.load(Ordering::Relaxed) {
            return false;
        }
        if line.trim().is_empty() {
            return true;
        }
        deliver(tx, parse_line(line), stats)
    })
}
