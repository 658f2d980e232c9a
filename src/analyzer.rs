use std::sync::mpsc::{Receiver, TryRecvError};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::info;

use crate::collectors::capture::{CaptureOptions, CaptureWorker};
use crate::collectors::history::HistoryBuffer;
use crate::collectors::record::ClassifiedRecord;

const PAGE: usize = 10;

/// Value copy of the record that was selected when the detail view opened.
/// Later evictions do not affect it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailSnapshot {
    pub selected_index: usize,
    pub record: ClassifiedRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    Listing,
    Detail(DetailSnapshot),
}

/// What the application should do after a key was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewOutcome {
    Stay,
    Back,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    /// Nothing received yet. Also where a failed source leaves the view.
    Starting,
    Running,
    Finished,
}

/// Consumer side of a capture: drains at most one record per tick into the
/// history and tracks the list/detail view.
pub struct FrameAnalyzer {
    rx: Receiver<ClassifiedRecord>,
    worker: Option<CaptureWorker>,
    history: HistoryBuffer,
    view: ViewState,
    cursor: usize,
    follow: bool,
    finished: bool,
    received: u64,
    detail_scroll: u16,
    interface: String,
}

impl FrameAnalyzer {
    pub fn start(options: CaptureOptions, capacity: usize) -> Self {
        let interface = options.interface.clone();
        let (worker, rx) = CaptureWorker::start(options);
        let mut analyzer = Self::from_receiver(rx, capacity);
        analyzer.worker = Some(worker);
        analyzer.interface = interface;
        analyzer
    }

    /// An analyzer fed by an existing channel, with no worker of its own.
    pub fn from_receiver(rx: Receiver<ClassifiedRecord>, capacity: usize) -> Self {
        Self {
            rx,
            worker: None,
            history: HistoryBuffer::with_capacity(capacity),
            view: ViewState::Listing,
            cursor: 0,
            follow: true,
            finished: false,
            received: 0,
            detail_scroll: 0,
            interface: String::new(),
        }
    }

    /// One non-blocking receive. Returns whether a record was appended.
    pub fn poll(&mut self) -> bool {
        if self.finished {
            return false;
        }
        match self.rx.try_recv() {
            Ok(record) => {
                self.received += 1;
                let evicted = self.history.append(record).is_some();
                if self.follow {
                    self.cursor = self.history.len() - 1;
                } else if evicted {
                    self.cursor = self.cursor.saturating_sub(1);
                }
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.finished = true;
                info!(received = self.received, "capture stream closed");
                false
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> ViewOutcome {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.abandon();
            return ViewOutcome::Quit;
        }

        if let ViewState::Detail(_) = self.view {
            match key.code {
                KeyCode::Char('b') | KeyCode::Char('q') | KeyCode::Esc => {
                    self.view = ViewState::Listing;
                    self.detail_scroll = 0;
                }
                KeyCode::Up | KeyCode::Char('k') => self.detail_scroll = self.detail_scroll.saturating_sub(1),
                KeyCode::Down | KeyCode::Char('j') => self.detail_scroll = self.detail_scroll.saturating_add(1),
                KeyCode::PageUp => self.detail_scroll = self.detail_scroll.saturating_sub(PAGE as u16),
                KeyCode::PageDown => self.detail_scroll = self.detail_scroll.saturating_add(PAGE as u16),
                _ => {}
            }
            return ViewOutcome::Stay;
        }

        match key.code {
            KeyCode::Char('q') => {
                self.abandon();
                return ViewOutcome::Quit;
            }
            KeyCode::Char('b') | KeyCode::Esc => {
                self.abandon();
                return ViewOutcome::Back;
            }
            KeyCode::Enter | KeyCode::Char(' ') => self.open_detail(),
            KeyCode::Up | KeyCode::Char('k') => self.move_up(1),
            KeyCode::Down | KeyCode::Char('j') => self.move_down(1),
            KeyCode::PageUp => self.move_up(PAGE),
            KeyCode::PageDown => self.move_down(PAGE),
            KeyCode::Home | KeyCode::Char('g') => self.move_up(usize::MAX),
            KeyCode::End | KeyCode::Char('G') => {
                self.follow = true;
                self.cursor = self.last_index();
            }
            KeyCode::Char('f') => {
                self.follow = !self.follow;
                if self.follow {
                    self.cursor = self.last_index();
                }
            }
            _ => {}
        }
        ViewOutcome::Stay
    }

    /// Stops the capture worker, if any. The history stays readable.
    pub fn abandon(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }

    fn open_detail(&mut self) {
        if let Some(record) = self.history.get(self.cursor) {
            self.view = ViewState::Detail(DetailSnapshot {
                selected_index: self.cursor,
                record: record.clone(),
            });
            self.detail_scroll = 0;
        }
    }

    fn move_up(&mut self, n: usize) {
        self.follow = false;
        self.cursor = self.cursor.saturating_sub(n);
    }

    fn move_down(&mut self, n: usize) {
        self.cursor = self.cursor.saturating_add(n).min(self.last_index());
    }

    fn last_index(&self) -> usize {
        self.history.len().saturating_sub(1)
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn follow(&self) -> bool {
        self.follow
    }

    pub fn detail_scroll(&self) -> u16 {
        self.detail_scroll
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn status(&self) -> CaptureStatus {
        match (self.received, self.finished) {
            (0, _) => CaptureStatus::Starting,
            (_, true) => CaptureStatus::Finished,
            (_, false) => CaptureStatus::Running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::capture::{deliver, Delivery, CHANNEL_CAPACITY};
    use crate::collectors::classify::{classify, CaptureTime, LinkLayer, RawFrame};
    use crate::collectors::record::{Draft, RawDump};
    use std::sync::mpsc::{self, SyncSender};

    fn rec(n: usize) -> ClassifiedRecord {
        Draft {
            timestamp: n.to_string(),
            protocol: "UDP".into(),
            source: "a".into(),
            destination: "b".into(),
            info: format!("seq={n}"),
        }
        .freeze(RawDump::Line(""))
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn analyzer(capacity: usize) -> (FrameAnalyzer, SyncSender<ClassifiedRecord>) {
        let (tx, rx) = mpsc::sync_channel(CHANNEL_CAPACITY);
        (FrameAnalyzer::from_receiver(rx, capacity), tx)
    }

    fn feed(a: &mut FrameAnalyzer, tx: &SyncSender<ClassifiedRecord>, range: std::ops::Range<usize>) {
        for n in range {
            tx.send(rec(n)).unwrap();
            assert!(a.poll());
        }
    }

    fn udp_frame(src_port: u16) -> Vec<u8> {
        let mut f = vec![0xff; 6];
        f.extend_from_slice(&[0x02, 0, 0, 0, 0, 1, 0x08, 0x00]);
        f.extend_from_slice(&[0x45, 0, 0, 29, 0, 0, 0x40, 0, 64, 17, 0, 0, 10, 0, 0, 1, 10, 0, 0, 2]);
        f.extend_from_slice(&src_port.to_be_bytes());
        f.extend_from_slice(&[0, 53, 0, 9, 0, 0, b'x']);
        f
    }

    #[test]
    fn test_starts_in_listing_and_starting() {
        let (a, _tx) = analyzer(10);
        assert_eq!(a.view(), &ViewState::Listing);
        assert_eq!(a.status(), CaptureStatus::Starting);
        assert!(a.history().is_empty());
    }

    #[test]
    fn test_poll_takes_one_record_per_call() {
        let (mut a, tx) = analyzer(10);
        for n in 0..3 {
            tx.send(rec(n)).unwrap();
        }
        assert!(a.poll());
        assert_eq!(a.history().len(), 1);
        assert!(a.poll());
        assert!(a.poll());
        assert!(!a.poll());
        assert_eq!(a.history().len(), 3);
        assert_eq!(a.status(), CaptureStatus::Running);
    }

    #[test]
    fn test_select_on_empty_buffer_stays_listing() {
        let (mut a, _tx) = analyzer(10);
        assert_eq!(a.handle_key(key(KeyCode::Enter)), ViewOutcome::Stay);
        assert_eq!(a.view(), &ViewState::Listing);
        assert_eq!(a.handle_key(key(KeyCode::Char(' '))), ViewOutcome::Stay);
        assert_eq!(a.view(), &ViewState::Listing);
    }

    #[test]
    fn test_select_opens_detail_snapshot() {
        let (mut a, tx) = analyzer(10);
        feed(&mut a, &tx, 0..3);
        a.handle_key(key(KeyCode::Up));
        a.handle_key(key(KeyCode::Enter));
        match a.view() {
            ViewState::Detail(snap) => {
                assert_eq!(snap.selected_index, 1);
                assert_eq!(snap.record.info(), "seq=1");
            }
            other => panic!("expected detail, got {other:?}"),
        }
    }

    #[test]
    fn test_close_detail_keeps_buffer() {
        for close in [KeyCode::Char('b'), KeyCode::Esc, KeyCode::Char('q')] {
            let (mut a, tx) = analyzer(10);
            feed(&mut a, &tx, 0..4);
            a.handle_key(key(KeyCode::Enter));
            assert!(matches!(a.view(), ViewState::Detail(_)));
            assert_eq!(a.handle_key(key(close)), ViewOutcome::Stay);
            assert_eq!(a.view(), &ViewState::Listing);
            assert_eq!(a.history().len(), 4);
        }
    }

    #[test]
    fn test_detail_snapshot_survives_eviction() {
        let (mut a, tx) = analyzer(2);
        feed(&mut a, &tx, 0..2);
        a.handle_key(key(KeyCode::Home));
        a.handle_key(key(KeyCode::Enter));
        feed(&mut a, &tx, 2..4);
        assert_eq!(a.history().get(0).unwrap().info(), "seq=2");
        match a.view() {
            ViewState::Detail(snap) => assert_eq!(snap.record.info(), "seq=0"),
            other => panic!("expected detail, got {other:?}"),
        }
    }

    #[test]
    fn test_records_arrive_while_in_detail() {
        let (mut a, tx) = analyzer(10);
        feed(&mut a, &tx, 0..1);
        a.handle_key(key(KeyCode::Enter));
        feed(&mut a, &tx, 1..5);
        assert_eq!(a.history().len(), 5);
        assert!(matches!(a.view(), ViewState::Detail(_)));
    }

    #[test]
    fn test_listing_back_and_quit() {
        let (mut a, _tx) = analyzer(10);
        assert_eq!(a.handle_key(key(KeyCode::Char('b'))), ViewOutcome::Back);
        assert_eq!(a.handle_key(key(KeyCode::Esc)), ViewOutcome::Back);
        assert_eq!(a.handle_key(key(KeyCode::Char('q'))), ViewOutcome::Quit);
    }

    #[test]
    fn test_ctrl_c_quits_from_detail() {
        let (mut a, tx) = analyzer(10);
        feed(&mut a, &tx, 0..1);
        a.handle_key(key(KeyCode::Enter));
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(a.handle_key(ctrl_c), ViewOutcome::Quit);
    }

    #[test]
    fn test_cursor_clamped() {
        let (mut a, tx) = analyzer(10);
        a.handle_key(key(KeyCode::Down));
        assert_eq!(a.cursor(), 0);
        feed(&mut a, &tx, 0..3);
        a.handle_key(key(KeyCode::PageDown));
        assert_eq!(a.cursor(), 2);
        a.handle_key(key(KeyCode::PageUp));
        assert_eq!(a.cursor(), 0);
        a.handle_key(key(KeyCode::Up));
        assert_eq!(a.cursor(), 0);
    }

    #[test]
    fn test_follow_tracks_newest() {
        let (mut a, tx) = analyzer(10);
        feed(&mut a, &tx, 0..3);
        assert!(a.follow());
        assert_eq!(a.cursor(), 2);
        a.handle_key(key(KeyCode::Up));
        assert!(!a.follow());
        feed(&mut a, &tx, 3..5);
        assert_eq!(a.cursor(), 1);
        a.handle_key(key(KeyCode::Char('f')));
        assert_eq!(a.cursor(), 4);
    }

    #[test]
    fn test_cursor_stays_on_record_through_eviction() {
        let (mut a, tx) = analyzer(3);
        feed(&mut a, &tx, 0..3);
        a.handle_key(key(KeyCode::Up));
        assert_eq!(a.history().get(a.cursor()).unwrap().info(), "seq=1");
        feed(&mut a, &tx, 3..4);
        assert_eq!(a.history().get(a.cursor()).unwrap().info(), "seq=1");
    }

    #[test]
    fn test_disconnect_without_records_stays_starting() {
        let (mut a, tx) = analyzer(10);
        drop(tx);
        assert!(!a.poll());
        assert_eq!(a.status(), CaptureStatus::Starting);
    }

    #[test]
    fn test_disconnect_after_records_is_finished() {
        let (mut a, tx) = analyzer(10);
        feed(&mut a, &tx, 0..1);
        drop(tx);
        assert!(!a.poll());
        assert_eq!(a.status(), CaptureStatus::Finished);
        assert!(!a.poll());
    }

    #[test]
    fn test_pipeline_keeps_last_thousand_udp_records() {
        let (tx, rx) = mpsc::sync_channel(CHANNEL_CAPACITY);
        let mut a = FrameAnalyzer::from_receiver(rx, 1000);
        let mut stats = Delivery::default();
        for n in 0..1500u16 {
            let data = udp_frame(n);
            let frame = RawFrame {
                data: &data,
                time: Some(CaptureTime { secs: 1_700_000_000, micros: n as i64 }),
                link: LinkLayer::Ethernet,
            };
            assert!(deliver(&tx, classify(&frame), &mut stats));
            assert!(a.poll());
        }
        assert_eq!(stats.dropped, 0);
        assert_eq!(a.history().len(), 1000);
        let first = a.history().get(0).unwrap();
        assert_eq!(first.protocol(), "UDP");
        assert_eq!(first.source(), "10.0.0.1:500");
        assert_eq!(a.history().get(999).unwrap().source(), "10.0.0.1:1499");
    }
}
