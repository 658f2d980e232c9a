use crate::analyzer::{CaptureStatus, DetailSnapshot, FrameAnalyzer, ViewState};
use crate::collectors::record::ClassifiedRecord;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap},
};

pub fn render(f: &mut Frame, analyzer: &FrameAnalyzer, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // header
            Constraint::Min(5),    // list or detail
            Constraint::Length(2), // footer
        ])
        .split(area);

    render_header(f, analyzer, chunks[0]);
    match analyzer.view() {
        ViewState::Listing => render_listing(f, analyzer, chunks[1]),
        ViewState::Detail(snapshot) => render_detail(f, snapshot, analyzer.detail_scroll(), chunks[1]),
    }
    render_footer(f, analyzer, chunks[2]);
}

fn render_header(f: &mut Frame, analyzer: &FrameAnalyzer, area: Rect) {
    let now = chrono::Local::now().format("%H:%M:%S").to_string();
    let status = match analyzer.status() {
        CaptureStatus::Starting => Span::styled("◌ starting…", Style::default().fg(Color::Yellow)),
        CaptureStatus::Running => Span::styled("● CAPTURING", Style::default().fg(Color::Red).bold()),
        CaptureStatus::Finished => Span::styled("○ FINISHED", Style::default().fg(Color::DarkGray)),
    };
    let iface = if analyzer.interface().is_empty() { "-" } else { analyzer.interface() };
    let buffered = analyzer.history().len();
    let received = analyzer.received();

    let header = Paragraph::new(Line::from(vec![
        Span::styled(" framewatch ", Style::default().fg(Color::Cyan).bold()),
        Span::raw("│ Frame analyzer │ "),
        status,
        Span::raw(format!("  on {iface}  ({buffered} buffered, {received} received)  ")),
        Span::styled(now, Style::default().fg(Color::DarkGray)),
    ]))
    .block(
        Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(header, area);
}

fn render_listing(f: &mut Frame, analyzer: &FrameAnalyzer, area: Rect) {
    let history = analyzer.history();
    let total = history.len();
    let block = Block::default()
        .title(format!(" Frames ({total}) "))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    if total == 0 {
        let hint = match analyzer.status() {
            CaptureStatus::Finished => " capture ended",
            _ => " starting… waiting for the first frame",
        };
        let empty = Paragraph::new(hint)
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        f.render_widget(empty, area);
        return;
    }

    let header = Row::new(vec![
        Cell::from("Time").style(Style::default().fg(Color::Cyan).bold()),
        Cell::from("Source").style(Style::default().fg(Color::Cyan).bold()),
        Cell::from("Destination").style(Style::default().fg(Color::Cyan).bold()),
        Cell::from("Protocol").style(Style::default().fg(Color::Cyan).bold()),
        Cell::from("Info").style(Style::default().fg(Color::Cyan).bold()),
    ])
    .height(1);

    let visible_height = (area.height.saturating_sub(3) as usize).max(1); // borders + header
    let cursor = analyzer.cursor();
    let offset = (cursor + 1).saturating_sub(visible_height);

    let rows: Vec<Row> = history
        .iter()
        .enumerate()
        .skip(offset)
        .take(visible_height)
        .map(|(i, rec)| {
            let row_style = if i == cursor {
                Style::default().bg(Color::DarkGray)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(rec.timestamp().to_string()),
                Cell::from(rec.source().to_string()),
                Cell::from(rec.destination().to_string()),
                Cell::from(rec.protocol().to_string()).style(protocol_color(rec.protocol())),
                Cell::from(rec.info().to_string()),
            ])
            .style(row_style)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(18),
            Constraint::Length(28),
            Constraint::Length(28),
            Constraint::Length(9),
            Constraint::Min(20),
        ],
    )
    .header(header)
    .block(block);

    f.render_widget(table, area);
}

fn render_detail(f: &mut Frame, snapshot: &DetailSnapshot, scroll: u16, area: Rect) {
    let rec = &snapshot.record;
    let mut lines = field_lines(rec);
    lines.push(Line::from(""));
    lines.extend(rec.raw().iter().enumerate().map(|(i, line)| {
        // First raw line is the textual form, the rest is the hex dump.
        let color = if i == 0 { Color::White } else { Color::Green };
        Line::from(Span::styled(format!("  {line}"), Style::default().fg(color)))
    }));

    let detail = Paragraph::new(lines)
        .block(
            Block::default()
                .title(format!(" Record #{} ", snapshot.selected_index))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    f.render_widget(detail, area);
}

fn field_lines(rec: &ClassifiedRecord) -> Vec<Line<'_>> {
    [
        ("Time", rec.timestamp()),
        ("Protocol", rec.protocol()),
        ("Source", rec.source()),
        ("Destination", rec.destination()),
        ("Info", rec.info()),
    ]
    .into_iter()
    .map(|(label, value)| {
        Line::from(vec![
            Span::styled(format!("  {label:<12}"), Style::default().fg(Color::Cyan).bold()),
            Span::raw(value),
        ])
    })
    .collect()
}

fn render_footer(f: &mut Frame, analyzer: &FrameAnalyzer, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow).bold());
    let spans = match analyzer.view() {
        ViewState::Detail(_) => vec![
            key(" b/Esc"),
            Span::raw(":Close  "),
            key("↑↓"),
            Span::raw(":Scroll  "),
            key("Ctrl+C"),
            Span::raw(":Quit"),
        ],
        ViewState::Listing => {
            let mut spans = vec![
                key(" q"),
                Span::raw(":Quit  "),
                key("b/Esc"),
                Span::raw(":Back  "),
                key("↑↓"),
                Span::raw(":Scroll  "),
                key("Enter"),
                Span::raw(":Inspect  "),
                key("f"),
                Span::raw(":Follow"),
            ];
            if analyzer.follow() {
                spans.push(Span::styled(" [FOLLOW]", Style::default().fg(Color::Green).bold()));
            }
            spans
        }
    };

    let footer = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::TOP)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(footer, area);
}

fn protocol_color(proto: &str) -> Style {
    match proto {
        "TCP" => Style::default().fg(Color::Magenta),
        "UDP" => Style::default().fg(Color::Blue),
        "ICMP" | "ICMPv4" | "ICMPv6" => Style::default().fg(Color::Yellow),
        "ARP" => Style::default().fg(Color::Cyan),
        "APP" => Style::default().fg(Color::Green),
        _ => Style::default().fg(Color::White),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::record::{Draft, RawDump};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use ratatui::backend::TestBackend;
    use std::sync::mpsc::{self, SyncSender};

    fn screen(analyzer: &FrameAnalyzer) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|f| {
            let area = f.size();
            render(f, analyzer, area)
        }).unwrap();
        terminal.backend().buffer().content().iter().map(|c| c.symbol()).collect()
    }

    fn analyzer_with(n: usize) -> (FrameAnalyzer, SyncSender<ClassifiedRecord>) {
        let (tx, rx) = mpsc::sync_channel(16);
        let mut a = FrameAnalyzer::from_receiver(rx, 100);
        for i in 0..n {
            let rec = Draft {
                timestamp: format!("1700000000.00000{i}"),
                protocol: "UDP".into(),
                source: format!("10.0.0.{i}:53"),
                destination: "10.0.0.9:5353".into(),
                info: "len=12".into(),
            }
            .freeze(RawDump::Frame(b"abc"));
            tx.send(rec).unwrap();
            a.poll();
        }
        (a, tx)
    }

    #[test]
    fn test_render_starting() {
        let (a, _tx) = analyzer_with(0);
        let text = screen(&a);
        assert!(text.contains("starting…"));
        assert!(text.contains("Frames (0)"));
    }

    #[test]
    fn test_render_listing_rows() {
        let (a, _tx) = analyzer_with(3);
        let text = screen(&a);
        assert!(text.contains("Destination"));
        assert!(text.contains("10.0.0.2:53"));
        assert!(text.contains("CAPTURING"));
        assert!(text.contains("[FOLLOW]"));
    }

    #[test]
    fn test_render_detail() {
        let (mut a, _tx) = analyzer_with(2);
        a.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        let text = screen(&a);
        assert!(text.contains("Record #1"));
        assert!(text.contains("Destination"));
        assert!(text.contains("0000  61 62 63"));
        assert!(text.contains(":Close"));
    }

    #[test]
    fn test_render_tiny_area_does_not_panic() {
        let (a, _tx) = analyzer_with(5);
        let mut terminal = Terminal::new(TestBackend::new(10, 4)).unwrap();
        terminal.draw(|f| {
            let area = f.size();
            render(f, &a, area)
        }).unwrap();
    }
}
