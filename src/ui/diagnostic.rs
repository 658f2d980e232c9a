use crate::collectors::diagnostic::Diagnostic;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph},
};

const TRAILER: &str = "Press esc to quit or b to go back.";

pub fn render(f: &mut Frame, diag: &dyn Diagnostic, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // header
            Constraint::Min(3),    // log
            Constraint::Length(2), // trailer
        ])
        .split(area);

    let status = if diag.is_finished() {
        Span::styled("○ done", Style::default().fg(Color::DarkGray))
    } else {
        Span::styled("● running", Style::default().fg(Color::Green).bold())
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled(format!(" {} ", diag.title()), Style::default().fg(Color::Cyan).bold()),
        Span::raw(format!("│ {}  ", diag.source())),
        status,
    ]))
    .block(
        Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(header, chunks[0]);

    let log = diag.log();
    let body: Vec<Line> = if log.is_empty() {
        let placeholder = if diag.is_finished() {
            " No output collected or command failed."
        } else {
            " working…"
        };
        vec![Line::from(Span::styled(placeholder, Style::default().fg(Color::DarkGray)))]
    } else {
        // Tail of the log when it outgrows the pane.
        let height = chunks[1].height.saturating_sub(2) as usize;
        log.iter()
            .skip(log.len().saturating_sub(height))
            .map(|l| Line::from(format!(" {l}")))
            .collect()
    };
    let pane = Paragraph::new(body).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(pane, chunks[1]);

    let trailer = if diag.is_finished() {
        format!(" Completed. {TRAILER}")
    } else {
        format!(" {TRAILER}")
    };
    let footer = Paragraph::new(Span::styled(trailer, Style::default().fg(Color::DarkGray))).block(
        Block::default()
            .borders(Borders::TOP)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(footer, chunks[2]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::diagnostic::Progress;
    use ratatui::backend::TestBackend;

    struct Fixed {
        log: Vec<String>,
        finished: bool,
    }

    impl Diagnostic for Fixed {
        fn title(&self) -> &str {
            "ARP table"
        }
        fn source(&self) -> String {
            "ip neigh show / arp -n".into()
        }
        fn start(&mut self) {}
        fn poll(&mut self) -> Progress {
            Progress::Finished
        }
        fn log(&self) -> &[String] {
            &self.log
        }
        fn is_finished(&self) -> bool {
            self.finished
        }
    }

    fn screen(diag: &Fixed, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, height)).unwrap();
        terminal.draw(|f| {
            let area = f.size();
            render(f, diag, area)
        }).unwrap();
        terminal.backend().buffer().content().iter().map(|c| c.symbol()).collect()
    }

    #[test]
    fn test_render_working_placeholder() {
        let text = screen(&Fixed { log: vec![], finished: false }, 12);
        assert!(text.contains("ARP table"));
        assert!(text.contains("working…"));
        assert!(text.contains("Press esc to quit or b to go back."));
        assert!(!text.contains("Completed."));
    }

    #[test]
    fn test_render_finished_log() {
        let log = vec!["10.0.0.1 dev eth0 lladdr 02:00:00:00:00:01 REACHABLE".to_string()];
        let text = screen(&Fixed { log, finished: true }, 12);
        assert!(text.contains("lladdr 02:00:00:00:00:01"));
        assert!(text.contains("Completed. Press esc"));
    }

    #[test]
    fn test_render_finished_empty() {
        let text = screen(&Fixed { log: vec![], finished: true }, 12);
        assert!(text.contains("command failed."));
    }

    #[test]
    fn test_render_shows_tail_of_long_log() {
        let log: Vec<String> = (0..50).map(|i| format!("entry-{i:02}")).collect();
        let text = screen(&Fixed { log, finished: false }, 12);
        assert!(text.contains("entry-49"));
        assert!(!text.contains("entry-00"));
    }
}
