use crate::app::{App, MenuEntry};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, Paragraph},
};

pub fn render(f: &mut Frame, app: &App, area: Rect) {
    let popup_width = 60.min(area.width);
    let popup_height = (MenuEntry::ALL.len() as u16 * 2 + 5).min(area.height);
    let x = area.x + area.width.saturating_sub(popup_width) / 2;
    let y = area.y + area.height.saturating_sub(popup_height) / 2;
    let popup = Rect::new(x, y, popup_width, popup_height);

    f.render_widget(Clear, popup);
    let block = Block::default()
        .title(" framewatch ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(popup);
    f.render_widget(block, popup);

    let mut lines: Vec<Line> = Vec::new();
    for (i, entry) in MenuEntry::ALL.iter().enumerate() {
        let selected = i == app.menu_selected;
        let marker = if selected { " ▶ " } else { "   " };
        let label_style = if selected {
            Style::default().fg(Color::Yellow).bold()
        } else {
            Style::default().fg(Color::White)
        };
        lines.push(Line::from(vec![
            Span::styled(marker, Style::default().fg(Color::Yellow)),
            Span::styled(entry.label(), label_style),
        ]));
        lines.push(Line::from(Span::styled(
            format!("     {}", entry.description()),
            Style::default().fg(Color::DarkGray),
        )));
    }
    let menu_height = inner.height.saturating_sub(1);
    f.render_widget(Paragraph::new(lines), Rect::new(inner.x, inner.y, inner.width, menu_height));

    let footer = Paragraph::new(Line::from(vec![
        Span::styled("↑↓", Style::default().fg(Color::Yellow).bold()),
        Span::raw(":Select  "),
        Span::styled("Enter", Style::default().fg(Color::Yellow).bold()),
        Span::raw(":Start  "),
        Span::styled("q", Style::default().fg(Color::Yellow).bold()),
        Span::raw(":Quit"),
    ]))
    .alignment(Alignment::Center);
    let footer_area = Rect::new(inner.x, inner.y + menu_height, inner.width, inner.height.min(1));
    f.render_widget(footer, footer_area);
}
