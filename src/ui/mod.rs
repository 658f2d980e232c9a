pub mod analyzer;
pub mod diagnostic;
pub mod launcher;

use crate::app::{App, Screen};
use ratatui::prelude::*;

pub fn render(f: &mut Frame, app: &App, area: Rect) {
    match (app.screen, app.analyzer.as_ref(), app.diagnostic.as_ref()) {
        (Screen::Analyzer, Some(analyzer), _) => analyzer::render(f, analyzer, area),
        (Screen::Diagnostic, _, Some(diag)) => diagnostic::render(f, diag, area),
        _ => launcher::render(f, app, area),
    }
}
