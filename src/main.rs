mod analyzer;
mod app;
mod collectors;
mod config;
mod event;
mod ui;

use std::fs::File;
use std::io::{self, Stdout};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from(Cli::parse());
    init_logging(&config)?;
    info!(interface = %config.capture.interface, source = ?config.capture.source, "framewatch starting");

    let mut terminal = setup_terminal()?;
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = restore_terminal();
        original_hook(panic);
    }));

    let result = app::run(&mut terminal, config).await;

    restore_terminal()?;
    terminal.show_cursor()?;

    if let Err(e) = &result {
        tracing::error!(error = %format!("{e:#}"), "framewatch exited with an error");
    }
    result
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let opened = (|| -> Result<_> {
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        Ok(Terminal::new(CrosstermBackend::new(stdout))?)
    })();
    undo_on_error(opened, restore_terminal)
}

/// Runs `undo` when `result` is an error, keeping the original error.
fn undo_on_error<T>(result: Result<T>, undo: impl FnOnce() -> Result<()>) -> Result<T> {
    if result.is_err() {
        if let Err(e) = undo() {
            tracing::warn!(error = %format!("{e:#}"), "terminal restore failed");
        }
    }
    result
}

fn restore_terminal() -> Result<()> {
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen)?;
    Ok(())
}

// stdout belongs to the TUI, so logs go to a file.
fn init_logging(config: &Config) -> Result<()> {
    let file = File::create(&config.log_file)
        .with_context(|| format!("creating log file {}", config.log_file.display()))?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_undo_runs_on_setup_failure() {
        let undone = Cell::new(false);
        let result: Result<()> = undo_on_error(Err(anyhow::anyhow!("no tty")), || {
            undone.set(true);
            Ok(())
        });
        assert!(undone.get());
        assert_eq!(result.unwrap_err().to_string(), "no tty");
    }

    #[test]
    fn test_undo_skipped_on_success() {
        let undone = Cell::new(false);
        let result = undo_on_error(Ok(7), || {
            undone.set(true);
            Ok(())
        });
        assert!(!undone.get());
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn test_undo_failure_keeps_setup_error() {
        let result: Result<()> = undo_on_error(Err(anyhow::anyhow!("no tty")), || Err(anyhow::anyhow!("restore")));
        assert_eq!(result.unwrap_err().to_string(), "no tty");
    }
}
