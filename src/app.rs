use crate::analyzer::{FrameAnalyzer, ViewOutcome};
use crate::collectors::diagnostic::{CommandDiagnostic, Diagnostic};
use crate::config::Config;
use crate::event::{AppEvent, EventHandler};
use crate::ui;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuEntry {
    FrameAnalyzer,
    ArpTable,
    RoutingTable,
}

impl MenuEntry {
    pub const ALL: [MenuEntry; 3] = [MenuEntry::FrameAnalyzer, MenuEntry::ArpTable, MenuEntry::RoutingTable];

    pub fn label(self) -> &'static str {
        match self {
            MenuEntry::FrameAnalyzer => "Frame analyzer",
            MenuEntry::ArpTable => "ARP table",
            MenuEntry::RoutingTable => "Routing table",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            MenuEntry::FrameAnalyzer => "live capture, decoded frame by frame",
            MenuEntry::ArpTable => "ip neigh / arp -n",
            MenuEntry::RoutingTable => "ip route / netstat -rn",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Launcher,
    Analyzer,
    Diagnostic,
}

pub struct App {
    pub config: Config,
    pub screen: Screen,
    pub menu_selected: usize,
    pub analyzer: Option<FrameAnalyzer>,
    pub diagnostic: Option<CommandDiagnostic>,
    pub should_quit: bool,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            screen: Screen::Launcher,
            menu_selected: 0,
            analyzer: None,
            diagnostic: None,
            should_quit: false,
        }
    }

    /// One unit of background work for the active screen.
    pub fn tick(&mut self) {
        match self.screen {
            Screen::Analyzer => {
                if let Some(analyzer) = self.analyzer.as_mut() {
                    analyzer.poll();
                }
            }
            Screen::Diagnostic => {
                if let Some(diag) = self.diagnostic.as_mut() {
                    diag.poll();
                }
            }
            Screen::Launcher => {}
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        let ctrl_c = key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL);

        match self.screen {
            Screen::Launcher => match key.code {
                _ if ctrl_c => self.should_quit = true,
                KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
                KeyCode::Up | KeyCode::Char('k') => {
                    self.menu_selected = self.menu_selected.saturating_sub(1);
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    if self.menu_selected + 1 < MenuEntry::ALL.len() {
                        self.menu_selected += 1;
                    }
                }
                KeyCode::Enter | KeyCode::Char(' ') => self.launch(MenuEntry::ALL[self.menu_selected]),
                _ => {}
            },
            Screen::Analyzer => {
                let outcome = match self.analyzer.as_mut() {
                    Some(analyzer) => analyzer.handle_key(key),
                    None => ViewOutcome::Back,
                };
                match outcome {
                    ViewOutcome::Stay => {}
                    ViewOutcome::Back => self.back_to_launcher(),
                    ViewOutcome::Quit => {
                        self.analyzer = None;
                        self.should_quit = true;
                    }
                }
            }
            Screen::Diagnostic => match key.code {
                _ if ctrl_c => self.should_quit = true,
                KeyCode::Char('b') => self.back_to_launcher(),
                KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
                _ => {}
            },
        }
    }

    fn launch(&mut self, entry: MenuEntry) {
        info!(entry = entry.label(), "launching");
        match entry {
            MenuEntry::FrameAnalyzer => {
                self.analyzer = Some(FrameAnalyzer::start(self.config.capture.clone(), self.config.history));
                self.screen = Screen::Analyzer;
            }
            MenuEntry::ArpTable | MenuEntry::RoutingTable => {
                let mut diag = if entry == MenuEntry::ArpTable {
                    CommandDiagnostic::arp_table()
                } else {
                    CommandDiagnostic::routing_table()
                };
                diag.start();
                self.diagnostic = Some(diag);
                self.screen = Screen::Diagnostic;
            }
        }
    }

    // Dropping the handles stops their workers.
    fn back_to_launcher(&mut self) {
        self.analyzer = None;
        self.diagnostic = None;
        self.screen = Screen::Launcher;
    }
}

pub async fn run<B: Backend>(terminal: &mut Terminal<B>, config: Config) -> Result<()> {
    let mut events = EventHandler::new(Duration::from_millis(config.tick_ms));
    let mut app = App::new(config);

    loop {
        terminal.draw(|f| {
            let area = f.size();
            ui::render(f, &app, area);
        })?;

        match events.next().await? {
            AppEvent::Key(key) => app.handle_key(key),
            AppEvent::Resize => {}
            AppEvent::Tick => app.tick(),
        }

        if app.should_quit {
            info!("quitting");
            return Ok(());
        }
    }
}
