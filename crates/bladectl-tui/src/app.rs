//! Application core: event loop, key routing, action dispatch, rendering.

use std::time::Duration;

use color_eyre::eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Cell, Paragraph, Row, Table},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use bladectl_config::Config;
use bladectl_core::{
    Key, KeyRepeater, LoopStats, ObservedState, Reconciler, SimulatedBlade, TargetState,
};

use crate::action::Action;
use crate::bridge::spawn_state_bridge;
use crate::event::{Event, EventReader};
use crate::theme;
use crate::tui::Tui;

/// What a terminal key means to the app, before press/release is considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyIntent {
    Quit,
    Blade(Key),
    Ignore,
}

fn classify(key: &KeyEvent, slots: usize) -> KeyIntent {
    match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) | (_, KeyCode::Esc) => KeyIntent::Quit,
        (m, KeyCode::Char(c)) if !m.contains(KeyModifiers::CONTROL) => {
            if c == 'q' {
                return KeyIntent::Quit;
            }
            Key::from_char(c, slots).map_or(KeyIntent::Ignore, KeyIntent::Blade)
        }
        _ => KeyIntent::Ignore,
    }
}

/// Top-level application state and event loop.
pub struct App {
    reconciler: Reconciler<SimulatedBlade>,
    blade: SimulatedBlade,
    keys: KeyRepeater<SimulatedBlade>,
    /// Latest records as delivered by the state bridge.
    observed: ObservedState,
    target: TargetState,
    stats: LoopStats,
    /// Whether the terminal reports key releases; without them every
    /// press is a single tap.
    key_releases: bool,
    running: bool,
    action_tx: mpsc::UnboundedSender<Action>,
    action_rx: mpsc::UnboundedReceiver<Action>,
}

impl App {
    /// Build the reconciler against a simulated blade and align its target
    /// with the blade's current values.
    pub fn new(config: &Config) -> Result<Self> {
        let blade = SimulatedBlade::new(config.simulator_config());
        let reconciler = Reconciler::new(config.reconciler_settings(), blade.clone())?;
        blade.attach(&reconciler);
        reconciler.sync_target_from_observed();

        let (action_tx, action_rx) = mpsc::unbounded_channel();
        Ok(Self {
            observed: reconciler.observed(),
            target: reconciler.target(),
            stats: reconciler.stats(),
            keys: KeyRepeater::new(reconciler.clone()),
            reconciler,
            blade,
            key_releases: false,
            running: true,
            action_tx,
            action_rx,
        })
    }

    /// Run the main event loop until the operator quits.
    pub async fn run(&mut self) -> Result<()> {
        let mut tui = Tui::new()?;
        tui.enter()?;
        self.key_releases = tui.key_releases();

        let cancel = CancellationToken::new();
        tokio::spawn(spawn_state_bridge(
            self.reconciler.clone(),
            self.action_tx.clone(),
            cancel.clone(),
        ));

        let mut events = EventReader::new(
            Duration::from_millis(250), // 4 Hz tick
            Duration::from_millis(33),  // ~30 FPS render
        );

        info!(slots = self.reconciler.settings().slots, "TUI event loop started");

        while self.running {
            let Some(event) = events.next().await else {
                break;
            };

            let action = match event {
                Event::KeyPress(key) => self.handle_key_event(&key, true),
                Event::KeyRelease(key) => self.handle_key_event(&key, false),
                Event::Resize(w, h) => Some(Action::Resize(w, h)),
                Event::FocusLost => Some(Action::FocusLost),
                Event::Tick => Some(Action::Tick),
                Event::Render => Some(Action::Render),
            };
            if let Some(action) = action {
                self.action_tx.send(action)?;
            }

            while let Ok(action) = self.action_rx.try_recv() {
                if action == Action::Render {
                    tui.draw(|frame| self.render(frame))?;
                } else {
                    self.process_action(action);
                }
            }
        }

        self.keys.release_all();
        cancel.cancel();
        events.stop();
        self.blade.shutdown();
        tui.exit()?;
        info!(stats = ?self.reconciler.stats(), "TUI event loop ended");
        Ok(())
    }

    /// Map a key event to an action. Quit keys only act on press.
    fn handle_key_event(&self, key: &KeyEvent, pressed: bool) -> Option<Action> {
        let slots = self.reconciler.settings().slots;
        if !pressed {
            // Modifiers pressed after the key must not strand its timer.
            return match key.code {
                KeyCode::Char(c) => Key::from_char(c, slots).map(Action::KeyUp),
                _ => None,
            };
        }
        match classify(key, slots) {
            KeyIntent::Quit => Some(Action::Quit),
            KeyIntent::Blade(k) if self.key_releases => Some(Action::KeyDown(k)),
            KeyIntent::Blade(k) => Some(Action::KeyTap(k)),
            KeyIntent::Ignore => {
                trace!(code = ?key.code, "unmapped key");
                None
            }
        }
    }

    fn process_action(&mut self, action: Action) {
        match action {
            Action::Quit => {
                self.keys.release_all();
                self.running = false;
            }
            // No release will arrive for keys held while unfocused.
            Action::FocusLost => {
                debug!("focus lost, releasing held keys");
                self.keys.release_all();
            }
            Action::KeyDown(key) => self.keys.key_down(key),
            Action::KeyUp(key) => self.keys.key_up(key),
            Action::KeyTap(key) => self.keys.fire_once(key),
            Action::ObservedUpdated(observed) => self.observed = observed,
            Action::TargetUpdated(target) => self.target = target,
            Action::Tick => self.stats = self.reconciler.stats(),
            Action::Resize(w, h) => debug!(w, h, "terminal resized"),
            Action::Render => {}
        }
    }

    // ── Rendering ───────────────────────────────────────────────────

    fn render(&self, frame: &mut Frame) {
        let [table_area, status_area] =
            Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(frame.area());

        self.render_slots(frame, table_area);
        self.render_status_bar(frame, status_area);
    }

    fn render_slots(&self, frame: &mut Frame, area: Rect) {
        let header = Row::new(["", "Slot", "Hue", "→ target", "Saturation", "→ target"])
            .style(theme::table_header());

        let rows = self
            .target
            .adjustments
            .iter()
            .zip(&self.observed.adjustments)
            .enumerate()
            .map(|(slot, (want, have))| {
                let marker = match (
                    self.target.selected == slot,
                    self.observed.selected == Some(slot),
                ) {
                    (true, true) => "▶●",
                    (true, false) => "▶ ",
                    (false, true) => " ●",
                    (false, false) => "  ",
                };
                let value = |have: f64, want: f64, text: String| {
                    #[allow(clippy::float_cmp)]
                    let style = if have == want {
                        Style::default()
                    } else {
                        theme::pending_value()
                    };
                    Cell::from(Span::styled(text, style))
                };
                let row = Row::new([
                    Cell::from(marker),
                    Cell::from(slot.to_string()),
                    value(have.hue, want.hue, format!("{:+.2}", have.hue)),
                    Cell::from(format!("{:+.2}", want.hue)),
                    value(have.saturation, want.saturation, format!("{:.2}", have.saturation)),
                    Cell::from(format!("{:.2}", want.saturation)),
                ]);
                if self.target.selected == slot {
                    row.style(theme::table_selected())
                } else {
                    row.style(theme::table_row())
                }
            });

        let output = match self.observed.selected {
            Some(slot) => format!(" output: slot {slot} "),
            None => " output: foreign source ".to_string(),
        };
        let block = Block::default()
            .title(" bladectl ")
            .title_bottom(Line::from(output).right_aligned())
            .title_style(theme::title_style())
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(theme::border_default());

        let widths = [
            Constraint::Length(2),
            Constraint::Length(4),
            Constraint::Length(8),
            Constraint::Length(9),
            Constraint::Length(11),
            Constraint::Length(9),
        ];
        frame.render_widget(Table::new(rows, widths).header(header).block(block), area);
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let in_sync = self.reconciler.compute_pending_actions().is_empty();
        let state = if self.stats.active || !in_sync {
            Span::styled("◐ converging", Style::default().fg(theme::ELECTRIC_YELLOW))
        } else {
            Span::styled("● in sync", Style::default().fg(theme::SUCCESS_GREEN))
        };
        let failures_style = if self.stats.failures > 0 {
            Style::default().fg(theme::ERROR_RED)
        } else {
            theme::key_hint()
        };

        let last_slot = self.reconciler.settings().slots.saturating_sub(1).min(9);
        let mode = if self.key_releases { "hold" } else { "tap" };
        let hint = |key: String, label: &str| {
            [
                Span::styled(key, theme::key_hint_key()),
                Span::styled(format!(" {label}  "), theme::key_hint()),
            ]
        };

        let mut spans = vec![
            Span::raw(" "),
            state,
            Span::styled(
                format!(
                    " │ passes {} writes {} ",
                    self.stats.passes,
                    self.blade.writes()
                ),
                theme::key_hint(),
            ),
            Span::styled(format!("failures {}", self.stats.failures), failures_style),
            Span::styled(format!(" │ {mode} │ "), theme::key_hint()),
        ];
        spans.extend(hint(format!("0-{last_slot}"), "select"));
        spans.extend(hint("e/d".into(), "hue"));
        spans.extend(hint("r/f".into(), "sat"));
        spans.extend(hint("q".into(), "quit"));

        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }
}
