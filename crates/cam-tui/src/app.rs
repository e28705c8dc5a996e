//! App — component-based event loop.
//!
//! - `App` owns the components and `AppState` (read-only for components).
//! - Terminal events and finished actions arrive as `AppMessage`s over mpsc.
//! - Device state, busy count, endpoint and loop phase are `watch` channels
//!   of the `Store`/`Reconciler`; the loop awaits them directly.
//! - Components return `Vec<Action>`; App dispatches each Action.
//! - Device intents pass the coordinator's gate synchronously, then run as
//!   spawned tasks holding their busy guard.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use ratatui::crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    Terminal,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::{
    action::Action,
    app_state::AppState,
    component::Component,
    components::{
        bitrate_picker::BitratePicker, device_panel::DevicePanel, endpoint_bar::EndpointBar,
        help_overlay::HelpOverlay, log_panel::LogPanel,
    },
    coordinator::{ActionReport, Coordinator, Intent},
    download::{DownloadStatus, Downloader},
    reconcile::Reconciler,
    remote::HttpDevice,
    store::Store,
    widgets::{
        status_bar::{self, InputMode},
        toast::ToastManager,
    },
};

// ── Internal event bus ────────────────────────────────────────────────────────

enum AppMessage {
    Event(Event),
    ActionFinished(Intent, ActionReport),
}

pub struct App {
    state: AppState,
    store: Store,
    coordinator: Coordinator<HttpDevice>,
    reconciler: Reconciler<HttpDevice>,
    downloader: Downloader,

    endpoint_bar: EndpointBar,
    device_panel: DevicePanel,
    bitrate_picker: BitratePicker,
    log_panel: LogPanel,
    help_overlay: HelpOverlay,
    toast: ToastManager,

    msg_tx: Option<mpsc::Sender<AppMessage>>,
    download_tx: mpsc::Sender<DownloadStatus>,
    download_rx: Option<mpsc::Receiver<DownloadStatus>>,
    should_quit: bool,
}

impl App {
    pub fn new(
        coordinator: Coordinator<HttpDevice>,
        reconciler: Reconciler<HttpDevice>,
        downloader: Downloader,
        log_path: PathBuf,
    ) -> Self {
        let store = coordinator.store().clone();
        let state = AppState::new(store.endpoint(), downloader.dir().to_path_buf(), log_path);
        let (download_tx, download_rx) = mpsc::channel(64);
        Self {
            state,
            store,
            coordinator,
            reconciler,
            downloader,
            endpoint_bar: EndpointBar::new(),
            device_panel: DevicePanel::new(),
            bitrate_picker: BitratePicker::new(),
            log_panel: LogPanel::new(),
            help_overlay: HelpOverlay::new(),
            toast: ToastManager::new(),
            msg_tx: None,
            download_tx,
            download_rx: Some(download_rx),
            should_quit: false,
        }
    }

    // ── Main run loop ─────────────────────────────────────────────────────────

    pub async fn run(mut self, mut log_rx: broadcast::Receiver<String>) -> anyhow::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        debug!("run(): terminal ready, size={:?}", terminal.size());

        let (tx, mut rx) = mpsc::channel::<AppMessage>(256);
        self.msg_tx = Some(tx.clone());
        let mut download_rx = self
            .download_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("App::run called twice"))?;

        // ── Background task: terminal events ─────────────────────────────────
        let event_tx = tx.clone();
        tokio::task::spawn_blocking(move || loop {
            match event::read() {
                Ok(ev) => {
                    if event_tx.blocking_send(AppMessage::Event(ev)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        });

        let mut snapshot_rx = self.store.subscribe_snapshot();
        let mut busy_rx = self.store.subscribe_busy();
        let mut endpoint_rx = self.store.endpoint_receiver();
        let mut phase_rx = self.reconciler.subscribe_phase();

        self.reconciler.start();

        // Toast expiry + spinner animation.
        let mut ui_tick = tokio::time::interval(Duration::from_millis(100));
        ui_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // ── Main loop ─────────────────────────────────────────────────────────
        let mut needs_redraw = true;
        let mut logs_open = true;
        loop {
            if needs_redraw {
                terminal.draw(|f| self.draw(f))?;
            }
            needs_redraw = true;

            if self.should_quit {
                break;
            }

            tokio::select! {
                Some(msg) = rx.recv() => {
                    self.handle_message(msg);
                }

                Ok(()) = snapshot_rx.changed() => {
                    let snapshot = snapshot_rx.borrow_and_update().clone();
                    if snapshot.is_known() {
                        self.state.last_sync = Some(chrono::Local::now());
                    }
                    self.state.snapshot = snapshot;
                    self.sync_input_mode();
                }

                Ok(()) = busy_rx.changed() => {
                    let busy = *busy_rx.borrow_and_update();
                    self.state.busy = busy;
                    if busy > 0 {
                        self.toast.spinner("waiting for device…");
                    } else {
                        self.toast.dismiss_spinner();
                    }
                }

                Ok(()) = endpoint_rx.changed() => {
                    self.state.endpoint = endpoint_rx.borrow_and_update().clone();
                }

                Ok(()) = phase_rx.changed() => {
                    self.state.loop_phase = *phase_rx.borrow_and_update();
                }

                Some(status) = download_rx.recv() => {
                    self.on_download(status);
                }

                msg = log_rx.recv(), if logs_open => match msg {
                    Ok(line) => self.state.push_log(line),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        self.state.push_log(format!("({} log lines dropped)", n));
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        logs_open = false;
                        needs_redraw = false;
                    }
                },

                _ = ui_tick.tick() => {
                    self.toast.tick();
                    needs_redraw = !self.toast.is_empty();
                }
            }
        }

        // ── Teardown ──────────────────────────────────────────────────────────
        self.reconciler.stop();
        info!("camctl exiting");
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        Ok(())
    }

    fn handle_message(&mut self, msg: AppMessage) {
        match msg {
            AppMessage::Event(Event::Key(key)) => {
                if key.kind == KeyEventKind::Release {
                    return;
                }
                for action in self.handle_key(key) {
                    self.dispatch(action);
                }
            }
            AppMessage::Event(_) => {}
            AppMessage::ActionFinished(intent, report) => self.on_report(&intent, report),
        }
    }

    // ── Key handling ──────────────────────────────────────────────────────────

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Action> {
        if key.code == KeyCode::Char('c') && key.modifiers == KeyModifiers::CONTROL {
            return vec![Action::Quit];
        }

        // Modal components take every key while open.
        if self.help_overlay.visible {
            return self.help_overlay.handle_key(key, &self.state);
        }
        match self.state.input_mode {
            InputMode::EditEndpoint => return self.endpoint_bar.handle_key(key, &self.state),
            InputMode::PickBitrate => return self.bitrate_picker.handle_key(key, &self.state),
            InputMode::Normal => {}
        }

        match key.code {
            KeyCode::Char('q') => return vec![Action::Quit],
            KeyCode::Char('?') => return vec![Action::ToggleHelp],
            KeyCode::Char('L') => return vec![Action::ToggleLogs],
            KeyCode::Char('e') => return vec![Action::EditEndpoint],
            _ => {}
        }

        if self.log_panel.expanded {
            let actions = self.log_panel.handle_key(key, &self.state);
            if !actions.is_empty() || is_scroll_key(key.code) {
                return actions;
            }
        }
        self.device_panel.handle_key(key, &self.state)
    }

    // ── Action dispatch ───────────────────────────────────────────────────────

    fn dispatch(&mut self, action: Action) {
        let secondary: Vec<Action> = {
            let s = &self.state;
            let mut out = Vec::new();
            out.extend(self.endpoint_bar.on_action(&action, s));
            out.extend(self.device_panel.on_action(&action, s));
            out.extend(self.bitrate_picker.on_action(&action, s));
            out.extend(self.log_panel.on_action(&action, s));
            out.extend(self.help_overlay.on_action(&action, s));
            out
        };

        self.apply_action(action);

        for a in secondary {
            self.apply_action(a);
        }
    }

    fn apply_action(&mut self, action: Action) {
        if action != Action::Noop {
            debug!("apply_action: {:?}", action);
        }
        match action {
            Action::Device(intent) => self.start_intent(intent),

            Action::EditEndpoint => self.state.input_mode = InputMode::EditEndpoint,
            Action::OpenBitratePicker => {
                if !self.state.controls().bitrate {
                    self.toast.info("Bitrate cannot be changed right now");
                    self.bitrate_picker.on_action(&Action::CloseBitratePicker, &self.state);
                } else if self.state.snapshot.supported_bitrates.is_empty() {
                    self.toast.info("Device offers no bitrates");
                    self.bitrate_picker.on_action(&Action::CloseBitratePicker, &self.state);
                } else {
                    self.state.input_mode = InputMode::PickBitrate;
                }
            }
            Action::CloseEndpointEditor | Action::CloseBitratePicker => {
                self.state.input_mode = InputMode::Normal;
            }

            Action::CopyToClipboard(text) => {
                match arboard::Clipboard::new().and_then(|mut cb| cb.set_text(text.clone())) {
                    Ok(()) => {
                        let display = if text.chars().count() > 40 {
                            format!("{}…", text.chars().take(40).collect::<String>())
                        } else {
                            text
                        };
                        self.toast.success(format!("copied: {}", display));
                    }
                    Err(e) => {
                        warn!("clipboard error: {}", e);
                        self.toast.error(format!("clipboard error: {}", e));
                    }
                }
            }

            Action::Quit => self.should_quit = true,

            Action::ToggleLogs | Action::ToggleHelp | Action::Noop => {}
        }
    }

    /// Gate the intent now; run the device calls in the background.
    fn start_intent(&mut self, intent: Intent) {
        let guard = match self.coordinator.try_begin(&intent) {
            Ok(guard) => guard,
            Err(report) => {
                self.on_report(&intent, report);
                return;
            }
        };
        let Some(tx) = self.msg_tx.clone() else {
            return;
        };
        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            let report = coordinator.perform(intent.clone(), guard).await;
            let _ = tx.send(AppMessage::ActionFinished(intent, report)).await;
        });
    }

    fn on_report(&mut self, intent: &Intent, report: ActionReport) {
        let label = intent.label();
        match report {
            ActionReport::Applied => match intent {
                Intent::ChangeEndpoint(url) => self.toast.success(format!("connected to {}", url)),
                _ => self.toast.success(format!("{}: done", label)),
            },
            ActionReport::Rejected(reason) => {
                self.toast.warning(format!("{}: {}", label, reason));
            }
            ActionReport::Failed(e) => {
                self.toast.error(format!("{} failed", label));
                self.state.push_log(format!("{}: {}", label, e));
            }
            ActionReport::Disabled => {
                self.toast.info(format!("{} unavailable right now", label));
            }
            ActionReport::Opened(url) => self.start_download(url),
        }
    }

    fn start_download(&mut self, url: String) {
        match self.downloader.start(url, self.download_tx.clone()) {
            Ok(()) => {
                self.state.download = self.downloader.status().clone();
                self.toast.info("downloading recordings…");
            }
            Err(e) => self.toast.warning(e),
        }
    }

    fn on_download(&mut self, status: DownloadStatus) {
        self.downloader.update(status);
        let status = self.downloader.status().clone();
        match &status {
            DownloadStatus::Finished(path) => {
                self.toast.success(format!("saved {}", path.display()));
            }
            DownloadStatus::Failed(e) => {
                self.toast.error("download failed");
                self.state.push_log(format!("download failed: {}", e));
            }
            _ => {}
        }
        self.state.download = status;
    }

    /// Leave the bitrate picker if the device state no longer allows it.
    fn sync_input_mode(&mut self) {
        if self.state.input_mode == InputMode::PickBitrate && !self.state.controls().bitrate {
            self.dispatch(Action::CloseBitratePicker);
        }
    }

    // ── Drawing ───────────────────────────────────────────────────────────────

    fn draw(&mut self, frame: &mut ratatui::Frame) {
        use crate::theme::C_BG;
        use ratatui::widgets::Block;

        let area = frame.area();
        frame.render_widget(
            Block::default().style(ratatui::style::Style::default().bg(C_BG)),
            area,
        );

        // endpoint | device | log | keys
        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(8),
                Constraint::Length(self.log_panel.height()),
                Constraint::Length(1),
            ])
            .split(area);

        let editing = self.state.input_mode == InputMode::EditEndpoint;
        self.endpoint_bar.draw(frame, outer[0], editing, &self.state);
        self.device_panel.draw(frame, outer[1], !editing, &self.state);
        let logs_focused = self.log_panel.expanded;
        self.log_panel.draw(frame, outer[2], logs_focused, &self.state);
        status_bar::draw_keys_bar(frame, outer[3], self.state.input_mode);

        if self.bitrate_picker.is_visible() {
            self.bitrate_picker.draw(frame, outer[1], true, &self.state);
        }
        if self.help_overlay.visible {
            self.help_overlay.draw(frame, area, true, &self.state);
        }
        self.toast.draw(frame, area);
    }
}

fn is_scroll_key(code: KeyCode) -> bool {
    matches!(
        code,
        KeyCode::Up
            | KeyCode::Down
            | KeyCode::PageUp
            | KeyCode::PageDown
            | KeyCode::Home
            | KeyCode::End
            | KeyCode::Char('j' | 'k' | 'g' | 'G')
    )
}
