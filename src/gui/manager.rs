//! GUI manager - egui-based interface for controlling the file server process

use anyhow::Result;
use eframe::egui;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use tracing::{error, info};

use crate::config::Settings;
use crate::error::ServerError;
use crate::gui::components::access_info::{self, AccessInfo};
use crate::gui::components::log_view::{self, LogView};
use crate::gui::components::server_controls::{self, ControlAction, ControlsState};
use crate::gui::constants::*;
use crate::net;
use crate::server::{Launcher, LogLine, ServerManager, SessionEvent, SessionInfo, StartRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoticeKind {
    Info,
    Warning,
    Error,
}

/// A message box the user has to dismiss
struct Notice {
    kind: NoticeKind,
    title: String,
    message: String,
}

impl Notice {
    fn from_error(err: &ServerError) -> Self {
        let kind = if err.is_user_error() {
            NoticeKind::Warning
        } else {
            NoticeKind::Error
        };
        Self {
            kind,
            title: err.title().to_string(),
            message: err.to_string(),
        }
    }
}

pub struct ServerGui {
    settings: Settings,
    manager: ServerManager,
    log_rx: Receiver<LogLine>,
    log_view: LogView,
    controls: ControlsState,
    access: Option<AccessInfo>,
    status_message: String,
    notice: Option<Notice>,
    shutdown: Arc<AtomicBool>,
}

impl ServerGui {
    pub fn new(cc: &eframe::CreationContext<'_>, settings: Settings, shutdown: Arc<AtomicBool>) -> Self {
        let (log_tx, log_rx) = mpsc::channel();
        apply_theme(&cc.egui_ctx, settings.dark_mode);

        Self {
            manager: ServerManager::new(Launcher::current_exe(), log_tx),
            log_rx,
            log_view: LogView::new(settings.max_log_lines, settings.auto_scroll),
            controls: ControlsState::new(settings.folder.clone(), settings.port),
            access: None,
            status_message: "Stopped".to_string(),
            notice: None,
            shutdown,
            settings,
        }
    }

    fn start_server(&mut self, ctx: &egui::Context) {
        if self.manager.is_running() {
            self.status_message = "Server already running!".to_string();
            return;
        }

        let requested = self.controls.port;
        let request = StartRequest {
            folder: PathBuf::from(self.controls.folder.trim()),
            preferred_port: requested,
            bind: self.settings.bind_address(),
            max_port_search: self.settings.max_port_search,
        };

        match self.manager.start(request) {
            Ok(session) => {
                if session.port != requested {
                    self.log_view.push(LogLine::system(format!(
                        "Port {requested} is in use, using port {} instead",
                        session.port
                    )));
                }
                self.log_view.push(LogLine::system(format!(
                    "Server started with PID {}",
                    session.pid
                )));
                self.show_session(ctx, &session, self.settings.copy_url_on_start);

                self.settings.folder = self.controls.folder.trim().to_string();
                self.settings.port = requested;
                self.save_settings();
            }
            Err(e) => {
                error!("Failed to start server: {e}");
                if matches!(e, ServerError::Spawn(_)) {
                    self.log_view.push(LogLine::system(format!("Could not start server: {e}")));
                }
                self.notice = Some(Notice::from_error(&e));
            }
        }
    }

    fn stop_server(&mut self) {
        match self.manager.stop() {
            Ok(Some(_)) => self.log_view.push(LogLine::system("Server process stopped.")),
            Ok(None) => {
                self.status_message = "Server not running".to_string();
                return;
            }
            Err(e) => {
                error!("Failed to stop server: {e}");
                self.log_view.push(LogLine::system(format!("Error stopping server: {e}")));
            }
        }
        self.clear_session();
    }

    /// Show the URL and QR code for the port the server actually bound
    fn show_session(&mut self, ctx: &egui::Context, session: &SessionInfo, copy_url: bool) {
        let host = net::advertised_host(session.bind);
        let url = net::access_url(host, session.port);
        let mut access = AccessInfo::new(url);

        if let Some(e) = access.qr_error() {
            self.log_view.push(LogLine::system(format!("QR generation failed: {e}")));
        }
        if copy_url {
            ctx.copy_text(access.url.clone());
            access.copy_note = "URL copied to clipboard.".to_string();
        }

        info!("Access URL: {}", access.url);
        self.controls.port = session.port;
        self.access = Some(access);
        self.status_message = format!("Running on port {}", session.port);
    }

    fn clear_session(&mut self) {
        self.access = None;
        self.status_message = "Stopped".to_string();
    }

    fn check_server_status(&mut self, ctx: &egui::Context) {
        let Some(event) = self.manager.poll() else {
            return;
        };

        match event {
            SessionEvent::Rebound { from, to, pid } => {
                self.log_view.push(LogLine::system(format!(
                    "Port {from} was taken before the server could bind, restarted on port {to} (PID {pid})"
                )));
                if let Some(session) = self.manager.session().cloned() {
                    self.show_session(ctx, &session, self.settings.copy_url_on_start);
                }
            }
            SessionEvent::Exited { port, status } => {
                self.log_view.push(LogLine::system(format!(
                    "Server on port {port} exited: {status}"
                )));
                self.clear_session();
            }
            SessionEvent::RetryFailed { port, error } => {
                self.log_view.push(LogLine::system(format!(
                    "Port {port} was taken and no replacement could be started: {error}"
                )));
                self.notice = Some(Notice::from_error(&error));
                self.clear_session();
            }
            SessionEvent::Lost { port, error } => {
                self.log_view.push(LogLine::system(format!(
                    "Lost track of the server on port {port} ({error}), stopped it"
                )));
                self.clear_session();
            }
        }
    }

    fn auto_detect_port(&mut self) {
        match net::find_free_port(
            self.settings.port,
            self.settings.bind_address(),
            self.settings.max_port_search,
        ) {
            Ok(port) => {
                self.controls.port = port;
                self.notice = Some(Notice {
                    kind: NoticeKind::Info,
                    title: "Port detected".to_string(),
                    message: format!("Found free port: {port}"),
                });
            }
            Err(e) => {
                self.notice = Some(Notice {
                    kind: NoticeKind::Warning,
                    title: "Port detect error".to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    fn browse_folder(&mut self) {
        let mut dialog = rfd::FileDialog::new().set_title("Select folder to serve");
        let current = PathBuf::from(self.controls.folder.trim());
        if current.is_dir() {
            dialog = dialog.set_directory(&current);
        }
        if let Some(folder) = dialog.pick_folder() {
            self.controls.folder = folder.display().to_string();
        }
    }

    fn toggle_theme(&mut self, ctx: &egui::Context) {
        self.settings.dark_mode = !self.settings.dark_mode;
        apply_theme(ctx, self.settings.dark_mode);
        self.save_settings();
    }

    fn save_settings(&self) {
        if let Err(e) = self.settings.save_preferences() {
            error!("Failed to save config: {e:?}");
        }
    }

    fn handle_action(&mut self, ctx: &egui::Context, action: ControlAction) {
        match action {
            ControlAction::Browse => self.browse_folder(),
            ControlAction::AutoDetectPort => self.auto_detect_port(),
            ControlAction::Start => self.start_server(ctx),
            ControlAction::Stop => self.stop_server(),
            ControlAction::ToggleTheme => self.toggle_theme(ctx),
        }
    }

    fn show_notice(&mut self, ctx: &egui::Context) {
        let Some(notice) = &self.notice else {
            return;
        };

        let mut dismissed = false;
        egui::Window::new(&notice.title)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                let text = egui::RichText::new(&notice.message);
                let text = match notice.kind {
                    NoticeKind::Info => text,
                    NoticeKind::Warning => text.color(ui.visuals().warn_fg_color),
                    NoticeKind::Error => text.color(ui.visuals().error_fg_color),
                };
                ui.label(text);
                ui.add_space(ITEM_SPACING);
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });

        if dismissed {
            self.notice = None;
        }
    }
}

impl eframe::App for ServerGui {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.shutdown.load(Ordering::Relaxed) {
            info!("Shutdown signal received, closing");
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        self.log_view.extend(self.log_rx.try_iter());
        self.check_server_status(ctx);

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(format!("Status: {}", self.status_message));
                if let Some(session) = self.manager.session() {
                    ui.separator();
                    ui.label(format!("PID: {}", session.pid));
                    ui.separator();
                    ui.label(format!("Uptime: {}s", session.started_at.elapsed().as_secs()));
                }
            });
        });

        let mut action = None;
        let mut copy_clicked = false;
        let mut auto_scroll_changed = false;

        egui::CentralPanel::default().show(ctx, |ui| {
            let running = self.manager.is_running();
            action = server_controls::ui(ui, &mut self.controls, running, self.settings.dark_mode);

            ui.add_space(SECTION_SPACING);
            copy_clicked = access_info::ui(ui, self.access.as_ref());

            ui.add_space(SECTION_SPACING);
            auto_scroll_changed = log_view::ui(ui, &mut self.log_view);
        });

        if let Some(action) = action {
            self.handle_action(ctx, action);
        }
        if copy_clicked && let Some(access) = &mut self.access {
            ctx.copy_text(access.url.clone());
            access.copy_note = "URL copied to clipboard.".to_string();
        }
        if auto_scroll_changed {
            self.settings.auto_scroll = self.log_view.auto_scroll;
            self.save_settings();
        }

        self.show_notice(ctx);

        // Keep polling the log channel and process status
        ctx.request_repaint_after(REPAINT_INTERVAL);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        // Never leave the server running after the window closes
        if let Err(e) = self.manager.stop() {
            error!("Failed to stop server on exit: {e}");
        }
    }
}

fn apply_theme(ctx: &egui::Context, dark_mode: bool) {
    let visuals = if dark_mode {
        egui::Visuals::dark()
    } else {
        egui::Visuals::light()
    };
    ctx.set_visuals(visuals);
}

pub fn run_gui(settings: Settings) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));

    #[cfg(unix)]
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))?;
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([WINDOW_WIDTH, WINDOW_HEIGHT])
            .with_min_inner_size([MIN_WINDOW_WIDTH, MIN_WINDOW_HEIGHT])
            .with_title(APP_TITLE),
        ..Default::default()
    };

    eframe::run_native(
        APP_TITLE,
        options,
        Box::new(move |cc| Ok(Box::new(ServerGui::new(cc, settings, shutdown)))),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run egui application: {}", e))?;

    Ok(())
}
