//! Server controls: folder, port, start/stop and theme toggle

use eframe::egui;

use crate::gui::constants::*;

/// Editable form values; committed to settings when the server starts
pub struct ControlsState {
    pub folder: String,
    pub port: u16,
}

impl ControlsState {
    pub fn new(folder: String, port: u16) -> Self {
        Self { folder, port }
    }
}

/// Something the user clicked that the manager has to act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Browse,
    AutoDetectPort,
    Start,
    Stop,
    ToggleTheme,
}

pub fn ui(
    ui: &mut egui::Ui,
    state: &mut ControlsState,
    running: bool,
    dark_mode: bool,
) -> Option<ControlAction> {
    let mut action = None;

    ui.group(|ui| {
        ui.label(egui::RichText::new("Server Controls").strong());
        ui.add_space(ITEM_SPACING);

        egui::Grid::new("server_controls_grid")
            .num_columns(3)
            .spacing([8.0, 8.0])
            .show(ui, |ui| {
                ui.label("Folder to serve:");
                ui.add_enabled(
                    !running,
                    egui::TextEdit::singleline(&mut state.folder)
                        .hint_text("Select folder to serve")
                        .desired_width(420.0),
                );
                if ui.add_enabled(!running, egui::Button::new("Browse")).clicked() {
                    action = Some(ControlAction::Browse);
                }
                ui.end_row();

                ui.label("Port:");
                ui.add_enabled(
                    !running,
                    egui::DragValue::new(&mut state.port).range(1..=u16::MAX),
                );
                if ui.add_enabled(!running, egui::Button::new("Auto-detect")).clicked() {
                    action = Some(ControlAction::AutoDetectPort);
                }
                ui.end_row();

                ui.label("");
                ui.horizontal(|ui| {
                    if ui.add_enabled(!running, egui::Button::new("▶ Start Server")).clicked() {
                        action = Some(ControlAction::Start);
                    }
                    if ui.add_enabled(running, egui::Button::new("⏹ Stop Server")).clicked() {
                        action = Some(ControlAction::Stop);
                    }
                });
                let theme_label = if dark_mode { "Switch to Light" } else { "Switch to Dark" };
                if ui.button(theme_label).clicked() {
                    action = Some(ControlAction::ToggleTheme);
                }
                ui.end_row();
            });
    });

    action
}
