//! Server log component: scrolling, capped view of process output

use std::collections::VecDeque;

use eframe::egui;

use crate::gui::constants::*;
use crate::server::{LogLine, LogSource};

/// Append-only log lines in arrival order, oldest dropped past `max_lines`
pub struct LogView {
    lines: VecDeque<LogLine>,
    max_lines: usize,
    pub auto_scroll: bool,
}

impl LogView {
    pub fn new(max_lines: usize, auto_scroll: bool) -> Self {
        let max_lines = max_lines.max(1);
        Self {
            lines: VecDeque::with_capacity(max_lines.min(1024)),
            max_lines,
            auto_scroll,
        }
    }

    pub fn push(&mut self, line: LogLine) {
        if self.lines.len() >= self.max_lines {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Append everything from `lines`, returning how many arrived
    pub fn extend(&mut self, lines: impl IntoIterator<Item = LogLine>) -> usize {
        let mut count = 0;
        for line in lines {
            self.push(line);
            count += 1;
        }
        count
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }
}

/// Renders the log panel and returns true if the auto-scroll setting changed
pub fn ui(ui: &mut egui::Ui, view: &mut LogView) -> bool {
    let mut changed = false;

    ui.group(|ui| {
        ui.horizontal(|ui| {
            ui.label(egui::RichText::new("Server Log").strong());
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let label = if view.auto_scroll { "Auto-Scroll: ON" } else { "Auto-Scroll: OFF" };
                if ui.toggle_value(&mut view.auto_scroll, label).changed() {
                    changed = true;
                }
                if ui.button("Clear Log").clicked() {
                    view.clear();
                }
                ui.label(egui::RichText::new(format!("{} line(s)", view.len())).small().weak());
            });
        });

        ui.add_space(ITEM_SPACING);

        let row_height = ui.text_style_height(&egui::TextStyle::Monospace);
        let weak = ui.visuals().weak_text_color();
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .stick_to_bottom(view.auto_scroll)
            .show_rows(ui, row_height, view.len(), |ui, rows| {
                for line in view.iter().skip(rows.start).take(rows.len()) {
                    let text = egui::RichText::new(line.to_string()).monospace();
                    let text = match line.source {
                        LogSource::Server => text,
                        LogSource::System => text.color(weak),
                    };
                    ui.add(egui::Label::new(text).extend());
                }
            });
    });

    changed
}
