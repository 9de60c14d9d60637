//! Access information: URL, copy button and QR code

use eframe::egui;

use crate::gui::constants::*;
use crate::qr::QrMatrix;

pub struct AccessInfo {
    pub url: String,
    qr: Result<QrMatrix, String>,
    pub copy_note: String,
}

impl AccessInfo {
    pub fn new(url: String) -> Self {
        let qr = QrMatrix::encode(&url).map_err(|e| e.to_string());
        Self {
            url,
            qr,
            copy_note: String::new(),
        }
    }

    pub fn qr_error(&self) -> Option<&str> {
        self.qr.as_ref().err().map(String::as_str)
    }
}

/// Renders the access panel and returns true if "Copy" was clicked
pub fn ui(ui: &mut egui::Ui, info: Option<&AccessInfo>) -> bool {
    let mut copy_clicked = false;

    ui.group(|ui| {
        ui.label(egui::RichText::new("Access Information").strong());
        ui.add_space(ITEM_SPACING);

        let Some(info) = info else {
            ui.label(egui::RichText::new("Start the server to get a URL and QR code")
                .italics()
                .weak());
            return;
        };

        ui.horizontal(|ui| {
            ui.vertical(|ui| {
                ui.label("Server URL:");
                ui.horizontal(|ui| {
                    let mut url = info.url.as_str();
                    ui.add(egui::TextEdit::singleline(&mut url).desired_width(300.0));
                    if ui.button("📋 Copy").clicked() {
                        copy_clicked = true;
                    }
                });
                if !info.copy_note.is_empty() {
                    ui.label(egui::RichText::new(&info.copy_note).small().weak());
                }
                ui.add_space(ITEM_SPACING);
                ui.hyperlink_to("Open in browser", &info.url);
            });

            ui.add_space(SECTION_SPACING);

            match &info.qr {
                Ok(matrix) => paint_qr(ui, matrix, QR_SIDE),
                Err(e) => {
                    ui.label(format!("QR generation failed: {e}"));
                }
            }
        });
    });

    copy_clicked
}

fn paint_qr(ui: &mut egui::Ui, matrix: &QrMatrix, max_side: f32) {
    let side = matrix.side();
    let module = (max_side / side as f32).floor().max(2.0);
    let draw_side = module * side as f32;

    let (rect, _) = ui.allocate_exact_size(egui::vec2(draw_side, draw_side), egui::Sense::hover());
    let painter = ui.painter_at(rect);
    painter.rect_filled(rect, 0.0, egui::Color32::WHITE);

    for y in 0..side {
        for x in 0..side {
            if matrix.is_dark(x, y) {
                let min = rect.min + egui::vec2(x as f32 * module, y as f32 * module);
                let module_rect = egui::Rect::from_min_size(min, egui::Vec2::splat(module));
                painter.rect_filled(module_rect, 0.0, egui::Color32::BLACK);
            }
        }
    }
}
