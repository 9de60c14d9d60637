//! QR code matrix for the access URL

use qrcode::QrCode;
use qrcode::types::{Color, EcLevel, QrResult};

/// Light modules drawn around the code
pub const QUIET_ZONE: usize = 2;

/// Square grid of dark/light modules, quiet zone included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrMatrix {
    side: usize,
    dark: Vec<bool>,
}

impl QrMatrix {
    pub fn encode(text: &str) -> QrResult<Self> {
        let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::L)?;
        let width = code.width();
        let colors = code.to_colors();
        let side = width + 2 * QUIET_ZONE;

        let mut dark = vec![false; side * side];
        for y in 0..width {
            for x in 0..width {
                if colors[y * width + x] == Color::Dark {
                    dark[(y + QUIET_ZONE) * side + x + QUIET_ZONE] = true;
                }
            }
        }

        Ok(Self { side, dark })
    }

    /// Modules per side, quiet zone included
    pub fn side(&self) -> usize {
        self.side
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        x < self.side && y < self.side && self.dark[y * self.side + x]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_encodes_to_square_matrix() {
        let matrix = QrMatrix::encode("http://192.168.1.20:8081/").unwrap();
        // version 2 with EC level L, plus the quiet zone
        assert_eq!(matrix.side(), 25 + 2 * QUIET_ZONE);
    }

    #[test]
    fn test_quiet_zone_is_light() {
        let matrix = QrMatrix::encode("http://10.0.0.2:8000/").unwrap();
        let side = matrix.side();
        for i in 0..side {
            for q in 0..QUIET_ZONE {
                assert!(!matrix.is_dark(i, q));
                assert!(!matrix.is_dark(q, i));
                assert!(!matrix.is_dark(i, side - 1 - q));
                assert!(!matrix.is_dark(side - 1 - q, i));
            }
        }
        // finder pattern corner is dark
        assert!(matrix.is_dark(QUIET_ZONE, QUIET_ZONE));
        assert!(!matrix.is_dark(side, 0));
    }
}
