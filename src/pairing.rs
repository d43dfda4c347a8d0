//! Terminal rendering for interactive pairing codes.
//!
//! When bootstrap falls back to interactive pairing, the protocol client
//! emits pairing payloads; this module turns them into a scannable block
//! of unicode QR art.

use qrcode::{render::unicode, QrCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QrRenderError {
    #[error("QR generation failed: {0}")]
    GenerationFailed(String),
}

/// Render a pairing payload as unicode QR art for terminal display.
pub fn render_terminal(data: &str) -> Result<String, QrRenderError> {
    let code = QrCode::new(data.as_bytes())
        .map_err(|e| QrRenderError::GenerationFailed(e.to_string()))?;

    let image = code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build();

    Ok(image)
}
