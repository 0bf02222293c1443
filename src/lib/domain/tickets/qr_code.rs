//! QR code generation for reservation tickets

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::ValueEnum;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{types::QrError, EcLevel, QrCode};
use thiserror::Error;

/// Side length of one QR module in pixels
pub const MODULE_SIZE: u32 = 10;

/// `Content-ID` of the QR image when it travels as an inline attachment
pub const QR_CONTENT_ID: &str = "qrcode";

/// Errors that can occur while drawing a QR code
#[derive(Debug, Error)]
pub enum QrCodeError {
    /// The payload does not fit into any QR version
    #[error("could not encode QR code: {0}")]
    Encode(#[from] QrError),

    /// The PNG could not be written
    #[error("could not write QR code image: {0}")]
    Image(#[from] image::ImageError),
}

/// How the QR image reaches the email client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum QrEmbedding {
    /// Embedded in the HTML as a `data:image/png;base64,...` URI
    #[default]
    DataUri,

    /// Attached as an inline MIME part and referenced as `cid:qrcode`
    Inline,
}

impl QrEmbedding {
    /// The `src` value the template uses for the QR image
    pub fn image_source(&self, image: &QrCodeImage) -> String {
        match self {
            Self::DataUri => image.to_data_uri(),
            Self::Inline => format!("cid:{QR_CONTENT_ID}"),
        }
    }
}

/// A rendered QR code, held in memory as PNG bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrCodeImage {
    png: Vec<u8>,
    width: u32,
}

impl QrCodeImage {
    /// Draws `payload` with low error correction, no quiet zone and
    /// [`MODULE_SIZE`] pixel modules. The version is picked to fit the payload.
    pub fn generate(payload: &str) -> Result<Self, QrCodeError> {
        let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::L)?;

        let image = code
            .render::<Luma<u8>>()
            .quiet_zone(false)
            .module_dimensions(MODULE_SIZE, MODULE_SIZE)
            .build();
        let width = image.width();

        let mut png = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(image).write_to(&mut png, ImageFormat::Png)?;

        Ok(Self {
            png: png.into_inner(),
            width,
        })
    }

    /// The PNG bytes
    pub fn as_png(&self) -> &[u8] {
        &self.png
    }

    /// Consumes the image, returning the PNG bytes
    pub fn into_png(self) -> Vec<u8> {
        self.png
    }

    /// Width (and height) of the image in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// The image as a `data:` URI for direct use in an `<img src>`
    pub fn to_data_uri(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.png))
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn test_generate_is_deterministic() -> TestResult {
        let first = QrCodeImage::generate("reservation_id: R123")?;
        let second = QrCodeImage::generate("reservation_id: R123")?;

        assert_eq!(first, second);

        Ok(())
    }

    #[test]
    fn test_generate_writes_png_without_border() -> TestResult {
        let payload = "reservation_id: R123";
        let qr = QrCodeImage::generate(payload)?;
        let modules = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::L)?.width();

        assert_eq!(&qr.as_png()[..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!(qr.width(), modules as u32 * MODULE_SIZE);

        let decoded = image::load_from_memory(qr.as_png())?.to_luma8();

        assert_eq!(decoded.width(), qr.width());
        assert_eq!(decoded.height(), qr.width());
        // the finder pattern starts at the very first pixel
        assert_eq!(decoded.get_pixel(0, 0)[0], 0);

        Ok(())
    }

    /// Reads the QR code back from a generated PNG. Readers need a light
    /// margin around the symbol, so the image is padded with white first.
    fn scan(qr: &QrCodeImage) -> Result<String, Box<dyn std::error::Error>> {
        let image = image::load_from_memory(qr.as_png())?.to_luma8();
        let margin = 4 * MODULE_SIZE;
        let side = (image.width() + 2 * margin) as usize;

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(side, side, |x, y| {
            let (x, y) = (x as u32, y as u32);

            if x < margin || y < margin || x >= image.width() + margin || y >= image.height() + margin {
                255
            } else {
                image.get_pixel(x - margin, y - margin)[0]
            }
        });

        let grids = prepared.detect_grids();
        let grid = grids.first().ok_or("no QR code found")?;
        let (_, content) = grid.decode()?;

        Ok(content)
    }

    #[test]
    fn test_generated_image_scans_back_to_payload() -> TestResult {
        let first = QrCodeImage::generate("reservation_id: R123")?;
        let second = QrCodeImage::generate("reservation_id: R123")?;

        assert_eq!(scan(&first)?, "reservation_id: R123");
        assert_eq!(scan(&second)?, "reservation_id: R123");

        Ok(())
    }

    #[test]
    fn test_different_payloads_give_different_images() -> TestResult {
        let first = QrCodeImage::generate("reservation_id: R123")?;
        let second = QrCodeImage::generate("reservation_id: R124")?;

        assert_ne!(first.as_png(), second.as_png());

        Ok(())
    }

    #[test]
    fn test_data_uri() -> TestResult {
        let qr = QrCodeImage::generate("reservation_id: 1")?;
        let uri = qr.to_data_uri();

        let prefix = "data:image/png;base64,";

        assert!(uri.starts_with(prefix));
        assert_eq!(STANDARD.decode(&uri[prefix.len()..])?, qr.as_png());

        Ok(())
    }

    #[test]
    fn test_image_source_per_embedding() -> TestResult {
        let qr = QrCodeImage::generate("reservation_id: 1")?;

        assert_eq!(QrEmbedding::Inline.image_source(&qr), "cid:qrcode");
        assert_eq!(QrEmbedding::DataUri.image_source(&qr), qr.to_data_uri());

        Ok(())
    }
}
