//! Operating system clipboard via `arboard`.
//!
//! Text is read first, then images. Images are stored as PNG bytes and
//! decoded back to RGBA when written.

use arboard::{Clipboard, ImageData};
use image::{ImageFormat, RgbaImage};
use log::debug;
use std::borrow::Cow;
use std::io::Cursor;
use std::sync::{Mutex, MutexGuard};

use super::{ClipSnapshot, ClipboardAccess, ClipboardError};
use crate::model::ClipKind;

/// Lazily opened system clipboard. A failed open is retried on the next call.
#[derive(Default)]
pub struct SystemClipboard {
    inner: Mutex<Option<Clipboard>>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_clipboard<T>(
        &self,
        f: impl FnOnce(&mut Clipboard) -> Result<T, ClipboardError>,
    ) -> Result<T, ClipboardError> {
        let mut guard: MutexGuard<'_, Option<Clipboard>> = self
            .inner
            .lock()
            .map_err(|e| ClipboardError::Access(e.to_string()))?;

        if guard.is_none() {
            let clipboard =
                Clipboard::new().map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
            debug!("Opened system clipboard");
            *guard = Some(clipboard);
        }

        match guard.as_mut() {
            Some(clipboard) => f(clipboard),
            None => Err(ClipboardError::Unavailable("clipboard not open".to_string())),
        }
    }
}

impl ClipboardAccess for SystemClipboard {
    fn read(&self) -> Result<ClipSnapshot, ClipboardError> {
        self.with_clipboard(|clipboard| {
            match clipboard.get_text() {
                Ok(text) if !text.is_empty() => return Ok(ClipSnapshot::text(text)),
                Ok(_) | Err(arboard::Error::ContentNotAvailable) => {}
                Err(e) => return Err(ClipboardError::Access(e.to_string())),
            }

            match clipboard.get_image() {
                Ok(image) => Ok(ClipSnapshot::new(encode_png(&image)?, ClipKind::Image)),
                Err(arboard::Error::ContentNotAvailable) => Ok(ClipSnapshot::empty()),
                Err(e) => Err(ClipboardError::Access(e.to_string())),
            }
        })
    }

    fn write(&self, content: &[u8], kind: ClipKind) -> Result<(), ClipboardError> {
        match kind {
            ClipKind::Text => {
                let text = String::from_utf8_lossy(content).into_owned();
                self.with_clipboard(|clipboard| {
                    clipboard
                        .set_text(text)
                        .map_err(|e| ClipboardError::Access(e.to_string()))
                })
            }
            ClipKind::Image => {
                let image = decode_png(content)?;
                self.with_clipboard(|clipboard| {
                    clipboard
                        .set_image(image)
                        .map_err(|e| ClipboardError::Access(e.to_string()))
                })
            }
            other => Err(ClipboardError::Unsupported(other)),
        }
    }
}

fn encode_png(image: &ImageData<'_>) -> Result<Vec<u8>, ClipboardError> {
    let rgba = RgbaImage::from_raw(
        image.width as u32,
        image.height as u32,
        image.bytes.to_vec(),
    )
    .ok_or_else(|| ClipboardError::Image("pixel buffer does not match dimensions".to_string()))?;

    let mut png = Vec::new();
    rgba.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| ClipboardError::Image(e.to_string()))?;
    Ok(png)
}

fn decode_png(bytes: &[u8]) -> Result<ImageData<'static>, ClipboardError> {
    let rgba = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| ClipboardError::Image(e.to_string()))?
        .to_rgba8();

    Ok(ImageData {
        width: rgba.width() as usize,
        height: rgba.height() as usize,
        bytes: Cow::Owned(rgba.into_raw()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_conversion_keeps_pixels() {
        let pixels: Vec<u8> = vec![255, 0, 0, 255, 0, 255, 0, 255];
        let image = ImageData {
            width: 2,
            height: 1,
            bytes: Cow::Owned(pixels.clone()),
        };

        let png = encode_png(&image).unwrap();
        assert_eq!(&png[1..4], b"PNG");

        let decoded = decode_png(&png).unwrap();
        assert_eq!((decoded.width, decoded.height), (2, 1));
        assert_eq!(decoded.bytes.as_ref(), pixels.as_slice());
    }

    #[test]
    fn test_mismatched_buffer_is_rejected() {
        let image = ImageData {
            width: 4,
            height: 4,
            bytes: Cow::Owned(vec![0; 3]),
        };
        assert!(matches!(encode_png(&image), Err(ClipboardError::Image(_))));
    }

    #[test]
    fn test_unknown_kind_is_unsupported() {
        let clipboard = SystemClipboard::new();
        let err = clipboard.write(b"x", ClipKind::Unknown).unwrap_err();
        assert!(matches!(err, ClipboardError::Unsupported(ClipKind::Unknown)));
    }
}
