//! Image cropping and downscaling for the vision pipeline.

use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use serde_json::Value;
use std::io::Cursor;
use std::path::Path;
use uuid::Uuid;

use errata_core::{Error, Result};

/// A region as fractions (0 to 1) of the image's width and height.
///
/// Missing offsets mean 0; missing extents mean the full side.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BBox {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub w: Option<f64>,
    pub h: Option<f64>,
}

impl BBox {
    /// Read `{x, y, w, h}` from a model reply. `None` for null or an empty object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object().filter(|o| !o.is_empty())?;
        let field = |k: &str| obj.get(k).and_then(Value::as_f64);
        Some(Self {
            x: field("x"),
            y: field("y"),
            w: field("w"),
            h: field("h"),
        })
    }

    /// Pixel rectangle `(left, top, right, bottom)` inside a `width`×`height` image.
    ///
    /// `left`/`top` are clamped onto the last column/row at most, and
    /// `right`/`bottom` are kept at least one pixel past them, so a box past
    /// the edge still yields a 1-pixel strip.
    pub fn to_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let (wf, hf) = (f64::from(width), f64::from(height));
        let x = self.x.unwrap_or(0.0);
        let y = self.y.unwrap_or(0.0);
        let w = self.w.unwrap_or(1.0);
        let h = self.h.unwrap_or(1.0);

        let last_col = i64::from(width.saturating_sub(1));
        let last_row = i64::from(height.saturating_sub(1));
        let left = ((x * wf).floor() as i64).clamp(0, last_col);
        let top = ((y * hf).floor() as i64).clamp(0, last_row);
        let right = ((x + w) * wf).floor() as i64;
        let bottom = ((y + h) * hf).floor() as i64;
        let right = right.min(i64::from(width)).max(left + 1);
        let bottom = bottom.min(i64::from(height)).max(top + 1);

        (left as u32, top as u32, right as u32, bottom as u32)
    }
}

fn image_err(e: image::ImageError) -> Error {
    Error::Image(e.to_string())
}

/// Decode an image, sniffing the format from its bytes.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(image_err)
}

/// Crop `bbox` out of the image at `image_path` and save it as
/// `crop_<uuid>.png` in `crop_dir`. Returns the file name.
pub fn crop_to_file(image_path: &Path, bbox: &BBox, crop_dir: &Path) -> Result<String> {
    let img = load_image(image_path)?;
    if img.width() == 0 || img.height() == 0 {
        return Err(Error::Image("Cannot crop an empty image".to_string()));
    }
    let (left, top, right, bottom) = bbox.to_pixels(img.width(), img.height());
    let cropped = img.crop_imm(left, top, right - left, bottom - top);

    let filename = format!("crop_{}.png", Uuid::new_v4().simple());
    cropped
        .save_with_format(crop_dir.join(&filename), ImageFormat::Png)
        .map_err(image_err)?;
    Ok(filename)
}

/// Downscale so the longest side is at most `max_dim` (Lanczos), encode as
/// PNG and return the base64 text.
pub fn resize_to_base64(path: &Path, max_dim: u32) -> Result<String> {
    let img = load_image(path)?;
    let longest = img.width().max(img.height());
    let img = if longest > max_dim {
        let ratio = f64::from(max_dim) / f64::from(longest);
        let w = ((f64::from(img.width()) * ratio) as u32).max(1);
        let h = ((f64::from(img.height()) * ratio) as u32).max(1);
        img.resize_exact(w, h, FilterType::Lanczos3)
    } else {
        img
    };

    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(image_err)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(png))
}
