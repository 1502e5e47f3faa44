//! Text-art rendering of images.
//!
//! Images are resized to the target grid first, then each pixel becomes one
//! glyph picked by luma. Colour mode wraps every glyph in a 24-bit foreground
//! escape so the terminal shows the pixel colour.

use std::fmt::Write as _;

use crossterm::style::{Color, Stylize, style};
use image::DynamicImage;
use image::imageops::FilterType;

use crate::render::RenderError;

/// Dark to bright. A blank glyph is never emitted so even black pixels keep
/// the grid visible.
pub const PALETTE: [char; 9] = ['.', ':', '-', '=', '+', '*', '#', '%', '@'];

const MAX_AUTO_WIDTH: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterOptions {
    pub width: u32,
    pub height: u32,
    pub color: bool,
}

pub async fn fetch_image(http: &reqwest::Client, url: &str) -> Result<DynamicImage, RenderError> {
    let response = http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(RenderError::Status(status.as_u16()));
    }
    let bytes = response.bytes().await?;
    Ok(image::load_from_memory(&bytes)?)
}

/// Grid size for an `image_width` x `image_height` source. A zero height
/// keeps the aspect ratio, halved because terminal cells are about twice as
/// tall as they are wide.
pub fn target_dimensions(image_width: u32, image_height: u32, width: u32, height: u32) -> (u32, u32) {
    let width = if width == 0 {
        image_width.min(MAX_AUTO_WIDTH)
    } else {
        width
    }
    .max(1);
    let height = if height == 0 {
        let derived = u64::from(width) * u64::from(image_height) / u64::from(image_width.max(1)) / 2;
        u32::try_from(derived).unwrap_or(u32::MAX)
    } else {
        height
    }
    .max(1);
    (width, height)
}

pub fn glyph_for(luma: u8) -> char {
    let last = PALETTE.len() - 1;
    PALETTE[(usize::from(luma) * last + 127) / 255]
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    let value = 299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b);
    (value / 1000) as u8
}

/// One line per row, each terminated by a newline.
pub fn rasterize(image: &DynamicImage, options: RasterOptions) -> String {
    let (width, height) = target_dimensions(image.width(), image.height(), options.width, options.height);
    let pixels = image.resize_exact(width, height, FilterType::Triangle).to_rgb8();

    let mut out = String::with_capacity((width as usize + 1) * height as usize);
    for row in pixels.rows() {
        for pixel in row {
            let [r, g, b] = pixel.0;
            let glyph = glyph_for(luma(r, g, b));
            if options.color {
                let _ = write!(out, "{}", style(glyph).with(Color::Rgb { r, g, b }));
            } else {
                out.push(glyph);
            }
        }
        out.push('\n');
    }
    out
}
