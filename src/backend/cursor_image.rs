//! XCursor theme images for the software cursor
//!
//! Nested platforms draw the cursor themselves. The image comes from the
//! configured XCursor theme; when the theme has no usable `default` icon a
//! plain generated arrow is used instead.

use anyhow::Context;
use smithay::backend::allocator::Fourcc;
use smithay::backend::renderer::element::memory::{
    MemoryRenderBuffer, MemoryRenderBufferRenderElement,
};
use smithay::backend::renderer::element::Kind;
use smithay::backend::renderer::gles::{GlesError, GlesRenderer};
use smithay::utils::{Physical, Point, Transform};
use tracing::{debug, warn};
use xcursor::parser::{parse_xcursor, Image};
use xcursor::CursorTheme;

/// Icon names tried in order
const ICON_NAMES: [&str; 2] = ["default", "left_ptr"];

/// Cursor image ready for rendering
pub struct CursorImage {
    buffer: MemoryRenderBuffer,
    /// Offset of the click point from the top-left corner
    pub hotspot: (i32, i32),
}

impl CursorImage {
    /// Load the theme's default cursor at the nominal size closest to `size`.
    pub fn load(theme: &str, size: u32) -> Self {
        match load_theme_image(theme, size) {
            Ok(image) => Self::from_image(&image),
            Err(err) => {
                warn!("Failed to load cursor theme {theme:?}: {err:#}, using fallback");
                Self::fallback(size)
            }
        }
    }

    fn from_image(image: &Image) -> Self {
        let buffer = MemoryRenderBuffer::from_slice(
            &image.pixels_rgba,
            Fourcc::Abgr8888,
            (image.width as i32, image.height as i32),
            1, // scale
            Transform::Normal,
            None,
        );
        Self {
            buffer,
            hotspot: (image.xhot as i32, image.yhot as i32),
        }
    }

    fn fallback(size: u32) -> Self {
        let side = size.max(8);
        Self::from_image(&Image {
            size: side,
            width: side,
            height: side,
            xhot: 0,
            yhot: 0,
            delay: 0,
            pixels_rgba: arrow_pixels(side),
            pixels_argb: vec![], // unused
        })
    }

    /// Create a render element with the hotspot at `position`.
    pub fn render_element(
        &self,
        renderer: &mut GlesRenderer,
        position: Point<i32, Physical>,
    ) -> Result<MemoryRenderBufferRenderElement<GlesRenderer>, GlesError> {
        let origin = position - Point::from(self.hotspot);
        MemoryRenderBufferRenderElement::from_buffer(
            renderer,
            origin.to_f64(),
            &self.buffer,
            None,
            None,
            None,
            Kind::Cursor,
        )
    }
}

fn load_theme_image(theme: &str, size: u32) -> anyhow::Result<Image> {
    let theme = CursorTheme::load(theme);
    let path = ICON_NAMES
        .iter()
        .find_map(|name| theme.load_icon(name))
        .context("no default cursor icon in theme")?;
    debug!("Loading cursor from {}", path.display());

    let bytes = std::fs::read(&path).context("failed to read xcursor file")?;
    let images = parse_xcursor(&bytes).context("failed to parse xcursor file")?;

    // Animated cursors show their first frame
    images
        .into_iter()
        .min_by_key(|image| (size as i64 - image.size as i64).abs())
        .context("xcursor file has no images")
}

/// Opaque white arrow with a black outline, RGBA.
fn arrow_pixels(side: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((side * side * 4) as usize);
    for y in 0..side {
        for x in 0..side {
            // Lower-left triangle of the square, tip at the hotspot
            let inside = x <= y / 2 + y / 4;
            let edge = x == 0 || x == y / 2 + y / 4 || y == side - 1;
            let pixel = match (inside, edge) {
                (true, true) => [0, 0, 0, 255],
                (true, false) => [255, 255, 255, 255],
                (false, _) => [0, 0, 0, 0],
            };
            pixels.extend_from_slice(&pixel);
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arrow_pixels_cover_the_square() {
        let pixels = arrow_pixels(16);
        assert_eq!(pixels.len(), 16 * 16 * 4);
        // Tip is opaque, top-right corner transparent
        assert_eq!(pixels[3], 255);
        assert_eq!(pixels[(15 * 4 + 3) as usize], 0);
    }
}
