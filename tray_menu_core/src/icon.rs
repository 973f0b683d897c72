//! Pixel buffers for menu item icons.

use std::fmt;
use std::sync::Arc;

const PIXEL_SIZE: usize = 4;

/// An error produced when constructing a [`MenuIcon`] from a malformed buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BadIcon {
    #[error("the length of the `rgba` argument ({byte_count}) isn't divisible by 4")]
    ByteCountNotDivisibleBy4 { byte_count: usize },

    #[error(
        "the specified dimensions ({width}x{height}) don't match the number of pixels \
         supplied by the `rgba` argument ({pixel_count})"
    )]
    DimensionsVsPixelCount {
        width: u32,
        height: u32,
        width_x_height: usize,
        pixel_count: usize,
    },
}

/// An RGBA icon shown next to a menu item label.
///
/// Cloning is cheap; the pixel buffer is shared.
#[derive(Clone, PartialEq, Eq)]
pub struct MenuIcon {
    rgba: Arc<[u8]>,
    width: u32,
    height: u32,
}

impl MenuIcon {
    /// Create an icon from 32bpp RGBA data, row-major from the top-left corner.
    pub fn from_rgba(rgba: Vec<u8>, width: u32, height: u32) -> Result<Self, BadIcon> {
        if rgba.len() % PIXEL_SIZE != 0 {
            return Err(BadIcon::ByteCountNotDivisibleBy4 {
                byte_count: rgba.len(),
            });
        }
        let pixel_count = rgba.len() / PIXEL_SIZE;
        let width_x_height = width as usize * height as usize;
        if pixel_count != width_x_height {
            return Err(BadIcon::DimensionsVsPixelCount {
                width,
                height,
                width_x_height,
                pixel_count,
            });
        }

        Ok(MenuIcon {
            rgba: rgba.into(),
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }
}

impl fmt::Debug for MenuIcon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuIcon")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}
