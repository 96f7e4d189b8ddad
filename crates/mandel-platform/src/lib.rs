// SPDX-License-Identifier: CEPL-1.0
pub use winit;

use winit::dpi::{LogicalSize, PhysicalSize};
use winit::window::{Window, WindowAttributes};

pub const WINDOW_TITLE: &str = "mandelview";
pub const DEFAULT_WIDTH: u32 = 1080;
pub const DEFAULT_HEIGHT: u32 = 720;

pub fn window_attributes() -> WindowAttributes {
    Window::default_attributes()
        .with_title(WINDOW_TITLE)
        .with_inner_size(LogicalSize::new(DEFAULT_WIDTH, DEFAULT_HEIGHT))
        .with_min_inner_size(LogicalSize::new(1u32, 1u32))
}

/// Drawable size in pixels; zero in either dimension while minimized.
pub fn drawable_size(window: &Window) -> (u32, u32) {
    let PhysicalSize { width, height } = window.inner_size();
    if width == 0 || height == 0 {
        tracing::trace!("drawable size is {width}x{height}");
    }
    (width, height)
}
