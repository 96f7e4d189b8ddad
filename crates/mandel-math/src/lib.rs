// SPDX-License-Identifier: CEPL-1.0
//! View parameters for the fractal and the math that moves them around.
//!
//! Coordinates: `position` is the complex-plane point shown at the lower-left
//! corner of the drawable, `zoom` is the visible height in plane units. Pixel
//! coordinates follow the window convention (origin top-left, y down).
pub use glam::{DVec2, UVec2};

/// Zoom multiplier applied per scroll step.
pub const ZOOM_STEP: f64 = 1.1;

pub const DEFAULT_POSITION: DVec2 = DVec2::new(-2.5, -1.75);
pub const DEFAULT_ZOOM: f64 = 3.5;

/// Below this the per-pixel step drops under f64 resolution around |c| ~ 2.
pub const MIN_ZOOM: f64 = 1e-13;
pub const MAX_ZOOM: f64 = 16.0;

pub const AUTO_ITERATIONS_MIN: u32 = 200;
pub const AUTO_ITERATIONS_MAX: u32 = 4000;
pub const FIXED_ITERATIONS_MAX: u32 = 8000;

/// Iteration bound picked from the zoom level:
/// `clamp(round(400 + 100 * -log10(zoom)), 200, 4000)`.
pub fn auto_iterations(zoom: f64) -> u32 {
    let raw = 400.0 + 100.0 * -zoom.log10();
    if raw.is_nan() {
        return AUTO_ITERATIONS_MIN;
    }
    raw.round()
        .clamp(AUTO_ITERATIONS_MIN as f64, AUTO_ITERATIONS_MAX as f64) as u32
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ColorMode {
    #[default]
    Rgb,
    BlackWhite,
    Glowing,
}

impl ColorMode {
    /// Tag written into the uniform block and the shader specialization.
    pub fn tag(self) -> u32 {
        match self {
            ColorMode::Rgb => 0,
            ColorMode::BlackWhite => 1,
            ColorMode::Glowing => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColorMode::Rgb => "rgb",
            ColorMode::BlackWhite => "black_white",
            ColorMode::Glowing => "glowing",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IterationBound {
    #[default]
    Auto,
    Fixed(u32),
}

impl IterationBound {
    pub fn resolve(self, zoom: f64) -> u32 {
        match self {
            IterationBound::Auto => auto_iterations(zoom),
            IterationBound::Fixed(n) => n.clamp(1, FIXED_ITERATIONS_MAX),
        }
    }

    pub fn is_auto(self) -> bool {
        matches!(self, IterationBound::Auto)
    }
}

/// Everything the renderer reads once per frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewState {
    pub position: DVec2,
    pub zoom: f64,
    pub iterations: IterationBound,
    pub color: ColorMode,
    /// Drawable size in pixels.
    pub resolution: UVec2,
    /// Seconds since the application started.
    pub elapsed: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            position: DEFAULT_POSITION,
            zoom: DEFAULT_ZOOM,
            iterations: IterationBound::Auto,
            color: ColorMode::Rgb,
            resolution: UVec2::ONE,
            elapsed: 0.0,
        }
    }
}

impl ViewState {
    /// Plane units per pixel.
    pub fn scale(&self) -> f64 {
        self.zoom / self.resolution.y.max(1) as f64
    }

    pub fn max_iterations(&self) -> u32 {
        self.iterations.resolve(self.zoom)
    }

    /// Complex-plane point under a window pixel.
    pub fn plane_point(&self, cursor: DVec2) -> DVec2 {
        let flipped = DVec2::new(cursor.x, self.resolution.y as f64 - cursor.y);
        self.position + flipped * self.scale()
    }

    /// Scales the view by `factor` keeping the point under `cursor` fixed.
    /// `factor < 1` zooms in.
    pub fn zoom_at(&mut self, cursor: DVec2, factor: f64) {
        if !(factor.is_finite() && factor > 0.0) {
            return;
        }
        let new_zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        let applied = new_zoom / self.zoom;
        let anchor = self.plane_point(cursor);
        self.position = anchor - (anchor - self.position) * applied;
        self.zoom = new_zoom;
    }

    /// One scroll notch; positive `steps` zoom in.
    pub fn scroll(&mut self, cursor: DVec2, steps: f64) {
        self.zoom_at(cursor, ZOOM_STEP.powf(-steps));
    }

    /// Moves the view so the content follows a cursor drag of `delta` pixels.
    pub fn drag(&mut self, delta: DVec2) {
        let s = self.scale();
        self.position.x -= delta.x * s;
        self.position.y += delta.y * s;
    }

    pub fn reset(&mut self) {
        self.position = DEFAULT_POSITION;
        self.zoom = DEFAULT_ZOOM;
    }

    /// Bumps the bound by `delta`, switching auto mode off.
    pub fn adjust_iterations(&mut self, delta: i64) {
        let current = self.max_iterations() as i64;
        let next = (current + delta).clamp(1, FIXED_ITERATIONS_MAX as i64) as u32;
        self.iterations = IterationBound::Fixed(next);
    }

    pub fn toggle_auto_iterations(&mut self) {
        self.iterations = match self.iterations {
            IterationBound::Auto => IterationBound::Fixed(self.max_iterations()),
            IterationBound::Fixed(_) => IterationBound::Auto,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view_720p() -> ViewState {
        ViewState {
            resolution: UVec2::new(1080, 720),
            ..Default::default()
        }
    }

    #[test]
    fn auto_iterations_inside_range_is_rounded_not_clamped() {
        // 400 - 100 * log10(3.5) = 345.59...
        assert_eq!(auto_iterations(3.5), 346);
    }

    #[test]
    fn auto_iterations_follows_formula_at_deep_zoom() {
        assert_eq!(auto_iterations(1e-10), 1400);
    }

    #[test]
    fn auto_iterations_clamps_both_ends() {
        assert_eq!(auto_iterations(1e-40), AUTO_ITERATIONS_MAX);
        assert_eq!(auto_iterations(1e3), AUTO_ITERATIONS_MIN);
        assert_eq!(auto_iterations(0.0), AUTO_ITERATIONS_MAX);
        assert_eq!(auto_iterations(f64::NAN), AUTO_ITERATIONS_MIN);
    }

    #[test]
    fn fixed_bound_ignores_zoom() {
        assert_eq!(IterationBound::Fixed(300).resolve(1e-12), 300);
        assert_eq!(IterationBound::Fixed(0).resolve(1.0), 1);
        assert_eq!(IterationBound::Fixed(99_999).resolve(1.0), FIXED_ITERATIONS_MAX);
    }

    #[test]
    fn plane_point_maps_corners() {
        let v = view_720p();
        let bottom_left = v.plane_point(DVec2::new(0.0, 720.0));
        assert!((bottom_left - DEFAULT_POSITION).length() < 1e-12);

        let top_left = v.plane_point(DVec2::new(0.0, 0.0));
        assert!((top_left.y - (DEFAULT_POSITION.y + DEFAULT_ZOOM)).abs() < 1e-12);
    }

    #[test]
    fn zoom_keeps_point_under_cursor() {
        let mut v = view_720p();
        let cursor = DVec2::new(700.0, 200.0);
        let before = v.plane_point(cursor);
        v.zoom_at(cursor, 1.0 / ZOOM_STEP);
        let after = v.plane_point(cursor);
        assert!((before - after).length() < 1e-12);
        assert!((v.zoom - DEFAULT_ZOOM / ZOOM_STEP).abs() < 1e-12);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut v = view_720p();
        v.zoom_at(DVec2::ZERO, 1e-30);
        assert_eq!(v.zoom, MIN_ZOOM);
        v.zoom_at(DVec2::ZERO, 1e30);
        assert_eq!(v.zoom, MAX_ZOOM);
        v.zoom_at(DVec2::ZERO, -2.0);
        assert_eq!(v.zoom, MAX_ZOOM);
    }

    #[test]
    fn scroll_up_zooms_in() {
        let mut v = view_720p();
        v.scroll(DVec2::new(540.0, 360.0), 1.0);
        assert!(v.zoom < DEFAULT_ZOOM);
        v.scroll(DVec2::new(540.0, 360.0), -1.0);
        assert!((v.zoom - DEFAULT_ZOOM).abs() < 1e-12);
    }

    #[test]
    fn drag_moves_content_with_cursor() {
        let mut v = view_720p();
        let grabbed = v.plane_point(DVec2::new(100.0, 100.0));
        v.drag(DVec2::new(50.0, -30.0));
        let now = v.plane_point(DVec2::new(150.0, 70.0));
        assert!((grabbed - now).length() < 1e-12);
    }

    #[test]
    fn adjusting_iterations_leaves_auto_mode() {
        let mut v = view_720p();
        let auto = v.max_iterations();
        v.adjust_iterations(100);
        assert_eq!(v.iterations, IterationBound::Fixed(auto + 100));
        v.toggle_auto_iterations();
        assert!(v.iterations.is_auto());
    }

    #[test]
    fn color_tags_match_shader_branches() {
        assert_eq!(ColorMode::Rgb.tag(), 0);
        assert_eq!(ColorMode::BlackWhite.tag(), 1);
        assert_eq!(ColorMode::Glowing.tag(), 2);
    }
}
