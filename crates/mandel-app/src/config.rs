// SPDX-License-Identifier: CEPL-1.0
//! `mandel.toml`: render preferences and the starting view.
use mandel_math::{
    ColorMode, DVec2, IterationBound, ViewState, DEFAULT_POSITION, DEFAULT_ZOOM, MAX_ZOOM,
    MIN_ZOOM,
};
use serde::Deserialize;
use std::{fs, io, path::Path};
use tracing::{debug, warn};

pub const DEFAULT_CONFIG_PATH: &str = "mandel.toml";

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct RenderCfg {
    #[serde(default = "default_vsync")]
    pub vsync: bool,
    #[serde(default)]
    pub vsync_mode: VsyncMode,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VsyncMode {
    Fifo,
    #[default]
    Mailbox,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColorCfg {
    #[default]
    Rgb,
    BlackWhite,
    Glowing,
}

impl From<ColorCfg> for ColorMode {
    fn from(c: ColorCfg) -> Self {
        match c {
            ColorCfg::Rgb => ColorMode::Rgb,
            ColorCfg::BlackWhite => ColorMode::BlackWhite,
            ColorCfg::Glowing => ColorMode::Glowing,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct ViewCfg {
    #[serde(default = "default_position")]
    pub position: [f64; 2],
    #[serde(default = "default_zoom")]
    pub zoom: f64,
    /// 0 picks the bound from the zoom level.
    #[serde(default)]
    pub iterations: u32,
    #[serde(default)]
    pub color: ColorCfg,
}

#[derive(Debug, Deserialize, Default, PartialEq)]
pub struct AppCfg {
    #[serde(default)]
    pub render: RenderCfg,
    #[serde(default)]
    pub view: ViewCfg,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            vsync: true,
            vsync_mode: VsyncMode::Mailbox,
        }
    }
}

impl Default for ViewCfg {
    fn default() -> Self {
        ViewCfg {
            position: default_position(),
            zoom: default_zoom(),
            iterations: 0,
            color: ColorCfg::Rgb,
        }
    }
}

fn default_vsync() -> bool {
    true
}
fn default_position() -> [f64; 2] {
    DEFAULT_POSITION.to_array()
}
fn default_zoom() -> f64 {
    DEFAULT_ZOOM
}

impl ViewCfg {
    /// Starting view; out-of-range values fall back to the defaults.
    pub fn initial_view(&self) -> ViewState {
        let position = DVec2::from_array(self.position);
        let zoom = if self.zoom.is_finite() && self.zoom > 0.0 {
            self.zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            warn!("config: zoom {} ignored", self.zoom);
            DEFAULT_ZOOM
        };
        ViewState {
            position: if position.is_finite() {
                position
            } else {
                DEFAULT_POSITION
            },
            zoom,
            iterations: match self.iterations {
                0 => IterationBound::Auto,
                n => IterationBound::Fixed(n),
            },
            color: self.color.into(),
            ..Default::default()
        }
    }
}

pub fn parse_cfg(s: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str::<AppCfg>(s)
}

pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => parse_cfg(&s).unwrap_or_else(|e| {
            warn!("config: {} is malformed, using defaults: {e}", path.display());
            AppCfg::default()
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("config: {} not found, using defaults", path.display());
            AppCfg::default()
        }
        Err(e) => {
            warn!("config: cannot read {}: {e}", path.display());
            AppCfg::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse_cfg("").unwrap();
        assert_eq!(cfg, AppCfg::default());
        assert!(cfg.render.vsync);
        assert_eq!(cfg.render.vsync_mode, VsyncMode::Mailbox);
        assert_eq!(cfg.view.initial_view(), ViewState::default());
    }

    #[test]
    fn sections_are_read() {
        let cfg = parse_cfg(
            r#"
            [render]
            vsync = false
            vsync_mode = "fifo"

            [view]
            position = [-0.75, 0.1]
            zoom = 0.01
            iterations = 900
            color = "glowing"
            "#,
        )
        .unwrap();
        assert!(!cfg.render.vsync);
        assert_eq!(cfg.render.vsync_mode, VsyncMode::Fifo);

        let view = cfg.view.initial_view();
        assert_eq!(view.position, DVec2::new(-0.75, 0.1));
        assert_eq!(view.zoom, 0.01);
        assert_eq!(view.iterations, IterationBound::Fixed(900));
        assert_eq!(view.color, ColorMode::Glowing);
    }

    #[test]
    fn zero_iterations_means_auto() {
        let cfg = parse_cfg("[view]\niterations = 0\n").unwrap();
        assert!(cfg.view.initial_view().iterations.is_auto());
    }

    #[test]
    fn bad_zoom_falls_back() {
        let cfg = parse_cfg("[view]\nzoom = -1.0\n").unwrap();
        assert_eq!(cfg.view.initial_view().zoom, DEFAULT_ZOOM);
        let cfg = parse_cfg("[view]\nzoom = 1e-30\n").unwrap();
        assert_eq!(cfg.view.initial_view().zoom, MIN_ZOOM);
    }

    #[test]
    fn malformed_values_are_rejected_by_parser() {
        assert!(parse_cfg("[render]\nvsync_mode = \"immediate\"\n").is_err());
        assert!(parse_cfg("[view]\ncolor = 3\n").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let cfg = load_cfg(Path::new("/nonexistent/dir/mandel.toml"));
        assert_eq!(cfg, AppCfg::default());
    }
}
