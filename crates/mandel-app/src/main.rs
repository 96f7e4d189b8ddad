// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use mandel_core::init_tracing;
use mandel_math::{DVec2, UVec2, ViewState};
use mandel_render::{FrameOutcome, RenderSize, Renderer};
use mandel_render_gl::GlRenderer;
use mandel_render_vk::{VkRenderer, VkVsyncMode};
use tracing::{error, info};

use mandel_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use std::path::PathBuf;
use std::time::Instant;

mod config;
mod input;

use config::{load_cfg, AppCfg, VsyncMode, DEFAULT_CONFIG_PATH};
use input::Input;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackendChoice {
    Vk,
    Gl,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Choose renderer backend: vk | gl
    #[arg(long, value_enum, default_value_t = BackendChoice::Vk)]
    backend: BackendChoice,

    /// Config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

enum Backend {
    Gl(Box<GlRenderer>),
    Vk(Box<VkRenderer>),
}

impl Backend {
    fn create(choice: BackendChoice, window: &Window, size: RenderSize) -> Result<Self> {
        if choice == BackendChoice::Gl {
            return Ok(Backend::Gl(Box::new(
                GlRenderer::new(window, window, size).context("GL init")?,
            )));
        }
        match VkRenderer::new(window, window, size) {
            Ok(vk) => Ok(Backend::Vk(Box::new(vk))),
            Err(e) => {
                error!("vk init failed: {e:#}; falling back to gl");
                Ok(Backend::Gl(Box::new(
                    GlRenderer::new(window, window, size).context("GL init")?,
                )))
            }
        }
    }

    fn renderer(&mut self) -> &mut dyn Renderer {
        match self {
            Backend::Gl(r) => r.as_mut(),
            Backend::Vk(r) => r.as_mut(),
        }
    }

    fn apply_cfg(&mut self, cfg: &AppCfg) {
        if let Backend::Vk(r) = self {
            let mode = match cfg.render.vsync_mode {
                VsyncMode::Fifo => VkVsyncMode::Fifo,
                VsyncMode::Mailbox => VkVsyncMode::Mailbox,
            };
            r.as_mut().set_vsync_mode(mode);
        }
        self.renderer().set_vsync(cfg.render.vsync);
    }
}

struct App {
    backend_choice: BackendChoice,
    cfg: AppCfg,
    window: Option<Window>,
    backend: Option<Backend>,
    view: ViewState,
    input: Input,
    started: Instant,

    suspended: bool,
    exiting: bool,
    fatal: Option<anyhow::Error>,

    frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn new(args: Args) -> Self {
        let cfg = load_cfg(&args.config);
        let view = cfg.view.initial_view();
        let now = Instant::now();
        App {
            backend_choice: args.backend,
            cfg,
            window: None,
            backend: None,
            view,
            input: Input::default(),
            started: now,
            suspended: false,
            exiting: false,
            fatal: None,
            frames: 0,
            last_fps_instant: now,
        }
    }

    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        // Renderer before window: the surface borrows the native handle.
        self.backend = None;
        self.window = None;
        event_loop.exit();
    }

    /// Routes the close through the render loop so the renderer sees it
    /// before any further GPU work; exits directly when there is no renderer.
    fn close(&mut self, event_loop: &ActiveEventLoop) {
        match self.backend.as_mut() {
            Some(backend) => {
                backend.renderer().request_close();
                self.redraw(event_loop);
            }
            None => self.exit(event_loop),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("fatal: {e:#}");
        self.fatal = Some(e);
        self.exit(event_loop);
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = event_loop
            .create_window(mandel_platform::window_attributes())
            .context("create_window")?;

        let (width, height) = mandel_platform::drawable_size(&window);
        let size = RenderSize::new(width, height);
        self.view.resolution = UVec2::new(width, height);

        let mut backend = Backend::create(self.backend_choice, &window, size)?;
        backend.apply_cfg(&self.cfg);

        info!("backend = {}", backend.renderer().backend_name());
        info!("vsync cfg = {}", self.cfg.render.vsync);

        window.request_redraw();
        self.window = Some(window);
        self.backend = Some(backend);
        Ok(())
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        self.view.elapsed = self.started.elapsed().as_secs_f64();

        match backend.renderer().render(&self.view) {
            Ok(FrameOutcome::Presented) => {
                self.suspended = false;
                self.frames = self.frames.saturating_add(1);
            }
            Ok(FrameOutcome::Rebuilt) => self.suspended = false,
            Ok(FrameOutcome::Suspended) => self.suspended = true,
            Ok(FrameOutcome::Closed) => self.exit(event_loop),
            Err(e) => self.fail(event_loop, e.context("render")),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        match &self.window {
            Some(window) if window_id == window.id() => {}
            _ => return,
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.close(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                let size = RenderSize::new(new_size.width, new_size.height);
                self.view.resolution = UVec2::new(size.width, size.height);
                info!("Resized → {}x{}", size.width, size.height);

                if let Some(backend) = &mut self.backend {
                    if let Err(e) = backend.renderer().resize(size) {
                        self.fail(event_loop, e.context("resize"));
                        return;
                    }
                }
                if !size.is_empty() {
                    self.suspended = false;
                    if let Some(w) = &self.window {
                        w.request_redraw();
                    }
                }
            }

            WindowEvent::ModifiersChanged(m) => self.input.modifiers(m.state()),

            WindowEvent::KeyboardInput { event, .. } => {
                if self.input.key(&mut self.view, &event) {
                    info!("exit key");
                    self.close(event_loop);
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.input
                    .cursor_moved(&mut self.view, DVec2::new(position.x, position.y));
            }

            WindowEvent::MouseInput { state, button, .. } => {
                self.input.mouse_button(button, state);
            }

            WindowEvent::MouseWheel { delta, .. } => {
                self.input.scroll(&mut self.view, delta);
            }

            WindowEvent::RedrawRequested => {
                if !self.exiting {
                    self.redraw(event_loop);
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }

        if self.suspended {
            // minimized: sleep until the next resize
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }

        // continuous redraw; present pacing bounds the rate
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let event_loop: EventLoop<()> = EventLoop::new()?;

    let mut app = App::new(args);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let args = Args::try_parse_from(["mandelview"]).unwrap();
        assert_eq!(args.backend, BackendChoice::Vk);
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn cli_backend_and_config() {
        let args =
            Args::try_parse_from(["mandelview", "--backend", "gl", "--config", "x.toml"]).unwrap();
        assert_eq!(args.backend, BackendChoice::Gl);
        assert_eq!(args.config, PathBuf::from("x.toml"));
        assert!(Args::try_parse_from(["mandelview", "--backend", "dx12"]).is_err());
    }
}
