// SPDX-License-Identifier: CEPL-1.0
//! OpenGL 3.3 fallback. Same picture as the Vulkan path, but the iteration
//! runs in single precision, so deep zooms turn blocky.
use anyhow::{anyhow, Context, Result};
use glow::HasContext as _;
use mandel_math::ViewState;
use mandel_render::{FractalUniforms, FrameOutcome, RenderSize, Renderer};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawWindowHandle};
use tracing::{debug, info};

use glutin::{
    config::ConfigTemplateBuilder,
    context::{
        ContextApi, ContextAttributesBuilder, NotCurrentContext, PossiblyCurrentContext, Version,
    },
    display::{Display, DisplayApiPreference},
    prelude::*,
    surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface},
};

use std::num::NonZeroU32;

const VERT_SRC: &str = r#"#version 330 core
void main() {
    vec2 corner = vec2(gl_VertexID & 1, gl_VertexID >> 1);
    gl_Position = vec4(corner * 2.0 - 1.0, 0.0, 1.0);
}"#;

const FRAG_SRC: &str = r#"#version 330 core
uniform vec2 u_pos;
uniform float u_zoom;
uniform ivec2 u_res;
uniform uint u_iterations;
uniform int u_color;
uniform float u_time;
out vec4 outColor;

vec3 palette_rgb(float mu) {
    return 0.5 + 0.5 * cos(3.0 + mu * 0.15 + vec3(0.0, 0.6, 1.0));
}

vec3 palette_bw(float mu, float limit) {
    return vec3(sqrt(clamp(mu / limit, 0.0, 1.0)));
}

vec3 palette_glow(float mu, float limit, float t) {
    float g = pow(clamp(mu / limit, 0.0, 1.0), 0.4);
    float pulse = 0.85 + 0.15 * sin(t * 2.0 + mu * 0.05);
    return g * pulse * vec3(1.0, 0.55, 0.15) + g * g * vec3(0.2, 0.3, 0.9);
}

void main() {
    float scale = u_zoom / float(u_res.y);
    vec2 c = u_pos + gl_FragCoord.xy * scale;

    vec2 z = vec2(0.0);
    uint n = 0u;
    while (n < u_iterations && dot(z, z) < 256.0) {
        z = vec2(z.x * z.x - z.y * z.y, 2.0 * z.x * z.y) + c;
        n++;
    }
    if (n >= u_iterations) {
        outColor = vec4(0.0, 0.0, 0.0, 1.0);
        return;
    }

    float mu = float(n) + 1.0 - log2(log(length(z)));
    float limit = float(u_iterations);
    vec3 rgb;
    if (u_color == 1) {
        rgb = palette_bw(mu, limit);
    } else if (u_color == 2) {
        rgb = palette_glow(mu, limit, u_time);
    } else {
        rgb = palette_rgb(mu);
    }
    outColor = vec4(rgb, 1.0);
}"#;

/// The uniform block narrowed to what GL 3.3 can take without doubles.
#[derive(Clone, Copy, Debug, PartialEq)]
struct GlUniforms {
    pos: [f32; 2],
    zoom: f32,
    res: [i32; 2],
    iterations: u32,
    color: i32,
    time: f32,
}

impl From<&FractalUniforms> for GlUniforms {
    fn from(u: &FractalUniforms) -> Self {
        Self {
            pos: [u.pos[0] as f32, u.pos[1] as f32],
            zoom: u.zoom as f32,
            res: u.res,
            iterations: u.iterations,
            color: u.color as i32,
            time: u.time as f32,
        }
    }
}

struct Locations {
    pos: Option<glow::UniformLocation>,
    zoom: Option<glow::UniformLocation>,
    res: Option<glow::UniformLocation>,
    iterations: Option<glow::UniformLocation>,
    color: Option<glow::UniformLocation>,
    time: Option<glow::UniformLocation>,
}

impl Locations {
    unsafe fn query(gl: &glow::Context, program: glow::Program) -> Self {
        Self {
            pos: gl.get_uniform_location(program, "u_pos"),
            zoom: gl.get_uniform_location(program, "u_zoom"),
            res: gl.get_uniform_location(program, "u_res"),
            iterations: gl.get_uniform_location(program, "u_iterations"),
            color: gl.get_uniform_location(program, "u_color"),
            time: gl.get_uniform_location(program, "u_time"),
        }
    }
}

pub struct GlRenderer {
    context: PossiblyCurrentContext,
    surface: Surface<WindowSurface>,
    gl: glow::Context,
    size: RenderSize,
    program: glow::Program,
    vao: glow::VertexArray,
    locs: Locations,
    vsync: bool,
    close: bool,
}

fn compile_program(gl: &glow::Context) -> Result<glow::Program> {
    unsafe {
        let vs = gl
            .create_shader(glow::VERTEX_SHADER)
            .map_err(anyhow::Error::msg)?;
        let fs = gl
            .create_shader(glow::FRAGMENT_SHADER)
            .map_err(anyhow::Error::msg)?;

        gl.shader_source(vs, VERT_SRC);
        gl.compile_shader(vs);
        if !gl.get_shader_compile_status(vs) {
            return Err(anyhow!("GL vert compile: {}", gl.get_shader_info_log(vs)));
        }

        gl.shader_source(fs, FRAG_SRC);
        gl.compile_shader(fs);
        if !gl.get_shader_compile_status(fs) {
            return Err(anyhow!("GL frag compile: {}", gl.get_shader_info_log(fs)));
        }

        let program = gl.create_program().map_err(anyhow::Error::msg)?;
        gl.attach_shader(program, vs);
        gl.attach_shader(program, fs);
        gl.link_program(program);
        if !gl.get_program_link_status(program) {
            return Err(anyhow!("GL link: {}", gl.get_program_info_log(program)));
        }

        gl.detach_shader(program, vs);
        gl.detach_shader(program, fs);
        gl.delete_shader(vs);
        gl.delete_shader(fs);

        Ok(program)
    }
}

fn swap_interval(vsync: bool) -> SwapInterval {
    if vsync {
        SwapInterval::Wait(NonZeroU32::MIN)
    } else {
        SwapInterval::DontWait
    }
}

impl GlRenderer {
    fn make_current(
        display: &Display,
        window_handle: RawWindowHandle,
        size: RenderSize,
    ) -> Result<(
        PossiblyCurrentContext,
        Surface<WindowSurface>,
        glow::Context,
    )> {
        let template = ConfigTemplateBuilder::new().build();
        let mut configs = unsafe { display.find_configs(template) }.context("find_configs")?;
        let config = configs.next().ok_or_else(|| anyhow!("no GL configs"))?;
        let w = NonZeroU32::new(size.width).unwrap_or(NonZeroU32::MIN);
        let h = NonZeroU32::new(size.height).unwrap_or(NonZeroU32::MIN);

        let sattrs = SurfaceAttributesBuilder::<WindowSurface>::new().build(window_handle, w, h);
        let surface = unsafe { display.create_window_surface(&config, &sattrs) }
            .context("create_window_surface")?;
        let ctx_attrs = ContextAttributesBuilder::new()
            .with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3))))
            .build(Some(window_handle));
        let not_current: NotCurrentContext =
            unsafe { display.create_context(&config, &ctx_attrs) }.context("create_context")?;

        let context = not_current.make_current(&surface).context("make_current")?;

        let gl = unsafe {
            glow::Context::from_loader_function_cstr(|s| display.get_proc_address(s) as *const _)
        };

        Ok((context, surface, gl))
    }

    unsafe fn upload(&self, u: GlUniforms) {
        let gl = &self.gl;
        gl.uniform_2_f32(self.locs.pos.as_ref(), u.pos[0], u.pos[1]);
        gl.uniform_1_f32(self.locs.zoom.as_ref(), u.zoom);
        gl.uniform_2_i32(self.locs.res.as_ref(), u.res[0], u.res[1]);
        gl.uniform_1_u32(self.locs.iterations.as_ref(), u.iterations);
        gl.uniform_1_i32(self.locs.color.as_ref(), u.color);
        gl.uniform_1_f32(self.locs.time.as_ref(), u.time);
    }
}

impl Renderer for GlRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display_handle: &dyn HasDisplayHandle,
        size: RenderSize,
    ) -> Result<Self> {
        let wh = window
            .window_handle()
            .map_err(|e| anyhow!("{e}"))?
            .as_raw();
        let dh = display_handle
            .display_handle()
            .map_err(|e| anyhow!("{e}"))?
            .as_raw();

        let display =
            unsafe { Display::new(dh, DisplayApiPreference::Egl) }.context("Display::new")?;

        let (context, surface, gl) = Self::make_current(&display, wh, size)?;
        let program = compile_program(&gl)?;
        let vao = unsafe { gl.create_vertex_array().map_err(anyhow::Error::msg)? };
        let locs = unsafe { Locations::query(&gl, program) };

        unsafe {
            gl.enable(glow::FRAMEBUFFER_SRGB);
            gl.disable(glow::DEPTH_TEST);
            gl.disable(glow::CULL_FACE);
        }

        let vsync = true;
        let _ = surface.set_swap_interval(&context, swap_interval(vsync));
        info!("gl: single precision path, expect blocky output below zoom ~1e-5");

        Ok(Self {
            context,
            surface,
            gl,
            size,
            program,
            vao,
            locs,
            vsync,
            close: false,
        })
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        self.size = size;
        // A zero-sized surface is invalid; keep the old one until we are visible again.
        if let (Some(w), Some(h)) = (NonZeroU32::new(size.width), NonZeroU32::new(size.height)) {
            self.surface.resize(&self.context, w, h);
            self.set_vsync(self.vsync);
        }
        Ok(())
    }

    fn render(&mut self, view: &ViewState) -> Result<FrameOutcome> {
        if self.close {
            return Ok(FrameOutcome::Closed);
        }
        if self.size.is_empty() {
            return Ok(FrameOutcome::Suspended);
        }

        let uniforms = GlUniforms::from(&FractalUniforms::from_view(view));
        unsafe {
            self.gl
                .viewport(0, 0, self.size.width as i32, self.size.height as i32);
            self.gl.clear_color(0.0, 0.0, 0.0, 1.0);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
            self.gl.use_program(Some(self.program));
            self.upload(uniforms);
            self.gl.bind_vertex_array(Some(self.vao));
            self.gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4);
            self.gl.bind_vertex_array(None);
            self.gl.use_program(None);
        }

        self.surface
            .swap_buffers(&self.context)
            .context("swap_buffers")?;
        Ok(FrameOutcome::Presented)
    }

    fn set_vsync(&mut self, on: bool) {
        self.vsync = on;
        if let Err(e) = self.surface.set_swap_interval(&self.context, swap_interval(on)) {
            debug!("gl: set_swap_interval({on}) failed: {e}");
        }
    }

    fn request_close(&mut self) {
        self.close = true;
    }

    fn backend_name(&self) -> &'static str {
        "opengl"
    }
}

impl Drop for GlRenderer {
    fn drop(&mut self) {
        unsafe {
            self.gl.delete_vertex_array(self.vao);
            self.gl.delete_program(self.program);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mandel_math::{ColorMode, IterationBound, UVec2};

    #[test]
    fn uniforms_narrow_to_single_precision() {
        let view = ViewState {
            resolution: UVec2::new(640, 480),
            iterations: IterationBound::Fixed(500),
            color: ColorMode::BlackWhite,
            elapsed: 1.5,
            ..Default::default()
        };
        let gl = GlUniforms::from(&FractalUniforms::from_view(&view));
        assert_eq!(gl.pos, [-2.5, -1.75]);
        assert_eq!(gl.zoom, 3.5);
        assert_eq!(gl.res, [640, 480]);
        assert_eq!(gl.iterations, 500);
        assert_eq!(gl.color, 1);
        assert_eq!(gl.time, 1.5);
    }
}
