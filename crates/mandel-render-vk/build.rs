// SPDX-License-Identifier: CEPL-1.0
use std::{env, fs, path::PathBuf};

// Full-screen quad drawn as a 4-vertex triangle strip; no vertex buffer.
const QUAD_VS: &str = r#"
#version 450
void main() {
    vec2 corner = vec2(gl_VertexIndex & 1, gl_VertexIndex >> 1);
    gl_Position = vec4(corner * 2.0 - 1.0, 0.0, 1.0);
}
"#;

// Escape-time Mandelbrot in double precision. Block layout must stay in sync
// with `FractalUniforms` in mandel-render.
const MANDEL_FS: &str = r#"
#version 450
layout(constant_id = 0) const uint COLOR_MODE = 0;

layout(std140, set = 0, binding = 0) uniform Fractal {
    dvec2 pos;
    double zoom;
    ivec2 res;
    uint iterations;
    uint color;
    double time;
} u;

layout(location = 0) out vec4 outColor;

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
    double scale = u.zoom / double(u.res.y);
    dvec2 c = u.pos + dvec2(gl_FragCoord.x, double(u.res.y) - gl_FragCoord.y) * scale;

    dvec2 z = dvec2(0.0);
    uint n = 0u;
    while (n < u.iterations && dot(z, z) < 256.0) {
        z = dvec2(z.x * z.x - z.y * z.y, 2.0 * z.x * z.y) + c;
        n++;
    }

    if (n >= u.iterations) {
        outColor = vec4(0.0, 0.0, 0.0, 1.0);
        return;
    }

    float mu = float(n) + 1.0 - log2(log(float(length(z))));
    float limit = float(u.iterations);
    vec3 rgb;
    if (COLOR_MODE == 1u) {
        rgb = palette_bw(mu, limit);
    } else if (COLOR_MODE == 2u) {
        rgb = palette_glow(mu, limit, float(u.time));
    } else {
        rgb = palette_rgb(mu);
    }
    outColor = vec4(rgb, 1.0);
}
"#;

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));

    let compiler = shaderc::Compiler::new().expect("shaderc compiler");
    let mut opts = shaderc::CompileOptions::new().expect("shaderc options");
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let shaders = [
        (QUAD_VS, shaderc::ShaderKind::Vertex, "quad.vert"),
        (MANDEL_FS, shaderc::ShaderKind::Fragment, "mandel.frag"),
    ];
    for (src, kind, name) in shaders {
        let spv = compiler
            .compile_into_spirv(src, kind, name, "main", Some(&opts))
            .unwrap_or_else(|e| panic!("{name}: {e}"));
        fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8())
            .unwrap_or_else(|e| panic!("writing {name}.spv: {e}"));
    }

    println!("cargo:rerun-if-changed=build.rs");
}
