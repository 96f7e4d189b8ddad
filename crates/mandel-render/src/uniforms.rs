// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};
use mandel_math::ViewState;

/// Uniform block read by the fractal shader, binding 0 of set 0.
///
/// Field order keeps every member on its natural alignment so the struct is
/// byte-identical to the std140 block in the shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FractalUniforms {
    pub pos: [f64; 2],
    pub zoom: f64,
    pub res: [i32; 2],
    pub iterations: u32,
    pub color: u32,
    pub time: f64,
}

impl FractalUniforms {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn from_view(view: &ViewState) -> Self {
        Self {
            pos: view.position.to_array(),
            zoom: view.zoom,
            res: [
                view.resolution.x.min(i32::MAX as u32) as i32,
                view.resolution.y.min(i32::MAX as u32) as i32,
            ],
            iterations: view.max_iterations(),
            color: view.color.tag(),
            time: view.elapsed,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
