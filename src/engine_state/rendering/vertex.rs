//! Vertex format of chunk geometry.

use cgmath::{Point3, Vector3};

/// One vertex of a voxel face.
///
/// # Memory Layout
/// - Position: [f32; 3] (12 bytes), world space
/// - Normal: [f32; 3] (12 bytes)
/// - Texture Index: u32 (4 bytes), 0 = top, 1 = side, 2 = bottom
/// - Light: f32 (4 bytes), sunlight scaled by ambient occlusion, 0.0-1.0
///
/// Total size: 32 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    position: [f32; 3],
    normal: [f32; 3],
    texture_index: u32,
    light: f32,
}

impl Vertex {
    pub fn new(position: Point3<f32>, normal: Vector3<f32>, texture_index: u32, light: f32) -> Self {
        Vertex {
            position: position.into(),
            normal: normal.into(),
            texture_index,
            light,
        }
    }

    pub fn position(&self) -> Point3<f32> {
        self.position.into()
    }

    pub fn normal(&self) -> Vector3<f32> {
        self.normal.into()
    }

    pub fn texture_index(&self) -> u32 {
        self.texture_index
    }

    pub fn light(&self) -> f32 {
        self.light
    }

    /// Returns the vertex buffer layout description for the shader pipeline.
    ///
    /// # Shader Attributes
    /// - `location = 0`: position (vec3<f32>)
    /// - `location = 1`: normal (vec3<f32>)
    /// - `location = 2`: texture_index (u32)
    /// - `location = 3`: light (f32)
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Uint32,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 7]>() as wgpu::BufferAddress,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_struct() {
        let layout = Vertex::desc();
        assert_eq!(layout.array_stride, 32);
        let last = layout.attributes.last().unwrap();
        assert_eq!(last.offset + last.format.size(), layout.array_stride);
    }
}
