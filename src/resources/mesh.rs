//! Mesh data structures and generation

use std::f32::consts::PI;

use glam::{Vec2, Vec3};

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{SceneError, SceneResult};
use crate::resources::loader::AssetLoader;
use crate::scene::GeometryKind;

/// A mesh with vertex and index data
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub name: String,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            name: name.to_string(),
        }
    }

    /// Calculate index count
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Calculate triangle count
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Get vertex data as bytes
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Get index data as bytes
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Quad covering clip space; texture coordinates follow the clip position
    pub fn screen_quad() -> Self {
        let mut mesh = Mesh::new("screen_quad");
        for (x, y) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            mesh.vertices
                .push(Vertex::new(Vec3::new(x, y, 0.0), -Vec3::Z, Vec2::new(x, y)));
        }
        mesh.indices.extend_from_slice(&[0, 3, 2, 0, 2, 1]);
        mesh
    }

    /// Box centered at the origin
    pub fn cube(width: f32, height: f32, depth: f32) -> Self {
        let mut mesh = Mesh::new("cube");
        let half = Vec3::new(width, height, depth) / 2.0;

        // (normal, u axis, v axis) per face
        let faces = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (-Vec3::Z, -Vec3::X, Vec3::Y),
            (Vec3::X, -Vec3::Z, Vec3::Y),
            (-Vec3::X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, -Vec3::Z),
            (-Vec3::Y, Vec3::X, Vec3::Z),
        ];
        let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

        for (normal, u_axis, v_axis) in faces {
            let base = mesh.vertices.len() as u32;
            for (u, v) in corners {
                let position = (normal + u_axis * u + v_axis * v) * half;
                let uv = Vec2::new((u + 1.0) / 2.0, (1.0 - v) / 2.0);
                mesh.vertices.push(Vertex::new(position, normal, uv));
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        mesh
    }

    /// Create a UV sphere
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let mut mesh = Mesh::new("sphere");

        let segment_angle = 2.0 * PI / segments as f32;
        let ring_angle = PI / rings as f32;

        for ring in 0..=rings {
            let phi = ring as f32 * ring_angle;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for segment in 0..=segments {
                let theta = segment as f32 * segment_angle;
                let normal = Vec3::new(ring_radius * theta.cos(), y, ring_radius * theta.sin());
                let uv = Vec2::new(
                    segment as f32 / segments as f32,
                    ring as f32 / rings as f32,
                );
                mesh.vertices
                    .push(Vertex::new(normal * radius, normal.normalize_or_zero(), uv));
            }
        }

        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;

                mesh.indices.extend_from_slice(&[
                    current,
                    current + 1,
                    next,
                    current + 1,
                    next + 1,
                    next,
                ]);
            }
        }

        mesh
    }

    /// Create a plane on the XZ axis facing up
    pub fn plane(width: f32, depth: f32) -> Self {
        let mut mesh = Mesh::new("plane");
        let (hw, hd) = (width / 2.0, depth / 2.0);

        for (x, z, u, v) in [
            (-hw, hd, 0.0, 1.0),
            (hw, hd, 1.0, 1.0),
            (hw, -hd, 1.0, 0.0),
            (-hw, -hd, 0.0, 0.0),
        ] {
            mesh.vertices
                .push(Vertex::new(Vec3::new(x, 0.0, z), Vec3::Y, Vec2::new(u, v)));
        }
        mesh.indices.extend_from_slice(&[0, 1, 2, 0, 2, 3]);
        mesh
    }

    /// Build a mesh from `tobj` model data
    pub fn from_obj_models(name: &str, models: &[tobj::Model]) -> Self {
        let mut mesh = Mesh::new(name);

        for model in models {
            let data = &model.mesh;
            let base = mesh.vertices.len() as u32;
            let vertex_count = data.positions.len() / 3;

            for i in 0..vertex_count {
                let position = Vec3::from_slice(&data.positions[i * 3..i * 3 + 3]);
                let normal = if data.normals.len() >= (i + 1) * 3 {
                    Vec3::from_slice(&data.normals[i * 3..i * 3 + 3])
                } else {
                    Vec3::ZERO
                };
                let uv = if data.texcoords.len() >= (i + 1) * 2 {
                    Vec2::new(data.texcoords[i * 2], 1.0 - data.texcoords[i * 2 + 1])
                } else {
                    Vec2::ZERO
                };
                mesh.vertices.push(Vertex::new(position, normal, uv));
            }
            mesh.indices
                .extend(data.indices.iter().map(|&index| base + index));
        }

        mesh
    }
}

/// Generate or load the mesh for an object's geometry
pub fn build_mesh(
    geometry: &GeometryKind,
    loader: &dyn AssetLoader,
    path: &str,
) -> SceneResult<Mesh> {
    Ok(match geometry {
        GeometryKind::ScreenQuad => Mesh::screen_quad(),
        GeometryKind::Cube {
            width,
            height,
            depth,
        } => Mesh::cube(*width, *height, *depth),
        GeometryKind::Sphere {
            radius,
            segments,
            rings,
        } => Mesh::sphere(*radius, *segments, *rings),
        GeometryKind::Plane { width, depth } => Mesh::plane(*width, *depth),
        GeometryKind::Mesh(file) => {
            let mesh = loader.load_mesh(file).map_err(|e| SceneError::AssetLoad {
                path: path.to_string(),
                asset: file.clone(),
                message: e.to_string(),
            })?;
            if mesh.indices.is_empty() {
                return Err(SceneError::AssetLoad {
                    path: path.to_string(),
                    asset: file.clone(),
                    message: "mesh contains no triangles".to_string(),
                });
            }
            mesh
        }
    })
}

/// Vertex and index buffers of an uploaded mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuMesh {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
}

impl GpuMesh {
    /// Upload a mesh, labelling its buffers with the object name
    pub fn create(device: &mut dyn RenderDevice, mesh: &Mesh, label: &str) -> BackendResult<Self> {
        let vertex_buffer = device.create_buffer_init(
            &BufferDescriptor {
                label: Some(label.to_string()),
                size: mesh.vertex_bytes().len() as u64,
                usage: BufferUsage::VERTEX,
            },
            mesh.vertex_bytes(),
        )?;
        let index_buffer = match device.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{label} indices")),
                size: mesh.index_bytes().len() as u64,
                usage: BufferUsage::INDEX,
            },
            mesh.index_bytes(),
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                let _ = device.destroy_buffer(vertex_buffer);
                return Err(e);
            }
        };

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count() as u32,
        })
    }

    pub fn destroy(&self, device: &mut dyn RenderDevice) {
        for buffer in [self.vertex_buffer, self.index_buffer] {
            if let Err(e) = device.destroy_buffer(buffer) {
                log::warn!("Failed to destroy mesh buffer: {}", e);
            }
        }
    }
}
