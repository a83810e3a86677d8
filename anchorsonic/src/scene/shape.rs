//! Source geometry.
//!
//! A shape gives a source physical extent. The renderer uses the shape's bounding
//! radius as the closest distance the listener can be from the emitting surface.

use crate::engine::AnchorSonicEngine;
use crate::error::SceneError;
use crate::math::Vec3;
use std::sync::Arc;

/// Triangle mesh in the source's local coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    vertices: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Result<Self, SceneError> {
        if vertices.is_empty() || triangles.is_empty() {
            return Err(SceneError::InvalidMesh("mesh has no triangles".into()));
        }
        if vertices.iter().any(|v| !v.is_finite()) {
            return Err(SceneError::InvalidMesh("vertex is not finite".into()));
        }
        let count = vertices.len() as u32;
        if let Some(bad) = triangles.iter().flatten().find(|&&i| i >= count) {
            return Err(SceneError::InvalidMesh(format!(
                "triangle index {bad} out of range ({count} vertices)"
            )));
        }
        Ok(Self {
            vertices,
            triangles,
        })
    }

    /// Regular icosahedron centered on the origin.
    ///
    /// With `inward_normals` the winding is flipped so faces point at the center.
    pub fn icosahedron(radius: f32, inward_normals: bool) -> Self {
        let phi = (1.0 + 5f32.sqrt()) / 2.0;
        let vertices: Vec<Vec3> = [
            (-1.0, phi, 0.0),
            (1.0, phi, 0.0),
            (-1.0, -phi, 0.0),
            (1.0, -phi, 0.0),
            (0.0, -1.0, phi),
            (0.0, 1.0, phi),
            (0.0, -1.0, -phi),
            (0.0, 1.0, -phi),
            (phi, 0.0, -1.0),
            (phi, 0.0, 1.0),
            (-phi, 0.0, -1.0),
            (-phi, 0.0, 1.0),
        ]
        .into_iter()
        .map(|(x, y, z)| Vec3::new(x, y, z).normalize() * radius)
        .collect();

        let mut triangles = vec![
            [0, 11, 5],
            [0, 5, 1],
            [0, 1, 7],
            [0, 7, 10],
            [0, 10, 11],
            [1, 5, 9],
            [5, 11, 4],
            [11, 10, 2],
            [10, 7, 6],
            [7, 1, 8],
            [3, 9, 4],
            [3, 4, 2],
            [3, 2, 6],
            [3, 6, 8],
            [3, 8, 9],
            [4, 9, 5],
            [2, 4, 11],
            [6, 2, 10],
            [8, 6, 7],
            [9, 8, 1],
        ];
        if inward_normals {
            for triangle in &mut triangles {
                triangle.swap(1, 2);
            }
        }

        Self {
            vertices,
            triangles,
        }
    }

    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    /// Distance from the local origin to the farthest vertex.
    pub fn bounding_radius(&self) -> f32 {
        self.vertices
            .iter()
            .fold(0.0f32, |radius, v| radius.max(v.length()))
    }

    /// Outward (or inward, per winding) unit normal of one triangle.
    pub fn face_normal(&self, triangle: usize) -> Option<Vec3> {
        let [a, b, c] = *self.triangles.get(triangle)?;
        let (a, b, c) = (
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        );
        (b - a).cross(c - a).try_normalize()
    }
}

/// Immutable acoustic geometry owned by exactly one source.
#[derive(Debug, Clone)]
pub struct Shape {
    mesh: Arc<Mesh>,
    engine_id: u64,
}

impl Shape {
    pub fn new(engine: &AnchorSonicEngine, mesh: Mesh) -> Self {
        Self {
            mesh: Arc::new(mesh),
            engine_id: engine.id(),
        }
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn bounding_radius(&self) -> f32 {
        self.mesh.bounding_radius()
    }

    pub(crate) fn engine_id(&self) -> u64 {
        self.engine_id
    }
}
