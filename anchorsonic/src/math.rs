//! Math types and the listener transform pipeline.
//!
//! Listener-local axes follow Steam Audio: `+X` right, `+Y` up, `-Z` ahead.
//!
//! A head-orientation sensor reports attitude in its own coordinate convention, which
//! differs in handedness from the renderer's. The listener transform is therefore built
//! as `mirror * rotation * reference_frame`, in that fixed order, where `mirror` reflects
//! one axis and `reference_frame` recenters the reported attitude.

pub use glam::{Mat3, Mat4, Quat, Vec3, Vec4};

use crate::error::TransformError;

/// Maximum deviation from unit length accepted for sensor quaternions.
const UNIT_TOLERANCE: f32 = 1e-3;

/// Axis reflected by the handedness correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MirrorAxis {
    #[default]
    X,
    Y,
    Z,
    /// No correction, for sensors that already share the renderer's handedness.
    None,
}

/// Returns the fixed reflection matrix for `axis`.
pub fn mirror_transform(axis: MirrorAxis) -> Mat4 {
    let scale = match axis {
        MirrorAxis::X => Vec3::new(-1.0, 1.0, 1.0),
        MirrorAxis::Y => Vec3::new(1.0, -1.0, 1.0),
        MirrorAxis::Z => Vec3::new(1.0, 1.0, -1.0),
        MirrorAxis::None => Vec3::ONE,
    };
    Mat4::from_scale(scale)
}

/// A validated head attitude: either a unit quaternion or a proper rotation matrix.
///
/// Construction is the boundary where malformed sensor data is rejected, so every
/// `Orientation` that exists is safe to feed into [`compute_listener_transform`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation(Repr);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Repr {
    Quaternion(Quat),
    Matrix(Mat3),
}

impl Orientation {
    pub const IDENTITY: Self = Self(Repr::Quaternion(Quat::IDENTITY));

    /// Accepts a quaternion within a small tolerance of unit length and renormalizes it.
    pub fn from_quat(q: Quat) -> Result<Self, TransformError> {
        if !q.is_finite() {
            return Err(TransformError::NonFinite);
        }
        let deviation = (q.length() - 1.0).abs();
        if deviation > UNIT_TOLERANCE {
            return Err(TransformError::NotUnit(deviation));
        }
        Ok(Self(Repr::Quaternion(q.normalize())))
    }

    /// Accepts a 3x3 matrix that is orthonormal with determinant +1.
    pub fn from_rotation_matrix(m: Mat3) -> Result<Self, TransformError> {
        if !m.is_finite() {
            return Err(TransformError::NonFinite);
        }
        let gram = m.transpose() * m;
        if !gram.abs_diff_eq(Mat3::IDENTITY, UNIT_TOLERANCE)
            || (m.determinant() - 1.0).abs() > UNIT_TOLERANCE
        {
            return Err(TransformError::NotRotation);
        }
        Ok(Self(Repr::Matrix(m)))
    }

    /// Rotation about the vertical axis, positive turning the head to the left.
    pub fn from_yaw(yaw_radians: f32) -> Result<Self, TransformError> {
        if !yaw_radians.is_finite() {
            return Err(TransformError::NonFinite);
        }
        Ok(Self(Repr::Quaternion(Quat::from_rotation_y(yaw_radians))))
    }

    pub fn to_quat(&self) -> Quat {
        match self.0 {
            Repr::Quaternion(q) => q,
            Repr::Matrix(m) => Quat::from_mat3(&m).normalize(),
        }
    }

    /// The attitude as a 4x4 transform without translation.
    pub fn to_matrix(&self) -> Mat4 {
        match self.0 {
            Repr::Quaternion(q) => Mat4::from_quat(q),
            Repr::Matrix(m) => Mat4::from_mat3(m),
        }
    }

    pub fn inverse(&self) -> Self {
        match self.0 {
            Repr::Quaternion(q) => Self(Repr::Quaternion(q.conjugate())),
            Repr::Matrix(m) => Self(Repr::Matrix(m.transpose())),
        }
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Computes `mirror(X) * rotation * reference_frame`.
///
/// Translation is dropped from the result; the listener stays at the origin.
pub fn compute_listener_transform(orientation: &Orientation, reference_frame: Mat4) -> Mat4 {
    compute_listener_transform_mirrored(orientation, reference_frame, MirrorAxis::X)
}

pub fn compute_listener_transform_mirrored(
    orientation: &Orientation,
    reference_frame: Mat4,
    mirror: MirrorAxis,
) -> Mat4 {
    let mut transform = mirror_transform(mirror) * orientation.to_matrix() * reference_frame;
    transform.w_axis = Vec4::W;
    transform
}

/// Reference frame that makes `current` read as the neutral attitude.
pub fn recenter_reference(current: &Orientation) -> Mat4 {
    current.inverse().to_matrix()
}

/// True when the upper-left 3x3 block has orthonormal columns and there is no translation.
pub fn is_rigid_rotation(m: &Mat4, epsilon: f32) -> bool {
    let basis = Mat3::from_mat4(*m);
    let gram = basis.transpose() * basis;
    gram.abs_diff_eq(Mat3::IDENTITY, epsilon)
        && m.w_axis.truncate().length() <= epsilon
        && (m.w_axis.w - 1.0).abs() <= epsilon
}

/// Direction (unit vector, listener-local) and distance from a listener to a source.
///
/// Returns `None` when the listener transform is singular or the nodes coincide.
pub fn source_direction_in_listener(listener: &Mat4, source: &Mat4) -> Option<(Vec3, f32)> {
    if listener.determinant().abs() < f32::EPSILON {
        return None;
    }
    let local = listener.inverse().transform_point3(source.w_axis.truncate());
    let distance = local.length();
    if !distance.is_finite() || distance <= f32::EPSILON {
        return None;
    }
    Some((local / distance, distance))
}

/// Azimuth of a listener-local direction in degrees: 0 ahead, +90 right, ±180 behind.
pub fn azimuth_degrees(direction: Vec3) -> f32 {
    direction.x.atan2(-direction.z).to_degrees()
}
