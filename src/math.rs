//! Mathematics types and functions, mostly based on
//! [_glam-rs_](https://github.com/bitshifter/glam-rs).

pub use glam::{mat4, quat, vec2, vec3, vec4, EulerRot, Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

/// Returns `true` if the given vector is neither infinite nor `NaN`.
#[inline]
pub fn vec3_is_finite(val: Vec3) -> bool {
    let x = val.x.is_finite() as u8;
    let y = val.y.is_finite() as u8;
    let z = val.z.is_finite() as u8;

    x * y * z == 1
}

/// Normalizes `val`, returning zero for degenerate inputs instead of `NaN`.
#[inline]
pub fn vec3_normalize_safe(val: Vec3) -> Vec3 {
    let len = val.length();
    if len > 1e-10 {
        val / len
    } else {
        Vec3::ZERO
    }
}

/// An axis-aligned bounding box described by its two extreme corners.
#[derive(Clone, Copy, Debug)]
pub struct Aabb {
    pub max: Vec3,
    pub min: Vec3,
}

impl Aabb {
    /// Constructs the smallest box containing all of the given positions.
    ///
    /// An empty input yields a degenerate box at the origin.
    pub fn from_positions(positions: &[Vec3]) -> Self {
        let mut min = vec3(1e10, 1e10, 1e10);
        let mut max = vec3(-1e10, -1e10, -1e10);
        for position in positions {
            min = min.min(*position);
            max = max.max(*position);
        }

        if positions.is_empty() {
            min = Vec3::ZERO;
            max = Vec3::ZERO;
        }

        Self { max, min }
    }

    pub fn diagonal(&self) -> f32 {
        (self.max - self.min).length()
    }
}

/// A reliable epsilon for position comparisons within the given point cloud.
///
/// Scaled from the bounding-box diagonal; a degenerate cloud falls back to the
/// raw scale factor.
pub fn position_epsilon(positions: &[Vec3]) -> f32 {
    let diagonal = Aabb::from_positions(positions).diagonal();
    if diagonal == 0.0 {
        1e-5
    } else {
        diagonal * 1e-5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn aabb_from_positions() {
        let aabb = Aabb::from_positions(&[vec3(-1.0, 0.0, 2.0), vec3(3.0, -2.0, 0.0)]);

        assert_eq!(aabb.min, vec3(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, vec3(3.0, 0.0, 2.0));
    }

    #[test]
    pub fn position_epsilon_degenerate() {
        assert_eq!(position_epsilon(&[]), 1e-5);
        assert_eq!(position_epsilon(&[Vec3::ZERO, Vec3::ZERO]), 1e-5);
    }

    #[test]
    pub fn position_epsilon_scales_with_extent() {
        let eps = position_epsilon(&[Vec3::ZERO, vec3(3.0, 0.0, 4.0)]);

        assert!((eps - 5e-5).abs() < 1e-9);
    }
}
