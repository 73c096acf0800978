//! Sensor-to-map rigid transform.

use nalgebra::{Isometry3, Matrix3, Vector3};

/// Rotation and translation taking sensor-frame points into the map frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorPose {
    /// Row-major 3x3 rotation.
    pub rotation: [f32; 9],
    pub translation: [f32; 3],
}

impl SensorPose {
    pub fn new(rotation: [f32; 9], translation: [f32; 3]) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::from_translation([0.0, 0.0, 0.0])
    }

    pub fn from_translation(translation: [f32; 3]) -> Self {
        Self::new([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0], translation)
    }

    pub fn from_isometry(iso: &Isometry3<f32>) -> Self {
        let r: Matrix3<f32> = iso.rotation.to_rotation_matrix().into_inner();
        let t: Vector3<f32> = iso.translation.vector;
        Self::new(
            [
                r[(0, 0)],
                r[(0, 1)],
                r[(0, 2)],
                r[(1, 0)],
                r[(1, 1)],
                r[(1, 2)],
                r[(2, 0)],
                r[(2, 1)],
                r[(2, 2)],
            ],
            [t.x, t.y, t.z],
        )
    }

    /// Map a sensor-frame point into the map frame.
    #[inline]
    pub fn transform(&self, p: &[f32; 3]) -> [f32; 3] {
        let r = &self.rotation;
        let t = &self.translation;
        [
            transform_axis(p, r[0], r[1], r[2], t[0]),
            transform_axis(p, r[3], r[4], r[5], t[1]),
            transform_axis(p, r[6], r[7], r[8], t[2]),
        ]
    }
}

impl Default for SensorPose {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<Isometry3<f32>> for SensorPose {
    fn from(iso: Isometry3<f32>) -> Self {
        Self::from_isometry(&iso)
    }
}

/// One output axis of the rigid transform: `r0 * x + r1 * y + r2 * z + t`.
#[inline]
pub fn transform_axis(p: &[f32; 3], r0: f32, r1: f32, r2: f32, t: f32) -> f32 {
    r0 * p[0] + r1 * p[1] + r2 * p[2] + t
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Translation3, UnitQuaternion};

    #[test]
    fn test_identity() {
        let pose = SensorPose::identity();
        assert_eq!(pose.transform(&[1.0, -2.0, 3.5]), [1.0, -2.0, 3.5]);
    }

    #[test]
    fn test_translation() {
        let pose = SensorPose::from_translation([1.0, 2.0, 3.0]);
        assert_eq!(pose.transform(&[0.0, 0.0, 0.0]), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_row_major_rotation() {
        // 90 degrees about z: x -> y, y -> -x
        let pose = SensorPose::new([0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0], [0.0; 3]);
        let p = pose.transform(&[1.0, 0.0, 0.5]);
        assert_relative_eq!(p[0], 0.0);
        assert_relative_eq!(p[1], 1.0);
        assert_relative_eq!(p[2], 0.5);
    }

    #[test]
    fn test_matches_nalgebra_isometry() {
        let iso = Isometry3::from_parts(
            Translation3::new(0.5, -1.0, 1.2),
            UnitQuaternion::from_euler_angles(0.1, -0.2, 0.7),
        );
        let pose = SensorPose::from(iso);

        let p = [2.0f32, -0.5, 0.3];
        let expected = iso * Point3::new(p[0], p[1], p[2]);
        let got = pose.transform(&p);
        assert_relative_eq!(got[0], expected.x, epsilon = 1e-5);
        assert_relative_eq!(got[1], expected.y, epsilon = 1e-5);
        assert_relative_eq!(got[2], expected.z, epsilon = 1e-5);
    }
}
