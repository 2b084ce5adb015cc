// Copyright 2024 Mikael Lund
//
// Licensed under the Apache license, version 2.0 (the "license");
// you may not use this file except in compliance with the license.
// You may obtain a copy of the license at
//
//     http://www.apache.org/licenses/license-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the license is distributed on an "as is" basis,
// without warranties or conditions of any kind, either express or implied.
// See the license for the specific language governing permissions and
// limitations under the license.

use crate::{ForceError, Result, Vector3};
use serde::Serialize;

/// Orthorhombic simulation box centered at the origin
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoxDim {
    /// Side lengths
    lengths: Vector3,
    /// Periodicity along x, y, z
    periodic: [bool; 3],
}

impl BoxDim {
    /// Fully periodic box with side lengths `lx`, `ly`, `lz`.
    ///
    /// Lengths must be finite and positive.
    pub fn new(lx: f64, ly: f64, lz: f64) -> Result<Self> {
        let lengths = Vector3::new(lx, ly, lz);
        if lengths.iter().any(|l| !(l.is_finite() && *l > 0.0)) {
            return Err(ForceError::config(format!(
                "box lengths must be finite and positive, got {lx} {ly} {lz}"
            )));
        }
        Ok(Self {
            lengths,
            periodic: [true; 3],
        })
    }

    /// Fully periodic cube
    pub fn cube(length: f64) -> Result<Self> {
        Self::new(length, length, length)
    }

    pub fn with_periodic(mut self, periodic: [bool; 3]) -> Self {
        self.periodic = periodic;
        self
    }

    pub fn lengths(&self) -> &Vector3 {
        &self.lengths
    }

    pub fn periodic(&self) -> [bool; 3] {
        self.periodic
    }

    pub fn volume(&self) -> f64 {
        self.lengths.product()
    }

    /// Minimum image of a displacement, wrapped into `[-L/2, L/2)` along
    /// periodic directions
    #[inline]
    pub fn min_image(&self, mut dx: Vector3) -> Vector3 {
        for dim in 0..3 {
            if self.periodic[dim] {
                let l = self.lengths[dim];
                dx[dim] -= l * (dx[dim] / l + 0.5).floor();
            }
        }
        dx
    }

    /// Wrap a position back into the box
    pub fn wrap(&self, pos: Vector3) -> Vector3 {
        self.min_image(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_min_image_wraps_across_faces() {
        let b = BoxDim::cube(10.0).unwrap();
        let dx = b.min_image(Vector3::new(9.0, -9.5, 4.0));
        assert_relative_eq!(dx.x, -1.0, epsilon = 1e-12);
        assert_relative_eq!(dx.y, 0.5, epsilon = 1e-12);
        assert_relative_eq!(dx.z, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_min_image_half_open_interval() {
        let b = BoxDim::cube(10.0).unwrap();
        assert_relative_eq!(b.min_image(Vector3::new(5.0, 0.0, 0.0)).x, -5.0);
        assert_relative_eq!(b.min_image(Vector3::new(-5.0, 0.0, 0.0)).x, -5.0);
        assert_relative_eq!(b.min_image(Vector3::new(25.0, 0.0, 0.0)).x, -5.0);
    }

    #[test]
    fn test_non_periodic_direction_untouched() {
        let b = BoxDim::new(10.0, 10.0, 10.0)
            .unwrap()
            .with_periodic([true, true, false]);
        let dx = b.min_image(Vector3::new(9.0, 9.0, 9.0));
        assert_relative_eq!(dx.x, -1.0, epsilon = 1e-12);
        assert_relative_eq!(dx.z, 9.0);
        assert_relative_eq!(b.volume(), 1000.0);
    }

    #[test]
    fn test_rejects_degenerate_lengths() {
        for l in [0.0, -10.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                BoxDim::new(10.0, l, 10.0),
                Err(ForceError::Configuration(_))
            ));
            assert!(BoxDim::cube(l).is_err());
        }
        let b = BoxDim::new(2.0, 3.0, 4.0).unwrap();
        assert_relative_eq!(b.volume(), 24.0);
        assert!(b.min_image(Vector3::new(1.5, -2.0, 3.0)).iter().all(|x| x.is_finite()));
    }
}
