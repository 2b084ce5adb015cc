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

use crate::Vector3;
use serde::Serialize;

/// Per-particle forces, energies and virials of one compute.
///
/// Sized to local + ghost particles. Ghost slots are never written and stay
/// zero. The virial is stored as six component planes, `virial[k * pitch + i]`
/// for component `k` (xx, xy, xz, yy, yz, zz) of particle `i`.
#[derive(Clone, Debug, Default)]
pub struct ForceOutput {
    forces: Vec<Vector3>,
    energies: Vec<f64>,
    virial: Vec<f64>,
    pitch: usize,
    n_local: usize,
}

/// Reduced totals over local particles
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ForceSummary {
    pub energy: f64,
    pub virial: [f64; 6],
    pub net_force: [f64; 3],
}

impl ForceOutput {
    /// Resize to `n_local + n_ghosts` slots and zero everything
    pub fn reset(&mut self, n_local: usize, n_ghosts: usize) {
        let n = n_local + n_ghosts;
        self.pitch = n;
        self.n_local = n_local;
        self.forces.clear();
        self.forces.resize(n, Vector3::zeros());
        self.energies.clear();
        self.energies.resize(n, 0.0);
        self.virial.clear();
        self.virial.resize(6 * n, 0.0);
    }

    pub fn len(&self) -> usize {
        self.pitch
    }

    pub fn is_empty(&self) -> bool {
        self.pitch == 0
    }

    pub fn n_local(&self) -> usize {
        self.n_local
    }

    pub fn pitch(&self) -> usize {
        self.pitch
    }

    pub fn forces(&self) -> &[Vector3] {
        &self.forces
    }

    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    /// Raw virial planes
    pub fn virial_planes(&self) -> &[f64] {
        &self.virial
    }

    pub fn virial(&self, index: usize) -> [f64; 6] {
        std::array::from_fn(|k| self.virial[k * self.pitch + index])
    }

    /// Add force, energy and (optionally) virial to a local particle
    #[inline]
    pub(crate) fn add(
        &mut self,
        index: usize,
        force: Vector3,
        energy: f64,
        virial: Option<&[f64; 6]>,
    ) {
        debug_assert!(index < self.n_local, "ghost slot {index} written");
        self.forces[index] += force;
        self.energies[index] += energy;
        if let Some(w) = virial {
            for (k, wk) in w.iter().enumerate() {
                self.virial[k * self.pitch + index] += wk;
            }
        }
    }

    pub(crate) fn add_energy(&mut self, index: usize, energy: f64) {
        debug_assert!(index < self.n_local, "ghost slot {index} written");
        self.energies[index] += energy;
    }

    pub fn total_energy(&self) -> f64 {
        self.energies[..self.n_local].iter().sum()
    }

    pub fn total_virial(&self) -> [f64; 6] {
        std::array::from_fn(|k| {
            self.virial[k * self.pitch..k * self.pitch + self.n_local]
                .iter()
                .sum()
        })
    }

    pub fn net_force(&self) -> Vector3 {
        self.forces[..self.n_local].iter().sum()
    }

    pub fn summary(&self) -> ForceSummary {
        let f = self.net_force();
        ForceSummary {
            energy: self.total_energy(),
            virial: self.total_virial(),
            net_force: [f.x, f.y, f.z],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_reset_zeroes_previous_step() {
        let mut out = ForceOutput::default();
        out.reset(2, 1);
        out.add(1, Vector3::new(1.0, 0.0, 0.0), 2.0, Some(&[1.0; 6]));
        assert_relative_eq!(out.total_energy(), 2.0);
        assert_eq!(out.virial(1), [1.0; 6]);
        out.reset(3, 0);
        assert_eq!(out.len(), 3);
        assert_relative_eq!(out.total_energy(), 0.0);
        assert_eq!(out.total_virial(), [0.0; 6]);
        assert_relative_eq!(out.net_force().norm(), 0.0);
    }

    #[test]
    fn test_virial_planes_layout() {
        let mut out = ForceOutput::default();
        out.reset(2, 2);
        out.add(1, Vector3::zeros(), 0.0, Some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
        let planes = out.virial_planes();
        assert_eq!(planes.len(), 24);
        assert_relative_eq!(planes[4 + 1], 2.0);
        assert_relative_eq!(planes[5 * 4 + 1], 6.0);
        assert_eq!(out.total_virial(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}
