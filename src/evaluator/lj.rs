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

use super::{Evaluation, Evaluator, PairAux};
use serde::{Deserialize, Serialize};

/// Lennard-Jones parameters
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LennardJonesParams {
    pub epsilon: f64,
    pub sigma: f64,
}

impl LennardJonesParams {
    pub const fn new(epsilon: f64, sigma: f64) -> Self {
        Self { epsilon, sigma }
    }

    /// Prefactors (4εσ¹², 4εσ⁶)
    fn prefactors(&self) -> (f64, f64) {
        let s6 = self.sigma.powi(6);
        (4.0 * self.epsilon * s6 * s6, 4.0 * self.epsilon * s6)
    }
}

/// Lennard-Jones 12-6 pair potential
#[derive(Clone, Copy, Debug, Default)]
pub struct LennardJones;

impl Evaluator for LennardJones {
    type Param = LennardJonesParams;

    fn name() -> &'static str {
        "lj"
    }

    fn evaluate(rsq: f64, param: &LennardJonesParams, _aux: &PairAux) -> Option<Evaluation> {
        if rsq <= 0.0 {
            return None;
        }
        let (lj1, lj2) = param.prefactors();
        let r2inv = rsq.recip();
        let r6inv = r2inv * r2inv * r2inv;
        Some(Evaluation {
            force_divr: r2inv * r6inv * (12.0 * lj1 * r6inv - 6.0 * lj2),
            energy: r6inv * (lj1 * r6inv - lj2),
        })
    }

    fn gpu_params(param: &LennardJonesParams) -> [f32; 4] {
        let (lj1, lj2) = param.prefactors();
        [lj1 as f32, lj2 as f32, 0.0, 0.0]
    }

    fn wgsl() -> &'static str {
        r#"
fn evaluate(rsq: f32, p: vec4<f32>, aux: vec4<f32>) -> vec3<f32> {
    if (rsq <= 0.0) {
        return vec3<f32>(0.0, 0.0, 0.0);
    }
    let r2inv = 1.0 / rsq;
    let r6inv = r2inv * r2inv * r2inv;
    let force_divr = r2inv * r6inv * (12.0 * p.x * r6inv - 6.0 * p.y);
    let energy = r6inv * (p.x * r6inv - p.y);
    return vec3<f32>(force_divr, energy, 1.0);
}
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::testing::check_force_is_gradient;
    use approx::assert_relative_eq;

    #[test]
    fn test_minimum() {
        let p = LennardJonesParams::new(1.5, 2.0);
        let rmin = 2f64.powf(1.0 / 6.0) * 2.0;
        let e = LennardJones::evaluate(rmin * rmin, &p, &PairAux::default()).unwrap();
        assert_relative_eq!(e.energy, -1.5, epsilon = 1e-12);
        assert_relative_eq!(e.force_divr, 0.0, epsilon = 1e-12);
        let e = LennardJones::evaluate(4.0, &p, &PairAux::default()).unwrap();
        assert_relative_eq!(e.energy, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_force_is_gradient() {
        let p = LennardJonesParams::new(1.0, 1.0);
        for r in [0.95, 1.12, 1.8, 2.5] {
            check_force_is_gradient::<LennardJones>(&p, &PairAux::default(), r);
        }
        assert!(LennardJones::evaluate(0.0, &p, &PairAux::default()).is_none());
    }
}
