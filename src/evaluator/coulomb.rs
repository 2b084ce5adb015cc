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

/// Screened Coulomb parameters
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenedCoulombParams {
    /// Electrostatic prefactor, e.g. the Bjerrum length in reduced units
    pub bjerrum: f64,
    /// Inverse Debye length
    pub kappa: f64,
}

impl ScreenedCoulombParams {
    pub const fn new(bjerrum: f64, kappa: f64) -> Self {
        Self { bjerrum, kappa }
    }
}

/// Yukawa (screened Coulomb) interaction, 𝑈(𝑟) = ℓ𝑧ₐ𝑧ᵦ exp(-κ𝑟)/𝑟
///
/// Charges are taken from the particle data so a single parameter block
/// covers every pair of types with the same medium.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScreenedCoulomb;

impl Evaluator for ScreenedCoulomb {
    type Param = ScreenedCoulombParams;

    fn name() -> &'static str {
        "yukawa"
    }

    fn needs_charge() -> bool {
        true
    }

    fn evaluate(rsq: f64, param: &ScreenedCoulombParams, aux: &PairAux) -> Option<Evaluation> {
        if rsq <= 0.0 {
            return None;
        }
        let r = rsq.sqrt();
        let energy = param.bjerrum * aux.charge[0] * aux.charge[1] * (-param.kappa * r).exp() / r;
        Some(Evaluation {
            force_divr: energy * (1.0 + param.kappa * r) / rsq,
            energy,
        })
    }

    fn gpu_params(param: &ScreenedCoulombParams) -> [f32; 4] {
        [param.bjerrum as f32, param.kappa as f32, 0.0, 0.0]
    }

    fn wgsl() -> &'static str {
        r#"
fn evaluate(rsq: f32, p: vec4<f32>, aux: vec4<f32>) -> vec3<f32> {
    if (rsq <= 0.0) {
        return vec3<f32>(0.0, 0.0, 0.0);
    }
    let r = sqrt(rsq);
    let energy = p.x * aux.x * aux.y * exp(-p.y * r) / r;
    return vec3<f32>(energy * (1.0 + p.y * r) / rsq, energy, 1.0);
}
"#
    }
}
