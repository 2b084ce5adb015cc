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

/// FENE bond parameters
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeneParams {
    /// Spring constant
    pub k: f64,
    /// Maximum bond extension
    pub r0: f64,
    /// WCA well depth; zero disables the repulsive core
    pub epsilon: f64,
    /// WCA diameter
    pub sigma: f64,
}

impl FeneParams {
    pub const fn new(k: f64, r0: f64, epsilon: f64, sigma: f64) -> Self {
        Self {
            k,
            r0,
            epsilon,
            sigma,
        }
    }
}

/// Finitely extensible nonlinear elastic bond with a WCA core.
///
/// Distances are shifted by Δ = (𝑑ₐ + 𝑑ᵦ)/2 - 1 so that beads of
/// different diameter bond surface to surface:
///
/// 𝑈(𝑟) = -½𝑘𝑟₀² ln(1 - (𝑟-Δ)²/𝑟₀²) + 𝑈_WCA(𝑟-Δ)
///
/// Extensions at or beyond 𝑟₀ have no finite energy and are rejected.
#[derive(Clone, Copy, Debug, Default)]
pub struct Fene;

impl Evaluator for Fene {
    type Param = FeneParams;

    fn name() -> &'static str {
        "fene"
    }

    fn needs_diameter() -> bool {
        true
    }

    fn evaluate(rsq: f64, param: &FeneParams, aux: &PairAux) -> Option<Evaluation> {
        let r = rsq.sqrt();
        let delta = 0.5 * (aux.diameter[0] + aux.diameter[1]) - 1.0;
        let rs = r - delta;
        if r <= 0.0 || rs <= 0.0 {
            return None;
        }
        let rs_sq = rs * rs;
        let r0_sq = param.r0 * param.r0;
        if rs_sq >= r0_sq {
            return None;
        }

        // -dU/drs / rs and energy, accumulated in the shifted coordinate
        let mut force_divrs = 0.0;
        let mut energy = 0.0;

        let sigma_sq = param.sigma * param.sigma;
        if param.epsilon != 0.0 && rs_sq < 2f64.powf(1.0 / 3.0) * sigma_sq {
            let s6 = (sigma_sq / rs_sq).powi(3);
            force_divrs += 24.0 * param.epsilon * (2.0 * s6 * s6 - s6) / rs_sq;
            energy += 4.0 * param.epsilon * (s6 * s6 - s6) + param.epsilon;
        }

        let stretch = 1.0 - rs_sq / r0_sq;
        force_divrs -= param.k / stretch;
        energy -= 0.5 * param.k * r0_sq * stretch.ln();

        Some(Evaluation {
            force_divr: force_divrs * rs / r,
            energy,
        })
    }

    fn gpu_params(param: &FeneParams) -> [f32; 4] {
        [
            param.k as f32,
            param.r0 as f32,
            param.epsilon as f32,
            param.sigma as f32,
        ]
    }

    fn wgsl() -> &'static str {
        r#"
fn evaluate(rsq: f32, p: vec4<f32>, aux: vec4<f32>) -> vec3<f32> {
    let k = p.x;
    let r0 = p.y;
    let epsilon = p.z;
    let sigma = p.w;
    let r = sqrt(rsq);
    let delta = 0.5 * (aux.z + aux.w) - 1.0;
    let rs = r - delta;
    if (r <= 0.0 || rs <= 0.0) {
        return vec3<f32>(0.0, 0.0, 0.0);
    }
    let rs_sq = rs * rs;
    let r0_sq = r0 * r0;
    if (rs_sq >= r0_sq) {
        return vec3<f32>(0.0, 0.0, 0.0);
    }
    var force_divrs = 0.0;
    var energy = 0.0;
    let sigma_sq = sigma * sigma;
    if (epsilon != 0.0 && rs_sq < 1.2599210498948732 * sigma_sq) {
        let s2 = sigma_sq / rs_sq;
        let s6 = s2 * s2 * s2;
        force_divrs += 24.0 * epsilon * (2.0 * s6 * s6 - s6) / rs_sq;
        energy += 4.0 * epsilon * (s6 * s6 - s6) + epsilon;
    }
    let stretch = 1.0 - rs_sq / r0_sq;
    force_divrs -= k / stretch;
    energy -= 0.5 * k * r0_sq * log(stretch);
    return vec3<f32>(force_divrs * rs / r, energy, 1.0);
}
"#
    }
}
