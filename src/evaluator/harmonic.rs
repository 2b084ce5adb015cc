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

/// Harmonic bond parameters
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HarmonicParams {
    /// Spring constant
    pub k: f64,
    /// Rest length
    pub r0: f64,
}

impl HarmonicParams {
    pub const fn new(k: f64, r0: f64) -> Self {
        Self { k, r0 }
    }
}

/// Harmonic bond, 𝑈(𝑟) = ½𝑘(𝑟 - 𝑟₀)²
#[derive(Clone, Copy, Debug, Default)]
pub struct Harmonic;

impl Evaluator for Harmonic {
    type Param = HarmonicParams;

    fn name() -> &'static str {
        "harmonic"
    }

    fn evaluate(rsq: f64, param: &HarmonicParams, _aux: &PairAux) -> Option<Evaluation> {
        let r = rsq.sqrt();
        let dr = r - param.r0;
        // with zero rest length the force is linear in dx and r = 0 is fine
        let force_divr = if param.r0 == 0.0 {
            -param.k
        } else if r > 0.0 {
            -param.k * dr / r
        } else {
            return None;
        };
        Some(Evaluation {
            force_divr,
            energy: 0.5 * param.k * dr * dr,
        })
    }

    fn gpu_params(param: &HarmonicParams) -> [f32; 4] {
        [param.k as f32, param.r0 as f32, 0.0, 0.0]
    }

    fn wgsl() -> &'static str {
        r#"
fn evaluate(rsq: f32, p: vec4<f32>, aux: vec4<f32>) -> vec3<f32> {
    let k = p.x;
    let r0 = p.y;
    let r = sqrt(rsq);
    let dr = r - r0;
    var force_divr = -k;
    if (r0 != 0.0) {
        if (r <= 0.0) {
            return vec3<f32>(0.0, 0.0, 0.0);
        }
        force_divr = -k * dr / r;
    }
    return vec3<f32>(force_divr, 0.5 * k * dr * dr, 1.0);
}
"#
    }
}
