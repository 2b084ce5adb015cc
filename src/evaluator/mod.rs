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

//! Interaction evaluators.
//!
//! An evaluator is a stateless force law selected once per compute as a
//! type parameter. Given the squared separation and a parameter block it
//! returns the force divided by distance and the energy of one interaction.
//! Capabilities (charge, diameter) are static so that both the pipeline and
//! the ghost attribute request can be decided without an instance.

mod coulomb;
mod fene;
mod harmonic;
mod lj;

pub use coulomb::{ScreenedCoulomb, ScreenedCoulombParams};
pub use fene::{Fene, FeneParams};
pub use harmonic::{Harmonic, HarmonicParams};
pub use lj::{LennardJones, LennardJonesParams};

use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// Optional per-particle attributes of the two participants.
///
/// Only filled in when the evaluator declares it needs them; zero otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PairAux {
    pub charge: [f64; 2],
    pub diameter: [f64; 2],
}

/// Result of a valid evaluation
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Evaluation {
    /// Force magnitude divided by distance, `-dU/dr / r`
    pub force_divr: f64,
    /// Full interaction energy (halved later by the pipeline)
    pub energy: f64,
}

/// Force law of a bond or pair interaction.
pub trait Evaluator: Send + Sync + 'static {
    /// Fixed-size parameter block per type or type pair
    type Param: Copy + Default + Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned;

    /// Short name used in diagnostics, e.g. `"harmonic"`
    fn name() -> &'static str;

    fn needs_charge() -> bool {
        false
    }

    fn needs_diameter() -> bool {
        false
    }

    /// Evaluate one interaction at squared distance `rsq`.
    ///
    /// Returns `None` if `rsq` lies outside the domain of the force law.
    fn evaluate(rsq: f64, param: &Self::Param, aux: &PairAux) -> Option<Evaluation>;

    /// Parameter block packed for the GPU kernel
    fn gpu_params(param: &Self::Param) -> [f32; 4];

    /// WGSL implementation of the same law:
    /// `fn evaluate(rsq: f32, p: vec4<f32>, aux: vec4<f32>) -> vec3<f32>`
    /// returning `(force_divr, energy, valid)` with `valid` either 0 or 1.
    fn wgsl() -> &'static str;
}
