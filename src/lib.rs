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

//! Force, energy and virial evaluation for particle simulations.
//!
//! A compute instance (bond, pair or EAM) is consulted once per timestep.
//! It resolves the interaction records of an externally built list against
//! the particle store, evaluates each interaction with a pluggable
//! [`Evaluator`] on a CPU or GPU [`Backend`], and accumulates per-particle
//! forces, energies and virials. Ghost particles act as force sources only.

pub mod backend;
pub mod boxdim;
pub mod comm;
pub mod compute;
pub mod config;
pub mod eam;
pub mod error;
pub mod evaluator;
pub mod interaction;
pub mod output;
pub mod params;
pub mod particles;
pub mod potential;
pub mod table;

pub use backend::{Backend, BackendKind, GpuContext};
pub use boxdim::BoxDim;
pub use comm::{CommFlags, StepFlags};
pub use compute::{ComputeScheduler, ForceCompute, StepContext};
pub use eam::{EamForceCompute, EamTabulation};
pub use error::{ForceError, Result};
pub use evaluator::{Evaluation, Evaluator, PairAux};
pub use interaction::{BondTable, InteractionList, InteractionRecord, NeighborList};
pub use output::ForceOutput;
pub use params::{ParamTable, TypeNames, TypePairIndex};
pub use particles::{ParticleData, ParticleStore, NOT_LOCAL};
pub use potential::{PotentialBond, PotentialPair, ShiftMode};
pub use table::{Sampled, TableSet};

extern crate pretty_env_logger;
#[macro_use]
extern crate log;

pub type Vector3 = nalgebra::Vector3<f64>;

/// Symmetric virial components in storage order
pub const VIRIAL_COMPONENTS: [&str; 6] = ["xx", "xy", "xz", "yy", "yz", "zz"];

/// Six independent virial components `½ f/r · dx_a dx_b` for one participant
#[inline]
pub(crate) fn half_virial(force_divr: f64, dx: &Vector3) -> [f64; 6] {
    let f = 0.5 * force_divr;
    [
        f * dx.x * dx.x,
        f * dx.x * dx.y,
        f * dx.x * dx.z,
        f * dx.y * dx.y,
        f * dx.y * dx.z,
        f * dx.z * dx.z,
    ]
}
