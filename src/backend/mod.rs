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

//! Backend abstraction for interaction evaluation.
//!
//! A backend turns resolved interaction records into per-record
//! contributions (displacement, force over distance, energy). Accumulation
//! onto particles is done afterwards by the pipeline, identically for all
//! backends, so that results only differ by floating point precision.

mod cpu;
pub(crate) mod gpu;

pub use cpu::CpuBackend;
pub use gpu::{GpuContext, GpuRecordBackend};

use crate::{boxdim::BoxDim, evaluator::Evaluator, PairAux, Result, Vector3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Selects where interactions are evaluated
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Rayon parallel loop over records
    #[default]
    Cpu,
    /// wgpu compute shaders
    Gpu,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Gpu => write!(f, "gpu"),
        }
    }
}

/// Execution resources shared by the computes of one simulation
#[derive(Clone)]
pub enum Backend {
    Cpu,
    Gpu(Arc<GpuContext>),
}

impl Backend {
    /// Open the requested backend; fails if no GPU adapter is found
    pub fn new(kind: BackendKind) -> Result<Self> {
        match kind {
            BackendKind::Cpu => Ok(Self::Cpu),
            BackendKind::Gpu => Ok(Self::Gpu(Arc::new(GpuContext::new()?))),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Cpu => BackendKind::Cpu,
            Self::Gpu(_) => BackendKind::Gpu,
        }
    }

    /// Record evaluator for the force law `E`
    pub(crate) fn record_backend<E: Evaluator>(&self) -> Result<Box<dyn RecordBackend<E>>> {
        match self {
            Self::Cpu => Ok(Box::new(CpuBackend)),
            Self::Gpu(context) => Ok(Box::new(GpuRecordBackend::<E>::new(context.clone())?)),
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "Backend::Cpu"),
            Self::Gpu(context) => write!(f, "Backend::Gpu({})", context.adapter_name()),
        }
    }
}

/// Interaction record with both participants resolved to particle indices
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedRecord {
    /// Local or ghost index of each participant
    pub idx: [u32; 2],
    pub tags: [u32; 2],
    /// Parameter slot
    pub type_id: u32,
}

/// Per-slot cutoff applied before the evaluator is invoked
#[derive(Clone, Copy, Debug)]
pub struct Cutoff<'a> {
    /// Squared cutoff per parameter slot
    pub rcutsq: &'a [f64],
    /// Subtract the energy at the cutoff
    pub shift: bool,
}

/// Everything a backend needs to evaluate one batch of records
#[derive(Clone, Copy, Debug)]
pub struct RecordJob<'a, P> {
    pub positions: &'a [Vector3],
    /// Global box, used for the minimum image
    pub global_box: &'a BoxDim,
    pub records: &'a [ResolvedRecord],
    pub params: &'a [P],
    /// Pair potentials only
    pub cutoff: Option<Cutoff<'a>>,
    /// Only set if the evaluator needs charges
    pub charges: Option<&'a [f64]>,
    /// Only set if the evaluator needs diameters
    pub diameters: Option<&'a [f64]>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecordStatus {
    /// Beyond the cutoff; contributes nothing
    #[default]
    Skipped,
    Evaluated,
    /// Evaluator rejected the configuration
    OutOfBounds,
    /// Energy shift requested but the evaluator rejects the cutoff
    ShiftRejected,
}

/// Outcome of a single record
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RecordContribution {
    /// Minimum image of `pos_b - pos_a`
    pub dx: Vector3,
    pub force_divr: f64,
    /// Full, possibly shifted, interaction energy
    pub energy: f64,
    pub status: RecordStatus,
}

/// Evaluates interaction records with force law `E`
pub trait RecordBackend<E: Evaluator>: Send + Sync {
    /// One contribution per record, in record order
    fn evaluate(&self, job: &RecordJob<E::Param>) -> Result<Vec<RecordContribution>>;

    fn kind(&self) -> BackendKind;
}

/// Reference evaluation of one record, shared by the CPU backend and tests
#[inline]
pub(crate) fn evaluate_record<E: Evaluator>(
    job: &RecordJob<E::Param>,
    record: &ResolvedRecord,
) -> RecordContribution {
    let [a, b] = record.idx.map(|i| i as usize);
    let slot = record.type_id as usize;
    let dx = job.global_box.min_image(job.positions[b] - job.positions[a]);
    let rsq = dx.norm_squared();

    let mut contribution = RecordContribution {
        dx,
        ..Default::default()
    };
    if let Some(cutoff) = job.cutoff {
        if rsq >= cutoff.rcutsq[slot] {
            return contribution;
        }
    }

    let aux = PairAux {
        charge: job.charges.map_or([0.0; 2], |q| [q[a], q[b]]),
        diameter: job.diameters.map_or([0.0; 2], |d| [d[a], d[b]]),
    };
    let param = &job.params[slot];
    let Some(evaluation) = E::evaluate(rsq, param, &aux) else {
        contribution.status = RecordStatus::OutOfBounds;
        return contribution;
    };
    let shift = match job.cutoff {
        Some(Cutoff { rcutsq, shift: true }) => match E::evaluate(rcutsq[slot], param, &aux) {
            Some(at_cut) => at_cut.energy,
            None => {
                contribution.status = RecordStatus::ShiftRejected;
                return contribution;
            }
        },
        _ => 0.0,
    };
    contribution.force_divr = evaluation.force_divr;
    contribution.energy = evaluation.energy - shift;
    contribution.status = RecordStatus::Evaluated;
    contribution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{
        Fene, FeneParams, LennardJones, LennardJonesParams, ScreenedCoulomb,
        ScreenedCoulombParams,
    };
    use approx::assert_relative_eq;

    fn two_particles(x: f64) -> Vec<Vector3> {
        vec![Vector3::zeros(), Vector3::new(x, 0.0, 0.0)]
    }

    const RECORD: ResolvedRecord = ResolvedRecord {
        idx: [0, 1],
        tags: [0, 1],
        type_id: 0,
    };

    #[test]
    fn test_cutoff_and_shift() {
        let positions = two_particles(1.5);
        let global_box = BoxDim::cube(10.0).unwrap();
        let params = [LennardJonesParams::new(1.0, 1.0)];
        let short = [1.2 * 1.2];
        let mut job = RecordJob {
            positions: &positions,
            global_box: &global_box,
            records: &[RECORD],
            params: &params,
            cutoff: Some(Cutoff {
                rcutsq: &short,
                shift: false,
            }),
            charges: None,
            diameters: None,
        };
        let c = evaluate_record::<LennardJones>(&job, &RECORD);
        assert_eq!(c.status, RecordStatus::Skipped);
        assert_relative_eq!(c.dx.x, 1.5);

        let rcutsq = [2.5 * 2.5];
        job.cutoff = Some(Cutoff {
            rcutsq: &rcutsq,
            shift: true,
        });
        let c = evaluate_record::<LennardJones>(&job, &RECORD);
        assert_eq!(c.status, RecordStatus::Evaluated);
        let unshifted = LennardJones::evaluate(2.25, &params[0], &PairAux::default()).unwrap();
        let at_cut = LennardJones::evaluate(6.25, &params[0], &PairAux::default()).unwrap();
        assert_relative_eq!(c.energy, unshifted.energy - at_cut.energy);
        assert_relative_eq!(c.force_divr, unshifted.force_divr);
    }

    #[test]
    fn test_gathers_attributes_only_when_given() {
        let positions = two_particles(2.0);
        let global_box = BoxDim::cube(10.0).unwrap();
        let params = [ScreenedCoulombParams::new(1.0, 0.0)];
        let charges = [2.0, 3.0];
        let mut job = RecordJob {
            positions: &positions,
            global_box: &global_box,
            records: &[RECORD],
            params: &params,
            cutoff: None,
            charges: Some(&charges),
            diameters: None,
        };
        let c = evaluate_record::<ScreenedCoulomb>(&job, &RECORD);
        assert_relative_eq!(c.energy, 3.0);
        job.charges = None;
        let c = evaluate_record::<ScreenedCoulomb>(&job, &RECORD);
        assert_relative_eq!(c.energy, 0.0);
    }

    #[test]
    fn test_out_of_bounds_status() {
        let positions = two_particles(3.0);
        let global_box = BoxDim::cube(10.0).unwrap();
        let params = [FeneParams::new(30.0, 1.5, 1.0, 1.0)];
        let diameters = [1.0, 1.0];
        let job = RecordJob {
            positions: &positions,
            global_box: &global_box,
            records: &[RECORD],
            params: &params,
            cutoff: None,
            charges: None,
            diameters: Some(&diameters),
        };
        let c = evaluate_record::<Fene>(&job, &RECORD);
        assert_eq!(c.status, RecordStatus::OutOfBounds);
    }

    #[test]
    fn test_rejected_shift_is_reported() {
        let positions = two_particles(1.0);
        let global_box = BoxDim::cube(10.0).unwrap();
        let params = [FeneParams::new(30.0, 1.5, 1.0, 1.0)];
        let diameters = [1.0, 1.0];
        let rcutsq = [2.0 * 2.0];
        let mut job = RecordJob {
            positions: &positions,
            global_box: &global_box,
            records: &[RECORD],
            params: &params,
            cutoff: Some(Cutoff {
                rcutsq: &rcutsq,
                shift: false,
            }),
            charges: None,
            diameters: Some(&diameters),
        };
        let c = evaluate_record::<Fene>(&job, &RECORD);
        assert_eq!(c.status, RecordStatus::Evaluated);

        job.cutoff = Some(Cutoff {
            rcutsq: &rcutsq,
            shift: true,
        });
        let c = evaluate_record::<Fene>(&job, &RECORD);
        assert_eq!(c.status, RecordStatus::ShiftRejected);
        assert_eq!(c.energy, 0.0);
    }
}
