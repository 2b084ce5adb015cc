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

use super::{resolve_records, scatter};
use crate::{
    backend::{Backend, BackendKind, Cutoff, RecordBackend, RecordJob},
    comm::CommFlags,
    compute::{ComputeScheduler, ForceCompute, StepContext},
    evaluator::Evaluator,
    output::ForceOutput,
    params::{ParamTable, TypeIndexing, TypeNames},
    ForceError, Result,
};
use serde::{Deserialize, Serialize};

/// Energy treatment at the cutoff
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftMode {
    /// Energy jumps to zero at the cutoff
    #[default]
    NoShift,
    /// Energy is shifted so that it is zero at the cutoff
    Shift,
}

/// Short ranged pair interactions with force law `E`.
///
/// Records come from a neighbor list and carry the symmetric type-pair index
/// of the two particle types. Pairs at or beyond the cutoff of their type
/// pair are skipped before the force law is invoked.
pub struct PotentialPair<E: Evaluator> {
    scheduler: ComputeScheduler,
    params: ParamTable<E::Param>,
    r_cut: ParamTable<f64>,
    shift_mode: ShiftMode,
    type_names: TypeNames,
    output: ForceOutput,
    backend: Box<dyn RecordBackend<E>>,
}

impl<E: Evaluator> PotentialPair<E> {
    /// New pair potential with the same cutoff `r_cut` for all type pairs
    pub fn new(n_types: usize, r_cut: f64, backend: &Backend) -> Result<Self> {
        let name = format!("pair.{}", E::name());
        debug!("constructing {name} for {n_types} particle type(s) on {}", backend.kind());
        let mut pair = Self {
            scheduler: ComputeScheduler::new(),
            params: ParamTable::new(n_types, TypeIndexing::PerTypePair, "particle", &name),
            r_cut: ParamTable::new(n_types, TypeIndexing::PerTypePair, "particle", &name),
            shift_mode: ShiftMode::default(),
            type_names: TypeNames::default(),
            output: ForceOutput::default(),
            backend: backend.record_backend::<E>()?,
        };
        for a in 0..n_types {
            for b in a..n_types {
                pair.set_r_cut(a, b, r_cut)?;
            }
        }
        Ok(pair)
    }

    pub fn with_type_names(type_names: TypeNames, r_cut: f64, backend: &Backend) -> Result<Self> {
        let mut pair = Self::new(type_names.len(), r_cut, backend)?;
        pair.type_names = type_names;
        Ok(pair)
    }

    pub fn set_pair_params(&mut self, a: usize, b: usize, params: E::Param) -> Result<()> {
        self.params.set_pair(a, b, params)
    }

    pub fn pair_params(&self, a: usize, b: usize) -> Result<E::Param> {
        self.params.get_pair(a, b).copied()
    }

    /// Set parameters for a type pair given as `"A-B"`
    pub fn set_params_by_name(&mut self, pair: &str, params: E::Param) -> Result<()> {
        let (a, b) = self.type_names.pair_by_name(pair, "particle")?;
        self.set_pair_params(a, b, params)
    }

    pub fn params_by_name(&self, pair: &str) -> Result<E::Param> {
        let (a, b) = self.type_names.pair_by_name(pair, "particle")?;
        self.pair_params(a, b)
    }

    pub fn set_r_cut(&mut self, a: usize, b: usize, r_cut: f64) -> Result<()> {
        if !(r_cut.is_finite() && r_cut >= 0.0) {
            return Err(ForceError::config(format!(
                "{}: invalid cutoff {r_cut}",
                self.name()
            )));
        }
        self.r_cut.set_pair(a, b, r_cut)
    }

    pub fn r_cut(&self, a: usize, b: usize) -> Result<f64> {
        self.r_cut.get_pair(a, b).copied()
    }

    /// Largest cutoff over all type pairs, e.g. for sizing a neighbor list
    pub fn max_r_cut(&self) -> f64 {
        self.r_cut.as_slice().iter().copied().fold(0.0, f64::max)
    }

    pub fn set_shift_mode(&mut self, mode: ShiftMode) {
        self.shift_mode = mode;
    }

    pub fn shift_mode(&self) -> ShiftMode {
        self.shift_mode
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }
}

impl<E: Evaluator> ForceCompute for PotentialPair<E> {
    fn name(&self) -> String {
        format!("pair.{}", E::name())
    }

    fn scheduler(&self) -> &ComputeScheduler {
        &self.scheduler
    }

    fn scheduler_mut(&mut self) -> &mut ComputeScheduler {
        &mut self.scheduler
    }

    fn output(&self) -> &ForceOutput {
        &self.output
    }

    fn requested_comm_flags(&self, _timestep: u64) -> CommFlags {
        CommFlags::POSITION | CommFlags::for_evaluator::<E>()
    }

    fn compute_forces(&mut self, ctx: &StepContext) -> Result<()> {
        let particles = ctx.particles;
        let name = self.name();
        self.output.reset(particles.n_local(), particles.n_ghosts());

        let records = resolve_records(particles, ctx.interactions.records(), &self.params, &name)?;
        let rcutsq: Vec<f64> = self.r_cut.as_slice().iter().map(|r| r * r).collect();
        let job = RecordJob {
            positions: particles.positions(),
            global_box: particles.global_box(),
            records: &records,
            params: self.params.as_slice(),
            cutoff: Some(Cutoff {
                rcutsq: &rcutsq,
                shift: self.shift_mode == ShiftMode::Shift,
            }),
            charges: E::needs_charge().then(|| particles.charges()),
            diameters: E::needs_diameter().then(|| particles.diameters()),
        };
        let contributions = self.backend.evaluate(&job)?;
        scatter(
            &contributions,
            &records,
            ctx.flags.compute_virial(),
            &mut self.output,
            &name,
        )?;
        trace!(
            "{name}: {} pairs, energy {:.6} at step {}",
            records.len(),
            self.output.total_energy(),
            ctx.timestep
        );
        Ok(())
    }
}

impl<E: Evaluator> Drop for PotentialPair<E> {
    fn drop(&mut self) {
        debug!("destroying {}", self.name());
    }
}
