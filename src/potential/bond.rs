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
    backend::{Backend, BackendKind, RecordBackend, RecordJob},
    comm::CommFlags,
    compute::{ComputeScheduler, ForceCompute, StepContext},
    evaluator::Evaluator,
    output::ForceOutput,
    params::{ParamTable, TypeIndexing, TypeNames},
    Result,
};

/// Bonded interactions with force law `E`, one parameter block per bond type.
///
/// Bond records come from the externally owned topology passed in
/// [`StepContext::interactions`]; each record's `type_id` is its bond type.
pub struct PotentialBond<E: Evaluator> {
    scheduler: ComputeScheduler,
    params: ParamTable<E::Param>,
    type_names: TypeNames,
    output: ForceOutput,
    backend: Box<dyn RecordBackend<E>>,
}

impl<E: Evaluator> PotentialBond<E> {
    pub fn new(n_bond_types: usize, backend: &Backend) -> Result<Self> {
        let name = format!("bond.{}", E::name());
        debug!("constructing {name} with {n_bond_types} bond type(s) on {}", backend.kind());
        Ok(Self {
            scheduler: ComputeScheduler::new(),
            params: ParamTable::new(n_bond_types, TypeIndexing::PerType, "bond", name),
            type_names: TypeNames::default(),
            output: ForceOutput::default(),
            backend: backend.record_backend::<E>()?,
        })
    }

    /// Construct with named bond types, enabling [`Self::set_params_by_name`]
    pub fn with_type_names(type_names: TypeNames, backend: &Backend) -> Result<Self> {
        let mut bond = Self::new(type_names.len(), backend)?;
        bond.type_names = type_names;
        Ok(bond)
    }

    pub fn set_params(&mut self, bond_type: usize, params: E::Param) -> Result<()> {
        self.params.set(bond_type, params)
    }

    pub fn params(&self, bond_type: usize) -> Result<E::Param> {
        self.params.get(bond_type).copied()
    }

    pub fn set_params_by_name(&mut self, bond_type: &str, params: E::Param) -> Result<()> {
        let bond_type = self.type_names.type_by_name(bond_type, "bond")?;
        self.set_params(bond_type, params)
    }

    pub fn params_by_name(&self, bond_type: &str) -> Result<E::Param> {
        self.params(self.type_names.type_by_name(bond_type, "bond")?)
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }
}

impl<E: Evaluator> ForceCompute for PotentialBond<E> {
    fn name(&self) -> String {
        format!("bond.{}", E::name())
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
        let job = RecordJob {
            positions: particles.positions(),
            global_box: particles.global_box(),
            records: &records,
            params: self.params.as_slice(),
            cutoff: None,
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
            "{name}: {} bonds, energy {:.6} at step {}",
            records.len(),
            self.output.total_energy(),
            ctx.timestep
        );
        Ok(())
    }
}

impl<E: Evaluator> Drop for PotentialBond<E> {
    fn drop(&mut self) {
        debug!("destroying {}", self.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        comm::StepFlags,
        evaluator::{Fene, FeneParams, Harmonic, HarmonicParams},
        interaction::{BondTable, InteractionList},
        particles::{Particle, ParticleData},
        BoxDim, ForceError, GpuContext, Vector3,
    };
    use approx::assert_relative_eq;

    fn harmonic(k: f64, r0: f64) -> PotentialBond<Harmonic> {
        let mut bond = PotentialBond::<Harmonic>::new(1, &Backend::Cpu).unwrap();
        bond.set_params(0, HarmonicParams::new(k, r0)).unwrap();
        bond
    }

    fn pair_system(a: Vector3, b: Vector3) -> (ParticleData, BondTable) {
        let mut pdata = ParticleData::new(BoxDim::cube(10.0).unwrap(), 1);
        pdata.add_particle(Particle::new(a, 0)).unwrap();
        pdata.add_particle(Particle::new(b, 0)).unwrap();
        let mut bonds = BondTable::new(1);
        bonds.add_bond(0, 1, 0).unwrap();
        (pdata, bonds)
    }

    #[test]
    fn test_two_particle_harmonic() {
        let (pdata, bonds) = pair_system(Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0));
        let mut bond = harmonic(1.0, 0.0);
        let ctx = StepContext::new(0, &pdata, &bonds, StepFlags::PRESSURE_TENSOR);
        assert!(bond.compute(&ctx).unwrap());

        let out = bond.output();
        assert_relative_eq!(out.forces()[0].x, 1.0);
        assert_relative_eq!(out.forces()[1].x, -1.0);
        assert_relative_eq!(out.energies()[0], 0.25);
        assert_relative_eq!(out.energies()[1], 0.25);
        assert_relative_eq!(out.total_energy(), 0.5);
        assert_relative_eq!(out.net_force().norm(), 0.0);
        // ½ f/r dx dx = ½ (-1) 1 1 on each
        assert_relative_eq!(out.virial(0)[0], -0.5);
        assert_relative_eq!(out.virial(1)[0], -0.5);
        assert_relative_eq!(out.total_virial()[3], 0.0);
    }

    #[test]
    fn test_minimum_image_across_faces() {
        let (pdata, bonds) =
            pair_system(Vector3::new(-4.5, 0.0, 0.0), Vector3::new(4.5, 0.0, 0.0));
        let mut bond = harmonic(1.0, 0.0);
        bond.compute(&StepContext::new(0, &pdata, &bonds, StepFlags::empty()))
            .unwrap();
        // particles are 1 apart through the x face, pulled towards each other
        assert_relative_eq!(bond.output().forces()[0].x, -1.0, epsilon = 1e-12);
        assert_relative_eq!(bond.output().forces()[1].x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(bond.output().total_energy(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_newton_third_law_and_energy_split() {
        let mut pdata = ParticleData::new(BoxDim::cube(20.0).unwrap(), 1);
        let positions = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.1, 0.3, -0.2),
            Vector3::new(1.9, 1.2, 0.4),
            Vector3::new(2.2, 2.1, 1.5),
        ];
        for p in positions {
            pdata.add_particle(Particle::new(p, 0)).unwrap();
        }
        let mut bonds = BondTable::new(2);
        bonds.add_bond(0, 1, 0).unwrap();
        bonds.add_bond(1, 2, 1).unwrap();
        bonds.add_bond(3, 2, 1).unwrap();

        let mut bond = PotentialBond::<Harmonic>::new(2, &Backend::Cpu).unwrap();
        bond.set_params(0, HarmonicParams::new(10.0, 1.0)).unwrap();
        bond.set_params(1, HarmonicParams::new(5.0, 0.8)).unwrap();
        bond.compute(&StepContext::new(0, &pdata, &bonds, StepFlags::empty()))
            .unwrap();

        let out = bond.output();
        assert_relative_eq!(out.net_force().norm(), 0.0, epsilon = 1e-12);
        let expected: f64 = bonds
            .records()
            .iter()
            .map(|b| {
                let r = (positions[b.tags[1] as usize] - positions[b.tags[0] as usize]).norm();
                let p = bond.params(b.type_id as usize).unwrap();
                0.5 * p.k * (r - p.r0).powi(2)
            })
            .sum();
        assert_relative_eq!(out.total_energy(), expected, epsilon = 1e-12);
        // no virial requested
        assert_eq!(out.total_virial(), [0.0; 6]);
    }

    #[test]
    fn test_ghost_participant_receives_nothing() {
        let mut pdata = ParticleData::new(BoxDim::cube(10.0).unwrap(), 1);
        pdata
            .add_particle(Particle::new(Vector3::zeros(), 0))
            .unwrap();
        pdata
            .push_ghost(9, Particle::new(Vector3::new(0.0, 2.0, 0.0), 0))
            .unwrap();
        let mut bonds = BondTable::new(1);
        bonds.add_bond(9, 0, 0).unwrap();
        let mut bond = harmonic(1.0, 0.0);
        bond.compute(&StepContext::new(0, &pdata, &bonds, StepFlags::PRESSURE_TENSOR))
            .unwrap();

        let out = bond.output();
        assert_eq!(out.len(), 2);
        assert_relative_eq!(out.forces()[0].y, 2.0);
        assert_relative_eq!(out.energies()[0], 1.0);
        assert_relative_eq!(out.forces()[1].norm(), 0.0);
        assert_relative_eq!(out.energies()[1], 0.0);
        assert_eq!(out.virial(1), [0.0; 6]);
        assert_relative_eq!(out.total_energy(), 1.0);
    }

    #[test]
    fn test_incomplete_bond() {
        let (pdata, mut bonds) = pair_system(Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0));
        bonds.add_bond(1, 4, 0).unwrap();
        let mut bond = harmonic(1.0, 0.0);
        let err = bond
            .compute(&StepContext::new(0, &pdata, &bonds, StepFlags::empty()))
            .unwrap_err();
        assert_eq!(
            err,
            ForceError::IncompleteInteraction {
                name: "bond.harmonic".into(),
                tags: [1, 4]
            }
        );
    }

    #[test]
    fn test_failed_step_is_retried() {
        let (pdata, mut bonds) = pair_system(Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0));
        bonds.add_bond(1, 7, 0).unwrap();
        let mut bond = harmonic(1.0, 0.0);
        let ctx = StepContext::new(5, &pdata, &bonds, StepFlags::empty());
        assert!(bond.compute(&ctx).is_err());
        assert_eq!(bond.scheduler().last_computed(), None);
        // same step again must fail again, not report a zeroed result as done
        assert!(bond.compute(&ctx).is_err());

        assert!(bonds.remove_bond(1, 7));
        let ctx = StepContext::new(5, &pdata, &bonds, StepFlags::empty());
        assert!(bond.compute(&ctx).unwrap());
        assert_relative_eq!(bond.output().total_energy(), 0.5);
        assert_eq!(bond.scheduler().last_computed(), Some(5));

        // a failure after a good step keeps the good step on record
        bonds.add_bond(1, 7, 0).unwrap();
        let ctx = StepContext::new(6, &pdata, &bonds, StepFlags::empty());
        assert!(bond.compute(&ctx).is_err());
        assert_eq!(bond.scheduler().last_computed(), Some(5));
        assert!(bond.scheduler().peek_compute(6));
    }

    #[test]
    fn test_benchmark_reports_mean_time() {
        let (pdata, bonds) = pair_system(Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0));
        let mut bond = harmonic(1.0, 0.0);
        let ctx = StepContext::new(2, &pdata, &bonds, StepFlags::empty());
        let mean = bond.benchmark(&ctx, 4).unwrap();
        assert!(mean.as_secs_f64().is_finite());
        assert_relative_eq!(bond.output().total_energy(), 0.5);
        // zero iterations still warm up and do not divide by zero
        assert!(bond.benchmark(&ctx, 0).is_ok());
        assert!(!bond.compute(&ctx).unwrap());
    }

    #[test]
    fn test_overstretched_fene_is_fatal() {
        let (mut pdata, bonds) = pair_system(Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0));
        let mut bond = PotentialBond::<Fene>::new(1, &Backend::Cpu).unwrap();
        bond.set_params(0, FeneParams::new(30.0, 1.5, 1.0, 1.0)).unwrap();
        bond.compute(&StepContext::new(0, &pdata, &bonds, StepFlags::empty()))
            .unwrap();
        assert!(bond.output().total_energy() > 0.0);

        pdata.set_position(1, Vector3::new(1.6, 0.0, 0.0)).unwrap();
        let err = bond
            .compute(&StepContext::new(1, &pdata, &bonds, StepFlags::empty()))
            .unwrap_err();
        assert!(matches!(err, ForceError::OutOfBounds { tags: [0, 1], .. }));
        assert_eq!(
            bond.requested_comm_flags(1),
            CommFlags::POSITION | CommFlags::TAG | CommFlags::DIAMETER
        );
    }

    #[test]
    fn test_scheduler_gates_recomputation() {
        let (mut pdata, bonds) = pair_system(Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0));
        let mut bond = harmonic(1.0, 0.0);
        assert!(bond
            .compute(&StepContext::new(3, &pdata, &bonds, StepFlags::empty()))
            .unwrap());

        pdata.set_position(1, Vector3::new(2.0, 0.0, 0.0)).unwrap();
        let ctx = StepContext::new(3, &pdata, &bonds, StepFlags::empty());
        assert!(!bond.compute(&ctx).unwrap());
        assert_relative_eq!(bond.output().total_energy(), 0.5);

        // forced recomputation within the same step sees the new position
        bond.force_compute(&ctx).unwrap();
        assert_relative_eq!(bond.output().total_energy(), 2.0);

        // re-entrant: a second step starts from zero
        let ctx = StepContext::new(4, &pdata, &bonds, StepFlags::empty());
        assert!(bond.compute(&ctx).unwrap());
        assert_relative_eq!(bond.output().total_energy(), 2.0);
    }

    #[test]
    fn test_parameter_access() {
        let names = TypeNames::new(["backbone", "side"]);
        let mut bond = PotentialBond::<Harmonic>::with_type_names(names, &Backend::Cpu).unwrap();
        bond.set_params_by_name("side", HarmonicParams::new(2.0, 1.0))
            .unwrap();
        assert_eq!(bond.params(1).unwrap(), HarmonicParams::new(2.0, 1.0));
        assert_eq!(
            bond.params_by_name("backbone").unwrap(),
            HarmonicParams::default()
        );
        assert!(bond.set_params(2, HarmonicParams::new(1.0, 1.0)).is_err());
        assert!(bond.set_params_by_name("loop", HarmonicParams::default()).is_err());
        assert_eq!(bond.params(1).unwrap(), HarmonicParams::new(2.0, 1.0));
        assert_eq!(bond.backend_kind(), BackendKind::Cpu);
        assert_eq!(
            bond.requested_comm_flags(0),
            CommFlags::POSITION | CommFlags::TAG
        );
    }

    #[test]
    fn test_gpu_matches_cpu() {
        if !GpuContext::is_available() {
            return;
        }
        let backend = Backend::new(BackendKind::Gpu).unwrap();
        // closed ring of beads, slightly compressed and corrugated
        let mut pdata = ParticleData::new(BoxDim::cube(20.0).unwrap(), 1);
        let mut bonds = BondTable::new(1);
        let n = 50;
        for i in 0..n {
            let phi = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
            let p = Vector3::new(7.6 * phi.cos(), 7.6 * phi.sin(), 0.2 * (5.0 * phi).sin());
            pdata.add_particle(Particle::new(p, 0)).unwrap();
            bonds.add_bond(i, (i + 1) % n, 0).unwrap();
        }

        let mut cpu = PotentialBond::<Fene>::new(1, &Backend::Cpu).unwrap();
        let mut gpu = PotentialBond::<Fene>::new(1, &backend).unwrap();
        for bond in [&mut cpu, &mut gpu] {
            bond.set_params(0, FeneParams::new(30.0, 1.5, 1.0, 1.0)).unwrap();
            bond.compute(&StepContext::new(0, &pdata, &bonds, StepFlags::PRESSURE_TENSOR))
                .unwrap();
        }
        let (a, b) = (cpu.output(), gpu.output());
        assert_relative_eq!(a.total_energy(), b.total_energy(), max_relative = 1e-4);
        for (fa, fb) in a.forces().iter().zip(b.forces()) {
            assert_relative_eq!(fa, fb, epsilon = 1e-3, max_relative = 1e-3);
        }
        for (wa, wb) in a.total_virial().iter().zip(b.total_virial()) {
            assert_relative_eq!(*wa, wb, epsilon = 1e-3, max_relative = 1e-3);
        }
    }
}
