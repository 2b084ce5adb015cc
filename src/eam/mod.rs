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

//! Embedded-atom method (EAM).
//!
//! The energy of particle `i` is
//!
//! `E_i = F_{t_i}(ρ_i) + ½ Σ_j φ_{t_i t_j}(r_ij)`, with `ρ_i = Σ_j ρ_{t_j}(r_ij)`,
//!
//! where the density `ρ_t(r)` and embedding `F_t(ρ)` are tabulated per type
//! and the pair term `φ(r)` per type pair. The density of a particle depends
//! on all its neighbors, so ghost densities must be complete for the forces
//! on local particles to be correct. The interaction list must therefore
//! include ghost-ghost pairs, see [`crate::NeighborList::with_ghost_pairs`].

mod gpu;

pub use gpu::{EamGpu, MAX_GPU_TYPES};

use crate::{
    backend::{RecordContribution, RecordStatus, ResolvedRecord},
    comm::CommFlags,
    compute::{ComputeScheduler, ForceCompute, StepContext},
    output::ForceOutput,
    params::TypePairIndex,
    particles::ParticleStore,
    potential::scatter,
    table::{Sampled, TableSet},
    Backend, BackendKind, ForceError, Result, Vector3,
};
use anyhow::Context;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Physically sampled EAM functions and the uniform grids to resample them on
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EamTabulation {
    pub n_types: usize,
    /// Interaction range
    pub r_cut: f64,
    /// Samples and spacing of the density and pair tables
    pub nr: usize,
    pub dr: f64,
    /// Samples and spacing of the embedding tables
    pub nrho: usize,
    pub drho: f64,
    /// `ρ_t(r)` per type
    pub density: Vec<Sampled>,
    /// `F_t(ρ)` per type
    pub embedding: Vec<Sampled>,
    /// `φ(r)` per type pair, ordered as [`TypePairIndex`]
    pub pair: Vec<Sampled>,
}

impl EamTabulation {
    /// Load from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Could not open EAM file {}", path.display()))?;
        let tabulation: Self = serde_yaml::from_reader(file)
            .with_context(|| format!("Could not parse EAM file {}", path.display()))?;
        tabulation.validate()?;
        Ok(tabulation)
    }

    pub fn validate(&self) -> Result<()> {
        let n_pairs = TypePairIndex::new(self.n_types).len();
        let counts = [
            ("density", self.density.len(), self.n_types),
            ("embedding", self.embedding.len(), self.n_types),
            ("pair", self.pair.len(), n_pairs),
        ];
        for (what, found, expected) in counts {
            if found != expected {
                return Err(ForceError::config(format!(
                    "EAM: expected {expected} {what} function(s), found {found}"
                )));
            }
        }
        if self.n_types == 0 {
            return Err(ForceError::config("EAM: no particle types"));
        }
        if !(self.r_cut.is_finite() && self.r_cut > 0.0) {
            return Err(ForceError::config(format!(
                "EAM: invalid cutoff {}",
                self.r_cut
            )));
        }
        if self.r_cut > self.nr as f64 * self.dr {
            return Err(ForceError::config(format!(
                "EAM: cutoff {} exceeds the table range {}",
                self.r_cut,
                self.nr as f64 * self.dr
            )));
        }
        Ok(())
    }
}

/// Resampled EAM tables
#[derive(Clone, Debug)]
pub struct EamTables {
    density: TableSet,
    embedding: TableSet,
    pair: TableSet,
    pair_index: TypePairIndex,
    r_cut: f64,
}

impl EamTables {
    pub fn build(tabulation: &EamTabulation) -> Result<Self> {
        tabulation.validate()?;
        let density = TableSet::build(&tabulation.density, tabulation.nr, tabulation.dr)?;
        let embedding = TableSet::build(&tabulation.embedding, tabulation.nrho, tabulation.drho)?;
        let pair = TableSet::build(&tabulation.pair, tabulation.nr, tabulation.dr)?;
        info!(
            "EAM tables for {} type(s): r < {}, rho < {}",
            tabulation.n_types,
            density.x_max(),
            embedding.x_max()
        );
        Ok(Self {
            density,
            embedding,
            pair,
            pair_index: TypePairIndex::new(tabulation.n_types),
            r_cut: tabulation.r_cut,
        })
    }

    pub fn n_types(&self) -> usize {
        self.pair_index.n_types()
    }

    pub fn r_cut(&self) -> f64 {
        self.r_cut
    }

    pub fn rdr(&self) -> f64 {
        self.density.rdx()
    }

    pub fn rdrho(&self) -> f64 {
        self.embedding.rdx()
    }

    pub fn density(&self) -> &TableSet {
        &self.density
    }

    pub fn embedding(&self) -> &TableSet {
        &self.embedding
    }

    pub fn pair(&self) -> &TableSet {
        &self.pair
    }

    pub(crate) fn pair_slot(&self, a: usize, b: usize) -> usize {
        self.pair_index.index(a, b)
    }

    fn check_type(&self, type_id: usize) -> Result<usize> {
        if type_id >= self.n_types() {
            return Err(ForceError::InvalidType {
                kind: "particle",
                type_id,
                action: "looking up tables".into(),
                name: "pair.eam".into(),
            });
        }
        Ok(type_id)
    }

    /// `ρ_t(r)` and `ρ'_t(r)` for a neighbor of type `type_id`
    #[inline]
    pub fn lookup_density(&self, type_id: usize, r: f64) -> Result<(f64, f64)> {
        self.density.lookup(self.check_type(type_id)?, r)
    }

    /// `F_t(ρ)` and `F'_t(ρ)`
    #[inline]
    pub fn lookup_embedding(&self, type_id: usize, rho: f64) -> Result<(f64, f64)> {
        self.embedding.lookup(self.check_type(type_id)?, rho)
    }

    /// `φ(r)` and `φ'(r)` for the type pair `(a, b)`
    #[inline]
    pub fn lookup_pair(&self, a: usize, b: usize, r: f64) -> Result<(f64, f64)> {
        let slot = self.pair_slot(self.check_type(a)?, self.check_type(b)?);
        self.pair.lookup(slot, r)
    }
}

/// Pair within the cutoff, found on the host for both backends
#[derive(Clone, Copy, Debug)]
pub(crate) struct EamPair {
    pub record: ResolvedRecord,
    pub dx: Vector3,
    pub r: f64,
}

/// Resolve tags, apply the minimum image and the cutoff
pub(crate) fn find_pairs(
    particles: &dyn ParticleStore,
    ctx: &StepContext,
    tables: &EamTables,
    name: &str,
) -> Result<Vec<EamPair>> {
    let pos = particles.positions();
    let types = particles.types();
    let global_box = particles.global_box();
    let rcutsq = tables.r_cut().powi(2);
    let pairs: Result<Vec<Option<EamPair>>> = ctx
        .interactions
        .records()
        .par_iter()
        .map(|record| {
            let [tag_a, tag_b] = record.tags;
            let (Some(a), Some(b)) = (particles.index_of(tag_a), particles.index_of(tag_b))
            else {
                error!("{name}: interaction {tag_a} {tag_b} incomplete");
                return Err(ForceError::IncompleteInteraction {
                    name: name.to_string(),
                    tags: record.tags,
                });
            };
            let dx = global_box.min_image(pos[b] - pos[a]);
            let rsq = dx.norm_squared();
            if rsq >= rcutsq {
                return Ok(None);
            }
            if rsq == 0.0 {
                error!("{name}: interaction {tag_a} {tag_b} out of bounds");
                return Err(ForceError::OutOfBounds {
                    name: name.to_string(),
                    tags: record.tags,
                });
            }
            let slot = tables.pair_slot(types[a] as usize, types[b] as usize);
            Ok(Some(EamPair {
                record: ResolvedRecord {
                    idx: [a as u32, b as u32],
                    tags: record.tags,
                    type_id: slot as u32,
                },
                dx,
                r: rsq.sqrt(),
            }))
        })
        .collect();
    Ok(pairs?.into_iter().flatten().collect())
}

enum EamEngine {
    Cpu,
    Gpu(Box<EamGpu>),
}

/// Many-body EAM forces from tabulated functions
pub struct EamForceCompute {
    scheduler: ComputeScheduler,
    tabulation: EamTabulation,
    tables: EamTables,
    output: ForceOutput,
    /// `F'(ρ_i)` for every local and ghost particle
    embedding_derivs: Vec<f64>,
    engine: EamEngine,
}

impl EamForceCompute {
    /// New compute. On the GPU, device scratch space is allocated for at most
    /// `max_particles` local plus ghost particles.
    pub fn new(tabulation: EamTabulation, backend: &Backend, max_particles: usize) -> Result<Self> {
        debug!("constructing eam for {} type(s) on {}", tabulation.n_types, backend.kind());
        let tables = EamTables::build(&tabulation)?;
        let engine = match backend {
            Backend::Cpu => EamEngine::Cpu,
            Backend::Gpu(context) => {
                EamEngine::Gpu(Box::new(EamGpu::new(context.clone(), &tables, max_particles)?))
            }
        };
        Ok(Self {
            scheduler: ComputeScheduler::new(),
            tabulation,
            tables,
            output: ForceOutput::default(),
            embedding_derivs: Vec::new(),
            engine,
        })
    }

    pub fn tabulation(&self) -> &EamTabulation {
        &self.tabulation
    }

    pub fn tables(&self) -> &EamTables {
        &self.tables
    }

    /// Replace the tabulated functions; tables are rebuilt and re-uploaded
    pub fn set_tabulation(&mut self, tabulation: EamTabulation) -> Result<()> {
        let tables = EamTables::build(&tabulation)?;
        if let EamEngine::Gpu(gpu) = &mut self.engine {
            gpu.upload_tables(&tables)?;
        }
        self.tables = tables;
        self.tabulation = tabulation;
        Ok(())
    }

    pub fn backend_kind(&self) -> BackendKind {
        match self.engine {
            EamEngine::Cpu => BackendKind::Cpu,
            EamEngine::Gpu(_) => BackendKind::Gpu,
        }
    }

    /// Two passes over the pairs: densities and embedding, then forces
    fn compute_cpu(
        &mut self,
        particles: &dyn ParticleStore,
        pairs: &[EamPair],
        compute_virial: bool,
        name: &str,
    ) -> Result<()> {
        let types = particles.types();
        let tables = &self.tables;
        let n_local = particles.n_local();

        let densities: Vec<[f64; 2]> = pairs
            .par_iter()
            .map(|p| -> Result<[f64; 2]> {
                let [a, b] = p.record.idx.map(|i| types[i as usize] as usize);
                Ok([
                    tables.lookup_density(b, p.r)?.0,
                    tables.lookup_density(a, p.r)?.0,
                ])
            })
            .collect::<Result<_>>()?;
        let mut rho = vec![0.0; particles.n_total()];
        for (p, [rho_a, rho_b]) in pairs.iter().zip(&densities) {
            let [a, b] = p.record.idx.map(|i| i as usize);
            rho[a] += rho_a;
            rho[b] += rho_b;
        }

        self.embedding_derivs.clear();
        for (i, &rho_i) in rho.iter().enumerate() {
            let (embedding, derivative) = tables.lookup_embedding(types[i] as usize, rho_i)?;
            self.embedding_derivs.push(derivative);
            if i < n_local {
                self.output.add_energy(i, embedding);
            }
        }

        let fprime = &self.embedding_derivs;
        let contributions: Vec<RecordContribution> = pairs
            .par_iter()
            .map(|p| -> Result<RecordContribution> {
                let [a, b] = p.record.idx.map(|i| i as usize);
                let (type_a, type_b) = (types[a] as usize, types[b] as usize);
                let (phi, dphi) = tables.pair.lookup(p.record.type_id as usize, p.r)?;
                let (_, drho_b) = tables.lookup_density(type_b, p.r)?;
                let (_, drho_a) = tables.lookup_density(type_a, p.r)?;
                let de_dr = dphi + fprime[a] * drho_b + fprime[b] * drho_a;
                Ok(RecordContribution {
                    dx: p.dx,
                    force_divr: -de_dr / p.r,
                    energy: phi,
                    status: RecordStatus::Evaluated,
                })
            })
            .collect::<Result<_>>()?;
        let records: Vec<ResolvedRecord> = pairs.iter().map(|p| p.record).collect();
        scatter(&contributions, &records, compute_virial, &mut self.output, name)
    }
}

impl ForceCompute for EamForceCompute {
    fn name(&self) -> String {
        "pair.eam".to_string()
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
        CommFlags::POSITION | CommFlags::TAG
    }

    fn compute_forces(&mut self, ctx: &StepContext) -> Result<()> {
        let particles = ctx.particles;
        let name = self.name();
        self.output.reset(particles.n_local(), particles.n_ghosts());
        if let Some(t) = particles.types().iter().find(|&&t| t as usize >= self.tables.n_types()) {
            return Err(ForceError::InvalidType {
                kind: "particle",
                type_id: *t as usize,
                action: "evaluating interactions".to_string(),
                name: name.clone(),
            });
        }
        let pairs = find_pairs(particles, ctx, &self.tables, &name)?;
        let compute_virial = ctx.flags.compute_virial();
        let device_result = match &mut self.engine {
            EamEngine::Cpu => None,
            EamEngine::Gpu(gpu) => Some(gpu.compute(
                particles,
                &pairs,
                &self.tables,
                compute_virial,
                &mut self.output,
            )),
        };
        match device_result {
            None => self.compute_cpu(particles, &pairs, compute_virial, &name)?,
            Some(Err(err @ ForceError::TableOutOfRange { .. })) => {
                // the device only flags the failure; replay on the host to locate it
                self.output.reset(particles.n_local(), particles.n_ghosts());
                self.compute_cpu(particles, &pairs, compute_virial, &name)?;
                return Err(err);
            }
            Some(result) => result?,
        }
        trace!(
            "{name}: {} pairs, energy {:.6} at step {}",
            pairs.len(),
            self.output.total_energy(),
            ctx.timestep
        );
        Ok(())
    }
}

impl Drop for EamForceCompute {
    fn drop(&mut self) {
        debug!("destroying pair.eam");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        comm::StepFlags,
        interaction::NeighborList,
        particles::{Particle, ParticleData},
        BoxDim, GpuContext,
    };
    use approx::assert_relative_eq;

    const R_CUT: f64 = 2.0;

    /// Smooth two-type model vanishing at the cutoff
    pub(crate) fn model(drho: f64) -> EamTabulation {
        let (nr, dr) = (12_500, 0.0002);
        let (nrho, n_rho_input) = (4000, 4000);
        let grid = |n: usize, dx: f64| (0..n).map(move |k| k as f64 * dx);
        let cut = |r: f64| (R_CUT - r).max(0.0);
        let density = |scale: f64| Sampled::from_fn(grid(nr, dr), move |r| scale * cut(r).powi(2));
        let embedding = |a: f64| {
            Sampled::from_fn(grid(n_rho_input, drho), move |rho| a * rho * rho - rho)
        };
        let pair = |eps: f64| Sampled::from_fn(grid(nr, dr), move |r| eps * cut(r).powi(3) / r.max(0.5));
        EamTabulation {
            n_types: 2,
            r_cut: R_CUT,
            nr,
            dr,
            nrho,
            drho,
            density: vec![density(1.0), density(0.7)],
            embedding: vec![embedding(0.05), embedding(0.08)],
            pair: vec![pair(1.0), pair(0.8), pair(1.2)],
        }
    }

    fn cluster() -> ParticleData {
        let mut pdata = ParticleData::new(BoxDim::cube(12.0).unwrap(), 2);
        for (pos, t) in [
            (Vector3::new(0.0, 0.0, 0.0), 0),
            (Vector3::new(1.1, 0.2, 0.0), 1),
            (Vector3::new(0.3, 1.2, 0.1), 0),
            (Vector3::new(0.9, 0.8, 1.0), 1),
            (Vector3::new(-0.9, 0.4, -0.6), 0),
        ] {
            pdata.add_particle(Particle::new(pos, t)).unwrap();
        }
        pdata
    }

    fn evaluate(eam: &mut EamForceCompute, pdata: &ParticleData) -> Result<()> {
        let mut nlist = NeighborList::new(R_CUT, 0.3).with_ghost_pairs();
        nlist.build(pdata);
        let ctx = StepContext::new(0, pdata, &nlist, StepFlags::PRESSURE_TENSOR);
        eam.force_compute(&ctx)
    }

    #[test]
    fn test_validation() {
        let mut tabulation = model(0.005);
        assert!(EamTables::build(&tabulation).is_ok());
        tabulation.pair.pop();
        assert!(matches!(
            EamTables::build(&tabulation),
            Err(ForceError::Configuration(_))
        ));
        let mut tabulation = model(0.005);
        tabulation.r_cut = 3.0;
        assert!(tabulation.validate().is_err());
    }

    #[test]
    fn test_yaml() {
        let yaml = serde_yaml::to_string(&model(0.005)).unwrap();
        let tabulation: EamTabulation = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(tabulation, model(0.005));
    }

    #[test]
    fn test_forces_are_negative_energy_gradient() {
        let mut eam = EamForceCompute::new(model(0.005), &Backend::Cpu, 16).unwrap();
        let mut pdata = cluster();
        evaluate(&mut eam, &pdata).unwrap();
        let forces = eam.output().forces().to_vec();
        assert_relative_eq!(eam.output().net_force().norm(), 0.0, epsilon = 1e-10);

        let h = 1e-5;
        for tag in 0..5 {
            for dim in 0..3 {
                let pos = pdata.positions()[tag];
                let mut energy_at = |delta: f64| {
                    let mut displaced = pos;
                    displaced[dim] += delta;
                    pdata.set_position(tag as u32, displaced).unwrap();
                    evaluate(&mut eam, &pdata).unwrap();
                    eam.output().total_energy()
                };
                let gradient = (energy_at(h) - energy_at(-h)) / (2.0 * h);
                pdata.set_position(tag as u32, pos).unwrap();
                assert_relative_eq!(
                    forces[tag][dim],
                    -gradient,
                    epsilon = 2e-3,
                    max_relative = 1e-2
                );
            }
        }
    }

    #[test]
    fn test_energy_by_hand() {
        // two particles: E = F(ρ) twice plus φ once
        let tabulation = model(0.005);
        let mut pdata = ParticleData::new(BoxDim::cube(10.0).unwrap(), 2);
        pdata.add_particle(Particle::new(Vector3::zeros(), 0)).unwrap();
        pdata
            .add_particle(Particle::new(Vector3::new(1.5, 0.0, 0.0), 0))
            .unwrap();
        let mut eam = EamForceCompute::new(tabulation, &Backend::Cpu, 2).unwrap();
        evaluate(&mut eam, &pdata).unwrap();

        let rho = 0.5f64.powi(2);
        let embedding = 0.05 * rho * rho - rho;
        let phi = 0.5f64.powi(3) / 1.5;
        let energies = eam.output().energies();
        assert_relative_eq!(energies[0], embedding + 0.5 * phi, epsilon = 1e-6);
        assert_relative_eq!(energies[1], energies[0], epsilon = 1e-12);
        assert_relative_eq!(eam.output().forces()[0].x, -eam.output().forces()[1].x);
        // attractive embedding outweighs the repulsive pair term here
        assert!(eam.output().forces()[0].x > 0.0);
        let virial_xx = eam.output().virial(0)[0] + eam.output().virial(1)[0];
        assert_relative_eq!(virial_xx, eam.output().forces()[1].x * 1.5, epsilon = 1e-9);
    }

    #[test]
    fn test_ghosts_complete_densities_but_receive_nothing() {
        let all_local = cluster();
        let mut eam = EamForceCompute::new(model(0.005), &Backend::Cpu, 16).unwrap();
        evaluate(&mut eam, &all_local).unwrap();
        let reference_force = eam.output().forces()[0];
        let reference_energy = eam.output().energies()[0];

        // same geometry, but only the first particle is local
        let mut pdata = ParticleData::new(BoxDim::cube(12.0).unwrap(), 2);
        for i in 0..all_local.n_total() {
            let particle = Particle::new(all_local.positions()[i], all_local.types()[i]);
            match i {
                0 => pdata.push_local(0, particle).unwrap(),
                _ => pdata.push_ghost(i as u32, particle).unwrap(),
            };
        }
        evaluate(&mut eam, &pdata).unwrap();
        let output = eam.output();
        assert_eq!(output.len(), 5);
        assert_relative_eq!(output.forces()[0], reference_force, epsilon = 1e-12);
        assert_relative_eq!(output.energies()[0], reference_energy, epsilon = 1e-12);
        for i in 1..5 {
            assert_eq!(output.forces()[i], Vector3::zeros());
            assert_eq!(output.energies()[i], 0.0);
        }
    }

    #[test]
    fn test_errors() {
        let mut pdata = ParticleData::new(BoxDim::cube(10.0).unwrap(), 2);
        pdata.add_particle(Particle::new(Vector3::zeros(), 0)).unwrap();
        pdata.add_particle(Particle::new(Vector3::zeros(), 1)).unwrap();
        let mut eam = EamForceCompute::new(model(0.005), &Backend::Cpu, 2).unwrap();
        assert!(matches!(
            evaluate(&mut eam, &pdata),
            Err(ForceError::OutOfBounds { tags: [0, 1], .. })
        ));

        // density beyond the embedding table
        pdata.set_position(1, Vector3::new(0.5, 0.0, 0.0)).unwrap();
        let mut tabulation = model(1e-5);
        tabulation.nrho = 100;
        eam.set_tabulation(tabulation).unwrap();
        assert!(matches!(
            evaluate(&mut eam, &pdata),
            Err(ForceError::TableOutOfRange { .. })
        ));
        assert_eq!(eam.requested_comm_flags(0), CommFlags::POSITION | CommFlags::TAG);
    }

    #[test]
    fn test_lookup_rejects_unknown_types() {
        let tables = EamTables::build(&model(0.005)).unwrap();
        let unknown = |result: Result<(f64, f64)>| {
            matches!(
                result,
                Err(ForceError::InvalidType { kind: "particle", type_id: 2, .. })
            )
        };
        // (0, 2) would otherwise land on the (1, 1) table
        assert!(unknown(tables.lookup_pair(0, 2, 1.0)));
        assert!(unknown(tables.lookup_pair(2, 0, 1.0)));
        assert!(unknown(tables.lookup_density(2, 1.0)));
        assert!(unknown(tables.lookup_embedding(2, 0.1)));
        assert_eq!(
            tables.lookup_pair(0, 1, 1.0).unwrap(),
            tables.lookup_pair(1, 0, 1.0).unwrap()
        );
        assert!(tables.lookup_pair(1, 1, 1.0).is_ok());
    }

    #[test]
    fn test_gpu_matches_cpu() {
        if !GpuContext::is_available() {
            return;
        }
        let backend = Backend::new(BackendKind::Gpu).unwrap();
        let mut gpu = EamForceCompute::new(model(0.005), &backend, 16).unwrap();
        let mut cpu = EamForceCompute::new(model(0.005), &Backend::Cpu, 16).unwrap();
        let pdata = cluster();
        evaluate(&mut gpu, &pdata).unwrap();
        evaluate(&mut cpu, &pdata).unwrap();
        let (g, c) = (gpu.output(), cpu.output());
        assert_eq!(gpu.backend_kind(), BackendKind::Gpu);
        assert_relative_eq!(g.total_energy(), c.total_energy(), max_relative = 1e-4);
        for i in 0..5 {
            assert_relative_eq!(g.forces()[i], c.forces()[i], epsilon = 1e-3, max_relative = 1e-3);
            assert_relative_eq!(g.virial(i)[0], c.virial(i)[0], epsilon = 1e-3, max_relative = 1e-3);
        }

        let mut too_many = cluster();
        for k in 0..12 {
            too_many
                .add_particle(Particle::new(Vector3::new(4.0 + 0.1 * k as f64, 4.0, 4.0), 0))
                .unwrap();
        }
        assert!(matches!(
            evaluate(&mut gpu, &too_many),
            Err(ForceError::Backend(_))
        ));
    }
}
