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

//! Benchmark systems described in YAML.
//!
//! ~~~yaml
//! backend: cpu
//! steps: 100
//! types: [A, B]
//! lattice: { n_per_side: 8, spacing: 1.1, jitter: 0.05, seed: 42 }
//! harmonic: { k: 10.0, r0: 1.1 }
//! lennard_jones:
//!   r_cut: 2.5
//!   shift: shift
//!   params:
//!     A-A: { epsilon: 1.0, sigma: 1.0 }
//! ~~~

use crate::{
    compute::{requested_comm_flags, ForceCompute, StepContext},
    evaluator::{Harmonic, HarmonicParams, LennardJones, LennardJonesParams},
    interaction::{BondTable, InteractionList, NeighborList},
    output::ForceSummary,
    particles::{Particle, ParticleData, ParticleStore},
    Backend, BackendKind, BoxDim, EamForceCompute, EamTabulation, PotentialBond, PotentialPair,
    ShiftMode, StepFlags, TypeNames, Vector3,
};
use anyhow::{Context, Result};
use itertools::iproduct;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf};

/// Simple cubic lattice with random displacements
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Lattice {
    pub n_per_side: usize,
    pub spacing: f64,
    /// Largest displacement along each axis
    pub jitter: f64,
    pub seed: u64,
}

impl Default for Lattice {
    fn default() -> Self {
        Self {
            n_per_side: 8,
            spacing: 1.1,
            jitter: 0.05,
            seed: 42,
        }
    }
}

/// Harmonic bonds joining neighbors along the x rows of the lattice
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarmonicSection {
    pub k: f64,
    pub r0: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LennardJonesSection {
    /// Parameters keyed by type pair, e.g. `A-B`
    pub params: BTreeMap<String, LennardJonesParams>,
    pub r_cut: f64,
    #[serde(default = "default_skin")]
    pub skin: f64,
    #[serde(default)]
    pub shift: ShiftMode,
}

fn default_skin() -> f64 {
    0.3
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    pub backend: BackendKind,
    pub steps: usize,
    /// Request the virial on every step
    pub virial: bool,
    pub types: TypeNames,
    pub lattice: Lattice,
    pub harmonic: Option<HarmonicSection>,
    pub lennard_jones: Option<LennardJonesSection>,
    /// YAML file with an [`EamTabulation`]
    pub eam: Option<PathBuf>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        let params = [("A-A", 1.0), ("A-B", 0.8), ("B-B", 0.5)]
            .into_iter()
            .map(|(key, epsilon)| (key.to_string(), LennardJonesParams::new(epsilon, 1.0)))
            .collect();
        Self {
            backend: BackendKind::Cpu,
            steps: 100,
            virial: true,
            types: TypeNames::new(["A", "B"]),
            lattice: Lattice::default(),
            harmonic: Some(HarmonicSection { k: 10.0, r0: 1.1 }),
            lennard_jones: Some(LennardJonesSection {
                params,
                r_cut: 2.5,
                skin: default_skin(),
                shift: ShiftMode::Shift,
            }),
            eam: None,
        }
    }
}

impl BenchConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Could not parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &std::path::Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read configuration {}", path.display()))?;
        Self::from_yaml_str(&yaml).with_context(|| format!("In {}", path.display()))
    }

    fn box_length(&self) -> f64 {
        self.lattice.n_per_side as f64 * self.lattice.spacing
    }

    pub fn validate(&self) -> Result<()> {
        if self.types.is_empty() {
            anyhow::bail!("at least one particle type is required");
        }
        if self.lattice.n_per_side == 0 || self.lattice.spacing <= 0.0 {
            anyhow::bail!("empty lattice");
        }
        if let Some(lj) = &self.lennard_jones {
            let half_box = 0.5 * self.box_length();
            if lj.r_cut + lj.skin >= half_box {
                anyhow::bail!(
                    "cutoff plus skin {} must be below half the box length {half_box}",
                    lj.r_cut + lj.skin
                );
            }
        }
        Ok(())
    }

    /// Particles on the lattice, types assigned round robin
    fn particles(&self) -> Result<ParticleData> {
        let n = self.lattice.n_per_side;
        let spacing = self.lattice.spacing;
        let jitter = self.lattice.jitter;
        let length = self.box_length();
        let mut rng = StdRng::seed_from_u64(self.lattice.seed);
        let mut pdata = ParticleData::new(BoxDim::cube(length)?, self.types.len());
        for (k, (iz, iy, ix)) in iproduct!(0..n, 0..n, 0..n).enumerate() {
            let site = Vector3::new(ix as f64, iy as f64, iz as f64) * spacing
                - Vector3::repeat(0.5 * length);
            let displacement = Vector3::from_fn(|_, _| {
                if jitter > 0.0 {
                    rng.gen_range(-jitter..jitter)
                } else {
                    0.0
                }
            });
            let type_id = (k % self.types.len()) as u32;
            pdata.add_particle(Particle::new(site + displacement, type_id))?;
        }
        Ok(pdata)
    }

    /// Build the particles, interaction lists and computes
    pub fn build_system(&self, backend: &Backend) -> Result<BenchSystem> {
        self.validate()?;
        let particles = self.particles()?;
        let n = self.lattice.n_per_side as u32;

        let mut bonds = BondTable::new(1);
        let bond = match self.harmonic {
            Some(section) => {
                for (iz, iy, ix) in iproduct!(0..n, 0..n, 0..n - 1) {
                    let tag = (iz * n + iy) * n + ix;
                    bonds.add_bond(tag, tag + 1, 0)?;
                }
                let mut bond = PotentialBond::<Harmonic>::new(1, backend)?;
                bond.set_params(0, HarmonicParams::new(section.k, section.r0))?;
                Some(bond)
            }
            None => None,
        };

        let (pair, neighbors) = match &self.lennard_jones {
            Some(section) => {
                let mut pair = PotentialPair::<LennardJones>::with_type_names(
                    self.types.clone(),
                    section.r_cut,
                    backend,
                )?;
                for (key, params) in &section.params {
                    pair.set_params_by_name(key, *params)
                        .with_context(|| format!("Lennard-Jones parameters for {key}"))?;
                }
                pair.set_shift_mode(section.shift);
                let mut neighbors = NeighborList::new(section.r_cut, section.skin);
                neighbors.exclude_bonds(&bonds);
                (Some(pair), neighbors)
            }
            None => (None, NeighborList::default()),
        };

        let eam = match &self.eam {
            Some(path) => {
                let tabulation = EamTabulation::from_yaml_file(path)?;
                if tabulation.n_types != self.types.len() {
                    anyhow::bail!(
                        "EAM file has {} types, configuration has {}",
                        tabulation.n_types,
                        self.types.len()
                    );
                }
                let r_cut = tabulation.r_cut;
                let eam = EamForceCompute::new(tabulation, backend, particles.n_total())?;
                Some((eam, NeighborList::new(r_cut, 0.0).with_ghost_pairs()))
            }
            None => None,
        };

        info!(
            "benchmark system: {} particles, {} bonds on {}",
            particles.n_total(),
            bonds.records().len(),
            backend.kind()
        );
        Ok(BenchSystem {
            particles,
            bonds,
            neighbors,
            bond,
            pair,
            eam,
            flags: if self.virial {
                StepFlags::PRESSURE_TENSOR
            } else {
                StepFlags::empty()
            },
        })
    }
}

/// A benchmark system ready to be stepped
pub struct BenchSystem {
    pub particles: ParticleData,
    pub bonds: BondTable,
    pub neighbors: NeighborList,
    pub bond: Option<PotentialBond<Harmonic>>,
    pub pair: Option<PotentialPair<LennardJones>>,
    pub eam: Option<(EamForceCompute, NeighborList)>,
    pub flags: StepFlags,
}

impl BenchSystem {
    fn computes(&self) -> Vec<&dyn ForceCompute> {
        let mut computes: Vec<&dyn ForceCompute> = Vec::new();
        if let Some(bond) = &self.bond {
            computes.push(bond);
        }
        if let Some(pair) = &self.pair {
            computes.push(pair);
        }
        if let Some((eam, _)) = &self.eam {
            computes.push(eam);
        }
        computes
    }

    /// Evaluate all computes for `timestep`, rebuilding neighbor lists first
    pub fn step(&mut self, timestep: u64) -> crate::Result<()> {
        let flags = requested_comm_flags(self.computes(), timestep);
        trace!("step {timestep}: ghost attributes {flags:?}");
        let particles = &self.particles;
        if let Some(bond) = &mut self.bond {
            bond.compute(&StepContext::new(timestep, particles, &self.bonds, self.flags))?;
        }
        if let Some(pair) = &mut self.pair {
            self.neighbors.build(particles);
            pair.compute(&StepContext::new(timestep, particles, &self.neighbors, self.flags))?;
        }
        if let Some((eam, neighbors)) = &mut self.eam {
            neighbors.build(particles);
            eam.compute(&StepContext::new(timestep, particles, neighbors, self.flags))?;
        }
        Ok(())
    }

    /// Totals summed over all computes
    pub fn summary(&self) -> ForceSummary {
        self.computes()
            .iter()
            .map(|c| c.output().summary())
            .fold(ForceSummary::default(), |acc, s| ForceSummary {
                energy: acc.energy + s.energy,
                virial: std::array::from_fn(|k| acc.virial[k] + s.virial[k]),
                net_force: std::array::from_fn(|k| acc.net_force[k] + s.net_force[k]),
            })
    }

    /// Per-compute totals, keyed by compute name
    pub fn summaries(&self) -> BTreeMap<String, ForceSummary> {
        self.computes()
            .iter()
            .map(|c| (c.name(), c.output().summary()))
            .collect()
    }
}
