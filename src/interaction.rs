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

//! Interaction lists: bond topology and pair neighbor lists.

use crate::{params::TypePairIndex, particles::ParticleStore, ForceError, Result};
use std::collections::HashSet;

/// Two participants, identified by tag, plus a parameter slot.
///
/// For bonds `type_id` is the bond type; for pairs it is the symmetric
/// type-pair index of the two particle types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InteractionRecord {
    pub tags: [u32; 2],
    pub type_id: u32,
}

impl InteractionRecord {
    pub const fn new(tag_a: u32, tag_b: u32, type_id: u32) -> Self {
        Self {
            tags: [tag_a, tag_b],
            type_id,
        }
    }
}

/// Provider of interaction records, valid for the current step.
///
/// Each interaction appears once.
pub trait InteractionList: Sync {
    fn records(&self) -> &[InteractionRecord];

    fn len(&self) -> usize {
        self.records().len()
    }

    fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

/// Bond topology owned outside the computes
#[derive(Clone, Debug, Default)]
pub struct BondTable {
    bonds: Vec<InteractionRecord>,
    n_types: usize,
}

impl BondTable {
    pub fn new(n_types: usize) -> Self {
        Self {
            bonds: Vec::new(),
            n_types,
        }
    }

    pub fn n_types(&self) -> usize {
        self.n_types
    }

    pub fn add_bond(&mut self, tag_a: u32, tag_b: u32, type_id: u32) -> Result<()> {
        if type_id as usize >= self.n_types {
            return Err(ForceError::config(format!(
                "bond type {type_id} exceeds number of bond types {}",
                self.n_types
            )));
        }
        if tag_a == tag_b {
            return Err(ForceError::config(format!("bond {tag_a} {tag_b} to itself")));
        }
        self.bonds.push(InteractionRecord::new(tag_a, tag_b, type_id));
        Ok(())
    }

    pub fn remove_bond(&mut self, tag_a: u32, tag_b: u32) -> bool {
        let len = self.bonds.len();
        self.bonds
            .retain(|b| b.tags != [tag_a, tag_b] && b.tags != [tag_b, tag_a]);
        len != self.bonds.len()
    }
}

impl InteractionList for BondTable {
    fn records(&self) -> &[InteractionRecord] {
        &self.bonds
    }
}

/// Brute-force half neighbor list with symmetric type-pair slots.
///
/// Pairs between two ghosts are only listed when requested with
/// [`NeighborList::with_ghost_pairs`], which many-body potentials need to
/// complete ghost densities. Meant for small systems and tests; production
/// drivers bring their own cell or tree list.
#[derive(Clone, Debug, Default)]
pub struct NeighborList {
    pairs: Vec<InteractionRecord>,
    exclusions: HashSet<(u32, u32)>,
    r_cut: f64,
    skin: f64,
    ghost_pairs: bool,
}

impl NeighborList {
    pub fn new(r_cut: f64, skin: f64) -> Self {
        Self {
            pairs: Vec::new(),
            exclusions: HashSet::new(),
            r_cut,
            skin,
            ghost_pairs: false,
        }
    }

    /// Also list pairs where both particles are ghosts
    pub fn with_ghost_pairs(mut self) -> Self {
        self.ghost_pairs = true;
        self
    }

    fn key(a: u32, b: u32) -> (u32, u32) {
        (a.min(b), a.max(b))
    }

    pub fn add_exclusion(&mut self, tag_a: u32, tag_b: u32) {
        self.exclusions.insert(Self::key(tag_a, tag_b));
    }

    /// Exclude all bonded pairs from the pair list
    pub fn exclude_bonds(&mut self, bonds: &dyn InteractionList) {
        for b in bonds.records() {
            self.add_exclusion(b.tags[0], b.tags[1]);
        }
    }

    pub fn r_cut(&self) -> f64 {
        self.r_cut
    }

    /// Rebuild from the current positions
    pub fn build(&mut self, particles: &dyn ParticleStore) {
        let pos = particles.positions();
        let types = particles.types();
        let tags = particles.tags();
        let n_outer = if self.ghost_pairs {
            particles.n_total()
        } else {
            particles.n_local()
        };
        let global_box = particles.global_box();
        let pair_index = TypePairIndex::new(particles.n_types());
        let r_list_sq = (self.r_cut + self.skin).powi(2);

        self.pairs.clear();
        for i in 0..n_outer {
            for j in (i + 1)..pos.len() {
                if !self.exclusions.is_empty()
                    && self.exclusions.contains(&Self::key(tags[i], tags[j]))
                {
                    continue;
                }
                let dx = global_box.min_image(pos[j] - pos[i]);
                if dx.norm_squared() < r_list_sq {
                    let slot = pair_index.index(types[i] as usize, types[j] as usize);
                    self.pairs
                        .push(InteractionRecord::new(tags[i], tags[j], slot as u32));
                }
            }
        }
        trace!("neighbor list rebuilt with {} pairs", self.pairs.len());
    }
}

impl InteractionList for NeighborList {
    fn records(&self) -> &[InteractionRecord] {
        &self.pairs
    }
}

impl InteractionList for Vec<InteractionRecord> {
    fn records(&self) -> &[InteractionRecord] {
        self
    }
}
