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

//! Read-only particle data consumed by the force computes.

use crate::{boxdim::BoxDim, ForceError, Result, Vector3};

/// Reverse tag map entry for tags without a local or ghost copy
pub const NOT_LOCAL: u32 = u32::MAX;

/// Particle data as seen by a compute during one step.
///
/// Indices `0..n_local()` are owned particles, `n_local()..n_local() + n_ghosts()`
/// are ghosts. All per-particle slices have length `n_local() + n_ghosts()`.
pub trait ParticleStore: Sync {
    fn positions(&self) -> &[Vector3];
    fn types(&self) -> &[u32];
    fn tags(&self) -> &[u32];
    /// Index of each tag, or [`NOT_LOCAL`]; length `max_tag() + 1`
    fn reverse_tags(&self) -> &[u32];
    fn charges(&self) -> &[f64];
    fn diameters(&self) -> &[f64];
    fn n_local(&self) -> usize;
    fn n_ghosts(&self) -> usize;
    fn max_tag(&self) -> u32;
    /// Box of the whole system, not of the local domain
    fn global_box(&self) -> &BoxDim;
    fn n_types(&self) -> usize;

    fn n_total(&self) -> usize {
        self.n_local() + self.n_ghosts()
    }

    /// Index of a tag if it is present locally or as a ghost
    fn index_of(&self, tag: u32) -> Option<usize> {
        let idx = *self.reverse_tags().get(tag as usize)?;
        (idx != NOT_LOCAL && (idx as usize) < self.n_total()).then_some(idx as usize)
    }
}

/// Attributes of a single particle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub pos: Vector3,
    pub type_id: u32,
    pub charge: f64,
    pub diameter: f64,
}

impl Particle {
    pub fn new(pos: Vector3, type_id: u32) -> Self {
        Self {
            pos,
            type_id,
            charge: 0.0,
            diameter: 1.0,
        }
    }

    pub fn with_charge(mut self, charge: f64) -> Self {
        self.charge = charge;
        self
    }

    pub fn with_diameter(mut self, diameter: f64) -> Self {
        self.diameter = diameter;
        self
    }
}

/// In-memory particle store with explicit ghost layer
#[derive(Clone, Debug)]
pub struct ParticleData {
    pos: Vec<Vector3>,
    types: Vec<u32>,
    tags: Vec<u32>,
    rtags: Vec<u32>,
    charges: Vec<f64>,
    diameters: Vec<f64>,
    n_local: usize,
    global_box: BoxDim,
    n_types: usize,
}

impl ParticleData {
    pub fn new(global_box: BoxDim, n_types: usize) -> Self {
        Self {
            pos: Vec::new(),
            types: Vec::new(),
            tags: Vec::new(),
            rtags: Vec::new(),
            charges: Vec::new(),
            diameters: Vec::new(),
            n_local: 0,
            global_box,
            n_types,
        }
    }

    /// Add an owned particle. Must be called before any ghost is added.
    pub fn push_local(&mut self, tag: u32, particle: Particle) -> Result<usize> {
        if self.pos.len() != self.n_local {
            return Err(ForceError::config(
                "local particles must be added before ghosts",
            ));
        }
        let index = self.push(tag, particle)?;
        self.n_local += 1;
        Ok(index)
    }

    /// Add a ghost replica of a particle owned by another domain
    pub fn push_ghost(&mut self, tag: u32, particle: Particle) -> Result<usize> {
        self.push(tag, particle)
    }

    /// Add an owned particle with the next free tag
    pub fn add_particle(&mut self, particle: Particle) -> Result<u32> {
        let tag = self.rtags.len() as u32;
        self.push_local(tag, particle)?;
        Ok(tag)
    }

    fn push(&mut self, tag: u32, particle: Particle) -> Result<usize> {
        if tag == NOT_LOCAL {
            return Err(ForceError::config("tag value reserved"));
        }
        if particle.type_id as usize >= self.n_types {
            return Err(ForceError::config(format!(
                "particle type {} exceeds number of types {}",
                particle.type_id, self.n_types
            )));
        }
        if self.rtags.len() <= tag as usize {
            self.rtags.resize(tag as usize + 1, NOT_LOCAL);
        }
        if self.rtags[tag as usize] != NOT_LOCAL {
            return Err(ForceError::config(format!("duplicate particle tag {tag}")));
        }
        let index = self.pos.len();
        self.rtags[tag as usize] = index as u32;
        self.pos.push(particle.pos);
        self.types.push(particle.type_id);
        self.tags.push(tag);
        self.charges.push(particle.charge);
        self.diameters.push(particle.diameter);
        Ok(index)
    }

    /// Drop the ghost layer, e.g. before the next exchange
    pub fn clear_ghosts(&mut self) {
        for &tag in &self.tags[self.n_local..] {
            self.rtags[tag as usize] = NOT_LOCAL;
        }
        self.pos.truncate(self.n_local);
        self.types.truncate(self.n_local);
        self.tags.truncate(self.n_local);
        self.charges.truncate(self.n_local);
        self.diameters.truncate(self.n_local);
    }

    /// Mutable positions of local and ghost particles
    pub fn positions_mut(&mut self) -> &mut [Vector3] {
        &mut self.pos
    }

    pub fn set_position(&mut self, tag: u32, pos: Vector3) -> Result<()> {
        let index = self
            .index_of(tag)
            .ok_or_else(|| ForceError::config(format!("tag {tag} not present")))?;
        self.pos[index] = pos;
        Ok(())
    }

    pub fn set_charge(&mut self, tag: u32, charge: f64) -> Result<()> {
        let index = self
            .index_of(tag)
            .ok_or_else(|| ForceError::config(format!("tag {tag} not present")))?;
        self.charges[index] = charge;
        Ok(())
    }
}

impl ParticleStore for ParticleData {
    fn positions(&self) -> &[Vector3] {
        &self.pos
    }
    fn types(&self) -> &[u32] {
        &self.types
    }
    fn tags(&self) -> &[u32] {
        &self.tags
    }
    fn reverse_tags(&self) -> &[u32] {
        &self.rtags
    }
    fn charges(&self) -> &[f64] {
        &self.charges
    }
    fn diameters(&self) -> &[f64] {
        &self.diameters
    }
    fn n_local(&self) -> usize {
        self.n_local
    }
    fn n_ghosts(&self) -> usize {
        self.pos.len() - self.n_local
    }
    fn max_tag(&self) -> u32 {
        self.rtags.len().saturating_sub(1) as u32
    }
    fn global_box(&self) -> &BoxDim {
        &self.global_box
    }
    fn n_types(&self) -> usize {
        self.n_types
    }
}
