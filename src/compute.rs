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

//! Per-timestep scheduling of force computes.
//!
//! Computes may be consulted several times within one timestep (by the
//! integrator, by loggers, by other computes). The scheduler makes sure the
//! actual work is done at most once per step unless a recomputation is
//! explicitly forced.

use crate::{
    comm::{CommFlags, StepFlags},
    interaction::InteractionList,
    output::ForceOutput,
    particles::ParticleStore,
    Result,
};
use std::time::{Duration, Instant};

/// Tracks when a compute last produced its result.
#[derive(Debug, Clone)]
pub struct ComputeScheduler {
    last_computed: u64,
    force_compute: bool,
    first_compute: bool,
}

impl Default for ComputeScheduler {
    fn default() -> Self {
        Self {
            last_computed: 0,
            force_compute: false,
            first_compute: true,
        }
    }
}

impl ComputeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide if the compute must run for `timestep` and record the decision.
    ///
    /// A timestep different from the last computed one, in either direction,
    /// counts as not yet computed.
    pub fn should_compute(&mut self, timestep: u64) -> bool {
        if self.first_compute {
            self.first_compute = false;
            self.last_computed = timestep;
            return true;
        }
        if self.force_compute {
            self.force_compute = false;
            self.last_computed = timestep;
            return true;
        }
        if self.last_computed != timestep {
            self.last_computed = timestep;
            return true;
        }
        false
    }

    /// Same answer as [`Self::should_compute`] without touching the state
    pub fn peek_compute(&self, timestep: u64) -> bool {
        self.first_compute || self.force_compute || self.last_computed != timestep
    }

    /// Request a recomputation even if `timestep` was already computed
    pub fn force_compute(&mut self, timestep: u64) {
        trace!("forcing recomputation at step {timestep}");
        self.force_compute = true;
    }

    /// Last timestep for which work was done; `None` before the first compute
    pub fn last_computed(&self) -> Option<u64> {
        (!self.first_compute).then_some(self.last_computed)
    }
}

/// Everything a compute reads during one step.
///
/// The particle store and interaction list are borrowed for the duration of
/// the call and must not change while it runs.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub timestep: u64,
    pub particles: &'a dyn ParticleStore,
    pub interactions: &'a dyn InteractionList,
    pub flags: StepFlags,
}

impl<'a> StepContext<'a> {
    pub fn new(
        timestep: u64,
        particles: &'a dyn ParticleStore,
        interactions: &'a dyn InteractionList,
        flags: StepFlags,
    ) -> Self {
        Self {
            timestep,
            particles,
            interactions,
            flags,
        }
    }
}

/// A compute producing forces, energies and virials.
pub trait ForceCompute: Send {
    /// Name used in diagnostics
    fn name(&self) -> String;

    fn scheduler(&self) -> &ComputeScheduler;

    fn scheduler_mut(&mut self) -> &mut ComputeScheduler;

    /// Unconditionally evaluate all interactions for the step
    fn compute_forces(&mut self, ctx: &StepContext) -> Result<()>;

    /// Result of the last successful compute
    fn output(&self) -> &ForceOutput;

    /// Ghost attributes this compute needs exchanged before it runs
    fn requested_comm_flags(&self, _timestep: u64) -> CommFlags {
        CommFlags::POSITION
    }

    /// Compute forces if not already done for `ctx.timestep`.
    ///
    /// Returns `true` if work was done. A failed step is not recorded as
    /// computed, so calling again with the same timestep retries it.
    fn compute(&mut self, ctx: &StepContext) -> Result<bool> {
        let saved = self.scheduler().clone();
        if !self.scheduler_mut().should_compute(ctx.timestep) {
            return Ok(false);
        }
        if let Err(err) = self.compute_forces(ctx) {
            *self.scheduler_mut() = saved;
            return Err(err);
        }
        Ok(true)
    }

    /// Recompute forces even if this step was already computed
    fn force_compute(&mut self, ctx: &StepContext) -> Result<()> {
        self.scheduler_mut().force_compute(ctx.timestep);
        self.compute(ctx).map(|_| ())
    }

    /// Mean wall time of `n_iters` forced evaluations
    fn benchmark(&mut self, ctx: &StepContext, n_iters: usize) -> Result<Duration> {
        // warm up caches and any device pipelines
        self.force_compute(ctx)?;
        let start = Instant::now();
        for _ in 0..n_iters {
            self.force_compute(ctx)?;
        }
        let elapsed = start.elapsed().div_f64(n_iters.max(1) as f64);
        debug!("{}: {:.3} ms per evaluation", self.name(), elapsed.as_secs_f64() * 1e3);
        Ok(elapsed)
    }
}

/// Union of the ghost attributes requested by a set of computes
pub fn requested_comm_flags<'a>(
    computes: impl IntoIterator<Item = &'a dyn ForceCompute>,
    timestep: u64,
) -> CommFlags {
    computes
        .into_iter()
        .fold(CommFlags::empty(), |flags, c| flags | c.requested_comm_flags(timestep))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_call_always_computes() {
        let mut s = ComputeScheduler::new();
        assert_eq!(s.last_computed(), None);
        assert!(s.peek_compute(0));
        assert!(s.should_compute(0));
        assert_eq!(s.last_computed(), Some(0));
    }

    #[test]
    fn test_idempotent_within_step() {
        let mut s = ComputeScheduler::new();
        assert!(s.should_compute(10));
        assert!(!s.should_compute(10));
        assert!(!s.peek_compute(10));
        assert!(s.should_compute(11));
        assert!(!s.should_compute(11));
    }

    #[test]
    fn test_force_compute() {
        let mut s = ComputeScheduler::new();
        assert!(s.should_compute(5));
        s.force_compute(5);
        assert!(s.peek_compute(5));
        assert!(s.should_compute(5));
        assert!(!s.should_compute(5));
    }

    #[test]
    fn test_peek_does_not_mutate() {
        let mut s = ComputeScheduler::new();
        assert!(s.should_compute(1));
        assert!(s.peek_compute(2));
        assert!(s.peek_compute(2));
        assert_eq!(s.last_computed(), Some(1));
        assert!(s.should_compute(2));
    }

    #[test]
    fn test_time_moving_backward_recomputes() {
        let mut s = ComputeScheduler::new();
        assert!(s.should_compute(100));
        assert!(s.should_compute(50));
        assert!(!s.should_compute(50));
        assert_eq!(s.last_computed(), Some(50));
    }
}
