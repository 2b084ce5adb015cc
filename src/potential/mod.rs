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

//! Bond and pair potential computes.
//!
//! Both share the same three stages per step:
//!
//! 1. resolve the tags of every record to local or ghost indices,
//! 2. evaluate all records on the selected backend,
//! 3. scatter the contributions onto the local participants.
//!
//! For a record `(a, b)` with `dx = pos_b - pos_a`, `b` receives
//! `+F/r · dx`, `a` receives `-F/r · dx`, and each receives half the
//! energy and half the virial. Ghost participants receive nothing.

mod bond;
mod pair;

pub use bond::PotentialBond;
pub use pair::{PotentialPair, ShiftMode};

use crate::{
    backend::{RecordContribution, RecordStatus, ResolvedRecord},
    half_virial,
    interaction::InteractionRecord,
    output::ForceOutput,
    params::ParamTable,
    particles::ParticleStore,
    ForceError, Result,
};
use rayon::prelude::*;
use std::fmt::Debug;

/// Map record tags to particle indices and validate parameter slots
pub(crate) fn resolve_records<P: Copy + Default + Debug + Sync>(
    particles: &dyn ParticleStore,
    records: &[InteractionRecord],
    params: &ParamTable<P>,
    name: &str,
) -> Result<Vec<ResolvedRecord>> {
    records
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
            params.validate_slot(record.type_id as usize, "evaluating interactions")?;
            Ok(ResolvedRecord {
                idx: [a as u32, b as u32],
                tags: record.tags,
                type_id: record.type_id,
            })
        })
        .collect()
}

/// Accumulate contributions onto local particles.
///
/// Fails before writing anything if any record was out of bounds or could
/// not be shifted.
pub(crate) fn scatter(
    contributions: &[RecordContribution],
    records: &[ResolvedRecord],
    compute_virial: bool,
    output: &mut ForceOutput,
    name: &str,
) -> Result<()> {
    debug_assert_eq!(contributions.len(), records.len());
    if let Some((_, record)) = contributions
        .iter()
        .zip(records)
        .find(|(c, _)| c.status == RecordStatus::OutOfBounds)
    {
        let [tag_a, tag_b] = record.tags;
        error!("{name}: interaction {tag_a} {tag_b} out of bounds");
        return Err(ForceError::OutOfBounds {
            name: name.to_string(),
            tags: record.tags,
        });
    }
    if let Some((_, record)) = contributions
        .iter()
        .zip(records)
        .find(|(c, _)| c.status == RecordStatus::ShiftRejected)
    {
        let [tag_a, tag_b] = record.tags;
        error!("{name}: no energy at the cutoff to shift interaction {tag_a} {tag_b} by");
        return Err(ForceError::config(format!(
            "{name}: cannot shift energy of interaction {tag_a} {tag_b}, force law rejects the cutoff"
        )));
    }

    let n_local = output.n_local();
    for (c, record) in contributions.iter().zip(records) {
        if c.status != RecordStatus::Evaluated {
            continue;
        }
        let force = c.dx * c.force_divr;
        let energy = 0.5 * c.energy;
        let virial = compute_virial.then(|| half_virial(c.force_divr, &c.dx));
        let [a, b] = record.idx.map(|i| i as usize);
        if a < n_local {
            output.add(a, -force, energy, virial.as_ref());
        }
        if b < n_local {
            output.add(b, force, energy, virial.as_ref());
        }
    }
    Ok(())
}
