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

//! CPU backend using rayon.

use super::{evaluate_record, BackendKind, RecordBackend, RecordContribution, RecordJob};
use crate::{evaluator::Evaluator, Result};
use rayon::prelude::*;

/// Below this many records the rayon overhead is not worth it
const MIN_PARALLEL_RECORDS: usize = 1024;

/// CPU backend evaluating records in parallel.
///
/// Every record is independent, so records are mapped in parallel and the
/// accumulation onto particles is left to the (serial) scatter step.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuBackend;

impl<E: Evaluator> RecordBackend<E> for CpuBackend {
    fn evaluate(&self, job: &RecordJob<E::Param>) -> Result<Vec<RecordContribution>> {
        let contributions = if job.records.len() < MIN_PARALLEL_RECORDS {
            job.records
                .iter()
                .map(|record| evaluate_record::<E>(job, record))
                .collect()
        } else {
            job.records
                .par_iter()
                .map(|record| evaluate_record::<E>(job, record))
                .collect()
        };
        Ok(contributions)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Cpu
    }
}
