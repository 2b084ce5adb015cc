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

//! Flag sets exchanged with the driver and the domain decomposition layer.

use crate::evaluator::Evaluator;
use bitflags::bitflags;

bitflags! {
    /// Particle attributes that must be valid on ghost particles before a
    /// compute runs. Consumed by the decomposition layer.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CommFlags: u32 {
        const POSITION = 1 << 0;
        const TAG = 1 << 1;
        const CHARGE = 1 << 2;
        const DIAMETER = 1 << 3;
    }
}

bitflags! {
    /// Per-call quantities requested by the driver for the current step.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct StepFlags: u32 {
        /// Full pressure tensor
        const PRESSURE_TENSOR = 1 << 0;
        /// Trace of the virial only (still needs the per-particle components)
        const ISOTROPIC_VIRIAL = 1 << 1;
    }
}

impl StepFlags {
    /// True if any flag requires virial accumulation
    pub fn compute_virial(&self) -> bool {
        self.intersects(Self::PRESSURE_TENSOR | Self::ISOTROPIC_VIRIAL)
    }
}

impl CommFlags {
    /// Ghost attributes needed by interactions evaluated with `E`.
    ///
    /// The tag is always needed to resolve interaction participants;
    /// charge and diameter follow the evaluator's declared capabilities.
    pub fn for_evaluator<E: Evaluator>() -> Self {
        let mut flags = Self::TAG;
        flags.set(Self::CHARGE, E::needs_charge());
        flags.set(Self::DIAMETER, E::needs_diameter());
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{Fene, Harmonic, LennardJones, ScreenedCoulomb};

    #[test]
    fn test_evaluator_flags() {
        assert_eq!(CommFlags::for_evaluator::<Harmonic>(), CommFlags::TAG);
        assert_eq!(CommFlags::for_evaluator::<LennardJones>(), CommFlags::TAG);
        assert_eq!(
            CommFlags::for_evaluator::<ScreenedCoulomb>(),
            CommFlags::TAG | CommFlags::CHARGE
        );
        assert_eq!(
            CommFlags::for_evaluator::<Fene>(),
            CommFlags::TAG | CommFlags::DIAMETER
        );
    }

    #[test]
    fn test_virial_flags() {
        assert!(!StepFlags::empty().compute_virial());
        assert!(StepFlags::PRESSURE_TENSOR.compute_virial());
        assert!(StepFlags::ISOTROPIC_VIRIAL.compute_virial());
    }
}
