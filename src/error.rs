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

//! Error kinds raised by force computes.
//!
//! None of these are recoverable within a step: the driver decides whether
//! to abort the run.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForceError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForceError {
    /// Parameter access with a type index beyond the table
    #[error("invalid {kind} type {type_id} specified: error {action} in {name}")]
    InvalidType {
        kind: &'static str,
        type_id: usize,
        action: String,
        name: String,
    },

    /// Type name not known to the type map
    #[error("unknown {kind} type '{type_name}'")]
    UnknownTypeName { kind: &'static str, type_name: String },

    /// Inconsistent configuration (table sizes, grids, particle layout)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An interaction references a tag without a local or ghost index
    #[error("{name}: interaction {} {} incomplete", .tags[0], .tags[1])]
    IncompleteInteraction { name: String, tags: [u32; 2] },

    /// The evaluator rejected an interaction that was expected to be valid
    #[error("{name}: interaction {} {} out of bounds", .tags[0], .tags[1])]
    OutOfBounds { name: String, tags: [u32; 2] },

    /// Lookup outside `[0, x_max)` of a tabulated function
    #[error("table lookup out of range: x = {x} not in [0, {x_max})")]
    TableOutOfRange { x: f64, x_max: f64 },

    /// GPU unavailable, capacity exceeded or device failure
    #[error("backend error: {0}")]
    Backend(String),
}

impl ForceError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}
