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

//! Parameter storage keyed by type or by unordered type pair.

use crate::{ForceError, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Symmetric mapping from an unordered pair of types to a flat index.
///
/// Pairs `(i, j)` and `(j, i)` share the slot; there are
/// `n * (n + 1) / 2` slots for `n` types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypePairIndex {
    n_types: usize,
}

impl TypePairIndex {
    pub const fn new(n_types: usize) -> Self {
        Self { n_types }
    }

    pub const fn n_types(&self) -> usize {
        self.n_types
    }

    /// Number of slots
    pub const fn len(&self) -> usize {
        self.n_types * (self.n_types + 1) / 2
    }

    pub const fn is_empty(&self) -> bool {
        self.n_types == 0
    }

    /// Flat index of the pair `(a, b)`. Caller guarantees `a, b < n_types`.
    #[inline]
    pub const fn index(&self, a: usize, b: usize) -> usize {
        let (i, j) = if a <= b { (a, b) } else { (b, a) };
        i * self.n_types - i * (i + 1) / 2 + j
    }

    /// Inverse of [`Self::index`], returning `(i, j)` with `i <= j`
    pub fn pair(&self, index: usize) -> Option<(usize, usize)> {
        (0..self.n_types)
            .flat_map(|i| (i..self.n_types).map(move |j| (i, j)))
            .nth(index)
    }
}

/// Layout of a parameter table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeIndexing {
    /// One slot per type (bonds, EAM per-element data)
    PerType,
    /// One slot per unordered type pair (pair potentials)
    PerTypePair,
}

/// Named types; the position in the list is the type index
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeNames(Vec<String>);

impl TypeNames {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn type_by_name(&self, name: &str, kind: &'static str) -> Result<usize> {
        self.0
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| ForceError::UnknownTypeName {
                kind,
                type_name: name.to_string(),
            })
    }

    pub fn name(&self, type_id: usize) -> Option<&str> {
        self.0.get(type_id).map(String::as_str)
    }

    /// Resolve a pair key of the form `"A-B"`
    pub fn pair_by_name(&self, key: &str, kind: &'static str) -> Result<(usize, usize)> {
        let (a, b) = key.split_once('-').ok_or_else(|| ForceError::UnknownTypeName {
            kind,
            type_name: key.to_string(),
        })?;
        Ok((
            self.type_by_name(a.trim(), kind)?,
            self.type_by_name(b.trim(), kind)?,
        ))
    }
}

/// Flat table of parameter blocks with validated access.
///
/// Invalid type indices are rejected before anything is written, so a failed
/// `set` leaves the table unchanged.
#[derive(Clone, Debug)]
pub struct ParamTable<P> {
    params: Vec<P>,
    n_types: usize,
    indexing: TypeIndexing,
    /// Kind of type ("bond", "particle") used in error messages
    kind: &'static str,
    /// Owner used in error messages
    owner: String,
}

impl<P: Copy + Default + Debug> ParamTable<P> {
    pub fn new(
        n_types: usize,
        indexing: TypeIndexing,
        kind: &'static str,
        owner: impl Into<String>,
    ) -> Self {
        let len = match indexing {
            TypeIndexing::PerType => n_types,
            TypeIndexing::PerTypePair => TypePairIndex::new(n_types).len(),
        };
        Self {
            params: vec![P::default(); len],
            n_types,
            indexing,
            kind,
            owner: owner.into(),
        }
    }

    pub fn n_types(&self) -> usize {
        self.n_types
    }

    pub fn indexing(&self) -> TypeIndexing {
        self.indexing
    }

    /// All blocks in flat storage order
    pub fn as_slice(&self) -> &[P] {
        &self.params
    }

    pub fn validate_type(&self, type_id: usize, action: &str) -> Result<()> {
        if type_id >= self.n_types {
            error!(
                "{}: invalid {} type {type_id} ({action})",
                self.owner, self.kind
            );
            return Err(ForceError::InvalidType {
                kind: self.kind,
                type_id,
                action: action.to_string(),
                name: self.owner.clone(),
            });
        }
        Ok(())
    }

    /// Validate a flat slot index as stored in interaction records
    pub fn validate_slot(&self, slot: usize, action: &str) -> Result<()> {
        if slot >= self.params.len() {
            return Err(ForceError::InvalidType {
                kind: self.kind,
                type_id: slot,
                action: action.to_string(),
                name: self.owner.clone(),
            });
        }
        Ok(())
    }

    fn slot(&self, a: usize, b: usize, action: &str) -> Result<usize> {
        self.validate_type(a, action)?;
        match self.indexing {
            TypeIndexing::PerType => Ok(a),
            TypeIndexing::PerTypePair => {
                self.validate_type(b, action)?;
                Ok(TypePairIndex::new(self.n_types).index(a, b))
            }
        }
    }

    /// Set the block of a type (per-type tables) or of the pair `(t, t)`
    pub fn set(&mut self, type_id: usize, param: P) -> Result<()> {
        let slot = self.slot(type_id, type_id, "setting params")?;
        self.params[slot] = param;
        Ok(())
    }

    pub fn get(&self, type_id: usize) -> Result<&P> {
        let slot = self.slot(type_id, type_id, "getting params")?;
        Ok(&self.params[slot])
    }

    pub fn set_pair(&mut self, a: usize, b: usize, param: P) -> Result<()> {
        let slot = self.slot(a, b, "setting params")?;
        self.params[slot] = param;
        Ok(())
    }

    pub fn get_pair(&self, a: usize, b: usize) -> Result<&P> {
        let slot = self.slot(a, b, "getting params")?;
        Ok(&self.params[slot])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_pair_index_is_symmetric_and_dense() {
        let idx = TypePairIndex::new(3);
        assert_eq!(idx.len(), 6);
        let mut seen = vec![false; idx.len()];
        for a in 0..3 {
            for b in 0..3 {
                assert_eq!(idx.index(a, b), idx.index(b, a));
                seen[idx.index(a, b)] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
        assert_eq!(idx.index(0, 0), 0);
        assert_eq!(idx.index(2, 2), 5);
        assert_eq!(idx.pair(idx.index(2, 1)), Some((1, 2)));
        assert_eq!(idx.pair(6), None);
    }

    #[test]
    fn test_out_of_range_leaves_params_unmodified() {
        let mut table = ParamTable::<f64>::new(2, TypeIndexing::PerType, "bond", "test");
        table.set(1, 3.0).unwrap();
        let err = table.set(2, 7.0).unwrap_err();
        assert!(matches!(err, ForceError::InvalidType { type_id: 2, .. }));
        assert!(err.to_string().contains("setting params"));
        assert!(table.get(2).unwrap_err().to_string().contains("getting params"));
        assert_eq!(table.as_slice(), &[0.0, 3.0]);
    }

    #[test]
    fn test_pair_table() {
        let mut table =
            ParamTable::<f64>::new(2, TypeIndexing::PerTypePair, "particle", "test");
        assert_eq!(table.as_slice().len(), 3);
        table.set_pair(1, 0, 2.5).unwrap();
        assert_eq!(*table.get_pair(0, 1).unwrap(), 2.5);
        assert!(table.set_pair(0, 2, 1.0).is_err());
        assert_eq!(table.as_slice(), &[0.0, 2.5, 0.0]);
        assert!(table.validate_slot(2, "lookup").is_ok());
        assert!(table.validate_slot(3, "lookup").is_err());
    }

    #[test]
    fn test_type_names() {
        let names = TypeNames::new(["A", "B"]);
        assert_eq!(names.type_by_name("B", "particle").unwrap(), 1);
        assert_eq!(names.pair_by_name("B-A", "particle").unwrap(), (1, 0));
        assert!(names.type_by_name("C", "particle").is_err());
        assert!(names.pair_by_name("AB", "particle").is_err());
    }
}
