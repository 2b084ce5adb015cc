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

//! Uniformly sampled lookup tables built from physically sampled data.
//!
//! Tabulated potentials are usually given on whatever grid the source
//! provides. [`TableSet::build`] resamples a set of such functions onto a
//! common uniform grid `x_k = k·dx`, `k = 0..n`, and stores value and
//! derivative side by side so that a lookup is a single index computation
//! followed by a linear interpolation.

use crate::{ForceError, Result};
use serde::{Deserialize, Serialize};

/// Function sampled at strictly increasing, possibly non-uniform, points
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sampled {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Sampled {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        let sampled = Self { x, y };
        sampled.validate()?;
        Ok(sampled)
    }

    /// Sample `f` at the given points
    pub fn from_fn(x: impl IntoIterator<Item = f64>, f: impl Fn(f64) -> f64) -> Self {
        let x: Vec<f64> = x.into_iter().collect();
        let y = x.iter().copied().map(f).collect();
        Self { x, y }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    fn validate(&self) -> Result<()> {
        if self.x.len() != self.y.len() {
            return Err(ForceError::config(format!(
                "sampled function has {} abscissae but {} values",
                self.x.len(),
                self.y.len()
            )));
        }
        if self.x.is_empty() {
            return Err(ForceError::config("sampled function is empty"));
        }
        if self.x.windows(2).any(|w| w[1] <= w[0]) {
            return Err(ForceError::config(
                "sample points must be strictly increasing",
            ));
        }
        Ok(())
    }

    /// Piecewise-linear interpolation, holding the end values outside the
    /// sampled range
    pub fn interpolate(&self, x: f64) -> f64 {
        let n = self.x.len();
        if x <= self.x[0] {
            return self.y[0];
        }
        if x >= self.x[n - 1] {
            return self.y[n - 1];
        }
        let hi = self.x.partition_point(|&xi| xi <= x);
        let lo = hi - 1;
        let t = (x - self.x[lo]) / (self.x[hi] - self.x[lo]);
        self.y[lo] + t * (self.y[hi] - self.y[lo])
    }
}

/// Set of uniformly sampled tables with value and derivative arrays.
///
/// Table `t` occupies `values[t * n..(t + 1) * n]` and likewise for
/// `derivs`. The domain of every table is `[0, n·dx)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableSet {
    n_tables: usize,
    n: usize,
    dx: f64,
    rdx: f64,
    values: Vec<f64>,
    derivs: Vec<f64>,
}

impl TableSet {
    /// Resample `inputs` onto `n` points with spacing `dx`.
    ///
    /// Derivatives are central differences of the resampled values, with
    /// one-sided differences at the first and last sample.
    pub fn build(inputs: &[Sampled], n: usize, dx: f64) -> Result<Self> {
        if n < 2 {
            return Err(ForceError::config(format!(
                "table needs at least two samples, got {n}"
            )));
        }
        if !(dx.is_finite() && dx > 0.0) {
            return Err(ForceError::config(format!("invalid table spacing {dx}")));
        }
        let mut values = Vec::with_capacity(inputs.len() * n);
        let mut derivs = Vec::with_capacity(inputs.len() * n);
        for input in inputs {
            input.validate()?;
            let v: Vec<f64> = (0..n).map(|k| input.interpolate(k as f64 * dx)).collect();
            derivs.extend((0..n).map(|k| match k {
                0 => (v[1] - v[0]) / dx,
                k if k == n - 1 => (v[k] - v[k - 1]) / dx,
                k => (v[k + 1] - v[k - 1]) / (2.0 * dx),
            }));
            values.extend(v);
        }
        debug!(
            "built {} lookup table(s) with {n} samples, dx = {dx}",
            inputs.len()
        );
        Ok(Self {
            n_tables: inputs.len(),
            n,
            dx,
            rdx: dx.recip(),
            values,
            derivs,
        })
    }

    pub fn n_tables(&self) -> usize {
        self.n_tables
    }

    /// Samples per table
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n_tables == 0
    }

    pub fn dx(&self) -> f64 {
        self.dx
    }

    /// Precomputed `1 / dx`
    pub fn rdx(&self) -> f64 {
        self.rdx
    }

    /// Upper, exclusive, bound of the domain
    pub fn x_max(&self) -> f64 {
        self.n as f64 * self.dx
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn derivs(&self) -> &[f64] {
        &self.derivs
    }

    /// Value and derivative of table `table` at `x`.
    ///
    /// Both are interpolated linearly between the two enclosing samples.
    /// In the last interval there is no upper sample and the value is
    /// extended with the stored derivative instead.
    #[inline]
    pub fn lookup(&self, table: usize, x: f64) -> Result<(f64, f64)> {
        if table >= self.n_tables {
            return Err(ForceError::InvalidType {
                kind: "table",
                type_id: table,
                action: "looking up values".into(),
                name: "table set".into(),
            });
        }
        // negated comparison also rejects NaN
        if !(x >= 0.0 && x < self.x_max()) {
            return Err(ForceError::TableOutOfRange {
                x,
                x_max: self.x_max(),
            });
        }
        let position = x * self.rdx;
        let i = (position as usize).min(self.n - 1);
        let frac = position - i as f64;
        let base = table * self.n + i;
        let (v0, d0) = (self.values[base], self.derivs[base]);
        if i + 1 < self.n {
            let (v1, d1) = (self.values[base + 1], self.derivs[base + 1]);
            Ok((v0 + frac * (v1 - v0), d0 + frac * (d1 - d0)))
        } else {
            Ok((v0 + d0 * frac * self.dx, d0))
        }
    }

    /// Interleaved `(value, derivative)` pairs in single precision for
    /// device upload
    pub fn interleaved_f32(&self) -> Vec<[f32; 2]> {
        self.values
            .iter()
            .zip(&self.derivs)
            .map(|(&v, &d)| [v as f32, d as f32])
            .collect()
    }
}
