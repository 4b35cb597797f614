// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Shape ranges for static and dynamic graph inputs.
//!
//! A [`ShapeRange`] bounds every dimension of a tensor with a
//! `(min, opt, max)` triple, the same three representative shapes an
//! inference engine uses to build an optimisation profile. Static
//! dimensions carry three equal values.

pub mod engine;

use std::fmt;
use std::str::FromStr;

/// Error type returned by the shape helpers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    RankMismatch {
        expected: usize,
        found: usize,
    },
    BroadcastIncompatible {
        lhs: ShapeRange,
        rhs: ShapeRange,
    },
    Parse(String),
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeError::RankMismatch { expected, found } => {
                write!(f, "expected rank {} but found {}", expected, found)
            }
            ShapeError::BroadcastIncompatible { lhs, rhs } => {
                write!(f, "cannot broadcast shape ranges {lhs} and {rhs}")
            }
            ShapeError::Parse(msg) => write!(f, "invalid shape spec: {msg}"),
        }
    }
}

impl std::error::Error for ShapeError {}

/// Upper bound of a dimension. `Unbounded` orders after every known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Extent {
    Known(usize),
    Unbounded,
}

impl Extent {
    pub fn known(self) -> Option<usize> {
        match self {
            Extent::Known(n) => Some(n),
            Extent::Unbounded => None,
        }
    }
}

impl From<usize> for Extent {
    fn from(n: usize) -> Self {
        Extent::Known(n)
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extent::Known(n) => write!(f, "{n}"),
            Extent::Unbounded => f.write_str("?"),
        }
    }
}

/// `(min, opt, max)` bounds of a single dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DimRange {
    pub min: usize,
    pub opt: usize,
    pub max: Extent,
}

impl DimRange {
    pub fn new(min: usize, opt: usize, max: usize) -> Self {
        Self {
            min,
            opt,
            max: Extent::Known(max),
        }
    }

    pub fn fixed(n: usize) -> Self {
        Self::new(n, n, n)
    }

    pub fn unbounded(min: usize, opt: usize) -> Self {
        Self {
            min,
            opt,
            max: Extent::Unbounded,
        }
    }

    pub fn is_static(&self) -> bool {
        self.min == self.opt && self.max == Extent::Known(self.min)
    }

    pub fn static_extent(&self) -> Option<usize> {
        self.is_static().then_some(self.min)
    }

    /// `min <= opt <= max`.
    pub fn is_ordered(&self) -> bool {
        self.min <= self.opt && Extent::Known(self.opt) <= self.max
    }

    pub fn contains(&self, n: usize) -> bool {
        self.min <= n && Extent::Known(n) <= self.max
    }
}

impl fmt::Display for DimRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.static_extent() {
            Some(n) => write!(f, "{n}"),
            None => write!(f, "{}:{}:{}", self.min, self.opt, self.max),
        }
    }
}

/// Per-dimension bounds for a whole tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ShapeRange {
    dims: Vec<DimRange>,
}

impl ShapeRange {
    pub fn new(dims: Vec<DimRange>) -> Self {
        Self { dims }
    }

    pub fn from_static(shape: &[usize]) -> Self {
        Self::new(shape.iter().copied().map(DimRange::fixed).collect())
    }

    /// Zip three representative shapes into a range. The tuples must share
    /// one rank; ordering is checked separately by the caller.
    pub fn from_bounds(min: &[usize], opt: &[usize], max: &[usize]) -> Result<Self, ShapeError> {
        for other in [opt.len(), max.len()] {
            if other != min.len() {
                return Err(ShapeError::RankMismatch {
                    expected: min.len(),
                    found: other,
                });
            }
        }
        let dims = min
            .iter()
            .zip(opt)
            .zip(max)
            .map(|((&lo, &o), &hi)| DimRange::new(lo, o, hi))
            .collect();
        Ok(Self::new(dims))
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[DimRange] {
        &self.dims
    }

    pub fn dim(&self, axis: usize) -> Option<&DimRange> {
        self.dims.get(axis)
    }

    pub fn is_static(&self) -> bool {
        self.dims.iter().all(DimRange::is_static)
    }

    pub fn is_dynamic(&self) -> bool {
        !self.is_static()
    }

    pub fn to_static(&self) -> Option<Vec<usize>> {
        self.dims.iter().map(DimRange::static_extent).collect()
    }

    pub fn min_shape(&self) -> Vec<usize> {
        self.dims.iter().map(|d| d.min).collect()
    }

    pub fn opt_shape(&self) -> Vec<usize> {
        self.dims.iter().map(|d| d.opt).collect()
    }

    pub fn max_shape(&self) -> Vec<Extent> {
        self.dims.iter().map(|d| d.max).collect()
    }

    /// Index of the first dimension violating `min <= opt <= max`.
    pub fn first_unordered(&self) -> Option<usize> {
        self.dims.iter().position(|d| !d.is_ordered())
    }
}

impl From<Vec<DimRange>> for ShapeRange {
    fn from(dims: Vec<DimRange>) -> Self {
        Self::new(dims)
    }
}

impl fmt::Display for ShapeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{dim}")?;
        }
        f.write_str("]")
    }
}

/// A declared input dimension as traced by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    Static(usize),
    /// Unknown until the engine's optimisation profile is chosen (`-1`).
    Dynamic,
}

impl Dim {
    /// Negative extents are dynamic, as in the tracer's `(-1, -1, -1)`.
    pub fn from_declared(extent: i64) -> Self {
        usize::try_from(extent).map_or(Dim::Dynamic, Dim::Static)
    }

    pub fn is_dynamic(self) -> bool {
        matches!(self, Dim::Dynamic)
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Static(n) => write!(f, "{n}"),
            Dim::Dynamic => f.write_str("-1"),
        }
    }
}

/// Shape specification supplied for one graph input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSpec {
    /// One concrete shape.
    Static(Vec<usize>),
    /// Three representative shapes: `(min, opt, max)`.
    Dynamic {
        min: Vec<usize>,
        opt: Vec<usize>,
        max: Vec<usize>,
    },
    /// A prebuilt range, the only way to express an unbounded maximum.
    Range(ShapeRange),
}

impl InputSpec {
    pub fn fixed(shape: impl Into<Vec<usize>>) -> Self {
        InputSpec::Static(shape.into())
    }

    pub fn dynamic(
        min: impl Into<Vec<usize>>,
        opt: impl Into<Vec<usize>>,
        max: impl Into<Vec<usize>>,
    ) -> Self {
        InputSpec::Dynamic {
            min: min.into(),
            opt: opt.into(),
            max: max.into(),
        }
    }

    /// Rank of the spec. Fails when the three tuples of a dynamic spec
    /// disagree, reporting the first tuple that differs from `min`.
    pub fn rank(&self) -> Result<usize, ShapeError> {
        match self {
            InputSpec::Static(shape) => Ok(shape.len()),
            InputSpec::Dynamic { min, opt, max } => {
                for other in [opt.len(), max.len()] {
                    if other != min.len() {
                        return Err(ShapeError::RankMismatch {
                            expected: min.len(),
                            found: other,
                        });
                    }
                }
                Ok(min.len())
            }
            InputSpec::Range(range) => Ok(range.rank()),
        }
    }

    pub fn to_range(&self) -> Result<ShapeRange, ShapeError> {
        match self {
            InputSpec::Static(shape) => Ok(ShapeRange::from_static(shape)),
            InputSpec::Dynamic { min, opt, max } => ShapeRange::from_bounds(min, opt, max),
            InputSpec::Range(range) => Ok(range.clone()),
        }
    }
}

impl From<ShapeRange> for InputSpec {
    fn from(range: ShapeRange) -> Self {
        InputSpec::Range(range)
    }
}

fn parse_tuple(raw: &str) -> Result<Vec<Extent>, ShapeError> {
    let raw = raw.trim().trim_start_matches('(').trim_end_matches(')');
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    raw.split(|c: char| c == ',' || c == 'x')
        .map(str::trim)
        .filter(|tok| !tok.is_empty())
        .map(|tok| {
            if tok == "?" {
                Ok(Extent::Unbounded)
            } else {
                tok.parse::<usize>()
                    .map(Extent::Known)
                    .map_err(|_| ShapeError::Parse(format!("bad extent '{tok}'")))
            }
        })
        .collect()
}

fn known_tuple(tuple: Vec<Extent>, which: &str) -> Result<Vec<usize>, ShapeError> {
    tuple
        .into_iter()
        .map(|e| {
            e.known()
                .ok_or_else(|| ShapeError::Parse(format!("'?' is only allowed in the {which} shape")))
        })
        .collect()
}

/// Parses `1,10` as a static shape and `1,1,1:1,2,3:3,3,3` as a
/// `min:opt:max` range. `?` in the max tuple means unbounded.
impl FromStr for InputSpec {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [shape] => Ok(InputSpec::Static(known_tuple(parse_tuple(shape)?, "max")?)),
            [min, opt, max] => {
                let min = known_tuple(parse_tuple(min)?, "max")?;
                let opt = known_tuple(parse_tuple(opt)?, "max")?;
                let max = parse_tuple(max)?;
                if max.iter().all(|e| e.known().is_some()) {
                    let max = known_tuple(max, "max")?;
                    return Ok(InputSpec::Dynamic { min, opt, max });
                }
                if min.len() != opt.len() || min.len() != max.len() {
                    return Err(ShapeError::RankMismatch {
                        expected: min.len(),
                        found: if opt.len() != min.len() { opt.len() } else { max.len() },
                    });
                }
                let dims = min
                    .iter()
                    .zip(&opt)
                    .zip(&max)
                    .map(|((&lo, &o), &hi)| DimRange { min: lo, opt: o, max: hi })
                    .collect();
                Ok(InputSpec::Range(ShapeRange::new(dims)))
            }
            _ => Err(ShapeError::Parse(format!(
                "expected `shape` or `min:opt:max`, got '{s}'"
            ))),
        }
    }
}
