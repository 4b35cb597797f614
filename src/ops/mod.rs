// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the MIND project (Machine Intelligence Native Design).

//! Source operator identifiers and the conversion rule registry.

pub mod aten;
pub mod registry;

pub use registry::{
    default_registry, Arity, CapabilityFn, ConversionCtx, ConversionRule, ConvertFn, OpSignature,
    Registry,
};

use std::borrow::Borrow;
use std::fmt;

use serde::Deserialize;

/// Fully qualified source op name including its overload, e.g.
/// `aten.tanh.default`. Distinct overloads are distinct ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(transparent)]
pub struct OpId(String);

impl OpId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OpId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for OpId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&OpId> for OpId {
    fn from(op: &OpId) -> Self {
        op.clone()
    }
}

impl Borrow<str> for OpId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for OpId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for OpId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
