//! Identifiers for registry entities.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifier of an optimizable algorithm (e.g. `"genetic_algorithm"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlgorithmId(pub String);

impl AlgorithmId {
    /// Create a new algorithm ID.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the underlying name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AlgorithmId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AlgorithmId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of one configuration version of an algorithm.
///
/// Versions are the nodes of the evolution lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionId(Ulid);

impl VersionId {
    /// Generate a new VersionId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for VersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for VersionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Unique identifier for an EvolutionRecord
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvolutionId(Ulid);

impl EvolutionId {
    /// Generate a new EvolutionId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for EvolutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EvolutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
