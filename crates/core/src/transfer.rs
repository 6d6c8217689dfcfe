//! Transfer insights between algorithms.

use serde::{Deserialize, Serialize};

use crate::id::AlgorithmId;

/// A capability one algorithm could lend another.
///
/// Recomputed on each transfer pass; only applied insights leave a trace in
/// the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferInsight {
    /// Algorithm the capability comes from
    pub source_algorithm: AlgorithmId,
    /// Algorithm that would receive it
    pub target_algorithm: AlgorithmId,
    /// Likelihood the transfer helps, in [0, 1]
    pub transfer_potential: f64,
    /// Traits both algorithms share
    pub shared_patterns: Vec<String>,
    /// Parameters or components that can be copied over
    pub transferable_capabilities: Vec<String>,
    /// Expected relative improvement for the target, in [0, 1]
    pub expected_improvement: f64,
    /// Effort estimate, in [0, 1]
    pub implementation_complexity: f64,
}

impl TransferInsight {
    /// Stable key identifying this insight for idempotent application.
    pub fn key(&self) -> String {
        let mut capabilities = self.transferable_capabilities.clone();
        capabilities.sort();
        format!(
            "{}->{}:{}",
            self.source_algorithm,
            self.target_algorithm,
            capabilities.join(",")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ignores_capability_order() {
        let mut insight = TransferInsight {
            source_algorithm: "a".into(),
            target_algorithm: "b".into(),
            transfer_potential: 0.8,
            shared_patterns: vec![],
            transferable_capabilities: vec!["y".into(), "x".into()],
            expected_improvement: 0.1,
            implementation_complexity: 0.2,
        };
        let key = insight.key();
        insight.transferable_capabilities.reverse();
        assert_eq!(insight.key(), key);
        assert_eq!(key, "a->b:x,y");
    }
}
