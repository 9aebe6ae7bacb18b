//! AnalysisPolicy v1: rank, top-k, clustering and layout parameters.
//!
//! ## Float Normalization for Deterministic Hashing
//!
//! Floats are quantized to integers before hashing to avoid cross-platform
//! serialization differences. The quantization factor is 1e6 (multiply by
//! 1,000,000 and round to i64), see [`quantize`].

use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_hash_hex, quantize};
use crate::centrality::RankPolicy;
use crate::layout::LayoutConfig;
use crate::DEFAULT_POLICY_VERSION;

/// Quantized layout parameters for deterministic hashing.
#[derive(Debug, Clone, Serialize)]
struct QuantizedLayout {
    iterations: u32,
    spring_length: i64,
    repulsion: i64,
    initial_step: i64,
    cooling_factor: i64,
    convergence_threshold: i64,
    seed: u64,
}

/// Quantized policy parameters for deterministic hashing.
///
/// All floats are quantized to i64 to ensure cross-platform consistency.
#[derive(Debug, Clone, Serialize)]
struct QuantizedPolicyParams {
    version: String,
    damping: i64,
    max_iterations: usize,
    tolerance: i64,
    top_k: usize,
    min_cluster_size: usize,
    layout: QuantizedLayout,
}

/// Analysis policy version 1.
///
/// ## Parameters
///
/// - `damping`: random-walk continuation probability for rank
/// - `max_iterations` / `tolerance`: power-iteration stop rule
/// - `top_k`: rank-history width per period
/// - `min_cluster_size`: clusters smaller than this render as "other"
/// - `layout`: force simulation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPolicyV1 {
    /// Policy version identifier.
    pub version: String,
    /// Rank damping factor (0.0-1.0).
    pub damping: f64,
    /// Power-iteration cap.
    pub max_iterations: usize,
    /// L1 convergence tolerance.
    pub tolerance: f64,
    /// Entities tracked per period in rank histories.
    pub top_k: usize,
    /// Presentation threshold for cluster buckets.
    pub min_cluster_size: usize,
    /// Layout simulation parameters.
    #[serde(default)]
    pub layout: LayoutConfig,
}

impl AnalysisPolicyV1 {
    /// Create a policy with custom rank and cluster parameters.
    pub fn new(damping: f64, top_k: usize, min_cluster_size: usize, layout: LayoutConfig) -> Self {
        Self {
            damping: damping.clamp(0.0, 1.0),
            top_k,
            min_cluster_size,
            layout,
            ..Self::default()
        }
    }

    /// Get the policy ID.
    pub fn policy_id(&self) -> &str {
        &self.version
    }

    /// Rank parameters as consumed by [`crate::centrality::rank`].
    pub fn rank_policy(&self) -> RankPolicy {
        RankPolicy {
            damping: self.damping,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
        }
    }

    /// Compute a hash of the policy parameters.
    ///
    /// Uses quantized float representation so the value is stable across
    /// platforms and serde_json versions.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(&self.to_quantized())
    }

    fn to_quantized(&self) -> QuantizedPolicyParams {
        let layout = &self.layout;
        QuantizedPolicyParams {
            version: self.version.clone(),
            damping: quantize(self.damping),
            max_iterations: self.max_iterations,
            // 1e-10 would quantize to zero; hash the exponent-scaled value.
            tolerance: quantize(self.tolerance * 1e12),
            top_k: self.top_k,
            min_cluster_size: self.min_cluster_size,
            layout: QuantizedLayout {
                iterations: layout.iterations,
                spring_length: quantize(layout.spring_length),
                repulsion: quantize(layout.repulsion),
                initial_step: quantize(layout.initial_step),
                cooling_factor: quantize(layout.cooling_factor),
                convergence_threshold: quantize(layout.convergence_threshold * 1e6),
                seed: layout.seed,
            },
        }
    }
}

impl Default for AnalysisPolicyV1 {
    fn default() -> Self {
        Self {
            version: DEFAULT_POLICY_VERSION.to_string(),
            damping: 0.85,
            max_iterations: 100,
            tolerance: 1e-10,
            top_k: 10,
            min_cluster_size: 5,
            layout: LayoutConfig::default(),
        }
    }
}
