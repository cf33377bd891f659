//! Resource limits applied to sandboxed component execution.

/// Execution budgets for one component instantiation.
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    /// Interpreter fuel budget per render (prevents infinite loops).
    pub fuel_per_render: u64,
    /// Maximum script call depth (prevents runaway recursion).
    pub max_call_depth: usize,
    /// Maximum nodes in one rendered UI tree.
    pub max_tree_nodes: usize,
    /// Timeout per scoped API request in milliseconds.
    pub request_timeout_ms: u64,
}

impl SandboxLimits {
    pub fn first_party() -> Self {
        Self {
            fuel_per_render: 1_000_000,
            max_call_depth: 64,
            max_tree_nodes: 50_000,
            request_timeout_ms: 10_000,
        }
    }

    pub fn third_party() -> Self {
        Self {
            fuel_per_render: 250_000,
            max_call_depth: 32,
            max_tree_nodes: 10_000,
            request_timeout_ms: 5_000,
        }
    }
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self::third_party()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn third_party_tier_is_strictly_tighter() {
        let first = SandboxLimits::first_party();
        let third = SandboxLimits::third_party();
        assert!(third.fuel_per_render < first.fuel_per_render);
        assert!(third.max_call_depth < first.max_call_depth);
        assert!(third.max_tree_nodes < first.max_tree_nodes);
        assert!(third.request_timeout_ms < first.request_timeout_ms);
    }

    #[test]
    fn default_is_the_untrusted_tier() {
        assert_eq!(
            SandboxLimits::default().fuel_per_render,
            SandboxLimits::third_party().fuel_per_render
        );
    }
}
