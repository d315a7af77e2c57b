//! Tape sizing configuration.

/// Initial capacities for a [`Tape`](crate::reverse::Tape).
///
/// Capacity is only a starting point: the tape grows on demand and keeps
/// its high-water capacity across recoveries until [`free_all`] is called.
///
/// [`free_all`]: crate::reverse::free_all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapeConfig {
    /// Number of nodes to reserve.
    pub node_capacity: usize,
    /// Number of auxiliary `f64` slots to reserve.
    pub aux_value_capacity: usize,
    /// Number of auxiliary node-reference slots to reserve.
    pub aux_id_capacity: usize,
}

impl TapeConfig {
    /// Configuration that reserves nothing up front.
    pub const fn empty() -> Self {
        Self {
            node_capacity: 0,
            aux_value_capacity: 0,
            aux_id_capacity: 0,
        }
    }

    pub fn with_node_capacity(mut self, node_capacity: usize) -> Self {
        self.node_capacity = node_capacity;
        self
    }

    pub fn with_aux_value_capacity(mut self, aux_value_capacity: usize) -> Self {
        self.aux_value_capacity = aux_value_capacity;
        self
    }

    pub fn with_aux_id_capacity(mut self, aux_id_capacity: usize) -> Self {
        self.aux_id_capacity = aux_id_capacity;
        self
    }
}

impl Default for TapeConfig {
    fn default() -> Self {
        Self {
            node_capacity: 1 << 12,
            aux_value_capacity: 1 << 10,
            aux_id_capacity: 1 << 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = TapeConfig::empty()
            .with_node_capacity(10)
            .with_aux_value_capacity(20)
            .with_aux_id_capacity(30);
        assert_eq!(config.node_capacity, 10);
        assert_eq!(config.aux_value_capacity, 20);
        assert_eq!(config.aux_id_capacity, 30);
    }

    #[test]
    fn test_default_reserves() {
        let config = TapeConfig::default();
        assert!(config.node_capacity > 0);
        assert_ne!(config, TapeConfig::empty());
    }
}
