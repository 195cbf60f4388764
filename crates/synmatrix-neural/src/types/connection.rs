// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Connection tuple produced by connectors and recovered by row decoding

/// One synapse between a pre-synaptic and a post-synaptic neuron
///
/// `source` and `target` are population-level neuron indices, `weight` is in
/// model units and `delay` in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionTuple {
    pub source: u32,
    pub target: u16,
    pub weight: f64,
    pub delay: f64,
    pub synapse_type: u8,
}

impl ConnectionTuple {
    #[inline]
    pub fn new(source: u32, target: u16, weight: f64, delay: f64, synapse_type: u8) -> Self {
        Self {
            source,
            target,
            weight,
            delay,
            synapse_type,
        }
    }

    /// Sort key used when grouping connections into rows
    #[inline]
    pub fn row_key(&self) -> (u32, u16) {
        (self.source, self.target)
    }
}

/// Sort connections by source then target, the order rows are written in
pub fn sort_by_row(connections: &mut [ConnectionTuple]) {
    connections.sort_by_key(ConnectionTuple::row_key);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_by_row() {
        let mut conns = vec![
            ConnectionTuple::new(2, 0, 1.0, 1.0, 0),
            ConnectionTuple::new(0, 5, 1.0, 1.0, 0),
            ConnectionTuple::new(0, 1, 1.0, 1.0, 1),
        ];
        sort_by_row(&mut conns);
        let keys: Vec<_> = conns.iter().map(|c| c.row_key()).collect();
        assert_eq!(keys, vec![(0, 1), (0, 5), (2, 0)]);
    }
}
