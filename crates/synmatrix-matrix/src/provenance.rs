// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Non-fatal generation diagnostics, batched per edge.

use serde::{Deserialize, Serialize};

use crate::graph::Placement;
use crate::planner::BlockEncoding;
use crate::types::MatrixResult;

/// Diagnostics for one projection over one machine edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeProvenance {
    pub placement: Placement,
    pub projection: String,
    pub pre_vertex: u32,
    pub encoding: BlockEncoding,
    /// Connections encoded on the host; zero for expanded blocks
    pub n_connections: usize,
    pub delays_clipped: u64,
    pub weights_saturated: u64,
}

/// Diagnostics accumulated across generation passes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynapticProvenance {
    pub edges: Vec<EdgeProvenance>,
}

impl SynapticProvenance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edge: EdgeProvenance) {
        self.edges.push(edge);
    }

    pub fn extend(&mut self, other: SynapticProvenance) {
        self.edges.extend(other.edges);
    }

    pub fn total_delays_clipped(&self) -> u64 {
        self.edges.iter().map(|e| e.delays_clipped).sum()
    }

    pub fn total_weights_saturated(&self) -> u64 {
        self.edges.iter().map(|e| e.weights_saturated).sum()
    }

    pub fn n_generated_on_machine(&self) -> usize {
        self.edges
            .iter()
            .filter(|e| e.encoding == BlockEncoding::OnMachine)
            .count()
    }

    /// Pretty-printed JSON report
    pub fn to_json(&self) -> MatrixResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(encoding: BlockEncoding, clipped: u64, saturated: u64) -> EdgeProvenance {
        EdgeProvenance {
            placement: Placement::new(0, 0, 1),
            projection: "a->b".to_string(),
            pre_vertex: 7,
            encoding,
            n_connections: 10,
            delays_clipped: clipped,
            weights_saturated: saturated,
        }
    }

    #[test]
    fn test_totals() {
        let mut provenance = SynapticProvenance::new();
        provenance.push(edge(BlockEncoding::Host, 3, 1));
        provenance.push(edge(BlockEncoding::OnMachine, 0, 0));
        let mut other = SynapticProvenance::new();
        other.push(edge(BlockEncoding::Direct, 2, 0));
        provenance.extend(other);

        assert_eq!(provenance.total_delays_clipped(), 5);
        assert_eq!(provenance.total_weights_saturated(), 1);
        assert_eq!(provenance.n_generated_on_machine(), 1);
    }

    #[test]
    fn test_json_report() {
        let mut provenance = SynapticProvenance::new();
        provenance.push(edge(BlockEncoding::Host, 3, 1));
        let json = provenance.to_json().unwrap();
        assert!(json.contains("\"delays_clipped\": 3"));
        let parsed: SynapticProvenance = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, provenance);
    }
}
