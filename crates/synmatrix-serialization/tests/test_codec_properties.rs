// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Property tests for row encoding and population table alignment

use proptest::prelude::*;
use synmatrix_neural::{ConnectionTuple, StdpDynamics, SynapseDynamics, SynapseRowFormat, VertexSlice};
use synmatrix_serialization::{
    decode_row, encode_row, words_to_bytes, MasterPopTableBuilder, MasterPopulationTable, RowContext,
};

// ============================================================================
// Row round trip
// ============================================================================

fn connection_strategy(post_lo: u32, n_post: u32) -> impl Strategy<Value = (u16, f64, u32, u8)> {
    (
        post_lo..post_lo + n_post,
        0.0f64..3.9,
        1u32..=16,
        0u8..2,
    )
        .prop_map(|(target, weight, ticks, synapse_type)| (target as u16, weight, ticks, synapse_type))
}

proptest! {
    #[test]
    fn prop_static_row_round_trip(
        synapses in prop::collection::vec(connection_strategy(256, 200), 0..64),
        source in 0u32..10_000,
        plastic in any::<bool>(),
    ) {
        let dynamics = if plastic {
            SynapseDynamics::Stdp(StdpDynamics { w_max: 4.0, ..StdpDynamics::default() })
        } else {
            SynapseDynamics::Static
        };
        let scales = [16384.0, 8192.0];
        let ctx = RowContext {
            format: SynapseRowFormat::new(2, 8, 4).unwrap(),
            dynamics: &dynamics,
            post_slice: VertexSlice::new(256, 455).unwrap(),
            weight_scales: &scales,
            timestep_ms: 0.5,
            delay_stage: 0,
        };
        let connections: Vec<ConnectionTuple> = synapses
            .iter()
            .map(|(target, weight, ticks, synapse_type)| {
                ConnectionTuple::new(source, *target, *weight, *ticks as f64 * 0.5, *synapse_type)
            })
            .collect();

        let row = encode_row(&connections, &ctx).unwrap();
        prop_assert_eq!(row.words.len(), dynamics.n_words_for_connections(connections.len()));
        prop_assert_eq!(row.n_saturated, 0);

        let (decoded, used) = decode_row(&row.words, source, &ctx).unwrap();
        prop_assert_eq!(used, row.words.len());
        prop_assert_eq!(decoded.len(), connections.len());
        for (original, back) in connections.iter().zip(&decoded) {
            prop_assert_eq!(original.source, back.source);
            prop_assert_eq!(original.target, back.target);
            prop_assert_eq!(original.synapse_type, back.synapse_type);
            prop_assert_eq!(original.delay, back.delay);
            let lsb = 1.0 / scales[original.synapse_type as usize];
            prop_assert!((original.weight - back.weight).abs() <= lsb);
        }
    }
}

// ============================================================================
// Population table
// ============================================================================

proptest! {
    #[test]
    fn prop_block_addresses_aligned(
        blocks in prop::collection::vec((1u32..64, 1u32..200), 1..20),
        granularity_log2 in 2u32..8,
    ) {
        let granularity = 1u32 << granularity_log2;
        let mut builder = MasterPopTableBuilder::new(granularity).unwrap();
        builder.begin();

        let mut cursor = 0u32;
        for (i, (row_words, n_rows)) in blocks.iter().enumerate() {
            let address = builder.next_aligned_address(cursor).unwrap();
            prop_assert_eq!(address % granularity, 0);
            prop_assert!(address >= cursor);
            builder.add_entry((i as u32) << 8, 0xFFFF_FF00, address, *row_words, false).unwrap();
            cursor = address + row_words * n_rows * 4;
        }

        let bytes = words_to_bytes(&builder.finish().unwrap());
        prop_assert_eq!(bytes.len(), builder.size_bytes());
        let table = MasterPopulationTable::from_bytes(&bytes, granularity).unwrap();
        for entry in table.entries() {
            for address in &entry.addresses {
                prop_assert_eq!(address.address % granularity, 0);
            }
        }
    }
}
