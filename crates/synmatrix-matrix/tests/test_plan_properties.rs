// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// Layout properties over random populations and slicings
///
/// Irregular rows come from seeded random connection lists; every plan must
/// keep indirect blocks aligned and disjoint, the direct block within its
/// limit, and every generated row within the capacity it was planned for.
use std::sync::Arc;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use synmatrix_config::SynmatrixConfig;
use synmatrix_connectivity::{FromListConnector, ListEntry, OneToOneConnector, PopulationDescriptor, SynapseInfo};
use synmatrix_matrix::{
    BlockEncoding, KeyAndMask, Placement, PreVertex, ProjectionEdge, RoutingTable, SynapticManager, SynapticPlan,
};
use synmatrix_neural::VertexSlice;
use synmatrix_serialization::{DataRegion, MemoryDataSpec};

const MIRROR_BASE: u32 = 1000;

fn random_entries(seed: u64, n_pre: u32, n_post: u32, n_entries: usize) -> Vec<ListEntry> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n_entries)
        .map(|_| {
            let delay = rng.gen_range(1..=40) as f64;
            ListEntry::with_values(rng.gen_range(0..n_pre), rng.gen_range(0..n_post), 0.5, delay)
        })
        .collect()
}

fn edges(
    listed: &Arc<SynapseInfo>,
    mirrored: &Arc<SynapseInfo>,
    list_slices: &[VertexSlice],
    mirror_slices: &[VertexSlice],
) -> Vec<ProjectionEdge> {
    let list = list_slices
        .iter()
        .enumerate()
        .map(|(i, s)| ProjectionEdge::single(PreVertex::new(i as u32 + 1, *s), listed.clone()));
    let mirror = mirror_slices
        .iter()
        .enumerate()
        .map(|(i, s)| ProjectionEdge::single(PreVertex::new(MIRROR_BASE + i as u32, *s), mirrored.clone()));
    list.chain(mirror).collect()
}

fn routing(edges: &[ProjectionEdge]) -> RoutingTable {
    let mut routing = RoutingTable::new();
    for id in edges.iter().map(|e| e.pre_vertex.id) {
        routing.insert(id, KeyAndMask::new(id << 16, 0xFFFF_0000));
        routing.insert_delay(id, KeyAndMask::new(0x8000_0000 | id << 16, 0xFFFF_0000));
    }
    routing
}

fn check_layout(plan: &SynapticPlan, granularity: u32, max_direct: usize) -> Result<(), TestCaseError> {
    prop_assert!(plan.direct_bytes <= max_direct);
    prop_assert_eq!(plan.sizes.synaptic_matrix, 4 + plan.direct_bytes + plan.indirect_bytes);

    let mut spans: Vec<(usize, usize)> = plan
        .blocks
        .iter()
        .filter(|b| b.encoding != BlockEncoding::Direct)
        .flat_map(|b| [b.undelayed, b.delayed])
        .flatten()
        .map(|rows| (rows.address as usize, rows.n_bytes()))
        .collect();
    spans.sort();
    for (address, _) in &spans {
        prop_assert_eq!(*address % granularity as usize, 0);
    }
    for pair in spans.windows(2) {
        prop_assert!(pair[0].0 + pair[0].1 <= pair[1].0);
    }
    if let Some((address, n_bytes)) = spans.last() {
        prop_assert!(address + n_bytes <= plan.indirect_bytes);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_plans_fit_what_is_written(
        n_pre in 1u32..120,
        n_post in 1u32..200,
        pre_per_core in 1u32..64,
        post_per_core in 1u32..128,
        n_entries in 0usize..600,
        seed in any::<u64>(),
    ) {
        let mut config = SynmatrixConfig::default();
        config.synapses.generate_on_machine = false;
        let granularity = config.population_table.address_granularity_bytes;
        let max_direct = config.synapses.max_direct_matrix_bytes;

        let post = Arc::new(PopulationDescriptor::new("post", n_post));
        let entries = random_entries(seed, n_pre, n_post, n_entries);
        let listed = Arc::new(SynapseInfo::new(
            "listed",
            Arc::new(PopulationDescriptor::new("source", n_pre)),
            post.clone(),
            Arc::new(FromListConnector::new(entries.clone())),
        ));
        let mirrored = Arc::new(SynapseInfo::new(
            "mirrored",
            Arc::new(PopulationDescriptor::new("mirror", n_post)),
            post,
            Arc::new(OneToOneConnector::new()),
        ));
        let list_slices = VertexSlice::split(n_pre, pre_per_core).unwrap();
        let mirror_slices = VertexSlice::split(n_post, pre_per_core).unwrap();
        let edges = edges(&listed, &mirrored, &list_slices, &mirror_slices);
        let routing = routing(&edges);

        let mut manager = SynapticManager::new("post", 2, &config)
            .unwrap()
            .with_projections([listed.clone(), mirrored.clone()]);
        let mut n_read_back = 0;
        for (core, post_slice) in VertexSlice::split(n_post, post_per_core).unwrap().iter().enumerate() {
            let plan = manager.plan(post_slice, &edges).unwrap();
            check_layout(&plan, granularity, max_direct)?;
            let estimate = manager.get_sdram_usage_for_atoms(post_slice, &edges).unwrap();

            let placement = Placement::new(0, 0, core as u32 + 1);
            let mut spec = MemoryDataSpec::new();
            manager.write_data_spec(&mut spec, placement, post_slice, &edges, &routing).unwrap();
            let regions = spec.into_regions();
            let written: usize = regions.values().map(|bytes| bytes.len()).sum();
            prop_assert!(written <= estimate);
            prop_assert_eq!(regions[&DataRegion::SynapticMatrix.id()].len(), plan.sizes.synaptic_matrix);

            for edge in edges.iter().filter(|e| e.pre_vertex.id < MIRROR_BASE) {
                n_read_back += manager
                    .get_connections_from_machine(placement, edge, &listed, &regions)
                    .unwrap()
                    .len();
            }
        }
        prop_assert_eq!(n_read_back, entries.len());
    }
}
