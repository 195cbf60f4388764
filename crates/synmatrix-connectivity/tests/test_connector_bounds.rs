// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// Connector contract tests
///
/// Every connector must stay within the bounds it declares, for every slice
/// pair a partitioner could produce.
use std::sync::Arc;

use proptest::prelude::*;
use synmatrix_connectivity::{
    AllToAllConnector, Connector, FixedProbabilityConnector, FromListConnector, GenerationContext, ListEntry,
    OneToOneConnector, ParameterSpec, PopulationDescriptor, RandomDistribution, SynapseInfo,
};
use synmatrix_neural::VertexSlice;

fn projection(n_pre: u32, n_post: u32, connector: Arc<dyn Connector>) -> SynapseInfo {
    SynapseInfo::new(
        "pre->post",
        Arc::new(PopulationDescriptor::new("pre", n_pre)),
        Arc::new(PopulationDescriptor::new("post", n_post)),
        connector,
    )
}

/// Check the per-source bound for every slice pair of the partitions
fn assert_within_bounds(info: &SynapseInfo, pre_per_core: u32, post_per_core: u32) -> Result<(), TestCaseError> {
    let ctx = GenerationContext::new(1.0, 16.0);
    let pre_slices = VertexSlice::split(info.pre().n_atoms, pre_per_core).unwrap();
    let post_slices = VertexSlice::split(info.post().n_atoms, post_per_core).unwrap();
    let mut to_post = vec![0usize; info.post().n_atoms as usize];

    for post in &post_slices {
        let bound = info.connector().max_connections_from_pre_vertex(info, post, None, None);
        for pre in &pre_slices {
            let conns = info.connector().generate(info, pre, post, &ctx).unwrap();
            prop_assert!(conns.len() <= bound * pre.n_atoms() as usize);

            let mut per_source = vec![0usize; pre.n_atoms() as usize];
            for c in &conns {
                prop_assert!(pre.contains(c.source));
                prop_assert!(post.contains(c.target as u32));
                per_source[(c.source - pre.lo_atom()) as usize] += 1;
                to_post[c.target as usize] += 1;
            }
            prop_assert!(per_source.iter().all(|n| *n <= bound));
        }
    }

    let post_bound = info.connector().max_connections_to_post_vertex(info);
    prop_assert!(to_post.iter().all(|n| *n <= post_bound));
    Ok(())
}

// ============================================================================
// Upper bound property
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_all_to_all_within_bounds(
        n_pre in 1u32..60,
        n_post in 1u32..60,
        pre_per_core in 1u32..32,
        post_per_core in 1u32..32,
    ) {
        let info = projection(n_pre, n_post, Arc::new(AllToAllConnector::new(true)));
        assert_within_bounds(&info, pre_per_core, post_per_core)?;
    }

    #[test]
    fn prop_one_to_one_within_bounds(n in 1u32..80, pre_per_core in 1u32..32, post_per_core in 1u32..32) {
        let info = projection(n, n, Arc::new(OneToOneConnector::new()));
        assert_within_bounds(&info, pre_per_core, post_per_core)?;
    }

    #[test]
    fn prop_fixed_probability_within_bounds(
        n_pre in 1u32..60,
        n_post in 1u32..60,
        p in 0.0f64..=1.0,
        seed in any::<u64>(),
        post_per_core in 1u32..32,
    ) {
        let connector = FixedProbabilityConnector::new(p, false).unwrap().with_seed(seed);
        let info = projection(n_pre, n_post, Arc::new(connector));
        assert_within_bounds(&info, 16, post_per_core)?;
    }

    #[test]
    fn prop_from_list_within_bounds(
        pairs in proptest::collection::vec((0u32..30, 0u32..30), 0..200),
        post_per_core in 1u32..16,
    ) {
        let entries = pairs.into_iter().map(|(s, t)| ListEntry::new(s, t)).collect();
        let info = projection(30, 30, Arc::new(FromListConnector::new(entries)));
        assert_within_bounds(&info, 8, post_per_core)?;
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_self_exclusion_count() {
    let n = 40;
    let pop = Arc::new(PopulationDescriptor::new("pop", n));
    let info = SynapseInfo::new("pop->pop", pop.clone(), pop, Arc::new(AllToAllConnector::new(false)));
    let ctx = GenerationContext::new(1.0, 16.0);

    let mut total = 0;
    for pre in VertexSlice::split(n, 16).unwrap() {
        for post in VertexSlice::split(n, 12).unwrap() {
            let conns = info.connector().generate(&info, &pre, &post, &ctx).unwrap();
            assert!(conns.iter().all(|c| c.source != c.target as u32));
            total += conns.len();
        }
    }
    assert_eq!(total, (n * (n - 1)) as usize);
}

#[test]
fn test_delay_clipping_scenario() {
    let info = projection(10, 10, Arc::new(OneToOneConnector::new())).with_delays(0.2);
    let slice = VertexSlice::whole(10).unwrap();
    let ctx = GenerationContext::new(1.0, 16.0);

    let conns = info.connector().generate(&info, &slice, &slice, &ctx).unwrap();
    assert_eq!(conns.len(), 10);
    assert!(conns.iter().all(|c| c.delay == 1.0));
    assert_eq!(info.connector().delays_clipped(), 10);
}

#[test]
fn test_random_delays_split_across_ranges() {
    let info = projection(50, 50, Arc::new(AllToAllConnector::new(true))).with_delays(ParameterSpec::Random(
        RandomDistribution::Uniform { low: 1.0, high: 30.0 },
    ));
    let post = VertexSlice::whole(50).unwrap();
    let connector = info.connector();

    let all = connector.max_connections_from_pre_vertex(&info, &post, None, None);
    let early = connector.max_connections_from_pre_vertex(&info, &post, None, Some(16.5));
    let late = connector.max_connections_from_pre_vertex(&info, &post, Some(16.5), None);
    assert_eq!(all, 50);
    assert!(early < 50 && late < 50);
    assert!(early + late >= all);
}
