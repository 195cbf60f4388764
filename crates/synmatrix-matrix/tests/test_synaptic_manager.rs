// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// End-to-end generation tests
///
/// Each test runs full passes through `SynapticManager` into an in-memory
/// data spec and checks the bytes, the population table and read-back.
use std::sync::Arc;

use synmatrix_config::SynmatrixConfig;
use synmatrix_connectivity::{
    AllToAllConnector, Connector, FixedProbabilityConnector, GenerationContext, OneToOneConnector, ParameterSpec,
    PopulationDescriptor, RandomDistribution, SynapseInfo,
};
use synmatrix_matrix::structural::{pack_slot, unpack_slot};
use synmatrix_matrix::{
    BlockEncoding, KeyAndMask, MatrixError, Placement, PreVertex, ProjectionEdge, RegionMap, RoutingTable,
    SynapticManager,
};
use synmatrix_neural::{ConnectionTuple, StdpDynamics, StructuralDynamics, SynapseDynamics, VertexSlice};
use synmatrix_serialization::{bytes_to_words, DataRegion, MasterPopulationTable, MemoryDataSpec};

const PLACEMENT: Placement = Placement { x: 0, y: 0, p: 1 };

fn projection(label: &str, n_pre: u32, n_post: u32, connector: Arc<dyn Connector>) -> SynapseInfo {
    SynapseInfo::new(
        label,
        Arc::new(PopulationDescriptor::new("pre", n_pre)),
        Arc::new(PopulationDescriptor::new("post", n_post)),
        connector,
    )
}

fn routing(ids: &[u32]) -> RoutingTable {
    let mut routing = RoutingTable::new();
    for id in ids {
        routing.insert(*id, KeyAndMask::new(id << 16, 0xFFFF_0000));
        routing.insert_delay(*id, KeyAndMask::new(0x8000_0000 | id << 16, 0xFFFF_0000));
    }
    routing
}

fn host_only() -> SynmatrixConfig {
    let mut config = SynmatrixConfig::default();
    config.synapses.generate_on_machine = false;
    config
}

fn run(manager: &mut SynapticManager, post_slice: &VertexSlice, edges: &[ProjectionEdge]) -> RegionMap {
    let ids: Vec<u32> = edges.iter().map(|e| e.pre_vertex.id).collect();
    let mut spec = MemoryDataSpec::new();
    manager
        .write_data_spec(&mut spec, PLACEMENT, post_slice, edges, &routing(&ids))
        .unwrap();
    spec.into_regions()
}

fn sorted(mut conns: Vec<ConnectionTuple>) -> Vec<ConnectionTuple> {
    conns.sort_by(|a, b| (a.source, a.target).cmp(&(b.source, b.target)));
    conns
}

/// Read-back matches generation up to the fixed-point resolution of the weights
fn assert_same_connections(actual: &[ConnectionTuple], expected: &[ConnectionTuple], weight_scale: f64) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert_eq!((a.source, a.target, a.synapse_type), (e.source, e.target, e.synapse_type));
        assert_eq!(a.delay, e.delay);
        assert!((a.weight - e.weight).abs() <= 1.0 / weight_scale, "{} vs {}", a.weight, e.weight);
    }
}

#[test]
fn test_one_to_one_direct_rows() {
    let slice = VertexSlice::whole(50).unwrap();
    let info = Arc::new(projection("a->b", 50, 50, Arc::new(OneToOneConnector::new())).with_weights(0.75));
    let edges = vec![ProjectionEdge::single(PreVertex::new(1, slice), info.clone())];
    let mut manager = SynapticManager::new("b", 2, &SynmatrixConfig::default()).unwrap();
    let regions = run(&mut manager, &slice, &edges);

    let matrix = bytes_to_words(&regions[&DataRegion::SynapticMatrix.id()]).unwrap();
    assert_eq!(matrix.len(), 51);
    assert_eq!(matrix[0], 200);

    let table = MasterPopulationTable::from_bytes(&regions[&DataRegion::PopulationTable.id()], 16).unwrap();
    let entry = table.find_entry(1 << 16).unwrap();
    assert_eq!(entry.addresses.len(), 1);
    assert!(entry.addresses[0].is_single);

    let back = manager
        .get_connections_from_machine(PLACEMENT, &edges[0], &info, &regions)
        .unwrap();
    assert_eq!(back.len(), 50);
    assert!(back.iter().all(|c| c.source == c.target as u32 && c.delay == 1.0));
    assert!(back.iter().all(|c| (c.weight - 0.75).abs() < 1e-3));
    assert_eq!(manager.provenance().edges[0].encoding, BlockEncoding::Direct);
}

#[test]
fn test_host_rows_read_back() {
    let pre_slice = VertexSlice::new(0, 19).unwrap();
    let post_slice = VertexSlice::new(20, 39).unwrap();
    let info = Arc::new(
        projection("a->b", 20, 40, Arc::new(AllToAllConnector::new(true)))
            .with_weights(ParameterSpec::Random(RandomDistribution::Uniform { low: 0.1, high: 0.9 }))
            .with_delays(3.0)
            .with_synapse_type(1),
    );
    let edges = vec![ProjectionEdge::single(PreVertex::new(4, pre_slice), info.clone())];
    let mut manager = SynapticManager::new("b", 2, &host_only()).unwrap();
    let regions = run(&mut manager, &post_slice, &edges);

    let expected = info
        .connector()
        .generate(&info, &pre_slice, &post_slice, &GenerationContext::new(1.0, 3.0))
        .unwrap();
    let back = manager
        .get_connections_from_machine(PLACEMENT, &edges[0], &info, &regions)
        .unwrap();
    let scale = manager.reader().weight_scales(PLACEMENT).unwrap()[1];
    assert_same_connections(&sorted(back), &sorted(expected), scale);
}

#[test]
fn test_delayed_rows_read_back() {
    let slice = VertexSlice::whole(10).unwrap();
    let info = Arc::new(
        projection("a->b", 10, 10, Arc::new(AllToAllConnector::new(true)))
            .with_weights(0.5)
            .with_delays(ParameterSpec::Random(RandomDistribution::Uniform { low: 1.0, high: 40.0 })),
    );
    let edges = vec![ProjectionEdge::single(PreVertex::new(2, slice), info.clone())];
    let mut manager = SynapticManager::new("b", 1, &host_only()).unwrap();
    let regions = run(&mut manager, &slice, &edges);

    let table = MasterPopulationTable::from_bytes(&regions[&DataRegion::PopulationTable.id()], 16).unwrap();
    assert!(table.find_entry(2 << 16).is_some());
    assert!(table.find_entry(0x8000_0000 | 2 << 16).is_some());

    let back = manager
        .get_connections_from_machine(PLACEMENT, &edges[0], &info, &regions)
        .unwrap();
    assert_eq!(back.len(), 100);
    assert!(back.iter().all(|c| (1.0..=40.0).contains(&c.delay)));
    assert!(back.iter().any(|c| c.delay > 16.0));
}

#[test]
fn test_generation_is_deterministic() {
    let slice = VertexSlice::whole(30).unwrap();
    let info = Arc::new(projection(
        "a->b",
        30,
        30,
        Arc::new(FixedProbabilityConnector::new(0.2, false).unwrap().with_seed(17)),
    ));
    let edges = vec![ProjectionEdge::single(PreVertex::new(1, slice), info)];

    let mut first = SynapticManager::new("b", 2, &host_only()).unwrap();
    let mut second = SynapticManager::new("b", 2, &host_only()).unwrap();
    assert_eq!(run(&mut first, &slice, &edges), run(&mut second, &slice, &edges));
    // A repeated pass on the same manager writes the same bytes
    assert_eq!(run(&mut first, &slice, &edges), run(&mut second, &slice, &edges));
}

#[test]
fn test_indirect_blocks_are_aligned() {
    let slice = VertexSlice::whole(10).unwrap();
    let edges: Vec<ProjectionEdge> = (1..=3)
        .map(|id| {
            let info = projection("a->b", 10, 10, Arc::new(AllToAllConnector::new(true))).with_delays(id as f64 * 10.0);
            ProjectionEdge::single(PreVertex::new(id, slice), Arc::new(info))
        })
        .collect();
    let mut manager = SynapticManager::new("b", 2, &host_only()).unwrap();
    let regions = run(&mut manager, &slice, &edges);

    let table = MasterPopulationTable::from_bytes(&regions[&DataRegion::PopulationTable.id()], 16).unwrap();
    let addresses: Vec<_> = table.entries().iter().flat_map(|e| e.addresses.iter()).collect();
    assert_eq!(addresses.len(), 3);
    assert!(addresses.iter().all(|a| !a.is_single && a.address % 16 == 0));
}

#[test]
fn test_sdram_estimate_covers_written_regions() {
    let slice = VertexSlice::whole(20).unwrap();
    let info = Arc::new(projection("a->b", 20, 20, Arc::new(AllToAllConnector::new(false))).with_delays(20.0));
    let edges = vec![ProjectionEdge::single(PreVertex::new(1, slice), info)];
    let mut manager = SynapticManager::new("b", 2, &host_only()).unwrap();
    let estimate = manager.get_sdram_usage_for_atoms(&slice, &edges).unwrap();
    let regions = run(&mut manager, &slice, &edges);
    let written: usize = regions.values().map(|r| r.len()).sum();
    assert!(written <= estimate);
    assert_eq!(estimate, (written as f64 * 1.1).ceil() as usize);
}

#[test]
fn test_post_slice_over_capacity() {
    let slice = VertexSlice::whole(300).unwrap();
    let info = Arc::new(projection("a->b", 300, 300, Arc::new(OneToOneConnector::new())));
    let edges = vec![ProjectionEdge::single(PreVertex::new(1, slice), info)];
    let manager = SynapticManager::new("b", 2, &SynmatrixConfig::default()).unwrap();
    assert!(matches!(
        manager.get_sdram_usage_for_atoms(&slice, &edges),
        Err(MatrixError::Configuration(_))
    ));
}

#[test]
fn test_on_machine_expansion_matches_host_encoding() {
    let pre_slice = VertexSlice::new(0, 24).unwrap();
    let post_slice = VertexSlice::new(25, 49).unwrap();
    let info = Arc::new(
        projection(
            "a->b",
            50,
            50,
            Arc::new(FixedProbabilityConnector::new(0.3, true).unwrap().with_seed(0x5EED)),
        )
        .with_weights(ParameterSpec::Random(RandomDistribution::Uniform { low: 0.2, high: 0.6 }))
        .with_delays(2.0),
    );
    let edges = vec![ProjectionEdge::single(PreVertex::new(1, pre_slice), info.clone())];

    let mut on_machine = SynapticManager::new("b", 2, &SynmatrixConfig::default()).unwrap();
    let mut expanded = run(&mut on_machine, &post_slice, &edges);
    assert_eq!(on_machine.provenance().n_generated_on_machine(), 1);
    let n_expanded = on_machine.expand_on_host(&mut expanded).unwrap();
    assert!(n_expanded > 0);

    let mut host = SynapticManager::new("b", 2, &host_only()).unwrap();
    let encoded = run(&mut host, &post_slice, &edges);

    let matrix = DataRegion::SynapticMatrix.id();
    assert_eq!(expanded[&matrix], encoded[&matrix]);

    let back = on_machine
        .get_connections_from_machine(PLACEMENT, &edges[0], &info, &expanded)
        .unwrap();
    assert_eq!(back.len(), n_expanded);
}

#[test]
fn test_too_many_delay_stages_rejected() {
    let slice = VertexSlice::whole(10).unwrap();
    let info = Arc::new(projection("a->b", 10, 10, Arc::new(AllToAllConnector::new(true))).with_delays(150.0));
    let edges = vec![ProjectionEdge::single(PreVertex::new(1, slice), info)];
    let mut manager = SynapticManager::new("b", 2, &SynmatrixConfig::default()).unwrap();
    let mut spec = MemoryDataSpec::new();
    let err = manager
        .write_data_spec(&mut spec, PLACEMENT, &slice, &edges, &routing(&[1]))
        .unwrap_err();
    assert!(matches!(err, MatrixError::TooManyDelayStages { needed: 9, max: 8, .. }));
    assert!(spec.is_empty());
}

#[test]
fn test_short_delays_are_clipped_and_counted() {
    let slice = VertexSlice::whole(10).unwrap();
    let info = Arc::new(projection("a->b", 10, 10, Arc::new(OneToOneConnector::new())).with_delays(0.2));
    let edges = vec![ProjectionEdge::single(PreVertex::new(1, slice), info.clone())];
    let mut manager = SynapticManager::new("b", 2, &SynmatrixConfig::default()).unwrap();
    let regions = run(&mut manager, &slice, &edges);

    assert_eq!(manager.provenance().total_delays_clipped(), 10);
    let back = manager
        .get_connections_from_machine(PLACEMENT, &edges[0], &info, &regions)
        .unwrap();
    assert!(back.iter().all(|c| c.delay == 1.0));
}

#[test]
fn test_fixed_probability_extremes() {
    let slice = VertexSlice::whole(10).unwrap();
    let all = Arc::new(projection(
        "all",
        10,
        10,
        Arc::new(FixedProbabilityConnector::new(1.0, true).unwrap()),
    ));
    let none = Arc::new(projection(
        "none",
        10,
        10,
        Arc::new(FixedProbabilityConnector::new(0.0, true).unwrap()),
    ));
    let edges = vec![
        ProjectionEdge::single(PreVertex::new(1, slice), all.clone()),
        ProjectionEdge::single(PreVertex::new(2, slice), none.clone()),
    ];
    let mut manager = SynapticManager::new("b", 2, &host_only()).unwrap();
    let plan = manager.plan(&slice, &edges).unwrap();
    assert_eq!(plan.blocks.len(), 1);
    assert_eq!(plan.empty.len(), 1);

    let regions = run(&mut manager, &slice, &edges);
    let back = manager
        .get_connections_from_machine(PLACEMENT, &edges[0], &all, &regions)
        .unwrap();
    assert_eq!(back.len(), 100);
    let back = manager
        .get_connections_from_machine(PLACEMENT, &edges[1], &none, &regions)
        .unwrap();
    assert!(back.is_empty());

    let unwritten = projection("unwritten", 10, 10, Arc::new(FixedProbabilityConnector::new(0.0, true).unwrap()));
    assert!(matches!(
        manager.get_connections_from_machine(PLACEMENT, &edges[1], &unwritten, &regions),
        Err(MatrixError::UnknownProjection(_))
    ));
}

#[test]
fn test_unknown_placement() {
    let slice = VertexSlice::whole(4).unwrap();
    let info = Arc::new(projection("a->b", 4, 4, Arc::new(OneToOneConnector::new())));
    let edge = ProjectionEdge::single(PreVertex::new(1, slice), info.clone());
    let manager = SynapticManager::new("b", 2, &SynmatrixConfig::default()).unwrap();
    assert!(matches!(
        manager.get_connections_from_machine(PLACEMENT, &edge, &info, &RegionMap::new()),
        Err(MatrixError::UnknownPlacement(_))
    ));
}

#[test]
fn test_stdp_rows_and_region() {
    let slice = VertexSlice::whole(10).unwrap();
    let info = Arc::new(
        projection("a->b", 10, 10, Arc::new(AllToAllConnector::new(true)))
            .with_weights(0.4)
            .with_dynamics(SynapseDynamics::Stdp(StdpDynamics::default())),
    );
    let edges = vec![ProjectionEdge::single(PreVertex::new(1, slice), info.clone())];
    let mut manager = SynapticManager::new("b", 2, &host_only()).unwrap();
    let regions = run(&mut manager, &slice, &edges);

    let dynamics = bytes_to_words(&regions[&DataRegion::SynapseDynamics.id()]).unwrap();
    assert_eq!(dynamics[0], 1);
    assert!(dynamics.len() > 1);

    let back = manager
        .get_connections_from_machine(PLACEMENT, &edges[0], &info, &regions)
        .unwrap();
    assert_eq!(back.len(), 100);
    assert!(back.iter().all(|c| (c.weight - 0.4).abs() < 1e-3));
}

#[test]
fn test_structural_region_holds_initial_partners() {
    let slice = VertexSlice::whole(10).unwrap();
    let structural = StructuralDynamics {
        plastic: None,
        s_max: 4,
        grid: [5, 2],
        p_form_forward: 0.16,
        p_form_lateral: 1.0,
        sigma_form_forward: 2.5,
        sigma_form_lateral: 1.0,
        p_elim_dep: 0.0245,
        p_elim_pot: 1.36e-4,
        f_rew: 10_000.0,
        initial_weight: 0.5,
        initial_delay: 1.0,
        lateral_inhibition: false,
        seed: 3,
    };
    let info = Arc::new(
        projection("a->b", 10, 10, Arc::new(OneToOneConnector::new()))
            .with_weights(0.5)
            .with_dynamics(SynapseDynamics::Structural(structural)),
    );
    let edges = vec![ProjectionEdge::single(PreVertex::new(1, slice), info.clone())];
    let mut manager = SynapticManager::new("b", 2, &SynmatrixConfig::default()).unwrap();
    let regions = run(&mut manager, &slice, &edges);
    assert_eq!(manager.provenance().edges[0].encoding, BlockEncoding::Host);

    let dynamics = bytes_to_words(&regions[&DataRegion::SynapseDynamics.id()]).unwrap();
    assert_eq!(dynamics[0], 2);
    let post_to_pre = &dynamics[dynamics.len() - 40..];
    for neuron in 0..10 {
        assert_eq!(post_to_pre[neuron * 4], pack_slot(0, neuron as u32));
        assert!(unpack_slot(post_to_pre[neuron * 4 + 1]).is_none());
    }

    let back = manager
        .get_connections_from_machine(PLACEMENT, &edges[0], &info, &regions)
        .unwrap();
    assert_eq!(back.len(), 10);
}
