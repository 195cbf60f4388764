// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// Generation driven by a configuration file and command-line style flags
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use synmatrix::observability::CrateDebugFlags;
use synmatrix::prelude::*;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn slow_projection(delay: f64) -> (VertexSlice, Vec<ProjectionEdge>, RoutingTable) {
    let info = Arc::new(
        SynapseInfo::new(
            "a->b",
            Arc::new(PopulationDescriptor::new("a", 8)),
            Arc::new(PopulationDescriptor::new("b", 8)),
            Arc::new(AllToAllConnector::new(true)),
        )
        .with_delays(delay),
    );
    let slice = VertexSlice::whole(8).unwrap();
    let mut routing = RoutingTable::new();
    routing.insert(1, KeyAndMask::new(0x100, 0xFFFF_FF00));
    routing.insert_delay(1, KeyAndMask::new(0x200, 0xFFFF_FF00));
    (slice, vec![ProjectionEdge::single(PreVertex::new(1, slice), info)], routing)
}

#[test]
fn test_delay_stage_limit_from_file() {
    let file = write_config(
        r#"
[synapses]
generate_on_machine = false

[delays]
max_delay_stages = 2
"#,
    );
    let config = load_config(Some(file.path()), None).unwrap();
    assert_eq!(config.delays.max_delay_stages, 2);

    let (slice, edges, routing) = slow_projection(40.0);
    let mut manager = SynapticManager::new("b", 2, &config).unwrap();
    let mut spec = MemoryDataSpec::new();
    assert!(manager
        .write_data_spec(&mut spec, Placement::new(0, 0, 1), &slice, &edges, &routing)
        .is_ok());

    let (slice, edges, routing) = slow_projection(50.0);
    let mut spec = MemoryDataSpec::new();
    let err = manager
        .write_data_spec(&mut spec, Placement::new(0, 0, 2), &slice, &edges, &routing)
        .unwrap_err();
    assert!(matches!(err, MatrixError::TooManyDelayStages { needed: 3, max: 2, .. }));
    assert!(spec.is_empty());
}

#[test]
fn test_cli_override_disables_on_machine_generation() {
    let file = write_config("[synapses]\ngenerate_on_machine = true\n");
    let mut cli = HashMap::new();
    cli.insert("generate_on_machine".to_string(), "false".to_string());
    let config = load_config(Some(file.path()), Some(&cli)).unwrap();
    assert!(!config.synapses.generate_on_machine);

    let (slice, edges, _) = slow_projection(1.0);
    let manager = SynapticManager::new("b", 2, &config).unwrap();
    let plan = manager.plan(&slice, &edges).unwrap();
    assert!(plan.generator_descriptors().is_empty());
}

#[test]
fn test_debug_flags_build_filter() {
    let flags = CrateDebugFlags::from_args(["--debug-synmatrix-matrix".to_string(), "--verbose".to_string()]);
    assert!(flags.is_enabled("synmatrix-matrix"));
    assert!(!flags.is_enabled("synmatrix-config"));
    assert_eq!(flags.to_filter_string("warn"), "synmatrix-matrix=debug,warn");
}
