// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Size planning for one post-synaptic machine vertex.

The plan fixes, before anything is generated, how every (edge, projection)
block is encoded, where its rows go and how big each region is. Writing
follows the plan exactly, so a failure to fit is detected before a single
byte reaches the region writer.

Matrix region layout:

```text
u32             direct block size in bytes (D)
D bytes         direct rows, one word per pre atom
indirect bytes  host-encoded blocks, then blocks expanded on machine,
                each starting at an address aligned to the table granularity
```
*/

use std::sync::Arc;

use ahash::AHashSet;
use synmatrix_config::SynmatrixConfig;
use synmatrix_connectivity::{ConnectorKind, PopulationDescriptor, SynapseInfo};
use synmatrix_neural::{SynapseDynamics, SynapseRowFormat, VertexSlice};
use synmatrix_serialization::{delay_to_ticks, AddressEntry, MasterPopTableBuilder, SerializationError};
use tracing::{debug, trace};

use crate::generator::{BlockTarget, GeneratorDescriptor};
use crate::graph::{KeyAndMask, PreVertex, ProjectionEdge};
use crate::row_blocks::RowBlockLayout;
use crate::stdp::stdp_region_words;
use crate::structural::{structural_params_words, PostToPreTable, RewiringSource};
use crate::types::{MatrixError, MatrixResult};

const BYTES_PER_WORD: usize = 4;

/// Settings the planner reads from the configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanParams {
    pub format: SynapseRowFormat,
    pub n_synapse_types: u8,
    pub timestep_us: u32,
    pub max_delay_stages: u32,
    pub granularity: u32,
    pub max_direct_matrix_bytes: usize,
    pub generate_on_machine: bool,
    pub max_atoms_per_core: u32,
}

impl PlanParams {
    pub fn from_config(config: &SynmatrixConfig, n_synapse_types: u8) -> MatrixResult<Self> {
        let format = SynapseRowFormat::new(
            n_synapse_types,
            config.row_format.n_neuron_index_bits,
            config.row_format.n_delay_bits,
        )?;
        Ok(Self {
            format,
            n_synapse_types,
            timestep_us: config.simulation.machine_time_step_us,
            max_delay_stages: config.delays.max_delay_stages,
            granularity: config.population_table.address_granularity_bytes,
            max_direct_matrix_bytes: config.synapses.max_direct_matrix_bytes,
            generate_on_machine: config.synapses.generate_on_machine,
            max_atoms_per_core: config.synapses.max_atoms_per_core,
        })
    }

    #[inline]
    pub fn timestep_ms(&self) -> f64 {
        self.timestep_us as f64 / 1000.0
    }
}

/// How the rows of a block reach the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BlockEncoding {
    /// Single-word rows in the direct block
    Direct,
    /// Rows encoded on the host
    Host,
    /// Rows built by the machine-side expander from a descriptor
    OnMachine,
}

/// Rows of one block in one sub-block of the matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBlock {
    /// Byte offset within the direct or indirect sub-block
    pub address: u32,
    pub row_words: u32,
    pub n_rows: u32,
    /// Most synapses any row of the block may hold
    pub max_connections: usize,
}

impl RowBlock {
    pub fn n_bytes(&self) -> usize {
        self.n_rows as usize * self.row_words as usize * BYTES_PER_WORD
    }

    pub fn target(&self) -> BlockTarget {
        BlockTarget {
            address: self.address,
            row_words: self.row_words,
        }
    }
}

/// Planned encoding and placement of one projection from one pre vertex
#[derive(Debug, Clone)]
pub struct BlockPlan {
    /// Position of the edge in the incoming list
    pub edge: usize,
    pub pre_vertex: PreVertex,
    pub info: Arc<SynapseInfo>,
    pub encoding: BlockEncoding,
    pub n_delay_stages: u32,
    /// Generated delays are clipped to this, in ms
    pub max_delay_ms: f64,
    pub undelayed: Option<RowBlock>,
    pub delayed: Option<RowBlock>,
}

impl BlockPlan {
    pub fn layout(&self) -> RowBlockLayout {
        RowBlockLayout {
            undelayed: self.undelayed.map(|b| b.target()),
            delayed: self.delayed.map(|b| b.target()),
            n_delay_stages: self.n_delay_stages,
        }
    }

    /// Address entry the population table holds for the undelayed rows
    pub fn undelayed_entry(&self) -> Option<AddressEntry> {
        self.undelayed.map(|b| match self.encoding {
            BlockEncoding::Direct => AddressEntry::single(b.address),
            _ => AddressEntry::indirect(b.address, b.row_words),
        })
    }

    pub fn delayed_entry(&self) -> Option<AddressEntry> {
        self.delayed.map(|b| AddressEntry::indirect(b.address, b.row_words))
    }
}

/// Byte sizes of the regions of one vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct RegionSizes {
    pub synapse_params: usize,
    pub population_table: usize,
    pub synaptic_matrix: usize,
    pub synapse_dynamics: usize,
    pub connector_builder: usize,
}

impl RegionSizes {
    pub fn total(&self) -> usize {
        self.synapse_params
            + self.population_table
            + self.synaptic_matrix
            + self.synapse_dynamics
            + self.connector_builder
    }
}

/// Complete layout of one post-synaptic machine vertex
#[derive(Debug, Clone)]
pub struct SynapticPlan {
    pub post_slice: VertexSlice,
    /// Direct blocks, then host blocks, then on-machine blocks
    pub blocks: Vec<BlockPlan>,
    /// Projections over an edge that can make no connections into this vertex
    pub empty: Vec<(PreVertex, Arc<SynapseInfo>)>,
    pub direct_bytes: usize,
    pub indirect_bytes: usize,
    /// Dynamics shared by every projection into the vertex
    pub dynamics: SynapseDynamics,
    pub n_table_entries: usize,
    pub n_table_addresses: usize,
    pub sizes: RegionSizes,
}

impl SynapticPlan {
    /// Byte offset of the indirect sub-block within the matrix region
    #[inline]
    pub fn indirect_base(&self) -> usize {
        BYTES_PER_WORD + self.direct_bytes
    }

    /// Descriptors for every block the machine expands
    pub fn generator_descriptors(&self) -> Vec<GeneratorDescriptor> {
        self.blocks
            .iter()
            .filter(|b| b.encoding == BlockEncoding::OnMachine)
            .filter_map(|b| generator_descriptor(b, &self.post_slice))
            .collect()
    }

    /// Pre populations of structural projections, by descriptor identity, in first-seen order
    fn structural_pre_populations(&self) -> Vec<&PopulationDescriptor> {
        let mut populations: Vec<&PopulationDescriptor> = Vec::new();
        for block in self.blocks.iter().filter(|b| b.info.synapse_dynamics().structural().is_some()) {
            let pre = block.info.pre();
            if !populations.iter().any(|known| std::ptr::eq(*known, pre)) {
                populations.push(pre);
            }
        }
        populations
    }

    /// Pre populations the rewiring process may form synapses from, in first-seen order
    pub fn rewiring_sources(&self, key_of: impl Fn(&PreVertex) -> KeyAndMask) -> Vec<RewiringSource> {
        let populations = self.structural_pre_populations();
        let mut sources: Vec<RewiringSource> = populations
            .iter()
            .map(|pre| RewiringSource {
                label: pre.label.clone(),
                n_atoms: pre.n_atoms,
                vertices: Vec::new(),
            })
            .collect();
        let mut seen: AHashSet<(u32, usize)> = AHashSet::new();
        for block in self.blocks.iter().filter(|b| b.info.synapse_dynamics().structural().is_some()) {
            let pre = block.info.pre();
            let Some(index) = populations.iter().position(|known| std::ptr::eq(*known, pre)) else {
                continue;
            };
            if seen.insert((block.pre_vertex.id, index)) {
                sources[index]
                    .vertices
                    .push((key_of(&block.pre_vertex), block.pre_vertex.slice));
            }
        }
        sources
    }

    /// Index of a pre population within [`rewiring_sources`](Self::rewiring_sources)
    pub fn rewiring_index(&self, info: &SynapseInfo) -> Option<u8> {
        self.structural_pre_populations()
            .iter()
            .position(|known| std::ptr::eq(*known, info.pre()))
            .and_then(|i| u8::try_from(i).ok())
    }
}

/// Words of the synapse dynamics region
///
/// Called with placeholder keys while planning and with real keys while
/// writing; the key values do not change the length.
pub fn dynamics_region_words(
    dynamics: &SynapseDynamics,
    post_slice: &VertexSlice,
    params: &PlanParams,
    sources: &[RewiringSource],
    post_to_pre: Option<&PostToPreTable>,
) -> MatrixResult<Vec<u32>> {
    let mut words = vec![dynamics.dynamics_id()];
    if let Some(stdp) = dynamics.stdp() {
        words.extend(stdp_region_words(stdp, params.timestep_us)?);
    }
    if let Some(structural) = dynamics.structural() {
        words.extend(structural_params_words(structural, post_slice, params.timestep_ms(), sources));
        match post_to_pre {
            Some(table) => words.extend_from_slice(table.words()),
            None => words.extend(PostToPreTable::new(*post_slice, structural.s_max).words()),
        }
    }
    Ok(words)
}

/// `(min, max)` delay in ms served by each stage, for sizing rows
fn stage_delay_range(stage: u32, n_stages: u32, params: &PlanParams) -> (Option<f64>, Option<f64>) {
    let ts = params.timestep_ms();
    let per_stage = params.format.max_delay_per_stage() as f64;
    let edge = |s: u32| (s as f64 * per_stage + 0.5) * ts;
    let lo = (stage > 0).then(|| edge(stage));
    let hi = (stage < n_stages).then(|| edge(stage + 1));
    (lo, hi)
}

/// Words of a row able to hold `max_connections` synapses, checked against the table field
fn row_words_for(dynamics: &SynapseDynamics, max_connections: usize) -> MatrixResult<u32> {
    let words = dynamics.n_words_for_connections(max_connections);
    if words > AddressEntry::MAX_ROW_WORDS as usize {
        return Err(SerializationError::RowLengthOutOfRange {
            row_words: words as u32,
            max: AddressEntry::MAX_ROW_WORDS,
        }
        .into());
    }
    Ok(words as u32)
}

/// Delay stages the projection needs and the largest delay it can generate
fn delay_requirements(info: &SynapseInfo, params: &PlanParams) -> MatrixResult<(u32, f64)> {
    let (_, max_delay) = info.connector().estimate_delay_bounds(info);
    let max_delay = max_delay.max(params.timestep_ms());
    let ticks = delay_to_ticks(max_delay, params.timestep_ms());
    let n_stages = params.format.n_delay_stages_for(ticks);
    if n_stages > params.max_delay_stages {
        return Err(MatrixError::TooManyDelayStages {
            label: info.label().to_string(),
            needed: n_stages,
            max: params.max_delay_stages,
        });
    }
    Ok((n_stages, max_delay))
}

fn supports_generation_on_machine(info: &SynapseInfo) -> bool {
    info.connector().generator_descriptor(info).is_some()
        && info.weights().descriptor().is_some()
        && info.delays().descriptor().is_some()
        && info.synapse_dynamics().supports_generation_on_machine()
}

/// Descriptor the machine expands a block from
fn generator_descriptor(block: &BlockPlan, post_slice: &VertexSlice) -> Option<GeneratorDescriptor> {
    let info = &block.info;
    let dynamics = info.synapse_dynamics();
    Some(GeneratorDescriptor {
        connector: info.connector().generator_descriptor(info)?,
        weights: info.weights().descriptor()?,
        delays: info.delays().descriptor()?,
        synapse_type: info.synapse_type(),
        dynamics_id: dynamics.dynamics_id(),
        signed_weights: dynamics.are_weights_signed(),
        self_projection: info.is_self_projection(),
        n_pre_atoms: info.pre().n_atoms,
        n_post_atoms: info.post().n_atoms,
        pre_slice: block.pre_vertex.slice,
        post_slice: *post_slice,
        max_delay_ms: block.max_delay_ms,
        undelayed: block.undelayed.map(|b| b.target()),
        delayed: block.delayed.map(|b| b.target()),
        n_delay_stages: block.n_delay_stages,
    })
}

/// Plan every block into one post-synaptic machine vertex
pub fn plan_synapses(
    post_slice: &VertexSlice,
    incoming: &[ProjectionEdge],
    params: &PlanParams,
) -> MatrixResult<SynapticPlan> {
    if post_slice.n_atoms() > params.format.max_neurons() || post_slice.n_atoms() > params.max_atoms_per_core {
        return Err(MatrixError::Configuration(format!(
            "post slice {} has {} atoms, a core holds at most {}",
            post_slice,
            post_slice.n_atoms(),
            params.format.max_neurons().min(params.max_atoms_per_core)
        )));
    }
    let table = MasterPopTableBuilder::new(params.granularity)?;

    let mut dynamics = SynapseDynamics::Static;
    let mut direct = Vec::new();
    let mut host = Vec::new();
    let mut on_machine = Vec::new();
    let mut empty = Vec::new();
    let mut direct_bytes = 0usize;

    for (edge_index, edge) in incoming.iter().enumerate() {
        let pre_vertex = edge.pre_vertex;
        let n_pre = pre_vertex.slice.n_atoms();
        for info in &edge.synapse_infos {
            info.validate(params.n_synapse_types)?;
            let info_dynamics = info.synapse_dynamics();
            dynamics = dynamics.merge(info_dynamics)?;

            let connector = info.connector();
            let (n_stages, max_delay_ms) = delay_requirements(info, params)?;

            let direct_row_bytes = n_pre as usize * BYTES_PER_WORD;
            let is_direct = connector.kind() == ConnectorKind::OneToOne
                && *info_dynamics == SynapseDynamics::Static
                && n_stages == 0
                && pre_vertex.slice.is_coextensive(post_slice)
                && direct_bytes + direct_row_bytes <= params.max_direct_matrix_bytes;

            if is_direct {
                direct.push(BlockPlan {
                    edge: edge_index,
                    pre_vertex,
                    info: info.clone(),
                    encoding: BlockEncoding::Direct,
                    n_delay_stages: 0,
                    max_delay_ms,
                    undelayed: Some(RowBlock {
                        address: direct_bytes as u32,
                        row_words: 1,
                        n_rows: n_pre,
                        max_connections: 1,
                    }),
                    delayed: None,
                });
                direct_bytes += direct_row_bytes;
                continue;
            }

            let (lo, hi) = stage_delay_range(0, n_stages, params);
            let mut undelayed_max = connector.max_connections_from_pre_vertex(info, post_slice, lo, hi);
            if let Some(structural) = info_dynamics.structural() {
                // Room for synapses the rewiring process forms
                undelayed_max = undelayed_max
                    .max(structural.s_max as usize)
                    .min(post_slice.n_atoms() as usize);
            }
            let delayed_max = (1..=n_stages)
                .map(|stage| {
                    let (lo, hi) = stage_delay_range(stage, n_stages, params);
                    connector.max_connections_from_pre_vertex(info, post_slice, lo, hi)
                })
                .max()
                .unwrap_or(0);

            let undelayed = if undelayed_max > 0 {
                Some(RowBlock {
                    address: 0,
                    row_words: row_words_for(info_dynamics, undelayed_max)?,
                    n_rows: n_pre,
                    max_connections: undelayed_max,
                })
            } else {
                None
            };
            let delayed = if delayed_max > 0 {
                Some(RowBlock {
                    address: 0,
                    row_words: row_words_for(info_dynamics, delayed_max)?,
                    n_rows: n_pre * n_stages,
                    max_connections: delayed_max,
                })
            } else {
                None
            };
            if undelayed.is_none() && delayed.is_none() {
                trace!(target: "synmatrix-matrix", "{} makes no connections into {}", info.label(), post_slice);
                empty.push((pre_vertex, info.clone()));
                continue;
            }

            let encoding = if params.generate_on_machine && supports_generation_on_machine(info) {
                BlockEncoding::OnMachine
            } else {
                BlockEncoding::Host
            };
            let block = BlockPlan {
                edge: edge_index,
                pre_vertex,
                info: info.clone(),
                encoding,
                n_delay_stages: n_stages,
                max_delay_ms,
                undelayed,
                delayed,
            };
            match encoding {
                BlockEncoding::OnMachine => on_machine.push(block),
                _ => host.push(block),
            }
        }
    }

    // Indirect addresses: host blocks first, expanded blocks after them
    let mut cursor: u32 = 0;
    for block in host.iter_mut().chain(on_machine.iter_mut()) {
        for rows in [&mut block.undelayed, &mut block.delayed].into_iter().flatten() {
            let address = table.next_aligned_address(cursor)?;
            if address as u64 > table.max_indirect_address() {
                return Err(SerializationError::AddressOutOfRange {
                    address: address as u64,
                    max: table.max_indirect_address(),
                }
                .into());
            }
            rows.address = address;
            cursor = u32::try_from(address as usize + rows.n_bytes()).map_err(|_| MatrixError::SdramOverflow {
                vertex: post_slice.to_string(),
                written: address as usize + rows.n_bytes(),
                budget: u32::MAX as usize,
            })?;
        }
    }
    let indirect_bytes = table.next_aligned_address(cursor)? as usize;

    let mut blocks = direct;
    blocks.extend(host);
    blocks.extend(on_machine);

    let mut keys: AHashSet<(u32, bool)> = AHashSet::new();
    let mut n_table_addresses = 0;
    for block in &blocks {
        if block.undelayed.is_some() {
            keys.insert((block.pre_vertex.id, false));
            n_table_addresses += 1;
        }
        if block.delayed.is_some() {
            keys.insert((block.pre_vertex.id, true));
            n_table_addresses += 1;
        }
    }

    let mut plan = SynapticPlan {
        post_slice: *post_slice,
        blocks,
        empty,
        direct_bytes,
        indirect_bytes,
        dynamics,
        n_table_entries: keys.len(),
        n_table_addresses,
        sizes: RegionSizes::default(),
    };

    let placeholder = KeyAndMask::new(0, 0);
    let sources = plan.rewiring_sources(|_| placeholder);
    let descriptors = plan.generator_descriptors();
    plan.sizes = RegionSizes {
        synapse_params: params.n_synapse_types as usize * BYTES_PER_WORD,
        population_table: MasterPopTableBuilder::sdram_bytes(plan.n_table_entries, plan.n_table_addresses),
        synaptic_matrix: plan.indirect_base() + indirect_bytes,
        synapse_dynamics: dynamics_region_words(&plan.dynamics, post_slice, params, &sources, None)?.len()
            * BYTES_PER_WORD,
        connector_builder: GeneratorDescriptor::region_words(&descriptors).len() * BYTES_PER_WORD,
    };

    debug!(
        target: "synmatrix-matrix",
        "planned {} blocks into {}: direct {} B, indirect {} B, {} table entries",
        plan.blocks.len(),
        post_slice,
        plan.direct_bytes,
        plan.indirect_bytes,
        plan.n_table_entries
    );
    Ok(plan)
}
