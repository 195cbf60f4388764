// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Synaptic Manager - generation of the synaptic data of one post-synaptic vertex.

One manager serves one post-synaptic application vertex and is called once
per machine vertex (slice) of it. Each call runs:

1. **SizePlanned**: every incoming block is planned (encoding, addresses, region sizes)
2. **RingBufferScaled**: ring-buffer shifts are computed once and cached
3. **Writing**: rows, the population table and the dynamics region are built in memory
4. **Finalized**: regions are reserved and written, read-back data is recorded

Nothing reaches the [`DataSpecWriter`] unless steps 1-3 all succeed, so a
failed pass leaves no partial regions behind.
*/

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use synmatrix_config::SynmatrixConfig;
use synmatrix_connectivity::{GenerationContext, SynapseInfo};
use synmatrix_neural::{ConnectionTuple, SynapseRowFormat, VertexSlice};
use synmatrix_serialization::{
    bytes_to_words, decode_direct_word, encode_direct_word, AddressEntry, DataRegion, DataSpecWriter,
    MasterPopTableBuilder, MasterPopulationTable, RowContext,
};
use tracing::{debug, info, warn};

use crate::generator::GeneratorDescriptor;
use crate::graph::{KeyAndMask, Placement, PreVertex, ProjectionEdge, RoutingInfo};
use crate::planner::{dynamics_region_words, plan_synapses, BlockEncoding, BlockPlan, PlanParams, SynapticPlan};
use crate::provenance::{EdgeProvenance, SynapticProvenance};
use crate::ring_buffer::{RingBufferParams, RingBufferScaler, RingBufferShifts};
use crate::row_blocks::{read_row_blocks, write_row_blocks, RowBlockLayout};
use crate::structural::PostToPreTable;
use crate::types::{MatrixError, MatrixResult};

const BYTES_PER_WORD: usize = 4;

/// Region contents keyed by [`DataRegion::id`]
pub type RegionMap = BTreeMap<u32, Vec<u8>>;

/// Generation state of a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum GenerationStage {
    Idle,
    SizePlanned,
    RingBufferScaled,
    Writing,
    Finalized,
}

impl GenerationStage {
    /// Legal transitions; any stage may fall back to `Idle`
    pub fn can_advance_to(self, next: GenerationStage) -> bool {
        use GenerationStage::*;
        next == Idle
            || matches!(
                (self, next),
                (Idle | Finalized, SizePlanned)
                    | (SizePlanned, RingBufferScaled)
                    | (RingBufferScaled, Writing)
                    | (Writing, Finalized)
            )
    }
}

//region Read-back

/// What read-back needs to find and decode one block
#[derive(Debug, Clone)]
struct BlockRecord {
    pre_vertex: PreVertex,
    info: Arc<SynapseInfo>,
    encoding: BlockEncoding,
    layout: RowBlockLayout,
    key: Option<KeyAndMask>,
    delay_key: Option<KeyAndMask>,
    undelayed_entry: Option<AddressEntry>,
    delayed_entry: Option<AddressEntry>,
}

/// Everything recorded when a placement is finalized
#[derive(Debug, Clone)]
struct PlacementRecord {
    post_slice: VertexSlice,
    format: SynapseRowFormat,
    weight_scales: Vec<f64>,
    timestep_ms: f64,
    granularity: u32,
    blocks: Vec<BlockRecord>,
    /// Projections known to make no connections into this placement
    empty: Vec<(u32, Arc<SynapseInfo>)>,
}

/// Decodes connections of finalized placements
///
/// Cloning shares the underlying records, so a reader can be handed to
/// another thread while the manager generates other placements.
#[derive(Debug, Clone, Default)]
pub struct ConnectionReader {
    records: Arc<RwLock<AHashMap<Placement, PlacementRecord>>>,
}

fn region<'a>(regions: &'a RegionMap, region: DataRegion) -> MatrixResult<&'a [u8]> {
    regions
        .get(&region.id())
        .map(|bytes| bytes.as_slice())
        .ok_or_else(|| MatrixError::Configuration(format!("region {:?} was not read back", region)))
}

fn check_table_entry(
    table: &MasterPopulationTable,
    key: Option<KeyAndMask>,
    entry: Option<AddressEntry>,
    label: &str,
) -> MatrixResult<()> {
    let Some(entry) = entry else {
        return Ok(());
    };
    let found = key
        .and_then(|k| table.find_entry(k.key))
        .map(|e| e.addresses.contains(&entry))
        .unwrap_or(false);
    if found {
        Ok(())
    } else {
        Err(MatrixError::Configuration(format!(
            "population table has no block {:?} for {}",
            entry, label
        )))
    }
}

impl ConnectionReader {
    pub fn placements(&self) -> Vec<Placement> {
        let mut placements: Vec<Placement> = self.records.read().keys().copied().collect();
        placements.sort();
        placements
    }

    /// Weight scales used when the placement was written
    pub fn weight_scales(&self, placement: Placement) -> Option<Vec<f64>> {
        self.records.read().get(&placement).map(|r| r.weight_scales.clone())
    }

    /// Connections of one projection over one edge, decoded from the regions of a placement
    pub fn get_connections(
        &self,
        placement: Placement,
        edge: &ProjectionEdge,
        synapse_info: &SynapseInfo,
        regions: &RegionMap,
    ) -> MatrixResult<Vec<ConnectionTuple>> {
        let records = self.records.read();
        let record = records
            .get(&placement)
            .ok_or_else(|| MatrixError::UnknownPlacement(placement.to_string()))?;
        let is_info = |info: &Arc<SynapseInfo>| std::ptr::eq(Arc::as_ptr(info), synapse_info);
        let Some(block) = record
            .blocks
            .iter()
            .find(|b| b.pre_vertex.id == edge.pre_vertex.id && is_info(&b.info))
        else {
            if record.empty.iter().any(|(pre, info)| *pre == edge.pre_vertex.id && is_info(info)) {
                return Ok(Vec::new());
            }
            return Err(MatrixError::UnknownProjection(synapse_info.label().to_string()));
        };

        let table = MasterPopulationTable::from_bytes(region(regions, DataRegion::PopulationTable)?, record.granularity)?;
        check_table_entry(&table, block.key, block.undelayed_entry, synapse_info.label())?;
        check_table_entry(&table, block.delay_key, block.delayed_entry, synapse_info.label())?;

        let matrix = bytes_to_words(region(regions, DataRegion::SynapticMatrix)?)?;
        let direct_words = matrix.first().copied().unwrap_or(0) as usize / BYTES_PER_WORD;
        if matrix.len() < 1 + direct_words {
            return Err(MatrixError::Configuration(format!(
                "matrix of {} words cannot hold {} direct words",
                matrix.len(),
                direct_words
            )));
        }
        let ctx = RowContext {
            format: record.format,
            dynamics: block.info.synapse_dynamics(),
            post_slice: record.post_slice,
            weight_scales: &record.weight_scales,
            timestep_ms: record.timestep_ms,
            delay_stage: 0,
        };

        match (block.encoding, block.layout.undelayed) {
            (BlockEncoding::Direct, Some(target)) => {
                let direct = &matrix[1..1 + direct_words];
                let first = target.address as usize / BYTES_PER_WORD;
                block
                    .pre_vertex
                    .slice
                    .atoms()
                    .enumerate()
                    .map(|(i, source)| {
                        let word = direct.get(first + i).copied().ok_or_else(|| {
                            MatrixError::Configuration(format!("direct row {} lies beyond the direct block", first + i))
                        })?;
                        Ok(decode_direct_word(word, source, &ctx)?)
                    })
                    .collect()
            }
            _ => read_row_blocks(&matrix[1 + direct_words..], &block.pre_vertex.slice, &block.layout, ctx),
        }
    }
}

//endregion

//region Writing

/// Region contents built in memory before anything is written
#[derive(Debug, Clone, Default)]
struct BuiltRegions {
    synapse_params: Vec<u32>,
    population_table: Vec<u32>,
    synaptic_matrix: Vec<u32>,
    synapse_dynamics: Vec<u32>,
    connector_builder: Vec<u32>,
}

impl BuiltRegions {
    fn regions(&self) -> [(DataRegion, &[u32]); 5] {
        [
            (DataRegion::SynapseParams, &self.synapse_params),
            (DataRegion::PopulationTable, &self.population_table),
            (DataRegion::SynapticMatrix, &self.synaptic_matrix),
            (DataRegion::SynapseDynamics, &self.synapse_dynamics),
            (DataRegion::ConnectorBuilder, &self.connector_builder),
        ]
    }
}

/// Output of the in-memory part of a pass
struct Generated {
    regions: BuiltRegions,
    record: PlacementRecord,
    provenance: SynapticProvenance,
}

fn write_direct_rows(
    direct: &mut [u32],
    block: &BlockPlan,
    connections: &[ConnectionTuple],
    ctx: &RowContext<'_>,
) -> MatrixResult<u32> {
    let Some(rows) = block.undelayed else {
        return Ok(0);
    };
    let pre_slice = &block.pre_vertex.slice;
    let mut per_atom = vec![None; pre_slice.n_atoms() as usize];
    let mut counts = vec![0usize; pre_slice.n_atoms() as usize];
    for conn in connections {
        let atom = pre_slice.local_index(conn.source).ok_or_else(|| {
            MatrixError::Configuration(format!("source {} outside pre slice {}", conn.source, pre_slice))
        })? as usize;
        counts[atom] += 1;
        per_atom[atom] = Some(conn);
    }

    let first = rows.address as usize / BYTES_PER_WORD;
    let direct_len = direct.len();
    let mut n_saturated = 0;
    for (atom, conn) in per_atom.iter().enumerate() {
        let conn = match (counts[atom], conn) {
            (1, Some(conn)) => conn,
            (actual, _) => {
                return Err(MatrixError::RowLengthMismatch {
                    label: block.info.label().to_string(),
                    planned: 1,
                    actual,
                })
            }
        };
        let (word, saturated) = encode_direct_word(conn, ctx)?;
        let slot = direct.get_mut(first + atom).ok_or_else(|| MatrixError::SdramOverflow {
            vertex: block.info.label().to_string(),
            written: (first + atom + 1) * BYTES_PER_WORD,
            budget: direct_len * BYTES_PER_WORD,
        })?;
        *slot = word;
        n_saturated += saturated as u32;
    }
    Ok(n_saturated)
}

fn resolve_key(key: Option<KeyAndMask>, pre_vertex: u32, delay_stage: u32, n_keys: u64) -> MatrixResult<KeyAndMask> {
    let key = key.ok_or(MatrixError::MissingRoutingKey {
        pre_vertex,
        delay_stage,
    })?;
    key.check_covers(n_keys)?;
    Ok(key)
}

fn check_region_budget(vertex: &str, region: DataRegion, words: &[u32], budget: usize) -> MatrixResult<()> {
    let written = words.len() * BYTES_PER_WORD;
    if written > budget {
        return Err(MatrixError::SdramOverflow {
            vertex: format!("{} {:?}", vertex, region),
            written,
            budget,
        });
    }
    Ok(())
}

//endregion

/// Builds the synaptic data of every machine vertex of one post-synaptic population
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use synmatrix_config::SynmatrixConfig;
/// use synmatrix_connectivity::{OneToOneConnector, PopulationDescriptor, SynapseInfo};
/// use synmatrix_matrix::{KeyAndMask, Placement, PreVertex, ProjectionEdge, RoutingTable, SynapticManager};
/// use synmatrix_neural::VertexSlice;
/// use synmatrix_serialization::MemoryDataSpec;
///
/// let info = Arc::new(SynapseInfo::new(
///     "pre->post",
///     Arc::new(PopulationDescriptor::new("pre", 8)),
///     Arc::new(PopulationDescriptor::new("post", 8)),
///     Arc::new(OneToOneConnector::new()),
/// ));
/// let slice = VertexSlice::whole(8).unwrap();
/// let edges = vec![ProjectionEdge::single(PreVertex::new(1, slice), info)];
/// let mut routing = RoutingTable::new();
/// routing.insert(1, KeyAndMask::new(0x800, 0xFFFF_FF00));
///
/// let mut manager = SynapticManager::new("post", 2, &SynmatrixConfig::default()).unwrap();
/// let mut spec = MemoryDataSpec::new();
/// manager
///     .write_data_spec(&mut spec, Placement::new(0, 0, 1), &slice, &edges, &routing)
///     .unwrap();
/// assert_eq!(spec.n_regions(), 5);
/// ```
#[derive(Debug)]
pub struct SynapticManager {
    label: String,
    params: PlanParams,
    scaler: RingBufferScaler,
    sdram_overscale: f64,
    stage: GenerationStage,
    /// Every projection into the application vertex, each once
    projections: Vec<Arc<SynapseInfo>>,
    ring_buffer_shifts: Option<RingBufferShifts>,
    provenance: SynapticProvenance,
    reader: ConnectionReader,
}

impl SynapticManager {
    pub fn new(label: impl Into<String>, n_synapse_types: u8, config: &SynmatrixConfig) -> MatrixResult<Self> {
        let params = PlanParams::from_config(config, n_synapse_types)?;
        let scaler = RingBufferScaler::new(RingBufferParams {
            timestep_ms: config.simulation.timestep_ms(),
            spikes_per_second: config.synapses.spikes_per_second,
            sigma: config.synapses.ring_buffer_sigma,
            max_shift: config.synapses.max_ring_buffer_shift,
            global_weight_scale: 1.0,
        });
        Ok(Self {
            label: label.into(),
            params,
            scaler,
            sdram_overscale: config.synapses.sdram_overscale,
            stage: GenerationStage::Idle,
            projections: Vec::new(),
            ring_buffer_shifts: None,
            provenance: SynapticProvenance::new(),
            reader: ConnectionReader::default(),
        })
    }

    /// Multiplier the neuron model applies to every weight
    pub fn with_global_weight_scale(mut self, global_weight_scale: f64) -> Self {
        self.scaler = RingBufferScaler::new(RingBufferParams {
            global_weight_scale,
            ..*self.scaler.params()
        });
        self.ring_buffer_shifts = None;
        self
    }

    /// Register every projection into the application vertex before the first pass
    ///
    /// Ring-buffer shifts are shared by all machine vertices of the
    /// population, so they must account for projections that only reach
    /// other slices.
    pub fn with_projections(mut self, projections: impl IntoIterator<Item = Arc<SynapseInfo>>) -> Self {
        for info in projections {
            self.add_projection(info);
        }
        self
    }

    /// Register one projection; returns false if it was already known
    pub fn add_projection(&mut self, info: Arc<SynapseInfo>) -> bool {
        if self.projections.iter().any(|known| Arc::ptr_eq(known, &info)) {
            return false;
        }
        self.projections.push(info);
        self.ring_buffer_shifts = None;
        true
    }

    /// Projections the shifts are computed from
    pub fn projections(&self) -> &[Arc<SynapseInfo>] {
        &self.projections
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn stage(&self) -> GenerationStage {
        self.stage
    }

    pub fn params(&self) -> &PlanParams {
        &self.params
    }

    /// Cached shifts of the last pass, if any
    pub fn ring_buffer_shifts(&self) -> Option<&RingBufferShifts> {
        self.ring_buffer_shifts.as_ref()
    }

    /// Diagnostics of every pass so far
    pub fn provenance(&self) -> &SynapticProvenance {
        &self.provenance
    }

    pub fn take_provenance(&mut self) -> SynapticProvenance {
        std::mem::take(&mut self.provenance)
    }

    /// Shared handle for reading back finalized placements
    pub fn reader(&self) -> ConnectionReader {
        self.reader.clone()
    }

    fn advance(&mut self, next: GenerationStage) -> MatrixResult<()> {
        if !self.stage.can_advance_to(next) {
            return Err(MatrixError::InvalidState {
                from: self.stage,
                to: next,
            });
        }
        self.stage = next;
        Ok(())
    }

    /// Layout of a machine vertex, without generating anything
    pub fn plan(&self, post_slice: &VertexSlice, incoming: &[ProjectionEdge]) -> MatrixResult<SynapticPlan> {
        plan_synapses(post_slice, incoming, &self.params)
    }

    /// Bytes to reserve for a machine vertex, over-provisioned by the configured factor
    pub fn get_sdram_usage_for_atoms(&self, post_slice: &VertexSlice, incoming: &[ProjectionEdge]) -> MatrixResult<usize> {
        let plan = self.plan(post_slice, incoming)?;
        Ok((plan.sizes.total() as f64 * self.sdram_overscale).ceil() as usize)
    }

    /// Shifts over every registered projection, recomputed when the set or one of them changed
    fn scale(&mut self, incoming: &[ProjectionEdge]) -> RingBufferShifts {
        let mut added = Vec::new();
        for info in incoming.iter().flat_map(|e| e.synapse_infos.iter()) {
            if self.add_projection(info.clone()) {
                added.push(info.label().to_string());
            }
        }
        if !added.is_empty() && !self.reader.records.read().is_empty() {
            warn!(
                target: "synmatrix-matrix",
                "{}: projections {:?} were not registered before the first pass; earlier placements use other shifts",
                self.label, added
            );
        }

        // Every flag is taken so one change triggers exactly one recomputation
        let changed = self
            .projections
            .iter()
            .fold(false, |acc, info| info.take_changed() | acc);
        match &self.ring_buffer_shifts {
            Some(shifts) if !changed => shifts.clone(),
            _ => {
                let shifts = self
                    .scaler
                    .compute(self.params.n_synapse_types, self.projections.iter().map(|info| info.as_ref()));
                debug!(target: "synmatrix-matrix", "{}: ring buffer shifts {:?}", self.label, shifts.shifts());
                self.ring_buffer_shifts = Some(shifts.clone());
                shifts
            }
        }
    }

    /// Generate and write every region of one machine vertex
    ///
    /// Returns the diagnostics of this pass; they are also accumulated in
    /// [`provenance`](Self::provenance).
    pub fn write_data_spec<W: DataSpecWriter + ?Sized>(
        &mut self,
        spec: &mut W,
        placement: Placement,
        post_slice: &VertexSlice,
        incoming: &[ProjectionEdge],
        routing: &dyn RoutingInfo,
    ) -> MatrixResult<SynapticProvenance> {
        let generated = match self.generate(placement, post_slice, incoming, routing) {
            Ok(generated) => generated,
            Err(err) => {
                self.stage = GenerationStage::Idle;
                warn!(target: "synmatrix-matrix", "{}: generation for {} abandoned: {}", self.label, placement, err);
                return Err(err);
            }
        };

        if let Err(err) = Self::write_regions(spec, &generated.regions) {
            self.stage = GenerationStage::Idle;
            return Err(err);
        }
        self.advance(GenerationStage::Finalized)?;
        self.reader.records.write().insert(placement, generated.record);
        self.provenance.extend(generated.provenance.clone());

        info!(
            target: "synmatrix-matrix",
            "{}: wrote synaptic data for {} at {}",
            self.label, post_slice, placement
        );
        Ok(generated.provenance)
    }

    fn write_regions<W: DataSpecWriter + ?Sized>(spec: &mut W, regions: &BuiltRegions) -> MatrixResult<()> {
        for (region, words) in regions.regions() {
            spec.reserve_region(region.id(), words.len() * BYTES_PER_WORD)?;
        }
        for (region, words) in regions.regions() {
            spec.switch_focus(region.id())?;
            spec.write_array(words)?;
        }
        Ok(())
    }

    fn generate(
        &mut self,
        placement: Placement,
        post_slice: &VertexSlice,
        incoming: &[ProjectionEdge],
        routing: &dyn RoutingInfo,
    ) -> MatrixResult<Generated> {
        self.advance(GenerationStage::SizePlanned)?;
        let plan = self.plan(post_slice, incoming)?;

        self.advance(GenerationStage::RingBufferScaled)?;
        let shifts = self.scale(incoming);
        let weight_scales = shifts.weight_scales(self.scaler.params().global_weight_scale);

        self.advance(GenerationStage::Writing)?;
        let params = self.params;
        let timestep_ms = params.timestep_ms();
        let vertex = format!("{} {}", self.label, placement);

        let mut synaptic_matrix = vec![0u32; plan.sizes.synaptic_matrix / BYTES_PER_WORD];
        let direct_words = plan.direct_bytes / BYTES_PER_WORD;
        synaptic_matrix[0] = plan.direct_bytes as u32;
        let (head, indirect) = synaptic_matrix.split_at_mut(1 + direct_words);
        let direct = &mut head[1..];

        let mut table = MasterPopTableBuilder::new(params.granularity)?;
        table.begin();
        let mut post_to_pre = plan
            .dynamics
            .structural()
            .map(|s| PostToPreTable::new(*post_slice, s.s_max));
        let mut resolved_keys: AHashMap<u32, KeyAndMask> = AHashMap::new();
        let mut provenance = SynapticProvenance::new();
        let mut records = Vec::with_capacity(plan.blocks.len());

        for block in &plan.blocks {
            let info = &block.info;
            let pre = block.pre_vertex;
            let n_pre = pre.slice.n_atoms() as u64;

            let key = match block.undelayed_entry() {
                Some(entry) => {
                    let key = resolve_key(routing.key_and_mask(pre.id), pre.id, 0, n_pre)?;
                    table.add_entry(key.key, key.mask, entry.address, entry.row_words, entry.is_single)?;
                    resolved_keys.insert(pre.id, key);
                    Some(key)
                }
                None => None,
            };
            let delay_key = match block.delayed_entry() {
                Some(entry) => {
                    let n_keys = n_pre * block.n_delay_stages as u64;
                    let key = resolve_key(routing.delay_key_and_mask(pre.id), pre.id, 1, n_keys)?;
                    table.add_entry(key.key, key.mask, entry.address, entry.row_words, entry.is_single)?;
                    Some(key)
                }
                None => None,
            };

            let mut n_connections = 0;
            let mut delays_clipped = 0;
            let mut weights_saturated = 0;
            if block.encoding != BlockEncoding::OnMachine {
                let connector = info.connector();
                let clipped_before = connector.delays_clipped();
                let ctx = GenerationContext::new(timestep_ms, block.max_delay_ms);
                let connections = connector.generate(info, &pre.slice, post_slice, &ctx)?;
                delays_clipped = connector.delays_clipped().saturating_sub(clipped_before);
                n_connections = connections.len();

                let row_ctx = RowContext {
                    format: params.format,
                    dynamics: info.synapse_dynamics(),
                    post_slice: *post_slice,
                    weight_scales: &weight_scales,
                    timestep_ms,
                    delay_stage: 0,
                };
                weights_saturated = match block.encoding {
                    BlockEncoding::Direct => write_direct_rows(direct, block, &connections, &row_ctx)?,
                    _ => write_row_blocks(indirect, &connections, &pre.slice, &block.layout(), row_ctx, info.label())?,
                } as u64;

                if let (Some(post_table), Some(_)) = (post_to_pre.as_mut(), info.synapse_dynamics().structural()) {
                    let index = plan.rewiring_index(info).ok_or_else(|| {
                        MatrixError::Configuration(format!("too many rewiring sources for {}", info.label()))
                    })?;
                    post_table.add_connections(index, &connections)?;
                }
            }

            provenance.push(EdgeProvenance {
                placement,
                projection: info.label().to_string(),
                pre_vertex: pre.id,
                encoding: block.encoding,
                n_connections,
                delays_clipped,
                weights_saturated,
            });
            records.push(BlockRecord {
                pre_vertex: pre,
                info: info.clone(),
                encoding: block.encoding,
                layout: block.layout(),
                key,
                delay_key,
                undelayed_entry: block.undelayed_entry(),
                delayed_entry: block.delayed_entry(),
            });
        }

        let sources = plan.rewiring_sources(|v| resolved_keys.get(&v.id).copied().unwrap_or(KeyAndMask::new(0, 0)));
        let regions = BuiltRegions {
            synapse_params: shifts.to_words(),
            population_table: table.finish()?,
            synapse_dynamics: dynamics_region_words(
                &plan.dynamics,
                post_slice,
                &params,
                &sources,
                post_to_pre.as_ref(),
            )?,
            connector_builder: GeneratorDescriptor::region_words(&plan.generator_descriptors()),
            synaptic_matrix,
        };
        check_region_budget(&vertex, DataRegion::SynapseParams, &regions.synapse_params, plan.sizes.synapse_params)?;
        check_region_budget(&vertex, DataRegion::PopulationTable, &regions.population_table, plan.sizes.population_table)?;
        check_region_budget(&vertex, DataRegion::SynapticMatrix, &regions.synaptic_matrix, plan.sizes.synaptic_matrix)?;
        check_region_budget(&vertex, DataRegion::SynapseDynamics, &regions.synapse_dynamics, plan.sizes.synapse_dynamics)?;
        check_region_budget(&vertex, DataRegion::ConnectorBuilder, &regions.connector_builder, plan.sizes.connector_builder)?;

        let clipped = provenance.total_delays_clipped();
        let saturated = provenance.total_weights_saturated();
        if clipped > 0 || saturated > 0 {
            warn!(
                target: "synmatrix-matrix",
                "{}: {} delays clipped, {} weights saturated",
                vertex, clipped, saturated
            );
        }

        Ok(Generated {
            regions,
            record: PlacementRecord {
                post_slice: *post_slice,
                format: params.format,
                weight_scales,
                timestep_ms,
                granularity: params.granularity,
                blocks: records,
                empty: plan.empty.iter().map(|(pre, info)| (pre.id, info.clone())).collect(),
            },
            provenance,
        })
    }

    /// Decode the connections of one projection over one edge of a written placement
    pub fn get_connections_from_machine(
        &self,
        placement: Placement,
        edge: &ProjectionEdge,
        synapse_info: &SynapseInfo,
        regions: &RegionMap,
    ) -> MatrixResult<Vec<ConnectionTuple>> {
        self.reader.get_connections(placement, edge, synapse_info, regions)
    }

    /// Run the machine-side expander over regions this manager wrote
    pub fn expand_on_host(&self, regions: &mut RegionMap) -> MatrixResult<usize> {
        crate::generator::expand_generated_blocks(
            regions,
            self.params.format,
            self.params.timestep_ms(),
            self.scaler.params().global_weight_scale,
        )
    }

    /// Forget cached scaling and read-back state, e.g. after connectivity changed
    ///
    /// Registered projections are kept.
    pub fn reset(&mut self) {
        self.stage = GenerationStage::Idle;
        self.ring_buffer_shifts = None;
        self.reader.records.write().clear();
    }
}
