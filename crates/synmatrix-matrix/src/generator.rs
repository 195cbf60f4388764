// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
On-machine row generation.

Blocks whose connector, weights, delays and dynamics can all be rebuilt from
a few parameters are not encoded on the host. Instead a descriptor is
written to the connector-builder region and the simulation core expands it
into rows itself.

[`expand_descriptor`] is the host emulation of that expander. It rebuilds
the connector and specifications from the descriptor and runs the same
generation code the host path uses, so expanded rows are identical to the
rows host encoding would have written.
*/

use std::sync::Arc;

use synmatrix_connectivity::{
    ConnectorDescriptor, ConnectorKind, GenerationContext, ParamDescriptor, PopulationDescriptor, SynapseInfo,
};
use synmatrix_neural::{ConnectionTuple, StdpDynamics, SynapseDynamics, SynapseRowFormat, VertexSlice};
use synmatrix_serialization::{bytes_to_words, words_to_bytes, DataRegion, RowContext};
use tracing::debug;

use crate::manager::RegionMap;
use crate::ring_buffer::RingBufferShifts;
use crate::row_blocks::{write_row_blocks, RowBlockLayout};
use crate::types::{MatrixError, MatrixResult};

/// Label given to both sides of a rebuilt self projection
const SELF_LABEL: &str = "self";

/// Where the expander writes one kind of row
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockTarget {
    /// Byte offset within the indirect matrix
    pub address: u32,
    pub row_words: u32,
}

/// Everything the expander needs to build the rows of one block
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorDescriptor {
    pub connector: ConnectorDescriptor,
    pub weights: ParamDescriptor,
    pub delays: ParamDescriptor,
    pub synapse_type: u8,
    pub dynamics_id: u32,
    pub signed_weights: bool,
    pub self_projection: bool,
    pub n_pre_atoms: u32,
    pub n_post_atoms: u32,
    pub pre_slice: VertexSlice,
    pub post_slice: VertexSlice,
    /// Delays above this are clipped, in ms
    pub max_delay_ms: f64,
    pub undelayed: Option<BlockTarget>,
    pub delayed: Option<BlockTarget>,
    pub n_delay_stages: u32,
}

/// Little-endian word stream reader
struct WordReader<'a> {
    words: &'a [u32],
    at: usize,
}

impl<'a> WordReader<'a> {
    fn new(words: &'a [u32]) -> Self {
        Self { words, at: 0 }
    }

    fn next(&mut self) -> MatrixResult<u32> {
        let word = self.words.get(self.at).copied().ok_or_else(|| {
            MatrixError::Configuration(format!("connector builder region truncated at word {}", self.at))
        })?;
        self.at += 1;
        Ok(word)
    }

    fn next_u64(&mut self) -> MatrixResult<u64> {
        let lo = self.next()? as u64;
        let hi = self.next()? as u64;
        Ok(lo | hi << 32)
    }

    fn next_f64(&mut self) -> MatrixResult<f64> {
        Ok(f64::from_bits(self.next_u64()?))
    }

    fn next_slice(&mut self) -> MatrixResult<VertexSlice> {
        let lo = self.next()?;
        let hi = self.next()?;
        Ok(VertexSlice::new(lo, hi)?)
    }

    fn next_target(&mut self) -> MatrixResult<Option<BlockTarget>> {
        let present = self.next()? != 0;
        let address = self.next()?;
        let row_words = self.next()?;
        Ok(present.then_some(BlockTarget { address, row_words }))
    }

    fn next_params(&mut self) -> MatrixResult<(u32, Vec<f64>)> {
        let kind = self.next()?;
        let n = self.next()? as usize;
        let params = (0..n).map(|_| self.next_f64()).collect::<MatrixResult<Vec<f64>>>()?;
        Ok((kind, params))
    }
}

fn push_u64(words: &mut Vec<u32>, value: u64) {
    words.push(value as u32);
    words.push((value >> 32) as u32);
}

fn push_params(words: &mut Vec<u32>, kind: u32, params: &[f64]) {
    words.push(kind);
    words.push(params.len() as u32);
    for p in params {
        push_u64(words, p.to_bits());
    }
}

fn push_target(words: &mut Vec<u32>, target: Option<BlockTarget>) {
    match target {
        Some(t) => words.extend([1, t.address, t.row_words]),
        None => words.extend([0, 0, 0]),
    }
}

impl GeneratorDescriptor {
    /// Serialized form written to the connector-builder region
    pub fn to_words(&self) -> Vec<u32> {
        let mut words = Vec::new();
        push_params(&mut words, self.connector.kind.id(), &self.connector.params);
        push_u64(&mut words, self.connector.seed);
        words.push(self.connector.allow_self_connections as u32);
        push_params(&mut words, self.weights.kind, &self.weights.params);
        push_params(&mut words, self.delays.kind, &self.delays.params);
        words.extend([
            self.synapse_type as u32,
            self.dynamics_id,
            self.signed_weights as u32,
            self.self_projection as u32,
            self.n_pre_atoms,
            self.n_post_atoms,
            self.pre_slice.lo_atom(),
            self.pre_slice.hi_atom(),
            self.post_slice.lo_atom(),
            self.post_slice.hi_atom(),
        ]);
        push_u64(&mut words, self.max_delay_ms.to_bits());
        push_target(&mut words, self.undelayed);
        push_target(&mut words, self.delayed);
        words.push(self.n_delay_stages);
        words
    }

    /// Region words: a count followed by every descriptor
    pub fn region_words(descriptors: &[GeneratorDescriptor]) -> Vec<u32> {
        let mut words = vec![descriptors.len() as u32];
        for descriptor in descriptors {
            words.extend(descriptor.to_words());
        }
        words
    }

    /// Parse a whole connector-builder region
    pub fn parse_region(words: &[u32]) -> MatrixResult<Vec<GeneratorDescriptor>> {
        let mut reader = WordReader::new(words);
        let n = reader.next()? as usize;
        (0..n).map(|_| Self::read(&mut reader)).collect()
    }

    fn read(reader: &mut WordReader<'_>) -> MatrixResult<Self> {
        let (kind_id, connector_params) = reader.next_params()?;
        let kind = ConnectorKind::from_id(kind_id)
            .ok_or_else(|| MatrixError::Unsupported(format!("unknown connector kind {}", kind_id)))?;
        let seed = reader.next_u64()?;
        let allow_self_connections = reader.next()? != 0;
        let (weight_kind, weight_params) = reader.next_params()?;
        let (delay_kind, delay_params) = reader.next_params()?;
        let synapse_type = reader.next()? as u8;
        let dynamics_id = reader.next()?;
        let signed_weights = reader.next()? != 0;
        let self_projection = reader.next()? != 0;
        let n_pre_atoms = reader.next()?;
        let n_post_atoms = reader.next()?;
        let pre_slice = reader.next_slice()?;
        let post_slice = reader.next_slice()?;
        let max_delay_ms = reader.next_f64()?;
        let undelayed = reader.next_target()?;
        let delayed = reader.next_target()?;
        let n_delay_stages = reader.next()?;
        Ok(Self {
            connector: ConnectorDescriptor {
                kind,
                seed,
                allow_self_connections,
                params: connector_params,
            },
            weights: ParamDescriptor {
                kind: weight_kind,
                params: weight_params,
            },
            delays: ParamDescriptor {
                kind: delay_kind,
                params: delay_params,
            },
            synapse_type,
            dynamics_id,
            signed_weights,
            self_projection,
            n_pre_atoms,
            n_post_atoms,
            pre_slice,
            post_slice,
            max_delay_ms,
            undelayed,
            delayed,
            n_delay_stages,
        })
    }
}

/// Connections the machine-side expander produces for a descriptor
pub fn expand_descriptor(descriptor: &GeneratorDescriptor, timestep_ms: f64) -> MatrixResult<Vec<ConnectionTuple>> {
    let connector = descriptor.connector.instantiate()?;
    let (pre, post) = if descriptor.self_projection {
        let population = Arc::new(PopulationDescriptor::new(SELF_LABEL, descriptor.n_pre_atoms));
        (population.clone(), population)
    } else {
        (
            Arc::new(PopulationDescriptor::new("pre", descriptor.n_pre_atoms)),
            Arc::new(PopulationDescriptor::new("post", descriptor.n_post_atoms)),
        )
    };
    let info = SynapseInfo::new("expanded", pre, post, connector.clone())
        .with_weights(descriptor.weights.to_spec()?)
        .with_delays(descriptor.delays.to_spec()?)
        .with_synapse_type(descriptor.synapse_type);
    let ctx = GenerationContext::new(timestep_ms, descriptor.max_delay_ms);
    Ok(connector.generate(&info, &descriptor.pre_slice, &descriptor.post_slice, &ctx)?)
}

/// Row encoding equivalent to a dynamics id; only the row layout and weight sign matter
fn dynamics_for_rows(dynamics_id: u32, signed_weights: bool) -> MatrixResult<SynapseDynamics> {
    match dynamics_id {
        0 | 2 => Ok(SynapseDynamics::Static),
        1 | 3 => {
            let mut stdp = StdpDynamics::default();
            if signed_weights {
                stdp.w_min = -stdp.w_max.abs();
            }
            Ok(SynapseDynamics::Stdp(stdp))
        }
        other => Err(MatrixError::Unsupported(format!("unknown dynamics id {}", other))),
    }
}

fn region_words(regions: &RegionMap, region: DataRegion) -> MatrixResult<Vec<u32>> {
    let bytes = regions
        .get(&region.id())
        .ok_or_else(|| MatrixError::Configuration(format!("region {:?} missing", region)))?;
    Ok(bytes_to_words(bytes)?)
}

/// Expand every descriptor of the connector-builder region into the matrix region
///
/// This is what the simulation core does at load time. Returns the number
/// of connections written.
pub fn expand_generated_blocks(
    regions: &mut RegionMap,
    format: SynapseRowFormat,
    timestep_ms: f64,
    global_weight_scale: f64,
) -> MatrixResult<usize> {
    let shifts = RingBufferShifts(
        region_words(regions, DataRegion::SynapseParams)?
            .iter()
            .map(|w| *w as u8)
            .collect(),
    );
    let weight_scales = shifts.weight_scales(global_weight_scale);
    let descriptors = GeneratorDescriptor::parse_region(&region_words(regions, DataRegion::ConnectorBuilder)?)?;
    let mut matrix = region_words(regions, DataRegion::SynapticMatrix)?;
    let direct_words = matrix.first().copied().unwrap_or(0) as usize / 4;
    if matrix.len() < 1 + direct_words {
        return Err(MatrixError::Configuration(format!(
            "matrix of {} words cannot hold {} direct words",
            matrix.len(),
            direct_words
        )));
    }

    let mut n_connections = 0;
    for descriptor in &descriptors {
        let connections = expand_descriptor(descriptor, timestep_ms)?;
        let dynamics = dynamics_for_rows(descriptor.dynamics_id, descriptor.signed_weights)?;
        let layout = RowBlockLayout {
            undelayed: descriptor.undelayed,
            delayed: descriptor.delayed,
            n_delay_stages: descriptor.n_delay_stages,
        };
        let ctx = RowContext {
            format,
            dynamics: &dynamics,
            post_slice: descriptor.post_slice,
            weight_scales: &weight_scales,
            timestep_ms,
            delay_stage: 0,
        };
        write_row_blocks(
            &mut matrix[1 + direct_words..],
            &connections,
            &descriptor.pre_slice,
            &layout,
            ctx,
            "expanded",
        )?;
        n_connections += connections.len();
    }
    debug!(
        target: "synmatrix-matrix",
        "expanded {} blocks into {} connections",
        descriptors.len(),
        n_connections
    );

    regions.insert(DataRegion::SynapticMatrix.id(), words_to_bytes(&matrix));
    Ok(n_connections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use synmatrix_connectivity::{Connector, FixedProbabilityConnector, ParameterSpec, RandomDistribution};

    fn descriptor() -> GeneratorDescriptor {
        GeneratorDescriptor {
            connector: ConnectorDescriptor {
                kind: ConnectorKind::FixedProbability,
                seed: 0xDEAD_BEEF_0000_0001,
                allow_self_connections: false,
                params: vec![0.3],
            },
            weights: ParamDescriptor {
                kind: ParamDescriptor::UNIFORM,
                params: vec![0.1, 0.5],
            },
            delays: ParamDescriptor {
                kind: ParamDescriptor::CONSTANT,
                params: vec![2.0],
            },
            synapse_type: 1,
            dynamics_id: 0,
            signed_weights: false,
            self_projection: true,
            n_pre_atoms: 40,
            n_post_atoms: 40,
            pre_slice: VertexSlice::new(0, 19).unwrap(),
            post_slice: VertexSlice::new(20, 39).unwrap(),
            max_delay_ms: 2.0,
            undelayed: Some(BlockTarget {
                address: 64,
                row_words: 10,
            }),
            delayed: None,
            n_delay_stages: 0,
        }
    }

    #[test]
    fn test_region_words_parse_back() {
        let descriptors = vec![descriptor(), descriptor()];
        let words = GeneratorDescriptor::region_words(&descriptors);
        assert_eq!(GeneratorDescriptor::parse_region(&words).unwrap(), descriptors);
        assert!(GeneratorDescriptor::parse_region(&words[..words.len() - 1]).is_err());
    }

    #[test]
    fn test_expansion_matches_host_generation() {
        let descriptor = descriptor();
        let population = Arc::new(PopulationDescriptor::new("pop", 40));
        let connector = Arc::new(FixedProbabilityConnector::new(0.3, false).unwrap().with_seed(descriptor.connector.seed));
        let info = SynapseInfo::new("pop->pop", population.clone(), population, connector.clone())
            .with_weights(ParameterSpec::Random(RandomDistribution::Uniform { low: 0.1, high: 0.5 }))
            .with_delays(2.0)
            .with_synapse_type(1);
        let ctx = GenerationContext::new(1.0, 2.0);
        let host = connector
            .generate(&info, &descriptor.pre_slice, &descriptor.post_slice, &ctx)
            .unwrap();

        let expanded = expand_descriptor(&descriptor, 1.0).unwrap();
        assert_eq!(expanded, host);
        assert!(!expanded.is_empty());
    }

    #[test]
    fn test_unsupported_connector_rejected() {
        let mut d = descriptor();
        d.connector.kind = ConnectorKind::FromList;
        assert!(expand_descriptor(&d, 1.0).is_err());
    }
}
