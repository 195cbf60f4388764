// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Structural plasticity tables.

The machine-side rewiring process needs:
- a post-to-pre table: for every post neuron, `s_max` slots naming the
  pre-synaptic neurons it is currently connected to
- formation probability tables indexed by squared toroidal distance, one for
  feed-forward and one for lateral connections
- the source populations and vertices it may pick new partners from
*/

use synmatrix_neural::{ConnectionTuple, StructuralDynamics, VertexSlice};

use crate::graph::KeyAndMask;
use crate::stdp::pack_half_words;
use crate::types::{MatrixError, MatrixResult};

/// Marker of an unused post-to-pre slot
pub const EMPTY_SLOT: u32 = 0xFFFF_FFFF;

const NEURON_BITS: u32 = 24;
const NEURON_MASK: u32 = (1 << NEURON_BITS) - 1;

/// Distance on a grid that wraps around in every non-zero dimension
///
/// # Example
/// ```
/// use synmatrix_matrix::structural::toroidal_distance;
///
/// assert_eq!(toroidal_distance((0, 0), (9, 0), [10, 10]), 1.0);
/// assert_eq!(toroidal_distance((0, 0), (9, 0), [0, 0]), 9.0);
/// ```
pub fn toroidal_distance(a: (u32, u32), b: (u32, u32), grid: [u32; 2]) -> f64 {
    let wrap = |p: u32, q: u32, extent: u32| -> f64 {
        let delta = p.abs_diff(q);
        if extent > 0 && delta > extent / 2 {
            (extent - delta) as f64
        } else {
            delta as f64
        }
    };
    let dx = wrap(a.0, b.0, grid[0]);
    let dy = wrap(a.1, b.1, grid[1]);
    (dx * dx + dy * dy).sqrt()
}

/// Largest squared toroidal distance between two grid cells
fn max_squared_distance(grid: [u32; 2]) -> u64 {
    let half = |extent: u32| (extent / 2) as u64;
    let (dx, dy) = (half(grid[0]), half(grid[1]));
    dx * dx + dy * dy
}

/// Formation probability by squared distance, as `u16` fixed point
///
/// Entry `d2` holds `p_max * exp(-d2 / (2 sigma^2))` scaled to `0..=65535`
/// (truncated). Trailing zero entries are dropped and the table is padded to
/// an even length.
pub fn generate_formation_lut(p_max: f64, sigma: f64, grid: [u32; 2]) -> Vec<u16> {
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut lut: Vec<u16> = (0..=max_squared_distance(grid))
        .map(|d2| (p_max * (-(d2 as f64) / two_sigma_sq).exp() * u16::MAX as f64) as u16)
        .collect();
    while lut.last() == Some(&0) {
        lut.pop();
    }
    if lut.len() % 2 != 0 {
        lut.push(0);
    }
    lut
}

/// Pack a pre-synaptic population index and neuron into a slot
#[inline]
pub fn pack_slot(pre_population: u8, pre_neuron: u32) -> u32 {
    (pre_population as u32) << NEURON_BITS | (pre_neuron & NEURON_MASK)
}

#[inline]
pub fn unpack_slot(slot: u32) -> Option<(u8, u32)> {
    (slot != EMPTY_SLOT).then(|| ((slot >> NEURON_BITS) as u8, slot & NEURON_MASK))
}

/// Current partners of every post neuron of one slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostToPreTable {
    post_slice: VertexSlice,
    s_max: u32,
    slots: Vec<u32>,
}

impl PostToPreTable {
    pub fn new(post_slice: VertexSlice, s_max: u32) -> Self {
        Self {
            post_slice,
            s_max,
            slots: vec![EMPTY_SLOT; post_slice.n_atoms() as usize * s_max as usize],
        }
    }

    pub fn size_bytes(post_slice: &VertexSlice, s_max: u32) -> usize {
        post_slice.n_atoms() as usize * s_max as usize * 4
    }

    /// Record connections from pre population `pre_population`
    pub fn add_connections(&mut self, pre_population: u8, connections: &[ConnectionTuple]) -> MatrixResult<()> {
        if self.s_max == 0 {
            return Ok(());
        }
        for conn in connections {
            if conn.source > NEURON_MASK {
                return Err(MatrixError::Configuration(format!(
                    "pre neuron {} does not fit the {}-bit rewiring field",
                    conn.source, NEURON_BITS
                )));
            }
            let Some(local) = self.post_slice.local_index(conn.target as u32) else {
                continue;
            };
            let start = local as usize * self.s_max as usize;
            let row = &mut self.slots[start..start + self.s_max as usize];
            match row.iter_mut().find(|slot| **slot == EMPTY_SLOT) {
                Some(slot) => *slot = pack_slot(pre_population, conn.source),
                None => {
                    return Err(MatrixError::Configuration(format!(
                        "post neuron {} has more than s_max = {} initial synapses",
                        conn.target, self.s_max
                    )))
                }
            }
        }
        Ok(())
    }

    /// Partners of one post neuron, in population coordinates
    pub fn partners(&self, post_neuron: u32) -> Vec<(u8, u32)> {
        let Some(local) = self.post_slice.local_index(post_neuron) else {
            return Vec::new();
        };
        let start = local as usize * self.s_max as usize;
        self.slots[start..start + self.s_max as usize]
            .iter()
            .filter_map(|slot| unpack_slot(*slot))
            .collect()
    }

    pub fn words(&self) -> &[u32] {
        &self.slots
    }
}

/// A pre-synaptic population the rewiring process may connect from
#[derive(Debug, Clone, PartialEq)]
pub struct RewiringSource {
    pub label: String,
    pub n_atoms: u32,
    /// Machine vertices of the population feeding this core
    pub vertices: Vec<(KeyAndMask, VertexSlice)>,
}

fn push_lut(words: &mut Vec<u32>, lut: &[u16]) {
    words.push(lut.len() as u32);
    words.extend(pack_half_words(lut));
}

/// Words of the structural block, without the post-to-pre table
pub fn structural_params_words(
    dynamics: &StructuralDynamics,
    post_slice: &VertexSlice,
    timestep_ms: f64,
    sources: &[RewiringSource],
) -> Vec<u32> {
    let mut words = vec![
        dynamics.s_max,
        dynamics.grid[0],
        dynamics.grid[1],
        post_slice.lo_atom(),
        post_slice.hi_atom(),
        (dynamics.p_elim_dep as f32).to_bits(),
        (dynamics.p_elim_pot as f32).to_bits(),
        (dynamics.f_rew as f32).to_bits(),
        (dynamics.initial_weight as f32).to_bits(),
        synmatrix_serialization::delay_to_ticks(dynamics.initial_delay, timestep_ms),
        dynamics.lateral_inhibition as u32,
        dynamics.seed as u32,
        (dynamics.seed >> 32) as u32,
    ];
    push_lut(
        &mut words,
        &generate_formation_lut(dynamics.p_form_forward, dynamics.sigma_form_forward, dynamics.grid),
    );
    push_lut(
        &mut words,
        &generate_formation_lut(dynamics.p_form_lateral, dynamics.sigma_form_lateral, dynamics.grid),
    );

    words.push(sources.len() as u32);
    for source in sources {
        words.push(source.n_atoms);
        words.push(source.vertices.len() as u32);
        for (key_and_mask, slice) in &source.vertices {
            words.extend([key_and_mask.key, key_and_mask.mask, slice.lo_atom(), slice.hi_atom()]);
        }
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toroidal_distance_wraps() {
        assert_eq!(toroidal_distance((0, 0), (3, 4), [16, 16]), 5.0);
        assert_eq!(toroidal_distance((0, 0), (15, 15), [16, 16]), 2f64.sqrt());
        assert_eq!(toroidal_distance((1, 0), (9, 0), [16, 0]), 8.0);
        assert_eq!(toroidal_distance((0, 2), (0, 14), [0, 0]), 12.0);
    }

    #[test]
    fn test_formation_lut() {
        let lut = generate_formation_lut(1.0, 1.0, [16, 16]);
        assert_eq!(lut[0], u16::MAX);
        assert_eq!(lut.len() % 2, 0);
        assert!(lut.windows(2).all(|w| w[1] <= w[0]));
        // exp(-d2 / 2) falls below 1/65535 after d2 = 22
        assert!(lut.len() <= 24);
        assert!(lut[..lut.len() - 1].iter().all(|v| *v > 0));
    }

    #[test]
    fn test_formation_lut_zero_probability() {
        assert!(generate_formation_lut(0.0, 2.0, [8, 8]).is_empty());
    }

    #[test]
    fn test_post_to_pre_table() {
        let slice = VertexSlice::new(10, 13).unwrap();
        let mut table = PostToPreTable::new(slice, 2);
        let conns = [
            ConnectionTuple::new(5, 10, 1.0, 1.0, 0),
            ConnectionTuple::new(6, 10, 1.0, 1.0, 0),
            ConnectionTuple::new(7, 12, 1.0, 1.0, 0),
            ConnectionTuple::new(8, 40, 1.0, 1.0, 0),
        ];
        table.add_connections(1, &conns).unwrap();
        assert_eq!(table.partners(10), vec![(1, 5), (1, 6)]);
        assert_eq!(table.partners(11), vec![]);
        assert_eq!(table.partners(12), vec![(1, 7)]);
        assert_eq!(table.words()[2], EMPTY_SLOT);
        assert_eq!(table.words().len() * 4, PostToPreTable::size_bytes(&slice, 2));

        let overflow = [ConnectionTuple::new(9, 10, 1.0, 1.0, 0)];
        assert!(table.add_connections(0, &overflow).is_err());
    }

    #[test]
    fn test_slot_packing() {
        let slot = pack_slot(3, 0x00AB_CDEF);
        assert_eq!(slot, 0x03AB_CDEF);
        assert_eq!(unpack_slot(slot), Some((3, 0x00AB_CDEF)));
        assert_eq!(unpack_slot(EMPTY_SLOT), None);
    }
}
