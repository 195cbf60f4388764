// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Vertex slices: the atoms of an application vertex held by one core

use super::error::{NeuralError, NeuralResult};

/// Contiguous range of neuron indices `[lo_atom, hi_atom]` (both inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexSlice {
    lo_atom: u32,
    hi_atom: u32,
}

impl VertexSlice {
    pub fn new(lo_atom: u32, hi_atom: u32) -> NeuralResult<Self> {
        if hi_atom < lo_atom {
            return Err(NeuralError::InvalidSlice {
                lo: lo_atom,
                hi: hi_atom,
            });
        }
        Ok(Self { lo_atom, hi_atom })
    }

    /// Slice covering the first `n_atoms` atoms of a vertex
    pub fn whole(n_atoms: u32) -> NeuralResult<Self> {
        if n_atoms == 0 {
            return Err(NeuralError::InvalidSlice { lo: 0, hi: 0 });
        }
        Self::new(0, n_atoms - 1)
    }

    #[inline]
    pub fn lo_atom(&self) -> u32 {
        self.lo_atom
    }

    #[inline]
    pub fn hi_atom(&self) -> u32 {
        self.hi_atom
    }

    #[inline]
    pub fn n_atoms(&self) -> u32 {
        self.hi_atom - self.lo_atom + 1
    }

    #[inline]
    pub fn contains(&self, atom: u32) -> bool {
        atom >= self.lo_atom && atom <= self.hi_atom
    }

    pub fn atoms(&self) -> std::ops::RangeInclusive<u32> {
        self.lo_atom..=self.hi_atom
    }

    /// Position of a population-level atom within this slice
    #[inline]
    pub fn local_index(&self, atom: u32) -> Option<u32> {
        self.contains(atom).then(|| atom - self.lo_atom)
    }

    /// Same lo and hi atom
    #[inline]
    pub fn is_coextensive(&self, other: &VertexSlice) -> bool {
        self == other
    }

    /// Split `n_atoms` into consecutive slices of at most `max_per_slice` atoms
    pub fn split(n_atoms: u32, max_per_slice: u32) -> NeuralResult<Vec<VertexSlice>> {
        if n_atoms == 0 || max_per_slice == 0 {
            return Err(NeuralError::InvalidPartition {
                n_atoms,
                reason: "cannot split into empty slices".to_string(),
            });
        }
        let mut slices = Vec::with_capacity(n_atoms.div_ceil(max_per_slice) as usize);
        let mut lo = 0;
        while lo < n_atoms {
            let hi = (lo + max_per_slice).min(n_atoms) - 1;
            slices.push(VertexSlice { lo_atom: lo, hi_atom: hi });
            lo = hi + 1;
        }
        Ok(slices)
    }
}

impl std::fmt::Display for VertexSlice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}]", self.lo_atom, self.hi_atom)
    }
}

/// Check that `slices` cover `0..n_atoms` exactly once
pub fn validate_partition(slices: &[VertexSlice], n_atoms: u32) -> NeuralResult<()> {
    let mut sorted: Vec<VertexSlice> = slices.to_vec();
    sorted.sort();

    let mut next = 0u32;
    for slice in &sorted {
        if slice.lo_atom != next {
            let reason = if slice.lo_atom < next {
                format!("slice {} overlaps a previous slice", slice)
            } else {
                format!("gap before slice {}", slice)
            };
            return Err(NeuralError::InvalidPartition { n_atoms, reason });
        }
        next = slice.hi_atom + 1;
    }

    if next != n_atoms {
        return Err(NeuralError::InvalidPartition {
            n_atoms,
            reason: format!("slices end at atom {}", next),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_inverted_slice() {
        assert!(VertexSlice::new(5, 4).is_err());
        assert_eq!(VertexSlice::new(4, 4).unwrap().n_atoms(), 1);
    }

    #[test]
    fn test_local_index() {
        let slice = VertexSlice::new(10, 19).unwrap();
        assert_eq!(slice.local_index(10), Some(0));
        assert_eq!(slice.local_index(19), Some(9));
        assert_eq!(slice.local_index(20), None);
    }

    #[test]
    fn test_split_partitions() {
        let slices = VertexSlice::split(600, 256).unwrap();
        assert_eq!(slices.len(), 3);
        assert_eq!(slices[2], VertexSlice::new(512, 599).unwrap());
        assert!(validate_partition(&slices, 600).is_ok());
    }

    #[test]
    fn test_partition_detects_gap_and_overlap() {
        let gap = [VertexSlice::new(0, 9).unwrap(), VertexSlice::new(11, 19).unwrap()];
        assert!(validate_partition(&gap, 20).is_err());

        let overlap = [VertexSlice::new(0, 10).unwrap(), VertexSlice::new(10, 19).unwrap()];
        assert!(validate_partition(&overlap, 20).is_err());

        let short = [VertexSlice::new(0, 9).unwrap()];
        assert!(validate_partition(&short, 20).is_err());
    }
}
