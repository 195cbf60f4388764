// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Region writer abstraction.
//!
//! The loader that moves bytes onto the machine is a collaborator; this
//! crate only calls the four primitives of [`DataSpecWriter`]. A region must
//! be reserved before it can take focus, and writes never exceed the
//! reserved size.

use std::collections::BTreeMap;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{DataSpecError, SerializationError, SerializationResult};

/// Region numbering expected by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum DataRegion {
    /// Ring-buffer left shift per synapse type
    SynapseParams,
    PopulationTable,
    /// Direct rows followed by indirect rows
    SynapticMatrix,
    /// Plasticity parameters, LUTs and rewiring tables
    SynapseDynamics,
    /// Descriptors for on-machine row generation
    ConnectorBuilder,
}

impl DataRegion {
    pub const ALL: [DataRegion; 5] = [
        DataRegion::SynapseParams,
        DataRegion::PopulationTable,
        DataRegion::SynapticMatrix,
        DataRegion::SynapseDynamics,
        DataRegion::ConnectorBuilder,
    ];

    #[inline]
    pub fn id(self) -> u32 {
        match self {
            DataRegion::SynapseParams => 0,
            DataRegion::PopulationTable => 1,
            DataRegion::SynapticMatrix => 2,
            DataRegion::SynapseDynamics => 3,
            DataRegion::ConnectorBuilder => 4,
        }
    }
}

/// Device memory writer primitives
pub trait DataSpecWriter {
    fn reserve_region(&mut self, region: u32, size_bytes: usize) -> Result<(), DataSpecError>;

    fn switch_focus(&mut self, region: u32) -> Result<(), DataSpecError>;

    /// Append one word to the focused region
    fn write_value(&mut self, value: u32) -> Result<(), DataSpecError>;

    /// Append words to the focused region
    fn write_array(&mut self, values: &[u32]) -> Result<(), DataSpecError> {
        for value in values {
            self.write_value(*value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct RegionBuffer {
    size: usize,
    data: Vec<u8>,
}

/// Writer that keeps every region in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryDataSpec {
    regions: BTreeMap<u32, RegionBuffer>,
    focus: Option<u32>,
}

impl MemoryDataSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written so far into a region
    pub fn region(&self, region: u32) -> Option<&[u8]> {
        self.regions.get(&region).map(|buffer| buffer.data.as_slice())
    }

    pub fn reserved_size(&self, region: u32) -> Option<usize> {
        self.regions.get(&region).map(|buffer| buffer.size)
    }

    pub fn n_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Written bytes per region
    pub fn into_regions(self) -> BTreeMap<u32, Vec<u8>> {
        self.regions
            .into_iter()
            .map(|(id, buffer)| (id, buffer.data))
            .collect()
    }
}

impl DataSpecWriter for MemoryDataSpec {
    fn reserve_region(&mut self, region: u32, size_bytes: usize) -> Result<(), DataSpecError> {
        if self.regions.contains_key(&region) {
            return Err(DataSpecError::RegionAlreadyReserved(region));
        }
        self.regions.insert(
            region,
            RegionBuffer {
                size: size_bytes,
                data: Vec::with_capacity(size_bytes),
            },
        );
        Ok(())
    }

    fn switch_focus(&mut self, region: u32) -> Result<(), DataSpecError> {
        if !self.regions.contains_key(&region) {
            return Err(DataSpecError::RegionNotReserved(region));
        }
        self.focus = Some(region);
        Ok(())
    }

    fn write_value(&mut self, value: u32) -> Result<(), DataSpecError> {
        let region = self.focus.ok_or(DataSpecError::NoFocus)?;
        let buffer = self
            .regions
            .get_mut(&region)
            .ok_or(DataSpecError::RegionNotReserved(region))?;
        if buffer.data.len() + 4 > buffer.size {
            return Err(DataSpecError::RegionOverflow {
                region,
                size: buffer.size,
                attempted: buffer.data.len() + 4,
            });
        }
        // Writing into a Vec cannot fail
        let _ = buffer.data.write_u32::<LittleEndian>(value);
        Ok(())
    }
}

/// Little-endian words of a byte buffer whose length is a multiple of 4
pub fn bytes_to_words(bytes: &[u8]) -> SerializationResult<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(SerializationError::MalformedTable(format!(
            "{} bytes is not a whole number of words",
            bytes.len()
        )));
    }
    let mut words = vec![0u32; bytes.len() / 4];
    LittleEndian::read_u32_into(bytes, &mut words);
    Ok(words)
}

pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    let mut bytes = vec![0u8; words.len() * 4];
    LittleEndian::write_u32_into(words, &mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_requires_reservation_and_focus() {
        let mut spec = MemoryDataSpec::new();
        assert_eq!(spec.write_value(1), Err(DataSpecError::NoFocus));
        assert_eq!(spec.switch_focus(3), Err(DataSpecError::RegionNotReserved(3)));
        spec.reserve_region(3, 4).unwrap();
        assert_eq!(spec.reserve_region(3, 4), Err(DataSpecError::RegionAlreadyReserved(3)));
    }

    #[test]
    fn test_overflow_detected() {
        let mut spec = MemoryDataSpec::new();
        spec.reserve_region(0, 4).unwrap();
        spec.switch_focus(0).unwrap();
        spec.write_value(7).unwrap();
        assert!(matches!(
            spec.write_value(8),
            Err(DataSpecError::RegionOverflow { region: 0, size: 4, attempted: 8 })
        ));
    }

    #[test]
    fn test_word_conversion() {
        let words = [0x0403_0201, 0xdead_beef];
        let bytes = words_to_bytes(&words);
        assert_eq!(&bytes[..4], &[1, 2, 3, 4]);
        assert_eq!(bytes_to_words(&bytes).unwrap(), words);
        assert!(bytes_to_words(&bytes[..5]).is_err());
    }

    #[test]
    fn test_region_ids() {
        let ids: Vec<u32> = DataRegion::ALL.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }
}
