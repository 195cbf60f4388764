// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Master population table.
//!
//! Maps an incoming spike's routing key to the block of synapse rows that
//! the spiking neuron's source vertex feeds on this core.
//!
//! # Format
//! ```text
//! u32 n_entries
//! u32 n_addresses
//! n_entries  x { u32 key, u32 mask, u16 start, u16 count }   (sorted by key)
//! n_addresses x u32 address word
//! ```
//!
//! Address word: `is_single:1 | address:22 | (row_words - 1):9`. Indirect
//! block addresses are in units of the address granularity; single (direct)
//! block addresses are word offsets into the direct block.

use std::collections::BTreeMap;

use byteorder::{ByteOrder, LittleEndian};
use tracing::trace;

use crate::error::{SerializationError, SerializationResult};

const BYTES_PER_WORD: u32 = 4;

//region Address Entry

/// One block of rows reachable from a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AddressEntry {
    /// Byte offset of the block within its sub-block (direct or indirect)
    pub address: u32,
    /// Words per row, including padding
    pub row_words: u32,
    /// Rows are single direct words
    pub is_single: bool,
}

impl AddressEntry {
    pub const ADDRESS_BITS: u32 = 22;

    pub const ROW_LENGTH_BITS: u32 = 9;

    /// Longest row an address word can describe
    pub const MAX_ROW_WORDS: u32 = 1 << Self::ROW_LENGTH_BITS;

    const SINGLE_FLAG: u32 = 1 << 31;

    const ADDRESS_MASK: u32 = (1 << Self::ADDRESS_BITS) - 1;

    const ROW_LENGTH_MASK: u32 = (1 << Self::ROW_LENGTH_BITS) - 1;

    pub fn indirect(address: u32, row_words: u32) -> Self {
        Self {
            address,
            row_words,
            is_single: false,
        }
    }

    pub fn single(address: u32) -> Self {
        Self {
            address,
            row_words: 1,
            is_single: true,
        }
    }

    /// Pack into an address word
    pub fn to_word(&self, granularity: u32) -> SerializationResult<u32> {
        let unit = if self.is_single { BYTES_PER_WORD } else { granularity };
        if self.address % unit != 0 {
            return Err(SerializationError::AddressNotAligned {
                address: self.address,
                granularity: unit,
            });
        }
        let field = self.address / unit;
        if field > Self::ADDRESS_MASK {
            return Err(SerializationError::AddressOutOfRange {
                address: self.address as u64,
                max: (Self::ADDRESS_MASK as u64 + 1) * unit as u64,
            });
        }
        if self.row_words == 0 || self.row_words > Self::MAX_ROW_WORDS {
            return Err(SerializationError::RowLengthOutOfRange {
                row_words: self.row_words,
                max: Self::MAX_ROW_WORDS,
            });
        }
        let flag = if self.is_single { Self::SINGLE_FLAG } else { 0 };
        Ok(flag | (field << Self::ROW_LENGTH_BITS) | (self.row_words - 1))
    }

    pub fn from_word(word: u32, granularity: u32) -> Self {
        let is_single = word & Self::SINGLE_FLAG != 0;
        let unit = if is_single { BYTES_PER_WORD } else { granularity };
        Self {
            address: ((word >> Self::ROW_LENGTH_BITS) & Self::ADDRESS_MASK) * unit,
            row_words: (word & Self::ROW_LENGTH_MASK) + 1,
            is_single,
        }
    }
}

//endregion

//region Master Population Entry

/// All blocks reached by one `(key, mask)`
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MasterPopulationEntry {
    pub key: u32,
    pub mask: u32,
    pub addresses: Vec<AddressEntry>,
}

impl MasterPopulationEntry {
    pub const SIZE_BYTES: usize = 12;

    /// Key matches this entry's key under its mask
    #[inline]
    pub fn matches(&self, spike_key: u32) -> bool {
        spike_key & self.mask == self.key
    }

    /// Neuron index carried in the unmasked bits of a key
    #[inline]
    pub fn neuron_of(&self, spike_key: u32) -> u32 {
        spike_key & !self.mask
    }
}

/// Row of one neuron found by [`MasterPopulationTable::lookup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLocation {
    /// Byte offset of the row within its sub-block
    pub address: u32,
    pub row_words: u32,
    pub is_single: bool,
    /// Index of the spiking neuron relative to its source slice
    pub neuron: u32,
}

//endregion

//region Builder

/// Accumulates entries for one post-synaptic core
///
/// # Example
/// ```
/// use synmatrix_serialization::{MasterPopTableBuilder, MasterPopulationTable, words_to_bytes};
///
/// let mut builder = MasterPopTableBuilder::new(16).unwrap();
/// builder.begin();
/// let address = builder.next_aligned_address(20).unwrap();
/// assert_eq!(address, 32);
/// builder.add_entry(0x100, 0xFFFF_FF00, address, 8, false).unwrap();
/// let table = MasterPopulationTable::from_bytes(&words_to_bytes(&builder.finish().unwrap()), 16).unwrap();
/// let rows = table.lookup(0x103);
/// assert_eq!(rows[0].address, 32 + 3 * 8 * 4);
/// ```
#[derive(Debug, Clone)]
pub struct MasterPopTableBuilder {
    granularity: u32,
    entries: BTreeMap<u32, MasterPopulationEntry>,
}

impl MasterPopTableBuilder {
    pub const HEADER_BYTES: usize = 8;

    pub const ADDRESS_BYTES: usize = 4;

    pub fn new(granularity: u32) -> SerializationResult<Self> {
        if granularity < BYTES_PER_WORD || !granularity.is_power_of_two() {
            return Err(SerializationError::InvalidGranularity(granularity));
        }
        Ok(Self {
            granularity,
            entries: BTreeMap::new(),
        })
    }

    /// Bytes of a serialized table
    #[inline]
    pub fn sdram_bytes(n_entries: usize, n_addresses: usize) -> usize {
        Self::HEADER_BYTES + n_entries * MasterPopulationEntry::SIZE_BYTES + n_addresses * Self::ADDRESS_BYTES
    }

    #[inline]
    pub fn granularity(&self) -> u32 {
        self.granularity
    }

    /// Largest indirect block address the table can point at
    pub fn max_indirect_address(&self) -> u64 {
        (AddressEntry::ADDRESS_MASK as u64) * self.granularity as u64
    }

    /// Discard every entry
    pub fn begin(&mut self) {
        self.entries.clear();
    }

    /// Round a candidate block address up to the granularity
    pub fn next_aligned_address(&self, candidate: u32) -> SerializationResult<u32> {
        let granularity = self.granularity as u64;
        let aligned = (candidate as u64).div_ceil(granularity) * granularity;
        u32::try_from(aligned).map_err(|_| SerializationError::AddressOutOfRange {
            address: aligned,
            max: self.max_indirect_address(),
        })
    }

    /// Register a block of rows for `(key, mask)`
    ///
    /// Blocks sharing a key are kept in insertion order; a key registered
    /// again with a different mask is rejected.
    pub fn add_entry(
        &mut self,
        key: u32,
        mask: u32,
        address: u32,
        row_words: u32,
        is_single: bool,
    ) -> SerializationResult<()> {
        let entry = if is_single {
            AddressEntry::single(address)
        } else {
            AddressEntry {
                address,
                row_words,
                is_single,
            }
        };
        // Validates alignment and field widths now rather than at finish
        entry.to_word(self.granularity)?;

        let slot = self.entries.entry(key).or_insert_with(|| MasterPopulationEntry {
            key,
            mask,
            addresses: Vec::new(),
        });
        if slot.mask != mask {
            return Err(SerializationError::ConflictingEntry {
                key,
                mask,
                existing: slot.mask,
            });
        }
        if slot.addresses.len() >= u16::MAX as usize {
            return Err(SerializationError::MalformedTable(format!(
                "key {:#010x} has too many blocks",
                key
            )));
        }
        trace!(target: "synmatrix-serialization", "pop table key {:#010x} -> {:?}", key, entry);
        slot.addresses.push(entry);
        Ok(())
    }

    pub fn n_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn n_addresses(&self) -> usize {
        self.entries.values().map(|e| e.addresses.len()).sum()
    }

    /// Bytes the table will occupy once finished
    pub fn size_bytes(&self) -> usize {
        Self::sdram_bytes(self.n_entries(), self.n_addresses())
    }

    /// Serialize, entries sorted by key
    pub fn finish(&self) -> SerializationResult<Vec<u32>> {
        let n_addresses = self.n_addresses();
        let mut words = Vec::with_capacity(self.size_bytes() / 4);
        words.push(self.entries.len() as u32);
        words.push(n_addresses as u32);

        let mut start: u32 = 0;
        for entry in self.entries.values() {
            let count = entry.addresses.len() as u32;
            if start > u16::MAX as u32 {
                return Err(SerializationError::MalformedTable(format!(
                    "{} address entries exceed the 16-bit start index",
                    n_addresses
                )));
            }
            words.push(entry.key);
            words.push(entry.mask);
            words.push(start | (count << 16));
            start += count;
        }
        for entry in self.entries.values() {
            for address in &entry.addresses {
                words.push(address.to_word(self.granularity)?);
            }
        }
        Ok(words)
    }
}

//endregion

//region Decoded Table

/// A table read back from its serialized form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterPopulationTable {
    entries: Vec<MasterPopulationEntry>,
}

impl MasterPopulationTable {
    pub fn from_bytes(bytes: &[u8], granularity: u32) -> SerializationResult<Self> {
        if bytes.len() < MasterPopTableBuilder::HEADER_BYTES {
            return Err(SerializationError::MalformedTable(format!(
                "{} bytes is shorter than the header",
                bytes.len()
            )));
        }
        let n_entries = LittleEndian::read_u32(&bytes[0..4]) as usize;
        let n_addresses = LittleEndian::read_u32(&bytes[4..8]) as usize;
        let needed = MasterPopTableBuilder::sdram_bytes(n_entries, n_addresses);
        if bytes.len() < needed {
            return Err(SerializationError::MalformedTable(format!(
                "{} entries and {} addresses need {} bytes, got {}",
                n_entries,
                n_addresses,
                needed,
                bytes.len()
            )));
        }

        let address_base = MasterPopTableBuilder::HEADER_BYTES + n_entries * MasterPopulationEntry::SIZE_BYTES;
        let read_address = |index: usize| -> u32 {
            let at = address_base + index * MasterPopTableBuilder::ADDRESS_BYTES;
            LittleEndian::read_u32(&bytes[at..at + 4])
        };

        let mut entries = Vec::with_capacity(n_entries);
        for i in 0..n_entries {
            let at = MasterPopTableBuilder::HEADER_BYTES + i * MasterPopulationEntry::SIZE_BYTES;
            let key = LittleEndian::read_u32(&bytes[at..at + 4]);
            let mask = LittleEndian::read_u32(&bytes[at + 4..at + 8]);
            let start = LittleEndian::read_u16(&bytes[at + 8..at + 10]) as usize;
            let count = LittleEndian::read_u16(&bytes[at + 10..at + 12]) as usize;
            if start + count > n_addresses {
                return Err(SerializationError::MalformedTable(format!(
                    "entry {} addresses {}..{} beyond {} addresses",
                    i,
                    start,
                    start + count,
                    n_addresses
                )));
            }
            let addresses = (start..start + count)
                .map(|index| AddressEntry::from_word(read_address(index), granularity))
                .collect();
            entries.push(MasterPopulationEntry { key, mask, addresses });
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[MasterPopulationEntry] {
        &self.entries
    }

    /// Entry whose `(key, mask)` accepts the spike key
    pub fn find_entry(&self, spike_key: u32) -> Option<&MasterPopulationEntry> {
        let idx = self.entries.partition_point(|e| e.key <= spike_key);
        if idx == 0 {
            return None;
        }
        let candidate = &self.entries[idx - 1];
        candidate.matches(spike_key).then_some(candidate)
    }

    /// Rows of the neuron that sent `spike_key`, one per block; empty if unknown
    ///
    /// Rows whose offset does not fit the 32-bit address space are skipped.
    pub fn lookup(&self, spike_key: u32) -> Vec<RowLocation> {
        let Some(entry) = self.find_entry(spike_key) else {
            return Vec::new();
        };
        let neuron = entry.neuron_of(spike_key);
        entry
            .addresses
            .iter()
            .filter_map(|a| {
                let address = neuron
                    .checked_mul(a.row_words)
                    .and_then(|words| words.checked_mul(BYTES_PER_WORD))
                    .and_then(|offset| a.address.checked_add(offset))?;
                Some(RowLocation {
                    address,
                    row_words: a.row_words,
                    is_single: a.is_single,
                    neuron,
                })
            })
            .collect()
    }
}

//endregion
