// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Writing and reading the indirect rows of one block.

A block covers one projection from one pre-synaptic vertex. Stage-0 rows
(one per pre atom) go to the undelayed target; rows for delay stages
`1..=n` go to the delayed target, row `(stage - 1) * n_pre + atom`.

Host encoding and the on-machine expander emulation both write through
[`write_row_blocks`], so the two produce identical bytes for identical
connections.
*/

use synmatrix_neural::{ConnectionTuple, VertexSlice};
use synmatrix_serialization::{decode_row, delay_to_ticks, encode_row, RowContext};

use crate::generator::BlockTarget;
use crate::types::{MatrixError, MatrixResult};

const BYTES_PER_WORD: u32 = 4;

/// Where the rows of one block live within the indirect matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBlockLayout {
    pub undelayed: Option<BlockTarget>,
    pub delayed: Option<BlockTarget>,
    pub n_delay_stages: u32,
}

/// Connections of a block grouped into rows, `stage * n_pre + atom`
fn group_rows(
    connections: &[ConnectionTuple],
    pre_slice: &VertexSlice,
    ctx: &RowContext<'_>,
    n_delay_stages: u32,
    label: &str,
) -> MatrixResult<Vec<Vec<ConnectionTuple>>> {
    let n_pre = pre_slice.n_atoms() as usize;
    let mut rows = vec![Vec::new(); n_pre * (n_delay_stages as usize + 1)];
    for conn in connections {
        let atom = pre_slice.local_index(conn.source).ok_or_else(|| {
            MatrixError::Configuration(format!(
                "{}: source {} outside pre slice {}",
                label, conn.source, pre_slice
            ))
        })?;
        let (stage, _) = ctx.format.split_delay(delay_to_ticks(conn.delay, ctx.timestep_ms));
        if stage > n_delay_stages {
            return Err(MatrixError::TooManyDelayStages {
                label: label.to_string(),
                needed: stage,
                max: n_delay_stages,
            });
        }
        rows[stage as usize * n_pre + atom as usize].push(*conn);
    }
    Ok(rows)
}

/// Encode every row of a block into `indirect`; returns the saturated weight count
pub fn write_row_blocks(
    indirect: &mut [u32],
    connections: &[ConnectionTuple],
    pre_slice: &VertexSlice,
    layout: &RowBlockLayout,
    ctx: RowContext<'_>,
    label: &str,
) -> MatrixResult<u32> {
    let n_pre = pre_slice.n_atoms() as usize;
    let rows = group_rows(connections, pre_slice, &ctx, layout.n_delay_stages, label)?;
    let mut n_saturated = 0;

    for (index, row) in rows.iter().enumerate() {
        let stage = (index / n_pre) as u32;
        let atom = index % n_pre;
        let (target, row_index) = if stage == 0 {
            (layout.undelayed, atom)
        } else {
            (layout.delayed, (stage as usize - 1) * n_pre + atom)
        };
        let Some(target) = target else {
            if row.is_empty() {
                continue;
            }
            return Err(MatrixError::RowTooLong {
                label: label.to_string(),
                n_connections: row.len(),
                max: 0,
            });
        };

        let encoded = encode_row(row, &RowContext { delay_stage: stage, ..ctx })?;
        let row_words = target.row_words as usize;
        if encoded.words.len() > row_words {
            return Err(MatrixError::RowLengthMismatch {
                label: label.to_string(),
                planned: row_words,
                actual: encoded.words.len(),
            });
        }
        let start = (target.address / BYTES_PER_WORD) as usize + row_index * row_words;
        let end = start + encoded.words.len();
        if end > indirect.len() {
            return Err(MatrixError::SdramOverflow {
                vertex: label.to_string(),
                written: end * BYTES_PER_WORD as usize,
                budget: indirect.len() * BYTES_PER_WORD as usize,
            });
        }
        indirect[start..end].copy_from_slice(&encoded.words);
        n_saturated += encoded.n_saturated;
    }
    Ok(n_saturated)
}

/// Decode every row of a block back into connections
pub fn read_row_blocks(
    indirect: &[u32],
    pre_slice: &VertexSlice,
    layout: &RowBlockLayout,
    ctx: RowContext<'_>,
) -> MatrixResult<Vec<ConnectionTuple>> {
    let n_pre = pre_slice.n_atoms() as usize;
    let mut connections = Vec::new();
    let stages = layout
        .undelayed
        .map(|t| (0u32, t))
        .into_iter()
        .chain((1..=layout.n_delay_stages).filter_map(|s| layout.delayed.map(|t| (s, t))));

    for (stage, target) in stages {
        for (atom, source) in pre_slice.atoms().enumerate() {
            let row_index = if stage == 0 {
                atom
            } else {
                (stage as usize - 1) * n_pre + atom
            };
            let start = (target.address / BYTES_PER_WORD) as usize + row_index * target.row_words as usize;
            let end = (start + target.row_words as usize).min(indirect.len());
            if start >= end {
                return Err(MatrixError::Configuration(format!(
                    "row {} of stage {} lies beyond the {}-word matrix",
                    row_index,
                    stage,
                    indirect.len()
                )));
            }
            let (row, _) = decode_row(&indirect[start..end], source, &RowContext { delay_stage: stage, ..ctx })?;
            connections.extend(row);
        }
    }
    Ok(connections)
}
