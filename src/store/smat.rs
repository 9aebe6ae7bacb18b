//! Adjacency artifact codec.
//!
//! Text format, one file per period named `adj_<period>.smat`:
//!
//! ```text
//! <rows> <cols> <nnz>
//! <row> <col> 1
//! ...
//! ```
//!
//! Indices are 0-based (`row = id - 1`), rows ascending, then cols ascending.

use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

use regex_lite::Regex;

use super::snapshot::Snapshot;
use crate::error::GraphError;
use crate::types::{Edge, EntityId, PeriodKey};

/// Upper bound on entries reserved up front from an untrusted header.
const MAX_PREALLOCATED_ENTRIES: usize = 1 << 16;

/// File name for a period's artifact.
pub fn file_name(period: &PeriodKey) -> String {
    format!("adj_{period}.smat")
}

/// Period encoded in an artifact file name, if it is one.
pub fn period_from_file_name(name: &str) -> Option<PeriodKey> {
    let pattern = Regex::new(r"^adj_(\d{4}-\d{2}(?:-\d{2})?)\.smat$").ok()?;
    let caps = pattern.captures(name)?;
    PeriodKey::parse(caps.get(1)?.as_str()).ok()
}

/// Write one snapshot.
pub fn write_smat<W: Write>(snapshot: &Snapshot, writer: W) -> Result<(), GraphError> {
    let mut out = BufWriter::new(writer);
    writeln!(out, "{} {} {}", snapshot.dim(), snapshot.dim(), snapshot.edge_count())?;
    for edge in snapshot.edges() {
        writeln!(out, "{} {} 1", edge.source.index(), edge.target.index())?;
    }
    out.flush()?;
    Ok(())
}

/// Write one snapshot to `dir/adj_<period>.smat`.
pub fn write_smat_file(snapshot: &Snapshot, dir: &Path) -> Result<(), GraphError> {
    let file = std::fs::File::create(dir.join(file_name(snapshot.period())))?;
    write_smat(snapshot, file)
}

/// Read one snapshot of an index with `dim` entities.
///
/// The header must declare a `dim x dim` matrix with at most `dim * dim`
/// entries; anything else is rejected before the body is read.
/// `what` names the artifact in errors. Zero-valued entries are skipped.
pub fn read_smat<R: BufRead>(
    period: PeriodKey,
    dim: usize,
    populated: usize,
    reader: R,
    what: &str,
) -> Result<Snapshot, GraphError> {
    let corrupt = |reason: String| GraphError::CorruptArtifact {
        what: what.to_string(),
        reason,
    };

    let mut lines = reader.lines();
    let header = lines
        .next()
        .transpose()?
        .ok_or_else(|| corrupt("empty file".to_string()))?;
    let dims = parse_triplet(&header).ok_or_else(|| corrupt(format!("bad header {header:?}")))?;
    let (rows, cols, nnz) = dims;
    if rows != cols {
        return Err(corrupt(format!("non-square {rows}x{cols}")));
    }
    if rows != dim {
        return Err(corrupt(format!("header declares {rows}x{cols}, index has {dim} entities")));
    }
    if nnz > dim.saturating_mul(dim) {
        return Err(corrupt(format!("header declares {nnz} entries for a {dim}x{dim} matrix")));
    }

    let mut edges = Vec::with_capacity(nnz.min(MAX_PREALLOCATED_ENTRIES));
    let mut entries = 0usize;
    for (line_no, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (row, col, value) = parse_triplet(&line)
            .ok_or_else(|| corrupt(format!("bad entry on line {}: {line:?}", line_no + 2)))?;
        if row >= rows || col >= cols {
            return Err(corrupt(format!("entry ({row}, {col}) outside {rows}x{cols}")));
        }
        entries += 1;
        if value != 0 {
            edges.push(Edge::new(EntityId::from_index(row), EntityId::from_index(col)));
        }
    }
    if entries != nnz {
        return Err(corrupt(format!("header declares {nnz} entries, found {entries}")));
    }

    Ok(Snapshot::from_edges(period, rows, populated, edges))
}

fn parse_triplet(line: &str) -> Option<(usize, usize, usize)> {
    let mut parts = line.split_whitespace();
    let a = parts.next()?.parse().ok()?;
    let b = parts.next()?.parse().ok()?;
    // values may be written as floats by other tools
    let c = parts.next()?.parse::<f64>().ok()?;
    if parts.next().is_some() || c < 0.0 {
        return None;
    }
    Some((a, b, c as usize))
}
