// src/report.rs

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::errors::K2rError;
use crate::rank::Rank;
use crate::types::{MinimizerCounts, Node, NodeStats, StatsMap};

/// Parsed kraken2 report, reduced to its species-level rows.
///
/// `regions` holds one row-ordered node list per root tree (a new region
/// starts at every rank-"S" row); `data` carries the read counts for every
/// node in a region. Row indices count every line of the report, so they can
/// be mapped back to the source file.
#[derive(Debug)]
pub struct TaxReport {
    pub data: StatsMap,
    pub regions: Vec<Vec<Node>>,
    /// True when the report carried the two extra minimizer columns.
    pub has_minimizer_data: bool,
}

/// Reads a kraken2 report from disk, transparently decoding `.gz` input.
pub fn read_report<P: AsRef<Path>>(path: P) -> Result<TaxReport, K2rError> {
    let file = File::open(&path)?;
    let is_gz = path
        .as_ref()
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);
    let reader: Box<dyn BufRead> = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    parse_report(reader)
}

/// Parses report lines:
/// ```text
/// pct \t clade_reads \t self_reads [\t clade_minimizers \t self_minimizers] \t rank \t taxid \t name
/// ```
/// The column layout (6 or 8 fields) is fixed by the first well-formed line.
/// Rows outside the species-level rank grammar are skipped; species-level
/// sub-rows before the first "S" row have no root and are dropped too.
pub fn parse_report<R: BufRead>(reader: R) -> Result<TaxReport, K2rError> {
    let mut data = StatsMap::default();
    let mut regions: Vec<Vec<Node>> = Vec::new();
    let mut with_minimizers: Option<bool> = None;

    for (row, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();

        let layout = match with_minimizers {
            Some(layout) => layout,
            None => match parts.len() {
                8 => *with_minimizers.insert(true),
                6 => *with_minimizers.insert(false),
                _ => continue,
            },
        };
        if parts.len() < if layout { 8 } else { 6 } {
            continue;
        }

        let rank_field = if layout { parts[5] } else { parts[3] };
        let Ok(rank) = Rank::parse(rank_field.trim()) else {
            continue;
        };

        let clade_reads = parse_count(parts[1], row, "clade_reads")?;
        let self_reads = parse_count(parts[2], row, "self_reads")?;
        let taxid_field = if layout { parts[6] } else { parts[4] };
        let tax_id: u32 = taxid_field
            .trim()
            .parse()
            .map_err(|_| K2rError::MalformedReport {
                row,
                field: "taxid",
            })?;
        let minimizers = if layout {
            Some(MinimizerCounts {
                clade_minimizers: parse_count(parts[3], row, "clade_minimizers")?,
                self_minimizers: parse_count(parts[4], row, "self_minimizers")?,
            })
        } else {
            None
        };

        let node = Node::new(row, rank);
        if rank == Rank::SPECIES {
            regions.push(Vec::new());
        }
        if let Some(region) = regions.last_mut() {
            region.push(node);
            data.insert(
                node,
                NodeStats {
                    clade_reads,
                    self_reads,
                    tax_id,
                    minimizers,
                },
            );
        }
    }

    if regions.is_empty() {
        return Err(K2rError::NoData);
    }
    Ok(TaxReport {
        data,
        regions,
        has_minimizer_data: with_minimizers.unwrap_or(false),
    })
}

fn parse_count(field: &str, row: usize, name: &'static str) -> Result<u64, K2rError> {
    field
        .trim()
        .parse()
        .map_err(|_| K2rError::MalformedReport { row, field: name })
}
