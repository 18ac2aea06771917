//! Writing pipeline output to disk
//!
//! Records flatten to one CSV row per data point; the full run (records,
//! stats, summary) serializes to JSON.

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::ExportError;
use crate::pipeline::{PipelineOutput, PipelineSummary};
use crate::series::SourceRecord;

#[derive(Debug, Serialize)]
struct PointRow<'a> {
    source_id: &'a str,
    name: &'a str,
    percentile: u32,
    year: i32,
    value: f64,
}

#[derive(Debug, Serialize)]
struct SummaryRow {
    percentile: u32,
    total_revenue: Option<f64>,
    total_cost: Option<f64>,
    npv: Option<f64>,
    irr: Option<f64>,
    min_dscr: Option<f64>,
    avg_dscr: Option<f64>,
}

/// Write every data point as `source_id,name,percentile,year,value`
pub fn write_csv<W: Write>(records: &[SourceRecord], writer: W) -> Result<usize, ExportError> {
    let mut writer = csv::Writer::from_writer(writer);
    let mut rows = 0;

    for record in records {
        let name = if record.metadata.name.is_empty() {
            record.id.as_str()
        } else {
            record.metadata.name.as_str()
        };
        for band in &record.bands {
            for point in &band.data {
                writer.serialize(PointRow {
                    source_id: &record.id,
                    name,
                    percentile: band.percentile.value,
                    year: point.year,
                    value: point.value,
                })?;
                rows += 1;
            }
        }
    }

    writer.flush()?;
    Ok(rows)
}

pub fn write_csv_file(records: &[SourceRecord], path: &Path) -> Result<usize, ExportError> {
    write_csv(records, BufWriter::new(File::create(path)?))
}

/// One row of headline metrics per percentile
pub fn write_summary_csv<W: Write>(
    summary: &PipelineSummary,
    writer: W,
) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(writer);
    for s in &summary.percentiles {
        writer.serialize(SummaryRow {
            percentile: s.percentile,
            total_revenue: s.total_revenue,
            total_cost: s.total_cost,
            npv: s.npv,
            irr: s.irr,
            min_dscr: s.min_dscr,
            avg_dscr: s.avg_dscr,
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summary_csv_file(summary: &PipelineSummary, path: &Path) -> Result<(), ExportError> {
    write_summary_csv(summary, BufWriter::new(File::create(path)?))
}

pub fn write_json<W: Write>(output: &PipelineOutput, writer: W) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(writer, output)?;
    Ok(())
}

pub fn write_json_file(output: &PipelineOutput, path: &Path) -> Result<(), ExportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_json(output, &mut writer)?;
    writer.flush()?;
    Ok(())
}
