//! Save per-bucket statistics of an aggregated series to a parquet file.

use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use arrow::{
    array::{ArrayRef, Date32Array, Float32Array, Float64Array, UInt64Array},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use chrono::NaiveDate;
use parquet::{arrow::ArrowWriter, file::properties::WriterProperties};

use crate::aggregate::AggregatedSeries;

/// Sidecar path next to the export: same stem, `.parquet` extension.
pub fn summary_path(export_path: &Path) -> PathBuf {
    export_path.with_extension("parquet")
}

pub fn save_summary(series: &AggregatedSeries, file_path: &Path) -> Result<()> {
    let file = File::create(file_path)?;

    let schema = Arc::new(Schema::new(vec![
        Field::new("bucket", DataType::Date32, false),
        Field::new("images", DataType::UInt64, false),
        Field::new("valid_pixels", DataType::UInt64, false),
        Field::new("min", DataType::Float32, true),
        Field::new("max", DataType::Float32, true),
        Field::new("mean", DataType::Float64, true),
        Field::new("total", DataType::Float64, false),
    ]));

    let props = WriterProperties::builder()
        .set_compression(parquet::basic::Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

    let num_rows = series.buckets.len();
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();

    let mut buckets = Vec::with_capacity(num_rows);
    let mut images = Vec::with_capacity(num_rows);
    let mut valid_pixels = Vec::with_capacity(num_rows);
    let mut mins = Vec::with_capacity(num_rows);
    let mut maxs = Vec::with_capacity(num_rows);
    let mut means = Vec::with_capacity(num_rows);
    let mut totals = Vec::with_capacity(num_rows);

    for b in &series.buckets {
        let stats = b.raster.stats();

        buckets.push((b.start - epoch).num_days() as i32);
        images.push(b.image_count as u64);
        valid_pixels.push(stats.valid_pixels);
        mins.push(stats.min);
        maxs.push(stats.max);
        means.push(stats.mean);
        totals.push(stats.total);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Date32Array::from(buckets)),
        Arc::new(UInt64Array::from(images)),
        Arc::new(UInt64Array::from(valid_pixels)),
        Arc::new(Float32Array::from(mins)),
        Arc::new(Float32Array::from(maxs)),
        Arc::new(Float64Array::from(means)),
        Arc::new(Float64Array::from(totals)),
    ];

    let batch = RecordBatch::try_new(schema, columns)?;

    writer.write(&batch)?;

    writer.close()?;

    Ok(())
}

// -- Tests -------------------------------------------------------------------
