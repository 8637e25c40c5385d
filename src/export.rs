//! Writes an aggregated series to a multi-page GeoTIFF.
//!
//! Each bucket becomes one `f32` page, in chronological order, carrying the
//! GeoTIFF tie point, pixel scale and key directory of the output grid plus
//! the bucket's first day as its image description.

use std::{
    io::{Seek, Write},
    path::{Path, PathBuf},
};

use serde::Serialize;
use tempfile::NamedTempFile;
use tiff::{
    encoder::{colortype, TiffEncoder},
    tags::Tag,
};
use tracing::info;

use crate::{
    aggregate::AggregatedSeries,
    error::{Error, Result},
    request::{grid::METERS_PER_DEGREE, Grid},
};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// The file written by [`export`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportArtifact {
    pub path: PathBuf,
    pub crs: String,
    pub scale_meters: f64,
    pub width: u32,
    pub height: u32,
    pub bands: usize,
}

/// Writes `series` to `path` on `grid`, replacing any existing file.
pub fn export(series: &AggregatedSeries, path: &Path, grid: &Grid) -> Result<ExportArtifact> {
    let dir = match path.parent() {
        Some(dir) if dir.as_os_str().is_empty() => Path::new("."),
        Some(dir) => dir,
        None => return Err(Error::Export(format!("`{}` is not a file path", path.display()))),
    };
    if !dir.is_dir() {
        return Err(Error::Export(format!(
            "directory `{}` does not exist",
            dir.display()
        )));
    }
    if series.buckets.is_empty() {
        return Err(Error::Export(
            "no images matched the request; nothing to export".to_string(),
        ));
    }
    if !grid.is_geographic() {
        return Err(Error::Export(format!("unsupported output CRS `{}`", grid.crs)));
    }

    // Staged next to `path`, which is only replaced once every page is written.
    let mut staged = NamedTempFile::new_in(dir)
        .map_err(|e| Error::Export(format!("cannot write in `{}`: {}", dir.display(), e)))?;
    write_pages(staged.as_file_mut(), series, grid)?;
    staged
        .persist(path)
        .map_err(|e| Error::Export(format!("cannot write `{}`: {}", path.display(), e.error)))?;

    let artifact = ExportArtifact {
        path: path.to_path_buf(),
        crs: grid.crs.clone(),
        scale_meters: grid.pixel_size * METERS_PER_DEGREE,
        width: grid.width,
        height: grid.height,
        bands: series.buckets.len(),
    };
    info!(
        path = %artifact.path.display(),
        bands = artifact.bands,
        width = artifact.width,
        height = artifact.height,
        "export written"
    );

    Ok(artifact)
}

/// Encodes one `f32` page per bucket into `writer`.
fn write_pages<W: Write + Seek>(
    writer: W,
    series: &AggregatedSeries,
    grid: &Grid,
) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer).map_err(encode_error)?;

    let pixel_scale = [grid.pixel_size, grid.pixel_size, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, grid.origin_x, grid.origin_y, 0.0];
    let geo_keys = geo_key_directory(grid);

    for bucket in &series.buckets {
        let raster = bucket.raster.resample(grid.width, grid.height);
        let description = bucket.start.format("%Y-%m-%d").to_string();

        let mut image = encoder
            .new_image::<colortype::Gray32Float>(grid.width, grid.height)
            .map_err(encode_error)?;
        let dir = image.encoder();
        dir.write_tag(Tag::ImageDescription, description.as_str())
            .map_err(encode_error)?;
        dir.write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &pixel_scale[..])
            .map_err(encode_error)?;
        dir.write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])
            .map_err(encode_error)?;
        dir.write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &geo_keys[..])
            .map_err(encode_error)?;
        dir.write_tag(Tag::Unknown(GDAL_NODATA), "nan")
            .map_err(encode_error)?;
        image.write_data(&raster.values).map_err(encode_error)?;
    }

    Ok(())
}

// Geographic model, pixel-is-area raster, EPSG geographic type.
fn geo_key_directory(grid: &Grid) -> Vec<u16> {
    vec![
        1, 1, 0, 3, //
        1024, 0, 1, 2, //
        1025, 0, 1, 1, //
        2048, 0, 1, grid.epsg as u16,
    ]
}

fn encode_error(e: tiff::TiffError) -> Error {
    Error::Export(format!("GeoTIFF encoding failed: {}", e))
}

// -- Tests -------------------------------------------------------------------
