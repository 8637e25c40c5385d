//! Typed extraction request and the builder that assembles it from settings.

pub mod grid;
pub mod region;

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::Config,
    error::{Error, Result},
};

pub use grid::Grid;
pub use region::Polygon;

/// Calendar interval used to bucket images before reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Day,
    Month,
    Year,
}

impl Frequency {
    /// First day of the bucket containing `date`.
    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Frequency::Day => date,
            Frequency::Month => date.with_day(1).unwrap_or(date),
            Frequency::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Day => "day",
            Frequency::Month => "month",
            Frequency::Year => "year",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "day" => Ok(Frequency::Day),
            "month" => Ok(Frequency::Month),
            "year" => Ok(Frequency::Year),
            other => Err(Error::InvalidRequest(format!("unknown frequency `{}`", other))),
        }
    }
}

/// Per-pixel reduction applied to the rasters of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Sum,
    Mean,
    Min,
    Max,
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reducer::Sum => "sum",
            Reducer::Mean => "mean",
            Reducer::Min => "min",
            Reducer::Max => "max",
        };
        f.write_str(name)
    }
}

impl FromStr for Reducer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sum" => Ok(Reducer::Sum),
            "mean" => Ok(Reducer::Mean),
            "min" => Ok(Reducer::Min),
            "max" => Ok(Reducer::Max),
            other => Err(Error::InvalidRequest(format!("unknown reducer `{}`", other))),
        }
    }
}

/// Everything needed to run one extraction. Built once, then only borrowed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionRequest {
    pub location: String,
    pub dataset_id: String,
    pub band: String,
    pub region: Polygon,
    pub start_date: NaiveDate,
    /// Exclusive upper bound
    pub end_date: NaiveDate,
    pub frequency: Frequency,
    pub reducer: Reducer,
    pub output_crs: String,
    pub output_scale_meters: f64,
    pub output_path: PathBuf,
}

impl ExtractionRequest {
    /// Whether `date` falls in `[start_date, end_date)`.
    pub fn window_contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date < self.end_date
    }

    pub fn grid(&self) -> Result<Grid> {
        Grid::for_region(&self.region, &self.output_crs, self.output_scale_meters)
    }
}

/// Dataset and output settings shared by every request.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    pub dataset_id: String,
    pub band: String,
    pub reducer: Reducer,
    pub crs: String,
    pub scale: f64,
    pub out_dir: PathBuf,
}

impl RequestBuilder {
    pub fn from_config(config: &Config) -> Self {
        RequestBuilder {
            dataset_id: config.dataset.clone(),
            band: config.band.clone(),
            reducer: config.reducer,
            crs: config.crs.clone(),
            scale: config.scale,
            out_dir: config.out_dir.clone(),
        }
    }

    /// Validates the inputs and assembles the request. Does not touch the
    /// file system.
    pub fn build(
        &self,
        location: &str,
        frequency: Frequency,
        start_year: i32,
        end_year: i32,
        region_vertices: &[(f64, f64)],
    ) -> Result<ExtractionRequest> {
        let region = Polygon::new(region_vertices)?;

        if start_year >= end_year {
            return Err(Error::InvalidDateRange {
                start: start_year,
                end: end_year,
            });
        }
        let start_date = first_of_year(start_year)?;
        let end_date = first_of_year(end_year)?;

        if parse_epsg(&self.crs).is_none() {
            return Err(Error::InvalidRequest(format!(
                "CRS `{}` is not of the form EPSG:<code>",
                self.crs
            )));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(Error::InvalidRequest(format!(
                "scale must be a positive number of meters, got {}",
                self.scale
            )));
        }

        let output_path = make_export_path(&self.out_dir, location, frequency, start_year, end_year);
        debug!(path = %output_path.display(), "built extraction request");

        Ok(ExtractionRequest {
            location: location.to_string(),
            dataset_id: self.dataset_id.clone(),
            band: self.band.clone(),
            region,
            start_date,
            end_date,
            frequency,
            reducer: self.reducer,
            output_crs: self.crs.clone(),
            output_scale_meters: self.scale,
            output_path,
        })
    }
}

/// `<out_dir>/exported_GPM4_<location>_<frequency>/GMP_<start>_<end>.tif`
pub fn make_export_path(
    out_dir: &Path,
    location: &str,
    frequency: Frequency,
    start_year: i32,
    end_year: i32,
) -> PathBuf {
    let folder = format!("exported_GPM4_{}_{}", location, frequency);
    let file_name = format!("GMP_{}_{}.tif", start_year, end_year);

    out_dir.join(folder).join(file_name)
}

/// Creates the directory that will hold the export. Safe to call repeatedly.
pub fn ensure_output_dir(request: &ExtractionRequest) -> Result<PathBuf> {
    let dir = request
        .output_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    fs::create_dir_all(&dir).map_err(|source| Error::Filesystem {
        path: dir.clone(),
        source,
    })?;

    Ok(dir)
}

/// Numeric code of an `EPSG:<code>` identifier.
pub fn parse_epsg(crs: &str) -> Option<u32> {
    let (authority, code) = crs.split_once(':')?;
    if !authority.eq_ignore_ascii_case("epsg") {
        return None;
    }
    code.trim().parse().ok()
}

fn first_of_year(year: i32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| Error::InvalidRequest(format!("year {} is out of range", year)))
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {

    use super::*;

    fn builder() -> RequestBuilder {
        RequestBuilder {
            dataset_id: "NASA/GPM_L3/IMERG_V06".to_string(),
            band: "precipitationCal".to_string(),
            reducer: Reducer::Sum,
            crs: "EPSG:4326".to_string(),
            scale: 11132.0,
            out_dir: PathBuf::from("/data/gpm"),
        }
    }

    fn region() -> Vec<(f64, f64)> {
        vec![
            (14.30578, -25.82906),
            (17.56269, -25.82906),
            (17.56269, -22.18359),
            (14.30578, -22.18359),
        ]
    }

    #[test]
    fn should_build_request() {
        let request = builder()
            .build("Cape_Verde", Frequency::Year, 2001, 2002, &region())
            .unwrap();

        assert_eq!(request.start_date, NaiveDate::from_ymd_opt(2001, 1, 1).unwrap());
        assert_eq!(request.end_date, NaiveDate::from_ymd_opt(2002, 1, 1).unwrap());
        assert_eq!(
            request.output_path,
            PathBuf::from("/data/gpm/exported_GPM4_Cape_Verde_year/GMP_2001_2002.tif")
        );
    }

    #[test]
    fn should_build_deterministically() {
        let a = builder().build("Cape_Verde", Frequency::Month, 2001, 2005, &region());
        let b = builder().build("Cape_Verde", Frequency::Month, 2001, 2005, &region());

        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[test]
    fn should_reject_inverted_or_empty_date_range() {
        for (start, end) in [(2002, 2001), (2001, 2001), (2020, 1990)] {
            let result = builder().build("x", Frequency::Year, start, end, &region());
            assert!(
                matches!(result, Err(Error::InvalidDateRange { .. })),
                "{} -> {} should be rejected",
                start,
                end
            );
        }
    }

    #[test]
    fn should_reject_short_regions() {
        let vertices = region();
        for n in 0..3 {
            let result = builder().build("x", Frequency::Year, 2001, 2002, &vertices[..n]);
            assert!(matches!(result, Err(Error::InvalidRegion(_))));
        }
    }

    #[test]
    fn should_reject_bad_crs_and_scale() {
        let mut b = builder();
        b.crs = "WGS84".to_string();
        assert!(matches!(
            b.build("x", Frequency::Year, 2001, 2002, &region()),
            Err(Error::InvalidRequest(_))
        ));

        let mut b = builder();
        b.scale = 0.0;
        assert!(matches!(
            b.build("x", Frequency::Year, 2001, 2002, &region()),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn should_exclude_end_date_from_window() {
        let request = builder()
            .build("x", Frequency::Year, 2001, 2002, &region())
            .unwrap();

        assert!(request.window_contains(NaiveDate::from_ymd_opt(2001, 12, 31).unwrap()));
        assert!(!request.window_contains(NaiveDate::from_ymd_opt(2002, 1, 1).unwrap()));
    }

    #[test]
    fn should_compute_bucket_starts() {
        let date = NaiveDate::from_ymd_opt(2001, 7, 19).unwrap();

        assert_eq!(Frequency::Day.bucket_start(date), date);
        assert_eq!(
            Frequency::Month.bucket_start(date),
            NaiveDate::from_ymd_opt(2001, 7, 1).unwrap()
        );
        assert_eq!(
            Frequency::Year.bucket_start(date),
            NaiveDate::from_ymd_opt(2001, 1, 1).unwrap()
        );
    }

    #[test]
    fn should_create_output_dir_idempotently() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut b = builder();
        b.out_dir = tmp.path().to_path_buf();
        let request = b.build("Cape_Verde", Frequency::Year, 2001, 2002, &region()).unwrap();

        let first = ensure_output_dir(&request).unwrap();
        let second = ensure_output_dir(&request).unwrap();

        assert_eq!(first, second);
        assert!(first.is_dir());
    }

    #[test]
    fn should_report_filesystem_error_beneath_a_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let blocker = tmp.path().join("not_a_dir");
        fs::write(&blocker, b"").unwrap();
        let mut b = builder();
        b.out_dir = blocker.clone();
        let request = b.build("Cape_Verde", Frequency::Year, 2001, 2002, &region()).unwrap();

        match ensure_output_dir(&request) {
            Err(Error::Filesystem { path, .. }) => assert!(path.starts_with(&blocker)),
            other => panic!("expected a filesystem error, got {:?}", other),
        }
    }

    #[test]
    fn should_parse_names() {
        assert_eq!("YEAR".parse::<Frequency>().unwrap(), Frequency::Year);
        assert_eq!("mean".parse::<Reducer>().unwrap(), Reducer::Mean);
        assert!("weekly".parse::<Frequency>().is_err());
        assert_eq!(parse_epsg("EPSG:4326"), Some(4326));
        assert_eq!(parse_epsg("epsg:32633"), Some(32633));
        assert_eq!(parse_epsg("4326"), None);
    }
}
