//! Time series construction and calendar aggregation.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use crate::{
    cli::create_progress_bar,
    error::{Error, Result},
    raster::Raster,
    request::{Frequency, Grid, Reducer},
    service::{GeoService, QueryClient, RawCollection},
};

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesEntry {
    pub acquired: DateTime<Utc>,
    pub raster: Raster,
}

/// Downloaded images in acquisition order. Duplicate timestamps are kept.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeSeries {
    pub entries: Vec<TimeSeriesEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    /// First day of the bucket
    pub start: NaiveDate,
    pub image_count: usize,
    pub raster: Raster,
}

/// One reduced raster per non-empty bucket, in chronological order.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedSeries {
    pub frequency: Frequency,
    pub reducer: Reducer,
    pub buckets: Vec<Bucket>,
}

impl TimeSeries {
    pub fn new(mut entries: Vec<TimeSeriesEntry>) -> Self {
        entries.sort_by_key(|e| e.acquired);
        TimeSeries { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Downloads the selected band of every image in `collection` onto `grid`.
pub async fn to_time_series<S: GeoService>(
    client: &QueryClient<'_, S>,
    collection: RawCollection,
    grid: &Grid,
) -> Result<TimeSeries> {
    let band = collection
        .band()
        .ok_or_else(|| Error::RemoteQuery("no band selected".to_string()))?
        .to_string();

    let pb = create_progress_bar(collection.images.len() as u64, "Downloading...".to_string());
    let mut entries = Vec::with_capacity(collection.images.len());

    for image in &collection.images {
        let raster = client.fetch(image, &band, grid).await?;
        entries.push(TimeSeriesEntry {
            acquired: image.acquired,
            raster,
        });
        pb.inc(1);
    }
    pb.finish_with_message("Images downloaded");

    Ok(TimeSeries::new(entries))
}

/// Groups `series` into calendar buckets and reduces each bucket per pixel.
pub fn aggregate(series: &TimeSeries, frequency: Frequency, reducer: Reducer) -> Result<AggregatedSeries> {
    if series.is_empty() {
        warn!("no images in the requested window");
    }

    let mut groups: BTreeMap<NaiveDate, Vec<&Raster>> = BTreeMap::new();
    for entry in &series.entries {
        let start = frequency.bucket_start(entry.acquired.date_naive());
        groups.entry(start).or_default().push(&entry.raster);
    }

    let buckets = groups
        .into_iter()
        .map(|(start, rasters)| {
            let raster = reduce(&rasters, reducer)
                .map_err(|e| Error::Aggregation(format!("bucket {}: {}", start, e)))?;
            Ok(Bucket {
                start,
                image_count: rasters.len(),
                raster,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(
        images = series.len(),
        buckets = buckets.len(),
        %frequency,
        %reducer,
        "series aggregated"
    );

    Ok(AggregatedSeries {
        frequency,
        reducer,
        buckets,
    })
}

// Reduces a non-empty set of same-shaped rasters. NaN pixels are skipped; a
// pixel with no valid input stays NaN.
fn reduce(rasters: &[&Raster], reducer: Reducer) -> std::result::Result<Raster, String> {
    let first = rasters.first().ok_or("empty bucket")?;
    if let Some(odd) = rasters.iter().find(|r| !r.same_shape(first)) {
        return Err(format!(
            "raster shapes differ: {}x{} and {}x{}",
            first.width, first.height, odd.width, odd.height
        ));
    }

    let mut values = Vec::with_capacity(first.values.len());
    for i in 0..first.values.len() {
        let mut count = 0u32;
        let mut acc = match reducer {
            Reducer::Sum | Reducer::Mean => 0f64,
            Reducer::Min => f64::INFINITY,
            Reducer::Max => f64::NEG_INFINITY,
        };

        for raster in rasters {
            let v = raster.values[i];
            if v.is_nan() {
                continue;
            }
            count += 1;
            let v = v as f64;
            acc = match reducer {
                Reducer::Sum | Reducer::Mean => acc + v,
                Reducer::Min => acc.min(v),
                Reducer::Max => acc.max(v),
            };
        }

        let value = match (count, reducer) {
            (0, _) => f32::NAN,
            (n, Reducer::Mean) => (acc / n as f64) as f32,
            _ => acc as f32,
        };
        values.push(value);
    }

    Ok(Raster {
        width: first.width,
        height: first.height,
        values,
    })
}

// -- Tests -------------------------------------------------------------------
