//! Remote geospatial service boundary.
//!
//! The pipeline only needs a few capabilities from the platform: open a
//! session, resolve a collection, list the images left after filtering, and
//! fetch one band of an image on a pixel grid. [`GeoService`] names them so
//! that tests can swap in an in-memory service.

pub mod earth_engine;
#[cfg(test)]
pub mod memory;
pub mod npy;

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    raster::Raster,
    request::{ExtractionRequest, Grid, Polygon},
};

pub use earth_engine::EarthEngine;

/// Proof that the service accepted our credentials for a project. Acquired
/// once per run and passed explicitly to every call.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub project_id: String,
}

impl Session {
    pub fn new(project_id: &str) -> Self {
        Session {
            project_id: project_id.to_string(),
        }
    }
}

/// One remote image, not yet downloaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRef {
    pub id: String,
    pub acquired: DateTime<Utc>,
}

/// A filter applied to a collection, kept in application order.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `[start, end)`
    Date { start: NaiveDate, end: NaiveDate },
    Bounds(Polygon),
    Select(String),
}

/// Filtered view of a remote image collection.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCollection {
    pub dataset_id: String,
    pub filters: Vec<Filter>,
    pub images: Vec<ImageRef>,
}

impl RawCollection {
    pub fn new(dataset_id: &str) -> Self {
        RawCollection {
            dataset_id: dataset_id.to_string(),
            filters: Vec::new(),
            images: Vec::new(),
        }
    }

    pub fn filter_date(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.filters.push(Filter::Date { start, end });
        self
    }

    pub fn filter_bounds(mut self, region: Polygon) -> Self {
        self.filters.push(Filter::Bounds(region));
        self
    }

    pub fn select(mut self, band: &str) -> Self {
        self.filters.push(Filter::Select(band.to_string()));
        self
    }

    /// The last date window applied, if any.
    pub fn window(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.filters.iter().rev().find_map(|f| match f {
            Filter::Date { start, end } => Some((*start, *end)),
            _ => None,
        })
    }

    pub fn bounds(&self) -> Option<&Polygon> {
        self.filters.iter().rev().find_map(|f| match f {
            Filter::Bounds(region) => Some(region),
            _ => None,
        })
    }

    pub fn band(&self) -> Option<&str> {
        self.filters.iter().rev().find_map(|f| match f {
            Filter::Select(band) => Some(band.as_str()),
            _ => None,
        })
    }
}

#[async_trait]
pub trait GeoService: Send + Sync {
    /// Opens an authenticated session. Fails with [`Error::Authentication`].
    async fn connect(&self, project_id: &str) -> Result<Session>;

    /// Checks that `dataset_id` names an image collection.
    async fn collection(&self, session: &Session, dataset_id: &str) -> Result<()>;

    /// Images of `collection` left after its filters.
    ///
    /// Listing may take several requests; implementations bound each of them
    /// with their own timeout.
    async fn list_images(&self, session: &Session, collection: &RawCollection)
        -> Result<Vec<ImageRef>>;

    /// Pixels of one band of `image`, sampled on `grid`.
    async fn fetch_band(
        &self,
        session: &Session,
        image: &ImageRef,
        band: &str,
        grid: &Grid,
    ) -> Result<Raster>;
}

/// Awaits `fut`, giving up after `after` when set.
pub async fn with_timeout<T, F>(operation: &'static str, after: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match after {
        None => fut.await,
        Some(after) => tokio::time::timeout(after, fut)
            .await
            .map_err(|_| Error::Timeout { operation, after })?,
    }
}

/// Issues queries against a service within one session, one call at a time.
pub struct QueryClient<'a, S: GeoService> {
    service: &'a S,
    session: &'a Session,
    timeout: Option<Duration>,
}

impl<'a, S: GeoService> QueryClient<'a, S> {
    pub fn new(service: &'a S, session: &'a Session, timeout: Option<Duration>) -> Self {
        QueryClient {
            service,
            session,
            timeout,
        }
    }

    /// Resolves the request's dataset, then filters it by date window,
    /// region and band.
    pub async fn query(&self, request: &ExtractionRequest) -> Result<RawCollection> {
        with_timeout(
            "collection lookup",
            self.timeout,
            self.service.collection(self.session, &request.dataset_id),
        )
        .await?;

        let mut collection = RawCollection::new(&request.dataset_id)
            .filter_date(request.start_date, request.end_date)
            .filter_bounds(request.region.clone())
            .select(&request.band);

        let listed = self
            .service
            .list_images(self.session, &collection)
            .await?;
        let total = listed.len();

        // The end date is exclusive whatever the service does with it
        collection.images = listed
            .into_iter()
            .filter(|image| request.window_contains(image.acquired.date_naive()))
            .collect();

        if collection.images.len() < total {
            debug!(
                dropped = total - collection.images.len(),
                "dropped images outside the date window"
            );
        }
        info!(
            dataset = %request.dataset_id,
            band = %request.band,
            images = collection.images.len(),
            "collection filtered"
        );

        Ok(collection)
    }

    pub async fn fetch(&self, image: &ImageRef, band: &str, grid: &Grid) -> Result<Raster> {
        with_timeout(
            "pixel download",
            self.timeout,
            self.service.fetch_band(self.session, image, band, grid),
        )
        .await
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {

    use std::path::PathBuf;

    use chrono::TimeZone;

    use super::{memory::MemoryService, *};
    use crate::request::{Frequency, Reducer, RequestBuilder};

    fn request() -> ExtractionRequest {
        RequestBuilder {
            dataset_id: "NASA/GPM_L3/IMERG_V06".to_string(),
            band: "precipitationCal".to_string(),
            reducer: Reducer::Sum,
            crs: "EPSG:4326".to_string(),
            scale: 11132.0,
            out_dir: PathBuf::from("/tmp"),
        }
        .build(
            "Cape_Verde",
            Frequency::Year,
            2001,
            2002,
            &[
                (14.30578, -25.82906),
                (17.56269, -25.82906),
                (17.56269, -22.18359),
                (14.30578, -22.18359),
            ],
        )
        .unwrap()
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn should_apply_filters_in_order() {
        let service = MemoryService::new("ee-scoutdp")
            .with_image("NASA/GPM_L3/IMERG_V06", "a", at(2001, 3, 1), Raster::filled(2, 2, 1.0));
        let session = service.connect("ee-scoutdp").await.unwrap();
        let client = QueryClient::new(&service, &session, None);

        let collection = client.query(&request()).await.unwrap();

        assert!(matches!(collection.filters[0], Filter::Date { .. }));
        assert!(matches!(collection.filters[1], Filter::Bounds(_)));
        assert_eq!(collection.filters[2], Filter::Select("precipitationCal".to_string()));
        assert_eq!(collection.images.len(), 1);
    }

    #[tokio::test]
    async fn should_exclude_image_at_end_date() {
        // The memory service includes the end date, the client must not
        let service = MemoryService::new("ee-scoutdp")
            .with_inclusive_end()
            .with_image("NASA/GPM_L3/IMERG_V06", "in", at(2001, 12, 31), Raster::filled(1, 1, 1.0))
            .with_image("NASA/GPM_L3/IMERG_V06", "edge", at(2002, 1, 1), Raster::filled(1, 1, 1.0));
        let session = service.connect("ee-scoutdp").await.unwrap();
        let client = QueryClient::new(&service, &session, None);

        let collection = client.query(&request()).await.unwrap();
        let ids: Vec<&str> = collection.images.iter().map(|i| i.id.as_str()).collect();

        assert_eq!(ids, vec!["in"]);
    }

    #[tokio::test]
    async fn should_fail_on_unknown_dataset() {
        let service = MemoryService::new("ee-scoutdp");
        let session = service.connect("ee-scoutdp").await.unwrap();
        let client = QueryClient::new(&service, &session, None);

        let result = client.query(&request()).await;
        assert!(matches!(result, Err(Error::RemoteQuery(_))));
    }

    #[tokio::test]
    async fn should_fail_to_connect_to_unknown_project() {
        let service = MemoryService::new("ee-scoutdp");
        let result = service.connect("someone-else").await;

        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[tokio::test]
    async fn should_time_out_slow_calls() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<(), Error>(())
        };
        let result = with_timeout("slow call", Some(Duration::from_millis(10)), slow).await;

        assert!(matches!(result, Err(Error::Timeout { operation: "slow call", .. })));
    }

    #[test]
    fn should_report_last_filters() {
        let collection = RawCollection::new("x")
            .select("a")
            .filter_date(at(2001, 1, 1).date_naive(), at(2002, 1, 1).date_naive())
            .select("b");

        assert_eq!(collection.band(), Some("b"));
        assert!(collection.window().is_some());
        assert!(collection.bounds().is_none());
    }
}
