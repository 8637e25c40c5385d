//! Deterministic in-memory [`GeoService`] for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{GeoService, ImageRef, RawCollection, Session};
use crate::{
    error::{Error, Result},
    raster::Raster,
    request::Grid,
};

struct StoredImage {
    image: ImageRef,
    band: String,
    raster: Raster,
}

pub struct MemoryService {
    project_id: String,
    band: String,
    inclusive_end: bool,
    datasets: HashMap<String, Vec<StoredImage>>,
}

impl MemoryService {
    pub fn new(project_id: &str) -> Self {
        MemoryService {
            project_id: project_id.to_string(),
            band: "precipitationCal".to_string(),
            inclusive_end: false,
            datasets: HashMap::new(),
        }
    }

    /// Also return images acquired on the end date, like a careless service.
    pub fn with_inclusive_end(mut self) -> Self {
        self.inclusive_end = true;
        self
    }

    pub fn with_image(
        mut self,
        dataset_id: &str,
        id: &str,
        acquired: DateTime<Utc>,
        raster: Raster,
    ) -> Self {
        let stored = StoredImage {
            image: ImageRef {
                id: id.to_string(),
                acquired,
            },
            band: self.band.clone(),
            raster,
        };
        self.datasets
            .entry(dataset_id.to_string())
            .or_default()
            .push(stored);
        self
    }

    fn check_session(&self, session: &Session) -> Result<()> {
        if session.project_id != self.project_id {
            return Err(Error::Authentication(format!(
                "no session for project `{}`",
                session.project_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl GeoService for MemoryService {
    async fn connect(&self, project_id: &str) -> Result<Session> {
        if project_id != self.project_id {
            return Err(Error::Authentication(format!(
                "project `{}` is not registered",
                project_id
            )));
        }
        Ok(Session::new(project_id))
    }

    async fn collection(&self, session: &Session, dataset_id: &str) -> Result<()> {
        self.check_session(session)?;
        if !self.datasets.contains_key(dataset_id) {
            return Err(Error::RemoteQuery(format!("unknown dataset `{}`", dataset_id)));
        }
        Ok(())
    }

    async fn list_images(
        &self,
        session: &Session,
        collection: &RawCollection,
    ) -> Result<Vec<ImageRef>> {
        self.check_session(session)?;
        let stored = self
            .datasets
            .get(&collection.dataset_id)
            .ok_or_else(|| Error::RemoteQuery(format!("unknown dataset `{}`", collection.dataset_id)))?;

        if let Some(band) = collection.band() {
            if band != self.band {
                return Err(Error::RemoteQuery(format!("unknown band `{}`", band)));
            }
        }

        let images = stored
            .iter()
            .filter(|s| match collection.window() {
                None => true,
                Some((start, end)) => {
                    let date = s.image.acquired.date_naive();
                    date >= start && (date < end || (self.inclusive_end && date == end))
                }
            })
            .map(|s| s.image.clone())
            .collect();

        Ok(images)
    }

    async fn fetch_band(
        &self,
        session: &Session,
        image: &ImageRef,
        band: &str,
        _grid: &Grid,
    ) -> Result<Raster> {
        self.check_session(session)?;
        self.datasets
            .values()
            .flatten()
            .find(|s| s.image.id == image.id && s.band == band)
            .map(|s| s.raster.clone())
            .ok_or_else(|| Error::RemoteQuery(format!("no band `{}` in image `{}`", band, image.id)))
    }
}
