//! Earth Engine REST client.
//!
//! Public datasets live under `projects/earthengine-public/assets/`. Requests
//! carry an OAuth bearer token (for example the output of
//! `gcloud auth print-access-token`) and bill the session's project.

use std::{env, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{npy, GeoService, ImageRef, RawCollection, Session};
use crate::{
    config::ServiceConfig,
    download::{check_status, read_body},
    error::{Error, Result},
    raster::Raster,
    request::Grid,
};

const PUBLIC_ASSETS: &str = "projects/earthengine-public/assets";
const PAGE_SIZE: u32 = 1000;

pub struct EarthEngine {
    http: Client,
    base_url: String,
    token: String,
    page_timeout: Option<Duration>,
}

#[derive(Deserialize)]
struct Asset {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListImagesResponse {
    #[serde(default)]
    images: Vec<ListedImage>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedImage {
    name: String,
    start_time: Option<String>,
    #[serde(default)]
    bands: Vec<Band>,
}

#[derive(Deserialize)]
struct Band {
    id: String,
}

impl EarthEngine {
    pub fn new(base_url: &str, token: &str) -> Self {
        EarthEngine {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            page_timeout: None,
        }
    }

    /// Bounds each `listImages` page request.
    pub fn with_page_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.page_timeout = timeout;
        self
    }

    /// Reads the access token from the configured environment variable.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let token = env::var(&config.token_env).map_err(|_| {
            Error::Authentication(format!(
                "environment variable {} must hold an Earth Engine access token",
                config.token_env
            ))
        })?;

        Ok(Self::new(&config.base_url, token.trim()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    fn get(&self, session: &Session, url: &str) -> RequestBuilder {
        self.http
            .get(url)
            .bearer_auth(&self.token)
            .header("x-goog-user-project", &session.project_id)
    }

    async fn list_page(
        &self,
        session: &Session,
        collection: &RawCollection,
        page_token: Option<&str>,
    ) -> Result<ListImagesResponse> {
        let url = self.url(&format!("{}:listImages", asset_name(&collection.dataset_id)));
        let mut params = list_images_params(collection);
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let mut request = self.get(session, &url).query(&params);
        if let Some(after) = self.page_timeout {
            request = request.timeout(after);
        }

        let response = request.send().await.map_err(|e| match self.page_timeout {
            Some(after) if e.is_timeout() => Error::Timeout {
                operation: "image listing",
                after,
            },
            _ => Error::RemoteQuery(format!("listImages request failed: {}", e)),
        })?;
        let response = check_status(response)
            .await
            .map_err(|(status, message)| query_error(status, &collection.dataset_id, &message))?;

        response
            .json()
            .await
            .map_err(|e| Error::RemoteQuery(format!("unexpected listImages response: {}", e)))
    }
}

#[async_trait]
impl GeoService for EarthEngine {
    async fn connect(&self, project_id: &str) -> Result<Session> {
        let session = Session::new(project_id);
        let url = self.url(&format!("projects/{}:listAssets", project_id));

        let response = self
            .get(&session, &url)
            .query(&[("pageSize", "1")])
            .send()
            .await
            .map_err(|e| Error::Authentication(format!("cannot reach Earth Engine: {}", e)))?;
        check_status(response).await.map_err(|(status, message)| {
            Error::Authentication(format!("{} ({})", message, status))
        })?;

        debug!(project = project_id, "Earth Engine session established");
        Ok(session)
    }

    async fn collection(&self, session: &Session, dataset_id: &str) -> Result<()> {
        let url = self.url(&asset_name(dataset_id));
        let response = self
            .get(session, &url)
            .send()
            .await
            .map_err(|e| Error::RemoteQuery(format!("asset lookup failed: {}", e)))?;
        let response = check_status(response)
            .await
            .map_err(|(status, message)| query_error(status, dataset_id, &message))?;

        let asset: Asset = response
            .json()
            .await
            .map_err(|e| Error::RemoteQuery(format!("unexpected asset response: {}", e)))?;
        if asset.kind != "IMAGE_COLLECTION" {
            return Err(Error::RemoteQuery(format!(
                "`{}` is a {}, not an image collection",
                dataset_id, asset.kind
            )));
        }

        Ok(())
    }

    async fn list_images(
        &self,
        session: &Session,
        collection: &RawCollection,
    ) -> Result<Vec<ImageRef>> {
        let mut images = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .list_page(session, collection, page_token.as_deref())
                .await?;

            match collect_page(&mut images, page, collection.band())? {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(images)
    }

    async fn fetch_band(
        &self,
        session: &Session,
        image: &ImageRef,
        band: &str,
        grid: &Grid,
    ) -> Result<Raster> {
        let url = self.url(&format!("{}:getPixels", image.id));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("x-goog-user-project", &session.project_id)
            .json(&pixels_body(band, grid))
            .send()
            .await
            .map_err(|e| Error::Export(format!("getPixels request failed: {}", e)))?;
        let response = check_status(response)
            .await
            .map_err(|(status, message)| Error::Export(format!("{} ({})", message, status)))?;

        let body = read_body(response)
            .await
            .map_err(|e| Error::Export(format!("error reading pixels: {}", e)))?;
        let raster = npy::decode(&body)?;

        if raster.values.len() != grid.cell_count() {
            debug!(
                image = %image.id,
                width = raster.width,
                height = raster.height,
                "service returned a raster off the requested grid"
            );
        }

        Ok(raster)
    }
}

/// Appends the dated images of one `listImages` page and returns the token
/// of the next page, if any.
fn collect_page(
    images: &mut Vec<ImageRef>,
    page: ListImagesResponse,
    band: Option<&str>,
) -> Result<Option<String>> {
    for listed in page.images {
        if let Some(band) = band {
            if !listed.bands.is_empty() && !listed.bands.iter().any(|b| b.id == band) {
                return Err(Error::RemoteQuery(format!(
                    "image `{}` has no band `{}`",
                    listed.name, band
                )));
            }
        }

        let acquired = listed
            .start_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc));
        match acquired {
            Some(acquired) => images.push(ImageRef {
                id: listed.name,
                acquired,
            }),
            None => warn!(image = %listed.name, "skipping image without a start time"),
        }
    }

    Ok(page.next_page_token.filter(|token| !token.is_empty()))
}

/// Full asset name of a dataset id. Ids without a project prefix are public.
pub fn asset_name(dataset_id: &str) -> String {
    if dataset_id.starts_with("projects/") {
        dataset_id.to_string()
    } else {
        format!("{}/{}", PUBLIC_ASSETS, dataset_id)
    }
}

/// Query parameters of `listImages` for the collection's filters.
pub fn list_images_params(collection: &RawCollection) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("view", "FULL".to_string()),
        ("pageSize", PAGE_SIZE.to_string()),
    ];

    if let Some((start, end)) = collection.window() {
        params.push(("startTime", rfc3339_midnight(start)));
        params.push(("endTime", rfc3339_midnight(end)));
    }
    if let Some(region) = collection.bounds() {
        params.push(("region", region.to_geojson().to_string()));
    }

    params
}

/// Request body of `getPixels` for one band on `grid`.
pub fn pixels_body(band: &str, grid: &Grid) -> Value {
    let [scale_x, shear_x, translate_x, shear_y, scale_y, translate_y] = grid.affine();

    json!({
        "fileFormat": "NPY",
        "bandIds": [band],
        "grid": {
            "dimensions": { "width": grid.width, "height": grid.height },
            "affineTransform": {
                "scaleX": scale_x,
                "shearX": shear_x,
                "translateX": translate_x,
                "shearY": shear_y,
                "scaleY": scale_y,
                "translateY": translate_y,
            },
            "crsCode": grid.crs,
        },
    })
}

fn rfc3339_midnight(date: NaiveDate) -> String {
    format!("{}T00:00:00Z", date.format("%Y-%m-%d"))
}

fn query_error(status: StatusCode, dataset_id: &str, message: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Authentication(format!("{} ({})", message, status))
        }
        StatusCode::NOT_FOUND => {
            Error::RemoteQuery(format!("unknown dataset `{}`: {}", dataset_id, message))
        }
        _ => Error::RemoteQuery(format!("{} ({})", message, status)),
    }
}

// -- Tests -------------------------------------------------------------------
