//! Shows what an extraction would do without contacting the service.

use anyhow::Result;
use serde::Serialize;

use crate::{
    config::Config,
    request::{ExtractionRequest, Grid, RequestBuilder},
    service::earth_engine::asset_name,
};

#[derive(Debug, Serialize)]
pub struct Plan {
    pub asset: String,
    pub request: ExtractionRequest,
    pub grid: Grid,
}

pub fn make_plan(config: &Config) -> Result<Plan> {
    let request = RequestBuilder::from_config(config).build(
        &config.location,
        config.frequency,
        config.start_year,
        config.end_year,
        &config.region,
    )?;
    let grid = request.grid()?;

    Ok(Plan {
        asset: asset_name(&request.dataset_id),
        request,
        grid,
    })
}

/// Renders the plan as pretty JSON.
pub fn plan(config: &Config) -> Result<String> {
    let plan = make_plan(config)?;

    Ok(serde_json::to_string_pretty(&plan)?)
}

// -- Tests -------------------------------------------------------------------
