//! Runs the full extraction: build the request, query the service, aggregate
//! and export.

use anyhow::Result;
use tracing::info;

use crate::{
    aggregate::{aggregate, to_time_series, AggregatedSeries},
    cli::create_spinner,
    config::Config,
    error,
    export::{export, ExportArtifact},
    parquet,
    request::{ensure_output_dir, ExtractionRequest, RequestBuilder},
    service::{with_timeout, EarthEngine, GeoService, QueryClient},
};

/// What a run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub request: ExtractionRequest,
    pub series: AggregatedSeries,
    pub artifact: ExportArtifact,
}

pub async fn extract(config: &Config, summary: bool) -> Result<String> {
    let service = EarthEngine::from_config(&config.service)?.with_page_timeout(config.timeout());
    let outcome = run(&service, config).await?;
    info!(
        location = %outcome.request.location,
        frequency = %outcome.series.frequency,
        reducer = %outcome.series.reducer,
        buckets = outcome.series.buckets.len(),
        "extraction finished"
    );

    if summary {
        let summary_path = parquet::summary_path(&outcome.artifact.path);
        parquet::save_summary(&outcome.series, &summary_path)?;
        info!(path = %summary_path.display(), "summary written");
    }

    Ok(outcome.artifact.path.to_string_lossy().to_string())
}

/// Runs every stage in sequence against `service`.
pub async fn run<S: GeoService>(service: &S, config: &Config) -> error::Result<RunOutcome> {
    let request = RequestBuilder::from_config(config).build(
        &config.location,
        config.frequency,
        config.start_year,
        config.end_year,
        &config.region,
    )?;
    let grid = request.grid()?;
    ensure_output_dir(&request)?;

    let bar = create_spinner(format!("Connecting to project {}...", config.project_id));
    let session = with_timeout("connect", config.timeout(), service.connect(&config.project_id)).await;
    let session = match session {
        Ok(session) => {
            bar.finish_with_message("Session established");
            session
        }
        Err(e) => {
            bar.abandon_with_message("Could not establish a session");
            return Err(e);
        }
    };

    let client = QueryClient::new(service, &session, config.timeout());
    let collection = client.query(&request).await?;
    let series = to_time_series(&client, collection, &grid).await?;
    let aggregated = aggregate(&series, request.frequency, request.reducer)?;
    drop(series);

    let artifact = export(&aggregated, &request.output_path, &grid)?;

    Ok(RunOutcome {
        request,
        series: aggregated,
        artifact,
    })
}

// -- Tests -------------------------------------------------------------------
