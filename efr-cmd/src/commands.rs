//! Command entry points: wire settings into the pipeline pieces.

use crate::config::Settings;
use crate::features::write_features;
use crate::publish::{HubClient, NoPublish, Publisher};
use crate::refresh::{site, RefreshReport, Refresher};
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, SubsecRound, Utc};
use efr_cache::{ResponseStore, SqliteStore};
use efr_meteo::{fetch_all, HttpTransport, MeteoClient, Site};
use efr_model::Models;
use efr_regions::Dataset;
use efr_utils::window::forecast_end;
use log::info;
use std::path::Path;

/// Run timestamp: current UTC time to the second.
fn run_timestamp() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(0)
}

fn meteo_client(settings: &Settings) -> Result<MeteoClient<HttpTransport, SqliteStore>> {
    let meteo = &settings.meteo;
    let transport = HttpTransport::new(meteo.timeout()).context("building forecast client")?;
    let store = SqliteStore::open(&meteo.cache_path)?;
    if let Some(max_age) = meteo.cache_policy().expire_after {
        store.purge(Utc::now(), max_age)?;
    }
    Ok(MeteoClient::new(
        transport,
        store,
        meteo.retry_policy(),
        meteo.cache_policy(),
    ))
}

fn load_models(settings: &Settings) -> Result<Models> {
    let models = &settings.models;
    Models::load(&models.flood, &models.flood_type).with_context(|| {
        format!(
            "loading models {} and {}",
            models.flood.display(),
            models.flood_type.display()
        )
    })
}

fn load_dataset(settings: &Settings) -> Result<Dataset> {
    let dataset = &settings.dataset;
    Dataset::load(&dataset.path, &dataset.id_property)
        .with_context(|| format!("loading dataset {}", dataset.path.display()))
}

pub async fn run_download(settings: &Settings) -> Result<()> {
    HubClient::new(settings.hub.clone())?
        .download(&settings.dataset.path)
        .await
}

pub async fn run_refresh(settings: &Settings, publish: bool, download: bool) -> Result<()> {
    // Setup problems abort before any batch is attempted.
    let models = load_models(settings)?;
    if download {
        run_download(settings).await?;
    }
    let mut dataset = load_dataset(settings)?;
    let client = meteo_client(settings)?;

    let report = if publish {
        if settings.hub.token().is_none() {
            anyhow::bail!(
                "publishing needs a hub token in {}; use --no-publish for local runs",
                settings.hub.token_env
            );
        }
        let hub = HubClient::new(settings.hub.clone())?;
        refresh_with(settings, client, models, hub, &mut dataset).await
    } else {
        refresh_with(settings, client, models, NoPublish, &mut dataset).await
    };
    report.log_summary();
    Ok(())
}

async fn refresh_with<P: Publisher>(
    settings: &Settings,
    client: MeteoClient<HttpTransport, SqliteStore>,
    models: Models,
    publisher: P,
    dataset: &mut Dataset,
) -> RefreshReport {
    let refresher = Refresher {
        client,
        models,
        publisher,
        dataset_path: settings.dataset.path.clone(),
        batch_size: settings.refresh.batch_size,
        cooldown: settings.refresh.cooldown(),
    };
    refresher.run(dataset, run_timestamp()).await
}

pub fn run_status(settings: &Settings, run_date: Option<NaiveDate>) -> Result<()> {
    let dataset = load_dataset(settings)?;
    let run_date = run_date.unwrap_or_else(|| run_timestamp().date());
    let stale = dataset.stale_count(run_date);
    println!("Regions: {}", dataset.len());
    println!("Fresh on {}: {}", run_date, dataset.len() - stale);
    println!("Stale: {}", stale);
    Ok(())
}

pub async fn run_features(
    settings: &Settings,
    output: &Path,
    limit: usize,
    run_date: Option<NaiveDate>,
    with_predictions: bool,
) -> Result<()> {
    let models = if with_predictions {
        Some(load_models(settings)?)
    } else {
        None
    };
    let dataset = load_dataset(settings)?;
    let client = meteo_client(settings)?;
    let run_date = run_date.unwrap_or_else(|| run_timestamp().date());

    let sites: Vec<Site> = dataset
        .records()
        .iter()
        .take(limit)
        .map(site)
        .collect();
    info!("Gathering features for {} regions on {}", sites.len(), run_date);

    let matrix = fetch_all(&client, &sites, forecast_end(run_date))
        .await?
        .into_matrix()?;
    let rows = matrix.rows().to_vec();
    let scored = match &models {
        Some(models) => Some(models.predict(matrix)?),
        None => None,
    };

    let file = std::fs::File::create(output)
        .with_context(|| format!("creating {}", output.display()))?;
    write_features(file, &rows, scored.as_deref())?;
    info!("Wrote {} feature rows to {}", rows.len(), output.display());
    Ok(())
}
