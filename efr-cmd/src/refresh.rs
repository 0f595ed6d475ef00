//! Incremental refresh: bring every region's flood forecast up to date.
//!
//! Regions are processed in fixed-size batches, in dataset order. A batch
//! whose regions were all refreshed on the run date is skipped, so a run
//! interrupted halfway (or failed batches) can simply be run again. Every
//! processed batch is written back to the dataset file and published before
//! the next one starts, then the run pauses for the cooldown to stay under
//! the forecast APIs' rate limits.

use crate::publish::Publisher;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use efr_cache::ResponseStore;
use efr_meteo::{fetch_all, MeteoClient, Site, Transport};
use efr_model::Models;
use efr_regions::{batches, stamp, update_batch, Dataset, RegionRecord};
use efr_utils::window::forecast_end;
use log::{error, info};
use std::fmt;
use std::ops::Range;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Where a batch is in its life cycle; the last state reached is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    Fetching,
    Assembling,
    Predicting,
    Persisting,
    Done,
    Skipped,
    Failed,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchState::Pending => "pending",
            BatchState::Fetching => "fetching",
            BatchState::Assembling => "assembling",
            BatchState::Predicting => "predicting",
            BatchState::Persisting => "persisting",
            BatchState::Done => "done",
            BatchState::Skipped => "skipped",
            BatchState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub range: Range<usize>,
    pub state: BatchState,
    /// State the batch was in when it failed
    pub failed_at: Option<BatchState>,
    pub elapsed: Duration,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub batches: Vec<BatchOutcome>,
    pub elapsed: Duration,
}

impl RefreshReport {
    fn count(&self, state: BatchState) -> usize {
        self.batches.iter().filter(|b| b.state == state).count()
    }

    pub fn processed(&self) -> usize {
        self.count(BatchState::Done)
    }

    pub fn skipped(&self) -> usize {
        self.count(BatchState::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(BatchState::Failed)
    }

    /// Mean time per processed batch.
    pub fn average_batch_time(&self) -> Option<Duration> {
        let processed = self.processed() as u32;
        if processed == 0 {
            return None;
        }
        let total: Duration = self
            .batches
            .iter()
            .filter(|b| b.state == BatchState::Done)
            .map(|b| b.elapsed)
            .sum();
        Some(total / processed)
    }

    pub fn log_summary(&self) {
        info!(
            "Refresh finished in {:.1?}: {} batches processed, {} skipped, {} failed",
            self.elapsed,
            self.processed(),
            self.skipped(),
            self.failed()
        );
        if let Some(average) = self.average_batch_time() {
            info!("Average time per processed batch: {:.1?}", average);
        }
        for batch in self.batches.iter().filter(|b| b.state == BatchState::Failed) {
            if let (Some(at), Some(message)) = (batch.failed_at, &batch.error) {
                error!(
                    "Batch {}-{} failed while {}: {}",
                    batch.range.start, batch.range.end, at, message
                );
            }
        }
    }
}

pub(crate) fn site(record: &RegionRecord) -> Site {
    Site {
        coord: record.point,
        sea: record.sea,
        sea_distance: record.sea_distance,
    }
}

/// The refresh loop and everything it talks to.
pub struct Refresher<T, S, P> {
    pub client: MeteoClient<T, S>,
    pub models: Models,
    pub publisher: P,
    pub dataset_path: PathBuf,
    pub batch_size: usize,
    pub cooldown: Duration,
}

impl<T: Transport, S: ResponseStore, P: Publisher> Refresher<T, S, P> {
    /// Refresh every stale batch of `dataset`, stamping updated regions
    /// with `now`. Batch failures are logged and reported, never returned.
    pub async fn run(&self, dataset: &mut Dataset, now: NaiveDateTime) -> RefreshReport {
        let run_start = Instant::now();
        let run_date = now.date();
        let ranges = batches(dataset.len(), self.batch_size);
        info!(
            "Refreshing {} regions in {} batches for {}",
            dataset.len(),
            ranges.len(),
            run_date
        );

        let mut report = RefreshReport::default();
        for range in ranges {
            let batch_start = Instant::now();
            let records = &dataset.records()[range.clone()];
            if records.iter().all(|r| !r.is_stale(run_date)) {
                info!(
                    "Batch {}-{} already updated on {}, skipping",
                    range.start, range.end, run_date
                );
                report.batches.push(BatchOutcome {
                    range,
                    state: BatchState::Skipped,
                    failed_at: None,
                    elapsed: batch_start.elapsed(),
                    error: None,
                });
                continue;
            }

            let mut state = BatchState::Pending;
            let outcome = self
                .process_batch(dataset, range.clone(), now, &mut state)
                .await;
            let (final_state, failed_at, error) = match outcome {
                Ok(()) => (BatchState::Done, None, None),
                Err(e) => {
                    error!(
                        "Error processing batch {}-{} while {}: {:#}",
                        range.start, range.end, state, e
                    );
                    (BatchState::Failed, Some(state), Some(format!("{e:#}")))
                }
            };
            report.batches.push(BatchOutcome {
                range,
                state: final_state,
                failed_at,
                elapsed: batch_start.elapsed(),
                error,
            });

            if !self.cooldown.is_zero() {
                info!("Cooling down for {:.0?}", self.cooldown);
                tokio::time::sleep(self.cooldown).await;
            }
        }

        report.elapsed = run_start.elapsed();
        report
    }

    async fn process_batch(
        &self,
        dataset: &mut Dataset,
        range: Range<usize>,
        now: NaiveDateTime,
        state: &mut BatchState,
    ) -> Result<()> {
        let started = Instant::now();
        let records = &dataset.records()[range.clone()];
        let sites: Vec<Site> = records.iter().map(site).collect();

        *state = BatchState::Fetching;
        let tables = fetch_all(&self.client, &sites, forecast_end(now.date()))
            .await
            .context("fetching forecasts")?;

        *state = BatchState::Assembling;
        let matrix = tables.into_matrix().context("assembling features")?;

        *state = BatchState::Predicting;
        let scored = self.models.predict(matrix).context("scoring features")?;
        let mut updated = update_batch(records, &scored).context("updating regions")?;
        stamp(&mut updated, now);
        info!(
            "Batch {}-{} processed in {:.1?}",
            range.start,
            range.end,
            started.elapsed()
        );

        *state = BatchState::Persisting;
        let previous = records.to_vec();
        dataset.replace(range.clone(), updated);
        if let Err(e) = self.persist(dataset, &range).await {
            // Keep the batch stale, in memory and on disk, so the next run
            // picks it up again.
            dataset.replace(range.clone(), previous);
            if let Err(restore) = dataset.save(&self.dataset_path) {
                error!(
                    "Failed to restore {} after batch {}-{} failed: {:#}",
                    self.dataset_path.display(),
                    range.start,
                    range.end,
                    restore
                );
            }
            return Err(e);
        }
        Ok(())
    }

    async fn persist(&self, dataset: &Dataset, range: &Range<usize>) -> Result<()> {
        dataset
            .save(&self.dataset_path)
            .with_context(|| format!("writing {}", self.dataset_path.display()))?;

        let upload_start = Instant::now();
        let message = format!(
            "Update flood forecasts for regions {}-{}",
            range.start, range.end
        );
        self.publisher
            .publish(&self.dataset_path, &message)
            .await
            .context("publishing dataset")?;
        info!(
            "Batch {}-{} uploaded in {:.1?}",
            range.start,
            range.end,
            upload_start.elapsed()
        );
        Ok(())
    }
}
