use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;

use crate::debug_println;
use crate::errors::ScrapeError;
use crate::models::{HotelRecord, SearchCriteria};
use crate::parser::parse_response;
use crate::request::{RequestBuilder, ROWS_PER_PAGE};
use crate::sink::Sink;
use crate::transport::Transport;

/// Bounded exponential backoff for transient upstream errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy { max_retries: 3, base_delay: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let backoff = self.base_delay * 2u32.saturating_pow(attempt);
        // A little jitter so repeated failures don't hammer the endpoint in
        // lockstep.
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
        backoff + jitter
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub retry: RetryPolicy,
    /// Politeness pause between criteria units.
    pub unit_delay: Duration,
    pub show_progress: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        CoordinatorOptions {
            retry: RetryPolicy::default(),
            unit_delay: Duration::from_millis(500),
            show_progress: true,
        }
    }
}

/// End-of-run accounting. Failed units never abort the sweep; they are
/// reported here instead so a multi-day run survives a bad day.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub records_written: usize,
    pub failed_units: Vec<(String, String)>,
    pub cancelled: bool,
}

/// Drives the sweep: one unit at a time, in planner order, fetch-parse-write
/// with retry on transient transport errors. Exactly one request is in
/// flight at any moment; the upstream service is session- and
/// rate-sensitive, so there is deliberately no parallelism here.
pub struct RunCoordinator<T: Transport, S: Sink> {
    builder: RequestBuilder,
    transport: T,
    sink: S,
    options: CoordinatorOptions,
    cancel: Arc<AtomicBool>,
    skip: HashSet<(String, NaiveDate)>,
}

impl<T: Transport, S: Sink> RunCoordinator<T, S> {
    pub fn new(builder: RequestBuilder, transport: T, sink: S, options: CoordinatorOptions) -> Self {
        RunCoordinator {
            builder,
            transport,
            sink,
            options,
            cancel: Arc::new(AtomicBool::new(false)),
            skip: HashSet::new(),
        }
    }

    /// Units whose (city, check-in) pair is in this set are skipped without
    /// touching the network -- optional resumability fed from the CSV sink.
    pub fn skip_already_scraped(&mut self, scraped: HashSet<(String, NaiveDate)>) {
        self.skip = scraped;
    }

    /// Flag checked between units; setting it stops the run at the next
    /// unit boundary, never mid-write.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn run(&mut self, units: &[SearchCriteria]) -> Result<RunSummary> {
        let progress = if self.options.show_progress {
            let bar = ProgressBar::new(units.len() as u64);
            bar.set_style(
                ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        let mut summary = RunSummary::default();

        for (index, criteria) in units.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                println!("Cancellation requested, stopping before unit {}", index + 1);
                summary.cancelled = true;
                break;
            }

            progress.set_message(criteria.label());

            if self.skip.contains(&(criteria.city.clone(), criteria.check_in)) {
                debug_println!("Skipping already-scraped unit: {}", criteria.label());
                summary.skipped += 1;
                progress.inc(1);
                continue;
            }

            match self.scrape_unit(criteria) {
                Ok(records) => {
                    self.write_unit(&records)?;
                    summary.records_written += records.len();
                    summary.succeeded += 1;
                    debug_println!(
                        "Unit succeeded: {} ({} records)",
                        criteria.label(),
                        records.len()
                    );
                }
                Err(e) => {
                    eprintln!("Unit failed: {}: {}", criteria.label(), e);
                    summary.failed += 1;
                    summary.failed_units.push((criteria.label(), e.to_string()));
                }
            }

            progress.inc(1);

            if index + 1 < units.len() && !self.options.unit_delay.is_zero() {
                thread::sleep(self.options.unit_delay);
            }
        }

        progress.finish_and_clear();
        self.sink.finish().context("Failed to finalize sink")?;
        Ok(summary)
    }

    /// Fetch and parse every page of one criteria unit. The first page
    /// reports the total result count; further pages follow at fixed
    /// offsets. Records are deduplicated by hotel id within the unit.
    fn scrape_unit(&self, criteria: &SearchCriteria) -> Result<Vec<HotelRecord>, ScrapeError> {
        let as_of = Utc::now();

        let raw = self.fetch_page(criteria, 0)?;
        let first = parse_response(&raw, criteria, as_of)?;

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut keep = |batch: Vec<HotelRecord>, records: &mut Vec<HotelRecord>| {
            for record in batch {
                if seen.insert(record.hotel_id.clone()) {
                    records.push(record);
                }
            }
        };

        let total = first.total_results;
        keep(first.records, &mut records);

        let mut offset = ROWS_PER_PAGE;
        while offset < total {
            let raw = self.fetch_page(criteria, offset)?;
            let page = parse_response(&raw, criteria, as_of)?;
            if page.records.is_empty() {
                // The endpoint sometimes reports more results than it will
                // serve; an empty page ends the unit early.
                break;
            }
            keep(page.records, &mut records);
            offset += ROWS_PER_PAGE;
        }

        Ok(records)
    }

    fn fetch_page(&self, criteria: &SearchCriteria, offset: u32) -> Result<Vec<u8>, ScrapeError> {
        let payload = self.builder.build(criteria, offset)?;

        let mut attempt = 0;
        loop {
            match self.transport.send(&payload) {
                Ok(raw) => return Ok(raw),
                Err(e) if e.is_retryable() && attempt < self.options.retry.max_retries => {
                    let delay = self.options.retry.delay(attempt);
                    attempt += 1;
                    println!(
                        "Transient error ({}), retry {}/{} in {:.1}s",
                        e,
                        attempt,
                        self.options.retry.max_retries,
                        delay.as_secs_f32()
                    );
                    thread::sleep(delay);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// A transient sink failure gets one retry; failing twice aborts the
    /// whole run, because silently dropping fetched data is worse than
    /// stopping.
    fn write_unit(&mut self, records: &[HotelRecord]) -> Result<()> {
        if let Err(first) = self.sink.write_unit(records) {
            eprintln!("Sink write failed ({}), retrying once", first);
            self.sink
                .write_unit(records)
                .context("Sink write failed twice, aborting run")?;
        }
        Ok(())
    }
}
