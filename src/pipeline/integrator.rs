//! Run loops that tie the IPED services to the Salesforce sender.
//!
//! Users are processed one at a time, end to end. A user whose profile,
//! trails or courses cannot be fetched is reported and skipped; a batch that
//! cannot be delivered after its retries aborts the run with the batch still
//! buffered.

use crate::apis::{CourseService, IpedClient, TrailService, UserService};
use crate::app::ports::{DeliveryPort, HttpClientPort};
use crate::common::error::{IntegratorError, Result};
use crate::common::retry::RetryPolicy;
use crate::common::types::User;
use crate::config::{Config, TransformConfig};
use crate::pipeline::sender::{BatchSender, DataEventRow};
use crate::pipeline::table::Table;
use crate::pipeline::transform::{TableTransformer, TransformReport};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Result of one integrator run.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub records_total: usize,
    pub records_sent: usize,
    pub batches_sent: usize,
    /// Ids of the users (or export rows) that were skipped.
    pub skipped: Vec<String>,
    pub errors: Vec<String>,
}

impl RunReport {
    fn skip(&mut self, id: impl ToString, error: &IntegratorError) {
        self.skipped.push(id.to_string());
        self.errors.push(error.to_string());
    }
}

pub struct Integrator {
    run_id: Uuid,
    config: Config,
    http: Arc<dyn HttpClientPort>,
    users: UserService,
    trails: TrailService,
    courses: CourseService,
    sender: BatchSender,
    retry: RetryPolicy,
}

impl Integrator {
    pub fn new(config: Config, http: Arc<dyn HttpClientPort>, delivery: Arc<dyn DeliveryPort>) -> Self {
        let retry = config.http.retry_policy();
        let client = IpedClient::new(http.clone(), config.iped.clone());
        Self {
            run_id: Uuid::new_v4(),
            users: UserService::new(client.clone(), retry.clone()),
            trails: TrailService::new(client.clone()),
            courses: CourseService::new(client),
            sender: BatchSender::new(delivery),
            retry,
            http,
            config,
        }
    }

    /// Flush batches at `limit` bytes instead of the payload limit.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.sender.set_limit(limit);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The API pipeline: every user of both tenancies, enriched and sent.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub async fn run(&mut self) -> Result<RunReport> {
        let started = Instant::now();
        let mut report = self.new_report();

        let mut users = self.users.get_users_basic_info().await?;
        report.records_total = users.len();
        info!(users = users.len(), "Starting user processing");

        for user in users.iter_mut() {
            if let Err(e) = self.process_user(user).await {
                error!(user_id = user.id, "Skipping user: {}", e);
                crate::observability::metrics::run::user_failed();
                report.skip(user.id, &e);
                continue;
            }
            crate::observability::metrics::run::user_processed();

            self.sender.append(DataEventRow::from(&*user))?;
            if self.sender.ready_to_send() {
                self.flush(&mut report).await?;
            }
        }
        self.flush(&mut report).await?;

        let secs = started.elapsed().as_secs_f64();
        crate::observability::metrics::run::duration(secs);
        info!(
            users = report.records_total,
            sent = report.records_sent,
            skipped = report.skipped.len(),
            batches = report.batches_sent,
            secs,
            "Run finished"
        );
        Ok(report)
    }

    async fn process_user(&self, user: &mut User) -> Result<()> {
        self.users.get_user_full_info(user).await?;
        self.trails.get_user_trails(user).await?;
        self.courses.get_user_courses(user).await?;
        Ok(())
    }

    /// The CSV export pipeline: download, clean, send one row per line.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub async fn run_export(&mut self) -> Result<(RunReport, TransformReport)> {
        let started = Instant::now();
        let export = self.config.require_export()?.clone();
        let delimiter = delimiter_byte(export.delimiter)?;
        let mut report = self.new_report();

        info!(url = %export.url, "Downloading export");
        let http = &self.http;
        let url = export.url.as_str();
        let body = self
            .retry
            .run("iped.export", || async move {
                let response = http.get(url).await?;
                if !(200..=299).contains(&response.status) {
                    return Err(IntegratorError::response(
                        response.status,
                        response.body,
                        "export download failed",
                    ));
                }
                Ok(response.body)
            })
            .await?;

        let mut table = Table::from_csv_str(&body, delimiter)?;
        report.records_total = table.len();
        info!(rows = table.len(), columns = table.columns().len(), "Export parsed");

        let transform_report = TableTransformer::new(self.config.transform.clone()).run(&mut table)?;

        for row in 0..table.len() {
            let data_row = match DataEventRow::from_table_row(&table, row, &export.key_column) {
                Ok(data_row) => data_row,
                Err(e) => {
                    warn!(row, "Skipping export row: {}", e);
                    report.skip(row, &e);
                    continue;
                }
            };
            self.sender.append(data_row)?;
            if self.sender.ready_to_send() {
                self.flush(&mut report).await?;
            }
        }
        self.flush(&mut report).await?;

        let secs = started.elapsed().as_secs_f64();
        crate::observability::metrics::run::duration(secs);
        info!(
            rows = report.records_total,
            sent = report.records_sent,
            skipped = report.skipped.len(),
            secs,
            "Export run finished"
        );
        Ok((report, transform_report))
    }

    /// Flush the sender, retrying delivery failures with backoff.
    async fn flush(&mut self, report: &mut RunReport) -> Result<()> {
        // `RetryPolicy::run` cannot hold `&mut self.sender` across attempts,
        // so the loop is spelled out with the same retry rule.
        let mut attempt = 0;
        loop {
            match self.sender.flush().await {
                Ok(0) => return Ok(()),
                Ok(rows) => {
                    report.records_sent += rows;
                    report.batches_sent += 1;
                    return Ok(());
                }
                Err(e) if self.retry.should_retry(&e, attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Flush failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(buffered = self.sender.len(), "Giving up on batch: {}", e);
                    return Err(e);
                }
            }
        }
    }

    fn new_report(&self) -> RunReport {
        RunReport {
            run_id: self.run_id.to_string(),
            ..Default::default()
        }
    }
}

fn delimiter_byte(delimiter: char) -> Result<u8> {
    if !delimiter.is_ascii() {
        return Err(IntegratorError::config(format!(
            "CSV delimiter '{delimiter}' is not an ASCII character"
        )));
    }
    Ok(delimiter as u8)
}

/// Clean a local CSV file and write the result, without any network access.
#[instrument(skip(config), fields(input = %input.display(), output = %output.display()))]
pub fn transform_file(
    input: &Path,
    output: &Path,
    config: &TransformConfig,
    delimiter: char,
) -> Result<TransformReport> {
    let delimiter = delimiter_byte(delimiter)?;
    let mut table = Table::from_csv_reader(BufReader::new(File::open(input)?), delimiter)?;
    let report = TableTransformer::new(config.clone()).run(&mut table)?;
    table.write_csv(BufWriter::new(File::create(output)?), delimiter)?;
    info!(rows = table.len(), failures = report.failures.len(), "Transformed file written");
    Ok(report)
}
