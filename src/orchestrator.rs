//! Run orchestration
//!
//! The orchestrator owns the lifecycle of one acceptance run: it stamps
//! the run id and start time, probes and connects the device, drives the
//! three phases in order, and assembles the single result record. The
//! reachability gate before the first phase is the only fatal network
//! check; once a phase starts, step failures stay inside their records.

use std::fmt;
use std::str::FromStr;

use chrono::Local;
use log::{info, warn};
use tokio::time::sleep;
use uuid::Uuid;

use crate::config::{TestConfig, TestTiming};
use crate::error::{BreakerError, BreakerResult};
use crate::link::{DeviceConnector, DeviceLink, Endpoint, TcpConnector};
use crate::phases;
use crate::progress::ProgressReporter;
use crate::report::ResultRecord;
use crate::step::{StepExecutor, StepRecord};
use crate::utils::OperationTimer;
use crate::TIME_FORMAT;

/// How the run distributes its phases over devices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestMode {
    /// All phases run against the primary device
    Full,
    /// Control runs against the primary device, information and
    /// measurement against the secondary one
    Split,
}

impl FromStr for TestMode {
    type Err = BreakerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "split" => Ok(Self::Split),
            other => Err(BreakerError::configuration(format!(
                "Unknown test mode: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Split => write!(f, "split"),
        }
    }
}

/// Short run id, the last segment of a fresh random UUID
fn new_test_id() -> String {
    let id = Uuid::new_v4().to_string();
    match id.rsplit('-').next() {
        Some(segment) => segment.to_string(),
        None => id,
    }
}

fn current_test_time() -> String {
    Local::now().format(TIME_FORMAT).to_string()
}

/// Drives one acceptance run end to end
pub struct Orchestrator {
    config: TestConfig,
    timing: TestTiming,
    progress: ProgressReporter,
    connector: Box<dyn DeviceConnector>,
}

impl Orchestrator {
    /// Create an orchestrator with default timing, console progress and
    /// the TCP connector
    pub fn new(config: TestConfig) -> Self {
        Self {
            config,
            timing: TestTiming::default(),
            progress: ProgressReporter::console(),
            connector: Box::new(TcpConnector),
        }
    }

    pub fn with_timing(mut self, timing: TestTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Substitute the connector, used by tests to script devices
    pub fn with_connector(mut self, connector: Box<dyn DeviceConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Run the full acceptance sequence and return its record
    ///
    /// Fatal conditions surface as errors before any record content is
    /// produced: an incomplete script, an unreachable primary device, or
    /// a split run without a secondary endpoint. A secondary device that
    /// is unreachable or refuses the session in split mode is not fatal;
    /// the run reports the control section alone.
    pub async fn run(
        &self,
        mode: TestMode,
        primary: &Endpoint,
        secondary: Option<&Endpoint>,
    ) -> BreakerResult<ResultRecord> {
        let status_step = self
            .config
            .status_step()
            .ok_or_else(|| {
                BreakerError::configuration("device_info is missing the status step")
            })?
            .clone();
        let secondary = match mode {
            TestMode::Full => None,
            TestMode::Split => Some(secondary.ok_or_else(|| {
                BreakerError::configuration("Split mode needs a secondary device address")
            })?),
        };

        let mut record = ResultRecord::new(new_test_id(), current_test_time());
        info!("Starting {} test {} at {}", mode, record.test_id, record.test_time);

        self.progress.phase(&format!("Connecting to {}", primary));
        if !self
            .connector
            .probe(primary, self.timing.connect_timeout)
            .await
        {
            return Err(BreakerError::connection(format!(
                "Device {} is not reachable",
                primary
            )));
        }
        let mut primary_link = self
            .connector
            .connect(primary, self.timing.connect_timeout)
            .await?;

        let executor = StepExecutor::new(self.timing.clone());

        let timer = OperationTimer::start("remote control test");
        let control = phases::run_remote_control_test(
            primary_link.as_mut(),
            &executor,
            &self.config,
            &status_step,
            &self.progress,
        )
        .await;
        timer.stop_and_log(control.values().all(StepRecord::passed));
        record.control_test = Some(control);
        sleep(self.timing.write_settle).await;

        match secondary {
            None => {
                self.run_read_phases(primary_link.as_mut(), &executor, &mut record)
                    .await;
            }
            Some(secondary) => {
                let secondary_link = if self
                    .connector
                    .probe(secondary, self.timing.connect_timeout)
                    .await
                {
                    match self
                        .connector
                        .connect(secondary, self.timing.connect_timeout)
                        .await
                    {
                        Ok(link) => Some(link),
                        Err(e) => {
                            warn!("Split device {} session open failed: {}", secondary, e);
                            None
                        }
                    }
                } else {
                    warn!("Split device {} is not reachable", secondary);
                    None
                };
                match secondary_link {
                    Some(mut link) => {
                        self.run_read_phases(link.as_mut(), &executor, &mut record)
                            .await;
                        close_link(link.as_mut()).await;
                    }
                    None => {
                        self.progress.detail(&format!(
                            "Split device {} not reachable, sections skipped",
                            secondary
                        ));
                    }
                }
            }
        }

        close_link(primary_link.as_mut()).await;
        info!("Test {} complete", record.test_id);
        Ok(record)
    }

    /// The information and measurement phases, on whichever link the
    /// mode selected
    async fn run_read_phases(
        &self,
        link: &mut dyn DeviceLink,
        executor: &StepExecutor,
        record: &mut ResultRecord,
    ) {
        let timer = OperationTimer::start("device information read");
        let info = phases::run_device_information_test(link, executor, &self.config, &self.progress)
            .await;
        timer.stop_and_log(info.values().all(StepRecord::passed));
        record.read_info_test = Some(info);
        sleep(self.timing.write_settle).await;

        let timer = OperationTimer::start("measurement read");
        let values =
            phases::run_measurement_test(link, executor, &self.config, &self.progress).await;
        timer.stop_and_log(
            values
                .values()
                .flat_map(|snapshot| snapshot.values())
                .all(StepRecord::passed),
        );
        record.read_values_test = Some(values);
    }
}

async fn close_link(link: &mut dyn DeviceLink) {
    if let Err(e) = link.close().await {
        warn!("Closing session to {} failed: {}", link.endpoint(), e);
    }
}
