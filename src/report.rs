//! Result records and sinks
//!
//! A run produces exactly one result record. The record is assembled by
//! the orchestrator and handed to a sink once, after the device sessions
//! are closed: either pretty-printed to stdout or written as a JSON file
//! named after the test id.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use log::info;
use serde::Serialize;

use crate::config::ReportConfig;
use crate::error::{BreakerError, BreakerResult};
use crate::step::StepRecord;

/// The single record of one run
///
/// Section fields are optional: a split run against an unreachable
/// secondary device reports only the sections that ran, and absent
/// sections stay out of the serialized record entirely.
#[derive(Debug, Clone, Serialize)]
pub struct ResultRecord {
    /// Short random id naming the run and its report file
    #[serde(rename = "TestID")]
    pub test_id: String,
    /// Wall-clock start time of the run
    #[serde(rename = "TestTime")]
    pub test_time: String,
    /// Init, login and remote control records
    #[serde(rename = "ControlTest", skip_serializing_if = "Option::is_none")]
    pub control_test: Option<IndexMap<String, StepRecord>>,
    /// Identification and information read records
    #[serde(rename = "ReadInfoTest", skip_serializing_if = "Option::is_none")]
    pub read_info_test: Option<IndexMap<String, StepRecord>>,
    /// Measurement snapshots keyed by probe index
    #[serde(rename = "ReadValuesTest", skip_serializing_if = "Option::is_none")]
    pub read_values_test: Option<BTreeMap<usize, IndexMap<String, StepRecord>>>,
}

impl ResultRecord {
    /// Create an empty record for a run starting now
    pub fn new<S: Into<String>, T: Into<String>>(test_id: S, test_time: T) -> Self {
        Self {
            test_id: test_id.into(),
            test_time: test_time.into(),
            control_test: None,
            read_info_test: None,
            read_values_test: None,
        }
    }
}

/// Where the result record goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-print to stdout
    Dump,
    /// Write `<TestID>.json` under the configured dump directory
    Json,
}

impl FromStr for OutputFormat {
    type Err = BreakerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dump" => Ok(Self::Dump),
            "json" => Ok(Self::Json),
            other => Err(BreakerError::configuration(format!(
                "Unknown output format: {}",
                other
            ))),
        }
    }
}

/// Pretty-print the record to stdout
pub fn dump(record: &ResultRecord) -> BreakerResult<()> {
    let text = serde_json::to_string_pretty(record)?;
    println!("{}", text);
    Ok(())
}

/// Write the record as `<TestID>.json` under `dump_dir`
///
/// The directory is created when missing. A record that cannot be
/// written is an error, not a warning.
pub fn write_json(record: &ResultRecord, dump_dir: &str) -> BreakerResult<PathBuf> {
    let dir = Path::new(dump_dir);
    fs::create_dir_all(dir).map_err(|e| {
        BreakerError::io(format!(
            "Cannot create report directory {}: {}",
            dir.display(),
            e
        ))
    })?;
    let path = dir.join(format!("{}.json", record.test_id));
    let text = serde_json::to_string_pretty(record)?;
    fs::write(&path, text)
        .map_err(|e| BreakerError::io(format!("Cannot write report {}: {}", path.display(), e)))?;
    info!("Report saved to {}", path.display());
    Ok(path)
}

/// Send the record to the selected sink
pub fn deliver(
    record: &ResultRecord,
    format: OutputFormat,
    report: Option<&ReportConfig>,
) -> BreakerResult<()> {
    match format {
        OutputFormat::Dump => dump(record),
        OutputFormat::Json => {
            let report = report.ok_or_else(|| {
                BreakerError::configuration(
                    "JSON output needs a config section with dump_dir in the test script",
                )
            })?;
            let path = write_json(record, &report.dump_dir)?;
            println!("Result saved in: {}", path.display());
            Ok(())
        }
    }
}
