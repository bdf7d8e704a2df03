//! Test script configuration
//!
//! The test script is a YAML file declaring every register operation the
//! run performs: the init sequence, the authentication writes, the three
//! remote control commands, the information reads, and the measurement
//! channels. The core consumes it as an already-parsed, immutable
//! structure; section order in the file is execution order.
//!
//! A missing referenced step, a write step without `data`, or a read step
//! without a valid `count` is a configuration error and fatal to the run
//! before any device traffic happens.

use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{BreakerError, BreakerResult};
use crate::utils::validation;
use crate::{
    CONNECT_TIMEOUT_MS, CONTROL_STEP_ORDER, DEVICE_STATUS_STEP, PRINT_PAUSE_MS, PROBE_COUNT,
    PROBE_OFFSET_MS, READ_SPACING_MS, REQUEST_TIMEOUT_MS, STEP_SETTLE_MS, WRITE_SETTLE_MS,
};

/// One declared register operation
///
/// Write steps carry `data` and expect the write to succeed when
/// `pass_msg` is 1; read steps carry `count` and compare the first
/// returned register against `pass_msg` when present. Measurement
/// channels may label their registers through `value_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Register offset the operation targets
    pub address_dec: u16,
    /// Value to write (write steps only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<u16>,
    /// Number of registers to read (read steps only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u16>,
    /// Expected pass value; for write steps the expected success flag (1/0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_msg: Option<u16>,
    /// Human label used in progress output and reports
    #[serde(default)]
    pub comment: String,
    /// Per-register labels for multi-register measurement channels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_name: Option<Vec<String>>,
}

/// Comment-only entry describing the device identification record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentificationConfig {
    /// Human label used in the result record
    #[serde(default)]
    pub comment: String,
}

/// Result sink settings consumed by the report writer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Directory JSON reports are written into
    pub dump_dir: String,
}

/// The full test script, sections in execution order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// Registers written once before the control tests
    pub init_sequence: IndexMap<String, StepConfig>,
    /// Password registers, re-sent before every control command
    pub login: IndexMap<String, StepConfig>,
    /// The off/on/reset control commands
    pub remote_control_sequence: IndexMap<String, StepConfig>,
    /// Label for the device identification record
    #[serde(default)]
    pub device_id: IdentificationConfig,
    /// Status and information registers
    pub device_info: IndexMap<String, StepConfig>,
    /// Measurement channels sampled by the probes
    pub test_readings_sequence: IndexMap<String, StepConfig>,
    /// Result sink settings (`config` section of the script)
    #[serde(default, rename = "config", skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportConfig>,
}

impl TestConfig {
    /// Load and validate a test script from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> BreakerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            BreakerError::configuration(format!(
                "Cannot read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&text)
    }

    /// Parse and validate a test script from YAML text
    pub fn from_yaml(text: &str) -> BreakerResult<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the script is complete enough to drive a run
    ///
    /// Every write section step needs `data`, every read section step a
    /// valid `count`, and the steps the control phase references by name
    /// must exist.
    pub fn validate(&self) -> BreakerResult<()> {
        let write_sections = [
            ("init_sequence", &self.init_sequence),
            ("login", &self.login),
            ("remote_control_sequence", &self.remote_control_sequence),
        ];
        for (section, steps) in write_sections {
            for (name, step) in steps {
                if step.data.is_none() {
                    return Err(BreakerError::configuration(format!(
                        "{}.{} is a write step and needs a data value",
                        section, name
                    )));
                }
            }
        }

        let read_sections = [
            ("device_info", &self.device_info),
            ("test_readings_sequence", &self.test_readings_sequence),
        ];
        for (section, steps) in read_sections {
            for (name, step) in steps {
                match step.count {
                    Some(count) => validation::validate_register_count(count).map_err(|e| {
                        BreakerError::configuration(format!("{}.{}: {}", section, name, e))
                    })?,
                    None => {
                        return Err(BreakerError::configuration(format!(
                            "{}.{} is a read step and needs a register count",
                            section, name
                        )));
                    }
                }
            }
        }

        for name in CONTROL_STEP_ORDER {
            if !self.remote_control_sequence.contains_key(name) {
                return Err(BreakerError::configuration(format!(
                    "remote_control_sequence is missing required step {}",
                    name
                )));
            }
        }
        if !self.device_info.contains_key(DEVICE_STATUS_STEP) {
            return Err(BreakerError::configuration(format!(
                "device_info is missing required step {}",
                DEVICE_STATUS_STEP
            )));
        }

        Ok(())
    }

    /// The status register read after every control command
    pub fn status_step(&self) -> Option<&StepConfig> {
        self.device_info.get(DEVICE_STATUS_STEP)
    }
}

/// The timing contracts of a run
///
/// Every delay here is mandated by the device, not incidental: the breaker
/// needs physical settle time after control writes and a fixed offset
/// between measurement probes. Defaults come from the crate constants;
/// all fields are public so deployments and tests can tune them.
#[derive(Debug, Clone)]
pub struct TestTiming {
    /// Limit for the reachability probe and the session open
    pub connect_timeout: Duration,
    /// Limit for one register operation on an open session
    pub request_timeout: Duration,
    /// Pause after every register write, and between phases
    pub write_settle: Duration,
    /// Pause between consecutive channel reads inside one probe
    pub read_spacing: Duration,
    /// Pause after a control write before its status read
    pub step_settle: Duration,
    /// Offset between measurement probes
    pub probe_offset: Duration,
    /// Number of measurement probes per run
    pub probe_count: usize,
    /// Pause between information-read progress lines
    pub print_pause: Duration,
}

impl Default for TestTiming {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT_MS),
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            write_settle: Duration::from_millis(WRITE_SETTLE_MS),
            read_spacing: Duration::from_millis(READ_SPACING_MS),
            step_settle: Duration::from_millis(STEP_SETTLE_MS),
            probe_offset: Duration::from_millis(PROBE_OFFSET_MS),
            probe_count: PROBE_COUNT,
            print_pause: Duration::from_millis(PRINT_PAUSE_MS),
        }
    }
}

impl TestTiming {
    /// Timing with every pause removed, for tests and dry runs
    ///
    /// The connect and request limits keep their production defaults.
    pub fn immediate() -> Self {
        Self {
            connect_timeout: Duration::from_millis(CONNECT_TIMEOUT_MS),
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            write_settle: Duration::ZERO,
            read_spacing: Duration::ZERO,
            step_settle: Duration::ZERO,
            probe_offset: Duration::ZERO,
            probe_count: PROBE_COUNT,
            print_pause: Duration::ZERO,
        }
    }

    /// Planned duration of the measurement phase, reportable up front
    pub fn measurement_duration(&self) -> Duration {
        self.probe_offset * self.probe_count as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"
init_sequence:
  set_remote:
    address_dec: 660
    data: 1
    pass_msg: 1
    comment: "Set remote control mode"
login:
  passwd_part_1:
    address_dec: 20000
    data: 21320
    pass_msg: 1
    comment: "Password part 1"
  passwd_part_2:
    address_dec: 20001
    data: 22150
    pass_msg: 1
    comment: "Password part 2"
remote_control_sequence:
  t_off_c_break:
    address_dec: 661
    data: 1
    pass_msg: 8
    comment: "Switch breaker OFF"
  t_on_c_break:
    address_dec: 662
    data: 1
    pass_msg: 13
    comment: "Switch breaker ON"
  t_reset_c_break:
    address_dec: 663
    data: 1
    pass_msg: 8
    comment: "Reset breaker"
device_id:
  comment: "Device identification"
device_info:
  get_dev_status:
    address_dec: 3215
    count: 1
    pass_msg: 8
    comment: "Device status"
  get_dev_motor_status:
    address_dec: 3216
    count: 1
    comment: "Motor status"
test_readings_sequence:
  voltage:
    address_dec: 1000
    count: 3
    comment: "Phase voltages"
    value_name: ["v_l1", "v_l2", "v_l3"]
  frequency:
    address_dec: 1010
    count: 1
    comment: "Network frequency"
config:
  dump_dir: "/tmp/reports/"
"#;

    #[test]
    fn test_parse_full_script() {
        let config = TestConfig::from_yaml(SCRIPT).unwrap();
        assert_eq!(config.init_sequence.len(), 1);
        assert_eq!(config.login.len(), 2);
        assert_eq!(config.remote_control_sequence.len(), 3);
        assert_eq!(config.device_info.len(), 2);
        assert_eq!(config.test_readings_sequence.len(), 2);
        assert_eq!(config.report.unwrap().dump_dir, "/tmp/reports/");

        let voltage = &config.test_readings_sequence["voltage"];
        assert_eq!(voltage.count, Some(3));
        assert_eq!(
            voltage.value_name.as_deref(),
            Some(&["v_l1".to_string(), "v_l2".to_string(), "v_l3".to_string()][..])
        );
    }

    #[test]
    fn test_section_order_is_declared_order() {
        let config = TestConfig::from_yaml(SCRIPT).unwrap();
        let login_order: Vec<&str> = config.login.keys().map(String::as_str).collect();
        assert_eq!(login_order, vec!["passwd_part_1", "passwd_part_2"]);

        let channel_order: Vec<&str> =
            config.test_readings_sequence.keys().map(String::as_str).collect();
        assert_eq!(channel_order, vec!["voltage", "frequency"]);
    }

    #[test]
    fn test_status_step_lookup() {
        let config = TestConfig::from_yaml(SCRIPT).unwrap();
        let status = config.status_step().unwrap();
        assert_eq!(status.address_dec, 3215);
        assert_eq!(status.count, Some(1));
    }

    #[test]
    fn test_missing_control_step_is_rejected() {
        let script = SCRIPT.replace("t_reset_c_break", "t_other_c_break");
        let err = TestConfig::from_yaml(&script).unwrap_err();
        assert!(err.is_fatal());
        assert!(format!("{}", err).contains("t_reset_c_break"));
    }

    #[test]
    fn test_write_step_without_data_is_rejected() {
        let script = SCRIPT.replace("    data: 21320\n", "");
        let err = TestConfig::from_yaml(&script).unwrap_err();
        assert!(format!("{}", err).contains("passwd_part_1"));
    }

    #[test]
    fn test_read_step_without_count_is_rejected() {
        let script = SCRIPT.replace("    count: 3\n", "");
        let err = TestConfig::from_yaml(&script).unwrap_err();
        assert!(format!("{}", err).contains("voltage"));
    }

    #[test]
    fn test_oversized_read_count_is_rejected() {
        let script = SCRIPT.replace("count: 3", "count: 200");
        let err = TestConfig::from_yaml(&script).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unreadable_file_is_a_configuration_error() {
        let err = TestConfig::from_file("/nonexistent/config.yaml").unwrap_err();
        assert!(err.is_fatal());
        assert!(format!("{}", err).contains("config.yaml"));
    }

    #[test]
    fn test_timing_defaults_and_duration() {
        let timing = TestTiming::default();
        assert_eq!(timing.write_settle, Duration::from_millis(500));
        assert_eq!(timing.request_timeout, Duration::from_millis(2000));
        assert_eq!(timing.probe_count, 10);
        assert_eq!(timing.measurement_duration(), Duration::from_secs(20));

        let fast = TestTiming::immediate();
        assert_eq!(fast.measurement_duration(), Duration::ZERO);
        assert_eq!(fast.request_timeout, timing.request_timeout);
    }
}
