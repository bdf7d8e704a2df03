//! # Voltage Breaker Test - Automated Breaker Controller Acceptance Testing
//!
//! **Author:** Evan Liu <evan.liu@voltageenergy.com>
//! **Version:** 0.1.0
//! **License:** MIT
//!
//! An automated acceptance test driver for networked circuit breaker
//! controllers over Modbus TCP, built for factory commissioning and smart
//! grid field deployments. One run drives the whole scripted sequence:
//! remote control commands, device information reads and timed
//! measurement probes, judged against the expectations declared in a
//! YAML test script and reported as a single JSON record.
//!
//! ## Features
//!
//! - **🔌 Scripted Sequences**: every register operation of a run is declared in a YAML test script
//! - **🔑 Re-authentication**: the controller closes its password window after every command, logins repeat automatically
//! - **🧪 Total Phases**: failed steps become failed records and the sequence always runs to completion
//! - **📊 Signed Measurements**: raw registers pass through the offset codec into engineering values
//! - **🔀 Full and Split Modes**: control and measurement phases can target different devices
//! - **🛡️ Memory Safe**: pure Rust implementation with zero unsafe code
//!
//! ## Test Phases
//!
//! | Phase | Record Section | Device |
//! |-------|----------------|--------|
//! | Remote control | ControlTest | primary |
//! | Information read | ReadInfoTest | primary or split |
//! | Measurement read | ReadValuesTest | primary or split |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use voltage_breaker_test::{BreakerResult, Endpoint, Orchestrator, TestConfig, TestMode};
//!
//! #[tokio::main]
//! async fn main() -> BreakerResult<()> {
//!     let config = TestConfig::from_file("config/config.yaml")?;
//!     let device = Endpoint::new("192.168.1.50", 502, 255);
//!
//!     let orchestrator = Orchestrator::new(config);
//!     let record = orchestrator.run(TestMode::Full, &device, None).await?;
//!
//!     voltage_breaker_test::report::dump(&record)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  breaker_test   │  CLI entry point
//! └─────────────────┘
//!          │
//! ┌─────────────────┐    ┌─────────────────┐
//! │  Orchestrator   │───►│  Result Record  │
//! └─────────────────┘    └─────────────────┘
//!          │
//! ┌─────────────────┐    ┌─────────────────┐
//! │     Phases      │───►│  Step Executor  │
//! └─────────────────┘    └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   Device Link   │  Modbus TCP session
//! └─────────────────┘
//! ```

/// Core error types and result handling
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod error;

/// Register value codec for offset-binary measurements
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod codec;

/// Test script configuration and run timing
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod config;

/// Device link over Modbus TCP
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod link;

/// Single-step execution and records
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod step;

/// The remote control, information and measurement phases
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod phases;

/// Run orchestration and test modes
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod orchestrator;

/// Result records and sinks
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod report;

/// Progress reporting for interactive runs
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod progress;

/// Utility functions and operation timing
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod utils;

// Re-export main types for convenience
pub use codec::{normalize, normalize_all};
pub use config::{IdentificationConfig, ReportConfig, StepConfig, TestConfig, TestTiming};
pub use error::{BreakerError, BreakerResult};
pub use link::{DeviceConnector, DeviceLink, Endpoint, ModbusDeviceLink, TcpConnector};
pub use orchestrator::{Orchestrator, TestMode};
pub use progress::{ProgressCallback, ProgressReporter};
pub use report::{OutputFormat, ResultRecord};
pub use step::{Reading, StepExecutor, StepRecord};
pub use utils::OperationTimer;

/// Modbus TCP default port
pub const DEFAULT_DEVICE_PORT: u16 = 502;

/// Default unit identifier of the breaker controller
pub const DEFAULT_UNIT_ID: u8 = 255;

/// Timeout for the reachability probe and the session open
pub const CONNECT_TIMEOUT_MS: u64 = 2000;

/// Limit for one register operation on an open session
pub const REQUEST_TIMEOUT_MS: u64 = 2000;

/// Settle time after every register write
pub const WRITE_SETTLE_MS: u64 = 500;

/// Spacing between consecutive channel reads inside one probe
pub const READ_SPACING_MS: u64 = 100;

/// Settle time between a control command and its status confirmation
pub const STEP_SETTLE_MS: u64 = 2000;

/// Offset between measurement probes
pub const PROBE_OFFSET_MS: u64 = 2000;

/// Number of measurement probes per run
pub const PROBE_COUNT: usize = 10;

/// Pause between information-read progress lines
pub const PRINT_PAUSE_MS: u64 = 500;

/// Maximum number of registers one read request may ask for
pub const MAX_REGISTERS_PER_READ: u16 = 125;

/// Motor status values the controller reports when the spring drive is healthy
pub const MOTOR_STATUS_PASS_VALUES: [u16; 2] = [27, 31];

/// The remote control commands in their mandatory execution order
pub const CONTROL_STEP_ORDER: [&str; 3] = ["t_off_c_break", "t_on_c_break", "t_reset_c_break"];

/// Name of the status step confirming every control command
pub const DEVICE_STATUS_STEP: &str = "get_dev_status";

/// Name of the motor status step with fixed pass values
pub const MOTOR_STATUS_STEP: &str = "get_dev_motor_status";

/// Modbus function code of Read Device Identification
pub const DEVICE_ID_FUNCTION: u8 = 0x2B;

/// MEI type of Read Device Identification
pub const DEVICE_ID_MEI_TYPE: u8 = 0x0E;

/// Read Device ID code requesting the basic object set
pub const DEVICE_ID_READ_BASIC: u8 = 0x01;

/// First object id of the basic identification set
pub const DEVICE_ID_FIRST_OBJECT: u8 = 0x00;

/// Timestamp format of the result record
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!(
        "Voltage Breaker Test v{} - Automated breaker controller acceptance testing by Evan Liu",
        VERSION
    )
}
