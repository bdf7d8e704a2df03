//! # Breaker Test Error Handling
//!
//! This module provides the error handling for the breaker acceptance-test
//! driver, covering endpoint connectivity, register exchange failures,
//! device identification decoding, configuration problems, and run
//! interruption.
//!
//! ## Overview
//!
//! Errors fall into three operational categories that decide how a test run
//! reacts to them:
//!
//! ### Run-fatal errors
//! - **Connection errors**: the endpoint reachability probe or the session
//!   open failed; the run aborts before any result record exists
//! - **Configuration errors**: unreadable test script, missing referenced
//!   steps, malformed step entries
//! - **I/O errors**: report file cannot be written
//!
//! ### Step-level errors
//! - **Write errors**: a single-register write was rejected or lost
//! - **Read errors**: a holding-register read returned an exception or a
//!   short response
//! - **Timeouts**: one register operation exceeded its limit
//!
//! These never abort a run; the step executor converts them into a failed
//! step record and the sequence continues.
//!
//! ### Degraded errors
//! - **Decode errors**: the device identification response had an
//!   unexpected shape; the identification is recorded empty and the run
//!   continues
//!
//! Interruption (Ctrl-C) is its own variant so the binary can report a
//! distinct exit status instead of a crash.
//!
//! ## Usage
//!
//! ```rust
//! use voltage_breaker_test::{BreakerError, BreakerResult};
//!
//! fn handle(result: BreakerResult<Vec<u16>>) {
//!     match result {
//!         Ok(values) => println!("read {} registers", values.len()),
//!         Err(error) if error.is_fatal() => {
//!             eprintln!("aborting run: {}", error);
//!         }
//!         Err(error) => {
//!             println!("step failed, continuing: {}", error);
//!         }
//!     }
//! }
//! ```

use thiserror::Error;

/// Result type alias for breaker test operations
///
/// This is a convenience type alias that uses `BreakerError` as the error
/// type for all operations in the crate, keeping error handling consistent
/// from the device link up to the orchestrator.
pub type BreakerResult<T> = Result<T, BreakerError>;

/// Error type covering every failure a test run can encounter
///
/// Each variant carries enough context to diagnose the failure; the
/// classification predicates (`is_fatal`, `is_step_level`, `is_degraded`)
/// encode how the run reacts to it.
#[derive(Error, Debug, Clone)]
pub enum BreakerError {
    /// Endpoint unreachable or session open failed
    ///
    /// Raised by the reachability probe and by the session open. Always
    /// fatal to the run: no result record is produced.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Test script or endpoint configuration problem
    ///
    /// Missing configuration file, unparseable YAML, a referenced step
    /// absent from its section, or a step entry without the field its
    /// operation requires. Detected before any device traffic.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// File system or socket I/O failure outside the field-bus session
    ///
    /// # Examples
    /// - Report file cannot be created under the dump directory
    /// - Result record fails to serialize
    #[error("I/O error: {message}")]
    Io { message: String },

    /// A single-register write was rejected
    ///
    /// Step-level: recorded as a failed step, the sequence continues.
    #[error("Write to register {address} failed: {message}")]
    Write { address: u16, message: String },

    /// A holding-register read failed or returned fewer values than asked
    ///
    /// Step-level: recorded as a failed step with no reading, the
    /// sequence continues.
    #[error("Read of {count} register(s) at {address} failed: {message}")]
    Read { address: u16, count: u16, message: String },

    /// One register operation exceeded its time limit
    ///
    /// Step-level for register traffic. The session-open timeout surfaces
    /// as a `Connection` error instead, which is fatal.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Device identification response had an unexpected shape
    ///
    /// Degraded: the identification is treated as empty, logged, and the
    /// run continues.
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// The run was interrupted from the outside (Ctrl-C)
    ///
    /// Mapped to a distinct exit status by the binary so an aborted run
    /// is never mistaken for a crash or a device failure.
    #[error("Test run interrupted")]
    Interrupted,
}

impl BreakerError {
    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection { message: message.into() }
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io { message: message.into() }
    }

    /// Create a new write error for the given register address
    pub fn write<S: Into<String>>(address: u16, message: S) -> Self {
        Self::Write { address, message: message.into() }
    }

    /// Create a new read error for the given address range
    pub fn read<S: Into<String>>(address: u16, count: u16, message: S) -> Self {
        Self::Read { address, count, message: message.into() }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms
        }
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode { message: message.into() }
    }

    /// Check if the error aborts the whole run
    ///
    /// Fatal errors stop the run before a result record is produced and
    /// the process exits with a distinct non-zero status.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use voltage_breaker_test::BreakerError;
    ///
    /// let err = BreakerError::connection("endpoint unreachable");
    /// assert!(err.is_fatal());
    ///
    /// let err = BreakerError::read(3215, 1, "exception response");
    /// assert!(!err.is_fatal());
    /// ```
    pub fn is_fatal(&self) -> bool {
        matches!(self,
            Self::Connection { .. } |
            Self::Configuration { .. } |
            Self::Io { .. }
        )
    }

    /// Check if the error is confined to a single step
    ///
    /// Step-level errors become a failed step record (`status = 0`); the
    /// phase keeps executing its remaining steps.
    pub fn is_step_level(&self) -> bool {
        matches!(self,
            Self::Write { .. } |
            Self::Read { .. } |
            Self::Timeout { .. }
        )
    }

    /// Check if the error degrades one result section without failing it
    ///
    /// Degraded errors leave their section empty or partial; the run
    /// continues and still produces a record.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use voltage_breaker_test::BreakerError;
    ///
    /// let err = BreakerError::decode("unexpected identification payload");
    /// assert!(err.is_degraded());
    /// assert!(!err.is_fatal());
    /// ```
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

/// Convert from std::io::Error
///
/// Used where report files are written; field-bus socket errors are mapped
/// to `Connection`/`Read`/`Write` at the device link instead.
impl From<std::io::Error> for BreakerError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

/// Convert from tokio timeout errors
///
/// Produces a generic timeout; callers that know the operation and its
/// limit build the timeout error themselves.
impl From<tokio::time::error::Elapsed> for BreakerError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::timeout("operation timeout", 0)
    }
}

/// Convert from YAML parse errors raised while loading the test script
impl From<serde_yaml::Error> for BreakerError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::configuration(format!("YAML error: {}", err))
    }
}

/// Convert from serde JSON errors raised while writing reports
impl From<serde_json::Error> for BreakerError {
    fn from(err: serde_json::Error) -> Self {
        Self::io(format!("JSON error: {}", err))
    }
}
