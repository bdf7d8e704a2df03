//! Single-step execution
//!
//! One step is one register operation judged against its configured
//! expectation. The executor owns the per-step timing contract: the
//! breaker needs settle time after every write and spacing between
//! channel reads, and every register operation runs under the request
//! timeout so a silent device cannot stall the sequence. Link failures
//! never escape a step; they become a failed record so the surrounding
//! sequence always runs to completion.

use log::warn;
use serde::Serialize;
use tokio::time::{sleep, timeout};

use crate::codec;
use crate::config::{StepConfig, TestTiming};
use crate::error::{BreakerError, BreakerResult};
use crate::link::DeviceLink;
use crate::{MOTOR_STATUS_PASS_VALUES, MOTOR_STATUS_STEP};

/// Value captured by a step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reading {
    /// Raw status register
    Register(u16),
    /// Normalized measurement registers
    Values(Vec<i16>),
    /// Device identification strings
    Identification(Vec<String>),
}

/// Outcome of one executed step
///
/// Echoes the step configuration so a report reads without the script
/// next to it, and adds the judged status and any captured value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_dec: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_msg: Option<u16>,
    pub comment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_name: Option<Vec<String>>,
    /// 1 pass, 0 fail
    pub status: u8,
    #[serde(rename = "value", skip_serializing_if = "Option::is_none")]
    pub reading: Option<Reading>,
}

impl StepRecord {
    pub(crate) fn from_config(step: &StepConfig, status: u8, reading: Option<Reading>) -> Self {
        Self {
            address_dec: Some(step.address_dec),
            data: step.data,
            count: step.count,
            pass_msg: step.pass_msg,
            comment: step.comment.clone(),
            value_name: step.value_name.clone(),
            status,
            reading,
        }
    }

    /// Record for the device identification entry, which targets no register
    pub fn identification(comment: &str, status: u8, objects: Vec<String>) -> Self {
        Self {
            address_dec: None,
            data: None,
            count: None,
            pass_msg: None,
            comment: comment.to_string(),
            value_name: None,
            status,
            reading: Some(Reading::Identification(objects)),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == 1
    }
}

/// Judge a read against its expectation
///
/// A step with a pass_msg passes when the first register equals it. The
/// motor status step carries no scripted pass_msg; its healthy values are
/// fixed by the device documentation. Steps with neither pass on any
/// successful read.
fn judge_status(name: &str, step: &StepConfig, first: u16) -> u8 {
    if let Some(expected) = step.pass_msg {
        u8::from(first == expected)
    } else if name == MOTOR_STATUS_STEP {
        u8::from(MOTOR_STATUS_PASS_VALUES.contains(&first))
    } else {
        1
    }
}

/// Executes single steps under the run's timing contract
pub struct StepExecutor {
    timing: TestTiming,
}

impl StepExecutor {
    pub fn new(timing: TestTiming) -> Self {
        Self { timing }
    }

    pub fn timing(&self) -> &TestTiming {
        &self.timing
    }

    /// Write one register under the request timeout
    pub async fn write_register(
        &self,
        link: &mut dyn DeviceLink,
        address: u16,
        value: u16,
    ) -> BreakerResult<()> {
        match timeout(
            self.timing.request_timeout,
            link.write_single_register(address, value),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BreakerError::timeout(
                format!("write of register {}", address),
                self.timing.request_timeout.as_millis() as u64,
            )),
        }
    }

    /// Read holding registers under the request timeout
    pub async fn read_registers(
        &self,
        link: &mut dyn DeviceLink,
        address: u16,
        count: u16,
    ) -> BreakerResult<Vec<u16>> {
        match timeout(
            self.timing.request_timeout,
            link.read_holding_registers(address, count),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BreakerError::timeout(
                format!("read of {} register(s) at {}", count, address),
                self.timing.request_timeout.as_millis() as u64,
            )),
        }
    }

    /// Read the device identification under the request timeout
    pub async fn read_identification(
        &self,
        link: &mut dyn DeviceLink,
    ) -> BreakerResult<Vec<String>> {
        match timeout(
            self.timing.request_timeout,
            link.read_device_identification(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BreakerError::timeout(
                "device identification read",
                self.timing.request_timeout.as_millis() as u64,
            )),
        }
    }

    /// Execute a write step
    ///
    /// Sends the configured value and judges the write outcome against
    /// pass_msg (1 expects success). The write settle runs after the
    /// attempt whether it succeeded or not.
    pub async fn write_step(
        &self,
        link: &mut dyn DeviceLink,
        name: &str,
        step: &StepConfig,
    ) -> StepRecord {
        let value = match step.data {
            Some(value) => value,
            None => {
                warn!("Write step {} has no data value, marking failed", name);
                return StepRecord::from_config(step, 0, None);
            }
        };
        let write_ok = match self.write_register(link, step.address_dec, value).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Write step {} failed: {}", name, e);
                false
            }
        };
        let status = match step.pass_msg {
            Some(expected) => u8::from(u16::from(write_ok) == expected),
            None => u8::from(write_ok),
        };
        sleep(self.timing.write_settle).await;
        StepRecord::from_config(step, status, None)
    }

    /// Execute a status or information read step
    pub async fn read_step(
        &self,
        link: &mut dyn DeviceLink,
        name: &str,
        step: &StepConfig,
    ) -> StepRecord {
        let count = step.count.unwrap_or(1);
        match self.read_registers(link, step.address_dec, count).await {
            Ok(values) => match values.first() {
                Some(&first) => {
                    let status = judge_status(name, step, first);
                    StepRecord::from_config(step, status, Some(Reading::Register(first)))
                }
                None => StepRecord::from_config(step, 0, None),
            },
            Err(e) => {
                warn!("Read step {} failed: {}", name, e);
                StepRecord::from_config(step, 0, None)
            }
        }
    }

    /// Execute a measurement channel read
    ///
    /// Raw registers go through the codec so the record carries signed
    /// engineering values. The read spacing runs after each channel.
    pub async fn read_channel(
        &self,
        link: &mut dyn DeviceLink,
        name: &str,
        step: &StepConfig,
    ) -> StepRecord {
        let count = step.count.unwrap_or(1);
        let record = match self.read_registers(link, step.address_dec, count).await {
            Ok(raw) => {
                let values = codec::normalize_all(&raw);
                StepRecord::from_config(step, 1, Some(Reading::Values(values)))
            }
            Err(e) => {
                warn!("Channel {} read failed: {}", name, e);
                StepRecord::from_config(step, 0, None)
            }
        };
        sleep(self.timing.read_spacing).await;
        record
    }
}
