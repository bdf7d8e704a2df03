//! The three test phases
//!
//! Each phase drives one section of the script over a live link and
//! returns its records. Phases are total: a failed step becomes a failed
//! record and the phase keeps going, so the record maps always describe
//! the whole declared sequence. Only the orchestrator decides what is
//! fatal, and it does so before any phase starts.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use log::{info, warn};
use tokio::time::sleep;

use crate::config::{StepConfig, TestConfig};
use crate::link::DeviceLink;
use crate::progress::ProgressReporter;
use crate::step::{Reading, StepExecutor, StepRecord};
use crate::utils::format;
use crate::CONTROL_STEP_ORDER;

/// Run the remote control phase
///
/// The init sequence runs once, then the off/on/reset commands run in
/// their fixed order. The device closes its password window after every
/// command, so the login writes repeat before each one. Records of
/// repeated login steps keep their first position and carry the latest
/// outcome.
pub async fn run_remote_control_test(
    link: &mut dyn DeviceLink,
    executor: &StepExecutor,
    config: &TestConfig,
    status_step: &StepConfig,
    progress: &ProgressReporter,
) -> IndexMap<String, StepRecord> {
    progress.phase("Remote control test");
    let mut records: IndexMap<String, StepRecord> = IndexMap::new();

    write_sequence(link, executor, &config.init_sequence, progress, &mut records).await;

    for command in CONTROL_STEP_ORDER {
        let step = match config.remote_control_sequence.get(command) {
            Some(step) => step,
            None => continue,
        };
        write_sequence(link, executor, &config.login, progress, &mut records).await;
        let record = execute_control_command(link, executor, command, step, status_step).await;
        progress.outcome(&record.comment, record.passed());
        records.insert(command.to_string(), record);
    }

    records
}

/// Execute one write section in declared order, recording every step
async fn write_sequence(
    link: &mut dyn DeviceLink,
    executor: &StepExecutor,
    steps: &IndexMap<String, StepConfig>,
    progress: &ProgressReporter,
    records: &mut IndexMap<String, StepRecord>,
) {
    for (name, step) in steps {
        let record = executor.write_step(link, name, step).await;
        progress.outcome(&record.comment, record.passed());
        records.insert(name.clone(), record);
    }
}

/// One remote control command
///
/// Writes the command register, waits for the breaker to physically act,
/// then confirms through the status register: the command passes when
/// the observed status equals its pass_msg. A failed command write skips
/// the confirmation and marks the command failed.
async fn execute_control_command(
    link: &mut dyn DeviceLink,
    executor: &StepExecutor,
    name: &str,
    step: &StepConfig,
    status_step: &StepConfig,
) -> StepRecord {
    let write_ok = match step.data {
        Some(data) => match executor.write_register(link, step.address_dec, data).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Control command {} failed: {}", name, e);
                false
            }
        },
        None => false,
    };
    sleep(executor.timing().write_settle).await;
    if !write_ok {
        return StepRecord::from_config(step, 0, None);
    }

    sleep(executor.timing().step_settle).await;
    let count = status_step.count.unwrap_or(1);
    match executor
        .read_registers(link, status_step.address_dec, count)
        .await
    {
        Ok(values) => match values.first() {
            Some(&observed) => {
                let status = match step.pass_msg {
                    Some(expected) => u8::from(observed == expected),
                    None => 1,
                };
                StepRecord::from_config(step, status, Some(Reading::Register(observed)))
            }
            None => StepRecord::from_config(step, 0, None),
        },
        Err(e) => {
            warn!("Status read after {} failed: {}", name, e);
            StepRecord::from_config(step, 0, None)
        }
    }
}

/// Run the device information phase
///
/// Identification goes first. An unreadable or malformed identification
/// is not fatal: the record degrades to an empty value and the register
/// reads still run.
pub async fn run_device_information_test(
    link: &mut dyn DeviceLink,
    executor: &StepExecutor,
    config: &TestConfig,
    progress: &ProgressReporter,
) -> IndexMap<String, StepRecord> {
    progress.phase("Device information read");
    let mut records: IndexMap<String, StepRecord> = IndexMap::new();

    let id_record = match executor.read_identification(link).await {
        Ok(objects) => StepRecord::identification(&config.device_id.comment, 1, objects),
        Err(e) => {
            warn!("Device identification unavailable: {}", e);
            StepRecord::identification(&config.device_id.comment, 0, Vec::new())
        }
    };
    progress.outcome(&id_record.comment, id_record.passed());
    records.insert("device_id".to_string(), id_record);
    sleep(executor.timing().print_pause).await;

    for (name, step) in &config.device_info {
        let record = executor.read_step(link, name, step).await;
        progress.outcome(&record.comment, record.passed());
        records.insert(name.clone(), record);
        sleep(executor.timing().print_pause).await;
    }

    records
}

/// Run the measurement phase
///
/// Takes `probe_count` probes of every measurement channel, one probe
/// every `probe_offset`. Each probe gets its own snapshot of records, so
/// the report shows the values as they moved over the window.
pub async fn run_measurement_test(
    link: &mut dyn DeviceLink,
    executor: &StepExecutor,
    config: &TestConfig,
    progress: &ProgressReporter,
) -> BTreeMap<usize, IndexMap<String, StepRecord>> {
    let timing = executor.timing();
    progress.phase("Measurement read");
    progress.detail(&format!(
        "{} probes every {}, about {} total",
        timing.probe_count,
        format::format_duration(timing.probe_offset),
        format::format_duration(timing.measurement_duration())
    ));
    info!(
        "Starting measurement read: {} probes over {} channels",
        timing.probe_count,
        config.test_readings_sequence.len()
    );

    let mut probes: BTreeMap<usize, IndexMap<String, StepRecord>> = BTreeMap::new();
    for index in 0..timing.probe_count {
        progress.detail(&format!("Probe {} of {}", index + 1, timing.probe_count));
        let mut snapshot: IndexMap<String, StepRecord> = IndexMap::new();
        for (name, step) in &config.test_readings_sequence {
            let record = executor.read_channel(link, name, step).await;
            snapshot.insert(name.clone(), record);
        }
        probes.insert(index, snapshot);
        sleep(timing.probe_offset).await;
    }
    progress.detail("Measurement read complete");

    probes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TestTiming;
    use crate::error::{BreakerError, BreakerResult};
    use crate::link::Endpoint;
    use async_trait::async_trait;
    use std::collections::VecDeque;

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
"#;

    struct ScriptedLink {
        endpoint: Endpoint,
        reads: VecDeque<Vec<u16>>,
        identification: BreakerResult<Vec<String>>,
        stall_identification: bool,
        ops: Vec<String>,
    }

    impl ScriptedLink {
        fn new() -> Self {
            Self {
                endpoint: Endpoint::new("127.0.0.1", 502, 255),
                reads: VecDeque::new(),
                identification: Ok(vec!["Scripted".to_string()]),
                stall_identification: false,
                ops: Vec::new(),
            }
        }

        fn queue_reads<I: IntoIterator<Item = Vec<u16>>>(&mut self, values: I) {
            self.reads.extend(values);
        }
    }

    #[async_trait]
    impl DeviceLink for ScriptedLink {
        async fn write_single_register(&mut self, address: u16, _value: u16) -> BreakerResult<()> {
            self.ops.push(format!("write {}", address));
            Ok(())
        }

        async fn read_holding_registers(
            &mut self,
            address: u16,
            count: u16,
        ) -> BreakerResult<Vec<u16>> {
            self.ops.push(format!("read {}", address));
            self.reads
                .pop_front()
                .ok_or_else(|| BreakerError::read(address, count, "no scripted response"))
        }

        async fn read_device_identification(&mut self) -> BreakerResult<Vec<String>> {
            self.ops.push("identify".to_string());
            if self.stall_identification {
                std::future::pending::<()>().await;
            }
            self.identification.clone()
        }

        fn endpoint(&self) -> &Endpoint {
            &self.endpoint
        }

        async fn close(&mut self) -> BreakerResult<()> {
            Ok(())
        }
    }

    fn fixture() -> (TestConfig, StepExecutor) {
        let config = TestConfig::from_yaml(SCRIPT).unwrap();
        (config, StepExecutor::new(TestTiming::immediate()))
    }

    #[tokio::test]
    async fn test_control_phase_authenticates_before_every_command() {
        let (config, executor) = fixture();
        let mut link = ScriptedLink::new();
        link.queue_reads([vec![8], vec![13], vec![8]]);

        let status_step = config.status_step().unwrap().clone();
        let records = run_remote_control_test(
            &mut link,
            &executor,
            &config,
            &status_step,
            &ProgressReporter::disabled(),
        )
        .await;

        let expected_ops = vec![
            "write 660",
            "write 20000",
            "write 20001",
            "write 661",
            "read 3215",
            "write 20000",
            "write 20001",
            "write 662",
            "read 3215",
            "write 20000",
            "write 20001",
            "write 663",
            "read 3215",
        ];
        assert_eq!(link.ops, expected_ops);

        let keys: Vec<&str> = records.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "set_remote",
                "passwd_part_1",
                "passwd_part_2",
                "t_off_c_break",
                "t_on_c_break",
                "t_reset_c_break",
            ]
        );
        assert!(records.values().all(StepRecord::passed));
    }

    #[tokio::test]
    async fn test_control_phase_continues_past_failed_command() {
        let (config, executor) = fixture();
        let mut link = ScriptedLink::new();
        // OFF observes 13 where 8 is expected, the rest match
        link.queue_reads([vec![13], vec![13], vec![8]]);

        let status_step = config.status_step().unwrap().clone();
        let records = run_remote_control_test(
            &mut link,
            &executor,
            &config,
            &status_step,
            &ProgressReporter::disabled(),
        )
        .await;

        assert_eq!(records["t_off_c_break"].status, 0);
        assert_eq!(records["t_off_c_break"].reading, Some(Reading::Register(13)));
        assert_eq!(records["t_on_c_break"].status, 1);
        assert_eq!(records["t_reset_c_break"].status, 1);
    }

    #[tokio::test]
    async fn test_information_phase_degrades_on_silent_identification() {
        let (config, _) = fixture();
        let mut timing = TestTiming::immediate();
        timing.request_timeout = std::time::Duration::from_millis(20);
        let executor = StepExecutor::new(timing);

        let mut link = ScriptedLink::new();
        link.stall_identification = true;
        link.queue_reads([vec![8], vec![27]]);

        let records = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            run_device_information_test(
                &mut link,
                &executor,
                &config,
                &ProgressReporter::disabled(),
            ),
        )
        .await
        .expect("a silent identification must end at the request timeout");

        let id = &records["device_id"];
        assert_eq!(id.status, 0);
        assert_eq!(id.reading, Some(Reading::Identification(Vec::new())));
        assert_eq!(records["get_dev_status"].status, 1);
    }

    #[tokio::test]
    async fn test_information_phase_degrades_on_identification_failure() {
        let (config, executor) = fixture();
        let mut link = ScriptedLink::new();
        link.identification = Err(BreakerError::decode("unexpected MEI type 0x0D"));
        link.queue_reads([vec![8], vec![27]]);

        let records = run_device_information_test(
            &mut link,
            &executor,
            &config,
            &ProgressReporter::disabled(),
        )
        .await;

        let id = &records["device_id"];
        assert_eq!(id.status, 0);
        assert_eq!(id.reading, Some(Reading::Identification(Vec::new())));
        // Register reads still ran after the degraded identification
        assert_eq!(records["get_dev_status"].status, 1);
        assert_eq!(records["get_dev_motor_status"].status, 1);
    }

    #[tokio::test]
    async fn test_measurement_phase_snapshots_every_probe() {
        let (config, executor) = {
            let (config, _) = fixture();
            let mut timing = TestTiming::immediate();
            timing.probe_count = 2;
            (config, StepExecutor::new(timing))
        };
        let mut link = ScriptedLink::new();
        link.queue_reads([vec![1, 2, 3], vec![50], vec![4, 5, 32769], vec![50]]);

        let probes = run_measurement_test(
            &mut link,
            &executor,
            &config,
            &ProgressReporter::disabled(),
        )
        .await;

        assert_eq!(probes.len(), 2);
        assert_eq!(
            probes[&0]["voltage"].reading,
            Some(Reading::Values(vec![1, 2, 3]))
        );
        assert_eq!(
            probes[&1]["voltage"].reading,
            Some(Reading::Values(vec![4, 5, -32767]))
        );
        assert_eq!(probes[&1]["frequency"].reading, Some(Reading::Values(vec![50])));
        // Snapshots are independent records
        assert_ne!(probes[&0]["voltage"], probes[&1]["voltage"]);
    }
}
