/// Voltage Breaker Test CLI
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
/// Automated acceptance test runner for breaker controllers over Modbus TCP

use std::process::ExitCode;

use clap::Parser;
use log::error;

use voltage_breaker_test::{
    report, BreakerError, BreakerResult, Endpoint, Orchestrator, OutputFormat, TestConfig,
    TestMode, DEFAULT_DEVICE_PORT, DEFAULT_UNIT_ID,
};

/// Automated acceptance test for breaker controllers over Modbus TCP
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Args {
    /// Test mode: full runs everything on one device, split moves the
    /// read phases to a second one
    #[clap(long, default_value = "full")]
    test_mode: String,

    /// Address of the device under test
    #[clap(long)]
    device_address: String,

    /// Modbus TCP port of the device under test
    #[clap(long, default_value_t = DEFAULT_DEVICE_PORT)]
    device_port: u16,

    /// Unit identifier of the device under test
    #[clap(long, default_value_t = DEFAULT_UNIT_ID)]
    device_uid: u8,

    /// Address of the split device running the read phases
    #[clap(long)]
    device_address_split: Option<String>,

    /// Modbus TCP port of the split device
    #[clap(long, default_value_t = DEFAULT_DEVICE_PORT)]
    device_port_split: u16,

    /// Unit identifier of the split device
    #[clap(long, default_value_t = DEFAULT_UNIT_ID)]
    device_uid_split: u8,

    /// Path of the YAML test script
    #[clap(long, default_value = "config/config.yaml")]
    config: String,

    /// Result sink: dump to stdout or json file
    #[clap(long, default_value = "dump")]
    output: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    println!("🧪 {}", voltage_breaker_test::info());

    match run(args).await {
        Ok(()) => {
            println!("✅ Test run completed!");
            ExitCode::SUCCESS
        }
        Err(BreakerError::Interrupted) => {
            println!("Exiting on Interupt!");
            ExitCode::from(130)
        }
        Err(e) => {
            error!("Test run failed: {}", e);
            eprintln!("❌ {}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> BreakerResult<()> {
    let mode: TestMode = args.test_mode.parse()?;
    let output: OutputFormat = args.output.parse()?;
    let config = TestConfig::from_file(&args.config)?;

    let primary = Endpoint::new(args.device_address.clone(), args.device_port, args.device_uid);
    let secondary = args
        .device_address_split
        .as_ref()
        .map(|host| Endpoint::new(host.clone(), args.device_port_split, args.device_uid_split));

    let orchestrator = Orchestrator::new(config);
    let record = tokio::select! {
        result = orchestrator.run(mode, &primary, secondary.as_ref()) => result?,
        _ = tokio::signal::ctrl_c() => {
            return Err(BreakerError::Interrupted);
        }
    };

    report::deliver(&record, output, orchestrator.config().report.as_ref())
}
