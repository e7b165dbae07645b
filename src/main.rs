use chrono::{DateTime, FixedOffset};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sigen_rs::api::response::ResponseCode;
use sigen_rs::{model, settings, Api, Error, HistoryQuery};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(version, about = "Query the Sigen Cloud monitoring API")]
struct Args {
    /// JSON file with a `sigen` section; `SIGEN_*` environment variables are used otherwise
    #[arg(long, env = "SIGEN_SECRETS", default_value = settings::DEFAULT_SECRETS_FILE)]
    secrets: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List systems of the account
    Systems,
    /// List devices of the first system
    Devices,
    /// Realtime system summary
    Summary,
    /// Realtime energy flow
    Flow,
    /// Power-related fields of the energy flow (default)
    Power,
    /// Realtime info of a device, the first inverter by default
    Device { serial: Option<String> },
    /// Historical data of the first system
    History {
        #[arg(long)]
        start: Option<DateTime<FixedOffset>>,
        #[arg(long)]
        end: Option<DateTime<FixedOffset>>,
        #[arg(long)]
        interval: Option<String>,
        /// Single day, `YYYY-MM-DD`
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        level: Option<String>,
        /// Print the application status of the response instead of its data
        #[arg(long)]
        status: bool,
    },
}

#[derive(Serialize)]
struct PowerReport {
    #[serde(flatten)]
    power: model::Telemetry,
    #[serde(rename = "calculatedSolarPower", skip_serializing_if = "Option::is_none")]
    calculated_solar_power: Option<f64>,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Error> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| Error::InternalError(format!("failed to render JSON: {}", e)))?;
    println!("{}", text);
    Ok(())
}

fn describe_status(code: Option<ResponseCode>) -> &'static str {
    match code {
        Some(ResponseCode::Success) => "ok",
        Some(ResponseCode::RateLimited) => "API credit limit reached, try again later",
        Some(ResponseCode::AccessRestricted) => {
            "access restricted (date may be before system installation)"
        }
        None => "error",
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let settings = settings::get_config(Some(&args.secrets))?;
    let mut api: Api = settings.into_api()?;
    api.initialize().await?;
    log::info!("{}", api);

    match args.command.unwrap_or(Command::Power) {
        Command::Systems => print_json(&api.list_systems().await?),
        Command::Devices => print_json(&api.list_devices(None).await?),
        Command::Summary => print_json(&api.get_system_summary(None).await?),
        Command::Flow => print_json(&api.get_energy_flow(None).await?),
        Command::Power => {
            let flow = api.get_energy_flow(None).await?;
            print_json(&PowerReport {
                power: model::power_flow(&flow),
                calculated_solar_power: model::calculated_solar_power(&flow),
            })
        }
        Command::Device { serial } => {
            print_json(&api.get_device_realtime_info(serial.as_deref(), None).await?)
        }
        Command::History {
            start,
            end,
            interval,
            date,
            level,
            status,
        } => {
            let query = HistoryQuery {
                start_time: start,
                end_time: end,
                interval,
                date,
                level,
            };
            if status {
                let envelope = api.history_envelope(None, &query).await?;
                println!(
                    "{} ({})",
                    describe_status(envelope.status()),
                    envelope.describe()
                );
                Ok(())
            } else {
                print_json(&api.get_system_history_query(None, &query).await?)
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
