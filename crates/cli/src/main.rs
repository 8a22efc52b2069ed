use api_shared::requests::{OrderReq, PasienReq};
use bridge_core::fetcher::RecordFetcher;
use bridge_core::payload::PayloadBuilder;
use bridge_core::repositories::mysql::{connect, MySqlHisStore};
use bridge_core::status_control::StatusControl;
use bridge_core::validation::{validate_order, validate_patient, validate_window, ValidationErrors};
use bridge_core::{BridgeConfig, BridgeError};
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "lis-bridge")]
#[command(about = "HIS to LIS bridge operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the status and control codes
    Codes,
    /// Check a result query window
    CheckPeriod {
        /// Start date (YYYY-MM-DD)
        start_date: String,
        /// End date (YYYY-MM-DD)
        end_date: String,
        /// Maximum window in days (defaults to BRIDGE_MAX_PERIOD_DAYS or 30)
        #[arg(long)]
        max_days: Option<i64>,
    },
    /// Build the order payload for transaction codes without sending it
    PreviewOrder {
        /// Order control name, e.g. PASIEN_BARU_MASUK
        order_control: String,
        /// Patient type name, e.g. STATUS_PASIEN_RAWAT_INAP
        status_pasien: String,
        /// Transaction codes
        #[arg(required = true)]
        kode_transaksi: Vec<String>,
        /// Medico-legal name (optional)
        #[arg(long)]
        med_legal: Option<String>,
    },
    /// Build the patient payload for a medical record number without sending it
    PreviewPasien {
        /// Order control name, e.g. PASIEN_BARU_MASUK
        order_control: String,
        /// Medical record number
        no_rm: String,
    },
}

fn print_errors(errors: &ValidationErrors) {
    eprintln!("Validation failed: {errors}");
    for field in errors.fields() {
        for message in errors.messages(field) {
            eprintln!("  {field}: {message}");
        }
    }
}

/// Report validation failures and turn them into an error so the process exits non-zero.
fn checked<T>(result: Result<T, ValidationErrors>) -> Result<T, BridgeError> {
    result.map_err(|errors| {
        print_errors(&errors);
        BridgeError::Validation(errors)
    })
}

async fn fetcher() -> Result<RecordFetcher, Box<dyn std::error::Error>> {
    let url = std::env::var("HIS_DATABASE_URL").map_err(|_| "HIS_DATABASE_URL is not set")?;
    let pool = connect(&url, 1).await?;
    Ok(RecordFetcher::new(Arc::new(MySqlHisStore::new(pool))))
}

fn config() -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    Ok(BridgeConfig::from_lookup(|k| std::env::var(k).ok())?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Codes) => {
            for status in StatusControl::ALL {
                println!("{:<26} {:<3} {:?}", status.name(), status.code(), status.kind());
            }
        }
        Some(Commands::CheckPeriod {
            start_date,
            end_date,
            max_days,
        }) => {
            let max_days = match max_days {
                Some(days) => days,
                None => config()?.limits().max_period_days,
            };
            let (start, end) = checked(validate_window(
                Some(start_date.as_str()),
                Some(end_date.as_str()),
                max_days,
            ))?;
            println!(
                "Window {start} to {end} is valid ({} days, maximum {max_days})",
                (end - start).num_days()
            );
        }
        Some(Commands::PreviewOrder {
            order_control,
            status_pasien,
            kode_transaksi,
            med_legal,
        }) => {
            let req = OrderReq {
                order_control: Some(order_control),
                status_pasien: Some(status_pasien),
                kode_transaksi: Some(serde_json::json!(kode_transaksi)),
                med_legal,
            };
            let command = checked(validate_order(&req))?;

            let builder = PayloadBuilder::new(&config()?);
            let records = fetcher().await?.fetch_orders(&command.kode_transaksi).await?;
            if records.is_empty() {
                println!("No active registrations found.");
            } else {
                let batch = builder.build_orders(&records, &command.params);
                println!("{}", serde_json::to_string_pretty(&batch)?);
            }
        }
        Some(Commands::PreviewPasien {
            order_control,
            no_rm,
        }) => {
            let req = PasienReq {
                order_control: Some(order_control),
                no_rm: Some(serde_json::Value::String(no_rm)),
            };
            let command = checked(validate_patient(&req))?;

            let builder = PayloadBuilder::new(&config()?);
            let patients = fetcher().await?.fetch_patients(&command.no_rm).await?;
            if patients.is_empty() {
                println!("No patient found.");
            } else {
                let batch = builder.build_patients(&patients, &command.params);
                println!("{}", serde_json::to_string_pretty(&batch)?);
            }
        }
        None => {}
    }

    Ok(())
}
