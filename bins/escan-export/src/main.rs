mod cmd;

use std::process::ExitCode;

use clap::Parser;
use cmd::config::{Effective, ExportArgs};
use cmd::error::ExportError;

#[derive(Parser)]
#[command(name = "escan-export", version, about = "Выгрузка первого результата подписки Eulerscan в JSON-файл")]
struct Cli {
    #[command(flatten)]
    args: ExportArgs,
}

async fn export(args: &ExportArgs) -> Result<(), ExportError> {
    let eff = Effective::new(args)?;
    tracing::debug!(?eff, "effective config");
    cmd::export::run(&eff).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let Cli { args } = Cli::parse();
    match export(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
