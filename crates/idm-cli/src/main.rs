use idm_core::logging;

mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    if let Err(e) = logging::init() {
        eprintln!("idm: log file unavailable ({}), using stderr", e);
        logging::init_stderr();
    }

    if let Err(err) = CliCommand::run_from_args().await {
        eprintln!("idm error: {:#}", err);
        std::process::exit(1);
    }
}
