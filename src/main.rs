use clap::Parser;

use auto_iflow::cli::{Cli, run};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = iflow_utils::logging::init_tracing(cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
    }
    let code = run(cli).await;
    std::process::exit(code);
}
