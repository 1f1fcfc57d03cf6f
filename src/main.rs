use clap::Parser;
use monlosim::api::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { port } => {
            if let Err(e) = monlosim::api::run_http_server(port).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Command::Project(args) => match monlosim::api::run_project_command(args) {
            Ok(report) => println!("{report}"),
            Err(e) => {
                eprintln!("Projection error: {e}");
                std::process::exit(1);
            }
        },
    }
}
