use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "walkguard-cli", version, about = "Walkguard CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk session management
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Alert submission and lifecycle
    Alert {
        #[command(subcommand)]
        action: commands::alert::AlertAction,
    },
    /// Dispatch recovery and audit
    Dispatch {
        #[command(subcommand)]
        action: commands::dispatch::DispatchAction,
    },
    /// Messaging gateway credentials and test sends
    Gateway {
        #[command(subcommand)]
        action: commands::gateway::GatewayAction,
    },
    /// Trusted contact inspection (dev seeding)
    Contact {
        #[command(subcommand)]
        action: commands::contact::ContactAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Session { action } => commands::session::run(action),
        Commands::Alert { action } => commands::alert::run(action).await,
        Commands::Dispatch { action } => commands::dispatch::run(action).await,
        Commands::Gateway { action } => commands::gateway::run(action).await,
        Commands::Contact { action } => commands::contact::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
