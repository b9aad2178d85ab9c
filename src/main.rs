use clap::Parser;
use clap::Subcommand;
use repchat::api::serve_api;
use repchat::config::AppConfig;
use repchat::intent;
use repchat::logging;
use repchat::Result;

#[derive(Parser)]
#[command(name = "repchat")]
#[command(about = "Multi-source answer-synthesis chat service")]
#[command(version)]
struct Cli {
    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Host address to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
        /// Disable CORS even when the config enables it
        #[arg(long)]
        no_cors: bool,
    },
    /// Classify a query and print the detected intent
    Classify {
        /// The query to classify
        query: String,
        /// Company name to classify against
        #[arg(long)]
        company: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::load()?,
    };

    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    logging::init_logging_with_config(Some(&config))?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            no_cors,
        } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let enable_cors = config.server.enable_cors && !no_cors;
            serve_api(&config, host, port, enable_cors).await
        }
        Commands::Classify { query, company } => {
            let company = company.map(|name| repchat::models::CompanyContext {
                name,
                ..repchat::models::CompanyContext::default()
            });
            let intent = intent::classify(&query, company.as_ref(), None, None);
            println!("kind: {:?}", intent.kind);
            println!("company_specific: {}", intent.company_specific);
            println!("keywords: {}", intent.keywords.join(", "));
            let platforms: Vec<String> = intent
                .target_platforms
                .iter()
                .map(|p| format!("{p:?}"))
                .collect();
            println!("platforms: {}", platforms.join(", "));
            Ok(())
        }
    }
}
