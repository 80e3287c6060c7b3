//! CLI for linecast
//!
//! Subcommands:
//! - `server`: run the broker
//! - `publish`: publish a single JSON payload to a topic
//! - `subscribe`: print every message delivered on the given topics

use clap::{Parser, Subcommand};
use linecast::broker::Broker;
use linecast::client::Client;
use linecast::config::load_config;
use linecast::transport::Server;
use linecast::utils::{Result, logging};
use serde_json::Value;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "linecast", about = "Minimal topic-based pub/sub broker")]
struct Cli {
    /// Broker host (overrides configuration)
    #[arg(long, global = true, env = "LINECAST_HOST")]
    host: Option<String>,
    /// Broker port (overrides configuration)
    #[arg(long, global = true, env = "LINECAST_PORT")]
    port: Option<u16>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the broker
    Server,
    /// Publish one message
    Publish {
        topic: String,
        /// JSON payload; anything that is not valid JSON is sent as a string
        payload: String,
    },
    /// Subscribe to topics and print deliveries until the broker closes
    Subscribe {
        #[arg(required = true)]
        topics: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&settings.logging.level);

    if let Some(host) = cli.host {
        settings.server.host = host;
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    let result = match cli.command {
        Command::Server => run_server(&settings).await,
        Command::Publish { topic, payload } => {
            run_publish(&settings.server.host, settings.server.port, &topic, &payload).await
        }
        Command::Subscribe { topics } => {
            run_subscribe(&settings.server.host, settings.server.port, &topics).await
        }
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run_server(settings: &linecast::config::Settings) -> Result<()> {
    let broker = Broker::new();
    let server = Server::bind(settings, broker).await?;
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    info!("broker stopped");
    Ok(())
}

async fn run_publish(host: &str, port: u16, topic: &str, payload: &str) -> Result<()> {
    let payload = serde_json::from_str(payload).unwrap_or_else(|_| Value::String(payload.to_string()));
    let mut client = Client::connect(host, port).await?;
    client.publish(topic, payload).await?;
    client.close().await
}

async fn run_subscribe(host: &str, port: u16, topics: &[String]) -> Result<()> {
    let mut client = Client::connect(host, port).await?;
    for topic in topics {
        client.subscribe(topic).await?;
    }
    client
        .listen(|msg| {
            let payload = msg.payload();
            if msg.headers().is_empty() {
                println!("[{}] {payload}", msg.topic());
            } else {
                println!("[{}] {payload} {:?}", msg.topic(), msg.headers());
            }
        })
        .await
}
