//! tether - print events from a realtime pub/sub topic.

use std::path::PathBuf;

use clap::Parser;
use tether::{Client, ClientConfig, Endpoint, Event};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Subscribe to a realtime topic and print its events")]
#[command(version)]
struct Cli {
    /// Full WebSocket URL of the server
    #[arg(long, env = "TETHER_URL", conflicts_with = "key", required_unless_present = "key")]
    url: Option<String>,

    /// Application key on the default hosted cluster
    #[arg(long, env = "TETHER_APP_KEY")]
    key: Option<String>,

    /// Topic to subscribe to
    #[arg(long, env = "TETHER_CHANNEL")]
    channel: String,

    /// Only print events with this name
    #[arg(long, env = "TETHER_EVENT")]
    event: Option<String>,

    /// Path to a JSON config file
    #[arg(short, long, env = "TETHER_CONFIG")]
    config: Option<PathBuf>,
}

fn print_event(event: &Event) {
    println!("[{}] {}: {}", event.topic(), event.name(), event.payload());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("tether=info".parse()?))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };
    let endpoint = match (&cli.url, &cli.key) {
        (Some(url), _) => Endpoint::parse(url, &config)?,
        (None, Some(key)) => Endpoint::from_app_key(key, &config)?,
        (None, None) => anyhow::bail!("either --url or --key is required"),
    };

    info!(endpoint = %endpoint, channel = %cli.channel, "starting");
    let client = Client::connect(&endpoint, config)?;
    let topic = client.subscribe(&cli.channel).await;
    match cli.event {
        Some(name) => topic.bind(name, print_event),
        None => topic.bind_all(print_event),
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("interrupted, closing");
            client.close();
            client.wait_stopped().await;
        }
        () = client.wait_stopped() => {
            info!("connection stopped by server");
        }
    }

    Ok(())
}
