//! CLI for Postbox
//!
//! Subcommands:
//! - `server`: run the WebSocket broker
//! - `client`: run a short publish/pull/acknowledge session against a server

use clap::Parser;
use postbox::broker::Broker;
use postbox::client::PostboxClient;
use postbox::config::{Settings, load_config};
use postbox::transport::{ServerMessage, start_websocket_server};
use postbox::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "postbox", version, about)]
enum Command {
    /// Start the WebSocket server
    Server,
    /// Run the example session (create topic, subscribe, publish, pull, acknowledge)
    Client {
        /// WebSocket server URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        url: String,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cmd = Command::parse();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&config.logging.level);

    match cmd {
        Command::Server => {
            if let Err(e) = run_server(config).await {
                error!("Server failed: {}", e);
            }
        }
        Command::Client { url } => {
            if let Err(e) = run_client(&url).await {
                error!("Client failed: {}", e);
            }
        }
    }
}

async fn run_server(config: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let broker = Broker::open(&config.broker)?;
    info!(data_dir = %config.broker.data_dir, "store opened");

    tokio::select! {
        result = start_websocket_server(&addr, broker.clone()) => {
            result?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    broker.store().flush()?;
    Ok(())
}

async fn run_client(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = PostboxClient::connect(url).await?;

    let topic = match client.create_topic("demo").await? {
        ServerMessage::Topic { topic, .. } => topic,
        other => return Err(format!("unexpected reply: {other:?}").into()),
    };
    println!("Created topic {}", topic.id);

    let subscription = match client.subscribe(topic.id).await? {
        ServerMessage::Subscription { subscription, .. } => subscription,
        other => return Err(format!("unexpected reply: {other:?}").into()),
    };
    println!("Subscribed: {}", subscription.id);

    let published = client.publish(topic.id, "Hello from postbox", None).await?;
    println!("Publish response: {}", serde_json::to_string(&published)?);

    let ids: Vec<u64> = match client.pull(subscription.id).await? {
        ServerMessage::Messages { messages, .. } => {
            for message in &messages {
                println!("Pulled {}: {}", message.id, message.payload);
            }
            messages.iter().map(|m| m.id).collect()
        }
        other => return Err(format!("unexpected reply: {other:?}").into()),
    };

    let acked = client.acknowledge(subscription.id, ids).await?;
    println!("Acknowledge response: {}", serde_json::to_string(&acked)?);

    client.close().await?;
    Ok(())
}
