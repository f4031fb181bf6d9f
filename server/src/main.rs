use clap::Parser;
use log::error;
use server::config::GameConfig;
use server::network::Server;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long)]
    port: Option<u16>,
    /// Simulation tick rate (updates per second)
    #[clap(short, long)]
    update_rate: Option<u32>,
    /// State broadcast rate (snapshots per second)
    #[clap(short, long)]
    broadcast_rate: Option<u32>,
    /// Seconds of silence before a client is dropped
    #[clap(short, long)]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    let args = Args::parse();

    let mut config = GameConfig::standard();
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(rate) = args.update_rate {
        config.server.update_rate = rate;
    }
    if let Some(rate) = args.broadcast_rate {
        config.server.broadcast_rate = rate;
    }
    if let Some(timeout) = args.timeout {
        config.server.connection_timeout = timeout;
    }

    let address = format!("{}:{}", args.host, config.server.port);
    let mut server = Server::new(&address, config).await?;

    if let Err(e) = server.run().await {
        error!("Server terminated with error: {}", e);
        return Err(e);
    }

    Ok(())
}
