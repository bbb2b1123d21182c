mod session;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use session::{Session, SessionConfig};
use toonks::{DEFAULT_APP_PREFIX, LinkConditions, LocalBroker, NetworkConfig, SyncConfig};

#[derive(Parser)]
#[command(name = "toonks-demo")]
#[command(about = "Headless toonks match: one host and a few clients over an in-memory broker")]
struct Args {
    #[arg(short, long, default_value_t = 3)]
    players: usize,

    #[arg(short, long, default_value_t = 5)]
    seconds: u64,

    #[arg(long, default_value_t = 0.0, help = "Data frame loss percentage (0-100)")]
    loss_percent: f32,

    #[arg(long, default_value = DEFAULT_APP_PREFIX)]
    prefix: String,

    #[arg(long, default_value_t = 100, help = "Tank broadcast period in ms")]
    update_ms: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let conditions = if args.loss_percent > 0.0 {
        LinkConditions::lossy(args.loss_percent)
    } else {
        LinkConditions::default()
    };
    let broker = LocalBroker::with_conditions(conditions);

    let network = NetworkConfig {
        app_prefix: args.prefix,
        max_peers: Some(args.players),
        ..NetworkConfig::default()
    };
    let sync = SyncConfig {
        update_interval: Duration::from_millis(args.update_ms),
        ..SyncConfig::default()
    };

    let config = SessionConfig {
        players: args.players,
        duration: Duration::from_secs(args.seconds),
        network,
        sync,
    };

    let mut session = Session::open(broker, config).await?;
    session.run().await?;
    session.report();

    Ok(())
}
