use anyhow::Result;
use clap::Parser;
use controller::{client, keystore};
use relay_protocol::apdu::ApduCommand;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Minimal interactive Controller: authenticates, binds a session to a
/// Cardhost, then reads hex-encoded APDUs from stdin (one per line) and
/// prints the hex response.
#[derive(Parser)]
#[command(name = "controller", about = "Issue APDUs to a remote Cardhost through a Router")]
struct Cli {
    /// Router base URL.
    #[arg(long, env = "ROUTER_URL")]
    router: String,

    /// PeerId of the Cardhost to bind to.
    #[arg(long)]
    cardhost: String,

    #[arg(long, default_value_t = false)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("controller=info".parse()?);
    if cli.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let (signing_key, public_key) = keystore::load_or_create(&keystore::default_dir())?;
    let http = reqwest::Client::new();

    let controller_id = client::authenticate(&http, &cli.router, &signing_key, &public_key).await?;
    tracing::info!(controller_id = %controller_id, "authenticated");

    let token = client::create_session(&http, &cli.router, &controller_id, &cli.cardhost).await?;
    let relay = client::open_relay(&cli.router, &controller_id, &token).await?;
    tracing::info!(cardhost = %cli.cardhost, "relay session open, reading hex APDUs from stdin");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let command = match ApduCommand::from_hex(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                println!("bad apdu: {e}");
                continue;
            }
        };
        match relay.send_apdu(&command).await {
            Ok(response) => println!("{} {}", response.data_hex, response.sw),
            Err(e) => println!("error: {e}"),
        }
    }

    Ok(())
}
