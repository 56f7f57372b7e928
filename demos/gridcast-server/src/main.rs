use clap::Parser;
use gridcast::prelude::*;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(author, version, about = "Gridcast session server", long_about = None)]
struct Args {
    /// Interface to bind
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Grid width in cells
    #[arg(long, default_value_t = 40)]
    width: i32,

    /// Grid height in cells (no short flag to avoid clashing with --help)
    #[arg(long, default_value_t = 20)]
    height: i32,

    /// Listen backlog
    #[arg(long, default_value_t = 1024)]
    backlog: u32,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            backlog: self.backlog,
            grid: GridConfig::new(self.width, self.height),
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let config = Args::parse().into_config();
    tracing::info!(host = %config.host, port = config.port, "starting gridcast server");

    let server = GridcastServer::builder().config(config).build().await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "could not listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}
