use cam_sim::device::{bitrate_names, SimConfig, SimDevice};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cam-sim", about = "Simulated capture device for camctl")]
struct Args {
    /// Address to bind; use the LAN IP to reach it from other machines.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// URL reported as the preview stream.
    #[arg(long, default_value = "http://127.0.0.1:8081/?action=stream")]
    preview_url: String,

    /// Initial recording bitrate (short name).
    #[arg(long, default_value = "2.5", value_parser = clap::builder::PossibleValuesParser::new(bitrate_names()))]
    bitrate: String,

    /// Simulated free disk space.
    #[arg(long, default_value_t = 32u64 * 1024 * 1024 * 1024)]
    free_space_bytes: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,cam_sim=debug")),
        )
        .init();

    let args = Args::parse();
    let device = SimDevice::new(SimConfig {
        preview_url: args.preview_url,
        bitrate: args.bitrate,
        free_space_bytes: args.free_space_bytes,
    })?;

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("simulated device ready at http://{}", addr);

    cam_sim::serve(listener, device).await?;
    Ok(())
}
