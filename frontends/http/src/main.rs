use dbs_http::{run_server, ServerConfig};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();

    // Simple argument parsing: --config <path>, or a positional config path.
    let mut args = std::env::args().skip(1);
    let mut config_path: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            config_path = args.next().map(PathBuf::from);
        } else if !arg.starts_with('-') {
            config_path = Some(PathBuf::from(arg));
        }
    }

    if config_path.is_none() {
        if let Ok(env_path) = std::env::var("DBS_HTTP_CONFIG") {
            config_path = Some(PathBuf::from(env_path));
        }
    }

    let config = ServerConfig::load(config_path.as_deref())
        .map_err(|e| anyhow::anyhow!("failed to load server config: {}", e))?;

    run_server(config).await
}
