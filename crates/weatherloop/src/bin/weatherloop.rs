//! Weatherloop service
//!
//! Usage:
//!   weatherloop                        # Serve on WEATHERLOOP_BIND (default 0.0.0.0:8000)
//!   weatherloop -b 127.0.0.1:8080      # Serve on a specific address
//!   weatherloop -c weatherloop.yaml    # Apply schedule/retry overrides from YAML
//!
//! RabbitMQ, Elasticsearch and OpenWeatherMap settings are read from the
//! environment (RABBITMQ_HOST, ELASTICSEARCH_URL, OPENWEATHER_API_KEY, ...).

use argh::FromArgs;
use std::path::PathBuf;

use weatherloop::config::Settings;

/// Weatherloop - weather lookups and periodic queue publishing
#[derive(FromArgs)]
struct Args {
    /// show version information
    #[argh(switch, short = 'V')]
    version: bool,

    /// path to a YAML file with schedule and retry overrides
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// address to listen on (overrides WEATHERLOOP_BIND)
    #[argh(option, short = 'b')]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let args: Args = argh::from_env();

    // Handle --version flag
    if args.version {
        println!("weatherloop {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if let Some(path) = &args.config {
        log::info!("Loading config from: {}", path.display());
    }
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        settings.bind = bind;
    }

    weatherloop::app::run(settings).await
}
