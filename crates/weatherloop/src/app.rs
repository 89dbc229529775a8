//! Process startup and lifecycle.

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::broker::{AmqpBroker, Broker};
use crate::cities::CityCatalog;
use crate::config::Settings;
use crate::connector::{connect_broker, connect_search_store};
use crate::publisher::{QueuePublisher, WEATHER_QUEUE};
use crate::scheduler::run_weather_job;
use crate::search::{Elasticsearch, SearchStore};
use crate::weather::{OpenWeatherClient, WeatherSource};

/// Connect to the broker and the search store, then spawn the sampling job.
///
/// Returns `None` without touching either dependency when
/// `settings.enable_dependencies` is off. Running out of connect attempts
/// is an error and nothing is spawned. The publisher takes over the
/// session opened here.
pub async fn start_dependencies<B: Broker, S: SearchStore, W: WeatherSource>(
    broker: B,
    search: &S,
    weather: Arc<W>,
    settings: &Settings,
    shutdown: watch::Receiver<()>,
) -> anyhow::Result<Option<JoinHandle<()>>> {
    if !settings.enable_dependencies {
        log::info!("Dependencies initialization skipped!");
        return Ok(None);
    }

    log::info!("Connecting to RabbitMQ at {}...", broker.endpoint());
    let session = connect_broker(&broker, &settings.broker_retry).await?;

    log::info!("Connecting to Elasticsearch at {}...", search.endpoint());
    connect_search_store(search, &settings.search_retry).await?;

    log::info!("Dependencies initialized!");

    let publisher = QueuePublisher::with_session(broker, WEATHER_QUEUE, session).await?;
    Ok(Some(tokio::spawn(run_weather_job(
        weather,
        publisher,
        settings.schedule.city.clone(),
        settings.schedule.interval,
        shutdown,
    ))))
}

/// Run the service until Ctrl+C.
///
/// With dependencies enabled, RabbitMQ and Elasticsearch must both become
/// reachable before the HTTP server starts; otherwise startup fails.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    log::info!("Starting weatherloop...");

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    let weather = Arc::new(OpenWeatherClient::new(settings.openweather_api_key.clone()));
    if settings.openweather_api_key.is_none() {
        log::warn!("OPENWEATHER_API_KEY not set, weather lookups will fail");
    }

    let job_task = start_dependencies(
        AmqpBroker::new(&settings.broker),
        &Elasticsearch::new(settings.elasticsearch_url.clone()),
        weather.clone(),
        &settings,
        shutdown_rx.clone(),
    )
    .await?;

    // SIGINT keeps its default action until the connect loops are done, so
    // they stay interruptible.
    ctrlc::set_handler({
        let shutdown_tx = shutdown_tx.clone();
        move || {
            log::info!("Received Ctrl+C, shutting down gracefully...");
            shutdown_tx.send(()).ok();
        }
    })?;

    let cities = Arc::new(CityCatalog::new(settings.data_dir.clone()));
    let app = crate::http::router(weather, cities, &settings.static_dir);

    let listener = tokio::net::TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind))?;
    log::info!("weatherloop listening on http://{}", settings.bind);

    let mut server_shutdown = shutdown_rx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.changed().await;
        })
        .await?;

    // Let the job close its broker connection
    if let Some(task) = job_task {
        if let Err(e) = task.await {
            log::error!("Scheduler task failed: {}", e);
        }
    }

    log::info!("weatherloop stopped.");
    Ok(())
}
