//! Periodic weather sampling.
//!
//! One background task fetches the configured city on a fixed interval and
//! hands the record to the queue publisher. The task owns the publisher, so
//! publishes are naturally serialized.

use std::time::Duration;
use tokio::sync::watch;

use crate::broker::Broker;
use crate::publisher::{PublishError, QueuePublisher};
use crate::weather::{FetchError, WeatherSource};

/// Errors from one fetch-then-publish run.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
}

/// Fetch the weather for `city` and publish it.
///
/// Errors are returned for the caller to log; a failed publish has already
/// triggered a reconnect inside the publisher.
pub async fn send_weather_to_queue<W: WeatherSource, B: Broker>(
    source: &W,
    publisher: &mut QueuePublisher<B>,
    city: &str,
) -> Result<(), JobError> {
    let record = source.fetch_weather(city).await?;
    publisher.publish(&record).await?;
    log::info!(
        "[Scheduler] weather sent to queue for {}: {:.1}°C, {}, humidity {}%",
        record.city,
        record.temperature,
        record.description,
        record.humidity
    );
    Ok(())
}

/// Run the sampling loop until the shutdown signal fires.
///
/// The first tick is consumed, so the first sample happens one `interval`
/// after start. The publisher is closed on exit.
pub async fn run_weather_job<W: WeatherSource, B: Broker>(
    source: std::sync::Arc<W>,
    mut publisher: QueuePublisher<B>,
    city: String,
    interval: Duration,
    mut shutdown: watch::Receiver<()>,
) {
    log::info!(
        "[Scheduler] sampling '{}' every {}s",
        city,
        interval.as_secs()
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick fires immediately; consume it so sampling starts one interval in.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = send_weather_to_queue(&*source, &mut publisher, &city).await {
                    log::error!("[Scheduler] error sending weather for {}: {}", city, e);
                }
            }
            _ = shutdown.changed() => {
                log::info!("[Scheduler] shutdown signal received, exiting");
                break;
            }
        }
    }

    publisher.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::mock::MockBroker;
    use crate::publisher::WEATHER_QUEUE;
    use crate::weather::mock::MockWeather;
    use crate::weather::WeatherRecord;
    use std::sync::Arc;

    fn london() -> WeatherRecord {
        WeatherRecord {
            city: "London".to_string(),
            temperature: 15.2,
            description: "clear sky".to_string(),
            humidity: 60,
            icon: "01d".to_string(),
        }
    }

    #[tokio::test]
    async fn send_publishes_fetched_record() {
        let broker = MockBroker::new();
        let mut publisher = QueuePublisher::new(broker.clone(), WEATHER_QUEUE);
        let source = MockWeather::with_record(london());

        send_weather_to_queue(&source, &mut publisher, "London")
            .await
            .unwrap();

        let published = broker.published();
        assert_eq!(published.len(), 1);
        let decoded: WeatherRecord = serde_json::from_slice(&published[0].body).unwrap();
        assert_eq!(decoded, london());
    }

    #[tokio::test]
    async fn fetch_failure_publishes_nothing() {
        let broker = MockBroker::new();
        let mut publisher = QueuePublisher::new(broker.clone(), WEATHER_QUEUE);
        let source = MockWeather::with_record(london());
        source.fail_fetches(1);

        let err = send_weather_to_queue(&source, &mut publisher, "London")
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Fetch(_)));
        assert_eq!(broker.opens(), 0);
    }

    #[tokio::test]
    async fn publish_failure_is_reported_and_recovers() {
        let broker = MockBroker::new();
        let mut publisher = QueuePublisher::new(broker.clone(), WEATHER_QUEUE);
        let source = MockWeather::with_record(london());
        broker.fail_publishes(1);

        let err = send_weather_to_queue(&source, &mut publisher, "London")
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Publish(_)));

        send_weather_to_queue(&source, &mut publisher, "London")
            .await
            .unwrap();
        assert_eq!(broker.published().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn job_samples_on_interval_and_survives_errors() {
        let broker = MockBroker::new();
        let publisher = QueuePublisher::new(broker.clone(), WEATHER_QUEUE);
        let source = Arc::new(MockWeather::with_record(london()));
        source.fail_fetches(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(());

        let job = tokio::spawn(run_weather_job(
            source.clone(),
            publisher,
            "London".to_string(),
            Duration::from_secs(120),
            shutdown_rx,
        ));

        // Nothing before the first full interval.
        tokio::time::sleep(Duration::from_secs(119)).await;
        assert!(source.requests.lock().unwrap().is_empty());

        // First tick fails to fetch, the next two publish.
        tokio::time::sleep(Duration::from_secs(2 * 120 + 2)).await;
        assert_eq!(source.requests.lock().unwrap().len(), 3);
        assert_eq!(broker.published().len(), 2);

        shutdown_tx.send(()).unwrap();
        job.await.unwrap();
        assert_eq!(broker.live_sessions(), 0);
    }
}
