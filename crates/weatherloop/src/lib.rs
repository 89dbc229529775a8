//! Weatherloop: current-weather lookups over HTTP, with periodic samples
//! published to a durable RabbitMQ queue.
//!
//! Startup waits for RabbitMQ and Elasticsearch (see [`connector`]), then a
//! timer ([`scheduler`]) feeds [`weather`] records to the [`publisher`] while
//! the [`http`] front end serves lookups and the city list.

/// Startup configuration from defaults, YAML and environment.
pub mod config;

/// RabbitMQ seam and `lapin` implementation.
pub mod broker;

/// Elasticsearch seam and liveness probe.
pub mod search;

/// Retrying startup connections with fixed and exponential backoff.
pub mod connector;

/// Durable-queue publisher with lazy reconnect.
pub mod publisher;

/// OpenWeatherMap client.
pub mod weather;

/// Bulk city dataset.
pub mod cities;

/// HTML pages for the web front end.
pub mod pages;

/// axum routes for lookups, the city list and static files.
pub mod http;

/// Timed fetch-and-publish job.
pub mod scheduler;

/// Startup, dependency wiring and graceful shutdown.
pub mod app;
