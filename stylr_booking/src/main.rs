use std::{sync::Arc, time::Duration};

use crate::{
    backend::BookingBackend, booking_manager::BookingManager, clock::SystemClock,
    configuration::Configuration, configuration_handler::ConfigurationHandler,
    database_interface::DatabaseInterface, events::EventRelay, http::create_app,
    local_backend::LocalBackend,
};
use axum::Router;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod availability;
mod backend;
mod booking_manager;
mod cache;
mod chat;
mod clock;
mod configuration;
mod configuration_handler;
mod database_interface;
mod error;
mod events;
mod extract;
mod http;
mod local_backend;
mod operating_hours;
mod requests;
mod schema;
#[cfg(test)]
mod testutils;
mod types;

/// Periodically drops availability overrides older than the retention window.
fn spawn_cleanup<T: BookingBackend>(manager: BookingManager<T>, configuration: &impl Configuration) {
    let retention_days = configuration.availability_retention_days();
    let mut ticker = interval(configuration.cleanup_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::spawn(async move {
        loop {
            ticker.tick().await;
            match manager.cleanup_outdated_availability(retention_days) {
                Ok(removed) => info!(removed, retention_days, "Availability cleanup finished"),
                Err(err) => error!(%err, "Availability cleanup failed"),
            }
        }
    });
}

fn build_app<T: BookingBackend>(
    backend: T,
    configuration: ConfigurationHandler,
) -> Result<Router, error::BookingError> {
    let manager = BookingManager::new(
        backend,
        Arc::new(SystemClock),
        EventRelay::new(configuration.event_capacity()),
        configuration.cache_ttl(),
    )
    .with_default_timezone(configuration.default_timezone())?;

    spawn_cleanup(manager.clone(), &configuration);
    Ok(create_app(manager, configuration))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("#################");
    println!("# Stylr Booking #");
    println!("#################");

    let configuration = ConfigurationHandler::parse_arguments();

    let address = format!("0.0.0.0:{}", configuration.port());
    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%err, "Failed to bind {address}");
            return;
        }
    };
    println!("Accessable at:\n{address}");

    let app = if let Some(database_url) = configuration.database_url() {
        let backend = loop {
            match DatabaseInterface::new(&database_url) {
                Ok(backend) => {
                    info!("Successfully connected to database");
                    break backend;
                }
                Err(err) => {
                    error!(?err, "Failed to establish database connection. Retry in 1 sec. You may want to restart it with database disabled (bookings kept in memory).");
                    sleep(Duration::from_secs(1)).await;
                }
            }
        };
        build_app(backend, configuration)
    } else {
        info!("No database configured, bookings are kept in memory");
        build_app(LocalBackend::default(), configuration)
    };

    let app = match app {
        Ok(app) => app,
        Err(err) => {
            error!(%err, "Invalid configuration");
            return;
        }
    };

    if let Err(err) = axum::serve(listener, app).await {
        error!(%err, "Server stopped");
    }
}
