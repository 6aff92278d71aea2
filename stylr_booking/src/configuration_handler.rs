use crate::configuration::Configuration;
use crate::types::DEFAULT_TIMEZONE;
use clap::Parser;
use std::time::Duration;
use tracing::info;

/// Every option can also be set through the environment or a `.env` file.
#[derive(Debug, Clone, Parser)]
#[command(name = "stylr_booking", about = "Salon booking and availability service")]
pub struct ConfigurationHandler {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// PostgreSQL connection string. Without it bookings are kept in memory.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "ADMIN_PASSWORD", default_value = "change-me")]
    admin_password: String,

    #[arg(long, env = "DEFAULT_TIMEZONE", default_value = DEFAULT_TIMEZONE)]
    default_timezone: String,

    #[arg(long, env = "CACHE_TTL_SECS", default_value_t = 60)]
    cache_ttl_secs: u64,

    #[arg(long, env = "AVAILABILITY_RETENTION_DAYS", default_value_t = 90)]
    availability_retention_days: u64,

    #[arg(long, env = "CLEANUP_INTERVAL_SECS", default_value_t = 86_400)]
    cleanup_interval_secs: u64,

    #[arg(long, env = "EVENT_CAPACITY", default_value_t = 256)]
    event_capacity: usize,
}

impl ConfigurationHandler {
    pub fn parse_arguments() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            info!(path = %path.display(), "Loaded environment file");
        }
        Self::parse()
    }
}

impl Configuration for ConfigurationHandler {
    fn port(&self) -> u16 {
        self.port
    }

    fn database_url(&self) -> Option<String> {
        self.database_url.clone()
    }

    fn admin_password(&self) -> String {
        self.admin_password.clone()
    }

    fn default_timezone(&self) -> String {
        self.default_timezone.clone()
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    fn availability_retention_days(&self) -> u64 {
        self.availability_retention_days
    }

    fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }

    fn event_capacity(&self) -> usize {
        self.event_capacity
    }
}
