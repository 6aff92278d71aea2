use std::time::Duration;

pub trait Configuration: Clone + Send + Sync + 'static {
    fn port(&self) -> u16;
    fn database_url(&self) -> Option<String>;
    fn admin_password(&self) -> String;
    fn default_timezone(&self) -> String;
    fn cache_ttl(&self) -> Duration;
    fn availability_retention_days(&self) -> u64;
    fn cleanup_interval(&self) -> Duration;
    fn event_capacity(&self) -> usize;
}
