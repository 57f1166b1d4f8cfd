use chrono::{DateTime, Utc};

/// Source of "now" for components that must be testable against a fixed clock.
pub type Clock = std::sync::Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    std::sync::Arc::new(Utc::now)
}
