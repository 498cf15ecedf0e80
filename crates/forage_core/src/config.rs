//! Tunables for the distance search and the reminder scheduler.

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverConfig {
    /// Radius of the first pass in kilometres.
    pub initial_radius_km: f64,
    /// The search gives up once the radius grows past this.
    pub max_radius_km: f64,
    /// Observations requested per pass.
    pub page_size: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            initial_radius_km: 2.0,
            max_radius_km: 32.0,
            page_size: 200,
        }
    }
}

impl ResolverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_radius_km.is_finite() && self.initial_radius_km > 0.0) {
            return Err(ConfigError::Invalid(
                "initial_radius_km must be a positive number".into(),
            ));
        }
        if !self.max_radius_km.is_finite() || self.max_radius_km < self.initial_radius_km {
            return Err(ConfigError::Invalid(
                "max_radius_km must be >= initial_radius_km".into(),
            ));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid(
                "page_size must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Local wall-clock time notifications fire at.
    pub hour: u32,
    pub minute: u32,
    /// When set, every notification fires this many seconds after scheduling
    /// instead of on its calendar day. Used for manual testing on a device.
    pub debug_delay_seconds: Option<u64>,
    /// Screen the app opens when a notification is tapped.
    pub screen: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            hour: 9,
            minute: 0,
            debug_delay_seconds: None,
            screen: "Reminders".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hour > 23 || self.minute > 59 {
            return Err(ConfigError::Invalid(format!(
                "notification time {:02}:{:02} is not a valid time of day",
                self.hour, self.minute
            )));
        }
        if self.debug_delay_seconds == Some(0) {
            return Err(ConfigError::Invalid(
                "debug_delay_seconds must be greater than 0".into(),
            ));
        }
        if self.screen.trim().is_empty() {
            return Err(ConfigError::Invalid("screen must not be empty".into()));
        }
        Ok(())
    }
}
