use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use forage_core::{
    config::{ResolverConfig, SchedulerConfig},
    model::{CandidateSet, Coordinate, DistanceMap, NearestDistance, TaxonId},
    notifications::{
        MemoryNotificationStore, NotificationId, NotificationRequest, NotificationStore,
        PendingNotification,
    },
    reminders::RescheduleSummary,
    storage::FileStore,
    DistanceResolver, ReminderScheduler, ReminderService, ReminderStore,
};
use forage_inat::{InatClient, InatConfig};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub(crate) data_dir: Option<PathBuf>,
    pub(crate) location: Option<Coordinate>,
    pub(crate) candidates: CandidateSet,
    pub(crate) inat: InatConfig,
    pub(crate) resolver: ResolverConfig,
    pub(crate) scheduler: SchedulerConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_lookup(|key| std::env::var(key).ok()))
    }

    /// Builds the config from `lookup`; unusable values are logged and skipped.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = lookup("FORAGE_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = Some(PathBuf::from(dir.trim()));
            }
        }
        if let Some(location) = lookup("FORAGE_LOCATION") {
            match Coordinate::parse(&location) {
                Ok(coordinate) => config.location = Some(coordinate),
                Err(err) => warn!(%err, "ignoring FORAGE_LOCATION"),
            }
        }
        if let Some(taxa) = lookup("FORAGE_TAXA") {
            config.candidates = parse_candidates(&taxa);
        }
        if let Some(url) = lookup("FORAGE_API_URL") {
            config.inat.base_url = url.trim().to_string();
        }
        if let Some(radius) = lookup("FORAGE_MAX_RADIUS_KM") {
            match radius.trim().parse::<f64>() {
                Ok(value) if value >= config.resolver.initial_radius_km => {
                    config.resolver.max_radius_km = value;
                }
                _ => warn!(value = %radius, "ignoring FORAGE_MAX_RADIUS_KM"),
            }
        }
        if let Some(delay) = lookup("FORAGE_DEBUG_NOTIFY_SECONDS") {
            match delay.trim().parse::<u64>() {
                Ok(value) if value > 0 => config.scheduler.debug_delay_seconds = Some(value),
                _ => warn!(value = %delay, "ignoring FORAGE_DEBUG_NOTIFY_SECONDS"),
            }
        }
        config
    }
}

/// Parses `id:name,id:name`. Entries without a name use the id.
fn parse_candidates(raw: &str) -> CandidateSet {
    let mut candidates = CandidateSet::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (id, name) = entry.split_once(':').unwrap_or((entry, ""));
        match id.parse::<TaxonId>() {
            Ok(id) => {
                let name = match name.trim() {
                    "" => id.to_string(),
                    name => name.to_string(),
                };
                candidates.insert(id, name);
            }
            Err(err) => warn!(%err, entry, "ignoring FORAGE_TAXA entry"),
        }
    }
    candidates
}

/// Notification store for hosts without an OS scheduler: keeps requests in
/// memory and logs when each would fire.
#[derive(Default)]
pub struct LoggingNotifications {
    inner: MemoryNotificationStore,
}

impl NotificationStore for LoggingNotifications {
    fn schedule(&self, request: NotificationRequest) -> NotificationId {
        let fires_at = request
            .trigger
            .next_fire_after(Local::now().naive_local());
        info!(
            title = %request.content.title,
            body = %request.content.body,
            fires_at = ?fires_at,
            "notification scheduled"
        );
        self.inner.schedule(request)
    }

    fn pending(&self) -> Vec<PendingNotification> {
        self.inner.pending()
    }

    fn cancel(&self, id: &NotificationId) {
        debug!(%id, "notification cancelled");
        self.inner.cancel(id)
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub distances: Option<DistanceMap>,
    pub notifications: Option<RescheduleSummary>,
}

pub fn run(config: AppConfig) -> Result<RunReport> {
    let client = InatClient::new(config.inat.clone()).context("failed to set up iNaturalist client")?;
    let mut report = RunReport::default();

    match config.location {
        Some(origin) if !config.candidates.is_empty() => {
            report.distances = Some(resolve(&client, &config, origin)?);
        }
        _ => debug!("no location or taxa configured, skipping distance search"),
    }

    if let Some(dir) = &config.data_dir {
        let notifications = LoggingNotifications::default();
        let scheduler = ReminderScheduler::with_config(&notifications, config.scheduler.clone())
            .context("invalid notification settings")?;
        let service = ReminderService::new(ReminderStore::new(FileStore::new(dir)), scheduler, &client);
        let summary = service
            .resync_all()
            .inspect_err(|err| warn!(alert = %err.user_message(), "reminder resync failed"))
            .context("failed to synchronise reminder notifications")?;
        info!(
            scheduled = summary.scheduled,
            data_dir = %dir.display(),
            "reminder notifications synchronised"
        );
        report.notifications = Some(summary);
    }

    Ok(report)
}

fn resolve(client: &InatClient, config: &AppConfig, origin: Coordinate) -> Result<DistanceMap> {
    let resolver =
        DistanceResolver::with_config(client, config.resolver).context("invalid search settings")?;
    let distances = resolver.resolve_distances(
        &config.candidates,
        origin,
        |taxon, distance| {
            let species = config
                .candidates
                .get(&taxon)
                .map(String::as_str)
                .unwrap_or_default();
            match distance {
                NearestDistance::Found(km) => {
                    info!(%taxon, species, km = %format!("{km:.1}"), "nearest sighting")
                }
                NearestDistance::NotFound => info!(%taxon, species, "no sighting nearby"),
            }
        },
        || debug!("first result available"),
    );
    Ok(distances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn reads_all_settings() {
        let config = AppConfig::from_lookup(lookup(&[
            ("FORAGE_DATA_DIR", "/tmp/forage"),
            ("FORAGE_LOCATION", "47.6,-122.3"),
            ("FORAGE_TAXA", "47602:Dandelion, 55830:Nettle"),
            ("FORAGE_MAX_RADIUS_KM", "64"),
            ("FORAGE_DEBUG_NOTIFY_SECONDS", "15"),
        ]));
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/forage")));
        assert_eq!(config.location, Some(Coordinate::new(47.6, -122.3)));
        assert_eq!(config.candidates.len(), 2);
        assert_eq!(config.candidates[&TaxonId(55830)], "Nettle");
        assert_eq!(config.resolver.max_radius_km, 64.0);
        assert_eq!(config.scheduler.debug_delay_seconds, Some(15));
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = AppConfig::from_lookup(lookup(&[
            ("FORAGE_LOCATION", "somewhere"),
            ("FORAGE_TAXA", "abc:Nope,12"),
            ("FORAGE_MAX_RADIUS_KM", "1"),
            ("FORAGE_DEBUG_NOTIFY_SECONDS", "0"),
        ]));
        assert_eq!(config.location, None);
        assert_eq!(config.candidates.len(), 1);
        assert_eq!(config.candidates[&TaxonId(12)], "12");
        assert_eq!(config.resolver, ResolverConfig::default());
        assert_eq!(config.scheduler.debug_delay_seconds, None);
    }

    #[test]
    fn run_without_inputs_does_nothing() {
        let report = run(AppConfig::default()).unwrap();
        assert!(report.distances.is_none());
        assert!(report.notifications.is_none());
    }

    #[test]
    fn run_resyncs_saved_reminders() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            temp.path().join("saved_reminders.json"),
            r#"{"42": {"id": 42, "name": "Dandelion", "type": "leaves", "months": ["April"], "frequency": "weekly", "imageURL": ""}}"#,
        )
        .unwrap();
        let config = AppConfig {
            data_dir: Some(temp.path().to_path_buf()),
            ..Default::default()
        };
        let report = run(config).unwrap();
        assert_eq!(report.notifications.unwrap().scheduled, 5);
    }
}
