use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    config::SchedulerConfig,
    error::{ConfigError, ReminderError, StoreError},
    events::ReminderEvents,
    model::{Frequency, Month, ReminderMap, ReminderRecord, TaxonId},
    notifications::{
        NotificationContent, NotificationData, NotificationRequest, NotificationStore,
        NotificationTrigger, ReminderBucket,
    },
    storage::{read_json, write_json, KeyValueStore},
    taxonomy::{photo_url_or_placeholder, TaxonLookup},
};

pub const SAVED_REMINDERS_KEY: &str = "saved_reminders";

/// Number of species named in a notification body before it is cut short.
const LISTED_SPECIES: usize = 3;

/// What the UI hands over when the user taps "remind me".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderDraft {
    pub id: TaxonId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub months: BTreeSet<Month>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub record: ReminderRecord,
    /// False when an existing reminder was merged into.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(ReminderRecord),
    NotFound(TaxonId),
}

impl DeleteOutcome {
    pub fn message(&self) -> String {
        match self {
            DeleteOutcome::Deleted(record) => format!("Reminder for {} removed.", record.name),
            DeleteOutcome::NotFound(_) => "No reminder found for this species.".to_string(),
        }
    }
}

/// The persisted reminder map plus its change observers.
pub struct ReminderStore<K> {
    kv: K,
    events: ReminderEvents,
}

impl<K: KeyValueStore> ReminderStore<K> {
    pub fn new(kv: K) -> Self {
        Self {
            kv,
            events: ReminderEvents::new(),
        }
    }

    pub fn events(&self) -> &ReminderEvents {
        &self.events
    }

    pub fn load(&self) -> Result<ReminderMap, StoreError> {
        Ok(read_json(&self.kv, SAVED_REMINDERS_KEY)?.unwrap_or_default())
    }

    /// Inserts or merges a reminder. Months are unioned with any existing
    /// record; frequency and image are replaced.
    pub fn upsert(
        &self,
        draft: ReminderDraft,
        frequency: Frequency,
        image_url: String,
    ) -> Result<(SaveOutcome, ReminderMap), ReminderError> {
        let mut reminders = self.load()?;
        let existing = reminders.get(&draft.id);
        let created = existing.is_none();
        let mut months = draft.months;
        if let Some(existing) = existing {
            months.extend(existing.months.iter().copied());
        }
        if months.is_empty() {
            return Err(ReminderError::NoMonths(draft.id));
        }

        let record = ReminderRecord {
            id: draft.id,
            name: draft.name,
            kind: draft.kind,
            months,
            frequency,
            image_url,
        };
        reminders.insert(record.id, record.clone());
        write_json(&self.kv, SAVED_REMINDERS_KEY, &reminders)?;
        self.events.emit(&reminders);
        Ok((SaveOutcome { record, created }, reminders))
    }

    /// Removes the reminder for `id`, returning it with the remaining map.
    pub fn remove(&self, id: TaxonId) -> Result<Option<(ReminderRecord, ReminderMap)>, StoreError> {
        let mut reminders = self.load()?;
        let Some(removed) = reminders.remove(&id) else {
            return Ok(None);
        };
        write_json(&self.kv, SAVED_REMINDERS_KEY, &reminders)?;
        self.events.emit(&reminders);
        Ok(Some((removed, reminders)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RescheduleSummary {
    pub cancelled: usize,
    pub scheduled: usize,
}

/// Keeps the pending notifications in line with the reminder map.
///
/// Notifications are grouped per month into a summary bucket and two
/// frequency buckets. Every call throws away the buckets of the affected
/// months and rebuilds them from the reminders passed in.
pub struct ReminderScheduler<N> {
    notifications: N,
    config: SchedulerConfig,
}

impl<N: NotificationStore> ReminderScheduler<N> {
    pub fn new(notifications: N) -> Self {
        Self {
            notifications,
            config: SchedulerConfig::default(),
        }
    }

    pub fn with_config(notifications: N, config: SchedulerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            notifications,
            config,
        })
    }

    pub fn notifications(&self) -> &N {
        &self.notifications
    }

    pub fn reschedule_notifications(
        &self,
        months: impl IntoIterator<Item = Month>,
        reminders: &ReminderMap,
    ) -> RescheduleSummary {
        let months: BTreeSet<Month> = months.into_iter().collect();
        let mut summary = RescheduleSummary::default();
        for month in months {
            summary.cancelled += self.cancel_month(month);
            summary.scheduled += self.schedule_month(month, reminders);
        }
        tracing::debug!(
            cancelled = summary.cancelled,
            scheduled = summary.scheduled,
            "notifications rescheduled"
        );
        summary
    }

    fn cancel_month(&self, month: Month) -> usize {
        let stale: Vec<_> = self
            .notifications
            .pending()
            .into_iter()
            .filter(|pending| pending.content.data.month == month)
            .collect();
        for pending in &stale {
            self.notifications.cancel(&pending.id);
        }
        stale.len()
    }

    fn schedule_month(&self, month: Month, reminders: &ReminderMap) -> usize {
        let in_season: Vec<&ReminderRecord> = reminders
            .values()
            .filter(|record| record.in_season(month))
            .collect();
        let mut scheduled = 0;
        for bucket in ReminderBucket::ALL {
            let members: Vec<&ReminderRecord> = in_season
                .iter()
                .copied()
                .filter(|record| bucket.includes(record.frequency))
                .collect();
            if members.is_empty() {
                continue;
            }
            let content = self.content_for(month, bucket, &members);
            for &day in bucket.days() {
                self.notifications.schedule(NotificationRequest {
                    content: content.clone(),
                    trigger: self.trigger_for(month, day),
                });
                scheduled += 1;
            }
        }
        scheduled
    }

    fn content_for(
        &self,
        month: Month,
        bucket: ReminderBucket,
        members: &[&ReminderRecord],
    ) -> NotificationContent {
        let names = species_list(members.iter().map(|record| record.name.as_str()));
        let body = match bucket {
            ReminderBucket::Summary => format!("In season this month: {names}"),
            ReminderBucket::Biweekly | ReminderBucket::Weekly => {
                format!("Time to go foraging for {names}")
            }
        };
        NotificationContent {
            title: bucket.title(month),
            body,
            data: NotificationData {
                month,
                screen: self.config.screen.clone(),
                bucket,
                species: members.iter().map(|record| record.id).collect(),
            },
        }
    }

    fn trigger_for(&self, month: Month, day: u32) -> NotificationTrigger {
        match self.config.debug_delay_seconds {
            Some(seconds) => NotificationTrigger::After { seconds },
            None => NotificationTrigger::Yearly {
                month,
                day,
                hour: self.config.hour,
                minute: self.config.minute,
            },
        }
    }
}

/// "A, B, C…" for the first few names.
fn species_list<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let names: Vec<&str> = names.collect();
    let mut listed = names
        .iter()
        .take(LISTED_SPECIES)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    if names.len() > LISTED_SPECIES {
        listed.push('…');
    }
    listed
}

/// Reminder operations as the screens call them.
pub struct ReminderService<K, N, T> {
    store: ReminderStore<K>,
    scheduler: ReminderScheduler<N>,
    taxonomy: T,
}

impl<K, N, T> ReminderService<K, N, T>
where
    K: KeyValueStore,
    N: NotificationStore,
    T: TaxonLookup,
{
    pub fn new(store: ReminderStore<K>, scheduler: ReminderScheduler<N>, taxonomy: T) -> Self {
        Self {
            store,
            scheduler,
            taxonomy,
        }
    }

    pub fn store(&self) -> &ReminderStore<K> {
        &self.store
    }

    pub fn scheduler(&self) -> &ReminderScheduler<N> {
        &self.scheduler
    }

    pub fn reminders(&self) -> Result<ReminderMap, ReminderError> {
        self.store.load().map_err(|err| {
            tracing::error!(%err, "unable to read saved reminders");
            ReminderError::from(err)
        })
    }

    #[instrument(skip(self, draft), fields(taxon = %draft.id))]
    pub fn save_reminder(
        &self,
        draft: ReminderDraft,
        frequency: Frequency,
    ) -> Result<SaveOutcome, ReminderError> {
        let image_url = photo_url_or_placeholder(&self.taxonomy, draft.id);
        let (outcome, reminders) = self
            .store
            .upsert(draft, frequency, image_url)
            .inspect_err(|err| tracing::error!(%err, "unable to save reminder"))?;
        self.scheduler
            .reschedule_notifications(outcome.record.months.iter().copied(), &reminders);
        tracing::info!(created = outcome.created, "reminder saved");
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub fn delete_reminder(&self, id: TaxonId) -> Result<DeleteOutcome, ReminderError> {
        let removed = self
            .store
            .remove(id)
            .inspect_err(|err| tracing::error!(%err, "unable to delete reminder"))?;
        let Some((record, reminders)) = removed else {
            tracing::info!(taxon = %id, "no reminder to delete");
            return Ok(DeleteOutcome::NotFound(id));
        };
        self.scheduler
            .reschedule_notifications(record.months.iter().copied(), &reminders);
        tracing::info!(taxon = %id, "reminder deleted");
        Ok(DeleteOutcome::Deleted(record))
    }

    /// Rebuilds every month's notifications from the stored reminders.
    #[instrument(skip(self))]
    pub fn resync_all(&self) -> Result<RescheduleSummary, ReminderError> {
        let reminders = self.reminders()?;
        Ok(self
            .scheduler
            .reschedule_notifications(Month::ALL, &reminders))
    }
}
