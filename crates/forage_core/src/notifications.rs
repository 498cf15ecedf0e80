use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::model::{Frequency, Month, TaxonId};

/// Which group of reminders a notification speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderBucket {
    /// First-of-the-month roundup of everything in season.
    Summary,
    Biweekly,
    Weekly,
}

impl ReminderBucket {
    pub const ALL: [ReminderBucket; 3] = [
        ReminderBucket::Summary,
        ReminderBucket::Biweekly,
        ReminderBucket::Weekly,
    ];

    pub fn title(&self, month: Month) -> String {
        match self {
            ReminderBucket::Summary => format!("{month} Species in Season!"),
            ReminderBucket::Biweekly => format!("{month} Biweekly Reminder!"),
            ReminderBucket::Weekly => format!("{month} Weekly Reminder!"),
        }
    }

    /// Days of the month this bucket fires on.
    pub fn days(&self) -> &'static [u32] {
        match self {
            ReminderBucket::Summary => &[1],
            ReminderBucket::Biweekly => &[15, 29],
            ReminderBucket::Weekly => &[8, 22],
        }
    }

    /// Weekly reminders ride along in the biweekly bucket too.
    pub fn includes(&self, frequency: Frequency) -> bool {
        match self {
            ReminderBucket::Summary => true,
            ReminderBucket::Biweekly => {
                matches!(frequency, Frequency::Biweekly | Frequency::Weekly)
            }
            ReminderBucket::Weekly => frequency == Frequency::Weekly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    pub month: Month,
    pub screen: String,
    pub bucket: ReminderBucket,
    #[serde(default)]
    pub species: Vec<TaxonId>,
}

impl NotificationData {
    pub fn key(&self) -> (Month, ReminderBucket) {
        (self.month, self.bucket)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub data: NotificationData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationTrigger {
    /// Fires every year on `day` of `month` at the given local time.
    Yearly {
        month: Month,
        day: u32,
        hour: u32,
        minute: u32,
    },
    /// Fires once, `seconds` after being scheduled.
    After { seconds: u64 },
}

impl NotificationTrigger {
    /// Next local time strictly after `now` this trigger fires.
    ///
    /// A yearly trigger on a day the month lacks in some years (February 29)
    /// only fires in the years that have it.
    pub fn next_fire_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match *self {
            NotificationTrigger::After { seconds } => {
                let seconds = i64::try_from(seconds).ok()?;
                now.checked_add_signed(Duration::try_seconds(seconds)?)
            }
            NotificationTrigger::Yearly {
                month,
                day,
                hour,
                minute,
            } => {
                let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
                (now.year()..=now.year() + 8).find_map(|year| {
                    let date = NaiveDate::from_ymd_opt(year, month.number(), day)?;
                    let at = date.and_time(time);
                    (at > now).then_some(at)
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub content: NotificationContent,
    pub trigger: NotificationTrigger,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub String);

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingNotification {
    pub id: NotificationId,
    pub content: NotificationContent,
    pub trigger: NotificationTrigger,
}

/// Platform-specific notification adapters will implement this trait.
pub trait NotificationStore: Send + Sync {
    fn schedule(&self, request: NotificationRequest) -> NotificationId;
    fn pending(&self) -> Vec<PendingNotification>;
    fn cancel(&self, id: &NotificationId);
}

impl<T: NotificationStore + ?Sized> NotificationStore for &T {
    fn schedule(&self, request: NotificationRequest) -> NotificationId {
        (**self).schedule(request)
    }

    fn pending(&self) -> Vec<PendingNotification> {
        (**self).pending()
    }

    fn cancel(&self, id: &NotificationId) {
        (**self).cancel(id)
    }
}

/// Keeps pending notifications in memory. Backs tests and the desktop host.
#[derive(Debug, Default)]
pub struct MemoryNotificationStore {
    inner: Mutex<MemoryNotifications>,
}

#[derive(Debug, Default)]
struct MemoryNotifications {
    next_id: u64,
    pending: Vec<PendingNotification>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationStore for MemoryNotificationStore {
    fn schedule(&self, request: NotificationRequest) -> NotificationId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = NotificationId(format!("notification-{}", inner.next_id));
        inner.pending.push(PendingNotification {
            id: id.clone(),
            content: request.content,
            trigger: request.trigger,
        });
        id
    }

    fn pending(&self) -> Vec<PendingNotification> {
        self.inner.lock().pending.clone()
    }

    fn cancel(&self, id: &NotificationId) {
        self.inner.lock().pending.retain(|pending| &pending.id != id);
    }
}
