pub mod config;
pub mod error;
pub mod events;
pub mod favorites;
pub mod geo;
pub mod model;
pub mod notifications;
pub mod reminders;
pub mod resolver;
pub mod storage;
pub mod taxonomy;

pub use crate::model::{Coordinate, Frequency, Month, NearestDistance, ReminderRecord, TaxonId};
pub use crate::reminders::{ReminderScheduler, ReminderService, ReminderStore};
pub use crate::resolver::{DistanceResolver, DistanceSearch, ProgressEvent};
