//! Offline mutation queue and the device preference that enables it.

mod action;
mod preference;
mod queue;

pub use action::{
  ActionType, IntakePayload, Mutation, OfflineAction, RunPayload, SettingsPayload, SleepPayload,
};
pub use preference::{OfflinePreference, PREFERENCE_KEY};
pub use queue::{OfflineQueue, QUEUE_KEY};
