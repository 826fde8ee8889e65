//! Turn coordination for two terminal agents sharing a filesystem mailbox.
//!
//! The author and the reviewer alternate turns. Submissions are validated and
//! recorded by [`submission::submit`], step changes go through
//! [`gate::advance_step`], and the [`watcher`] nudges whichever agent holds
//! the turn by typing a trigger into its terminal pane.

pub mod agent;
pub mod config;
pub mod error;
pub mod gate;
pub mod paths;
pub mod policy;
pub mod slot;
pub mod store;
pub mod submission;
pub mod time;
pub mod watcher;

pub use agent::{Agent, Tag};
pub use config::{ConfigOverrides, WatcherConfig};
pub use error::{DuetError, Result};
pub use gate::{GateReport, LatestTags, PolicyInspection, StepReceipt};
pub use policy::{PolicyMode, PolicyViolation};
pub use store::{SessionSnapshot, SessionStore};
pub use submission::{Receipt, SubmissionInput, SubmissionSource};
