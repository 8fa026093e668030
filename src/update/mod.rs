//! Update check, apply, and progress polling.

pub mod apply;
pub mod check;
pub mod poller;
pub mod version;

pub use apply::{ApplyOutcome, UpdateApplier};
pub use check::{UpdateInfo, UpdateStatus, check_for_update};
pub use poller::{PollKind, PollSnapshot, Poller, ProgressFn, ProgressReport, Stage};
pub use version::{compare_versions, is_newer};
