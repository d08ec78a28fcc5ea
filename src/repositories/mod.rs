//! # Repositories
//!
//! Data access layer over the SeaORM entities. All cross-invocation
//! coordination (job claims, account locks, session counters) happens
//! through the conditional-write primitives in these repositories, never
//! through in-memory shared state.

pub mod account;
pub mod record;
pub mod sync_job;
pub mod sync_session;

pub use account::{AccountRepository, LockAcquisition};
pub use record::{PersistOutcome, RecordRepository, RecordWriter};
pub use sync_job::{JobDisposition, NewJob, SyncJobRepository};
pub use sync_session::{SessionOutcome, SyncSessionRepository};
