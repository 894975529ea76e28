//! Store records and snapshots.

mod record;
mod snapshot;

pub use record::StoreRecord;
pub(crate) use snapshot::Storage;
pub use snapshot::Snapshot;
