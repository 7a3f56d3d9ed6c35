mod error;
mod wrapper;

pub use error::ResticError;
pub use wrapper::{BackupStore, ResticStore, Snapshot};
