//! Deployment record persistence.
//!
//! After an apply, the produced plan and the outcome of the attempt are kept
//! in a plan store so later runs can show what was realized.

mod local;
mod lock;
mod store;
mod types;

pub use local::{LocalPlanStore, STATE_DIR};
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use store::PlanStore;
pub use types::{DeploymentRecord, HistoryEntry, RECORD_VERSION};
