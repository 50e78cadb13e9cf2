//!  Storage is organized through [session_storage::SessionStorageImpl] and
//!  [target_storage::TargetStorageImpl].
//!  The basic idea is:
//!   - There is an application directory with a `sessions` directory and a `targets.json` file.
//!   - Sessions are stored using day files, which store data for a UTC day.
//!   - Sessions are stored as intervals from time a, for duration b.
//!   - Targets are a single json array which may contain records written by older versions.

pub mod entities;
pub mod session_storage;
pub mod target_storage;
