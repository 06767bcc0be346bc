//! Injected dependencies shared by storage backends.

use chrono::{DateTime, Utc};

/// Abstracts time so stores can stamp `created_date` deterministically in
/// tests.
///
/// Production code uses [`SystemClock`]; `grange-testing` provides a
/// `FixedClock` that always returns the same instant.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
