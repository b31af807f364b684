use std::time::Duration;

pub(crate) const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);
pub(crate) const SHUTDOWN_GRACE_TIMEOUT: Duration = Duration::from_secs(3);
pub(crate) const DEFAULT_PAGE_SIZE: usize = 20;

/// How often a direct wait on job results re-checks the interrupt flag.
pub(crate) const RESULT_POLL_WAIT: Duration = Duration::from_millis(50);

/// Longest a viewer blocks on input before re-checking the interrupt flag.
pub(crate) const INTERRUPT_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub(crate) const HEADER_ROWS: usize = 1;
pub(crate) const HELP_ROWS: usize = 1;
pub(crate) const STATUS_SEPARATOR: &str = "  ";
