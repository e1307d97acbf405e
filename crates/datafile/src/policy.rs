use serde::{Deserialize, Serialize};

/// What a multi-record loop does when one header or record transfer fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorPolicy {
    /// Log the failure, remember the record, keep going. Used for diagnostics.
    #[default]
    ContinueOnError,
    /// Stop the file at the first failure. Used for production writes.
    AbortOnError,
}

impl ErrorPolicy {
    pub fn aborts(self) -> bool {
        matches!(self, ErrorPolicy::AbortOnError)
    }
}
