//! Batch results and the aggregate-error policy.
//!
//! Emulated batch operations treat partial success as first-class: the
//! successful subset is returned alongside the error list, and the whole
//! call throws only when nothing succeeded.

use kestrel_markets::{ErrorKind, VenueError, VenueResult};

/// The outcome of a batch operation.
#[derive(Debug)]
pub struct BatchResult<T> {
    pub succeeded: Vec<T>,
    pub errors: Vec<VenueError>,
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<T> BatchResult<T> {
    pub fn push_ok(&mut self, item: T) {
        self.succeeded.push(item);
    }

    pub fn push_err(&mut self, error: VenueError) {
        self.errors.push(error);
    }

    pub fn is_total_failure(&self) -> bool {
        self.succeeded.is_empty() && !self.errors.is_empty()
    }

    /// Apply the aggregate policy: partial success returns, total failure
    /// throws a `Validation`-tagged aggregate carrying the first cause.
    pub fn into_result(self, what: &str) -> VenueResult<Self> {
        if self.is_total_failure() {
            let first = self.errors.into_iter().next();
            let mut aggregate = VenueError::new(
                ErrorKind::Validation,
                format!("{what}: every request in the batch failed"),
            );
            if let Some(first) = first {
                aggregate = aggregate.with_cause(first);
            }
            return Err(aggregate);
        }
        Ok(self)
    }
}
