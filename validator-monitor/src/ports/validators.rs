//! Source of the monitored validator set.
//!
//! The engine loads the monitored set exactly once at startup; afterwards
//! the set changes only through explicit
//! [`add_validator`](crate::collector::CollectionEngine::add_validator) /
//! [`remove_validator`](crate::collector::CollectionEngine::remove_validator)
//! calls. A SQL-backed registry implements this trait outside the core;
//! [`StaticValidatorRepository`] serves config-defined sets.

use async_trait::async_trait;

use crate::error::Result;

// ═══════════════════════════════════════════════════════════════════════════════
// VALIDATOR REPOSITORY
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for loading the monitored validator set.
#[async_trait]
pub trait ValidatorRepository: Send + Sync {
    /// Load the indices of validators flagged for monitoring.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is unavailable; this is fatal at
    /// startup.
    async fn load_monitored(&self) -> Result<Vec<u64>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATIC REPOSITORY
// ═══════════════════════════════════════════════════════════════════════════════

/// Repository serving a fixed, config-defined validator set.
#[derive(Debug, Clone, Default)]
pub struct StaticValidatorRepository {
    indices: Vec<u64>,
}

impl StaticValidatorRepository {
    /// Create a repository over a fixed index list.
    ///
    /// Duplicates are dropped, preserving first occurrence order.
    #[must_use]
    pub fn new(indices: Vec<u64>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let indices = indices
            .into_iter()
            .filter(|index| seen.insert(*index))
            .collect();
        Self { indices }
    }
}

#[async_trait]
impl ValidatorRepository for StaticValidatorRepository {
    async fn load_monitored(&self) -> Result<Vec<u64>> {
        Ok(self.indices.clone())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MOCKS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks {
    //! Mock implementations for testing.

    use std::sync::atomic::{AtomicBool, Ordering};

    use super::{Result, ValidatorRepository, async_trait};
    use crate::error::MonitorError;

    /// Mock repository with togglable failure.
    #[derive(Debug, Default)]
    pub struct MockValidatorRepository {
        indices: Vec<u64>,
        should_fail: AtomicBool,
    }

    impl MockValidatorRepository {
        /// Create a mock serving the given indices.
        #[must_use]
        pub fn new(indices: Vec<u64>) -> Self {
            Self {
                indices,
                should_fail: AtomicBool::new(false),
            }
        }

        /// Make `load_monitored` fail (or succeed again).
        pub fn set_should_fail(&self, fail: bool) {
            self.should_fail.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ValidatorRepository for MockValidatorRepository {
        async fn load_monitored(&self) -> Result<Vec<u64>> {
            if self.should_fail.load(Ordering::SeqCst) {
                return Err(MonitorError::Initialization(
                    "mock repository failure".into(),
                ));
            }
            Ok(self.indices.clone())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
