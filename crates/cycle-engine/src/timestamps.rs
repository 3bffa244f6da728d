//! Block timestamp resolution with bounded retry and a process-lifetime cache.

use std::collections::HashMap;
use std::time::Duration;

use cycle_data::BlockSource;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a block timestamp could not be resolved.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The block stayed unavailable for every attempt. Skip the event.
    #[error("block {block} not available after {attempts} attempts")]
    Exhausted { block: u64, attempts: u32 },
    /// The block source failed. Retry the whole range later.
    #[error("block {block} lookup failed: {report}")]
    Source { block: u64, report: eyre::Report },
}

impl ResolveError {
    /// Whether the caller should retry the range rather than skip the event.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResolveError::Source { .. })
    }
}

/// Caches block timestamps; failed lookups are never cached.
#[derive(Debug)]
pub struct TimestampResolver {
    cache: HashMap<u64, u64>,
    max_retries: u32,
    retry_delay: Duration,
}

impl TimestampResolver {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            cache: HashMap::new(),
            max_retries: max_retries.max(1),
            retry_delay,
        }
    }

    /// Cached timestamp for `block`, if resolved before.
    pub fn cached(&self, block: u64) -> Option<u64> {
        self.cache.get(&block).copied()
    }

    /// Number of cached blocks.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Resolve `block` to its unix timestamp.
    ///
    /// A cache hit returns without touching `source`. A "not yet available"
    /// answer is retried up to `max_retries` attempts with a fixed delay.
    ///
    /// # Errors
    /// [`ResolveError::Exhausted`] once attempts run out, [`ResolveError::Source`]
    /// on a transport failure.
    pub async fn resolve<B: BlockSource>(
        &mut self,
        source: &B,
        block: u64,
    ) -> Result<u64, ResolveError> {
        if let Some(ts) = self.cached(block) {
            return Ok(ts);
        }

        for attempt in 1..=self.max_retries {
            match source.block_timestamp(block).await {
                Ok(Some(ts)) => {
                    self.cache.insert(block, ts);
                    return Ok(ts);
                }
                Ok(None) => {
                    debug!(block, attempt, max = self.max_retries, "block not yet available");
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                Err(report) => return Err(ResolveError::Source { block, report }),
            }
        }

        warn!(block, attempts = self.max_retries, "giving up on block timestamp");
        Err(ResolveError::Exhausted {
            block,
            attempts: self.max_retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    /// Answers from a script, then repeats the fallback.
    struct ScriptedBlocks {
        script: RefCell<VecDeque<eyre::Result<Option<u64>>>>,
        fallback: Option<u64>,
        calls: Cell<u32>,
    }

    impl ScriptedBlocks {
        fn new(script: Vec<eyre::Result<Option<u64>>>, fallback: Option<u64>) -> Self {
            Self {
                script: RefCell::new(script.into()),
                fallback,
                calls: Cell::new(0),
            }
        }
    }

    impl BlockSource for ScriptedBlocks {
        async fn block_timestamp(&self, _block_number: u64) -> eyre::Result<Option<u64>> {
            self.calls.set(self.calls.get() + 1);
            self.script
                .borrow_mut()
                .pop_front()
                .unwrap_or(Ok(self.fallback))
        }
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let source = ScriptedBlocks::new(vec![], Some(1_700_000_000));
        let mut resolver = TimestampResolver::new(3, Duration::ZERO);

        assert_eq!(resolver.resolve(&source, 42).await.unwrap(), 1_700_000_000);
        assert_eq!(resolver.resolve(&source, 42).await.unwrap(), 1_700_000_000);
        assert_eq!(source.calls.get(), 1);
        assert_eq!(resolver.len(), 1);
    }

    #[tokio::test]
    async fn retries_until_block_appears() {
        let source = ScriptedBlocks::new(vec![Ok(None), Ok(None)], Some(99));
        let mut resolver = TimestampResolver::new(3, Duration::ZERO);

        assert_eq!(resolver.resolve(&source, 7).await.unwrap(), 99);
        assert_eq!(source.calls.get(), 3);
    }

    #[tokio::test]
    async fn exhaustion_is_not_cached() {
        let source = ScriptedBlocks::new(vec![Ok(None), Ok(None)], Some(5));
        let mut resolver = TimestampResolver::new(2, Duration::ZERO);

        let err = resolver.resolve(&source, 7).await.unwrap_err();
        assert!(matches!(err, ResolveError::Exhausted { block: 7, attempts: 2 }));
        assert!(!err.is_retryable());
        assert!(resolver.is_empty());

        // next encounter of the same block queries again
        assert_eq!(resolver.resolve(&source, 7).await.unwrap(), 5);
        assert_eq!(source.calls.get(), 3);
    }

    #[tokio::test]
    async fn transport_failure_is_retryable() {
        let source = ScriptedBlocks::new(vec![Err(eyre::eyre!("connection reset"))], Some(5));
        let mut resolver = TimestampResolver::new(3, Duration::ZERO);

        let err = resolver.resolve(&source, 8).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(source.calls.get(), 1);
        assert_eq!(resolver.cached(8), None);
    }
}
