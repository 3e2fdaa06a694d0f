//! Row key generation
//!
//! Tables without a caller supplied key ask an `IdGenerator` for one.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};

/// Source of candidate row keys
pub trait IdGenerator: Send + Sync + std::fmt::Debug {
    /// Produce the next candidate key; fails once the generator cannot advance
    fn generate(&self) -> Result<String>;
}

/// Monotonic counter rendered as `{prefix}{n}`
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequenceGenerator {
    /// Counter starting at 1 without prefix
    pub fn new() -> Self {
        Self::starting_at("", 1)
    }

    /// Counter starting at `start`
    pub fn starting_at(prefix: impl Into<String>, start: u64) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(start),
        }
    }
}

impl IdGenerator for SequenceGenerator {
    fn generate(&self) -> Result<String> {
        let id = self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map_err(|_| Error::Internal("sequence generator exhausted".to_string()))?;
        Ok(format!("{}{}", self.prefix, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence() {
        let generator = SequenceGenerator::starting_at("user-", 7);
        assert_eq!(generator.generate().unwrap(), "user-7");
        assert_eq!(generator.generate().unwrap(), "user-8");
    }

    #[test]
    fn test_sequence_exhausted() {
        let generator = SequenceGenerator::starting_at("", u64::MAX);
        assert!(generator.generate().is_err());
    }
}
