//! Monotonic id generation for `dbId` and `taskId`.
//!
//! Both are 26-character Crockford-base32 ULIDs: lexicographically sortable
//! by creation order, derived from wall-clock milliseconds.

use std::sync::Mutex;

use ulid::Generator;

/// A monotonic id generator held by the repository handle.
///
/// Wraps [`ulid::Generator`] behind a mutex so a single generator can be
/// shared by the task queue (stamping `taskId`) and the repository
/// lifecycle code (stamping a fresh `dbId`).
pub struct IdGenerator {
    inner: Mutex<Generator>,
}

impl IdGenerator {
    /// Create a new generator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Generator::new()),
        }
    }

    /// Generate the next monotonic id as its 26-character string form.
    ///
    /// # Panics
    /// Panics if 2^80 ids have been generated within the same millisecond,
    /// which cannot happen in practice.
    #[must_use]
    pub fn next(&self) -> String {
        let mut generator = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let ulid = generator
            .generate()
            .expect("ulid random bits overflowed within one millisecond");
        ulid.to_string()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_26_chars() {
        let generator = IdGenerator::new();
        assert_eq!(generator.next().len(), 26);
    }

    #[test]
    fn ids_are_monotonically_increasing() {
        let generator = IdGenerator::new();
        let mut prev = generator.next();
        for _ in 0..1000 {
            let next = generator.next();
            assert!(next > prev, "{next} should sort after {prev}");
            prev = next;
        }
    }
}
