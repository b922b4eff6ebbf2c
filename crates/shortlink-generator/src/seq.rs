use crate::Generator;
use shortlink_core::ShortCode;
use std::sync::atomic::{AtomicU64, Ordering};

const COUNTER_WIDTH: usize = 6;

/// Deterministic codes `<prefix><counter>` with a zero-padded counter,
/// e.g. `wh000000`, `wh000001`. Only unique within one instance.
#[derive(Debug)]
pub struct SeqGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SeqGenerator {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::with_offset(prefix, 0)
    }

    /// Starts counting at `offset`, e.g. to continue past codes already
    /// stored by an earlier instance.
    pub fn with_offset(prefix: impl Into<String>, offset: u64) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(offset),
        }
    }
}

impl Generator for SeqGenerator {
    type Output = ShortCode;

    fn generate(&self) -> ShortCode {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        ShortCode::new_unchecked(format!("{}{n:0width$}", self.prefix, width = COUNTER_WIDTH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn counts_up_from_offset() {
        let from_zero = SeqGenerator::with_prefix("wh");
        assert_eq!(from_zero.generate().as_str(), "wh000000");
        assert_eq!(from_zero.generate().as_str(), "wh000001");

        let resumed = SeqGenerator::with_offset("wh", 1000);
        assert_eq!(resumed.generate().as_str(), "wh001000");
    }

    #[test]
    fn codes_are_valid_short_codes() {
        let generator = SeqGenerator::with_prefix("t-");
        let code = generator.generate();
        assert_eq!(ShortCode::new(code.as_str()).unwrap(), code);
    }

    #[test]
    fn threads_never_share_a_code() {
        let generator = Arc::new(SeqGenerator::with_prefix("c"));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || {
                    (0..250).map(|_| generator.generate()).collect::<Vec<_>>()
                })
            })
            .collect();

        let codes: HashSet<ShortCode> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        assert_eq!(codes.len(), 1000);
    }
}
