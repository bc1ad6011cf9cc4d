use dashmap::DashSet;

/// Process-lifetime set of transaction signatures already examined.
///
/// `observe` is an atomic test-and-insert, so each signature is reported new
/// exactly once even when several pollers share the set.
#[derive(Debug, Default)]
pub struct SignatureDeduplicator {
    seen: DashSet<String>,
}

impl SignatureDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the signature had not been observed before.
    pub fn observe(&self, signature: &str) -> bool {
        if self.seen.contains(signature) {
            return false;
        }
        self.seen.insert(signature.to_string())
    }

    /// Keeps the unseen signatures of `batch`, in feed order, marking them seen.
    pub fn filter_unseen<I, S>(&self, batch: I) -> Vec<S>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        batch.into_iter().filter(|sig| self.observe(sig.as_ref())).collect()
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.seen.contains(signature)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_observe_once() {
        let dedup = SignatureDeduplicator::new();
        assert!(dedup.observe("sigA"));
        assert!(!dedup.observe("sigA"));
        assert!(dedup.observe("sigB"));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn test_filter_unseen_keeps_order() {
        let dedup = SignatureDeduplicator::new();
        dedup.observe("s2");

        let fresh = dedup.filter_unseen(vec!["s1", "s2", "s3", "s1"]);
        assert_eq!(fresh, vec!["s1", "s3"]);
        assert!(dedup.filter_unseen(vec!["s3", "s2"]).is_empty());
    }

    #[test]
    fn test_concurrent_observers_report_once() {
        let dedup = Arc::new(SignatureDeduplicator::new());
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dedup = Arc::clone(&dedup);
                let wins = Arc::clone(&wins);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        if dedup.observe(&format!("sig{}", i)) {
                            wins.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 200);
        assert_eq!(dedup.len(), 200);
    }
}
