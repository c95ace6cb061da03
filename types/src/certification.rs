use std::collections::HashSet;
use std::sync::RwLock;

use crate::Replica;

/// Per-node registry of certified Byzantine pairs and completed core
/// invocations. Shared across protocol layers for the lifetime of a run;
/// both sets only ever grow.
#[derive(Debug, Default)]
pub struct Certification {
    inner: RwLock<CertState>,
}

#[derive(Debug, Default)]
struct CertState {
    flagged_pairs: HashSet<(Replica, Replica)>,
    invocations: Vec<String>,
}

impl Certification {
    pub fn new() -> Certification {
        Certification::default()
    }

    /// Flags {i, j} as a faulty pair. The pair is stored unordered.
    pub fn flag(&self, i: Replica, j: Replica) {
        let pair = ordered(i, j);
        let mut state = self.inner.write().expect("certification lock poisoned");
        if state.flagged_pairs.insert(pair) {
            log::info!(target: "certification", "Flagged faulty pair ({}, {})", pair.0, pair.1);
        }
    }

    pub fn is_flagged(&self, i: Replica, j: Replica) -> bool {
        let state = self.inner.read().expect("certification lock poisoned");
        state.flagged_pairs.contains(&ordered(i, j))
    }

    pub fn flagged_pairs(&self) -> Vec<(Replica, Replica)> {
        let state = self.inner.read().expect("certification lock poisoned");
        state.flagged_pairs.iter().copied().collect()
    }

    pub fn record_invocation(&self, instance_id: String) {
        let mut state = self.inner.write().expect("certification lock poisoned");
        state.invocations.push(instance_id);
    }

    pub fn list_invocations(&self) -> Vec<String> {
        let state = self.inner.read().expect("certification lock poisoned");
        state.invocations.clone()
    }
}

fn ordered(i: Replica, j: Replica) -> (Replica, Replica) {
    if i <= j {
        (i, j)
    } else {
        (j, i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_is_unordered_and_idempotent() {
        let cert = Certification::new();
        assert!(!cert.is_flagged(2, 5));

        cert.flag(5, 2);
        assert!(cert.is_flagged(2, 5));
        assert!(cert.is_flagged(5, 2));

        cert.flag(2, 5);
        assert_eq!(cert.flagged_pairs().len(), 1);
    }

    #[test]
    fn invocations_accumulate_in_order() {
        let cert = Certification::new();
        cert.record_invocation("ICC-1-2-3".to_string());
        cert.record_invocation("ICC-1-2-4".to_string());
        assert_eq!(
            cert.list_invocations(),
            vec!["ICC-1-2-3".to_string(), "ICC-1-2-4".to_string()]
        );
    }
}
