use std::collections::{HashMap, HashSet};

use lambdaworks_math::polynomial::Polynomial;
use types::{LargeField, Replica};

/// State of one IVSS instance at one node, covering both phases. Created
/// lazily on first touch; latched flags keep late duplicates idempotent.
#[derive(Debug, Default)]
pub(crate) struct IVSSInstance {
    // Sharing phase
    pub dealer: Option<Replica>,
    pub received_poly: Option<Polynomial<LargeField>>,
    /// Points that arrived before the dealer's slice, buffered by sender.
    pub early_points: HashMap<Replica, LargeField>,
    /// Delivered EQUAL(i, j) payloads, ordered pairs.
    pub completed_equals: HashSet<(Replica, Replica)>,
    pub m_set: Option<Vec<Replica>>,
    /// A delivered MSET that did not verify yet; re-checked on every EQUAL.
    pub pending_m_set: Option<Vec<Replica>>,
    pub sent_m_set: bool,
    pub sharing_done: bool,

    // Reconstruction phase
    pub revealed_polys: HashMap<Replica, Polynomial<LargeField>>,
    pub ready_from: HashSet<Replica>,
    pub secret: Option<LargeField>,
    pub reconstructed: bool,
}
