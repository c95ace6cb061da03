use acast::ACastMsg;
use lambdaworks_math::polynomial::Polynomial;
use types::{InstanceId, LargeField, LargeFieldSer, Replica};
use serde::{Deserialize, Serialize};

/// Messages exchanged by the IVSS layer: direct point-to-point shares and
/// evaluation points, plus the A-Cast traffic carrying payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IVSSMsg {
    Share {
        instance: InstanceId,
        to: Replica,
        from: Replica,
        poly: Vec<LargeFieldSer>,
    },
    Point {
        instance: InstanceId,
        to: Replica,
        from: Replica,
        point: LargeFieldSer,
    },
    ACast(ACastMsg<IVSSPayload>),
}

/// Payloads reliably broadcast within an IVSS instance. Each payload kind
/// maps onto a dedicated A-Cast uuid so instances stay addressable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IVSSPayload {
    /// Process pair.0 affirms the point it received from pair.1 matches its
    /// own slice.
    Equal {
        instance: InstanceId,
        pair: (Replica, Replica),
    },
    /// The dealer's candidate set, sorted ascending.
    MSet {
        instance: InstanceId,
        members: Vec<Replica>,
    },
    /// A member of M reveals its stored slice for reconstruction.
    Reveal {
        instance: InstanceId,
        sender: Replica,
        poly: Vec<LargeFieldSer>,
    },
    /// Sender has interpolated the secret locally.
    Ready {
        instance: InstanceId,
        sender: Replica,
    },
}

impl IVSSPayload {
    pub fn instance(&self) -> &InstanceId {
        match self {
            IVSSPayload::Equal { instance, .. } => instance,
            IVSSPayload::MSet { instance, .. } => instance,
            IVSSPayload::Reveal { instance, .. } => instance,
            IVSSPayload::Ready { instance, .. } => instance,
        }
    }

    /// A-Cast uuid for this payload's broadcast instance.
    pub fn uuid(&self) -> String {
        match self {
            IVSSPayload::Equal { instance, pair } => {
                format!("{}-EQUAL-{}-{}", instance, pair.0, pair.1)
            }
            IVSSPayload::MSet { instance, .. } => format!("{}-MSET", instance),
            IVSSPayload::Reveal { instance, sender, .. } => {
                format!("{}-REVEAL-{}", instance, sender)
            }
            IVSSPayload::Ready { instance, sender } => {
                format!("{}-READY-{}", instance, sender)
            }
        }
    }
}

/// Local results handed to the enclosing layer.
#[derive(Debug, Clone)]
pub enum IVSSEvent {
    SharingComplete {
        instance: InstanceId,
        m_set: Vec<Replica>,
        share: Option<Polynomial<LargeField>>,
    },
    Reconstructed {
        instance: InstanceId,
        secret: LargeField,
    },
}
