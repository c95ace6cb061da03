use std::collections::VecDeque;
use std::sync::Arc;

use acast::ACastMsg;
use types::poly::rand_field_element;
use types::{Certification, Effects, InstanceId, LargeField, Replica};

use crate::msg::{IVSSEvent, IVSSMsg, IVSSPayload};
use crate::IVSS;

/// Synchronous cluster of IVSS engines. Unicasts and broadcasts flow
/// through a FIFO queue; silenced nodes drop everything addressed to them.
struct Cluster {
    engines: Vec<IVSS>,
    certs: Vec<Arc<Certification>>,
    queue: VecDeque<(Replica, IVSSMsg)>,
    events: Vec<Vec<IVSSEvent>>,
    silenced: Vec<bool>,
    num_nodes: usize,
}

impl Cluster {
    fn new(num_nodes: usize, num_faults: usize) -> Cluster {
        let certs: Vec<Arc<Certification>> = (0..num_nodes)
            .map(|_| Arc::new(Certification::new()))
            .collect();
        Cluster {
            engines: (1..=num_nodes)
                .map(|id| IVSS::new(id, num_nodes, num_faults, certs[id - 1].clone()))
                .collect(),
            certs,
            queue: VecDeque::new(),
            events: vec![Vec::new(); num_nodes],
            silenced: vec![false; num_nodes],
            num_nodes,
        }
    }

    fn silence(&mut self, node: Replica) {
        self.silenced[node - 1] = true;
    }

    fn drive<F>(&mut self, node: Replica, action: F)
    where
        F: FnOnce(&mut IVSS, &mut Effects<IVSSMsg, IVSSEvent>),
    {
        let mut fx = Effects::new();
        action(&mut self.engines[node - 1], &mut fx);
        self.route(node, fx);
    }

    fn route(&mut self, node: Replica, fx: Effects<IVSSMsg, IVSSEvent>) {
        for (to, msg) in fx.unicasts {
            self.queue.push_back((to, msg));
        }
        for msg in fx.broadcasts {
            for peer in 1..=self.num_nodes {
                self.queue.push_back((peer, msg.clone()));
            }
        }
        for event in fx.results {
            self.events[node - 1].push(event);
        }
    }

    fn pump(&mut self) {
        while let Some((to, msg)) = self.queue.pop_front() {
            self.step(to, msg);
        }
    }

    /// Newest-first delivery: points overtake shares and MSETs overtake
    /// EQUALs, exercising the buffering paths.
    fn pump_lifo(&mut self) {
        while let Some((to, msg)) = self.queue.pop_back() {
            self.step(to, msg);
        }
    }

    fn step(&mut self, to: Replica, msg: IVSSMsg) {
        if self.silenced[to - 1] {
            return;
        }
        let mut fx = Effects::new();
        self.engines[to - 1].on_message(msg, &mut fx);
        self.route(to, fx);
    }

    fn sharing_complete(&self, node: Replica, instance: &InstanceId) -> Option<Vec<Replica>> {
        self.events[node - 1].iter().find_map(|event| match event {
            IVSSEvent::SharingComplete {
                instance: id,
                m_set,
                ..
            } if id == instance => Some(m_set.clone()),
            _ => None,
        })
    }

    fn reconstructed(&self, node: Replica, instance: &InstanceId) -> Option<LargeField> {
        self.events[node - 1].iter().find_map(|event| match event {
            IVSSEvent::Reconstructed {
                instance: id,
                secret,
            } if id == instance => Some(secret.clone()),
            _ => None,
        })
    }
}

fn instance() -> InstanceId {
    InstanceId::new(1, 1, 1)
}

#[test]
fn honest_dealer_sharing_and_reconstruction() {
    let mut cluster = Cluster::new(4, 1);
    let id = instance();
    let secret = LargeField::from(42u64);

    cluster.drive(1, |engine, fx| engine.start_sharing(id, secret.clone(), fx));
    cluster.pump();

    for node in 1..=4 {
        let m_set = cluster
            .sharing_complete(node, &id)
            .unwrap_or_else(|| panic!("node {} did not complete sharing", node));
        assert!(m_set.len() >= 3);
    }

    for node in 1..=4 {
        cluster.drive(node, |engine, fx| {
            engine.start_reconstruction(id, fx).unwrap();
        });
    }
    cluster.pump();

    for node in 1..=4 {
        assert_eq!(cluster.reconstructed(node, &id), Some(secret.clone()));
    }
}

#[test]
fn sharing_survives_adversarial_reordering() {
    let mut cluster = Cluster::new(4, 1);
    let id = instance();
    let secret = LargeField::from(42u64);

    cluster.drive(1, |engine, fx| engine.start_sharing(id, secret.clone(), fx));
    cluster.pump_lifo();

    for node in 1..=4 {
        assert!(
            cluster.sharing_complete(node, &id).is_some(),
            "node {} did not complete sharing under reordering",
            node
        );
    }

    for node in 1..=4 {
        cluster.drive(node, |engine, fx| {
            engine.start_reconstruction(id, fx).unwrap();
        });
    }
    cluster.pump_lifo();

    for node in 1..=4 {
        assert_eq!(cluster.reconstructed(node, &id), Some(secret.clone()));
    }
}

#[test]
fn reconstruction_before_sharing_is_an_error() {
    let mut cluster = Cluster::new(4, 1);
    let id = instance();
    cluster.drive(2, |engine, fx| {
        assert!(engine.start_reconstruction(id, fx).is_err());
    });
}

#[test]
fn silent_receiver_does_not_block_the_instance() {
    let mut cluster = Cluster::new(4, 1);
    cluster.silence(4);
    let id = instance();
    let secret = LargeField::from(42u64);

    cluster.drive(1, |engine, fx| engine.start_sharing(id, secret.clone(), fx));
    cluster.pump();

    for node in 1..=3 {
        let m_set = cluster
            .sharing_complete(node, &id)
            .unwrap_or_else(|| panic!("node {} did not complete sharing", node));
        assert_eq!(m_set, vec![1, 2, 3]);
    }
    assert!(cluster.sharing_complete(4, &id).is_none());

    for node in 1..=3 {
        cluster.drive(node, |engine, fx| {
            engine.start_reconstruction(id, fx).unwrap();
        });
    }
    cluster.pump();

    for node in 1..=3 {
        assert_eq!(cluster.reconstructed(node, &id), Some(secret.clone()));
    }
}

#[test]
fn byzantine_reveal_is_excluded_and_flagged() {
    let mut cluster = Cluster::new(4, 1);
    let id = instance();
    let secret = LargeField::from(42u64);

    cluster.drive(1, |engine, fx| engine.start_sharing(id, secret.clone(), fx));
    cluster.pump();
    for node in 1..=4 {
        assert!(cluster.sharing_complete(node, &id).is_some());
    }

    // Node 4 turns Byzantine for reconstruction: it reveals a random
    // polynomial instead of its slice.
    let fake = IVSSPayload::Reveal {
        instance: id,
        sender: 4,
        poly: vec![
            types::poly::field_to_bytes(&rand_field_element()),
            types::poly::field_to_bytes(&rand_field_element()),
        ],
    };
    let fake_msg = ACastMsg::with_uuid(fake.uuid(), fake, 4);
    for peer in 1..=4 {
        cluster
            .queue
            .push_back((peer, IVSSMsg::ACast(fake_msg.clone())));
    }

    for node in 1..=3 {
        cluster.drive(node, |engine, fx| {
            engine.start_reconstruction(id, fx).unwrap();
        });
    }
    cluster.pump();

    for node in 1..=3 {
        assert_eq!(cluster.reconstructed(node, &id), Some(secret.clone()));
    }

    // At least one honest node certified node 4 against an honest peer.
    let flagged_somewhere = (1..=3).any(|node| {
        (1..=3).any(|honest| cluster.certs[node - 1].is_flagged(4, honest))
    });
    assert!(flagged_somewhere, "no honest node flagged the Byzantine pair");
}

/// Forces A-Cast delivery of a payload at one engine with 2t+1 READY votes
/// from distinct senders, scripting a delivery order a live cluster would
/// not reliably produce.
fn force_deliver(
    engine: &mut IVSS,
    payload: IVSSPayload,
    events: &mut Vec<IVSSEvent>,
) {
    use acast::ACastStep;
    let uuid = payload.uuid();
    for from in 1..=3 {
        let mut fx = Effects::new();
        engine.on_message(
            IVSSMsg::ACast(ACastMsg {
                step: ACastStep::Ready,
                uuid: uuid.clone(),
                value: payload.clone(),
                from,
            }),
            &mut fx,
        );
        events.extend(fx.results);
    }
}

/// An MSET delivered ahead of its EQUALs is held pending and completes the
/// sharing only once the last EQUAL verifies it.
#[test]
fn early_m_set_is_held_until_equals_verify_it() {
    let id = instance();
    let cert = Arc::new(Certification::new());
    let mut engine = IVSS::new(2, 4, 1, cert.clone());
    let mut events = Vec::new();

    force_deliver(
        &mut engine,
        IVSSPayload::MSet {
            instance: id,
            members: vec![1, 2, 3],
        },
        &mut events,
    );
    assert!(events.is_empty(), "MSET without EQUALs must stay pending");

    let pairs: Vec<(Replica, Replica)> = vec![(1, 2), (2, 1), (1, 3), (3, 1), (2, 3)];
    for pair in &pairs {
        force_deliver(
            &mut engine,
            IVSSPayload::Equal {
                instance: id,
                pair: *pair,
            },
            &mut events,
        );
    }
    assert!(events.is_empty(), "one EQUAL direction is still missing");

    force_deliver(
        &mut engine,
        IVSSPayload::Equal {
            instance: id,
            pair: (3, 2),
        },
        &mut events,
    );
    match events.as_slice() {
        [IVSSEvent::SharingComplete {
            instance: done,
            m_set,
            ..
        }] => {
            assert_eq!(done, &id);
            assert_eq!(m_set, &vec![1, 2, 3]);
        }
        other => panic!("expected one SharingComplete, got {:?}", other),
    }
    assert_eq!(cert.list_invocations(), vec![id.to_string()]);
}

#[test]
fn replayed_deliveries_emit_no_duplicate_results() {
    let mut cluster = Cluster::new(4, 1);
    let id = instance();
    let secret = LargeField::from(42u64);

    cluster.drive(1, |engine, fx| engine.start_sharing(id, secret.clone(), fx));
    cluster.pump();
    for node in 1..=4 {
        cluster.drive(node, |engine, fx| {
            engine.start_reconstruction(id, fx).unwrap();
        });
    }
    cluster.pump();

    let counts_before: Vec<usize> = (1..=4).map(|n| cluster.events[n - 1].len()).collect();

    // Replay the dealer's sharing and every reconstruction kick-off.
    cluster.drive(1, |engine, fx| engine.start_sharing(id, secret.clone(), fx));
    for node in 1..=4 {
        cluster.drive(node, |engine, fx| {
            engine.start_reconstruction(id, fx).unwrap();
        });
    }
    cluster.pump();

    let counts_after: Vec<usize> = (1..=4).map(|n| cluster.events[n - 1].len()).collect();
    assert_eq!(counts_before, counts_after);
}
