use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use acast::{ACast, ACastMsg};
use ivss::{IVSSEvent, IVSSMsg, IVSS};
use types::poly::{rand_field_element, reduce_mod_small};
use types::{Certification, Effects, InstanceId, LargeField, Replica, Round, ServiceContext};

use crate::msg::{ICCMsg, ICCPayload, ICCResult};

/// Inferable Common Coin for one round. Every node deals n IVSS secrets,
/// the T/A/S/H set exchange pins down a common core of completed dealers,
/// and the reconstructed secrets collapse to a single bit mod u.
pub struct ICC {
    myid: Replica,
    num_nodes: usize,
    num_faults: usize,
    round: Round,
    /// Coin modulus u = ceil(0.87 * n).
    coin_modulus: u64,

    ivss: IVSS,
    acast: ACast<ICCPayload>,

    /// dealer -> secret indices whose sharing completed locally.
    completed_secrets: HashMap<Replica, HashSet<usize>>,
    my_t: Option<Vec<Replica>>,
    my_a: Option<Vec<Replica>>,
    my_s: Option<Vec<Replica>>,
    my_h: Option<Vec<Replica>>,
    received_t: HashMap<Replica, Vec<Replica>>,
    received_a: HashMap<Replica, Vec<Replica>>,
    received_final_sets: Vec<(Replica, Vec<Replica>, Vec<Replica>)>,
    /// dealer -> secret index -> reconstructed value.
    reconstructed_values: HashMap<Replica, HashMap<usize, LargeField>>,
    finished: bool,
}

impl ICC {
    pub fn new(
        myid: Replica,
        num_nodes: usize,
        num_faults: usize,
        round: Round,
        cert: Arc<Certification>,
    ) -> ICC {
        let coin_modulus = (0.87f64 * num_nodes as f64).ceil() as u64;
        ICC {
            myid,
            num_nodes,
            num_faults,
            round,
            coin_modulus,
            ivss: IVSS::new(myid, num_nodes, num_faults, cert),
            acast: ACast::new(myid, num_nodes, num_faults),
            completed_secrets: HashMap::new(),
            my_t: None,
            my_a: None,
            my_s: None,
            my_h: None,
            received_t: HashMap::new(),
            received_a: HashMap::new(),
            received_final_sets: Vec::new(),
            reconstructed_values: HashMap::new(),
            finished: false,
        }
    }

    /// Deals n fresh random secrets, one IVSS instance per secret index.
    pub fn start(&mut self, ctx: &mut impl ServiceContext<ICCMsg, ICCResult>) {
        log::info!(target: "icc", "[{}] round {}: starting coin protocol", self.myid, self.round);
        let myid = self.myid;
        let round = self.round;
        for secret_idx in 1..=self.num_nodes {
            let secret = rand_field_element();
            let instance = InstanceId::new(round, myid, secret_idx);
            self.drive_ivss(ctx, |ivss, fx| ivss.start_sharing(instance, secret, fx));
        }
    }

    pub fn on_message(
        &mut self,
        msg: ICCMsg,
        ctx: &mut impl ServiceContext<ICCMsg, ICCResult>,
    ) {
        if self.finished {
            return;
        }
        match msg {
            ICCMsg::Ivss(inner) => {
                self.drive_ivss(ctx, |ivss, fx| ivss.on_message(inner, fx));
            }
            ICCMsg::ACast(acast_msg) => self.handle_acast(acast_msg, ctx),
        }
        self.check_progress(ctx);
    }

    /// Runs a closure against the embedded IVSS engine and translates its
    /// effects into ICC envelopes and event handling.
    fn drive_ivss<T>(
        &mut self,
        ctx: &mut impl ServiceContext<ICCMsg, ICCResult>,
        action: impl FnOnce(&mut IVSS, &mut Effects<IVSSMsg, IVSSEvent>) -> T,
    ) -> T {
        let mut fx = Effects::new();
        let out = action(&mut self.ivss, &mut fx);
        for (to, msg) in fx.unicasts {
            ctx.send(to, ICCMsg::Ivss(msg));
        }
        for msg in fx.broadcasts {
            ctx.broadcast(ICCMsg::Ivss(msg));
        }
        for event in fx.results {
            self.handle_ivss_event(event, ctx);
        }
        out
    }

    fn handle_acast(
        &mut self,
        msg: ACastMsg<ICCPayload>,
        ctx: &mut impl ServiceContext<ICCMsg, ICCResult>,
    ) {
        let mut fx = Effects::new();
        self.acast.on_message(msg, &mut fx);
        for out in fx.broadcasts {
            ctx.broadcast(ICCMsg::ACast(out));
        }
        for payload in fx.results {
            self.process_delivered_payload(payload, ctx);
        }
    }

    fn start_acast(
        &mut self,
        payload: ICCPayload,
        ctx: &mut impl ServiceContext<ICCMsg, ICCResult>,
    ) {
        let msg = ACastMsg::initial(payload, self.myid);
        ctx.broadcast(ICCMsg::ACast(msg.clone()));
        self.handle_acast(msg, ctx);
    }

    fn handle_ivss_event(
        &mut self,
        event: IVSSEvent,
        ctx: &mut impl ServiceContext<ICCMsg, ICCResult>,
    ) {
        match event {
            IVSSEvent::SharingComplete { instance, .. } => {
                if instance.round != self.round {
                    return;
                }
                let completed = self.completed_secrets.entry(instance.dealer).or_default();
                completed.insert(instance.secret_idx);
                log::debug!(target: "icc", "[{}] round {}: dealer {} has {} completed secrets", self.myid, self.round, instance.dealer, completed.len());
            }
            IVSSEvent::Reconstructed { instance, secret } => {
                if instance.round != self.round {
                    return;
                }
                self.reconstructed_values
                    .entry(instance.dealer)
                    .or_default()
                    .insert(instance.secret_idx, secret);
            }
        }
        self.check_progress(ctx);
    }

    fn process_delivered_payload(
        &mut self,
        payload: ICCPayload,
        ctx: &mut impl ServiceContext<ICCMsg, ICCResult>,
    ) {
        match payload {
            ICCPayload::Attach { sender, set_t } => {
                self.received_t.insert(sender, set_t);
            }
            ICCPayload::Accept { sender, set_a } => {
                self.received_a.insert(sender, set_a);
            }
            ICCPayload::FinalSets {
                sender,
                set_h,
                set_s,
            } => {
                self.received_final_sets.push((sender, set_h, set_s));
            }
        }
        self.check_progress(ctx);
    }

    fn check_progress(&mut self, ctx: &mut impl ServiceContext<ICCMsg, ICCResult>) {
        let threshold = self.num_nodes - self.num_faults;

        // Attach: T = dealers with all n sharings completed locally.
        if self.my_t.is_none() {
            let mut t_set: Vec<Replica> = self
                .completed_secrets
                .iter()
                .filter(|(_, indices)| indices.len() == self.num_nodes)
                .map(|(dealer, _)| *dealer)
                .collect();
            if t_set.len() >= threshold {
                t_set.sort_unstable();
                self.my_t = Some(t_set.clone());
                log::info!(target: "icc", "[{}] round {}: broadcasting Attach, T = {:?}", self.myid, self.round, t_set);
                self.start_acast(
                    ICCPayload::Attach {
                        sender: self.myid,
                        set_t: t_set,
                    },
                    ctx,
                );
            }
        }

        // Accept: A = senders whose attached T is covered by mine.
        if self.my_a.is_none() {
            if let Some(my_t) = self.my_t.clone() {
                let mut a_set: Vec<Replica> = self
                    .received_t
                    .iter()
                    .filter(|(_, t_j)| is_subset(t_j, &my_t))
                    .map(|(j, _)| *j)
                    .collect();
                if a_set.len() >= threshold {
                    a_set.sort_unstable();
                    self.my_a = Some(a_set.clone());
                    log::info!(target: "icc", "[{}] round {}: broadcasting Accept, A = {:?}", self.myid, self.round, a_set);
                    self.start_acast(
                        ICCPayload::Accept {
                            sender: self.myid,
                            set_a: a_set,
                        },
                        ctx,
                    );
                }
            }
        }

        // Final sets: S = senders whose accepted A is covered by mine;
        // H snapshots A. Reveals start for every secret the sets require.
        if self.my_s.is_none() {
            if let Some(my_a) = self.my_a.clone() {
                let mut s_set: Vec<Replica> = self
                    .received_a
                    .iter()
                    .filter(|(_, a_j)| is_subset(a_j, &my_a))
                    .map(|(j, _)| *j)
                    .collect();
                if s_set.len() >= threshold {
                    s_set.sort_unstable();
                    self.my_s = Some(s_set.clone());
                    self.my_h = Some(my_a.clone());
                    log::info!(target: "icc", "[{}] round {}: broadcasting FinalSets, H = {:?}, S = {:?}", self.myid, self.round, my_a, s_set);
                    self.start_acast(
                        ICCPayload::FinalSets {
                            sender: self.myid,
                            set_h: my_a,
                            set_s: s_set,
                        },
                        ctx,
                    );
                    self.start_reconstruction(ctx);
                }
            }
        }

        self.check_decision(ctx);
    }

    /// Participate in reconstruction of x_{k,j} for every j in A_i and
    /// k in T_j. Membership of j in A_i guarantees those sharings already
    /// completed locally, so a precondition failure here is a bug.
    fn start_reconstruction(&mut self, ctx: &mut impl ServiceContext<ICCMsg, ICCResult>) {
        let my_a = match &self.my_a {
            Some(my_a) => my_a.clone(),
            None => return,
        };
        for j in my_a {
            let t_j = match self.received_t.get(&j) {
                Some(t_j) => t_j.clone(),
                None => continue,
            };
            for k in t_j {
                let instance = InstanceId::new(self.round, k, j);
                let status =
                    self.drive_ivss(ctx, |ivss, fx| ivss.start_reconstruction(instance, fx));
                if let Err(e) = status {
                    log::error!(target: "icc", "[{}] round {}: reconstruction of {} refused: {}", self.myid, self.round, instance, e);
                }
            }
        }
    }

    /// Runs whenever a FinalSets pair lands or a value is reconstructed.
    /// The first (H, S) pair covered by our own sets and fully reconstructed
    /// decides the coin.
    fn check_decision(&mut self, ctx: &mut impl ServiceContext<ICCMsg, ICCResult>) {
        if self.finished {
            return;
        }
        let (my_a, my_s) = match (&self.my_a, &self.my_s) {
            (Some(my_a), Some(my_s)) => (my_a, my_s),
            _ => return,
        };

        let mut decided_coin: Option<u8> = None;
        for (_, set_h, set_s) in &self.received_final_sets {
            if !is_subset(set_h, my_a) || !is_subset(set_s, my_s) {
                continue;
            }

            let mut all_computed = true;
            let mut has_zero = false;
            for j in set_h {
                let t_j = match self.received_t.get(j) {
                    Some(t_j) => t_j,
                    None => {
                        all_computed = false;
                        break;
                    }
                };

                // v_j = (sum over k in T_j of x_{k,j}) mod u, as an integer
                // sum: reduce each summand and accumulate mod u.
                let mut v_j: u64 = 0;
                let mut complete = true;
                for k in t_j {
                    match self.reconstructed_values.get(k).and_then(|m| m.get(j)) {
                        Some(value) => {
                            v_j = (v_j + reduce_mod_small(value, self.coin_modulus))
                                % self.coin_modulus;
                        }
                        None => {
                            complete = false;
                            break;
                        }
                    }
                }
                if !complete {
                    all_computed = false;
                    break;
                }
                if v_j == 0 {
                    has_zero = true;
                }
            }

            if all_computed {
                decided_coin = Some(if has_zero { 0 } else { 1 });
                break;
            }
        }

        if let Some(coin) = decided_coin {
            self.finished = true;
            log::info!(target: "icc", "[{}] round {}: coin = {}", self.myid, self.round, coin);
            ctx.send_result(ICCResult { coin });
        }
    }
}

fn is_subset(sub: &[Replica], superset: &[Replica]) -> bool {
    let superset: HashSet<Replica> = superset.iter().copied().collect();
    sub.iter().all(|id| superset.contains(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Cluster {
        engines: Vec<ICC>,
        queue: VecDeque<(Replica, ICCMsg)>,
        coins: Vec<Vec<u8>>,
        silenced: Vec<bool>,
        num_nodes: usize,
    }

    impl Cluster {
        fn new(num_nodes: usize, num_faults: usize, round: Round) -> Cluster {
            Cluster {
                engines: (1..=num_nodes)
                    .map(|id| {
                        ICC::new(
                            id,
                            num_nodes,
                            num_faults,
                            round,
                            Arc::new(Certification::new()),
                        )
                    })
                    .collect(),
                queue: VecDeque::new(),
                coins: vec![Vec::new(); num_nodes],
                silenced: vec![false; num_nodes],
                num_nodes,
            }
        }

        fn route(&mut self, node: Replica, fx: Effects<ICCMsg, ICCResult>) {
            for (to, msg) in fx.unicasts {
                self.queue.push_back((to, msg));
            }
            for msg in fx.broadcasts {
                for peer in 1..=self.num_nodes {
                    self.queue.push_back((peer, msg.clone()));
                }
            }
            for result in fx.results {
                self.coins[node - 1].push(result.coin);
            }
        }

        fn start_all(&mut self) {
            for node in 1..=self.num_nodes {
                if self.silenced[node - 1] {
                    continue;
                }
                let mut fx = Effects::new();
                self.engines[node - 1].start(&mut fx);
                self.route(node, fx);
            }
        }

        fn pump(&mut self) {
            while let Some((to, msg)) = self.queue.pop_front() {
                if self.silenced[to - 1] {
                    continue;
                }
                let mut fx = Effects::new();
                self.engines[to - 1].on_message(msg, &mut fx);
                self.route(to, fx);
            }
        }
    }

    #[test]
    fn all_nodes_agree_on_the_coin_small() {
        let mut cluster = Cluster::new(4, 1, 1);
        cluster.start_all();
        cluster.pump();

        let first = cluster.coins[0].first().copied().expect("node 1 has no coin");
        for node in 1..=4 {
            assert_eq!(
                cluster.coins[node - 1],
                vec![first],
                "node {} disagrees or emitted twice",
                node
            );
        }
        assert!(first <= 1);
    }

    #[test]
    fn all_nodes_agree_on_the_coin_seven_nodes() {
        let mut cluster = Cluster::new(7, 2, 1);
        cluster.start_all();
        cluster.pump();

        let first = cluster.coins[0].first().copied().expect("node 1 has no coin");
        for node in 1..=7 {
            assert_eq!(cluster.coins[node - 1], vec![first], "node {} disagrees", node);
        }
    }

    /// A halted node neither deals nor participates; the other n-t still
    /// agree on a coin without it.
    #[test]
    fn silent_node_does_not_block_the_coin() {
        let mut cluster = Cluster::new(4, 1, 1);
        cluster.silenced[3] = true;
        cluster.start_all();
        cluster.pump();

        let first = cluster.coins[0].first().copied().expect("node 1 has no coin");
        for node in 1..=3 {
            assert_eq!(cluster.coins[node - 1], vec![first], "node {} disagrees", node);
        }
        assert!(cluster.coins[3].is_empty());
    }

    #[test]
    fn traffic_after_the_coin_is_ignored() {
        let mut cluster = Cluster::new(4, 1, 1);
        cluster.start_all();
        cluster.pump();
        for node in 1..=4 {
            assert_eq!(cluster.coins[node - 1].len(), 1);
        }

        // Replay the whole protocol; every engine is finished and latched.
        cluster.start_all();
        cluster.pump();
        for node in 1..=4 {
            assert_eq!(cluster.coins[node - 1].len(), 1);
        }
    }
}
