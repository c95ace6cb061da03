use types::poly::{field_from_bytes, field_from_id, field_to_bytes, poly_from_bytes, poly_to_bytes};
use types::{InstanceId, LargeField, LargeFieldSer, Replica, ServiceContext, SymmetricBivariatePoly};

use crate::msg::{IVSSEvent, IVSSMsg, IVSSPayload};
use crate::IVSS;

impl IVSS {
    /// Dealer entry point: sample a symmetric bivariate polynomial with
    /// F(0,0) = secret and send each process its univariate slice.
    pub fn start_sharing(
        &mut self,
        instance: InstanceId,
        secret: LargeField,
        ctx: &mut impl ServiceContext<IVSSMsg, IVSSEvent>,
    ) {
        let bivariate = SymmetricBivariatePoly::random(self.num_faults, secret);
        log::info!(target: "ivss", "[{}] {}: starting sharing as dealer", self.myid, instance);

        for k in 1..=self.num_nodes {
            let slice = bivariate.univariate_slice(k);
            ctx.send(
                k,
                IVSSMsg::Share {
                    instance,
                    to: k,
                    from: self.myid,
                    poly: poly_to_bytes(&slice),
                },
            );
        }
    }

    pub(crate) fn handle_share(
        &mut self,
        instance: InstanceId,
        from: Replica,
        poly: Vec<LargeFieldSer>,
        ctx: &mut impl ServiceContext<IVSSMsg, IVSSEvent>,
    ) {
        if poly.len() != self.num_faults + 1 {
            log::warn!(target: "ivss", "[{}] {}: share with {} coefficients, dropping", self.myid, instance, poly.len());
            return;
        }
        let slice = match poly_from_bytes(&poly) {
            Ok(slice) => slice,
            Err(e) => {
                log::warn!(target: "ivss", "[{}] {}: malformed share from {}: {}", self.myid, instance, from, e);
                return;
            }
        };

        let myid = self.myid;
        let num_nodes = self.num_nodes;
        let early = {
            let inst = self.instance(instance);
            if inst.received_poly.is_some() {
                return;
            }
            inst.received_poly = Some(slice.clone());
            // The sender of the slice is the dealer of this instance.
            inst.dealer = Some(from);
            std::mem::take(&mut inst.early_points)
        };

        // Send point f_k(j) to every process j.
        for j in 1..=num_nodes {
            let value = slice.evaluate(&field_from_id(j));
            ctx.send(
                j,
                IVSSMsg::Point {
                    instance,
                    to: j,
                    from: myid,
                    point: field_to_bytes(&value),
                },
            );
        }

        let mut buffered: Vec<(Replica, LargeField)> = early.into_iter().collect();
        buffered.sort_by_key(|(sender, _)| *sender);
        for (sender, point) in buffered {
            self.process_point(instance, sender, point, ctx);
        }

        // If this node is the dealer, EQUALs may already have been delivered
        // before its own slice arrived; re-run the candidate set once.
        if from == myid {
            self.check_candidate_set(instance, ctx);
        }
    }

    pub(crate) fn handle_point(
        &mut self,
        instance: InstanceId,
        from: Replica,
        point: LargeFieldSer,
        ctx: &mut impl ServiceContext<IVSSMsg, IVSSEvent>,
    ) {
        let point = match field_from_bytes(&point) {
            Ok(point) => point,
            Err(e) => {
                log::warn!(target: "ivss", "[{}] {}: malformed point from {}: {}", self.myid, instance, from, e);
                return;
            }
        };

        let inst = self.instance(instance);
        if inst.received_poly.is_none() {
            inst.early_points.insert(from, point);
            return;
        }
        self.process_point(instance, from, point, ctx);
    }

    /// Compares a received point against this node's slice and A-Casts the
    /// matching EQUAL. A mismatch proves one of the pair is Byzantine; it is
    /// dropped here and surfaces later through the missing EQUAL.
    fn process_point(
        &mut self,
        instance: InstanceId,
        from: Replica,
        point: LargeField,
        ctx: &mut impl ServiceContext<IVSSMsg, IVSSEvent>,
    ) {
        let consistent = {
            let inst = self.instance(instance);
            match &inst.received_poly {
                Some(slice) => slice.evaluate(&field_from_id(from)) == point,
                None => return,
            }
        };

        if consistent {
            self.start_acast(
                IVSSPayload::Equal {
                    instance,
                    pair: (self.myid, from),
                },
                ctx,
            );
        } else {
            log::warn!(target: "ivss", "[{}] {}: inconsistent point from {}", self.myid, instance, from);
        }
    }

    pub(crate) fn handle_equal(
        &mut self,
        instance: InstanceId,
        pair: (Replica, Replica),
        ctx: &mut impl ServiceContext<IVSSMsg, IVSSEvent>,
    ) {
        self.instance(instance).completed_equals.insert(pair);
        self.check_candidate_set(instance, ctx);

        // A pending MSET may verify now that another EQUAL landed.
        let pending = {
            let inst = self.instance(instance);
            if inst.sharing_done {
                return;
            }
            inst.pending_m_set.clone()
        };
        if let Some(members) = pending {
            if self.verify_m_set(&instance, &members) {
                self.complete_sharing(instance, ctx);
            }
        }
    }

    pub(crate) fn handle_m_set(
        &mut self,
        instance: InstanceId,
        members: Vec<Replica>,
        ctx: &mut impl ServiceContext<IVSSMsg, IVSSEvent>,
    ) {
        {
            let inst = self.instance(instance);
            if inst.sharing_done {
                return;
            }
            inst.pending_m_set = Some(members.clone());
        }

        if self.verify_m_set(&instance, &members) {
            self.complete_sharing(instance, ctx);
        } else {
            log::debug!(target: "ivss", "[{}] {}: MSET not yet valid, waiting for EQUALs", self.myid, instance);
        }
    }

    /// Dealer-only: greedy O(n^2) construction of the candidate set. A
    /// candidate joins M iff both EQUALs with every current member are
    /// delivered and the pair is not certified faulty. This is not a
    /// maximum-clique search; correct processes are pairwise consistent by
    /// construction, so the greedy pass reaches n-t under n > 3t.
    pub(crate) fn check_candidate_set(
        &mut self,
        instance: InstanceId,
        ctx: &mut impl ServiceContext<IVSSMsg, IVSSEvent>,
    ) {
        let m_set = {
            let inst = match self.instances_get(&instance) {
                Some(inst) => inst,
                None => return,
            };
            if inst.dealer != Some(self.myid) || inst.sharing_done || inst.sent_m_set {
                return;
            }

            let mut m_set: Vec<Replica> = Vec::new();
            for candidate in 1..=self.num_nodes {
                let compatible = m_set.iter().all(|member| {
                    inst.completed_equals.contains(&(candidate, *member))
                        && inst.completed_equals.contains(&(*member, candidate))
                        && !self.cert.is_flagged(candidate, *member)
                });
                if compatible {
                    m_set.push(candidate);
                }
            }
            m_set
        };

        if m_set.len() >= self.num_nodes - self.num_faults {
            log::info!(target: "ivss", "[{}] {}: candidate set {:?} complete, broadcasting MSET", self.myid, instance, m_set);
            self.instance(instance).sent_m_set = true;
            self.start_acast(IVSSPayload::MSet { instance, members: m_set }, ctx);
        }
    }

    /// Re-verification every node runs on a delivered MSET: size, pairwise
    /// EQUALs in both orders, and no certified pair.
    pub(crate) fn verify_m_set(&self, instance: &InstanceId, members: &[Replica]) -> bool {
        if members.len() < self.num_nodes - self.num_faults {
            return false;
        }
        let inst = match self.instances_get(instance) {
            Some(inst) => inst,
            None => return false,
        };
        for (idx, u) in members.iter().enumerate() {
            for v in members.iter().skip(idx + 1) {
                if !inst.completed_equals.contains(&(*u, *v))
                    || !inst.completed_equals.contains(&(*v, *u))
                {
                    return false;
                }
                if self.cert.is_flagged(*u, *v) {
                    return false;
                }
            }
        }
        true
    }

    fn complete_sharing(
        &mut self,
        instance: InstanceId,
        ctx: &mut impl ServiceContext<IVSSMsg, IVSSEvent>,
    ) {
        let (m_set, share) = {
            let inst = self.instance(instance);
            let members = match inst.pending_m_set.take() {
                Some(members) => members,
                None => return,
            };
            inst.m_set = Some(members.clone());
            inst.sharing_done = true;
            (members, inst.received_poly.clone())
        };

        self.cert.record_invocation(instance.to_string());
        log::info!(target: "ivss", "[{}] {}: sharing complete, M = {:?}", self.myid, instance, m_set);
        ctx.send_result(IVSSEvent::SharingComplete {
            instance,
            m_set,
            share,
        });

        // Reveals may have been delivered before sharing completed locally.
        self.check_interpolation_set(instance, ctx);
    }
}
