use anyhow::{bail, Result};
use types::poly::{field_from_id, interpolate_at_zero, poly_from_bytes, poly_to_bytes};
use types::{InstanceId, LargeField, LargeFieldSer, Replica, ServiceContext};

use crate::msg::{IVSSEvent, IVSSMsg, IVSSPayload};
use crate::IVSS;

impl IVSS {
    /// Reconstruction entry point, triggered by the enclosing protocol.
    /// Members of M reveal their stored slice; everyone else observes.
    /// Calling this before sharing has completed locally is a caller bug.
    pub fn start_reconstruction(
        &mut self,
        instance: InstanceId,
        ctx: &mut impl ServiceContext<IVSSMsg, IVSSEvent>,
    ) -> Result<()> {
        let reveal = {
            let inst = match self.instances_get(&instance) {
                Some(inst) if inst.sharing_done => inst,
                _ => bail!("sharing not completed for instance {}", instance),
            };
            let m_set = inst.m_set.as_ref().expect("sharing done without M set");
            if !m_set.contains(&self.myid) {
                log::info!(target: "ivss", "[{}] {}: not in M, observing reconstruction", self.myid, instance);
                None
            } else {
                match &inst.received_poly {
                    Some(slice) => Some(poly_to_bytes(slice)),
                    None => bail!("in M for instance {} but holding no slice", instance),
                }
            }
        };

        if let Some(poly) = reveal {
            self.start_acast(
                IVSSPayload::Reveal {
                    instance,
                    sender: self.myid,
                    poly,
                },
                ctx,
            );
        }
        Ok(())
    }

    pub(crate) fn handle_reveal(
        &mut self,
        instance: InstanceId,
        sender: Replica,
        poly: Vec<LargeFieldSer>,
        ctx: &mut impl ServiceContext<IVSSMsg, IVSSEvent>,
    ) {
        if poly.len() != self.num_faults + 1 {
            log::warn!(target: "ivss", "[{}] {}: reveal from {} with {} coefficients, dropping", self.myid, instance, sender, poly.len());
            return;
        }
        let revealed = match poly_from_bytes(&poly) {
            Ok(revealed) => revealed,
            Err(e) => {
                log::warn!(target: "ivss", "[{}] {}: malformed reveal from {}: {}", self.myid, instance, sender, e);
                return;
            }
        };

        self.instance(instance).revealed_polys.insert(sender, revealed);
        self.check_interpolation_set(instance, ctx);
    }

    /// Greedy O(n^2) interpolation-set construction over revealed slices
    /// from members of M. A slice joins IS iff it is symmetric-consistent
    /// with every slice already in IS; a failed check certifies the pair as
    /// faulty. With n-2t consistent slices the secret interpolates at zero.
    pub(crate) fn check_interpolation_set(
        &mut self,
        instance: InstanceId,
        ctx: &mut impl ServiceContext<IVSSMsg, IVSSEvent>,
    ) {
        let target = std::cmp::max(1, self.num_nodes.saturating_sub(2 * self.num_faults));

        let (interpolation_set, flagged, secret) = {
            let inst = match self.instances_get(&instance) {
                Some(inst) => inst,
                None => return,
            };
            let m_set = match &inst.m_set {
                Some(m_set) => m_set,
                None => return,
            };

            let mut candidates: Vec<Replica> = inst
                .revealed_polys
                .keys()
                .filter(|id| m_set.contains(id))
                .copied()
                .collect();
            if candidates.len() < self.num_nodes - 2 * self.num_faults {
                return;
            }
            candidates.sort_unstable();

            let mut interpolation_set: Vec<Replica> = Vec::new();
            let mut flagged: Vec<(Replica, Replica)> = Vec::new();
            for candidate in candidates {
                let poly_c = &inst.revealed_polys[&candidate];
                let mut compatible = true;
                for member in &interpolation_set {
                    let poly_m = &inst.revealed_polys[member];
                    if poly_c.evaluate(&field_from_id(*member))
                        != poly_m.evaluate(&field_from_id(candidate))
                    {
                        // P_c(m) != P_m(c): at least one of the pair lied.
                        flagged.push((candidate, *member));
                        compatible = false;
                        break;
                    }
                }
                if compatible {
                    interpolation_set.push(candidate);
                }
            }

            if interpolation_set.len() < target {
                (interpolation_set, flagged, None)
            } else {
                let points: Vec<LargeField> = interpolation_set
                    .iter()
                    .map(|id| field_from_id(*id))
                    .collect();
                let values: Vec<LargeField> = interpolation_set
                    .iter()
                    .map(|id| inst.revealed_polys[id].evaluate(&LargeField::zero()))
                    .collect();
                match interpolate_at_zero(&points, &values) {
                    Ok(secret) => (interpolation_set, flagged, Some(secret)),
                    Err(e) => {
                        log::error!(target: "ivss", "[{}] {}: interpolation failed: {}", self.myid, instance, e);
                        (interpolation_set, flagged, None)
                    }
                }
            }
        };

        for (u, v) in flagged {
            self.cert.flag(u, v);
        }

        let secret = match secret {
            Some(secret) => secret,
            None => return,
        };

        log::info!(target: "ivss", "[{}] {}: interpolation set {:?} yields the secret", self.myid, instance, interpolation_set);
        self.instance(instance).secret = Some(secret);
        self.start_acast(
            IVSSPayload::Ready {
                instance,
                sender: self.myid,
            },
            ctx,
        );
        self.maybe_emit_reconstructed(instance, ctx);
    }

    pub(crate) fn handle_ready(
        &mut self,
        instance: InstanceId,
        sender: Replica,
        ctx: &mut impl ServiceContext<IVSSMsg, IVSSEvent>,
    ) {
        self.instance(instance).ready_from.insert(sender);
        self.maybe_emit_reconstructed(instance, ctx);
    }

    /// Emits the reconstruction result once n-t READYs are in and the local
    /// secret is interpolated; re-checked from both trigger sites.
    fn maybe_emit_reconstructed(
        &mut self,
        instance: InstanceId,
        ctx: &mut impl ServiceContext<IVSSMsg, IVSSEvent>,
    ) {
        let ready_threshold = self.num_nodes - self.num_faults;
        let myid = self.myid;
        let inst = self.instance(instance);
        if inst.reconstructed || inst.ready_from.len() < ready_threshold {
            return;
        }
        let secret = match &inst.secret {
            Some(secret) => secret.clone(),
            None => {
                log::debug!(target: "ivss", "[{}] {}: ready threshold met, waiting for local secret", myid, instance);
                return;
            }
        };
        inst.reconstructed = true;
        log::info!(target: "ivss", "[{}] {}: reconstruction complete", myid, instance);
        ctx.send_result(IVSSEvent::Reconstructed { instance, secret });
    }
}
