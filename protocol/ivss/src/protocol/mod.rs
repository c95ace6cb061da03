use std::collections::HashMap;
use std::sync::Arc;

use acast::{ACast, ACastMsg};
use types::{Certification, Effects, InstanceId, Replica, ServiceContext};

use crate::msg::{IVSSEvent, IVSSMsg, IVSSPayload};

mod state;
use state::IVSSInstance;

mod sharing;
mod reconstruction;

#[cfg(test)]
mod tests;

/// Inferable Verifiable Secret Sharing. One engine handles every instance a
/// node participates in; instances are keyed by `InstanceId` and created on
/// first touch.
pub struct IVSS {
    myid: Replica,
    num_nodes: usize,
    num_faults: usize,
    acast: ACast<IVSSPayload>,
    cert: Arc<Certification>,
    instances: HashMap<InstanceId, IVSSInstance>,
}

impl IVSS {
    pub fn new(
        myid: Replica,
        num_nodes: usize,
        num_faults: usize,
        cert: Arc<Certification>,
    ) -> IVSS {
        IVSS {
            myid,
            num_nodes,
            num_faults,
            acast: ACast::new(myid, num_nodes, num_faults),
            cert,
            instances: HashMap::new(),
        }
    }

    pub fn on_message(
        &mut self,
        msg: IVSSMsg,
        ctx: &mut impl ServiceContext<IVSSMsg, IVSSEvent>,
    ) {
        match msg {
            IVSSMsg::Share {
                instance,
                to,
                from,
                poly,
            } => {
                if to != self.myid {
                    log::warn!(target: "ivss", "[{}] {}: share addressed to {}, dropping", self.myid, instance, to);
                    return;
                }
                self.handle_share(instance, from, poly, ctx);
            }
            IVSSMsg::Point {
                instance,
                to,
                from,
                point,
            } => {
                if to != self.myid {
                    log::warn!(target: "ivss", "[{}] {}: point addressed to {}, dropping", self.myid, instance, to);
                    return;
                }
                self.handle_point(instance, from, point, ctx);
            }
            IVSSMsg::ACast(acast_msg) => self.handle_acast(acast_msg, ctx),
        }
    }

    /// Runs the embedded A-Cast engine and translates its effects:
    /// broadcasts are re-wrapped, deliveries feed the payload handlers.
    fn handle_acast(
        &mut self,
        msg: ACastMsg<IVSSPayload>,
        ctx: &mut impl ServiceContext<IVSSMsg, IVSSEvent>,
    ) {
        let mut fx = Effects::new();
        self.acast.on_message(msg, &mut fx);
        for out in fx.broadcasts {
            ctx.broadcast(IVSSMsg::ACast(out));
        }
        for payload in fx.results {
            self.on_acast_delivered(payload, ctx);
        }
    }

    /// Initiates an A-Cast of an IVSS payload: broadcast the MSG to all and
    /// run it through the local engine as well.
    pub(crate) fn start_acast(
        &mut self,
        payload: IVSSPayload,
        ctx: &mut impl ServiceContext<IVSSMsg, IVSSEvent>,
    ) {
        let msg = ACastMsg::with_uuid(payload.uuid(), payload, self.myid);
        ctx.broadcast(IVSSMsg::ACast(msg.clone()));
        self.handle_acast(msg, ctx);
    }

    fn on_acast_delivered(
        &mut self,
        payload: IVSSPayload,
        ctx: &mut impl ServiceContext<IVSSMsg, IVSSEvent>,
    ) {
        match payload {
            IVSSPayload::Equal { instance, pair } => self.handle_equal(instance, pair, ctx),
            IVSSPayload::MSet { instance, members } => self.handle_m_set(instance, members, ctx),
            IVSSPayload::Reveal {
                instance,
                sender,
                poly,
            } => self.handle_reveal(instance, sender, poly, ctx),
            IVSSPayload::Ready { instance, sender } => self.handle_ready(instance, sender, ctx),
        }
    }

    pub(crate) fn instance(&mut self, id: InstanceId) -> &mut IVSSInstance {
        self.instances.entry(id).or_default()
    }

    pub(crate) fn instances_get(&self, id: &InstanceId) -> Option<&IVSSInstance> {
        self.instances.get(id)
    }
}
