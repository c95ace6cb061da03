use crate::Replica;

/// Capability handed to every protocol handler. Outbound messages go to the
/// transport, results go to the layer above. Outer layers adapt inner-layer
/// effects by wrapping messages in their own envelope and translating
/// results into their own handler calls.
pub trait ServiceContext<M, R> {
    fn send(&mut self, to: Replica, msg: M);
    fn broadcast(&mut self, msg: M);
    fn send_result(&mut self, res: R);
}

/// Effect buffer: collects a handler's outputs so the caller can translate
/// them after the inner handler returns. Handlers never block on I/O.
#[derive(Debug)]
pub struct Effects<M, R> {
    pub unicasts: Vec<(Replica, M)>,
    pub broadcasts: Vec<M>,
    pub results: Vec<R>,
}

impl<M, R> Effects<M, R> {
    pub fn new() -> Effects<M, R> {
        Effects {
            unicasts: Vec::new(),
            broadcasts: Vec::new(),
            results: Vec::new(),
        }
    }
}

impl<M, R> Default for Effects<M, R> {
    fn default() -> Effects<M, R> {
        Effects::new()
    }
}

impl<M, R> ServiceContext<M, R> for Effects<M, R> {
    fn send(&mut self, to: Replica, msg: M) {
        self.unicasts.push((to, msg));
    }

    fn broadcast(&mut self, msg: M) {
        self.broadcasts.push(msg);
    }

    fn send_result(&mut self, res: R) {
        self.results.push(res);
    }
}
