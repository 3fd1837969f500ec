use super::{BoxDelivery, Delivery};
use crate::models::Disposition;
use crate::Result;
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledDelivery {
    pub id: u64,
    pub body: Vec<u8>,
    pub disposition: Disposition,
}

/// Shared record of every disposition issued by [`MockDelivery`]s.
#[derive(Clone, Default)]
pub struct DispositionLog {
    settled: Arc<Mutex<Vec<SettledDelivery>>>,
}

impl DispositionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivery(&self, id: u64, body: impl Into<Vec<u8>>) -> BoxDelivery {
        Box::new(MockDelivery {
            id,
            body: body.into(),
            log: self.clone(),
        })
    }

    pub fn settled(&self) -> Vec<SettledDelivery> {
        self.settled.lock().unwrap().clone()
    }

    pub fn dispositions_of(&self, id: u64) -> Vec<Disposition> {
        self.settled
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.id == id)
            .map(|s| s.disposition)
            .collect()
    }
}

pub struct MockDelivery {
    id: u64,
    body: Vec<u8>,
    log: DispositionLog,
}

impl Delivery for MockDelivery {
    fn body(&self) -> &[u8] {
        &self.body
    }

    fn settle(self: Box<Self>, disposition: Disposition) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            let this = *self;
            this.log.settled.lock().unwrap().push(SettledDelivery {
                id: this.id,
                body: this.body,
                disposition,
            });
            Ok(())
        })
    }
}
