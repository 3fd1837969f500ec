//! Queue deliveries and their terminal dispositions
//!
//! A [`Delivery`] is settled by value, so the compiler guarantees a single
//! ack or nack per message.

pub mod amqp;
pub mod mock;

pub use amqp::{AmqpDelivery, AmqpSource};
pub use mock::{DispositionLog, MockDelivery, SettledDelivery};

use crate::models::Disposition;
use crate::Result;
use futures::future::BoxFuture;

pub trait Delivery: Send {
    fn body(&self) -> &[u8];

    /// Issues the terminal disposition for this delivery.
    fn settle(self: Box<Self>, disposition: Disposition) -> BoxFuture<'static, Result<()>>;
}

pub type BoxDelivery = Box<dyn Delivery>;
