//! # Resource Slot Pool
//!
//! A bounded pool of reusable slot values shared by concurrent producers.
//!
//! ## Protocol
//!
//! 1. [`SlotPool::pick_up_ticket`] hands out a [`QueuingTicket`] immediately.
//!    Passing `reserve = true` says more objects of the same batch follow, so
//!    the pool keeps the current slot; `reserve = false` closes the batch and
//!    rotates to the next slot.
//! 2. [`SlotPool::wait_resource_by_ticket`] suspends until the slot the ticket
//!    names is actually writable for the ticket's generation.
//! 3. [`SlotPool::dealing_done`] reports that the write finished. When every
//!    ticket of a closed batch has reported, the slot is handed to the
//!    consumer or recycled. A holder that failed reports with
//!    [`SlotPool::abandon`] instead, and the batch is recycled unseen.
//!
//! ## Slot values
//!
//! * [`BatchBuffers`] of [`HostBatchBuffer`] or [`DeviceBatchBuffer`] - one
//!   destination buffer per model input
//! * [`RcOpSlot`] - a stateful resize-convert operator

mod buffer;
mod pool;
mod rcop;
mod ticket;

use std::fmt::Debug;
use crate::error::Result;

pub use buffer::{align_up, BatchBuffers, DeviceBatchBuffer, HostBatchBuffer};
pub use pool::{FilledSlot, FilledSlots, PoolSnapshot, SlotPhase, SlotPool, SlotSnapshot, SlotView};
pub use rcop::RcOpSlot;
pub use ticket::QueuingTicket;

/// A value that can live in a [`SlotPool`].
///
/// Slot values are shared between every task writing into the same batch,
/// so any mutation must go through interior mutability.
pub trait SlotResource: Send + Sync + 'static {
    /// Parameters applied once by [`SlotPool::init`].
    type Params: Clone + PartialEq + Debug + Send + Sync + 'static;

    /// Applies the pool-wide parameters to this slot.
    fn configure(&self, params: &Self::Params) -> Result<()>;
}
