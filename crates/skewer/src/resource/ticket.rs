use uuid::Uuid;

/// # QueuingTicket
///
/// A claim on one turn of one slot of a [`SlotPool`](super::SlotPool).
///
/// Tickets are handed out by [`SlotPool::pick_up_ticket`](super::SlotPool::pick_up_ticket)
/// without waiting, and redeemed later (possibly on another thread) with
/// [`SlotPool::wait_resource_by_ticket`](super::SlotPool::wait_resource_by_ticket).
///
/// The type is neither `Clone` nor `Copy`: redemption takes the ticket by
/// value, so a ticket can be redeemed at most once.
///
/// ## Identity
///
/// * `pool` - identifier of the issuing pool; tickets are rejected by any other pool
/// * `slot` - index of the slot inside the pool
/// * `generation` - which occupancy of that slot the ticket belongs to
/// * `reserved` - whether the issuer announced that more objects follow for the same turn
#[derive(Debug, PartialEq, Eq)]
pub struct QueuingTicket {
    pub(crate) pool: Uuid,
    pub(crate) slot: usize,
    pub(crate) generation: u64,
    pub(crate) reserved: bool,
}

impl QueuingTicket {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_reserved(&self) -> bool {
        self.reserved
    }
}
