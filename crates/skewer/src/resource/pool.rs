use std::collections::VecDeque;
use std::fmt;
use std::pin::{pin, Pin};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;
use crate::error::{BatchingError, Result};
use super::{QueuingTicket, SlotResource};

/// One occupancy of a slot. Every ticket issued while the turn was open
/// counts as a holder.
#[derive(Debug)]
struct Turn {
    generation: u64,
    holders: u32,
    redeemed: u32,
    done: u32,
    sealed: bool,
    /// A holder failed; the batch is recycled instead of handed off.
    abandoned: bool,
}

impl Turn {
    fn open(generation: u64) -> Self {
        Self { generation, holders: 0, redeemed: 0, done: 0, sealed: false, abandoned: false }
    }

    fn join(&mut self, reserve: bool) {
        self.holders += 1;
        if !reserve {
            self.sealed = true;
        }
    }

    fn is_complete(&self) -> bool {
        self.sealed && self.done == self.holders
    }
}

#[derive(Debug, Default)]
struct SlotState {
    /// Front turn is the one allowed to write; the rest wait their turn.
    turns: VecDeque<Turn>,
    next_generation: u64,
    /// The front turn is complete and owned by the consumer.
    draining: bool,
}

struct PoolState<P> {
    params: Option<P>,
    cursor: usize,
    slots: Vec<SlotState>,
}

struct PoolInner<V: SlotResource> {
    id: Uuid,
    values: Vec<Arc<V>>,
    state: Mutex<PoolState<V::Params>>,
    /// One notifier per slot, signalled whenever the slot's front turn retires.
    wakers: Vec<Notify>,
    handoff: Option<mpsc::UnboundedSender<FilledSlot<V>>>,
}

impl<V: SlotResource> PoolInner<V> {
    fn release(&self, slot_idx: usize, generation: u64) {
        {
            let mut state = self.state.lock();
            let slot = &mut state.slots[slot_idx];
            let retiring = matches!(slot.turns.front(), Some(t) if t.generation == generation);
            if !retiring || !slot.draining {
                warn!(slot = slot_idx, generation, "released a slot that was not draining");
                return;
            }
            slot.turns.pop_front();
            slot.draining = false;
            debug!(slot = slot_idx, generation, "consumer released slot");
        }
        self.wakers[slot_idx].notify_waiters();
    }
}

/// Lifecycle phase of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPhase {
    /// No turn is queued.
    Idle,
    /// The front turn accepts writers.
    Filling,
    /// The front turn is complete and held by the consumer.
    Draining,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSnapshot {
    pub phase: SlotPhase,
    pub in_flight: u32,
    pub queued_turns: usize,
}

/// Point-in-time view of the pool's bookkeeping. Generation counters are
/// deliberately left out so two snapshots compare equal across full cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub cursor: usize,
    pub slots: Vec<SlotSnapshot>,
}

/// # SlotPool
///
/// A fixed-size circular pool of slot values with a ticketing protocol.
///
/// Producers call [`pick_up_ticket`](Self::pick_up_ticket) in arrival order.
/// Tickets picked up with `reserve = true` share the current slot's open turn;
/// the first ticket picked up with `reserve = false` seals the turn and moves
/// the cursor to the next slot. Issuing a ticket never waits.
///
/// Redeeming a ticket with [`wait_resource_by_ticket`](Self::wait_resource_by_ticket)
/// suspends until the ticket's turn reaches the front of its slot. Each
/// successful redemption must be paired with one
/// [`dealing_done`](Self::dealing_done). Once a sealed turn has every holder
/// done, the slot is either handed to the consumer (see
/// [`with_consumer`](Self::with_consumer)) or recycled immediately.
///
/// Cloning a `SlotPool` yields another handle to the same pool.
pub struct SlotPool<V: SlotResource> {
    inner: Arc<PoolInner<V>>,
}

impl<V: SlotResource> Clone for SlotPool<V> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<V: SlotResource> SlotPool<V> {
    /// Creates a pool that recycles a slot as soon as its batch is complete.
    ///
    /// # Errors
    ///
    /// Returns [`BatchingError::InvalidConfig`] if `values` is empty.
    pub fn new(values: Vec<V>) -> Result<Self> {
        Self::build(values, None)
    }

    /// Creates a pool that hands every completed slot to the returned stream.
    ///
    /// A slot only becomes writable again after the [`FilledSlot`] received
    /// from the stream is dropped. If the stream itself is dropped, completed
    /// slots are recycled right away.
    pub fn with_consumer(values: Vec<V>) -> Result<(Self, FilledSlots<V>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let pool = Self::build(values, Some(tx))?;
        Ok((pool, FilledSlots::new(rx)))
    }

    fn build(values: Vec<V>, handoff: Option<mpsc::UnboundedSender<FilledSlot<V>>>) -> Result<Self> {
        if values.is_empty() {
            return Err(BatchingError::InvalidConfig("slot pool needs at least one slot".into()));
        }
        let len = values.len();
        let inner = PoolInner {
            id: Uuid::new_v4(),
            values: values.into_iter().map(Arc::new).collect(),
            state: Mutex::new(PoolState {
                params: None,
                cursor: 0,
                slots: (0..len).map(|_| SlotState::default()).collect(),
            }),
            wakers: (0..len).map(|_| Notify::new()).collect(),
            handoff,
        };
        info!(pool = %inner.id, slots = len, consumer = inner.handoff.is_some(), "created slot pool");
        Ok(Self { inner: Arc::new(inner) })
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.inner.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.values.is_empty()
    }

    /// Whether [`init`](Self::init) has succeeded.
    pub fn initialized(&self) -> bool {
        self.inner.state.lock().params.is_some()
    }

    /// Parameters the pool was initialized with.
    pub fn params(&self) -> Option<V::Params> {
        self.inner.state.lock().params.clone()
    }

    /// Configures every slot value once.
    ///
    /// Calling `init` again with equal parameters does nothing.
    ///
    /// # Errors
    ///
    /// * [`BatchingError::ReinitMismatch`] when the pool was already initialized
    ///   with different parameters
    /// * any error returned by [`SlotResource::configure`]
    pub fn init(&self, params: V::Params) -> Result<()> {
        let mut state = self.inner.state.lock();
        if let Some(existing) = &state.params {
            if *existing == params {
                return Ok(());
            }
            return Err(BatchingError::ReinitMismatch {
                existing: format!("{existing:?}"),
                requested: format!("{params:?}"),
            });
        }
        for value in &self.inner.values {
            value.configure(&params)?;
        }
        info!(pool = %self.inner.id, ?params, "initialized slot pool");
        state.params = Some(params);
        Ok(())
    }

    /// Issues a ticket for the current slot without waiting.
    ///
    /// # Parameters
    ///
    /// * `reserve` - `true` when more objects will follow for the same batch;
    ///   `false` for the last object of a batch, which also rotates the pool
    pub fn pick_up_ticket(&self, reserve: bool) -> QueuingTicket {
        let mut state = self.inner.state.lock();
        let slot_idx = state.cursor;
        let slot_count = state.slots.len();
        let slot = &mut state.slots[slot_idx];
        let generation = match slot.turns.back_mut() {
            Some(turn) if !turn.sealed => {
                turn.join(reserve);
                turn.generation
            }
            _ => {
                let generation = slot.next_generation;
                slot.next_generation += 1;
                let mut turn = Turn::open(generation);
                turn.join(reserve);
                slot.turns.push_back(turn);
                generation
            }
        };
        if !reserve {
            state.cursor = (slot_idx + 1) % slot_count;
        }
        trace!(slot = slot_idx, generation, reserve, "picked up ticket");
        QueuingTicket { pool: self.inner.id, slot: slot_idx, generation, reserved: reserve }
    }

    /// Waits until the ticket's slot is writable and returns a view of it.
    ///
    /// # Errors
    ///
    /// * [`BatchingError::ForeignTicket`] if another pool issued the ticket
    /// * [`BatchingError::StaleTicket`] if the ticket's turn already retired
    pub async fn wait_resource_by_ticket(&self, ticket: QueuingTicket) -> Result<SlotView<V>> {
        if ticket.pool != self.inner.id {
            return Err(BatchingError::ForeignTicket);
        }
        let waker = self.inner.wakers.get(ticket.slot).ok_or(BatchingError::ForeignTicket)?;
        loop {
            // Register before checking so a retirement between the check and
            // the await is not missed.
            let mut notified = pin!(waker.notified());
            notified.as_mut().enable();
            if let Some(view) = self.try_redeem(&ticket)? {
                return Ok(view);
            }
            notified.await;
        }
    }

    fn try_redeem(&self, ticket: &QueuingTicket) -> Result<Option<SlotView<V>>> {
        let mut state = self.inner.state.lock();
        let slot = &mut state.slots[ticket.slot];
        if !slot.turns.iter().any(|t| t.generation == ticket.generation) {
            return Err(BatchingError::StaleTicket { slot: ticket.slot, generation: ticket.generation });
        }
        if slot.draining {
            return Ok(None);
        }
        match slot.turns.front_mut() {
            Some(front) if front.generation == ticket.generation => {
                if front.redeemed >= front.holders {
                    return Err(BatchingError::ProtocolViolation(format!(
                        "slot {} generation {} redeemed more often than tickets were issued",
                        ticket.slot, ticket.generation
                    )));
                }
                front.redeemed += 1;
                trace!(slot = ticket.slot, generation = ticket.generation, "redeemed ticket");
                Ok(Some(SlotView {
                    pool: self.inner.id,
                    slot: ticket.slot,
                    generation: ticket.generation,
                    value: self.inner.values[ticket.slot].clone(),
                }))
            }
            _ => Ok(None),
        }
    }

    /// Signals that the holder of `view` finished writing its part of the slot.
    ///
    /// # Errors
    ///
    /// Returns [`BatchingError::ProtocolViolation`] if the view does not belong
    /// to the turn currently being filled or if every redeemed holder of that
    /// turn already reported done.
    pub fn dealing_done(&self, view: SlotView<V>) -> Result<()> {
        self.finish(view, false)
    }

    /// Like [`dealing_done`](Self::dealing_done), but marks the batch as
    /// unusable: once complete, the slot is recycled without reaching the
    /// consumer.
    pub fn abandon(&self, view: SlotView<V>) -> Result<()> {
        self.finish(view, true)
    }

    fn finish(&self, view: SlotView<V>, abandon: bool) -> Result<()> {
        if view.pool != self.inner.id {
            return Err(BatchingError::ForeignTicket);
        }
        let filled = {
            let mut state = self.inner.state.lock();
            let slot = state.slots.get_mut(view.slot).ok_or(BatchingError::ForeignTicket)?;
            let front = match slot.turns.front_mut() {
                Some(front) if front.generation == view.generation && !slot.draining => front,
                _ => {
                    return Err(BatchingError::ProtocolViolation(format!(
                        "slot {} generation {} is not being filled",
                        view.slot, view.generation
                    )));
                }
            };
            if front.done >= front.redeemed {
                return Err(BatchingError::ProtocolViolation(format!(
                    "dealing_done called more often than slot {} generation {} was redeemed",
                    view.slot, view.generation
                )));
            }
            front.done += 1;
            front.abandoned |= abandon;
            if !front.is_complete() {
                return Ok(());
            }
            self.complete_front(&mut state, view.slot)
        };
        self.hand_off(filled);
        Ok(())
    }

    /// Seals the current slot's open turn, if any, and rotates the pool.
    ///
    /// Used to flush a batch that will not be fully populated.
    ///
    /// # Returns
    ///
    /// The number of objects in the sealed batch, or `None` when no turn was open.
    pub fn seal_current(&self) -> Option<u32> {
        let (objects, filled) = {
            let mut state = self.inner.state.lock();
            let slot_idx = state.cursor;
            let slot_count = state.slots.len();
            let slot = &mut state.slots[slot_idx];
            let turn = match slot.turns.back_mut() {
                Some(turn) if !turn.sealed => turn,
                _ => return None,
            };
            turn.sealed = true;
            let objects = turn.holders;
            let complete = turn.is_complete();
            state.cursor = (slot_idx + 1) % slot_count;
            debug!(slot = slot_idx, objects, "sealed partial batch");
            let filled = if complete { self.complete_front(&mut state, slot_idx) } else { None };
            (objects, filled)
        };
        self.hand_off(filled);
        Some(objects)
    }

    fn complete_front(&self, state: &mut PoolState<V::Params>, slot_idx: usize) -> Option<FilledSlot<V>> {
        let slot = &mut state.slots[slot_idx];
        let (generation, objects, abandoned) = match slot.turns.front() {
            Some(front) => (front.generation, front.holders, front.abandoned),
            None => return None,
        };
        if abandoned {
            warn!(slot = slot_idx, generation, objects, "dropping abandoned batch");
        } else if self.inner.handoff.is_some() {
            slot.draining = true;
            debug!(slot = slot_idx, generation, objects, "batch filled, handing off");
            return Some(FilledSlot {
                pool: Arc::downgrade(&self.inner),
                slot: slot_idx,
                generation,
                objects,
                value: self.inner.values[slot_idx].clone(),
            });
        }
        slot.turns.pop_front();
        debug!(slot = slot_idx, generation, objects, "batch filled, recycling slot");
        self.inner.wakers[slot_idx].notify_waiters();
        None
    }

    /// Sends a completed slot to the consumer. Must be called without the
    /// state lock held, since a rejected slot is released on drop.
    fn hand_off(&self, filled: Option<FilledSlot<V>>) {
        let (Some(filled), Some(tx)) = (filled, &self.inner.handoff) else {
            return;
        };
        if let Err(mpsc::error::SendError(filled)) = tx.send(filled) {
            warn!(slot = filled.slot, generation = filled.generation, "consumer went away, recycling filled slot");
        }
    }

    /// Index of the slot the next ticket will be issued for.
    pub fn cursor(&self) -> usize {
        self.inner.state.lock().cursor
    }

    /// Redeemed holders of the slot's current turn that have not reported done.
    pub fn in_flight(&self, slot: usize) -> u32 {
        let state = self.inner.state.lock();
        state
            .slots
            .get(slot)
            .and_then(|s| s.turns.front())
            .map(|t| t.redeemed - t.done)
            .unwrap_or(0)
    }

    pub fn phase(&self, slot: usize) -> SlotPhase {
        let state = self.inner.state.lock();
        state.slots.get(slot).map(Self::phase_of).unwrap_or(SlotPhase::Idle)
    }

    fn phase_of(slot: &SlotState) -> SlotPhase {
        if slot.turns.is_empty() {
            SlotPhase::Idle
        } else if slot.draining {
            SlotPhase::Draining
        } else {
            SlotPhase::Filling
        }
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.inner.state.lock();
        PoolSnapshot {
            cursor: state.cursor,
            slots: state
                .slots
                .iter()
                .map(|slot| SlotSnapshot {
                    phase: Self::phase_of(slot),
                    in_flight: slot.turns.front().map(|t| t.redeemed - t.done).unwrap_or(0),
                    queued_turns: slot.turns.len(),
                })
                .collect(),
        }
    }
}

/// Write access to one slot, obtained by redeeming a ticket.
///
/// Hand it back with [`SlotPool::dealing_done`] once the write is finished.
pub struct SlotView<V> {
    pool: Uuid,
    slot: usize,
    generation: u64,
    value: Arc<V>,
}

impl<V> SlotView<V> {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn value(&self) -> &V {
        &self.value
    }
}

impl<V> fmt::Debug for SlotView<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotView")
            .field("slot", &self.slot)
            .field("generation", &self.generation)
            .finish()
    }
}

/// # FilledSlot
///
/// A completed batch handed to the consumer. The slot stays in the draining
/// phase until this guard is dropped.
pub struct FilledSlot<V: SlotResource> {
    pool: Weak<PoolInner<V>>,
    slot: usize,
    generation: u64,
    objects: u32,
    value: Arc<V>,
}

impl<V: SlotResource> FilledSlot<V> {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of objects written into the batch. Lower than the batch size
    /// only for flushed batches.
    pub fn objects(&self) -> u32 {
        self.objects
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    /// Returns the slot to the pool.
    pub fn release(self) {}
}

impl<V: SlotResource> Drop for FilledSlot<V> {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.release(self.slot, self.generation);
        }
    }
}

impl<V: SlotResource> fmt::Debug for FilledSlot<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilledSlot")
            .field("slot", &self.slot)
            .field("generation", &self.generation)
            .field("objects", &self.objects)
            .finish()
    }
}

/// # FilledSlots
///
/// Stream of completed batches, in completion order.
///
/// Ends once the pool and every handle to it are dropped.
pub struct FilledSlots<V: SlotResource> {
    receiver: mpsc::UnboundedReceiver<FilledSlot<V>>,
}

impl<V: SlotResource> FilledSlots<V> {
    fn new(receiver: mpsc::UnboundedReceiver<FilledSlot<V>>) -> Self {
        Self { receiver }
    }

    pub async fn recv(&mut self) -> Option<FilledSlot<V>> {
        self.receiver.recv().await
    }

    /// Returns the next completed batch if one is already waiting.
    pub fn try_recv(&mut self) -> Option<FilledSlot<V>> {
        self.receiver.try_recv().ok()
    }
}

impl<V: SlotResource> Stream for FilledSlots<V> {
    type Item = FilledSlot<V>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().receiver).poll_recv(cx)
    }
}
