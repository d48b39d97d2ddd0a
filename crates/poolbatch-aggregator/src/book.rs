//! Pending orders of one pair, split by side.
//!
//! Submissions append under a short mutex; a tick drains one side
//! wholesale. Orders submitted while a tick is running land in the next one.

use std::sync::{Mutex, MutexGuard, PoisonError};

use poolbatch_types::{PendingOrder, Side};

#[derive(Debug, Default)]
struct Sides {
    buys: Vec<PendingOrder>,
    sells: Vec<PendingOrder>,
}

impl Sides {
    fn side_mut(&mut self, side: Side) -> &mut Vec<PendingOrder> {
        match side {
            Side::Buy => &mut self.buys,
            Side::Sell => &mut self.sells,
        }
    }
}

/// Buy and sell lists waiting for the next tick.
#[derive(Debug, Default)]
pub struct PendingBook {
    sides: Mutex<Sides>,
}

impl PendingBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Sides> {
        self.sides.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an order to the list of its side.
    pub fn push(&self, order: PendingOrder) {
        self.guard().side_mut(order.side).push(order);
    }

    /// Drain the side this tick processes: buys whenever any are waiting,
    /// otherwise sells. `None` when both lists are empty.
    pub fn take_next(&self) -> Option<(Side, Vec<PendingOrder>)> {
        let mut sides = self.guard();
        if !sides.buys.is_empty() {
            return Some((Side::Buy, std::mem::take(&mut sides.buys)));
        }
        if !sides.sells.is_empty() {
            return Some((Side::Sell, std::mem::take(&mut sides.sells)));
        }
        None
    }

    /// Put orders back at the front of their list, ahead of anything
    /// submitted since they were taken.
    pub fn restore(&self, side: Side, orders: Vec<PendingOrder>) {
        let mut sides = self.guard();
        let list = sides.side_mut(side);
        let newer = std::mem::replace(list, orders);
        list.extend(newer);
    }

    #[must_use]
    pub fn len(&self, side: Side) -> usize {
        let mut sides = self.guard();
        sides.side_mut(side).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        let sides = self.guard();
        sides.buys.is_empty() && sides.sells.is_empty()
    }
}
