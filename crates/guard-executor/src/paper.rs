//! In-memory paper venue.
//!
//! Holds positions the operator (or a test) opens by hand, reports open and
//! close events, and realizes the current floating P&L on close. Failures
//! can be injected per position to exercise the actuator's retry path.

use crate::error::{VenueError, VenueResult};
use crate::venue::{BoxFuture, ExecutionVenue};
use chrono::{DateTime, Utc};
use guard_core::{Direction, Lots, Position, PositionId, TradeEvent, Usd};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct PaperBook {
    positions: BTreeMap<PositionId, Position>,
    events: Vec<TradeEvent>,
    next_id: u64,
    /// Fixed clock for closes; wall clock when unset.
    clock: Option<DateTime<Utc>>,
    transient_failures: HashMap<PositionId, u32>,
    rejected: HashSet<PositionId>,
    close_requests: u32,
}

impl PaperBook {
    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }
}

/// Paper venue backed by a mutex-guarded book.
#[derive(Debug, Default)]
pub struct PaperVenue {
    book: Mutex<PaperBook>,
}

impl PaperVenue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the clock used for close timestamps.
    pub fn set_clock(&self, at: DateTime<Utc>) {
        self.book.lock().clock = Some(at);
    }

    /// Open a position and queue its open event.
    pub fn open(
        &self,
        symbol: &str,
        direction: Direction,
        volume: Lots,
        opened_at: DateTime<Utc>,
    ) -> Position {
        let mut book = self.book.lock();
        book.next_id += 1;
        let position = Position {
            id: PositionId(book.next_id),
            symbol: symbol.to_string(),
            direction,
            volume,
            floating_pnl: Usd::ZERO,
            opened_at,
        };
        book.events.push(TradeEvent::opened(&position));
        book.positions.insert(position.id, position.clone());
        info!(position = %position.id, symbol, %direction, %volume, "Paper position opened");
        position
    }

    /// Mark a position's floating P&L.
    pub fn set_floating(&self, position: PositionId, pnl: Usd) {
        if let Some(p) = self.book.lock().positions.get_mut(&position) {
            p.floating_pnl = pnl;
        }
    }

    /// Fail the next `count` close requests for a position with a transient error.
    pub fn fail_closes(&self, position: PositionId, count: u32) {
        self.book.lock().transient_failures.insert(position, count);
    }

    /// Reject every close request for a position.
    pub fn reject_closes(&self, position: PositionId) {
        self.book.lock().rejected.insert(position);
    }

    pub fn open_count(&self) -> usize {
        self.book.lock().positions.len()
    }

    pub fn is_open(&self, position: PositionId) -> bool {
        self.book.lock().positions.contains_key(&position)
    }

    /// Close requests received, including failed ones.
    pub fn close_requests(&self) -> u32 {
        self.book.lock().close_requests
    }

    fn close(&self, position: PositionId) -> VenueResult<()> {
        let mut book = self.book.lock();
        book.close_requests += 1;

        if book.rejected.contains(&position) {
            return Err(VenueError::Rejected(format!("close of {position} refused")));
        }
        if let Some(left) = book.transient_failures.get_mut(&position) {
            if *left > 0 {
                *left -= 1;
                return Err(VenueError::Transient("trade context busy".to_string()));
            }
        }

        let Some(closed) = book.positions.remove(&position) else {
            return Err(VenueError::NotFound(position));
        };
        let at = book.now();
        debug!(position = %position, pnl = %closed.floating_pnl, "Paper position closed");
        book.events
            .push(TradeEvent::closed(&closed, closed.floating_pnl, at));
        Ok(())
    }
}

impl ExecutionVenue for PaperVenue {
    fn list_open_positions(&self) -> BoxFuture<'_, VenueResult<Vec<Position>>> {
        Box::pin(async move { Ok(self.book.lock().positions.values().cloned().collect()) })
    }

    fn submit_close(&self, position: PositionId) -> BoxFuture<'_, VenueResult<()>> {
        Box::pin(async move { self.close(position) })
    }

    fn poll_trade_events(&self) -> BoxFuture<'_, VenueResult<Vec<TradeEvent>>> {
        Box::pin(async move { Ok(std::mem::take(&mut self.book.lock().events)) })
    }
}
