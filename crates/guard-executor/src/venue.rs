//! Execution venue capability.

use crate::error::VenueResult;
use guard_core::{Position, PositionId, TradeEvent};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Any venue that can report positions and close them.
///
/// Implementations must treat closing an unknown position as
/// [`VenueError::NotFound`](crate::VenueError::NotFound), never as success
/// of some other position.
pub trait ExecutionVenue: Send + Sync {
    /// Live open positions, freshly queried.
    fn list_open_positions(&self) -> BoxFuture<'_, VenueResult<Vec<Position>>>;

    /// Request a market close of one position.
    fn submit_close(&self, position: PositionId) -> BoxFuture<'_, VenueResult<()>>;

    /// Open/close events since the previous call, oldest first.
    fn poll_trade_events(&self) -> BoxFuture<'_, VenueResult<Vec<TradeEvent>>>;
}

/// Arc wrapper for venue trait objects.
pub type DynVenue = Arc<dyn ExecutionVenue>;

impl<V: ExecutionVenue + ?Sized> ExecutionVenue for Arc<V> {
    fn list_open_positions(&self) -> BoxFuture<'_, VenueResult<Vec<Position>>> {
        (**self).list_open_positions()
    }

    fn submit_close(&self, position: PositionId) -> BoxFuture<'_, VenueResult<()>> {
        (**self).submit_close(position)
    }

    fn poll_trade_events(&self) -> BoxFuture<'_, VenueResult<Vec<TradeEvent>>> {
        (**self).poll_trade_events()
    }
}
