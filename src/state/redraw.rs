//! Coalesce-until-next-tick redraw scheduling.
//!
//! Any number of `schedule` calls between two ticks produce one redraw. The
//! tick source is pluggable: [`IntervalTicks`] follows a wall-clock frame
//! interval, [`ManualTicks`] fires only when a test asks it to.

use futures::future::BoxFuture;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

pub trait TickSource: Send {
    /// Resolve at the next redraw opportunity. Must be cancel-safe.
    fn next_tick(&mut self) -> BoxFuture<'_, ()>;
}

pub struct IntervalTicks {
    interval: Interval,
}

impl IntervalTicks {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

impl TickSource for IntervalTicks {
    fn next_tick(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.interval.tick().await;
        })
    }
}

/// Tick source driven by a [`ManualTickHandle`].
pub struct ManualTicks {
    rx: mpsc::UnboundedReceiver<()>,
}

#[derive(Clone)]
pub struct ManualTickHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualTicks {
    pub fn channel() -> (Self, ManualTickHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, ManualTickHandle { tx })
    }
}

impl ManualTickHandle {
    /// Queue one tick. Returns false once the tick source is gone.
    pub fn tick(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

impl TickSource for ManualTicks {
    fn next_tick(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.rx.recv().await.is_none() {
                // No handle left: no tick will ever come.
                futures::future::pending::<()>().await;
            }
        })
    }
}

pub struct RedrawScheduler<'a> {
    ticks: &'a mut dyn TickSource,
    pending: bool,
    cancelled: bool,
}

impl<'a> RedrawScheduler<'a> {
    pub fn new(ticks: &'a mut dyn TickSource) -> Self {
        Self {
            ticks,
            pending: false,
            cancelled: false,
        }
    }

    /// Request a redraw at the next tick. Returns true if none was pending.
    pub fn schedule(&mut self) -> bool {
        if self.cancelled || self.pending {
            return false;
        }
        self.pending = true;
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending && !self.cancelled
    }

    /// Drop the pending redraw without waiting for its tick.
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.pending) && !self.cancelled
    }

    /// Stop all further redraws. Irreversible.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.pending = false;
    }

    /// Resolve when a scheduled redraw is due. Never resolves while nothing
    /// is scheduled or after `cancel`, so it can sit in a `select!`.
    pub async fn ready(&mut self) {
        if !self.is_pending() {
            futures::future::pending::<()>().await;
        }
        self.ticks.next_tick().await;
        self.pending = false;
    }
}
