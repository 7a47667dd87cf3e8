//! Reconnect supervision for the realtime channel.
//!
//! The supervisor is the single owner of the "which connection is current"
//! question. Connections get monotonically-assigned ids at `begin_connect`;
//! every later signal is judged against the current id, so callbacks from
//! sockets that have already been replaced cannot corrupt fresh state.
//! Intentional closes (replacement, teardown) are marked before the close
//! happens and therefore never schedule a reconnect.

use std::time::Duration;

/// Observable link status for UI surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// How a close signal should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDisposition {
    /// Close of a connection that is no longer current; ignore entirely.
    Stale,
    /// Client-initiated close; do not reconnect.
    Intentional,
    /// Network/server drop of the live connection; schedule one reconnect.
    Unintentional,
}

/// Per-binding reconnect state machine.
#[derive(Debug)]
pub struct ReconnectSupervisor {
    next_conn_id: u64,
    current: Option<u64>,
    intentional: bool,
    status: LinkStatus,
    reconnect_delay: Duration,
}

impl ReconnectSupervisor {
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            next_conn_id: 0,
            current: None,
            intentional: false,
            status: LinkStatus::Disconnected,
            reconnect_delay,
        }
    }

    /// Fixed delay between an unintentional drop and the reconnect attempt.
    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    /// Id of the connection currently considered live, if any.
    pub fn current_conn_id(&self) -> Option<u64> {
        self.current
    }

    /// Allocate the id for a new connection attempt and make it current.
    ///
    /// Any previously tracked connection must already have been marked
    /// intentional and closed by the caller; its late signals will resolve
    /// as [`CloseDisposition::Stale`] from here on.
    pub fn begin_connect(&mut self) -> u64 {
        self.next_conn_id += 1;
        self.current = Some(self.next_conn_id);
        self.intentional = false;
        self.status = LinkStatus::Connecting;
        self.next_conn_id
    }

    /// Record a failed connection attempt so the id is no longer current.
    pub fn connect_failed(&mut self, conn_id: u64) {
        if self.current == Some(conn_id) {
            self.current = None;
            self.status = LinkStatus::Disconnected;
        }
    }

    /// Record the open signal for a connection. Returns false when the
    /// signal belongs to a superseded connection and must be ignored.
    pub fn on_open(&mut self, conn_id: u64) -> bool {
        if self.current != Some(conn_id) {
            return false;
        }
        self.status = LinkStatus::Connected;
        true
    }

    /// True when a non-lifecycle event from `conn_id` should be applied.
    pub fn is_current(&self, conn_id: u64) -> bool {
        self.current == Some(conn_id)
    }

    /// Mark the current connection for intentional closure. Call before
    /// closing the socket so its close signal does not schedule a
    /// reconnect.
    pub fn mark_intentional(&mut self) {
        if self.current.is_some() {
            self.intentional = true;
        }
    }

    /// Classify a close signal and update state accordingly.
    pub fn on_close(&mut self, conn_id: u64) -> CloseDisposition {
        if self.current != Some(conn_id) {
            return CloseDisposition::Stale;
        }
        self.current = None;
        self.status = LinkStatus::Disconnected;
        if self.intentional {
            self.intentional = false;
            CloseDisposition::Intentional
        } else {
            CloseDisposition::Unintentional
        }
    }

    /// Forget everything. Used at teardown after the current socket has
    /// been closed, so no further signals act.
    pub fn reset(&mut self) {
        self.current = None;
        self.intentional = false;
        self.status = LinkStatus::Disconnected;
    }
}
