//! # TCP server connections
//!
//! A single listener accepts up to [CAPACITY] concurrent connections. Each connection is assigned
//! to a slot, the slot index is the `link_id` used by the AT protocol.
//!
//! The listener port is persisted in scratch storage on every start/stop, so the listener gets
//! recreated after an unplanned warm reset, see [ConnectionTable::restore_listener].
use crate::storage::{ListenerPort, ScratchStorage};
use core::fmt::Debug;
use core::net::SocketAddr;
use log::{debug, info, warn};

/// Max. number of concurrent connections
pub const CAPACITY: usize = 16;

/// Non-blocking TCP server stack
pub trait ServerStack {
    /// Listening socket
    type Listener;

    /// Accepted connection
    type Connection;

    type Error: Debug;

    /// Opens a listening socket on the given port
    fn listen(&mut self, port: u16) -> Result<Self::Listener, Self::Error>;

    /// Returns the next pending connection or [nb::Error::WouldBlock] if none is waiting
    fn accept(&mut self, listener: &mut Self::Listener) -> nb::Result<(Self::Connection, SocketAddr), Self::Error>;

    /// Returns false if the remote peer has closed the connection
    fn is_connected(&mut self, connection: &Self::Connection) -> bool;

    /// Reads available data. Returns [nb::Error::WouldBlock] if no data is available.
    fn receive(&mut self, connection: &mut Self::Connection, buffer: &mut [u8]) -> nb::Result<usize, Self::Error>;

    /// Writes the data and returns the number of bytes written
    fn send(&mut self, connection: &mut Self::Connection, data: &[u8]) -> Result<usize, Self::Error>;

    /// Closes the connection
    fn close(&mut self, connection: Self::Connection);

    /// Closes the listening socket
    fn unlisten(&mut self, listener: Self::Listener);
}

/// Connection slot
pub(crate) enum Slot<C> {
    /// Slot may be (re)used for the next accepted connection
    Free,

    /// Connection is open
    Active(C),
}

impl<C> Slot<C> {
    fn is_active(&self) -> bool {
        matches!(self, Slot::Active(_))
    }
}

/// Result of draining a single slot
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotEvent {
    /// Slot is free or no data is available
    Idle,

    /// Remote peer closed the connection, slot was released
    Closed,

    /// Given number of bytes were read to the buffer
    Data(usize),
}

/// Connection related errors
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// A listener is already active. Needs to be stopped first.
    AlreadyListening,

    /// Stack failed to open the listening socket
    ListenFailed,

    /// Link ID exceeds the slot capacity
    InvalidLinkId,

    /// No connection is assigned to the slot
    LinkNotActive,

    /// Stack failed to send the data
    SendFailed,
}

/// Fixed capacity table of connections, array index = link_id
pub struct ConnectionTable<N: ServerStack, R: ScratchStorage> {
    /// TCP stack
    pub(crate) stack: N,

    /// Storage of the listener port
    pub(crate) scratch: R,

    /// Active listener and its port
    listener: Option<(N::Listener, u16)>,

    slots: [Slot<N::Connection>; CAPACITY],
}

impl<N: ServerStack, R: ScratchStorage> ConnectionTable<N, R> {
    pub fn new(stack: N, scratch: R) -> Self {
        Self {
            stack,
            scratch,
            listener: None,
            slots: core::array::from_fn(|_| Slot::Free),
        }
    }

    /// Starts listening on the given port and persists the port
    pub fn start_listener(&mut self, port: u16) -> Result<(), Error> {
        if self.listener.is_some() {
            return Err(Error::AlreadyListening);
        }

        let listener = self.stack.listen(port).map_err(|error| {
            warn!("Listening on port {} failed: {:?}", port, error);
            Error::ListenFailed
        })?;

        self.listener = Some((listener, port));
        self.persist(ListenerPort::new(port));
        info!("Listening on port {}", port);
        Ok(())
    }

    /// Closes all connections and the listener. Does nothing if already stopped, except persisting
    /// the stopped state.
    pub fn stop_listener(&mut self) {
        for slot in self.slots.iter_mut() {
            if let Slot::Active(connection) = core::mem::replace(slot, Slot::Free) {
                self.stack.close(connection);
            }
        }

        if let Some((listener, port)) = self.listener.take() {
            self.stack.unlisten(listener);
            info!("Stopped listening on port {}", port);
        }

        self.persist(ListenerPort::none());
    }

    /// Recreates the listener based on the persisted port, e.g. after a warm reset.
    /// Returns the port if a listener was started.
    pub fn restore_listener(&mut self) -> Option<u16> {
        let port = ListenerPort::load(&mut self.scratch)?.port()?;
        self.start_listener(port).ok()?;
        Some(port)
    }

    /// Accepts a pending connection. Returns the assigned link_id.
    /// If all slots are in use, the pending connection gets closed immediately.
    pub fn accept(&mut self) -> Option<usize> {
        let (listener, _) = self.listener.as_mut()?;

        let (connection, remote) = match self.stack.accept(listener) {
            Ok(accepted) => accepted,
            Err(nb::Error::WouldBlock) => return None,
            Err(nb::Error::Other(error)) => {
                warn!("Accepting connection failed: {:?}", error);
                return None;
            }
        };

        let Some(link_id) = self.slots.iter().position(|slot| !slot.is_active()) else {
            debug!("Rejecting connection of {}, all slots in use", remote);
            self.stack.close(connection);
            return None;
        };

        debug!("Link {} connected to {}", link_id, remote);
        self.slots[link_id] = Slot::Active(connection);
        Some(link_id)
    }

    /// Checks a single slot for a closed connection or available data.
    /// Data is read to the given buffer, limited by its length.
    pub fn drain(&mut self, link_id: usize, buffer: &mut [u8]) -> SlotEvent {
        let Some(Slot::Active(connection)) = self.slots.get_mut(link_id) else {
            return SlotEvent::Idle;
        };

        if !self.stack.is_connected(connection) {
            debug!("Link {} closed by remote", link_id);
            self.release(link_id);
            return SlotEvent::Closed;
        }

        match self.stack.receive(connection, buffer) {
            Ok(0) | Err(nb::Error::WouldBlock) => SlotEvent::Idle,
            Ok(length) => SlotEvent::Data(length),
            Err(nb::Error::Other(error)) => {
                warn!("Receiving data of link {} failed: {:?}", link_id, error);
                SlotEvent::Idle
            }
        }
    }

    /// Closes the connection of the given slot
    pub fn close(&mut self, link_id: usize) -> Result<(), Error> {
        match self.slots.get(link_id) {
            None => Err(Error::InvalidLinkId),
            Some(Slot::Free) => Err(Error::LinkNotActive),
            Some(Slot::Active(_)) => {
                self.release(link_id);
                Ok(())
            }
        }
    }

    /// Sends the data in a single call
    pub fn send(&mut self, link_id: usize, data: &[u8]) -> Result<usize, Error> {
        let Some(Slot::Active(connection)) = self.slots.get_mut(link_id) else {
            return Err(Error::LinkNotActive);
        };

        self.stack.send(connection, data).map_err(|error| {
            warn!("Sending data to link {} failed: {:?}", link_id, error);
            Error::SendFailed
        })
    }

    /// Returns true if a connection is assigned to the slot
    pub fn is_active(&self, link_id: usize) -> bool {
        self.slots.get(link_id).is_some_and(Slot::is_active)
    }

    /// Returns true if a connection is assigned and the peer is still connected
    pub fn is_connected(&mut self, link_id: usize) -> bool {
        match self.slots.get(link_id) {
            Some(Slot::Active(connection)) => self.stack.is_connected(connection),
            _ => false,
        }
    }

    /// Number of active connections
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_active()).count()
    }

    /// Port of the active listener
    pub fn listening_port(&self) -> Option<u16> {
        self.listener.as_ref().map(|(_, port)| *port)
    }

    /// Frees the slot and closes its connection
    fn release(&mut self, link_id: usize) {
        if let Slot::Active(connection) = core::mem::replace(&mut self.slots[link_id], Slot::Free) {
            self.stack.close(connection);
        }
    }

    fn persist(&mut self, record: ListenerPort) {
        if let Err(error) = record.store(&mut self.scratch) {
            warn!("Persisting listener port failed: {:?}", error);
        }
    }
}
