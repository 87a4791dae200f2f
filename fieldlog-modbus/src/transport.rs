//! Transport abstraction and scoped sessions.

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use thiserror::Error;

use crate::register::BankKind;

/// Error type for transport operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Transport is not connected")]
    NotConnected,
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Exception: {0}")]
    Exception(String),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Payload of a successful bank read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BankData {
    /// Holding/input registers.
    Words(Vec<u16>),
    /// Coils/discrete inputs.
    Bits(Vec<bool>),
}

/// A request/response connection to one device.
///
/// Implementations serve one outstanding request at a time.
pub trait Transport {
    /// Establish the connection. Opening an open transport is a no-op.
    fn open(&mut self) -> impl Future<Output = Result<(), TransportError>>;

    /// Release the connection. Must be idempotent.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Read `count` consecutive words or bits starting at `address`.
    fn read_bank(
        &mut self,
        bank: BankKind,
        address: u16,
        count: u16,
    ) -> impl Future<Output = Result<BankData, TransportError>>;
}

/// An open transport that is closed when the session is dropped.
///
/// Dropping covers every exit path: early returns, errors, panics, and
/// cancelled futures.
pub struct Session<'a, T: Transport> {
    transport: &'a mut T,
}

impl<'a, T: Transport> Session<'a, T> {
    /// Open the transport and guard it.
    ///
    /// Nothing is closed when opening fails.
    pub async fn open(transport: &'a mut T) -> Result<Self, TransportError> {
        transport.open().await?;
        Ok(Self { transport })
    }
}

impl<T: Transport> Deref for Session<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.transport
    }
}

impl<T: Transport> DerefMut for Session<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.transport
    }
}

impl<T: Transport> Drop for Session<'_, T> {
    fn drop(&mut self) {
        self.transport.close();
    }
}
