//! Modbus TCP/RTU transport on top of `tokio-modbus`.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_modbus::client::{Context, Reader};
use tokio_modbus::prelude::*;
use tracing::{debug, info};

use crate::config::{ConnectionConfig, DeviceConfig, Parity};
use crate::register::BankKind;
use crate::transport::{BankData, Transport, TransportError};

/// A connection to one Modbus device.
///
/// Dropping the transport closes the underlying socket or serial port.
pub struct ModbusTransport {
    device: DeviceConfig,
    ctx: Option<Context>,
}

impl ModbusTransport {
    pub fn new(device: DeviceConfig) -> Self {
        Self { device, ctx: None }
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.device.timeout_ms)
    }

    /// Connect to the Modbus device.
    async fn connect(&self) -> Result<Context, TransportError> {
        let timeout = self.timeout();
        let slave = Slave(self.device.unit_id);

        match &self.device.connection {
            ConnectionConfig::Tcp { host, port } => {
                let addr = tokio::time::timeout(timeout, resolve(host, *port))
                    .await
                    .map_err(|_| {
                        TransportError::Connection(format!("Resolving {} timed out", host))
                    })??;

                let ctx = tokio::time::timeout(timeout, tcp::connect_slave(addr, slave))
                    .await
                    .map_err(|_| TransportError::Connection("Connection timeout".to_string()))?
                    .map_err(|e| TransportError::Connection(e.to_string()))?;

                Ok(ctx)
            }
            ConnectionConfig::Rtu {
                port,
                baud_rate,
                data_bits,
                parity,
                stop_bits,
            } => {
                let parity = match parity {
                    Parity::None => tokio_serial::Parity::None,
                    Parity::Even => tokio_serial::Parity::Even,
                    Parity::Odd => tokio_serial::Parity::Odd,
                };

                let stop_bits = match stop_bits {
                    2 => tokio_serial::StopBits::Two,
                    _ => tokio_serial::StopBits::One,
                };

                let data_bits = match data_bits {
                    5 => tokio_serial::DataBits::Five,
                    6 => tokio_serial::DataBits::Six,
                    7 => tokio_serial::DataBits::Seven,
                    _ => tokio_serial::DataBits::Eight,
                };

                let builder = tokio_serial::new(port, *baud_rate)
                    .parity(parity)
                    .stop_bits(stop_bits)
                    .data_bits(data_bits)
                    .timeout(timeout);

                let serial = tokio_serial::SerialStream::open(&builder).map_err(|e| {
                    TransportError::Connection(format!("Serial open failed: {}", e))
                })?;

                Ok(rtu::attach_slave(serial, slave))
            }
        }
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| {
            TransportError::Connection(format!("Failed to resolve {}:{}: {}", host, port, e))
        })?
        .next()
        .ok_or_else(|| TransportError::Connection(format!("No address for {}:{}", host, port)))
}

/// Bound a request by `timeout` and flatten the two error layers of a
/// Modbus response.
async fn request<T>(
    timeout: Duration,
    fut: impl Future<Output = tokio_modbus::Result<T>>,
) -> Result<T, TransportError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| TransportError::Timeout(timeout))?
        .map_err(|e| TransportError::Io(e.to_string()))?
        .map_err(|e| TransportError::Exception(format!("{:?}", e)))
}

impl Transport for ModbusTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        if self.ctx.is_some() {
            return Ok(());
        }

        let ctx = self.connect().await?;
        info!(
            "Connected to {} (unit {})",
            self.device.connection, self.device.unit_id
        );
        self.ctx = Some(ctx);
        Ok(())
    }

    fn close(&mut self) {
        if self.ctx.take().is_some() {
            debug!("Disconnected from {}", self.device.connection);
        }
    }

    fn is_open(&self) -> bool {
        self.ctx.is_some()
    }

    async fn read_bank(
        &mut self,
        bank: BankKind,
        address: u16,
        count: u16,
    ) -> Result<BankData, TransportError> {
        let timeout = self.timeout();
        let ctx = self.ctx.as_mut().ok_or(TransportError::NotConnected)?;

        match bank {
            BankKind::Coil => {
                let bits = request(timeout, ctx.read_coils(address, count)).await?;
                Ok(BankData::Bits(bits))
            }
            BankKind::Discrete => {
                let bits = request(timeout, ctx.read_discrete_inputs(address, count)).await?;
                Ok(BankData::Bits(bits))
            }
            BankKind::Input => {
                let words = request(timeout, ctx.read_input_registers(address, count)).await?;
                Ok(BankData::Words(words))
            }
            BankKind::Holding => {
                let words = request(timeout, ctx.read_holding_registers(address, count)).await?;
                Ok(BankData::Words(words))
            }
        }
    }
}
