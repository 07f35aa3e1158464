// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Calldown table presented to the upper serial layer.

use crate::port::Port;
use crate::upcall::NotifyMask;
use crate::{Error, Result};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// Electrical protocol driven on the port's connector.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Protocol {
    Rs232 = 3,
    Rs422 = 7,
}

impl TryFrom<u32> for Protocol {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            3 => Ok(Protocol::Rs232),
            7 => Ok(Protocol::Rs422),
            v => Err(Error::UnsupportedProtocol(v)),
        }
    }
}

/// Operations the upper layer may invoke on a port.
///
/// Every operation takes the port's lock for its duration and is
/// non-blocking apart from the bounded hardware handshakes described on the
/// individual methods of [`Port`].
pub trait SerialOps: Send + Sync {
    fn open(&self) -> Result<()>;
    fn config(
        &self,
        baud: u32,
        byte_size: u8,
        stop_bits: u8,
        parity: Parity,
    ) -> Result<()>;
    fn enable_hfc(&self, enable: bool) -> Result<()>;
    /// External clocking is not supported; the requested clock is echoed.
    fn set_ext_clock(&self, clk: u32) -> u32;

    fn write(&self, buf: &[u8]) -> Result<usize>;
    fn sync_write(&self, buf: &[u8]) -> Result<usize>;
    fn write_flush(&self) -> Result<()>;
    fn set_break(&self, on: bool) -> Result<()>;
    fn enable_tx(&self, enable: bool) -> Result<()>;

    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    fn notification(&self, mask: NotifyMask, enable: bool) -> Result<()>;
    fn rx_timeout(&self, ticks: u32) -> Result<()>;

    fn set_dtr(&self, on: bool) -> Result<()>;
    fn set_rts(&self, on: bool) -> Result<()>;
    fn query_dcd(&self) -> Result<bool>;
    fn query_cts(&self) -> Result<bool>;

    fn set_protocol(&self, proto: Protocol) -> Result<()>;
    fn get_map_id(&self) -> u32;
    /// Raw SSCR escape hatch for mapped drivers. Returns the new shadow.
    fn set_sscr(&self, bits: u32, clear: bool) -> Result<u32>;
}

impl SerialOps for Port {
    fn open(&self) -> Result<()> {
        Port::open(self)
    }
    fn config(
        &self,
        baud: u32,
        byte_size: u8,
        stop_bits: u8,
        parity: Parity,
    ) -> Result<()> {
        Port::config(self, baud, byte_size, stop_bits, parity)
    }
    fn enable_hfc(&self, enable: bool) -> Result<()> {
        Port::enable_hfc(self, enable)
    }
    fn set_ext_clock(&self, clk: u32) -> u32 {
        Port::set_ext_clock(self, clk)
    }
    fn write(&self, buf: &[u8]) -> Result<usize> {
        Port::write(self, buf)
    }
    fn sync_write(&self, buf: &[u8]) -> Result<usize> {
        Port::sync_write(self, buf)
    }
    fn write_flush(&self) -> Result<()> {
        Port::write_flush(self)
    }
    fn set_break(&self, on: bool) -> Result<()> {
        Port::set_break(self, on)
    }
    fn enable_tx(&self, enable: bool) -> Result<()> {
        Port::enable_tx(self, enable)
    }
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        Port::read(self, buf)
    }
    fn notification(&self, mask: NotifyMask, enable: bool) -> Result<()> {
        Port::notification(self, mask, enable)
    }
    fn rx_timeout(&self, ticks: u32) -> Result<()> {
        Port::rx_timeout(self, ticks)
    }
    fn set_dtr(&self, on: bool) -> Result<()> {
        Port::set_dtr(self, on)
    }
    fn set_rts(&self, on: bool) -> Result<()> {
        Port::set_rts(self, on)
    }
    fn query_dcd(&self) -> Result<bool> {
        Port::query_dcd(self)
    }
    fn query_cts(&self) -> Result<bool> {
        Port::query_cts(self)
    }
    fn set_protocol(&self, proto: Protocol) -> Result<()> {
        Port::set_protocol(self, proto)
    }
    fn get_map_id(&self) -> u32 {
        Port::get_map_id(self)
    }
    fn set_sscr(&self, bits: u32, clear: bool) -> Result<u32> {
        Port::set_sscr(self, bits, clear)
    }
}
