// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ring-buffer DMA engine for the serial ports of the SGI IOC4.
//!
//! Each IOC4 carries four 16550-compatible UARTs whose data moves through
//! rings of 8-byte entries in host memory rather than through the UART
//! FIFOs. This crate owns the per-port ring pointers, interrupt state and
//! flow-control bookkeeping, sitting between an upper serial layer (the
//! [`Upcalls`] it is handed and the [`SerialOps`] it exposes) and the
//! platform bus (the [`ChipBus`] it attaches through).

#![allow(clippy::style)]

pub extern crate usdt;
#[macro_use]
extern crate bitflags;

pub mod chip;
pub mod error;
pub mod hw;
pub mod ops;
pub mod port;
pub mod ring;
pub mod tunables;
pub mod upcall;

pub use chip::{Chip, ChipBus, IntrClass, IntrHandler};
pub use error::Error;
pub use ops::{Parity, Protocol, SerialOps};
pub use port::Port;
pub use tunables::Tunables;
pub use upcall::{NcsError, NotifyMask, Upcalls};

pub type Result<T> = std::result::Result<T, Error>;
