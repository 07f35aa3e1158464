// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Errors surfaced by the IOC4 serial engine to its callers.
///
/// Data-path conditions (parity, framing, break, overrun) and DMA faults are
/// never reported through this type; they travel as upcalls or log records.
#[derive(Debug, Error)]
pub enum Error {
    #[error("baud rate {0} cannot be programmed into the divisor latch")]
    InvalidBaud(u32),

    #[error("baud rate {requested} is more than 1% away from achievable {actual}")]
    BaudOutOfTolerance { requested: u32, actual: u32 },

    #[error("unsupported byte size {0}")]
    InvalidByteSize(u8),

    #[error("unsupported stop bit count {0}")]
    InvalidStopBits(u8),

    #[error("rx threshold {0} does not fit the SSCR threshold field")]
    ThresholdOverflow(u32),

    #[error("unsupported line protocol {0}")]
    UnsupportedProtocol(u32),

    #[error("DMA pause not acknowledged after {polls} polls")]
    PauseTimeout { polls: u32 },

    #[error("{what} not reached after {polls} polls")]
    HardwareTimeout { what: &'static str, polls: u32 },

    #[error("ring buffer allocation failed")]
    AllocationFailed,

    #[error("ring buffer bus address {addr:#x} is not aligned to {align:#x}")]
    MisalignedRing { addr: u64, align: usize },

    #[error("invalid ring size of {0} entries")]
    InvalidRingSize(usize),

    #[error("port has been detached")]
    Detached,

    #[error("bus registration failed: {0}")]
    Bus(String),
}
