// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use super::bits::*;
use crate::Error;

/// Position of a serial port on its IOC4.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PortIndex {
    P0 = 0,
    P1 = 1,
    P2 = 2,
    P3 = 3,
}

impl PortIndex {
    pub const ALL: [PortIndex; 4] =
        [PortIndex::P0, PortIndex::P1, PortIndex::P2, PortIndex::P3];

    pub const fn as_usize(self) -> usize {
        self as usize
    }

    /// Ports 0 and 2 own the ring buffer region their pair shares.
    pub const fn is_pair_leader(self) -> bool {
        matches!(self, PortIndex::P0 | PortIndex::P2)
    }

    pub const fn pair(self) -> RingPair {
        match self {
            PortIndex::P0 | PortIndex::P1 => RingPair::Ports01,
            PortIndex::P2 | PortIndex::P3 => RingPair::Ports23,
        }
    }

    pub fn hooks(self) -> &'static Hooks {
        &HOOKS[self.as_usize()]
    }
}

impl TryFrom<u8> for PortIndex {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        PortIndex::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| Error::Bus(format!("no serial port {value}")))
    }
}

impl fmt::Display for PortIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_usize())
    }
}

/// A pair of ports sharing one ring buffer region and one SBBR register pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RingPair {
    Ports01,
    Ports23,
}

impl RingPair {
    /// Offsets of the (high, low) base address registers.
    pub const fn sbbr_regs(self) -> (usize, usize) {
        match self {
            RingPair::Ports01 => (REG_SBBR01_H, REG_SBBR01_L),
            RingPair::Ports23 => (REG_SBBR23_H, REG_SBBR23_L),
        }
    }
}

/// Per-port interrupt bit positions within the shared chip registers.
#[derive(Debug)]
pub struct Hooks {
    pub delta_dcd: u32,
    pub delta_cts: u32,
    pub tx_mt: u32,
    pub rx_timer: u32,
    pub rx_high: u32,
    pub tx_explicit: u32,
    /// Lives in OTHER_IR rather than SIO_IR.
    pub dma_error: u32,
    /// Every SIO_IR bit belonging to this port.
    pub intr_all: u32,
    /// General purpose pin selecting RS422 drivers.
    pub rs422_pin: usize,
}

const fn hooks_for(port: u32, rs422_pin: usize) -> Hooks {
    let shift = port * SIO_IR_PORT_SHIFT;
    Hooks {
        delta_dcd: SIO_IR_DELTA_DCD << shift,
        delta_cts: SIO_IR_DELTA_CTS << shift,
        tx_mt: SIO_IR_TX_MT << shift,
        rx_timer: SIO_IR_RX_TIMER << shift,
        rx_high: SIO_IR_RX_HIGH << shift,
        tx_explicit: SIO_IR_TX_EXPLICIT << shift,
        dma_error: OTHER_IR_S0_MEMERR << port,
        intr_all: (SIO_IR_TX_MT
            | SIO_IR_RX_FULL
            | SIO_IR_RX_HIGH
            | SIO_IR_RX_TIMER
            | SIO_IR_DELTA_DCD
            | SIO_IR_DELTA_CTS
            | SIO_IR_INT
            | SIO_IR_TX_EXPLICIT)
            << shift,
        rs422_pin,
    }
}

static HOOKS: [Hooks; 4] =
    [hooks_for(0, 7), hooks_for(1, 6), hooks_for(2, 5), hooks_for(3, 4)];
