// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};

use crate::ring::RingSize;

/// Fixed input clock of the IOC4 UARTs.
pub const IOC4_SER_XIN_CLK: u32 = 66_666_667;

const DEFAULT_SPIN_LIMIT: u32 = 10_000_000;

/// Per-chip parameters which are compile-time constants on real hardware
/// but are worth varying for bring-up and under test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tunables {
    /// Size of each of the four sub-rings.
    pub ring_size: RingSize,
    pub xin_clk_hz: u32,
    /// Length of the tick used by `rx_timeout`.
    pub ticks_per_sec: u32,
    pub default_baud: u32,

    /// Polls of SSCR waiting for a requested DMA pause to take effect.
    pub pause_spin_limit: u32,
    /// Polls of SIO_CR waiting for the bus arbiter to go idle after reset.
    pub idle_spin_limit: u32,
    /// Polls of SSCR waiting for an RX drain to complete.
    pub drain_spin_limit: u32,
    /// Polls waiting for the transmitter to empty in `write_flush`.
    pub flush_spin_limit: u32,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            ring_size: RingSize::default(),
            xin_clk_hz: IOC4_SER_XIN_CLK,
            ticks_per_sec: 100,
            default_baud: 9600,
            pause_spin_limit: DEFAULT_SPIN_LIMIT,
            idle_spin_limit: DEFAULT_SPIN_LIMIT,
            drain_spin_limit: DEFAULT_SPIN_LIMIT,
            flush_spin_limit: DEFAULT_SPIN_LIMIT,
        }
    }
}

impl Tunables {
    /// RX timeout a port starts out with, in ticks: about 10ms.
    pub fn default_rx_timeout(&self) -> u32 {
        (self.ticks_per_sec / 100).max(1)
    }
}
