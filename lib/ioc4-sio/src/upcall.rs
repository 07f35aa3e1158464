// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Events reported from the engine back into the upper serial layer.

use crate::port::Port;

bitflags! {
    /// Notification classes the upper layer may subscribe to.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct NotifyMask: u32 {
        const DATA_READY = 1 << 0;
        const OUTPUT_LOWAT = 1 << 1;
        const BREAK = 1 << 2;
        const PARITY_ERROR = 1 << 3;
        const FRAMING_ERROR = 1 << 4;
        const OVERRUN_ERROR = 1 << 5;
        const DDCD = 1 << 6;
        const DCTS = 1 << 7;

        const RX_ERRORS = Self::BREAK.bits()
            | Self::PARITY_ERROR.bits()
            | Self::FRAMING_ERROR.bits();
    }
}

/// Receive-side line condition attached to a single byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NcsError {
    Overrun,
    Parity,
    Framing,
    Break,
}

/// Callbacks into the upper layer.
///
/// The engine never holds a port's lock while invoking these, so an
/// implementation may call back into the same port (typically `read` from
/// `data_ready` or `write` from `output_lowat`).
pub trait Upcalls: Send + Sync {
    fn data_ready(&self, _port: &Port) {}
    fn output_lowat(&self, _port: &Port) {}
    fn dcd_change(&self, _port: &Port, _asserted: bool) {}
    fn cts_change(&self, _port: &Port, _asserted: bool) {}
    fn ncs(&self, _port: &Port, _err: NcsError) {}
    /// The port is going away; no further operations will succeed.
    fn detach(&self, _port: &Port) {}
}
