// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A single IOC4 serial port.
//!
//! All mutable port state lives in a [`PortState`] behind one mutex, which
//! both the calldown operations and the interrupt entry points take. The
//! mutex is released around every upcall so the upper layer may re-enter
//! the port from within a callback.

use std::sync::{Arc, Mutex, MutexGuard};

use slog::{info, warn, Logger};

use crate::hw::bits::*;
use crate::hw::{ChipRegs, Hooks, PortIndex, PortRegs, RegAccess};
use crate::ring::{Direction, RingBuffer, SubRing};
use crate::tunables::Tunables;
use crate::upcall::{NotifyMask, Upcalls};
use crate::{Error, Result};

mod ctl;
mod init;
mod intr;
mod rx;
mod tx;

pub use init::divisor;
pub use intr::{DmaFault, DmaMaster};

/// RX high-water throttling.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum InputState {
    Flowing,
    /// The RX high-water interrupt is disabled until a read drains the ring
    /// below its threshold.
    High,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum DcdState {
    Steady,
    /// Carrier dropped; reported by the read path once the data ahead of
    /// the drop has been consumed.
    DropPending,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum LowWater {
    Disarmed,
    /// An INT_WHEN_DONE entry is outstanding in the TX ring.
    Armed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ReadState {
    Clean,
    /// The last read found an entry the DMA engine had not finished writing.
    Aborted,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum TxState {
    Enabled,
    /// Flow control has stopped the transmitter; writes fill the ring but
    /// the hardware producer pointer is left alone.
    Disabled,
}

/// Cached modem status lines.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ModemStatus {
    pub dcd: bool,
    pub cts: bool,
}

struct PortState {
    /// Shadow of the hardware SSCR. Never contains the pause or drain bits.
    sscr: Sscr,
    /// Shadow of this port's bits in SIO_IES.
    ienb: u32,
    tx_prod: u32,
    rx_cons: u32,

    notify: NotifyMask,
    baud: u32,
    /// TX low-water mark, in ring entries.
    tx_lowat: u32,
    /// Last requested RX timeout, in ticks.
    rx_timeout: u32,
    modem: ModemStatus,

    input: InputState,
    dcd: DcdState,
    lowat: LowWater,
    read: ReadState,
    tx: TxState,

    /// A detach upcall is in flight.
    detaching: bool,
    detached: bool,
}

pub struct Port {
    index: PortIndex,
    hooks: &'static Hooks,
    chip: ChipRegs,
    regs: PortRegs,
    /// Region shared with the other port of the pair.
    ring: Arc<RingBuffer>,
    inring: SubRing,
    outring: SubRing,
    tunables: Tunables,
    upcalls: Arc<dyn Upcalls>,
    log: Logger,
    state: Mutex<PortState>,
}

impl Port {
    pub(crate) fn new(
        index: PortIndex,
        mmio: Arc<dyn RegAccess>,
        ring: Arc<RingBuffer>,
        tunables: Tunables,
        upcalls: Arc<dyn Upcalls>,
        log: Logger,
    ) -> Self {
        let state = PortState {
            sscr: Sscr(0),
            ienb: 0,
            tx_prod: 0,
            rx_cons: 0,
            notify: NotifyMask::empty(),
            baud: tunables.default_baud,
            tx_lowat: 1,
            rx_timeout: tunables.default_rx_timeout(),
            modem: ModemStatus::default(),
            input: InputState::Flowing,
            dcd: DcdState::Steady,
            lowat: LowWater::Disarmed,
            read: ReadState::Clean,
            tx: TxState::Enabled,
            detaching: false,
            detached: false,
        };
        Self {
            index,
            hooks: index.hooks(),
            chip: ChipRegs::new(mmio.clone()),
            regs: PortRegs::new(mmio, index),
            inring: ring.subring(index, Direction::Rx),
            outring: ring.subring(index, Direction::Tx),
            ring,
            tunables,
            upcalls,
            log,
            state: Mutex::new(state),
        }
    }

    pub fn index(&self) -> PortIndex {
        self.index
    }

    pub fn hooks(&self) -> &'static Hooks {
        self.hooks
    }

    #[cfg(test)]
    pub(crate) fn ring(&self) -> &Arc<RingBuffer> {
        &self.ring
    }

    pub fn baud(&self) -> u32 {
        self.state.lock().unwrap().baud
    }

    pub fn modem_status(&self) -> ModemStatus {
        self.state.lock().unwrap().modem
    }

    pub fn is_detached(&self) -> bool {
        self.state.lock().unwrap().detached
    }

    /// Takes the port lock on behalf of a calldown operation.
    fn lock(&self) -> Result<MutexGuard<'_, PortState>> {
        let state = self.state.lock().unwrap();
        if state.detached {
            return Err(Error::Detached);
        }
        Ok(state)
    }

    /// Runs `f` against the upper layer with the port lock dropped.
    fn unlocked<'a>(
        &'a self,
        guard: MutexGuard<'a, PortState>,
        f: impl FnOnce(&dyn Upcalls, &Port),
    ) -> MutexGuard<'a, PortState> {
        drop(guard);
        f(self.upcalls.as_ref(), self);
        self.state.lock().unwrap()
    }

    fn enable_intrs(&self, state: &mut PortState, mask: u32) {
        let added = mask & !state.ienb;
        if added != 0 {
            self.chip.sio_enable(added);
            state.ienb |= added;
        }
        if state.ienb != 0 {
            self.chip.other_enable(self.hooks.dma_error);
        }
    }

    fn disable_intrs(&self, state: &mut PortState, mask: u32) {
        let removed = mask & state.ienb;
        if removed != 0 {
            self.chip.sio_disable(removed);
            state.ienb &= !removed;
        }
        if state.ienb == 0 {
            self.chip.other_disable(self.hooks.dma_error);
        }
    }

    /// Asks the DMA engine to pause, if it is running, and waits for the
    /// pause to take effect.
    ///
    /// On expiry the shadow SSCR is written back, withdrawing the request.
    fn pause_dma(&self, state: &PortState) -> Result<()> {
        if !state.sscr.dma_en() {
            return Ok(());
        }
        self.regs.set_sscr(state.sscr.with_dma_pause(true));
        let limit = self.tunables.pause_spin_limit;
        spin_until(limit, || self.regs.sscr().pause_state()).map_err(
            |polls| {
                self.regs.set_sscr(state.sscr);
                warn!(self.log, "DMA pause not acknowledged"; "polls" => polls);
                Error::PauseTimeout { polls }
            },
        )
    }

    /// Restarts DMA after [`Port::pause_dma`]. The shadow never carries the
    /// pause bit, so writing it through clears the request.
    fn resume_dma(&self, state: &PortState) {
        if state.sscr.dma_en() {
            self.regs.set_sscr(state.sscr);
        }
    }

    fn with_paused<T>(
        &self,
        state: &mut PortState,
        f: impl FnOnce(&mut PortState) -> Result<T>,
    ) -> Result<T> {
        self.pause_dma(state)?;
        let res = f(state);
        self.resume_dma(state);
        res
    }

    /// Stops all DMA and interrupt activity for the port.
    fn quiesce(&self, state: &mut PortState) {
        state.sscr = Sscr(0);
        self.regs.set_sscr(state.sscr);
        self.disable_intrs(state, self.hooks.intr_all);
    }

    /// Tears the port down, telling the upper layer first so it stops
    /// issuing operations.
    pub(crate) fn kill(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.detaching || state.detached {
                return;
            }
            state.detaching = true;
        }
        self.upcalls.detach(self);
        let mut state = self.state.lock().unwrap();
        self.quiesce(&mut state);
        state.detached = true;
        info!(self.log, "port detached");
    }

    /// Quiesces a port which never made it to the upper layer.
    pub(crate) fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        self.quiesce(&mut state);
        state.detached = true;
    }
}

/// Polls `done` at most `limit` times, returning the poll count on expiry.
fn spin_until(
    limit: u32,
    mut done: impl FnMut() -> bool,
) -> std::result::Result<(), u32> {
    for _ in 0..limit {
        if done() {
            return Ok(());
        }
        std::hint::spin_loop();
    }
    Err(limit)
}
