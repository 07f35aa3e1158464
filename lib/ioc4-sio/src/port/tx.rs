// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use slog::warn;

use super::{spin_until, LowWater, Port, PortState, TxState};
use crate::hw::bits::*;
use crate::ring::{RingEntry, ENTRY_SIZE};
use crate::{Error, Result};

#[usdt::provider(provider = "ioc4")]
mod probes {
    fn sio_write(port: u8, req: u64, sent: u64) {}
}

impl Port {
    /// Copies as much of `buf` into the TX ring as fits, returning the
    /// number of bytes accepted. Never blocks.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut state = self.lock()?;
        Ok(self.do_write(&mut state, buf))
    }

    /// Like [`Port::write`], but a write which makes no progress against a
    /// flow-controlled transmitter turns the transmitter back on so the
    /// caller cannot wait on it forever.
    pub fn sync_write(&self, buf: &[u8]) -> Result<usize> {
        let mut state = self.lock()?;
        let sent = self.do_write(&mut state, buf);
        if sent == 0 && !buf.is_empty() && state.tx == TxState::Disabled {
            self.set_tx_enabled(&mut state, true)?;
        }
        Ok(sent)
    }

    /// Waits for the transmitter to drain everything already queued.
    pub fn write_flush(&self) -> Result<()> {
        let mut state = self.lock()?;
        let mask = self.outring.size().ptr_mask();
        if state.tx == TxState::Disabled
            && self.regs.stcir() & mask != state.tx_prod
        {
            self.set_tx_enabled(&mut state, true)?;
        }

        let limit = self.tunables.flush_spin_limit;
        spin_until(limit, || {
            !state.sscr.dma_en()
                || self.regs.sscr().pause_state()
                || self.chip.sio_ir() & self.hooks.tx_mt != 0
        })
        .map_err(|polls| {
            warn!(self.log, "transmitter did not drain"; "polls" => polls);
            Error::HardwareTimeout { what: "transmitter empty", polls }
        })
    }

    /// Starts or stops the transmitter for flow control.
    pub fn enable_tx(&self, enable: bool) -> Result<()> {
        let mut state = self.lock()?;
        self.set_tx_enabled(&mut state, enable)
    }

    fn do_write(&self, state: &mut PortState, mut buf: &[u8]) -> usize {
        let size = self.outring.size();
        let requested = buf.len();

        let mut prod = state.tx_prod;
        // Stop one entry short of the consumer so a full ring is never
        // mistaken for an empty one.
        let cons = size.prev(self.regs.stcir() & size.ptr_mask());
        let lowat = state.tx_lowat.saturating_mul(ENTRY_SIZE);

        let mut total = 0;
        while prod != cons && !buf.is_empty() {
            let mut entry = RingEntry::default();
            self.outring.store(prod, entry);

            let n = buf.len().min(entry.data.len());
            for (lane, byte) in buf[..n].iter().enumerate() {
                entry.data[lane] = *byte;
                entry.sc[lane] = TXCB_VALID;
            }
            buf = &buf[n..];
            total += n;

            if state.lowat == LowWater::Disarmed
                && size.distance(prod, cons) <= lowat
            {
                state.lowat = LowWater::Armed;
                entry.sc[0] |= TXCB_INT_WHEN_DONE;
            }
            self.outring.store(prod, entry);
            prod = size.next(prod);
        }

        if total > 0 && !state.sscr.dma_en() {
            state.sscr.set_dma_en(true);
            self.regs.set_sscr(state.sscr);
        }

        if state.tx == TxState::Enabled {
            self.regs.set_stpir(prod);
            if total > 0 {
                self.enable_intrs(state, self.hooks.tx_mt);
            }
        }
        state.tx_prod = prod;

        probes::sio_write!(|| (
            self.index as u8,
            requested as u64,
            total as u64
        ));
        total
    }

    pub(super) fn set_tx_enabled(
        &self,
        state: &mut PortState,
        enable: bool,
    ) -> Result<()> {
        let wanted = if enable { TxState::Enabled } else { TxState::Disabled };
        if state.tx == wanted {
            return Ok(());
        }
        self.with_paused(state, |state| {
            state.tx = wanted;
            if enable {
                self.regs.set_stpir(state.tx_prod);
                self.enable_intrs(state, self.hooks.tx_mt);
            } else {
                let size = self.outring.size();
                let txcons = self.regs.stcir() & size.ptr_mask();
                self.disable_intrs(state, self.hooks.tx_mt);
                // Let the entry in flight finish, but nothing after it.
                if txcons != state.tx_prod {
                    self.regs.set_stpir(size.next(txcons));
                }
            }
            Ok(())
        })
    }
}
