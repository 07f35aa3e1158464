// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use slog::warn;

use super::{spin_until, DcdState, InputState, Port, PortState, ReadState};
use crate::hw::bits::*;
use crate::ring::ENTRY_SIZE;
use crate::upcall::{NcsError, NotifyMask};
use crate::Result;

#[usdt::provider(provider = "ioc4")]
mod probes {
    fn sio_read(port: u8, req: u64, got: u64) {}
    fn sio_rx_drain(port: u8, prod: u32) {}
}

/// Upcalls produced while consuming the RX ring, delivered once the port
/// lock has been dropped.
enum RxEvent {
    Ncs(NcsError),
    CarrierLost,
}

impl Port {
    /// Moves received bytes from the RX ring into `buf`.
    ///
    /// Returns 0 when nothing is ready, and also when the first thing in the
    /// ring is a carrier drop, which is reported through
    /// [`Upcalls::dcd_change`](crate::Upcalls::dcd_change) instead. A byte
    /// carrying a line error is only ever returned on its own.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut events = Vec::new();
        let got = {
            let mut state = self.lock()?;
            self.do_read(&mut state, buf, &mut events)
        };
        probes::sio_read!(|| (self.index as u8, buf.len() as u64, got as u64));

        for ev in events {
            match ev {
                RxEvent::Ncs(err) => self.upcalls.ncs(self, err),
                RxEvent::CarrierLost => self.upcalls.dcd_change(self, false),
            }
        }
        Ok(got)
    }

    fn do_read(
        &self,
        state: &mut PortState,
        buf: &mut [u8],
        events: &mut Vec<RxEvent>,
    ) -> usize {
        let size = self.inring.size();
        let mask = size.ptr_mask();

        // Re-arm the inactivity timer
        self.regs.set_srcir(state.rx_cons | SRCIR_ARM);

        let mut prod = self.regs.srpir() & mask;
        let mut cons = state.rx_cons;
        if prod == cons {
            prod = self.drain_rx(state, cons);
        }

        state.read = ReadState::Clean;
        let mut len = buf.len();
        let mut total = 0;

        while prod != cons && len > 0 {
            let mut entry = self.inring.load(cons);

            // The producer pointer can run ahead of the DMA writes it
            // describes.
            if !entry.rx_any_valid() {
                state.read = ReadState::Aborted;
                break;
            }

            for lane in 0..entry.sc.len() {
                if len == 0 {
                    break;
                }
                let sc = entry.sc[lane];

                if sc & RXSB_MODEM_VALID != 0
                    && state.notify.contains(NotifyMask::DDCD)
                    && state.dcd == DcdState::DropPending
                    && sc & RXSB_DCD == 0
                {
                    // Hand back what we already have; the drop is picked up
                    // on the next call.
                    if total > 0 {
                        len = 0;
                        break;
                    }
                    state.dcd = DcdState::Steady;
                    state.modem.dcd = false;
                    entry.sc[lane] &= !RXSB_MODEM_VALID;
                    self.inring.store(cons, entry);

                    // Publish the consumer before the upper layer hears of
                    // the drop, so a read from its handler starts past it.
                    if !entry.rx_any_valid() {
                        cons = size.next(cons);
                    }
                    self.regs.set_srcir(cons);
                    state.rx_cons = cons;
                    self.unthrottle(state, cons, prod);
                    events.push(RxEvent::CarrierLost);
                    return 0;
                }

                if sc & RXSB_MODEM_VALID != 0 {
                    if sc & RXSB_OVERRUN != 0
                        && state.notify.contains(NotifyMask::OVERRUN_ERROR)
                    {
                        events.push(RxEvent::Ncs(NcsError::Overrun));
                    }
                    entry.sc[lane] &= !RXSB_MODEM_VALID;
                }

                if sc & RXSB_DATA_VALID != 0
                    && sc & RXSB_ERR_MASK != 0
                    && state.notify.intersects(NotifyMask::RX_ERRORS)
                {
                    // Never mix a healthy run with a bad byte: either stop
                    // short of it, or return it alone.
                    if total > 0 {
                        len = 0;
                        break;
                    }
                    let errs = [
                        (RXSB_PAR_ERR, NotifyMask::PARITY_ERROR, NcsError::Parity),
                        (RXSB_FRAME_ERR, NotifyMask::FRAMING_ERROR, NcsError::Framing),
                        (RXSB_BREAK, NotifyMask::BREAK, NcsError::Break),
                    ];
                    for (bit, class, err) in errs {
                        if sc & bit != 0 && state.notify.contains(class) {
                            events.push(RxEvent::Ncs(err));
                        }
                    }
                    len = 1;
                }

                if sc & RXSB_DATA_VALID != 0 {
                    entry.sc[lane] &= !RXSB_DATA_VALID;
                    buf[total] = entry.data[lane];
                    len -= 1;
                    total += 1;
                }
            }
            self.inring.store(cons, entry);

            // Partially consumed entries stay put for the next read
            if !entry.rx_any_valid() {
                cons = size.next(cons);
            }
        }

        self.regs.set_srcir(cons);
        state.rx_cons = cons;
        self.unthrottle(state, cons, prod);
        total
    }

    /// Restores the RX high-water interrupt once the ring has drained below
    /// its threshold.
    fn unthrottle(&self, state: &mut PortState, cons: u32, prod: u32) {
        let threshold = u32::from(state.sscr.rx_threshold()) * ENTRY_SIZE;
        if state.input == InputState::High
            && self.inring.size().distance(cons, prod) < threshold
        {
            state.input = InputState::Flowing;
            self.enable_intrs(state, self.hooks.rx_high);
        }
    }

    /// Flushes bytes held in the chip's construction buffer out to the RX
    /// ring, returning the producer pointer afterwards.
    fn drain_rx(&self, state: &mut PortState, cons: u32) -> u32 {
        let mask = self.inring.size().ptr_mask();

        let borrowed_dma = !state.sscr.dma_en();
        if borrowed_dma {
            state.sscr.set_dma_en(true);
        }

        // The producer must be sampled after the drain is requested. Data
        // arriving between an earlier sample and the request would otherwise
        // leave us waiting on a drain which cannot complete.
        self.regs.set_sscr(state.sscr.with_rx_drain(true));
        let mut prod = self.regs.srpir() & mask;

        if prod == cons {
            let limit = self.tunables.drain_spin_limit;
            if let Err(polls) =
                spin_until(limit, || !self.regs.sscr().rx_drain())
            {
                warn!(self.log, "RX drain did not complete, treating ring as empty";
                    "polls" => polls);
            }
            prod = self.regs.srpir() & mask;
        }

        if borrowed_dma {
            state.sscr.set_dma_en(false);
            self.regs.set_sscr(state.sscr);
        }
        probes::sio_rx_drain!(|| (self.index as u8, prod));
        prod
    }
}
