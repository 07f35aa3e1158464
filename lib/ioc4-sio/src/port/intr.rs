// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use slog::warn;

use super::{DcdState, InputState, LowWater, Port, ReadState};
use crate::hw::bits::*;
use crate::hw::PortIndex;
use crate::ring::Direction;
use crate::upcall::NotifyMask;

#[usdt::provider(provider = "ioc4")]
mod probes {
    fn sio_intr(port: u8, pending: u32) {}
    fn sio_dma_error(port: u8, addr: u64) {}
}

/// Bus master named in a captured PCI error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DmaMaster {
    Serial { port: PortIndex, dir: Direction },
    /// One of the chip's non-serial DMA engines.
    Other(u8),
}

impl fmt::Display for DmaMaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DmaMaster::Serial { port, dir: Direction::Tx } => {
                write!(f, "serial {port} tx")
            }
            DmaMaster::Serial { port, dir: Direction::Rx } => {
                write!(f, "serial {port} rx")
            }
            DmaMaster::Other(id) => write!(f, "master {id}"),
        }
    }
}

/// Decoded contents of the PCI error address registers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DmaFault {
    pub addr: u64,
    pub master: DmaMaster,
    /// More errors occurred after this one was captured.
    pub multiple: bool,
}

impl DmaFault {
    /// Decodes the (low, high) error address words, if a fault was captured.
    pub fn decode(lo: u32, hi: u32) -> Option<Self> {
        if lo & PCI_ERR_ADDR_VLD == 0 {
            return None;
        }
        let id = ((lo & PCI_ERR_ADDR_MST_ID_MASK) >> PCI_ERR_ADDR_MST_ID_SHIFT)
            as u8;
        // Serial masters are numbered TX0, RX0, TX1, RX1, ...
        let master = match PortIndex::ALL.get(usize::from(id >> 1)) {
            Some(&port) => DmaMaster::Serial {
                port,
                dir: if id & 1 == 0 { Direction::Tx } else { Direction::Rx },
            },
            None => DmaMaster::Other(id),
        };
        Some(Self {
            addr: (u64::from(hi) << 32) | u64::from(lo & PCI_ERR_ADDR_ADDR_MASK),
            master,
            multiple: lo & PCI_ERR_ADDR_MUL_ERR != 0,
        })
    }
}

impl Port {
    /// Services this port's SIO_IR conditions.
    ///
    /// `pending` is the port's share of SIO_IR as sampled by the dispatcher,
    /// which has already masked those bits in SIO_IES. Conditions are handled
    /// until none remain, after which the port's enables are restored.
    pub fn serial_intr(&self, pending: u32) {
        probes::sio_intr!(|| (self.index as u8, pending));

        let hooks = self.hooks;
        let mut state = self.state.lock().unwrap();
        if state.detached {
            return;
        }

        // TX empty sampled without the port lock may already be stale; a
        // write can restart the transmitter in between. Only trust it once
        // re-read below.
        let mut sio_ir = pending & !hooks.tx_mt;
        let mut rx_high_rd_aborted = false;

        loop {
            if sio_ir & hooks.delta_dcd != 0 {
                self.chip.ack_sio(hooks.delta_dcd);
                let dcd = self.regs.shadow() & SHADOW_DCD != 0;
                state.modem.dcd = dcd;
                if state.notify.contains(NotifyMask::DDCD) {
                    if dcd {
                        state = self.unlocked(state, |up, port| {
                            up.dcd_change(port, true)
                        });
                    } else {
                        // Reported by the read path, in order with the
                        // data received ahead of it.
                        state.dcd = DcdState::DropPending;
                    }
                }
            }

            if sio_ir & hooks.delta_cts != 0 {
                self.chip.ack_sio(hooks.delta_cts);
                let cts = self.regs.shadow() & SHADOW_CTS != 0;
                state.modem.cts = cts;
                if state.notify.contains(NotifyMask::DCTS) {
                    state = self
                        .unlocked(state, |up, port| up.cts_change(port, cts));
                }
            }

            if sio_ir & hooks.rx_timer != 0 {
                self.chip.ack_sio(hooks.rx_timer);
                if state.notify.contains(NotifyMask::DATA_READY) {
                    state = self.unlocked(state, |up, port| up.data_ready(port));
                }
            } else if sio_ir & hooks.rx_high != 0 {
                if state.notify.contains(NotifyMask::DATA_READY) {
                    state = self.unlocked(state, |up, port| up.data_ready(port));
                }
                // Level triggered; the upper layer may have read below it.
                sio_ir = self.chip.sio_ir() & state.ienb;
                if sio_ir & hooks.rx_high != 0 {
                    if state.read == ReadState::Clean {
                        self.disable_intrs(&mut state, hooks.rx_high);
                        state.input = InputState::High;
                    } else {
                        rx_high_rd_aborted = true;
                    }
                }
            }

            if sio_ir & hooks.tx_explicit != 0 {
                state.lowat = LowWater::Disarmed;
                self.chip.ack_sio(hooks.tx_explicit);
                if state.notify.contains(NotifyMask::OUTPUT_LOWAT) {
                    state =
                        self.unlocked(state, |up, port| up.output_lowat(port));
                }
            } else if sio_ir & hooks.tx_mt != 0 {
                // The marked entry can be skipped when the ring fills in
                // just the wrong pattern, so empty counts as low water too.
                if state.notify.contains(NotifyMask::OUTPUT_LOWAT) {
                    state =
                        self.unlocked(state, |up, port| up.output_lowat(port));
                    sio_ir = self.chip.sio_ir() & state.ienb;
                }
                if sio_ir & hooks.tx_mt != 0 {
                    if !state
                        .notify
                        .intersects(NotifyMask::DATA_READY | NotifyMask::DDCD)
                    {
                        state.sscr.set_dma_en(false);
                        self.regs.set_sscr(state.sscr);
                    }
                    self.disable_intrs(&mut state, hooks.tx_mt);
                }
            }

            if state.detached {
                return;
            }

            sio_ir = self.chip.sio_ir() & state.ienb;
            // An aborted read leaves RX high standing with nothing more we
            // can do about it until the DMA engine catches up.
            if rx_high_rd_aborted && sio_ir == hooks.rx_high {
                sio_ir &= !hooks.rx_high;
            }
            if sio_ir & hooks.intr_all == 0 {
                break;
            }
        }

        self.chip.sio_enable(state.ienb);
    }

    /// Services this port's DMA error condition, returning what the chip
    /// captured about it.
    pub fn dma_error_intr(&self) -> Option<DmaFault> {
        let state = self.state.lock().unwrap();
        if state.detached {
            return None;
        }
        self.chip.ack_other(self.hooks.dma_error);

        let (lo, hi) = self.chip.pci_err_addr();
        let fault = DmaFault::decode(lo, hi);
        match &fault {
            Some(f) => {
                probes::sio_dma_error!(|| (self.index as u8, f.addr));
                warn!(self.log, "DMA error";
                    "addr" => format!("{:#x}", f.addr),
                    "master" => %f.master,
                    "multiple" => f.multiple);
            }
            None => warn!(self.log, "DMA error with no captured address"),
        }

        if state.ienb != 0 {
            self.chip.other_enable(self.hooks.dma_error);
        }
        fault
    }
}
