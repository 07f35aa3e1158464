// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use slog::error;

use super::{spin_until, Port};
use crate::chip::ChipBus;
use crate::hw::bits::*;
use crate::{Error, Result};

/// Computes the 16550 divisor latch value for `baud` given the UART input
/// clock, rejecting rates the divisor cannot reach within 1%.
pub fn divisor(baud: u32, clk: u32) -> Result<u16> {
    if baud == 0 {
        return Err(Error::InvalidBaud(baud));
    }
    let (b, clk) = (u64::from(baud), u64::from(clk));
    let div = (clk + b * 8) / (b * 16);
    if div == 0 || div > u64::from(u16::MAX) {
        return Err(Error::InvalidBaud(baud));
    }
    let actual = clk / 16 / div;
    if actual.abs_diff(b) * 100 > actual {
        return Err(Error::BaudOutOfTolerance {
            requested: baud,
            actual: actual as u32,
        });
    }
    Ok(div as u16)
}

impl Port {
    /// Brings the port's UART and DMA channels to a known baseline.
    ///
    /// The first port of each pair also publishes the shared ring region to
    /// the chip.
    pub(crate) fn hardware_init(&self, bus: &dyn ChipBus) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let size = self.ring.size();
        let mask = size.ptr_mask();

        // Reset the DMA channels and wait for the arbiter to let go of the
        // bus before releasing the reset.
        self.regs.set_sscr(Sscr(0).with_reset(true));
        let limit = self.tunables.idle_spin_limit;
        spin_until(limit, || self.chip.sio_cr() & SIO_CR_ARB_DIAG_IDLE != 0)
            .map_err(|polls| {
                error!(self.log, "arbiter did not go idle after reset";
                    "polls" => polls);
                Error::HardwareTimeout { what: "arbiter idle", polls }
            })?;
        state.sscr = Sscr(0);
        self.regs.set_sscr(state.sscr);

        // Both rings start out empty
        state.tx_prod = self.regs.stcir() & mask;
        self.regs.set_stpir(state.tx_prod);
        state.rx_cons = self.regs.srpir() & mask;
        self.regs.set_srcir(state.rx_cons | SRCIR_ARM);

        // Interrupts are delivered through SIO_IR, never the UART itself
        self.regs.uart_write(UART_LCR, 0);
        self.regs.uart_write(UART_IER, 0);

        self.set_baud(self.tunables.default_baud)?;
        state.baud = self.tunables.default_baud;
        self.regs.uart_write(UART_LCR, LCR_WLS_MASK);

        self.regs.uart_write(UART_FCR, FCR_FIFOEN);
        self.regs.uart_write(UART_FCR, FCR_FIFOEN | FCR_RXRST | FCR_TXRST);

        self.regs.uart_write(UART_MCR, 0);
        let _ = self.regs.uart_read(UART_MSR);

        if self.index.is_pair_leader() {
            let addr =
                bus.dma_addr(&self.ring).ok_or(Error::AllocationFailed)?;
            let align = size.region_bytes();
            if addr % align as u64 != 0 {
                return Err(Error::MisalignedRing { addr, align });
            }
            let size_bit = if size.is_4k() { SBBR_L_SIZE_4K } else { 0 };
            self.chip.set_ring_base(
                self.index.pair(),
                (addr >> 32) as u32,
                addr as u32 | size_bit,
            );
        }

        self.regs.set_srtr(SRTR_HZ / 100);

        state.sscr = Sscr(0).with_rx_threshold(size.hiwat_entries());
        self.regs.set_sscr(state.sscr);

        self.chip.sio_disable(self.hooks.intr_all);
        state.ienb &= !self.hooks.intr_all;
        self.chip.ack_sio(self.hooks.intr_all);

        Ok(())
    }

    /// Programs the divisor latch. The caller is responsible for pausing DMA.
    pub(super) fn set_baud(&self, baud: u32) -> Result<()> {
        let div = divisor(baud, self.tunables.xin_clk_hz)?;

        let lcr = self.regs.uart_read(UART_LCR);
        self.regs.uart_write(UART_LCR, lcr | LCR_DLAB);
        self.regs.uart_write(UART_DLL, div as u8);
        self.regs.uart_write(UART_DLM, (div >> 8) as u8);
        self.regs.uart_write(UART_LCR, lcr);
        Ok(())
    }
}
