// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use slog::info;

use super::{divisor, Port, PortState};
use crate::hw::bits::*;
use crate::ops::{Parity, Protocol};
use crate::upcall::NotifyMask;
use crate::{Error, Result};

/// SSCR bits owned by the pause and drain handshakes.
const SSCR_HANDSHAKE: u32 = 0x0806_0000;

/// TX low-water mark, in ring entries, for a line running at `baud`: about
/// a millisecond of output.
fn tx_lowat(baud: u32) -> u32 {
    ((baud / 10 / 1000 + 3) / 4).max(1)
}

/// Line settings which have been checked against the hardware's limits and
/// only remain to be programmed.
struct LineParams {
    baud: u32,
    /// LCR word length, stop and parity bits.
    lcr: u8,
}

impl Port {
    /// Prepares the port for use by an upper layer: RX FIFO reset, 9600 8N1
    /// (or the configured default rate) and data-ready on every byte.
    ///
    /// Any earlier RX timeout is dropped in favor of the default.
    pub fn open(&self) -> Result<()> {
        let mut state = self.lock()?;
        let line = self.line_params(
            self.tunables.default_baud,
            8,
            1,
            Parity::None,
        )?;
        let ticks = self.tunables.default_rx_timeout();
        let res = self.with_paused(&mut state, |state| {
            self.regs.uart_write(UART_FCR, FCR_FIFOEN | FCR_RXRST);
            self.program_line(state, &line)?;
            self.program_rx_timer(ticks);
            state.rx_timeout = ticks;
            state.sscr.set_rx_threshold(1);
            state.tx_lowat = 1;
            Ok(())
        });
        self.regs.set_sscr(state.sscr);
        res
    }

    /// Sets the line parameters. `stop_bits` is 1 or 2; `byte_size` is 5
    /// through 8.
    ///
    /// The port is left untouched unless every setting, including the RX
    /// threshold the current timeout implies at the new rate, is accepted.
    pub fn config(
        &self,
        baud: u32,
        byte_size: u8,
        stop_bits: u8,
        parity: Parity,
    ) -> Result<()> {
        let mut state = self.lock()?;
        let res =
            self.reconfigure(&mut state, baud, byte_size, stop_bits, parity);
        self.regs.set_sscr(state.sscr);
        if let Err(e) = &res {
            info!(self.log, "line configuration rejected";
                "baud" => baud,
                "byte_size" => byte_size,
                "stop_bits" => stop_bits,
                "error" => %e);
        }
        res
    }

    fn reconfigure(
        &self,
        state: &mut PortState,
        baud: u32,
        byte_size: u8,
        stop_bits: u8,
        parity: Parity,
    ) -> Result<()> {
        let line = self.line_params(baud, byte_size, stop_bits, parity)?;
        // The RX threshold is expressed in characters, so it follows the rate
        let ticks = state.rx_timeout;
        let threshold = self.rx_threshold(baud, ticks)?;

        self.with_paused(state, |state| {
            self.program_line(state, &line)?;
            state.sscr.set_rx_threshold(threshold);
            self.program_rx_timer(ticks);
            Ok(())
        })
    }

    fn line_params(
        &self,
        baud: u32,
        byte_size: u8,
        stop_bits: u8,
        parity: Parity,
    ) -> Result<LineParams> {
        let wls = match byte_size {
            5..=8 => byte_size - 5,
            _ => return Err(Error::InvalidByteSize(byte_size)),
        };
        let stb = match stop_bits {
            1 => 0,
            2 => LCR_STB,
            _ => return Err(Error::InvalidStopBits(stop_bits)),
        };
        let par = match parity {
            Parity::None => 0,
            Parity::Odd => LCR_PEN,
            Parity::Even => LCR_PEN | LCR_EPS,
        };
        divisor(baud, self.tunables.xin_clk_hz)?;
        Ok(LineParams { baud, lcr: wls | stb | par })
    }

    /// Writes validated line settings. The caller is responsible for pausing
    /// DMA.
    fn program_line(
        &self,
        state: &mut PortState,
        line: &LineParams,
    ) -> Result<()> {
        self.set_baud(line.baud)?;
        // A break in progress survives reconfiguration
        let lcr = self.regs.uart_read(UART_LCR) & LCR_SBC;
        self.regs.uart_write(UART_LCR, lcr | line.lcr);

        state.baud = line.baud;
        state.tx_lowat = tx_lowat(line.baud);
        Ok(())
    }

    pub fn enable_hfc(&self, enable: bool) -> Result<()> {
        let mut state = self.lock()?;
        state.sscr.set_hfc_en(enable);
        self.regs.set_sscr(state.sscr);
        Ok(())
    }

    /// External clocking is not supported; the requested clock is echoed.
    pub fn set_ext_clock(&self, clk: u32) -> u32 {
        clk
    }

    pub fn set_break(&self, on: bool) -> Result<()> {
        let mut state = self.lock()?;
        self.with_paused(&mut state, |_| {
            let lcr = self.regs.uart_read(UART_LCR);
            let lcr = if on { lcr | LCR_SBC } else { lcr & !LCR_SBC };
            self.regs.uart_write(UART_LCR, lcr);
            Ok(())
        })
    }

    /// Subscribes to (or unsubscribes from) the given notification classes.
    ///
    /// DMA runs while anything on the input side is subscribed or output
    /// is pending.
    pub fn notification(&self, mask: NotifyMask, enable: bool) -> Result<()> {
        let mut state = self.lock()?;
        let hooks = self.hooks;

        let mut intrs = 0;
        if mask.contains(NotifyMask::DATA_READY) {
            intrs |= hooks.rx_timer | hooks.rx_high;
        }
        if mask.contains(NotifyMask::OUTPUT_LOWAT) {
            intrs |= hooks.tx_explicit;
        }
        if mask.contains(NotifyMask::DDCD) {
            intrs |= hooks.delta_dcd;
            state.sscr.set_rx_ring_dcd(enable);
        }
        if mask.contains(NotifyMask::DCTS) {
            intrs |= hooks.delta_cts;
        }

        if enable {
            self.enable_intrs(&mut state, intrs);
            state.notify |= mask;
        } else {
            self.disable_intrs(&mut state, intrs);
            state.notify &= !mask;
        }

        if state.notify.intersects(NotifyMask::DATA_READY | NotifyMask::DDCD) {
            state.sscr.set_dma_en(true);
        } else if state.ienb & hooks.tx_mt == 0 {
            state.sscr.set_dma_en(false);
        }
        self.regs.set_sscr(state.sscr);
        Ok(())
    }

    /// Sets how long, in ticks, received data may sit in the ring before
    /// the upper layer is told about it.
    pub fn rx_timeout(&self, ticks: u32) -> Result<()> {
        let mut state = self.lock()?;
        let threshold = self.rx_threshold(state.baud, ticks)?;
        state.sscr.set_rx_threshold(threshold);
        self.program_rx_timer(ticks);
        state.rx_timeout = ticks;
        self.regs.set_sscr(state.sscr);
        Ok(())
    }

    /// RX high-water threshold, in entries, giving at least one notification
    /// per `ticks` at `baud`.
    fn rx_threshold(&self, baud: u32, ticks: u32) -> Result<u16> {
        let hz = u64::from(self.tunables.ticks_per_sec.max(1));
        let chars = u64::from(ticks) * u64::from(baud) / 10 / hz;
        let threshold = (chars / 4).max(1);
        if threshold > u64::from(SSCR_RX_THRESHOLD_MAX) {
            return Err(Error::ThresholdOverflow(
                u32::try_from(threshold).unwrap_or(u32::MAX),
            ));
        }
        Ok(threshold as u16)
    }

    /// Programs the RX inactivity timer, which runs independently of SSCR.
    fn program_rx_timer(&self, ticks: u32) {
        let hz = u64::from(self.tunables.ticks_per_sec.max(1));
        let srtr = (u64::from(ticks) * u64::from(SRTR_HZ) / hz)
            .min(u64::from(SRTR_CNT));
        self.regs.set_srtr(srtr as u32);
    }

    pub fn set_dtr(&self, on: bool) -> Result<()> {
        self.set_mcr(MCR_DTR, on)
    }

    pub fn set_rts(&self, on: bool) -> Result<()> {
        self.set_mcr(MCR_RTS, on)
    }

    /// Updates a modem control line in both the UART and the shadow
    /// register, whose top byte mirrors MCR.
    fn set_mcr(&self, bit: u8, on: bool) -> Result<()> {
        let mut state = self.lock()?;
        self.with_paused(&mut state, |_| {
            let shadow = self.regs.shadow();
            let mut mcr = (shadow >> SHADOW_MCR_SHIFT) as u8;
            if on {
                mcr |= bit;
            } else {
                mcr &= !bit;
            }
            self.regs.uart_write(UART_MCR, mcr);
            self.regs.set_shadow(
                (shadow & !SHADOW_MCR_MASK)
                    | (u32::from(mcr) << SHADOW_MCR_SHIFT),
            );
            Ok(())
        })
    }

    pub fn query_dcd(&self) -> Result<bool> {
        let mut state = self.lock()?;
        let dcd = self.regs.shadow() & SHADOW_DCD != 0;
        state.modem.dcd = dcd;
        Ok(dcd)
    }

    pub fn query_cts(&self) -> Result<bool> {
        let mut state = self.lock()?;
        let cts = self.regs.shadow() & SHADOW_CTS != 0;
        state.modem.cts = cts;
        Ok(cts)
    }

    /// Selects the line drivers through the port's general purpose pin.
    pub fn set_protocol(&self, proto: Protocol) -> Result<()> {
        let _state = self.lock()?;
        let val = match proto {
            Protocol::Rs232 => 0,
            Protocol::Rs422 => 1,
        };
        self.chip.set_gppr(self.hooks.rs422_pin, val);
        Ok(())
    }

    /// Register mapping is not offered; every port reports map 0.
    pub fn get_map_id(&self) -> u32 {
        0
    }

    /// Sets or clears raw SSCR bits, returning the resulting shadow. The
    /// pause and drain handshake bits are never accepted.
    pub fn set_sscr(&self, bits: u32, clear: bool) -> Result<u32> {
        let mut state = self.lock()?;
        let bits = bits & !SSCR_HANDSHAKE;
        if clear {
            state.sscr.0 &= !bits;
        } else {
            state.sscr.0 |= bits;
        }
        self.regs.set_sscr(state.sscr);
        Ok(state.sscr.0)
    }
}
