// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use super::bits::*;
use super::hooks::{PortIndex, RingPair};

#[usdt::provider(provider = "ioc4")]
mod probes {
    fn sio_reg_write(offset: u64, data: u32) {}
}

/// Programmed I/O into the IOC4 BAR.
///
/// Offsets are bytes from the start of the mapping. Implementations must
/// perform each access exactly once and in program order; the engine relies
/// on register write ordering for its handshake with the DMA engine.
pub trait RegAccess: Send + Sync + 'static {
    fn read32(&self, offset: usize) -> u32;
    fn write32(&self, offset: usize, val: u32);
    fn read8(&self, offset: usize) -> u8;
    fn write8(&self, offset: usize, val: u8);
}

/// Accessors for the chip-wide registers shared by all four ports.
#[derive(Clone)]
pub struct ChipRegs {
    mmio: Arc<dyn RegAccess>,
}

impl ChipRegs {
    pub fn new(mmio: Arc<dyn RegAccess>) -> Self {
        Self { mmio }
    }

    fn write(&self, offset: usize, val: u32) {
        probes::sio_reg_write!(|| (offset as u64, val));
        self.mmio.write32(offset, val);
    }

    pub fn sio_ir(&self) -> u32 {
        self.mmio.read32(REG_SIO_IR)
    }
    pub fn ack_sio(&self, bits: u32) {
        self.write(REG_SIO_IR, bits);
    }
    pub fn sio_enable(&self, bits: u32) {
        self.write(REG_SIO_IES, bits);
    }
    pub fn sio_disable(&self, bits: u32) {
        self.write(REG_SIO_IEC, bits);
    }

    pub fn ack_other(&self, bits: u32) {
        self.write(REG_OTHER_IR, bits);
    }
    pub fn other_enable(&self, bits: u32) {
        self.write(REG_OTHER_IES, bits);
    }
    pub fn other_disable(&self, bits: u32) {
        self.write(REG_OTHER_IEC, bits);
    }

    pub fn sio_cr(&self) -> u32 {
        self.mmio.read32(REG_SIO_CR)
    }

    /// Returns the (low, high) PCI error address words.
    pub fn pci_err_addr(&self) -> (u32, u32) {
        (
            self.mmio.read32(REG_PCI_ERR_ADDR_L),
            self.mmio.read32(REG_PCI_ERR_ADDR_H),
        )
    }

    pub fn set_gppr(&self, pin: usize, val: u32) {
        assert!(pin < GPPR_COUNT);
        self.write(REG_GPPR_BASE + pin * 4, val);
    }

    pub fn set_ring_base(&self, pair: RingPair, high: u32, low: u32) {
        let (reg_h, reg_l) = pair.sbbr_regs();
        self.write(reg_h, high);
        self.write(reg_l, low);
    }
}

/// Accessors for one port's serial DMA block and its 16550 UART.
#[derive(Clone)]
pub struct PortRegs {
    mmio: Arc<dyn RegAccess>,
    serial: usize,
    uart: usize,
}

impl PortRegs {
    pub fn new(mmio: Arc<dyn RegAccess>, index: PortIndex) -> Self {
        Self {
            mmio,
            serial: REG_PORT_BASE + index.as_usize() * PORT_STRIDE,
            uart: REG_UART_BASE + index.as_usize() * UART_STRIDE,
        }
    }

    fn read(&self, reg: usize) -> u32 {
        self.mmio.read32(self.serial + reg)
    }
    fn write(&self, reg: usize, val: u32) {
        probes::sio_reg_write!(|| ((self.serial + reg) as u64, val));
        self.mmio.write32(self.serial + reg, val);
    }

    pub fn sscr(&self) -> Sscr {
        Sscr(self.read(SER_SSCR))
    }
    pub fn set_sscr(&self, sscr: Sscr) {
        self.write(SER_SSCR, sscr.0);
    }

    pub fn stpir(&self) -> u32 {
        self.read(SER_STPIR)
    }
    pub fn set_stpir(&self, val: u32) {
        self.write(SER_STPIR, val);
    }
    pub fn stcir(&self) -> u32 {
        self.read(SER_STCIR)
    }
    pub fn srpir(&self) -> u32 {
        self.read(SER_SRPIR)
    }
    pub fn srcir(&self) -> u32 {
        self.read(SER_SRCIR)
    }
    pub fn set_srcir(&self, val: u32) {
        self.write(SER_SRCIR, val);
    }
    pub fn set_srtr(&self, val: u32) {
        self.write(SER_SRTR, val);
    }
    pub fn shadow(&self) -> u32 {
        self.read(SER_SHADOW)
    }
    pub fn set_shadow(&self, val: u32) {
        self.write(SER_SHADOW, val);
    }

    pub fn uart_read(&self, reg: usize) -> u8 {
        self.mmio.read8(self.uart + reg)
    }
    pub fn uart_write(&self, reg: usize, val: u8) {
        self.mmio.write8(self.uart + reg, val);
    }
}
