// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![allow(dead_code)]

use bitstruct::bitstruct;

/*
 * Chip-wide registers, as byte offsets from the start of the IOC4 BAR
 */
pub const REG_PCI_ERR_ADDR_L: usize = 0x000;
pub const REG_PCI_ERR_ADDR_H: usize = 0x004;
pub const REG_SIO_IR: usize = 0x008; // serial interrupt status (W1C)
pub const REG_OTHER_IR: usize = 0x00c; // other interrupt status (W1C)
pub const REG_SIO_IES: usize = 0x010; // serial interrupt enable set
pub const REG_OTHER_IES: usize = 0x014; // other interrupt enable set
pub const REG_SIO_IEC: usize = 0x018; // serial interrupt enable clear
pub const REG_OTHER_IEC: usize = 0x01c; // other interrupt enable clear
pub const REG_SIO_CR: usize = 0x020; // serial control / arbiter status
pub const REG_GPPR_BASE: usize = 0x040; // 8 general purpose pin registers
pub const GPPR_COUNT: usize = 8;

/*
 * Ring buffer base registers, one high/low pair per port pair
 */
pub const REG_SBBR01_H: usize = 0x130;
pub const REG_SBBR01_L: usize = 0x134;
pub const REG_SBBR23_H: usize = 0x138;
pub const REG_SBBR23_L: usize = 0x13c;

/// Low SBBR bit selecting 4 KiB sub-rings (clear for 1 KiB).
pub const SBBR_L_SIZE_4K: u32 = 1 << 0;

/*
 * Per-port serial DMA register block
 */
pub const REG_PORT_BASE: usize = 0x140;
pub const PORT_STRIDE: usize = 0x1c;

pub const SER_SSCR: usize = 0x00; // serial status/control
pub const SER_STPIR: usize = 0x04; // TX producer pointer
pub const SER_STCIR: usize = 0x08; // TX consumer pointer (RO)
pub const SER_SRPIR: usize = 0x0c; // RX producer pointer (RO)
pub const SER_SRCIR: usize = 0x10; // RX consumer pointer
pub const SER_SRTR: usize = 0x14; // RX timer
pub const SER_SHADOW: usize = 0x18; // 16550 shadow register

/*
 * Per-port 16550-compatible UART block
 */
pub const REG_UART_BASE: usize = 0x1b0;
pub const UART_STRIDE: usize = 0x08;

pub const UART_RHR: usize = 0b000; // Receiver Buffer Register (RO)
pub const UART_THR: usize = 0b000; // Transmitter Holding Register (WO)
pub const UART_IER: usize = 0b001; // Interrupt Enable Register
pub const UART_IIR: usize = 0b010; // Interrupt Ident Register (RO)
pub const UART_FCR: usize = 0b010; // FIFO Control Register (WO)
pub const UART_LCR: usize = 0b011; // Line Control Register
pub const UART_MCR: usize = 0b100; // Modem Control Register
pub const UART_LSR: usize = 0b101; // Line Status Register
pub const UART_MSR: usize = 0b110; // Modem Status Register
pub const UART_SCR: usize = 0b111; // Scratch Register
pub const UART_DLL: usize = 0b000; // Divisor Latch LSB (DLAB=1)
pub const UART_DLM: usize = 0b001; // Divisor Latch MSB (DLAB=1)

pub const LCR_WLS_MASK: u8 = 0b0000_0011; // word length select
pub const LCR_STB: u8 = 1 << 2; // two stop bits
pub const LCR_PEN: u8 = 1 << 3; // parity enable
pub const LCR_EPS: u8 = 1 << 4; // even parity select
pub const LCR_SBC: u8 = 1 << 6; // set break
pub const LCR_DLAB: u8 = 1 << 7; // divisor latch access

pub const FCR_FIFOEN: u8 = 1 << 0;
pub const FCR_RXRST: u8 = 1 << 1;
pub const FCR_TXRST: u8 = 1 << 2;

pub const MCR_DTR: u8 = 1 << 0;
pub const MCR_RTS: u8 = 1 << 1;

/*
 * SIO_IR / SIO_IES / SIO_IEC: one byte of condition bits per port
 */
pub const SIO_IR_TX_MT: u32 = 1 << 0; // TX ring empty (level)
pub const SIO_IR_RX_FULL: u32 = 1 << 1;
pub const SIO_IR_RX_HIGH: u32 = 1 << 2; // RX at or above threshold (level)
pub const SIO_IR_RX_TIMER: u32 = 1 << 3; // RX inactivity timer expired
pub const SIO_IR_DELTA_DCD: u32 = 1 << 4;
pub const SIO_IR_DELTA_CTS: u32 = 1 << 5;
pub const SIO_IR_INT: u32 = 1 << 6; // 16550 interrupt passthrough
pub const SIO_IR_TX_EXPLICIT: u32 = 1 << 7; // TX entry marked INT_WHEN_DONE sent
pub const SIO_IR_PORT_SHIFT: u32 = 8;

/*
 * OTHER_IR: DMA error per serial port
 */
pub const OTHER_IR_S0_MEMERR: u32 = 1 << 2;

/*
 * SIO_CR
 */
pub const SIO_CR_ARB_DIAG_IDLE: u32 = 1 << 7; // no port owns the bus

/*
 * Producer/consumer pointer formats
 */
pub const PROD_CONS_PTR_4K: u32 = 0x0000_0ff8;
pub const PROD_CONS_PTR_1K: u32 = 0x0000_03f8;
pub const SRCIR_ARM: u32 = 1 << 31; // arm RX timer on consumer write

/*
 * SRTR: RX inactivity timer
 */
pub const SRTR_CNT: u32 = 0x0000_0fff; // reload value field
pub const SRTR_HZ: u32 = 16_000; // timer tick frequency

/*
 * Shadow register
 */
pub const SHADOW_DR: u32 = 1 << 0;
pub const SHADOW_OE: u32 = 1 << 1;
pub const SHADOW_PE: u32 = 1 << 2;
pub const SHADOW_FE: u32 = 1 << 3;
pub const SHADOW_BI: u32 = 1 << 4;
pub const SHADOW_THRE: u32 = 1 << 5;
pub const SHADOW_TEMT: u32 = 1 << 6;
pub const SHADOW_DCTS: u32 = 1 << 16;
pub const SHADOW_DDCD: u32 = 1 << 19;
pub const SHADOW_CTS: u32 = 1 << 20;
pub const SHADOW_DCD: u32 = 1 << 23;
pub const SHADOW_DTR: u32 = 1 << 24;
pub const SHADOW_RTS: u32 = 1 << 25;
pub const SHADOW_MCR_SHIFT: u32 = 24;
pub const SHADOW_MCR_MASK: u32 = 0xff00_0000;

/*
 * TX ring status/control byte
 */
pub const TXCB_INT_WHEN_DONE: u8 = 1 << 5;
pub const TXCB_VALID: u8 = 1 << 6;

/*
 * RX ring status byte
 */
pub const RXSB_OVERRUN: u8 = 1 << 0;
pub const RXSB_PAR_ERR: u8 = 1 << 1;
pub const RXSB_FRAME_ERR: u8 = 1 << 2;
pub const RXSB_BREAK: u8 = 1 << 3;
pub const RXSB_CTS: u8 = 1 << 4;
pub const RXSB_DCD: u8 = 1 << 5;
pub const RXSB_MODEM_VALID: u8 = 1 << 6;
pub const RXSB_DATA_VALID: u8 = 1 << 7;
pub const RXSB_ANY_VALID: u8 = RXSB_MODEM_VALID | RXSB_DATA_VALID;
pub const RXSB_ERR_MASK: u8 = RXSB_PAR_ERR | RXSB_FRAME_ERR | RXSB_BREAK;

/*
 * PCI error address (low word)
 */
pub const PCI_ERR_ADDR_VLD: u32 = 1 << 0;
pub const PCI_ERR_ADDR_MST_ID_MASK: u32 = 0x0000_001e;
pub const PCI_ERR_ADDR_MST_ID_SHIFT: u32 = 1;
pub const PCI_ERR_ADDR_MUL_ERR: u32 = 1 << 5;
pub const PCI_ERR_ADDR_ADDR_MASK: u32 = 0xffff_ffc0;

bitstruct! {
    /// Representation of the per-port Serial Status/Control Register.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Sscr(pub u32) {
        /// RX high-water mark, in ring entries.
        pub rx_threshold: u16 = 0..9;

        reserved0: u8 = 9..16;

        /// Start ring buffer DMA.
        pub dma_en: bool = 16;

        /// Request that DMA pause.
        pub dma_pause: bool = 17;

        /// Set by hardware once a requested pause has taken effect.
        pub pause_state: bool = 18;

        /// Reset the DMA channels for this port.
        pub reset: bool = 19;

        /// Hardware flow control enable.
        pub hfc_en: bool = 20;

        /// Record DCD transitions in the RX ring.
        pub rx_ring_dcd: bool = 21;

        /// Record CTS transitions in the RX ring.
        pub rx_ring_cts: bool = 22;

        /// Bypass the clock divider (simulation only).
        pub diag: bool = 23;

        reserved1: u8 = 24..27;

        /// Flush the RX construction buffer to memory.
        pub rx_drain: bool = 27;

        reserved2: u8 = 28..32;
    }
}

/// Largest value representable in the SSCR RX threshold field.
pub const SSCR_RX_THRESHOLD_MAX: u32 = 0x1ff;
