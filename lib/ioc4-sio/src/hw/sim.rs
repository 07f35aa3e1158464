// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register-level model of an IOC4, along with the harness the unit tests
//! drive it through.
//!
//! The model moves data only when told to: TX entries are consumed by
//! [`SimChip::drain_tx`] (or on every producer write with `auto_tx` set),
//! and RX entries appear through the `deposit_*` helpers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use slog::{o, Drain, Logger};

use super::bits::*;
use super::hooks::PortIndex;
use super::regs::RegAccess;
use crate::chip::{Chip, ChipBus, IntrClass, IntrHandler};
use crate::ops::SerialOps;
use crate::port::Port;
use crate::ring::{Direction, RingBuffer, RingEntry, RingSize, SubRing};
use crate::tunables::Tunables;
use crate::upcall::{NcsError, Upcalls};
use crate::{Error, Result};

/// Bus address handed out for the first ring region.
const BUS_BASE: u64 = 0x8000_0000;
const BUS_STRIDE: u64 = 0x10_0000;

/// Fault injection.
#[derive(Default)]
pub(crate) struct Knobs {
    /// SIO_CR never reports the arbiter idle.
    pub wedge_arbiter: bool,
    /// SSCR never reports a requested pause as taken.
    pub wedge_pause: bool,
    /// RX drain requests never complete.
    pub wedge_drain: bool,
    /// Transmit as soon as the producer moves while DMA runs.
    pub auto_tx: bool,
    /// Hand out ring addresses off their natural alignment.
    pub misalign: bool,
    pub fail_dma: bool,
    /// Fail translation once this many rings have been mapped.
    pub fail_dma_after: Option<usize>,
    pub refuse_intrs: bool,
}

#[derive(Default)]
pub(crate) struct SimPort {
    pub sscr: u32,
    pub stpir: u32,
    pub stcir: u32,
    pub srpir: u32,
    pub srcir: u32,
    pub srtr: u32,
    pub shadow: u32,
    /// Every value written to SSCR, oldest first.
    pub sscr_writes: Vec<u32>,
    /// SRCIR writes carrying the timer arm bit.
    pub arms: usize,

    pub lcr: u8,
    pub ier: u8,
    pub mcr: u8,
    pub fcr_writes: Vec<u8>,
    pub dll: u8,
    pub dlm: u8,
    pub scr: u8,

    /// Bytes received but not yet flushed to the RX ring.
    pub construction: VecDeque<u8>,
    /// Bytes the transmitter has put on the wire.
    pub sent: Vec<u8>,
}

#[derive(Default)]
pub(crate) struct SimState {
    pub sio_ies: u32,
    pub other_ies: u32,
    /// (high, low) per port pair.
    pub sbbr: [(u32, u32); 2],
    /// Edge-triggered SIO_IR conditions awaiting acknowledgement.
    pub latched: u32,
    pub other_ir: u32,
    pub gppr: [u32; GPPR_COUNT],
    /// (low, high)
    pub pci_err: (u32, u32),
    pub ports: [SimPort; 4],
    pub knobs: Knobs,
    pub rings: Vec<(u64, Arc<RingBuffer>)>,
}

pub(crate) struct SimRegs {
    size: RingSize,
    state: Mutex<SimState>,
}

/// Splits a BAR offset into (port, register) within a per-port block.
fn port_reg(offset: usize, base: usize, stride: usize) -> Option<(usize, usize)> {
    let rel = offset.checked_sub(base)?;
    let idx = rel / stride;
    (idx < 4).then_some((idx, rel % stride))
}

impl SimRegs {
    pub fn with_state<R>(&self, f: impl FnOnce(&SimState) -> R) -> R {
        f(&self.state.lock().unwrap())
    }

    pub fn with_port<R>(
        &self,
        idx: PortIndex,
        f: impl FnOnce(&SimPort) -> R,
    ) -> R {
        f(&self.state.lock().unwrap().ports[idx.as_usize()])
    }

    pub fn with_port_mut<R>(
        &self,
        idx: PortIndex,
        f: impl FnOnce(&mut SimPort) -> R,
    ) -> R {
        f(&mut self.state.lock().unwrap().ports[idx.as_usize()])
    }

    pub fn knobs(&self, f: impl FnOnce(&mut Knobs)) {
        f(&mut self.state.lock().unwrap().knobs)
    }

    /// Level-triggered SIO_IR conditions derived from the ring pointers.
    fn level(&self, st: &SimState) -> u32 {
        let mut bits = 0;
        for idx in PortIndex::ALL {
            let p = &st.ports[idx.as_usize()];
            let hooks = idx.hooks();
            if p.stpir == p.stcir {
                bits |= hooks.tx_mt;
            }
            let threshold = Sscr(p.sscr).rx_threshold() as u32;
            if threshold != 0
                && self.size.distance(p.srcir, p.srpir) >= threshold * 8
            {
                bits |= hooks.rx_high;
            }
        }
        bits
    }

    fn subring(
        &self,
        st: &SimState,
        idx: PortIndex,
        dir: Direction,
    ) -> Option<SubRing> {
        let (hi, lo) = st.sbbr[idx.as_usize() / 2];
        let addr = (u64::from(hi) << 32) | u64::from(lo & !SBBR_L_SIZE_4K);
        st.rings
            .iter()
            .find(|(a, _)| *a == addr)
            .map(|(_, ring)| ring.subring(idx, dir))
    }

    /// Places entries at the RX producer, stopping when the ring is full.
    fn push_rx(
        &self,
        st: &mut SimState,
        idx: PortIndex,
        entries: impl IntoIterator<Item = RingEntry>,
    ) -> usize {
        let Some(ring) = self.subring(st, idx, Direction::Rx) else {
            return 0;
        };
        let p = &mut st.ports[idx.as_usize()];
        let mut count = 0;
        for entry in entries {
            if self.size.next(p.srpir) == p.srcir {
                break;
            }
            ring.store(p.srpir, entry);
            p.srpir = self.size.next(p.srpir);
            count += 1;
        }
        count
    }

    fn data_entries(bytes: &[u8]) -> impl Iterator<Item = RingEntry> + '_ {
        bytes.chunks(4).map(|chunk| {
            let mut e = RingEntry::default();
            for (lane, b) in chunk.iter().enumerate() {
                e.data[lane] = *b;
                e.sc[lane] = RXSB_DATA_VALID;
            }
            e
        })
    }

    fn flush_construction(&self, st: &mut SimState, idx: PortIndex) {
        let pending: Vec<u8> =
            st.ports[idx.as_usize()].construction.drain(..).collect();
        let entries: Vec<_> = Self::data_entries(&pending).collect();
        let stored = self.push_rx(st, idx, entries);
        // anything which did not fit stays behind
        let leftover = pending.iter().skip(stored * 4).copied();
        st.ports[idx.as_usize()].construction.extend(leftover);
    }

    fn run_tx(&self, st: &mut SimState, idx: PortIndex) {
        let Some(ring) = self.subring(st, idx, Direction::Tx) else {
            return;
        };
        let p = &mut st.ports[idx.as_usize()];
        let mut explicit = false;
        while p.stcir != p.stpir {
            let entry = ring.load(p.stcir);
            for lane in 0..entry.sc.len() {
                if entry.sc[lane] & TXCB_VALID != 0 {
                    p.sent.push(entry.data[lane]);
                }
                if entry.sc[lane] & TXCB_INT_WHEN_DONE != 0 {
                    explicit = true;
                }
            }
            ring.store(p.stcir, RingEntry::default());
            p.stcir = self.size.next(p.stcir);
        }
        if explicit {
            st.latched |= idx.hooks().tx_explicit;
        }
    }

    fn tx_running(st: &SimState, idx: PortIndex) -> bool {
        let sscr = Sscr(st.ports[idx.as_usize()].sscr);
        st.knobs.auto_tx && sscr.dma_en() && !sscr.dma_pause()
    }
}

impl RegAccess for SimRegs {
    fn read32(&self, offset: usize) -> u32 {
        let st = self.state.lock().unwrap();
        match offset {
            REG_PCI_ERR_ADDR_L => st.pci_err.0,
            REG_PCI_ERR_ADDR_H => st.pci_err.1,
            REG_SIO_IR => st.latched | self.level(&st),
            REG_OTHER_IR => st.other_ir,
            REG_SIO_IES => st.sio_ies,
            REG_OTHER_IES => st.other_ies,
            REG_SIO_CR if st.knobs.wedge_arbiter => 0,
            REG_SIO_CR => SIO_CR_ARB_DIAG_IDLE,
            REG_SBBR01_H => st.sbbr[0].0,
            REG_SBBR01_L => st.sbbr[0].1,
            REG_SBBR23_H => st.sbbr[1].0,
            REG_SBBR23_L => st.sbbr[1].1,
            _ => {
                let Some((idx, reg)) =
                    port_reg(offset, REG_PORT_BASE, PORT_STRIDE)
                else {
                    return 0;
                };
                let p = &st.ports[idx];
                match reg {
                    SER_SSCR => {
                        let sscr = Sscr(p.sscr);
                        let taken = sscr.dma_pause() && !st.knobs.wedge_pause;
                        sscr.with_pause_state(taken).0
                    }
                    SER_STPIR => p.stpir,
                    SER_STCIR => p.stcir,
                    SER_SRPIR => p.srpir,
                    SER_SRCIR => p.srcir,
                    SER_SRTR => p.srtr,
                    SER_SHADOW => p.shadow,
                    _ => 0,
                }
            }
        }
    }

    fn write32(&self, offset: usize, val: u32) {
        let mut st = self.state.lock().unwrap();
        match offset {
            REG_SIO_IR => st.latched &= !val,
            REG_OTHER_IR => st.other_ir &= !val,
            REG_SIO_IES => st.sio_ies |= val,
            REG_SIO_IEC => st.sio_ies &= !val,
            REG_OTHER_IES => st.other_ies |= val,
            REG_OTHER_IEC => st.other_ies &= !val,
            REG_SBBR01_H => st.sbbr[0].0 = val,
            REG_SBBR01_L => st.sbbr[0].1 = val,
            REG_SBBR23_H => st.sbbr[1].0 = val,
            REG_SBBR23_L => st.sbbr[1].1 = val,
            o if (REG_GPPR_BASE..REG_GPPR_BASE + GPPR_COUNT * 4)
                .contains(&o) =>
            {
                st.gppr[(o - REG_GPPR_BASE) / 4] = val;
            }
            _ => {
                let Some((n, reg)) =
                    port_reg(offset, REG_PORT_BASE, PORT_STRIDE)
                else {
                    return;
                };
                let idx = PortIndex::ALL[n];
                let mask = self.size.ptr_mask();
                match reg {
                    SER_SSCR => {
                        st.ports[n].sscr = val;
                        st.ports[n].sscr_writes.push(val);
                        let sscr = Sscr(val);
                        if sscr.rx_drain() && !st.knobs.wedge_drain {
                            self.flush_construction(&mut st, idx);
                            st.ports[n].sscr = sscr.with_rx_drain(false).0;
                        }
                        if Self::tx_running(&st, idx) {
                            self.run_tx(&mut st, idx);
                        }
                    }
                    SER_STPIR => {
                        st.ports[n].stpir = val & mask;
                        if Self::tx_running(&st, idx) {
                            self.run_tx(&mut st, idx);
                        }
                    }
                    SER_SRCIR => {
                        let p = &mut st.ports[n];
                        if val & SRCIR_ARM != 0 {
                            p.arms += 1;
                        }
                        p.srcir = val & mask;
                    }
                    SER_SRTR => st.ports[n].srtr = val,
                    SER_SHADOW => {
                        let p = &mut st.ports[n];
                        p.shadow = (p.shadow & !SHADOW_MCR_MASK)
                            | (val & SHADOW_MCR_MASK);
                    }
                    _ => {}
                }
            }
        }
    }

    fn read8(&self, offset: usize) -> u8 {
        let st = self.state.lock().unwrap();
        let Some((n, reg)) = port_reg(offset, REG_UART_BASE, UART_STRIDE)
        else {
            return 0xff;
        };
        let p = &st.ports[n];
        let dlab = p.lcr & LCR_DLAB != 0;
        match reg {
            UART_DLL if dlab => p.dll,
            UART_DLM if dlab => p.dlm,
            UART_RHR => 0,
            UART_IER => p.ier,
            UART_IIR => 0x01,
            UART_LCR => p.lcr,
            UART_MCR => p.mcr,
            UART_LSR => 0x60,
            UART_MSR => (p.shadow >> 16) as u8,
            UART_SCR => p.scr,
            _ => 0xff,
        }
    }

    fn write8(&self, offset: usize, val: u8) {
        let mut st = self.state.lock().unwrap();
        let Some((n, reg)) = port_reg(offset, REG_UART_BASE, UART_STRIDE)
        else {
            return;
        };
        let p = &mut st.ports[n];
        let dlab = p.lcr & LCR_DLAB != 0;
        match reg {
            UART_DLL if dlab => p.dll = val,
            UART_DLM if dlab => p.dlm = val,
            UART_THR => {}
            UART_IER => p.ier = val,
            UART_FCR => p.fcr_writes.push(val),
            UART_LCR => p.lcr = val,
            UART_MCR => p.mcr = val,
            UART_SCR => p.scr = val,
            _ => {}
        }
    }
}

type SimHandler = Arc<dyn Fn(u32) + Send + Sync>;

/// A simulated IOC4 together with the platform side of [`ChipBus`].
pub(crate) struct SimChip {
    pub regs: Arc<SimRegs>,
    ports: Mutex<Vec<(PortIndex, Arc<dyn SerialOps>)>>,
    handlers: Mutex<Vec<(IntrClass, u32, SimHandler)>>,
}

impl SimChip {
    pub fn new(size: RingSize) -> Arc<Self> {
        Arc::new(Self {
            regs: Arc::new(SimRegs {
                size,
                state: Mutex::new(SimState::default()),
            }),
            ports: Mutex::new(Vec::new()),
            handlers: Mutex::new(Vec::new()),
        })
    }

    pub fn registered_ports(&self) -> usize {
        self.ports.lock().unwrap().len()
    }

    pub fn registered_intrs(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }

    pub fn registered_port(
        &self,
        idx: PortIndex,
    ) -> Option<Arc<dyn SerialOps>> {
        self.ports
            .lock()
            .unwrap()
            .iter()
            .find(|(i, _)| *i == idx)
            .map(|(_, ops)| ops.clone())
    }

    /// Runs the transmitter up to the producer and returns what it sent.
    pub fn drain_tx(&self, idx: PortIndex) -> Vec<u8> {
        let mut st = self.regs.state.lock().unwrap();
        self.regs.run_tx(&mut st, idx);
        std::mem::take(&mut st.ports[idx.as_usize()].sent)
    }

    /// Entries in the TX ring carrying INT_WHEN_DONE.
    pub fn tx_int_marks(&self, idx: PortIndex) -> usize {
        let st = self.regs.state.lock().unwrap();
        let Some(ring) = self.regs.subring(&st, idx, Direction::Tx) else {
            return 0;
        };
        let size = ring.size();
        (0..size.entries())
            .map(|n| ring.load(n * 8))
            .filter(|e| e.sc.iter().any(|sc| sc & TXCB_INT_WHEN_DONE != 0))
            .count()
    }

    /// Receives `bytes` straight into the RX ring, four to an entry, and
    /// returns how many fit.
    pub fn deposit_rx(&self, idx: PortIndex, bytes: &[u8]) -> usize {
        let mut st = self.regs.state.lock().unwrap();
        let stored =
            self.regs.push_rx(&mut st, idx, SimRegs::data_entries(bytes));
        (stored * 4).min(bytes.len())
    }

    pub fn deposit_entries(&self, idx: PortIndex, entries: &[RingEntry]) {
        let mut st = self.regs.state.lock().unwrap();
        self.regs.push_rx(&mut st, idx, entries.iter().copied());
    }

    /// Receives `bytes` into the construction buffer, where they wait for
    /// a drain.
    pub fn stage_rx(&self, idx: PortIndex, bytes: &[u8]) {
        let mut st = self.regs.state.lock().unwrap();
        st.ports[idx.as_usize()].construction.extend(bytes);
    }

    /// Advances the RX producer over an entry whose DMA has not landed.
    pub fn publish_unfilled(&self, idx: PortIndex) {
        let mut st = self.regs.state.lock().unwrap();
        self.regs.push_rx(&mut st, idx, [RingEntry::default()]);
    }

    pub fn fire_rx_timer(&self, idx: PortIndex) {
        self.regs.state.lock().unwrap().latched |= idx.hooks().rx_timer;
    }

    pub fn set_dcd(&self, idx: PortIndex, on: bool) {
        self.set_modem(idx, SHADOW_DCD, idx.hooks().delta_dcd, on);
    }

    pub fn set_cts(&self, idx: PortIndex, on: bool) {
        self.set_modem(idx, SHADOW_CTS, idx.hooks().delta_cts, on);
    }

    fn set_modem(&self, idx: PortIndex, bit: u32, delta: u32, on: bool) {
        let mut st = self.regs.state.lock().unwrap();
        let p = &mut st.ports[idx.as_usize()];
        if on {
            p.shadow |= bit;
        } else {
            p.shadow &= !bit;
        }
        st.latched |= delta;
    }

    /// Captures a PCI error against `idx`'s DMA error condition.
    pub fn set_pci_error(&self, lo: u32, hi: u32, idx: PortIndex) {
        let mut st = self.regs.state.lock().unwrap();
        st.pci_err = (lo, hi);
        st.other_ir |= idx.hooks().dma_error;
    }

    /// Delivers every enabled, pending condition to its handler the way a
    /// platform interrupt dispatcher would. Returns whether anything ran.
    pub fn service(&self) -> bool {
        let handlers = self.handlers.lock().unwrap().clone();
        let mut ran = false;
        for (class, mask, handler) in handlers {
            let pending = {
                let st = self.regs.state.lock().unwrap();
                match class {
                    IntrClass::Serial => {
                        (st.latched | self.regs.level(&st)) & st.sio_ies & mask
                    }
                    IntrClass::Other => st.other_ir & st.other_ies & mask,
                }
            };
            if pending == 0 {
                continue;
            }
            match class {
                IntrClass::Serial => self.regs.write32(REG_SIO_IEC, mask),
                IntrClass::Other => self.regs.write32(REG_OTHER_IEC, mask),
            }
            handler(pending);
            ran = true;
        }
        ran
    }
}

impl ChipBus for SimChip {
    fn regs(&self) -> Arc<dyn RegAccess> {
        self.regs.clone()
    }

    fn dma_addr(&self, ring: &Arc<RingBuffer>) -> Option<u64> {
        let mut st = self.regs.state.lock().unwrap();
        let mapped = st.rings.len();
        if st.knobs.fail_dma
            || st.knobs.fail_dma_after.is_some_and(|n| mapped >= n)
        {
            return None;
        }
        let mut addr = BUS_BASE + mapped as u64 * BUS_STRIDE;
        if st.knobs.misalign {
            addr += 8;
        }
        st.rings.push((addr, ring.clone()));
        Some(addr)
    }

    fn register_port(
        &self,
        index: PortIndex,
        port: Arc<dyn SerialOps>,
    ) -> Result<()> {
        self.ports.lock().unwrap().push((index, port));
        Ok(())
    }

    fn register_intr(
        &self,
        class: IntrClass,
        mask: u32,
        handler: IntrHandler,
    ) -> Result<()> {
        if self.regs.state.lock().unwrap().knobs.refuse_intrs {
            return Err(Error::Bus(format!("no vector for {mask:#x}")));
        }
        self.handlers.lock().unwrap().push((class, mask, Arc::from(handler)));
        Ok(())
    }
}

/// Upcall as observed by [`Recorder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Event {
    DataReady(PortIndex),
    OutputLowat(PortIndex),
    Dcd(PortIndex, bool),
    Cts(PortIndex, bool),
    Ncs(PortIndex, NcsError),
    Detach(PortIndex),
}

type Hook = Arc<dyn Fn(&Event, &Port) + Send + Sync>;

/// Upper layer stand-in which records every upcall in order.
#[derive(Default)]
pub(crate) struct Recorder {
    events: Mutex<Vec<Event>>,
    hook: Mutex<Option<Hook>>,
    read_on_ready: AtomicBool,
    read_on_carrier: AtomicBool,
    received: Mutex<Vec<u8>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Runs `f` after each event is recorded, with no port lock held.
    pub fn set_hook(&self, f: impl Fn(&Event, &Port) + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Arc::new(f));
    }

    /// Read the ring dry from within `data_ready`.
    pub fn set_read_on_ready(&self, on: bool) {
        self.read_on_ready.store(on, Ordering::SeqCst);
    }

    /// Read the ring dry from within a carrier drop notification.
    pub fn set_read_on_carrier(&self, on: bool) {
        self.read_on_carrier.store(on, Ordering::SeqCst);
    }

    /// Bytes consumed by reads issued from within upcalls.
    pub fn received(&self) -> Vec<u8> {
        self.received.lock().unwrap().clone()
    }

    fn record(&self, ev: Event, port: &Port) {
        self.events.lock().unwrap().push(ev.clone());
        let hook = self.hook.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook(&ev, port);
        }
    }

    fn read_all(&self, port: &Port) {
        let mut buf = [0u8; 64];
        while let Ok(n @ 1..) = port.read(&mut buf) {
            self.received.lock().unwrap().extend_from_slice(&buf[..n]);
        }
    }
}

impl Upcalls for Recorder {
    fn data_ready(&self, port: &Port) {
        self.record(Event::DataReady(port.index()), port);
        if self.read_on_ready.load(Ordering::SeqCst) {
            self.read_all(port);
        }
    }
    fn output_lowat(&self, port: &Port) {
        self.record(Event::OutputLowat(port.index()), port);
    }
    fn dcd_change(&self, port: &Port, asserted: bool) {
        self.record(Event::Dcd(port.index(), asserted), port);
        if !asserted && self.read_on_carrier.load(Ordering::SeqCst) {
            self.read_all(port);
        }
    }
    fn cts_change(&self, port: &Port, asserted: bool) {
        self.record(Event::Cts(port.index(), asserted), port);
    }
    fn ncs(&self, port: &Port, err: NcsError) {
        self.record(Event::Ncs(port.index(), err), port);
    }
    fn detach(&self, port: &Port) {
        self.record(Event::Detach(port.index()), port);
    }
}

pub(crate) fn test_log() -> Logger {
    let decorator = slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    Logger::root(drain, o!())
}

/// A simulated chip with all four ports attached.
pub(crate) struct Harness {
    pub sim: Arc<SimChip>,
    pub up: Arc<Recorder>,
    pub chip: Chip,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(Tunables::default())
    }

    pub fn with(tunables: Tunables) -> Self {
        let sim = SimChip::new(tunables.ring_size);
        Self::attach(sim, tunables).unwrap()
    }

    pub fn attach(sim: Arc<SimChip>, tunables: Tunables) -> Result<Self> {
        let up = Arc::new(Recorder::default());
        let chip = Chip::attach(sim.as_ref(), up.clone(), tunables, &test_log())?;
        Ok(Self { sim, up, chip })
    }

    pub fn port(&self, idx: PortIndex) -> &Arc<Port> {
        self.chip.port(idx)
    }
}
