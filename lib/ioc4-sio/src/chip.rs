// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Attachment of the serial engine to one IOC4.

use std::sync::{Arc, Weak};

use slog::{error, info, o, Logger};

use crate::hw::{PortIndex, RegAccess};
use crate::ops::SerialOps;
use crate::port::Port;
use crate::ring::RingBuffer;
use crate::tunables::Tunables;
use crate::upcall::Upcalls;
use crate::Result;

/// Interrupt callback. Receives the pending bits within its registered mask.
pub type IntrHandler = Box<dyn Fn(u32) + Send + Sync>;

/// Chip interrupt register a handler is attached to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IntrClass {
    /// SIO_IR, the per-port serial conditions.
    Serial,
    /// OTHER_IR, where the serial DMA error bits live.
    Other,
}

/// Services the platform provides to the serial engine.
///
/// Interrupt dispatch is the platform's business: when a registered mask
/// has pending bits, it is expected to mask them in the matching enable
/// register and then call the handler, which restores the enables it wants
/// before returning.
pub trait ChipBus: Send + Sync {
    /// PIO access to the chip's register BAR.
    fn regs(&self) -> Arc<dyn RegAccess>;

    /// Bus address at which the chip's DMA engine sees `ring`, or `None` if
    /// it cannot be made visible.
    fn dma_addr(&self, ring: &Arc<RingBuffer>) -> Option<u64>;

    /// Hands a ready port to the upper serial layer.
    fn register_port(
        &self,
        index: PortIndex,
        port: Arc<dyn SerialOps>,
    ) -> Result<()>;

    fn register_intr(
        &self,
        class: IntrClass,
        mask: u32,
        handler: IntrHandler,
    ) -> Result<()>;
}

/// The four serial ports of one attached IOC4.
pub struct Chip {
    ports: Vec<Arc<Port>>,
    log: Logger,
}

impl Chip {
    /// Initializes all four ports, publishes them to the upper layer and
    /// wires up their interrupts.
    ///
    /// Should any step fail, every port created so far is quiesced and
    /// marked detached before the error is returned.
    pub fn attach(
        bus: &dyn ChipBus,
        upcalls: Arc<dyn Upcalls>,
        tunables: Tunables,
        log: &Logger,
    ) -> Result<Self> {
        let log = log.new(o!("component" => "ioc4-sio"));
        let mut ports = Vec::with_capacity(PortIndex::ALL.len());

        let res = Self::init_ports(bus, &upcalls, &tunables, &log, &mut ports)
            .and_then(|()| Self::register(bus, &ports));
        if let Err(e) = res {
            error!(log, "attach failed"; "error" => %e);
            for port in ports.iter() {
                port.shutdown();
            }
            return Err(e);
        }

        info!(log, "attached";
            "ports" => ports.len(),
            "ring_entries" => tunables.ring_size.entries());
        Ok(Self { ports, log })
    }

    fn init_ports(
        bus: &dyn ChipBus,
        upcalls: &Arc<dyn Upcalls>,
        tunables: &Tunables,
        log: &Logger,
        ports: &mut Vec<Arc<Port>>,
    ) -> Result<()> {
        let mmio = bus.regs();
        for pair in PortIndex::ALL.chunks(2) {
            let ring = RingBuffer::alloc(tunables.ring_size)?;
            for &index in pair {
                let port = Arc::new(Port::new(
                    index,
                    mmio.clone(),
                    ring.clone(),
                    tunables.clone(),
                    upcalls.clone(),
                    log.new(o!("port" => index.as_usize())),
                ));
                ports.push(port.clone());
                port.hardware_init(bus)?;
            }
        }
        Ok(())
    }

    fn register(bus: &dyn ChipBus, ports: &[Arc<Port>]) -> Result<()> {
        for port in ports {
            let hooks = port.hooks();
            bus.register_port(port.index(), port.clone())?;

            let weak = Arc::downgrade(port);
            bus.register_intr(
                IntrClass::Serial,
                hooks.intr_all,
                Box::new(move |pending| {
                    if let Some(port) = Weak::upgrade(&weak) {
                        port.serial_intr(pending);
                    }
                }),
            )?;

            let weak = Arc::downgrade(port);
            bus.register_intr(
                IntrClass::Other,
                hooks.dma_error,
                Box::new(move |_| {
                    if let Some(port) = Weak::upgrade(&weak) {
                        let _ = port.dma_error_intr();
                    }
                }),
            )?;
        }
        Ok(())
    }

    pub fn port(&self, index: PortIndex) -> &Arc<Port> {
        &self.ports[index.as_usize()]
    }

    pub fn ports(&self) -> &[Arc<Port>] {
        &self.ports
    }

    /// Detaches every port, telling the upper layer about each first.
    pub fn kill(&self) {
        for port in self.ports.iter() {
            port.kill();
        }
        info!(self.log, "detached");
    }
}
