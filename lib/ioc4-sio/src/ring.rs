// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ring buffer memory shared with the IOC4 DMA engine.
//!
//! Each port pair shares one region holding four sub-rings laid out as
//! TX(first), RX(first), TX(second), RX(second). Producer and consumer
//! pointers are byte offsets into a sub-ring; because every sub-ring is a
//! power of two in size, wraparound is a mask rather than a modulus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::hw::bits::*;
use crate::hw::PortIndex;
use crate::Error;

/// Size of one ring entry in bytes.
pub const ENTRY_SIZE: u32 = 8;

/// Number of sub-rings in a shared region.
pub const SUBRINGS: usize = 4;

/// One DMA transfer unit: four data bytes followed by their four
/// status/control bytes.
#[repr(C)]
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    FromBytes,
    IntoBytes,
    Immutable,
    KnownLayout,
)]
pub struct RingEntry {
    pub data: [u8; 4],
    pub sc: [u8; 4],
}

impl RingEntry {
    fn from_raw(raw: u64) -> Self {
        zerocopy::transmute!(raw)
    }
    fn into_raw(self) -> u64 {
        zerocopy::transmute!(self)
    }

    /// True while any lane still carries data or modem status for software.
    pub fn rx_any_valid(&self) -> bool {
        self.sc.iter().any(|sc| sc & RXSB_ANY_VALID != 0)
    }
}

/// Sub-ring geometry.
///
/// The hardware supports 1 KiB and 4 KiB sub-rings; smaller power-of-two
/// sizes exist so the arithmetic can be exercised at its edges.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RingSize {
    entries: u32,
}

impl RingSize {
    pub const K1: RingSize = RingSize { entries: 1024 / ENTRY_SIZE };
    pub const K4: RingSize = RingSize { entries: 4096 / ENTRY_SIZE };

    pub fn new(entries: u32) -> Result<Self, Error> {
        if entries < 2
            || !entries.is_power_of_two()
            || entries > Self::K4.entries
        {
            return Err(Error::InvalidRingSize(entries as usize));
        }
        Ok(Self { entries })
    }

    pub const fn entries(self) -> u32 {
        self.entries
    }

    /// Bytes in one sub-ring.
    pub const fn bytes(self) -> u32 {
        self.entries * ENTRY_SIZE
    }

    /// Bytes in the whole shared region, which is also its alignment.
    pub const fn region_bytes(self) -> usize {
        self.bytes() as usize * SUBRINGS
    }

    /// Mask applied to producer/consumer registers.
    pub const fn ptr_mask(self) -> u32 {
        (self.bytes() - 1) & !(ENTRY_SIZE - 1)
    }

    /// Whether SBBR should select the 4 KiB pointer format.
    pub const fn is_4k(self) -> bool {
        self.bytes() == 4096
    }

    /// Default RX high-water mark: three quarters of the ring.
    pub const fn hiwat_entries(self) -> u16 {
        (self.entries * 3 / 4) as u16
    }

    pub const fn next(self, ptr: u32) -> u32 {
        ptr.wrapping_add(ENTRY_SIZE) & self.ptr_mask()
    }

    pub const fn prev(self, ptr: u32) -> u32 {
        ptr.wrapping_sub(ENTRY_SIZE) & self.ptr_mask()
    }

    /// Bytes from `from` forward to `to`.
    pub const fn distance(self, from: u32, to: u32) -> u32 {
        to.wrapping_sub(from) & self.ptr_mask()
    }
}

impl Default for RingSize {
    fn default() -> Self {
        Self::K4
    }
}

impl TryFrom<String> for RingSize {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "1k" => Ok(Self::K1),
            "4k" => Ok(Self::K4),
            other => {
                let entries = other
                    .parse::<u32>()
                    .map_err(|_| Error::InvalidRingSize(0))?;
                Self::new(entries)
            }
        }
    }
}

impl From<RingSize> for String {
    fn from(value: RingSize) -> Self {
        match value {
            RingSize::K1 => "1k".to_string(),
            RingSize::K4 => "4k".to_string(),
            other => other.entries.to_string(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
}

/// Region shared by a port pair with the DMA engine.
pub struct RingBuffer {
    size: RingSize,
    mem: Box<[AtomicU64]>,
}

impl RingBuffer {
    /// Allocates a zeroed region holding all four sub-rings.
    pub fn alloc(size: RingSize) -> Result<Arc<Self>, Error> {
        let count = size.entries() as usize * SUBRINGS;
        let mut mem = Vec::new();
        mem.try_reserve_exact(count).map_err(|_| Error::AllocationFailed)?;
        mem.extend((0..count).map(|_| AtomicU64::new(0)));
        Ok(Arc::new(Self { size, mem: mem.into_boxed_slice() }))
    }

    pub fn size(&self) -> RingSize {
        self.size
    }

    /// Host address of the region, for bus address translation.
    pub fn host_addr(&self) -> usize {
        self.mem.as_ptr() as usize
    }

    /// View of the sub-ring a port uses in the given direction.
    pub fn subring(self: &Arc<Self>, port: PortIndex, dir: Direction) -> SubRing {
        let slot = match (port.is_pair_leader(), dir) {
            (true, Direction::Tx) => 0,
            (true, Direction::Rx) => 1,
            (false, Direction::Tx) => 2,
            (false, Direction::Rx) => 3,
        };
        SubRing {
            buf: Arc::clone(self),
            base: slot * self.size.entries() as usize,
        }
    }

    fn slot(&self, base: usize, ptr: u32) -> &AtomicU64 {
        let idx = (ptr & self.size.ptr_mask()) / ENTRY_SIZE;
        &self.mem[base + idx as usize]
    }
}

/// One port's view of a direction within the shared region.
#[derive(Clone)]
pub struct SubRing {
    buf: Arc<RingBuffer>,
    base: usize,
}

impl SubRing {
    pub fn size(&self) -> RingSize {
        self.buf.size
    }

    pub fn load(&self, ptr: u32) -> RingEntry {
        RingEntry::from_raw(self.buf.slot(self.base, ptr).load(Ordering::Acquire))
    }

    pub fn store(&self, ptr: u32, entry: RingEntry) {
        self.buf.slot(self.base, ptr).store(entry.into_raw(), Ordering::Release);
    }
}
