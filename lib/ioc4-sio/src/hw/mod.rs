// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod bits;
pub mod hooks;
pub mod regs;

#[cfg(test)]
pub(crate) mod sim;

pub use hooks::{Hooks, PortIndex, RingPair};
pub use regs::{ChipRegs, PortRegs, RegAccess};
