// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{FabricError, FabricResult};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Trait representing a system interrupt controller.
///
/// Peripheral lines are identified by their priority number; the pending set is a bitmask
/// indexed by the same numbers.
pub trait InterruptController: Debug + Send {
    fn width(&self) -> u32;

    /// Drives the line registered at `priority`.
    fn set_line(&mut self, priority: u32, asserted: bool);

    fn pending(&self) -> u64;

    /// Lowest asserted priority number.
    fn highest_pending(&self) -> Option<u32> {
        let pending = self.pending();
        (pending != 0).then(|| pending.trailing_zeros())
    }
}

/// Fixed-width controller collecting one line per peripheral.
#[derive(Debug, Clone)]
pub struct GenericInterruptController {
    width: u32,
    lines: BTreeMap<u32, String>,
    pending: u64,
}

impl GenericInterruptController {
    pub fn new(width: u32) -> FabricResult<Self> {
        if width == 0 || width > 64 {
            return Err(FabricError::Configuration(format!(
                "Interrupt controller width must be within 1..=64, not {}",
                width
            )));
        }
        Ok(Self {
            width,
            lines: BTreeMap::new(),
            pending: 0,
        })
    }

    pub fn add_irq(&mut self, name: &str, priority: u32) -> FabricResult<()> {
        if priority >= self.width {
            return Err(FabricError::Configuration(format!(
                "IRQ priority {} for '{}' exceeds controller width {}",
                priority, name, self.width
            )));
        }
        if let Some(existing) = self.lines.get(&priority) {
            return Err(FabricError::Configuration(format!(
                "IRQ priority {} for '{}' is already taken by '{}'",
                priority, name, existing
            )));
        }
        tracing::info!("IRQ {} -> '{}'", priority, name);
        self.lines.insert(priority, name.to_string());
        Ok(())
    }

    pub fn lines(&self) -> impl Iterator<Item = (u32, &str)> {
        self.lines.iter().map(|(p, n)| (*p, n.as_str()))
    }
}

impl InterruptController for GenericInterruptController {
    fn width(&self) -> u32 {
        self.width
    }

    fn set_line(&mut self, priority: u32, asserted: bool) {
        if !self.lines.contains_key(&priority) {
            return;
        }
        if asserted {
            self.pending |= 1 << priority;
        } else {
            self.pending &= !(1 << priority);
        }
    }

    fn pending(&self) -> u64 {
        self.pending
    }
}
