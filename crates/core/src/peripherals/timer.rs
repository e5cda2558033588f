// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::bridge::PeripheralBridge;
use super::{CoreContext, PeripheralCore, PeripheralSpec};
use crate::bus::BusInterface;
use crate::event::EventHandle;
use crate::register::ElementHandle;
use crate::signals::TriggerMode;
use crate::{FabricError, FabricResult};

pub const CREATOR_ID: u64 = 0x1248;
pub const CREATION_ID: u64 = 0x0000;
pub const MAX_WIDTH: u32 = 32;

/// Register layout of the down-counting timer.
///
/// | Offset | Register      | Access                  |
/// |--------|---------------|-------------------------|
/// | 0x0    | `creator_id`  | 16-bit constant, 0x1248 |
/// | 0x2    | `creation_id` | 16-bit constant, 0x0000 |
/// | 0x4    | `reload`      | `width` bits, rw        |
/// | 0x8    | `enable`      | bit 0, rw               |
/// | 0xC    | `value`       | `width` bits, rw        |
///
/// Event `zero` (rise) is bit 0 of the event registers.
pub fn timer_spec() -> FabricResult<PeripheralSpec> {
    PeripheralSpec::builder("timer")
        .constant("creator_id", 0x0, CREATOR_ID, 16)
        .constant("creation_id", 0x2, CREATION_ID, 16)
        .variable("reload", 0x4, "width")
        .bit("enable", 0x8, 0)
        .variable("value", 0xC, "width")
        .event("zero", 0, TriggerMode::Rise)
        .build()
}

#[derive(Debug, Clone, Copy)]
struct TimerHandles {
    reload: ElementHandle,
    enable: ElementHandle,
    value: ElementHandle,
    zero: EventHandle,
}

/// General purpose down-counter. While enabled it decrements `value` every tick; at zero it
/// strobes `zero` and reloads.
#[derive(Debug)]
pub struct Timer {
    width: u32,
    handles: Option<TimerHandles>,
}

impl Timer {
    pub fn new(width: u32) -> FabricResult<Self> {
        if width > MAX_WIDTH {
            return Err(FabricError::Configuration(format!(
                "Counter width cannot be greater than {} (was: {})",
                MAX_WIDTH, width
            )));
        }
        Ok(Self {
            width,
            handles: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }
}

impl PeripheralCore for Timer {
    fn elaborate(&mut self, ctx: &mut CoreContext<'_>) -> FabricResult<()> {
        ctx.registers.set_attribute("width", u64::from(self.width));
        self.handles = Some(TimerHandles {
            reload: ctx.registers.resolve("reload")?,
            enable: ctx.registers.resolve("enable")?,
            value: ctx.registers.resolve("value")?,
            zero: ctx.events.event("zero")?,
        });
        Ok(())
    }

    fn tick(&mut self, ctx: &mut CoreContext<'_>) {
        let Some(h) = self.handles else {
            return;
        };
        let regs = &mut *ctx.registers;
        let mut zero = false;
        if regs.element(h.enable).value() != 0 {
            let value = regs.element(h.value).value();
            if value == 0 {
                zero = true;
                let reload = regs.element(h.reload).value();
                regs.element_mut(h.value).set(reload);
            } else {
                regs.element_mut(h.value).set(value - 1);
            }
        }
        ctx.events.drive(h.zero, zero);
    }
}

/// A timer of `width` bits as a bus-attachable peripheral.
pub fn timer(name: &str, template: BusInterface, width: u32) -> FabricResult<PeripheralBridge> {
    PeripheralBridge::new(name, &timer_spec()?, Box::new(Timer::new(width)?), template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::master::BusMaster;
    use crate::BusTarget;

    // Word addresses on a 32-bit bus.
    const ID: u64 = 0x0;
    const RELOAD: u64 = 0x1;
    const ENABLE: u64 = 0x2;
    const VALUE: u64 = 0x3;
    const EV_STATUS: u64 = 0x4;
    const EV_PENDING: u64 = 0x5;
    const EV_ENABLE: u64 = 0x6;

    fn template() -> BusInterface {
        BusInterface::new(30, 32, 8).unwrap()
    }

    #[test]
    fn test_layout() {
        let mut timer = timer("timer", template(), 32).unwrap();
        assert_eq!(timer.interface().span(), 0x20);
        let mut m = BusMaster::new();
        let done = m.read(&mut timer, ID).unwrap();
        assert_eq!(done.data, 0x0000_1248);
        assert_eq!(done.cycles, 5);
        assert!(Timer::new(33).is_err());
    }

    #[test]
    fn test_width_masks_registers() {
        let mut timer = timer("timer", template(), 16).unwrap();
        let mut m = BusMaster::new();
        m.write(&mut timer, RELOAD, 0x0001_2345, 0xF).unwrap();
        assert_eq!(m.read(&mut timer, RELOAD).unwrap().data, 0x2345);
        assert_eq!(timer.registers().get("reload").map(|e| e.width()), Some(16));
    }

    #[test]
    fn test_zero_event_raises_irq() {
        let mut timer = timer("timer", template(), 16).unwrap();
        let mut m = BusMaster::new();
        m.write(&mut timer, RELOAD, 3, 0xF).unwrap();
        m.write(&mut timer, EV_ENABLE, 1, 0xF).unwrap();
        assert!(!timer.irq());

        m.write(&mut timer, ENABLE, 1, 0xF).unwrap();
        assert!(timer.irq());
        assert_eq!(m.read(&mut timer, EV_PENDING).unwrap().data, 1);

        m.write(&mut timer, ENABLE, 0, 0xF).unwrap();
        m.write(&mut timer, EV_STATUS, 0, 0xF).unwrap();
        assert!(!timer.irq());
        assert_eq!(m.read(&mut timer, EV_STATUS).unwrap().data, 0);

        // Stopped counter keeps its value.
        let stopped = m.read(&mut timer, VALUE).unwrap().data;
        m.idle(&mut timer, 10).unwrap();
        assert_eq!(m.read(&mut timer, VALUE).unwrap().data, stopped);
    }

    #[test]
    fn test_counts_down_and_reloads() {
        let mut timer = timer("timer", template(), 8).unwrap();
        let mut m = BusMaster::new();
        m.write(&mut timer, VALUE, 2, 0xF).unwrap();
        m.write(&mut timer, RELOAD, 7, 0xF).unwrap();
        m.write(&mut timer, ENABLE, 1, 0xF).unwrap();
        let enable = timer.registers().get("enable").map(|e| e.value());
        assert_eq!(enable, Some(1));

        let mut seen = Vec::new();
        for _ in 0..12 {
            m.idle(&mut timer, 1).unwrap();
            seen.push(timer.registers().get("value").map_or(0, |e| e.value()));
        }
        assert!(seen.windows(2).all(|w| w[1] + 1 == w[0] || (w[0] == 0 && w[1] == 7)));
        assert!(seen.contains(&7));
    }
}
