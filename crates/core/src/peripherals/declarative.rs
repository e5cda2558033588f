// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::bridge::PeripheralBridge;
use super::memory::RandomAccessMemory;
use super::{CoreContext, PeripheralCore, PeripheralSpec, RawWindow};
use crate::bus::BusInterface;
use crate::event::EventHandle;
use crate::register::{Access, FieldSpec};
use crate::signals::TriggerMode;
use crate::{FabricError, FabricResult};
use socfab_config::{FieldKind, PeripheralDescriptor, RegisterFieldDescriptor};

fn access(access: socfab_config::Access) -> Access {
    match access {
        socfab_config::Access::ReadWrite => Access::ReadWrite,
        socfab_config::Access::ReadOnly => Access::ReadOnly,
        socfab_config::Access::WriteOnly => Access::WriteOnly,
        socfab_config::Access::WriteZeroToClear => Access::WriteZeroToClear,
    }
}

fn trigger_mode(mode: socfab_config::TriggerMode) -> TriggerMode {
    match mode {
        socfab_config::TriggerMode::Rise => TriggerMode::Rise,
        socfab_config::TriggerMode::Fall => TriggerMode::Fall,
        socfab_config::TriggerMode::Level => TriggerMode::Level,
    }
}

fn field(reg: &RegisterFieldDescriptor) -> FabricResult<FieldSpec> {
    let missing = |key: &str| {
        FabricError::Configuration(format!("Register '{}' is missing '{}'", reg.name, key))
    };
    let spec = match reg.kind {
        FieldKind::Constant => {
            let value = reg.value.ok_or_else(|| missing("value"))?;
            let width = reg.width.ok_or_else(|| missing("width"))?;
            return Ok(FieldSpec::constant(&reg.name, reg.address, value, width));
        }
        FieldKind::Bit => {
            let bit = reg.bit.ok_or_else(|| missing("bit"))?;
            FieldSpec::bit(&reg.name, reg.address, bit)
        }
        FieldKind::Word => FieldSpec::word(&reg.name, reg.address),
        FieldKind::Variable => {
            let source = reg.width_source.as_deref().ok_or_else(|| missing("width_source"))?;
            FieldSpec::variable(&reg.name, reg.address, source)
        }
    };
    let spec = spec.with_reset(reg.reset.unwrap_or(0));
    Ok(match reg.access {
        Some(a) => spec.with_access(access(a)),
        None => spec,
    })
}

/// Register and event layout of a descriptor. Addresses are in units of `register_width` bits,
/// which is bytes on a byte-granular bus.
pub fn spec_from_descriptor(
    desc: &PeripheralDescriptor,
    register_width: u32,
) -> FabricResult<PeripheralSpec> {
    let mut builder = PeripheralSpec::builder(&desc.peripheral)
        .register_width(register_width)
        .word_width(desc.word_width.unwrap_or(32))
        .alignment(desc.alignment.unwrap_or(0));
    for reg in &desc.registers {
        builder = builder.field(field(reg)?);
    }
    for ev in &desc.events {
        builder = builder.event(&ev.name, ev.bit, trigger_mode(ev.mode));
    }
    builder.build()
}

#[derive(Debug)]
struct PeriodicSource {
    name: String,
    period: u64,
    remaining: u64,
    handle: Option<EventHandle>,
}

/// Peripheral with no behavior beyond its register file, event sources that pulse on a fixed
/// period, and plain memory windows.
#[derive(Debug)]
pub struct DeclarativePeripheral {
    attributes: Vec<(String, u64)>,
    periodic: Vec<PeriodicSource>,
    unsourced: Vec<String>,
    windows: Vec<RawWindow>,
}

impl DeclarativePeripheral {
    /// `template` supplies the interface of any memory windows the descriptor declares.
    pub fn new(desc: &PeripheralDescriptor, template: BusInterface) -> FabricResult<Self> {
        let mut attributes: Vec<(String, u64)> = desc
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        attributes.sort();

        let mut periodic = Vec::new();
        let mut unsourced = Vec::new();
        for ev in &desc.events {
            match ev.period_cycles {
                Some(0) => {
                    return Err(FabricError::Configuration(format!(
                        "Event '{}' cannot have a period of zero cycles",
                        ev.name
                    )))
                }
                Some(period) => periodic.push(PeriodicSource {
                    name: ev.name.clone(),
                    period,
                    remaining: period,
                    handle: None,
                }),
                None => unsourced.push(ev.name.clone()),
            }
        }

        let mut windows = Vec::new();
        for w in &desc.windows {
            let size = w.size.bytes().map_err(|e| {
                FabricError::Configuration(format!("Window '{}': {}", w.name, e))
            })?;
            let units = size
                .checked_mul(8)
                .map(|bits| bits / u64::from(template.granularity()))
                .ok_or_else(|| {
                    FabricError::Configuration(format!("Window '{}' is too large", w.name))
                })?;
            let ram = RandomAccessMemory::new(template, units, w.writable)?;
            windows.push(RawWindow {
                name: w.name.clone(),
                addr: w.address,
                target: Box::new(ram),
            });
        }

        Ok(Self {
            attributes,
            periodic,
            unsourced,
            windows,
        })
    }
}

impl PeripheralCore for DeclarativePeripheral {
    fn elaborate(&mut self, ctx: &mut CoreContext<'_>) -> FabricResult<()> {
        for (name, value) in &self.attributes {
            ctx.registers.set_attribute(name, *value);
        }
        for source in &mut self.periodic {
            source.handle = Some(ctx.events.event(&source.name)?);
        }
        for name in &self.unsourced {
            tracing::warn!("Event '{}' has no source and will never fire", name);
        }
        Ok(())
    }

    fn take_windows(&mut self) -> Vec<RawWindow> {
        std::mem::take(&mut self.windows)
    }

    fn tick(&mut self, ctx: &mut CoreContext<'_>) {
        for source in &mut self.periodic {
            let Some(handle) = source.handle else {
                continue;
            };
            source.remaining -= 1;
            let fire = source.remaining == 0;
            if fire {
                source.remaining = source.period;
            }
            ctx.events.drive(handle, fire);
        }
    }
}

/// A peripheral laid out by `desc` as a bus-attachable bridge.
pub fn declarative(
    name: &str,
    desc: &PeripheralDescriptor,
    template: BusInterface,
) -> FabricResult<PeripheralBridge> {
    let spec = spec_from_descriptor(desc, template.granularity())?;
    let core = DeclarativePeripheral::new(desc, template)?;
    PeripheralBridge::new(name, &spec, Box::new(core), template)
}
