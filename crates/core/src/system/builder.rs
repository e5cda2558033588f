// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::Soc;
use crate::bus::decoder::{AddressWindow, Partitioner};
use crate::bus::{BusInterface, Features};
use crate::interrupt::GenericInterruptController;
use crate::peripherals::declarative::declarative;
use crate::peripherals::memory::RandomAccessMemory;
use crate::peripherals::timer::timer;
use crate::{BusTarget, FabricResult};
use anyhow::Context;
use socfab_config::{
    BusDescriptor, BusFeature, PeripheralConfig, PeripheralDescriptor, SocDescriptor,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub fn bus_interface(desc: &BusDescriptor) -> FabricResult<BusInterface> {
    let features = desc.features.iter().fold(Features::empty(), |acc, f| {
        acc | match f {
            BusFeature::Cti => Features::CTI,
            BusFeature::Bte => Features::BTE,
            BusFeature::Err => Features::ERR,
        }
    });
    let bus = BusInterface::new(desc.addr_width, desc.data_width, desc.granularity)?;
    Ok(bus.with_features(features))
}

/// Assembles a [`Soc`] slot by slot.
#[derive(Debug)]
pub struct SocBuilder {
    name: String,
    fabric: Partitioner,
    intc: GenericInterruptController,
    routes: Vec<(String, u32)>,
}

impl SocBuilder {
    /// `window_size` is in granularity units; `irq_width` is the number of interrupt priorities.
    pub fn new(
        name: &str,
        bus: BusInterface,
        window_size: u64,
        irq_width: u32,
    ) -> FabricResult<Self> {
        Ok(Self {
            name: name.to_string(),
            fabric: Partitioner::new(name, bus, window_size)?,
            intc: GenericInterruptController::new(irq_width)?,
            routes: Vec::new(),
        })
    }

    pub fn window(&mut self, slot: usize) -> FabricResult<Arc<AddressWindow>> {
        self.fabric.slot(slot)
    }

    pub fn attach(
        &mut self,
        window: &AddressWindow,
        name: &str,
        target: Box<dyn BusTarget>,
    ) -> FabricResult<()> {
        self.fabric.attach(window, name, target)
    }

    /// Routes the interrupt line of the peripheral attached as `name` to `priority`.
    pub fn irq(&mut self, name: &str, priority: u32) -> FabricResult<()> {
        self.intc.add_irq(name, priority)?;
        self.routes.push((name.to_string(), priority));
        Ok(())
    }

    pub fn build(self) -> Soc {
        info!(
            "SoC '{}' built: {} peripherals, {} interrupt lines",
            self.name,
            self.fabric.memory_map().len(),
            self.routes.len()
        );
        Soc {
            name: self.name,
            fabric: self.fabric,
            intc: self.intc,
            routes: self.routes,
        }
    }

    /// Builds a system from its descriptor. Declarative peripheral paths are relative to
    /// `base_dir`.
    pub fn from_descriptor(desc: &SocDescriptor, base_dir: &Path) -> anyhow::Result<Soc> {
        let bus = bus_interface(&desc.bus).context("Invalid bus description")?;
        let window_bytes = desc.window_size.bytes()?;
        let mut builder = Self::new(
            &desc.name,
            bus,
            to_units(window_bytes, &bus)?,
            desc.interrupts,
        )?;
        for p in &desc.peripherals {
            let window = builder.window(p.slot)?;
            let target = instantiate(p, &window, base_dir)
                .with_context(|| format!("Failed to build peripheral '{}'", p.id))?;
            builder.attach(&window, &p.id, target)?;
            if let Some(priority) = p.irq {
                builder.irq(&p.id, priority)?;
            }
        }
        Ok(builder.build())
    }
}

fn to_units(bytes: u64, bus: &BusInterface) -> anyhow::Result<u64> {
    bytes
        .checked_mul(8)
        .map(|bits| bits / u64::from(bus.granularity()))
        .with_context(|| format!("Size of {} bytes is too large", bytes))
}

fn instantiate(
    p: &PeripheralConfig,
    window: &AddressWindow,
    base_dir: &Path,
) -> anyhow::Result<Box<dyn BusTarget>> {
    let target: Box<dyn BusTarget> = match p.r#type.as_str() {
        "ram" | "rom" => {
            let size = match &p.size {
                Some(size) => to_units(size.bytes()?, &window.bus)?,
                None => window.size,
            };
            let mut mem = RandomAccessMemory::in_window(window, size, p.r#type == "ram")?;
            if let Some(init) = p.config.get("init") {
                let words: Vec<u64> = serde_yaml::from_value(init.clone())
                    .context("'init' must be a list of words")?;
                mem.init(&words)?;
            }
            Box::new(mem)
        }
        "timer" => {
            let width = match p.config.get("width") {
                Some(v) => v.as_u64().context("'width' must be an integer")?,
                None => 32,
            };
            let width = u32::try_from(width).context("'width' is out of range")?;
            Box::new(timer(&p.id, window.bus, width)?)
        }
        "declarative" => {
            let desc = if let Some(path) = p.config.get("path") {
                let path = path.as_str().context("'path' must be a string")?;
                PeripheralDescriptor::from_file(base_dir.join(path))?
            } else if let Some(inline) = p.config.get("descriptor") {
                let desc: PeripheralDescriptor = serde_yaml::from_value(inline.clone())
                    .context("Failed to parse inline Peripheral Descriptor")?;
                desc.validate()?;
                desc
            } else {
                anyhow::bail!("Declarative peripheral needs a 'path' or a 'descriptor'");
            };
            Box::new(declarative(&p.id, &desc, window.bus)?)
        }
        other => anyhow::bail!("Unknown peripheral type '{}'", other),
    };
    Ok(target)
}

/// Reference system: 16 windows of 256 MiB on a 32-bit byte-granular bus with burst support,
/// ROM at 0x0000_0000, RAM at 0x2000_0000 and a 32-bit timer at 0x4000_0000 on interrupt 0.
/// Memory sizes are in bytes.
pub fn basic_soc(rom_size: u64, ram_size: u64) -> FabricResult<Soc> {
    let bus = BusInterface::new(30, 32, 8)?.with_features(Features::BURST);
    let mut builder = SocBuilder::new("basic", bus, 0x1000_0000, 32)?;

    let window = builder.window(0x0)?;
    let rom = RandomAccessMemory::in_window(&window, rom_size, false)?;
    builder.attach(&window, "rom", Box::new(rom))?;

    let window = builder.window(0x2)?;
    let ram = RandomAccessMemory::in_window(&window, ram_size, true)?;
    builder.attach(&window, "ram", Box::new(ram))?;

    let window = builder.window(0x4)?;
    let tim = timer("timer", window.bus, 32)?;
    builder.attach(&window, "timer", Box::new(tim))?;
    builder.irq("timer", 0)?;

    Ok(builder.build())
}
