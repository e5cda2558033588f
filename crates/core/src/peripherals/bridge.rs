// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{CoreContext, PeripheralCore, PeripheralSpec};
use crate::bus::bridge::WishboneCsrBridge;
use crate::bus::csr::CsrMultiplexer;
use crate::bus::decoder::MapEntry;
use crate::bus::map::MemoryMap;
use crate::bus::{bits_for, BusInterface, WishboneRequest, WishboneResponse};
use crate::event::EventBlock;
use crate::register::{RegisterBank, RegisterFile};
use crate::signals::InterruptLine;
use crate::{BusTarget, FabricError, FabricResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalRoute {
    Registers,
    Window(usize),
}

/// One peripheral behind a single bus interface and a single interrupt line.
///
/// The register bank sits at offset 0 and also holds the event registers, after the declared
/// fields. Raw windows follow at their declared peripheral-relative addresses; the local address
/// space grows to cover them.
#[derive(Debug)]
pub struct PeripheralBridge {
    name: String,
    bus: BusInterface,
    map: MemoryMap<LocalRoute>,
    registers: WishboneCsrBridge<RegisterBank>,
    windows: Vec<(String, Box<dyn BusTarget>)>,
    events: EventBlock,
    core: Box<dyn PeripheralCore>,
    irq: InterruptLine,
}

impl PeripheralBridge {
    /// Builds `spec` backed by `core`. `template` supplies the data width, granularity and
    /// features of the resulting interface; its address width is ignored.
    pub fn new(
        name: &str,
        spec: &PeripheralSpec,
        mut core: Box<dyn PeripheralCore>,
        template: BusInterface,
    ) -> FabricResult<Self> {
        if spec.register_width() != template.granularity() {
            return Err(FabricError::Configuration(format!(
                "'{}': register width {} must match bus granularity {}",
                name,
                spec.register_width(),
                template.granularity()
            )));
        }
        let (mut file, mut events) = spec.instantiate();
        core.elaborate(&mut CoreContext {
            registers: &mut file,
            events: &mut events,
        })?;

        let mut mux = CsrMultiplexer::new(spec.register_width(), spec.alignment())?;
        file.finalize(&mut mux)?;

        let stride = events
            .stride(spec.register_width(), spec.word_width())
            .next_multiple_of(1 << spec.alignment());
        let event_base = if events.is_empty() {
            mux.end()
        } else {
            mux.end().next_multiple_of(stride)
        };
        let bank_end = if events.is_empty() {
            mux.end()
        } else {
            event_base + 3 * stride
        };
        let bank_bits = bits_for(bank_end).max(template.granularity_bits());

        let mut map = MemoryMap::growable();
        map.add("registers", 1 << bank_bits, Some(0), LocalRoute::Registers)?;

        let mut windows = Vec::new();
        for raw in core.take_windows() {
            template.check_compatible(&raw.name, &raw.target.interface())?;
            let size = raw.target.interface().span();
            map.add(&raw.name, size, Some(raw.addr), LocalRoute::Window(windows.len()))?;
            windows.push((raw.name, raw.target));
        }

        events.finalize(&mut file, &mut mux, event_base, stride)?;

        let bank = RegisterBank::new(file, mux, bank_bits)?;
        let registers = WishboneCsrBridge::new(bank, template.data_width())?;

        let bus = BusInterface::new(
            map.addr_width() - template.granularity_bits(),
            template.data_width(),
            template.granularity(),
        )?
        .with_features(template.features());

        tracing::info!(
            "Peripheral '{}': {} registers, {} events, {} windows, {:#x} units",
            name,
            spec.fields().len(),
            spec.events().len(),
            windows.len(),
            bus.span()
        );

        Ok(Self {
            name: name.to_string(),
            bus,
            map,
            registers,
            windows,
            events,
            core,
            irq: InterruptLine::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registers(&self) -> &RegisterFile {
        self.registers.target().file()
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        self.registers.target_mut().file_mut()
    }

    pub fn events(&self) -> &EventBlock {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventBlock {
        &mut self.events
    }

    pub fn core(&self) -> &dyn PeripheralCore {
        self.core.as_ref()
    }

    pub fn interrupt_line(&self) -> &InterruptLine {
        &self.irq
    }

    /// Local windows, relative to the peripheral's base.
    pub fn memory_map(&self) -> Vec<MapEntry> {
        self.map
            .entries()
            .iter()
            .map(|e| MapEntry {
                name: e.name.clone(),
                start: e.start,
                end: e.end,
            })
            .collect()
    }

    fn route(&self, req: &WishboneRequest) -> Option<(LocalRoute, u64)> {
        let unit = self.bus.unit_address(req.adr);
        let (_, entry) = self.map.decode(unit)?;
        let sub = match entry.route {
            LocalRoute::Registers => self.registers.interface(),
            LocalRoute::Window(i) => self.windows[i].1.interface(),
        };
        Some((entry.route, (unit - entry.start) >> sub.granularity_bits()))
    }

    fn forward(
        req: &WishboneRequest,
        routed: Option<(LocalRoute, u64)>,
        route: LocalRoute,
        target: &dyn BusTarget,
    ) -> WishboneRequest {
        let features = target.interface().features();
        match routed {
            Some((r, adr)) if r == route => req.forwarded(true, adr, features),
            _ => req.forwarded(false, 0, features),
        }
    }
}

impl BusTarget for PeripheralBridge {
    fn interface(&self) -> BusInterface {
        self.bus
    }

    fn respond(&self, req: &WishboneRequest) -> WishboneResponse {
        if !req.is_active() {
            return WishboneResponse::unmapped(&self.bus, req);
        }
        let routed = self.route(req);
        match routed {
            Some((LocalRoute::Registers, _)) => {
                let sub = Self::forward(req, routed, LocalRoute::Registers, &self.registers);
                self.registers.respond(&sub)
            }
            Some((route @ LocalRoute::Window(i), _)) => {
                let target = self.windows[i].1.as_ref();
                target.respond(&Self::forward(req, routed, route, target))
            }
            None => WishboneResponse::unmapped(&self.bus, req),
        }
    }

    fn clock(&mut self, req: &WishboneRequest) {
        let routed = if req.is_active() {
            self.route(req)
        } else {
            None
        };

        let sub = Self::forward(req, routed, LocalRoute::Registers, &self.registers);
        self.registers.clock(&sub);
        for (i, (_, target)) in self.windows.iter_mut().enumerate() {
            let sub = Self::forward(req, routed, LocalRoute::Window(i), target.as_ref());
            target.clock(&sub);
        }

        let file = self.registers.target_mut().file_mut();
        self.core.tick(&mut CoreContext {
            registers: file,
            events: &mut self.events,
        });
        self.events.clock(file);
        file.commit();
        self.events.settle(file);
        self.irq.set(self.events.irq(file));
    }

    fn irq(&self) -> bool {
        self.irq.is_asserted()
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "registers": self.registers().snapshot(),
            "irq": self.irq.is_asserted(),
        })
    }
}
