// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod builder;

pub use builder::{basic_soc, bus_interface, SocBuilder};

use crate::bus::decoder::{MapEntry, Partitioner};
use crate::bus::{BusInterface, WishboneRequest, WishboneResponse};
use crate::interrupt::{GenericInterruptController, InterruptController};
use crate::BusTarget;

/// A complete system: one partitioned address space and the interrupt controller its
/// peripherals report to.
///
/// Clocking the `Soc` clocks every attached peripheral and then samples each routed interrupt
/// line into the controller on the same edge.
#[derive(Debug)]
pub struct Soc {
    name: String,
    fabric: Partitioner,
    intc: GenericInterruptController,
    routes: Vec<(String, u32)>,
}

impl Soc {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fabric(&self) -> &Partitioner {
        &self.fabric
    }

    pub fn interrupt_controller(&self) -> &GenericInterruptController {
        &self.intc
    }

    /// Populated windows in bus granularity units.
    pub fn memory_map(&self) -> Vec<MapEntry> {
        self.fabric.memory_map()
    }

    pub fn peripheral(&self, name: &str) -> Option<&dyn BusTarget> {
        self.fabric.target(name)
    }

    pub fn pending(&self) -> u64 {
        self.intc.pending()
    }
}

impl BusTarget for Soc {
    fn interface(&self) -> BusInterface {
        self.fabric.interface()
    }

    fn respond(&self, req: &WishboneRequest) -> WishboneResponse {
        self.fabric.respond(req)
    }

    fn clock(&mut self, req: &WishboneRequest) {
        self.fabric.clock(req);
        for (name, priority) in &self.routes {
            let level = self.fabric.target(name).is_some_and(|t| t.irq());
            self.intc.set_line(*priority, level);
        }
    }

    fn irq(&self) -> bool {
        self.intc.pending() != 0
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "pending": self.intc.pending(),
            "peripherals": self.fabric.snapshot(),
        })
    }
}
