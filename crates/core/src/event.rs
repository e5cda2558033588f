// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Event sources and the status/pending/enable registers that aggregate them.

use crate::bus::csr::{Access, CsrElement, CsrMultiplexer, ElementHandle};
use crate::register::RegisterFile;
use crate::signals::{DigitalLevel, EdgeDetector, TriggerMode};
use crate::{FabricError, FabricResult};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSpec {
    pub name: String,
    pub bit: u32,
    pub mode: TriggerMode,
}

impl EventSpec {
    pub fn new(name: &str, bit: u32, mode: TriggerMode) -> Self {
        Self {
            name: name.to_string(),
            bit,
            mode,
        }
    }

    pub fn key(&self) -> EventKey {
        EventKey {
            bit: self.bit,
            mode: self.mode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub bit: u32,
    pub mode: TriggerMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(usize);

#[derive(Debug)]
struct EventSource {
    name: String,
    bit: u32,
    detector: EdgeDetector,
    input: DigitalLevel,
}

#[derive(Debug, Clone, Copy)]
struct EventRegisters {
    status: ElementHandle,
    pending: ElementHandle,
    enable: ElementHandle,
}

/// Per-instance event state.
///
/// Each event sets its bit of the sticky `status` register when its strobe fires; software
/// clears a bit by writing 0 to it. `pending` reads back `status & enable` and the block's
/// interrupt is the OR of those bits.
#[derive(Debug)]
pub struct EventBlock {
    specs: Arc<[EventSpec]>,
    index: HashMap<EventKey, EventHandle>,
    sources: Vec<EventSource>,
    registers: Option<EventRegisters>,
}

impl EventBlock {
    pub fn new(specs: Arc<[EventSpec]>) -> Self {
        Self {
            specs,
            index: HashMap::new(),
            sources: Vec::new(),
            registers: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Register width: one bit per status position in use.
    pub fn width(&self) -> u32 {
        self.specs.iter().map(|s| s.bit + 1).max().unwrap_or(0)
    }

    /// Chunks taken by the three event registers when placed with `stride` chunks between them.
    pub fn stride(&self, data_width: u32, word_width: u32) -> u64 {
        u64::from(self.width().max(word_width).div_ceil(data_width))
    }

    /// Handle of event `name`, materializing its source on first access.
    pub fn event(&mut self, name: &str) -> FabricResult<EventHandle> {
        let spec = self
            .specs
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| FabricError::Configuration(format!("No event named '{}'", name)))?;
        Ok(self.materialize(&spec))
    }

    fn materialize(&mut self, spec: &EventSpec) -> EventHandle {
        if let Some(&handle) = self.index.get(&spec.key()) {
            return handle;
        }
        self.sources.push(EventSource {
            name: spec.name.clone(),
            bit: spec.bit,
            detector: EdgeDetector::new(spec.mode),
            input: DigitalLevel::Low,
        });
        let handle = EventHandle(self.sources.len() - 1);
        self.index.insert(spec.key(), handle);
        tracing::debug!(
            "Materialized event '{}' on bit {} ({:?})",
            spec.name,
            spec.bit,
            spec.mode
        );
        handle
    }

    /// Drives the raw condition of an event. The level holds until driven again.
    pub fn drive(&mut self, handle: EventHandle, level: bool) {
        if let Some(source) = self.sources.get_mut(handle.0) {
            source.input = level.into();
        }
    }

    /// Strobe of an event for the current tick.
    pub fn strobe(&self, handle: EventHandle) -> bool {
        self.sources
            .get(handle.0)
            .is_some_and(|s| s.detector.strobe(s.input))
    }

    pub fn name(&self, handle: EventHandle) -> Option<&str> {
        self.sources.get(handle.0).map(|s| s.name.as_str())
    }

    /// Materializes every event and places status, pending and enable at `base`,
    /// `base + stride` and `base + 2 * stride`.
    pub fn finalize(
        &mut self,
        file: &mut RegisterFile,
        mux: &mut CsrMultiplexer,
        base: u64,
        stride: u64,
    ) -> FabricResult<()> {
        if self.specs.is_empty() {
            return Ok(());
        }
        let specs = Arc::clone(&self.specs);
        let mut used = 0u64;
        for spec in specs.iter() {
            if spec.bit >= 64 {
                return Err(FabricError::Configuration(format!(
                    "Event '{}' bit {} is out of range",
                    spec.name, spec.bit
                )));
            }
            if used & (1 << spec.bit) != 0 {
                return Err(FabricError::Configuration(format!(
                    "Event '{}' reuses status bit {}",
                    spec.name, spec.bit
                )));
            }
            used |= 1 << spec.bit;
            self.materialize(spec);
        }

        let width = self.width();
        let status = file.push_element(CsrElement::new(
            "ev_status",
            width,
            Access::WriteZeroToClear,
            0,
        ));
        let pending = file.push_element(CsrElement::new("ev_pending", width, Access::ReadOnly, 0));
        let enable = file.push_element(CsrElement::new("ev_enable", width, Access::ReadWrite, 0));
        mux.add("ev_status", status, width, base, 0)?;
        mux.add("ev_pending", pending, width, base + stride, 0)?;
        mux.add("ev_enable", enable, width, base + 2 * stride, 0)?;
        self.registers = Some(EventRegisters {
            status,
            pending,
            enable,
        });
        tracing::debug!("Event registers at {:#x} (stride {})", base, stride);
        Ok(())
    }

    /// Stages status bits for every strobe of this tick and advances the edge detectors.
    pub fn clock(&mut self, file: &mut RegisterFile) {
        let mut fired = 0u64;
        for source in &mut self.sources {
            if source.detector.strobe(source.input) {
                fired |= 1 << source.bit;
            }
            source.detector.clock(source.input);
        }
        if let Some(regs) = self.registers {
            file.element_mut(regs.status).set_bits(fired);
        }
    }

    /// Refreshes `pending` from the committed `status` and `enable`.
    pub fn settle(&self, file: &mut RegisterFile) {
        if let Some(regs) = self.registers {
            let value = self.active(file);
            file.element_mut(regs.pending).force(value);
        }
    }

    /// `status & enable` as of the last commit.
    pub fn active(&self, file: &RegisterFile) -> u64 {
        self.registers.map_or(0, |regs| {
            file.element(regs.status).value() & file.element(regs.enable).value()
        })
    }

    pub fn irq(&self, file: &RegisterFile) -> bool {
        self.active(file) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::csr::CsrRequest;

    fn block(specs: Vec<EventSpec>) -> (EventBlock, RegisterFile, CsrMultiplexer) {
        let mut events = EventBlock::new(Arc::from(specs));
        let mut file = RegisterFile::new(Arc::from(Vec::new()), 32);
        let mut mux = CsrMultiplexer::new(8, 0).unwrap();
        events.finalize(&mut file, &mut mux, 0x0, 4).unwrap();
        (events, file, mux)
    }

    fn tick(events: &mut EventBlock, file: &mut RegisterFile, mux: &mut CsrMultiplexer, req: CsrRequest) {
        mux.clock(&req, file.elements_mut());
        events.clock(file);
        file.commit();
        events.settle(file);
    }

    fn write(addr: u64, data: u64) -> CsrRequest {
        CsrRequest {
            addr,
            w_stb: true,
            w_data: data,
            ..Default::default()
        }
    }

    #[test]
    fn test_aggregate_irq_of_two_events() {
        let (mut events, mut file, mut mux) = block(vec![
            EventSpec::new("a", 0, TriggerMode::Rise),
            EventSpec::new("b", 1, TriggerMode::Rise),
        ]);
        let a = events.event("a").unwrap();
        let b = events.event("b").unwrap();
        assert_eq!(events.width(), 2);

        for (s0, e0, s1, e1) in [
            (false, false, false, false),
            (true, false, false, true),
            (true, true, false, false),
            (false, false, true, true),
            (true, false, true, false),
        ] {
            let (mut events, mut file, mut mux) = (
                EventBlock::new(Arc::clone(&events.specs)),
                RegisterFile::new(Arc::from(Vec::new()), 32),
                CsrMultiplexer::new(8, 0).unwrap(),
            );
            events.finalize(&mut file, &mut mux, 0x0, 4).unwrap();
            events.drive(a, s0);
            events.drive(b, s1);
            let enable = u64::from(e0) | u64::from(e1) << 1;
            tick(&mut events, &mut file, &mut mux, write(0x8, enable));
            assert_eq!(events.irq(&file), (s0 && e0) || (s1 && e1));
        }

        events.drive(a, true);
        tick(&mut events, &mut file, &mut mux, CsrRequest::default());
        assert!(!events.irq(&file));
        tick(&mut events, &mut file, &mut mux, write(0x8, 0b01));
        assert!(events.irq(&file));
    }

    #[test]
    fn test_status_clears_on_write_zero_only() {
        let (mut events, mut file, mut mux) = block(vec![
            EventSpec::new("x", 0, TriggerMode::Level),
            EventSpec::new("y", 1, TriggerMode::Level),
            EventSpec::new("z", 2, TriggerMode::Level),
        ]);
        for name in ["x", "y", "z"] {
            let h = events.event(name).unwrap();
            events.drive(h, true);
        }
        tick(&mut events, &mut file, &mut mux, CsrRequest::default());
        for name in ["x", "y", "z"] {
            let h = events.event(name).unwrap();
            events.drive(h, false);
        }
        tick(&mut events, &mut file, &mut mux, CsrRequest::default());

        tick(&mut events, &mut file, &mut mux, write(0x0, 0xFF));
        assert_eq!(file.elements_mut()[0].value(), 0b111);
        tick(&mut events, &mut file, &mut mux, write(0x0, 0b101));
        assert_eq!(file.elements_mut()[0].value(), 0b101);
    }

    #[test]
    fn test_pending_tracks_status_and_enable() {
        let (mut events, mut file, mut mux) = block(vec![EventSpec::new("x", 3, TriggerMode::Rise)]);
        let x = events.event("x").unwrap();
        tick(&mut events, &mut file, &mut mux, write(0x8, 0xF));
        events.drive(x, true);
        tick(&mut events, &mut file, &mut mux, CsrRequest::default());
        let pending = file.elements_mut()[1].value();
        assert_eq!(pending, 0b1000);
        // Writes to pending are ignored.
        tick(&mut events, &mut file, &mut mux, write(0x4, 0));
        assert_eq!(file.elements_mut()[1].value(), 0b1000);
    }

    #[test]
    fn test_event_is_cached_and_bits_unique() {
        let mut events = EventBlock::new(Arc::from(vec![EventSpec::new("x", 0, TriggerMode::Rise)]));
        assert_eq!(events.event("x").unwrap(), events.event("x").unwrap());
        assert!(events.event("nope").is_err());

        let mut dup = EventBlock::new(Arc::from(vec![
            EventSpec::new("x", 0, TriggerMode::Rise),
            EventSpec::new("y", 0, TriggerMode::Fall),
        ]));
        let mut file = RegisterFile::new(Arc::from(Vec::new()), 32);
        let mut mux = CsrMultiplexer::new(8, 0).unwrap();
        assert!(matches!(
            dup.finalize(&mut file, &mut mux, 0, 4),
            Err(FabricError::Configuration(_))
        ));
    }
}
