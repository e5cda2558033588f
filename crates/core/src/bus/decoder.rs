// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::map::MemoryMap;
use super::{exact_log2, BusInterface, WishboneRequest, WishboneResponse};
use crate::{BusTarget, FabricError, FabricResult};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// One populated range of a decoder, as reported by [`Decoder::memory_map`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MapEntry {
    pub name: String,
    pub start: u64,
    pub end: u64,
}

/// Routes transactions to the targets attached to it by address range.
///
/// Ranges are claimed first (as reserved windows or together with their target) and can be
/// populated later. Unpopulated ranges, and the part of a range beyond what its target spans,
/// answer with `err` if the interface carries it.
#[derive(Debug)]
pub struct Decoder {
    bus: BusInterface,
    map: MemoryMap<Option<Box<dyn BusTarget>>>,
}

impl Decoder {
    pub fn new(bus: BusInterface) -> Self {
        Self {
            bus,
            map: MemoryMap::new(bus.map_bits()),
        }
    }

    /// Attaches `target` at `addr` (granularity units), or at the next free aligned address.
    pub fn add(
        &mut self,
        name: &str,
        target: Box<dyn BusTarget>,
        addr: Option<u64>,
    ) -> FabricResult<u64> {
        let sub = target.interface();
        self.bus.check_compatible(name, &sub)?;
        let start = self.map.add(name, sub.span(), addr, Some(target))?;
        tracing::info!("Decoder: '{}' at {:#x}..{:#x}", name, start, start + sub.span());
        Ok(start)
    }

    /// Claims a range to be populated later through [`Decoder::populate`].
    pub fn reserve(&mut self, name: &str, size: u64, addr: Option<u64>) -> FabricResult<u64> {
        self.map.add(name, size, addr, None)
    }

    /// Attaches `target` to the reserved range starting at `start`.
    pub fn populate(
        &mut self,
        start: u64,
        name: &str,
        target: Box<dyn BusTarget>,
    ) -> FabricResult<()> {
        let sub = target.interface();
        self.bus.check_compatible(name, &sub)?;
        let idx = self.map.find_start(start).ok_or_else(|| {
            FabricError::Configuration(format!("No window reserved at {:#x} for '{}'", start, name))
        })?;
        let entry = &mut self.map.entries_mut()[idx];
        if entry.route.is_some() {
            return Err(FabricError::AddressConflict {
                name: name.to_string(),
                start: entry.start,
                end: entry.end,
                existing: entry.name.clone(),
            });
        }
        if sub.span() > entry.size() {
            return Err(FabricError::Configuration(format!(
                "'{}' spans {:#x} units, window '{}' only {:#x}",
                name,
                sub.span(),
                entry.name,
                entry.size()
            )));
        }
        tracing::info!(
            "Decoder: '{}' populates {:#x}..{:#x}",
            name,
            entry.start,
            entry.start + sub.span()
        );
        entry.name = name.to_string();
        entry.route = Some(target);
        Ok(())
    }

    pub fn memory_map(&self) -> Vec<MapEntry> {
        self.map
            .entries()
            .iter()
            .filter_map(|e| {
                let target = e.route.as_ref()?;
                Some(MapEntry {
                    name: e.name.clone(),
                    start: e.start,
                    end: e.start + target.interface().span(),
                })
            })
            .collect()
    }

    pub fn target(&self, name: &str) -> Option<&dyn BusTarget> {
        self.map
            .entries()
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.route.as_deref())
    }

    /// Entry index and sub-address `req` is routed to.
    fn route(&self, req: &WishboneRequest) -> Option<(usize, u64)> {
        let unit = self.bus.unit_address(req.adr);
        let (idx, entry) = self.map.decode(unit)?;
        let sub = entry.route.as_ref()?.interface();
        let offset = unit - entry.start;
        if offset >= sub.span() {
            return None;
        }
        Some((idx, offset >> sub.granularity_bits()))
    }
}

impl BusTarget for Decoder {
    fn interface(&self) -> BusInterface {
        self.bus
    }

    fn respond(&self, req: &WishboneRequest) -> WishboneResponse {
        if req.is_active() {
            if let Some((idx, adr)) = self.route(req) {
                if let Some(target) = &self.map.entries()[idx].route {
                    let features = target.interface().features();
                    return target.respond(&req.forwarded(true, adr, features));
                }
            }
        }
        WishboneResponse::unmapped(&self.bus, req)
    }

    fn clock(&mut self, req: &WishboneRequest) {
        let routed = if req.is_active() {
            self.route(req)
        } else {
            None
        };
        for (idx, entry) in self.map.entries_mut().iter_mut().enumerate() {
            let Some(target) = entry.route.as_mut() else {
                continue;
            };
            let features = target.interface().features();
            let sub = match routed {
                Some((selected, adr)) if selected == idx => req.forwarded(true, adr, features),
                _ => req.forwarded(false, 0, features),
            };
            target.clock(&sub);
        }
    }

    fn irq(&self) -> bool {
        self.map
            .entries()
            .iter()
            .filter_map(|e| e.route.as_ref())
            .any(|t| t.irq())
    }

    fn snapshot(&self) -> serde_json::Value {
        let map = self
            .map
            .entries()
            .iter()
            .filter_map(|e| Some((e.name.clone(), e.route.as_ref()?.snapshot())))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// A slot handed out by a [`Partitioner`]. `base` and `size` are in granularity units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressWindow {
    pub name: String,
    pub base: u64,
    pub size: u64,
    pub bus: BusInterface,
}

#[derive(Debug, Clone, Copy)]
struct SlotGeometry {
    start: u64,
    window_size: u64,
    count: u64,
}

impl SlotGeometry {
    fn new(space: u64, start: u64, window_size: u64, min_size: u64) -> FabricResult<Self> {
        if exact_log2(window_size).is_none() {
            return Err(FabricError::Configuration(format!(
                "Window size must be a power of two, not {:#x}",
                window_size
            )));
        }
        if window_size < min_size {
            return Err(FabricError::Configuration(format!(
                "Window size {:#x} is below the bus word of {:#x} units",
                window_size, min_size
            )));
        }
        if window_size > space || space % window_size != 0 {
            return Err(FabricError::Configuration(format!(
                "Window size {:#x} does not evenly divide an address space of {:#x}",
                window_size, space
            )));
        }
        Ok(Self {
            start,
            window_size,
            count: space / window_size,
        })
    }

    /// Offset of slot `index` from the start of the partitioned space.
    fn offset(&self, index: usize) -> FabricResult<u64> {
        let index = index as u64;
        if index >= self.count {
            return Err(FabricError::OutOfRange {
                index,
                count: self.count,
            });
        }
        Ok(index * self.window_size)
    }
}

/// Splits a bus into `space / window_size` equally sized, indexable windows.
///
/// Slots are materialized on first access and cached, so indexing the same slot twice yields the
/// same [`AddressWindow`]. A window can be populated with any bus target, including another
/// `Partitioner` built with [`Partitioner::nested`].
#[derive(Debug)]
pub struct Partitioner {
    name: String,
    geometry: SlotGeometry,
    decoder: Decoder,
    slots: BTreeMap<usize, Arc<AddressWindow>>,
}

impl Partitioner {
    pub fn new(name: &str, bus: BusInterface, window_size: u64) -> FabricResult<Self> {
        Self::starting_at(name, bus, 0, window_size)
    }

    /// Partitioner whose slot bases are reported relative to `start`, for a bus that itself
    /// sits at `start` in an enclosing address space.
    pub fn starting_at(
        name: &str,
        bus: BusInterface,
        start: u64,
        window_size: u64,
    ) -> FabricResult<Self> {
        let min_size = u64::from(bus.sel_width());
        let geometry = SlotGeometry::new(bus.span(), start, window_size, min_size)?;
        tracing::info!(
            "Partitioner '{}': {} windows of {:#x} from {:#x}",
            name,
            geometry.count,
            window_size,
            start
        );
        Ok(Self {
            name: name.to_string(),
            geometry,
            decoder: Decoder::new(bus),
            slots: BTreeMap::new(),
        })
    }

    /// Partitions `window` further. Attach the result to `window` to route it.
    pub fn nested(window: &AddressWindow, window_size: u64) -> FabricResult<Self> {
        Self::starting_at(&window.name, window.bus, window.base, window_size)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> u64 {
        self.geometry.start
    }

    pub fn window_size(&self) -> u64 {
        self.geometry.window_size
    }

    pub fn slot_count(&self) -> usize {
        self.geometry.count as usize
    }

    /// Window for slot `index`, registering it on first access.
    pub fn slot(&mut self, index: usize) -> FabricResult<Arc<AddressWindow>> {
        if let Some(window) = self.slots.get(&index) {
            return Ok(Arc::clone(window));
        }
        let offset = self.geometry.offset(index)?;
        let size = self.geometry.window_size;
        let bus = self.decoder.interface();
        let sub = BusInterface::new(
            size.trailing_zeros() - bus.granularity_bits(),
            bus.data_width(),
            bus.granularity(),
        )?
        .with_features(bus.features());
        let name = format!("{}[{}]", self.name, index);
        self.decoder.reserve(&name, size, Some(offset))?;
        let window = Arc::new(AddressWindow {
            name,
            base: self.geometry.start + offset,
            size,
            bus: sub,
        });
        self.slots.insert(index, Arc::clone(&window));
        Ok(window)
    }

    /// Populates `window`, which must have been handed out by this partitioner.
    pub fn attach(
        &mut self,
        window: &AddressWindow,
        name: &str,
        target: Box<dyn BusTarget>,
    ) -> FabricResult<()> {
        let owned = self.slots.values().any(|w| **w == *window);
        if !owned {
            return Err(FabricError::Configuration(format!(
                "Window '{}' does not belong to '{}'",
                window.name, self.name
            )));
        }
        self.decoder
            .populate(window.base - self.geometry.start, name, target)
    }

    /// Populated windows, with addresses relative to this partitioner's own bus.
    pub fn memory_map(&self) -> Vec<MapEntry> {
        self.decoder.memory_map()
    }

    pub fn target(&self, name: &str) -> Option<&dyn BusTarget> {
        self.decoder.target(name)
    }
}

impl BusTarget for Partitioner {
    fn interface(&self) -> BusInterface {
        self.decoder.interface()
    }

    fn respond(&self, req: &WishboneRequest) -> WishboneResponse {
        self.decoder.respond(req)
    }

    fn clock(&mut self, req: &WishboneRequest) {
        self.decoder.clock(req);
    }

    fn irq(&self) -> bool {
        self.decoder.irq()
    }

    fn snapshot(&self) -> serde_json::Value {
        self.decoder.snapshot()
    }
}

/// Plain byte storage without a bus handshake.
#[derive(Debug, Clone, Default)]
pub struct RecordStore(Arc<Mutex<Vec<u8>>>);

impl RecordStore {
    pub fn new(size: usize) -> Self {
        Self(Arc::new(Mutex::new(vec![0; size])))
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes().clone()
    }

    fn bytes(&self) -> std::sync::MutexGuard<'_, Vec<u8>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Offset accessor into one slot of a [`RecordStore`].
#[derive(Debug, Clone)]
pub struct RecordWindow {
    store: RecordStore,
    base: u64,
    size: u64,
}

impl RecordWindow {
    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    fn check(&self, offset: u64, len: u64) -> FabricResult<usize> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok((self.base + offset) as usize),
            _ => Err(FabricError::OutOfRange {
                index: offset,
                count: self.size,
            }),
        }
    }

    pub fn read_u8(&self, offset: u64) -> FabricResult<u8> {
        let at = self.check(offset, 1)?;
        Ok(self.store.bytes()[at])
    }

    pub fn write_u8(&self, offset: u64, value: u8) -> FabricResult<()> {
        let at = self.check(offset, 1)?;
        self.store.bytes()[at] = value;
        Ok(())
    }

    /// Reads `len` bytes (at most 8) at `offset` as a little-endian integer.
    pub fn read_le(&self, offset: u64, len: usize) -> FabricResult<u64> {
        let at = self.check(offset, len.min(8) as u64)?;
        let bytes = self.store.bytes();
        Ok(bytes[at..at + len.min(8)]
            .iter()
            .rev()
            .fold(0, |acc, &b| (acc << 8) | u64::from(b)))
    }

    pub fn write_le(&self, offset: u64, len: usize, value: u64) -> FabricResult<()> {
        let at = self.check(offset, len.min(8) as u64)?;
        let mut bytes = self.store.bytes();
        for (i, b) in bytes[at..at + len.min(8)].iter_mut().enumerate() {
            *b = (value >> (8 * i)) as u8;
        }
        Ok(())
    }
}

/// [`Partitioner`] counterpart over a [`RecordStore`]: slots are offset accessors, no bus
/// connection is made.
#[derive(Debug)]
pub struct RecordPartitioner {
    store: RecordStore,
    geometry: SlotGeometry,
    slots: BTreeMap<usize, Arc<RecordWindow>>,
}

impl RecordPartitioner {
    pub fn new(store: RecordStore, window_size: u64) -> FabricResult<Self> {
        let geometry = SlotGeometry::new(store.len() as u64, 0, window_size, 1)?;
        Ok(Self {
            store,
            geometry,
            slots: BTreeMap::new(),
        })
    }

    pub fn slot_count(&self) -> usize {
        self.geometry.count as usize
    }

    pub fn slot(&mut self, index: usize) -> FabricResult<Arc<RecordWindow>> {
        if let Some(window) = self.slots.get(&index) {
            return Ok(Arc::clone(window));
        }
        let base = self.geometry.offset(index)?;
        let window = Arc::new(RecordWindow {
            store: self.store.clone(),
            base,
            size: self.geometry.window_size,
        });
        self.slots.insert(index, Arc::clone(&window));
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Features;

    /// Single-word target that acknowledges one edge after a request.
    #[derive(Debug)]
    struct Word {
        bus: BusInterface,
        value: u64,
        ack: bool,
    }

    impl Word {
        fn boxed(addr_width: u32, value: u64) -> Box<dyn BusTarget> {
            Box::new(Self {
                bus: BusInterface::new(addr_width, 32, 8).unwrap(),
                value,
                ack: false,
            })
        }
    }

    impl BusTarget for Word {
        fn interface(&self) -> BusInterface {
            self.bus
        }

        fn respond(&self, _req: &WishboneRequest) -> WishboneResponse {
            WishboneResponse {
                ack: self.ack,
                dat_r: self.value,
                err: false,
            }
        }

        fn clock(&mut self, req: &WishboneRequest) {
            self.ack = req.is_active() && !self.ack;
            if self.ack && req.we {
                self.value = req.dat_w;
            }
        }

        fn irq(&self) -> bool {
            self.value == 0xDEAD
        }
    }

    fn bus_64k() -> BusInterface {
        BusInterface::new(14, 32, 8).unwrap()
    }

    #[test]
    fn test_slot_bases_and_range() {
        let mut part = Partitioner::new("top", bus_64k(), 0x1000).unwrap();
        assert_eq!(part.slot_count(), 16);
        assert_eq!(part.slot(2).unwrap().base, 0x2000);
        assert_eq!(part.slot(15).unwrap().base, 0xF000);
        assert_eq!(
            part.slot(16).unwrap_err(),
            FabricError::OutOfRange {
                index: 16,
                count: 16
            }
        );
    }

    #[test]
    fn test_slot_is_cached() {
        let mut part = Partitioner::new("top", bus_64k(), 0x1000).unwrap();
        let first = part.slot(3).unwrap();
        let again = part.slot(3).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.bus.addr_width(), 10);
    }

    #[test]
    fn test_bad_window_sizes() {
        for size in [0x1800, 0x2, 0x20000] {
            assert!(matches!(
                Partitioner::new("top", bus_64k(), size),
                Err(FabricError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_routes_to_populated_slot() {
        let mut part = Partitioner::new("top", bus_64k(), 0x1000).unwrap();
        let win = part.slot(2).unwrap();
        part.attach(&win, "word", Word::boxed(2, 0x1234)).unwrap();

        let req = WishboneRequest::read(0x2000 >> 2, 0xF);
        assert!(!part.respond(&req).ack);
        part.clock(&req);
        let resp = part.respond(&req);
        assert!(resp.ack);
        assert_eq!(resp.dat_r, 0x1234);

        assert_eq!(
            part.memory_map(),
            vec![MapEntry {
                name: "word".to_string(),
                start: 0x2000,
                end: 0x2010,
            }]
        );
    }

    #[test]
    fn test_double_attach_conflicts() {
        let mut part = Partitioner::new("top", bus_64k(), 0x1000).unwrap();
        let win = part.slot(1).unwrap();
        part.attach(&win, "a", Word::boxed(2, 0)).unwrap();
        assert!(matches!(
            part.attach(&win, "b", Word::boxed(2, 0)),
            Err(FabricError::AddressConflict { .. })
        ));
    }

    #[test]
    fn test_foreign_or_oversized_target_rejected() {
        let mut part = Partitioner::new("top", bus_64k(), 0x1000).unwrap();
        let mut other = Partitioner::new("other", bus_64k(), 0x1000).unwrap();
        let foreign = other.slot(0).unwrap();
        assert!(matches!(
            part.attach(&foreign, "x", Word::boxed(2, 0)),
            Err(FabricError::Configuration(_))
        ));
        let win = part.slot(0).unwrap();
        assert!(matches!(
            part.attach(&win, "big", Word::boxed(11, 0)),
            Err(FabricError::Configuration(_))
        ));
    }

    #[test]
    fn test_unmapped_access_errs_only_with_err_feature() {
        let mut plain = Partitioner::new("top", bus_64k(), 0x1000).unwrap();
        let req = WishboneRequest::read(0x10, 0xF);
        plain.clock(&req);
        assert_eq!(plain.respond(&req), WishboneResponse::default());

        let bus = bus_64k().with_features(Features::ERR);
        let mut strict = Partitioner::new("top", bus, 0x1000).unwrap();
        let win = strict.slot(0).unwrap();
        let word = Box::new(Word {
            bus: BusInterface::new(2, 32, 8).unwrap().with_features(Features::ERR),
            value: 0,
            ack: false,
        });
        strict.attach(&win, "word", word).unwrap();
        // Past the end of the attached target, inside its window.
        assert!(strict.respond(&WishboneRequest::read(0x10, 0xF)).err);
        assert!(!strict.respond(&WishboneRequest::read(0x1, 0xF)).err);
        assert!(!strict.respond(&WishboneRequest::idle()).err);
    }

    #[test]
    fn test_nested_partitioner() {
        let mut top = Partitioner::new("top", bus_64k(), 0x4000).unwrap();
        let outer = top.slot(1).unwrap();
        let mut inner = Partitioner::nested(&outer, 0x1000).unwrap();
        assert_eq!(inner.slot_count(), 4);
        let leaf = inner.slot(2).unwrap();
        assert_eq!(leaf.base, 0x6000);
        inner.attach(&leaf, "word", Word::boxed(2, 0xDEAD)).unwrap();
        top.attach(&outer, "inner", Box::new(inner)).unwrap();

        let req = WishboneRequest::read(0x6004 >> 2, 0xF);
        top.clock(&req);
        let resp = top.respond(&req);
        assert!(resp.ack);
        assert_eq!(resp.dat_r, 0xDEAD);
        assert!(top.irq());
    }

    #[test]
    fn test_auto_placement_and_idle_bus() {
        let mut dec = Decoder::new(bus_64k());
        dec.add("a", Word::boxed(2, 1), None).unwrap();
        dec.add("b", Word::boxed(2, 2), None).unwrap();
        for _ in 0..3 {
            dec.clock(&WishboneRequest::idle());
        }
        assert_eq!(dec.memory_map().len(), 2);
        assert_eq!(dec.memory_map()[1].start, 0x10);
        assert!(!dec.respond(&WishboneRequest::read(0x4, 0xF)).ack);
    }

    #[test]
    fn test_record_windows() {
        let store = RecordStore::new(0x40);
        let mut part = RecordPartitioner::new(store.clone(), 0x10).unwrap();
        assert_eq!(part.slot_count(), 4);
        let win = part.slot(1).unwrap();
        assert!(Arc::ptr_eq(&win, &part.slot(1).unwrap()));
        win.write_le(0x4, 4, 0xCAFE_F00D).unwrap();
        assert_eq!(win.read_le(0x4, 4).unwrap(), 0xCAFE_F00D);
        assert_eq!(store.to_vec()[0x14], 0x0D);
        assert!(matches!(
            win.read_le(0xE, 4),
            Err(FabricError::OutOfRange { .. })
        ));
        assert!(matches!(part.slot(4), Err(FabricError::OutOfRange { .. })));
    }
}
