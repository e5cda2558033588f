// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bus::decoder::AddressWindow;
use crate::bus::{
    burst_increment, exact_log2, mask, BusInterface, CycleType, Features, WishboneRequest,
    WishboneResponse,
};
use crate::{BusTarget, FabricError, FabricResult};

/// Burst-capable SRAM with a synchronous read port.
///
/// During an incrementing burst the acknowledge stays asserted and the read port is already
/// addressed with the next beat's address, so every beat after the first completes in one cycle.
/// A read-only memory ignores writes, and answers them with `err` if the bus carries it.
#[derive(Debug)]
pub struct RandomAccessMemory {
    bus: BusInterface,
    words: Vec<u64>,
    writable: bool,
    ack: bool,
    err: bool,
    dat_r: u64,
}

impl RandomAccessMemory {
    /// `size` is in granularity units. `template` supplies widths and features.
    pub fn new(template: BusInterface, size: u64, writable: bool) -> FabricResult<Self> {
        if !template.supports(Features::BURST) {
            return Err(FabricError::Configuration(
                "Memory bus must support bursts (cti and bte)".to_string(),
            ));
        }
        let Some(size_bits) = exact_log2(size) else {
            return Err(FabricError::Configuration(format!(
                "Memory size must be a power of two, not {:#x}",
                size
            )));
        };
        let sel_width = u64::from(template.sel_width());
        if size < sel_width {
            return Err(FabricError::Configuration(format!(
                "Memory size {:#x} cannot be less than the data width/granularity ratio of {}",
                size, sel_width
            )));
        }
        let bus = BusInterface::new(
            size_bits - template.granularity_bits(),
            template.data_width(),
            template.granularity(),
        )?
        .with_features(template.features());
        Ok(Self {
            bus,
            words: vec![0; (size / sel_width) as usize],
            writable,
            ack: false,
            err: false,
            dat_r: 0,
        })
    }

    pub fn in_window(window: &AddressWindow, size: u64, writable: bool) -> FabricResult<Self> {
        if size > window.size {
            return Err(FabricError::Configuration(format!(
                "Memory of {:#x} does not fit window '{}' of {:#x}",
                size, window.name, window.size
            )));
        }
        Self::new(window.bus, size, writable)
    }

    /// Size in granularity units.
    pub fn size(&self) -> u64 {
        self.bus.span()
    }

    pub fn depth(&self) -> usize {
        self.words.len()
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Loads initial contents, one entry per word, starting at word 0.
    pub fn init(&mut self, words: &[u64]) -> FabricResult<()> {
        if words.len() > self.words.len() {
            return Err(FabricError::Configuration(format!(
                "{} initial words do not fit a memory of {} words",
                words.len(),
                self.words.len()
            )));
        }
        let dmask = self.bus.data_mask();
        for (dst, src) in self.words.iter_mut().zip(words) {
            *dst = src & dmask;
        }
        Ok(())
    }

    pub fn peek(&self, index: usize) -> Option<u64> {
        self.words.get(index).copied()
    }

    fn lane_mask(&self, sel: u8) -> u64 {
        let gran = self.bus.granularity();
        (0..self.bus.sel_width())
            .filter(|i| sel & (1 << i) != 0)
            .fold(0, |acc, i| acc | (mask(gran) << (i * gran)))
    }
}

impl BusTarget for RandomAccessMemory {
    fn interface(&self) -> BusInterface {
        self.bus
    }

    fn respond(&self, req: &WishboneRequest) -> WishboneResponse {
        WishboneResponse {
            ack: self.ack && req.is_active(),
            dat_r: self.dat_r,
            err: self.err && req.is_active(),
        }
    }

    fn clock(&mut self, req: &WishboneRequest) {
        let active = req.is_active();
        let amask = self.bus.addr_mask();
        let read_addr = if req.cti == CycleType::IncrBurst && self.ack {
            burst_increment(req.adr, req.bte)
        } else {
            req.adr
        } & amask;

        let rejected = active && req.we && !self.writable && self.bus.supports(Features::ERR);
        if active && req.we && self.writable {
            let lanes = self.lane_mask(req.sel);
            let word = &mut self.words[(req.adr & amask) as usize];
            *word = (*word & !lanes) | (req.dat_w & lanes);
        }
        self.dat_r = self.words[read_addr as usize];

        self.err = rejected && !self.err;
        self.ack = active && !rejected && (!self.ack || req.cti == CycleType::IncrBurst);
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "size": self.size(),
            "writable": self.writable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::master::BusMaster;
    use crate::bus::BurstType;

    fn template(features: Features) -> BusInterface {
        BusInterface::new(30, 32, 8).unwrap().with_features(features)
    }

    fn ram() -> RandomAccessMemory {
        let mut ram = RandomAccessMemory::new(template(Features::BURST), 0x100, true).unwrap();
        let init: Vec<u64> = (0..64).map(|i| 0x1000 + i).collect();
        ram.init(&init).unwrap();
        ram
    }

    #[test]
    fn test_geometry_and_validation() {
        let ram = ram();
        assert_eq!(ram.interface().addr_width(), 6);
        assert_eq!(ram.depth(), 64);
        assert!(RandomAccessMemory::new(template(Features::CTI), 0x100, true).is_err());
        assert!(RandomAccessMemory::new(template(Features::BURST), 0x300, true).is_err());
        assert!(RandomAccessMemory::new(template(Features::BURST), 0x2, true).is_err());
    }

    #[test]
    fn test_single_cycle_access() {
        let mut ram = ram();
        let mut master = BusMaster::new();
        let done = master.read(&mut ram, 5).unwrap();
        assert_eq!((done.data, done.cycles), (0x1005, 1));
        master.write(&mut ram, 5, 0xAABB_CCDD, 0b0110).unwrap();
        assert_eq!(ram.peek(5), Some(0x00BB_CC05));
    }

    #[test]
    fn test_wrap4_burst() {
        let mut ram = ram();
        let mut master = BusMaster::new();
        let beats = master.burst_read(&mut ram, 0x26, BurstType::Wrap4, 4).unwrap();
        let addrs: Vec<u64> = beats.iter().map(|b| b.adr).collect();
        let data: Vec<u64> = beats.iter().map(|b| b.data).collect();
        assert_eq!(addrs, vec![0x26, 0x27, 0x24, 0x25]);
        assert_eq!(data, vec![0x1026, 0x1027, 0x1024, 0x1025]);
        // First beat waits one edge, the rest complete back to back.
        assert_eq!(master.cycles(), 5);
        master.idle(&mut ram, 2).unwrap();
    }

    #[test]
    fn test_linear_burst_crosses_wrap_boundary() {
        let mut ram = ram();
        let mut master = BusMaster::new();
        let beats = master.burst_read(&mut ram, 0x0E, BurstType::Linear, 4).unwrap();
        let data: Vec<u64> = beats.iter().map(|b| b.data).collect();
        assert_eq!(data, vec![0x100E, 0x100F, 0x1010, 0x1011]);
    }

    #[test]
    fn test_read_only_memory() {
        let mut rom = RandomAccessMemory::new(template(Features::BURST), 0x40, false).unwrap();
        rom.init(&[7]).unwrap();
        let mut master = BusMaster::new();
        master.write(&mut rom, 0, 1, 0xF).unwrap();
        assert_eq!(rom.peek(0), Some(7));

        let mut strict =
            RandomAccessMemory::new(template(Features::BURST | Features::ERR), 0x40, false).unwrap();
        assert_eq!(
            master.write(&mut strict, 1, 1, 0xF).unwrap_err(),
            FabricError::BusError(4)
        );
        assert_eq!(master.read(&mut strict, 0).unwrap().data, 0);
    }
}
