// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Wishbone signal set and the building blocks routed over it.

pub mod bridge;
pub mod csr;
pub mod decoder;
pub mod map;
pub mod master;

use crate::{FabricError, FabricResult};

/// Memory maps count granularity units; a map wider than this no longer fits a `u64`.
pub const MAX_MAP_BITS: u32 = 63;

bitflags::bitflags! {
    /// Optional Wishbone signals carried by an interface.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Features: u8 {
        const CTI = 1 << 0;
        const BTE = 1 << 1;
        const ERR = 1 << 2;
    }
}

impl Features {
    pub const BURST: Features = Features::CTI.union(Features::BTE);
}

/// Cycle type identifier (`cti`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleType {
    #[default]
    Classic = 0b000,
    ConstBurst = 0b001,
    IncrBurst = 0b010,
    EndOfBurst = 0b111,
}

/// Burst type extension (`bte`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BurstType {
    #[default]
    Linear = 0b00,
    Wrap4 = 0b01,
    Wrap8 = 0b10,
    Wrap16 = 0b11,
}

impl BurstType {
    /// Number of low address bits that wrap, `None` for linear bursts.
    pub fn wrap_bits(self) -> Option<u32> {
        match self {
            BurstType::Linear => None,
            BurstType::Wrap4 => Some(2),
            BurstType::Wrap8 => Some(3),
            BurstType::Wrap16 => Some(4),
        }
    }
}

/// Address of the beat following `adr` in an incrementing burst.
///
/// Linear bursts increment the whole address. Wrapping bursts increment only the low 2/3/4 bits
/// modulo 4/8/16 and leave the upper bits untouched.
pub fn burst_increment(adr: u64, bte: BurstType) -> u64 {
    match bte.wrap_bits() {
        None => adr.wrapping_add(1),
        Some(bits) => {
            let mask = (1u64 << bits) - 1;
            (adr & !mask) | (adr.wrapping_add(1) & mask)
        }
    }
}

pub(crate) fn exact_log2(value: u64) -> Option<u32> {
    if value != 0 && value.is_power_of_two() {
        Some(value.trailing_zeros())
    } else {
        None
    }
}

/// Smallest `n` such that `value <= 1 << n`.
pub(crate) fn bits_for(value: u64) -> u32 {
    if value <= 1 {
        0
    } else {
        64 - (value - 1).leading_zeros()
    }
}

pub(crate) fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Shape of one Wishbone endpoint.
///
/// `addr_width` counts word-address bits, as `adr` does. The memory map behind the interface is
/// addressed in granularity units and therefore spans `addr_width + log2(data_width / granularity)`
/// bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusInterface {
    addr_width: u32,
    data_width: u32,
    granularity: u32,
    features: Features,
}

impl BusInterface {
    pub fn new(addr_width: u32, data_width: u32, granularity: u32) -> FabricResult<Self> {
        if !matches!(data_width, 8 | 16 | 32 | 64) {
            return Err(FabricError::Configuration(format!(
                "Data width must be one of 8, 16, 32, 64, not {}",
                data_width
            )));
        }
        if !matches!(granularity, 8 | 16 | 32 | 64) || granularity > data_width {
            return Err(FabricError::Configuration(format!(
                "Granularity must be one of 8, 16, 32, 64 and not greater than the data width \
                 ({}), not {}",
                data_width, granularity
            )));
        }
        let iface = Self {
            addr_width,
            data_width,
            granularity,
            features: Features::empty(),
        };
        if iface.map_bits() > MAX_MAP_BITS {
            return Err(FabricError::Configuration(format!(
                "Address width {} exceeds the maximum of {} bits at granularity {}",
                addr_width,
                MAX_MAP_BITS - iface.granularity_bits(),
                granularity
            )));
        }
        Ok(iface)
    }

    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    pub fn addr_width(&self) -> u32 {
        self.addr_width
    }

    pub fn data_width(&self) -> u32 {
        self.data_width
    }

    pub fn granularity(&self) -> u32 {
        self.granularity
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn supports(&self, features: Features) -> bool {
        self.features.contains(features)
    }

    /// Width of `sel`.
    pub fn sel_width(&self) -> u32 {
        self.data_width / self.granularity
    }

    pub fn granularity_bits(&self) -> u32 {
        self.sel_width().trailing_zeros()
    }

    pub fn map_bits(&self) -> u32 {
        self.addr_width + self.granularity_bits()
    }

    /// Size of the memory map behind this interface, in granularity units.
    pub fn span(&self) -> u64 {
        1u64 << self.map_bits()
    }

    pub fn addr_mask(&self) -> u64 {
        mask(self.addr_width)
    }

    pub fn data_mask(&self) -> u64 {
        mask(self.data_width)
    }

    pub fn sel_mask(&self) -> u8 {
        mask(self.sel_width()) as u8
    }

    /// Converts a word address into a memory map address.
    pub fn unit_address(&self, adr: u64) -> u64 {
        (adr & self.addr_mask()) << self.granularity_bits()
    }

    /// Whether a target with interface `sub` can sit behind this interface.
    pub(crate) fn check_compatible(&self, name: &str, sub: &BusInterface) -> FabricResult<()> {
        if sub.data_width != self.data_width || sub.granularity != self.granularity {
            return Err(FabricError::Configuration(format!(
                "'{}' has data width {} / granularity {}, bus has {} / {}",
                name, sub.data_width, sub.granularity, self.data_width, self.granularity
            )));
        }
        Ok(())
    }
}

/// Initiator to target signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WishboneRequest {
    pub cyc: bool,
    pub stb: bool,
    pub adr: u64,
    pub we: bool,
    pub sel: u8,
    pub dat_w: u64,
    pub cti: CycleType,
    pub bte: BurstType,
}

impl WishboneRequest {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn read(adr: u64, sel: u8) -> Self {
        Self {
            cyc: true,
            stb: true,
            adr,
            sel,
            ..Self::default()
        }
    }

    pub fn write(adr: u64, dat_w: u64, sel: u8) -> Self {
        Self {
            cyc: true,
            stb: true,
            adr,
            we: true,
            sel,
            dat_w,
            ..Self::default()
        }
    }

    pub fn with_burst(mut self, cti: CycleType, bte: BurstType) -> Self {
        self.cti = cti;
        self.bte = bte;
        self
    }

    pub fn is_active(&self) -> bool {
        self.cyc && self.stb
    }

    /// The request as seen by one target behind a decoder: deselected targets see an idle bus,
    /// and burst signals a target does not implement read as classic/linear.
    pub(crate) fn forwarded(&self, selected: bool, adr: u64, features: Features) -> Self {
        let mut sub = *self;
        sub.adr = adr;
        sub.cyc = self.cyc && selected;
        sub.stb = self.stb && selected;
        if !features.contains(Features::CTI) {
            sub.cti = CycleType::Classic;
        }
        if !features.contains(Features::BTE) {
            sub.bte = BurstType::Linear;
        }
        sub
    }
}

/// Target to initiator signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WishboneResponse {
    pub ack: bool,
    pub dat_r: u64,
    pub err: bool,
}

impl WishboneResponse {
    /// Response of a decoder to an access nothing answers for.
    pub(crate) fn unmapped(iface: &BusInterface, req: &WishboneRequest) -> Self {
        Self {
            err: req.is_active() && iface.supports(Features::ERR),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap4_increment_keeps_upper_bits() {
        let start = 0x1236;
        let mut adr = start;
        let mut visited = Vec::new();
        for _ in 0..4 {
            visited.push(adr);
            adr = burst_increment(adr, BurstType::Wrap4);
        }
        assert_eq!(visited, vec![0x1236, 0x1237, 0x1234, 0x1235]);
        assert_eq!(adr, start);
    }

    #[test]
    fn test_wrap8_and_wrap16_increment() {
        assert_eq!(burst_increment(0x47, BurstType::Wrap8), 0x40);
        assert_eq!(burst_increment(0x4F, BurstType::Wrap16), 0x40);
        assert_eq!(burst_increment(0x4F, BurstType::Wrap8), 0x48);
    }

    #[test]
    fn test_linear_increment_carries() {
        assert_eq!(burst_increment(0x0F, BurstType::Linear), 0x10);
        assert_eq!(burst_increment(0xFF, BurstType::Linear), 0x100);
    }

    #[test]
    fn test_interface_geometry() {
        let iface = BusInterface::new(30, 32, 8).unwrap();
        assert_eq!(iface.sel_width(), 4);
        assert_eq!(iface.granularity_bits(), 2);
        assert_eq!(iface.span(), 1 << 32);
        assert_eq!(iface.unit_address(0x1000_0000 >> 2), 0x1000_0000);
    }

    #[test]
    fn test_interface_rejects_bad_widths() {
        assert!(matches!(
            BusInterface::new(30, 24, 8),
            Err(FabricError::Configuration(_))
        ));
        assert!(matches!(
            BusInterface::new(30, 16, 32),
            Err(FabricError::Configuration(_))
        ));
        assert!(matches!(
            BusInterface::new(62, 32, 8),
            Err(FabricError::Configuration(_))
        ));
    }

    #[test]
    fn test_log2_helpers() {
        assert_eq!(exact_log2(0x1000), Some(12));
        assert_eq!(exact_log2(0x1800), None);
        assert_eq!(exact_log2(0), None);
        assert_eq!(bits_for(0), 0);
        assert_eq!(bits_for(1), 0);
        assert_eq!(bits_for(5), 3);
        assert_eq!(bits_for(8), 3);
        assert_eq!(bits_for(9), 4);
    }
}
