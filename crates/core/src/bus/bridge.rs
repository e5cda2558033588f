// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::csr::CsrRequest;
use super::{mask, BusInterface, WishboneRequest, WishboneResponse};
use crate::{BusTarget, CsrTarget, FabricError, FabricResult};

/// Wishbone to register-bus width converter.
///
/// One wide transaction becomes `ratio` narrow beats followed by an acknowledge cycle. Beat `k`
/// drives narrow address `adr << log2(ratio) | k` and strobes only if `sel[k]` is set; the read
/// data it returns is captured into lane `k` on the next edge. The acknowledge is a one-cycle
/// pulse after which the beat counter restarts, so every transaction costs `ratio + 1` edges
/// whatever `sel` holds.
#[derive(Debug)]
pub struct WishboneCsrBridge<C> {
    bus: BusInterface,
    ratio_bits: u32,
    narrow_width: u32,
    beat: u32,
    ack: bool,
    dat_r: u64,
    target: C,
}

impl<C: CsrTarget> WishboneCsrBridge<C> {
    pub fn new(target: C, data_width: u32) -> FabricResult<Self> {
        let narrow = target.csr_interface();
        if target.read_latency() != 1 {
            return Err(FabricError::Configuration(format!(
                "Register bus read latency must be 1 cycle, not {}",
                target.read_latency()
            )));
        }
        if narrow.data_width > data_width || data_width % narrow.data_width != 0 {
            return Err(FabricError::Configuration(format!(
                "Register bus width {} does not divide bus width {}",
                narrow.data_width, data_width
            )));
        }
        let ratio_bits = (data_width / narrow.data_width).trailing_zeros();
        let bus = BusInterface::new(
            narrow.addr_width.saturating_sub(ratio_bits),
            data_width,
            narrow.data_width,
        )?;
        Ok(Self {
            bus,
            ratio_bits,
            narrow_width: narrow.data_width,
            beat: 0,
            ack: false,
            dat_r: 0,
            target,
        })
    }

    pub fn ratio(&self) -> u32 {
        1 << self.ratio_bits
    }

    /// Current position in the transfer cycle, `0..=ratio`.
    pub fn beat(&self) -> u32 {
        self.beat
    }

    pub fn target(&self) -> &C {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut C {
        &mut self.target
    }

    fn capture(&mut self, lane: u32, r_data: u64) {
        let shift = lane * self.narrow_width;
        self.dat_r = (self.dat_r & !(mask(self.narrow_width) << shift)) | (r_data << shift);
    }

    /// Narrow-side signals driven for `req` in the current beat.
    pub fn narrow_request(&self, req: &WishboneRequest) -> CsrRequest {
        if !req.is_active() || self.ack || self.beat >= self.ratio() {
            return CsrRequest::default();
        }
        let beat = self.beat;
        let selected = req.sel & (1 << beat) != 0;
        CsrRequest {
            addr: ((req.adr & self.bus.addr_mask()) << self.ratio_bits) | u64::from(beat),
            r_stb: selected && !req.we,
            w_stb: selected && req.we,
            w_data: if selected && req.we {
                (req.dat_w >> (beat * self.narrow_width)) & mask(self.narrow_width)
            } else {
                0
            },
        }
    }
}

impl<C: CsrTarget> BusTarget for WishboneCsrBridge<C> {
    fn interface(&self) -> BusInterface {
        self.bus
    }

    fn respond(&self, req: &WishboneRequest) -> WishboneResponse {
        WishboneResponse {
            ack: self.ack && req.is_active(),
            dat_r: self.dat_r,
            err: false,
        }
    }

    fn clock(&mut self, req: &WishboneRequest) {
        let narrow = self.narrow_request(req);
        let r_data = self.target.r_data() & mask(self.narrow_width);
        self.target.clock(&narrow);

        if !req.is_active() || self.ack {
            self.beat = 0;
            self.ack = false;
            return;
        }

        if self.beat < self.ratio() {
            if self.beat > 0 {
                self.capture(self.beat - 1, r_data);
            }
            self.beat += 1;
        } else {
            self.capture(self.beat - 1, r_data);
            self.ack = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::csr::CsrInterface;

    /// Byte-wide scratch memory that records every strobe it sees.
    #[derive(Debug)]
    struct Scratch {
        bytes: Vec<u8>,
        r_data: u64,
        strobes: Vec<(u64, bool)>,
        latency: u32,
    }

    impl Scratch {
        fn new() -> Self {
            Self {
                bytes: (0..16).map(|i| 0x10 + i as u8).collect(),
                r_data: 0,
                strobes: Vec::new(),
                latency: 1,
            }
        }
    }

    impl CsrTarget for Scratch {
        fn csr_interface(&self) -> CsrInterface {
            CsrInterface {
                addr_width: 4,
                data_width: 8,
            }
        }

        fn r_data(&self) -> u64 {
            self.r_data
        }

        fn read_latency(&self) -> u32 {
            self.latency
        }

        fn clock(&mut self, req: &CsrRequest) {
            self.r_data = 0;
            let addr = req.addr as usize;
            if req.r_stb {
                self.r_data = u64::from(self.bytes[addr]);
                self.strobes.push((req.addr, false));
            }
            if req.w_stb {
                self.bytes[addr] = req.w_data as u8;
                self.strobes.push((req.addr, true));
            }
        }
    }

    fn run(bridge: &mut WishboneCsrBridge<Scratch>, req: WishboneRequest) -> (u32, u64) {
        let mut edges = 0;
        loop {
            let resp = bridge.respond(&req);
            bridge.clock(&req);
            if resp.ack {
                return (edges, resp.dat_r);
            }
            edges += 1;
            assert!(edges < 32, "bridge never acknowledged");
        }
    }

    #[test]
    fn test_geometry() {
        let bridge = WishboneCsrBridge::new(Scratch::new(), 32).unwrap();
        assert_eq!(bridge.ratio(), 4);
        let iface = bridge.interface();
        assert_eq!(iface.addr_width(), 2);
        assert_eq!(iface.granularity(), 8);
        assert_eq!(iface.sel_width(), 4);
    }

    #[test]
    fn test_read_assembles_lanes() {
        let mut bridge = WishboneCsrBridge::new(Scratch::new(), 32).unwrap();
        let (edges, data) = run(&mut bridge, WishboneRequest::read(1, 0b1111));
        assert_eq!(edges, 5);
        assert_eq!(data, 0x1716_1514);
        let addrs: Vec<u64> = bridge.target().strobes.iter().map(|s| s.0).collect();
        assert_eq!(addrs, vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_latency_independent_of_sel() {
        for sel in 0..16u8 {
            let mut bridge = WishboneCsrBridge::new(Scratch::new(), 32).unwrap();
            let (edges, _) = run(&mut bridge, WishboneRequest::write(2, 0xAABB_CCDD, sel));
            assert_eq!(edges, 5, "sel {:#06b}", sel);
            assert_eq!(bridge.target().strobes.len(), sel.count_ones() as usize);
        }
    }

    #[test]
    fn test_partial_write_touches_selected_lanes_only() {
        let mut bridge = WishboneCsrBridge::new(Scratch::new(), 32).unwrap();
        run(&mut bridge, WishboneRequest::write(0, 0xAABB_CCDD, 0b0101));
        assert_eq!(&bridge.target().bytes[0..4], &[0xDD, 0x11, 0xBB, 0x13]);
    }

    #[test]
    fn test_abort_resets_without_ack() {
        let mut bridge = WishboneCsrBridge::new(Scratch::new(), 32).unwrap();
        let req = WishboneRequest::read(0, 0b1111);
        bridge.clock(&req);
        bridge.clock(&req);
        assert_eq!(bridge.beat(), 2);
        let idle = WishboneRequest::idle();
        for _ in 0..8 {
            assert!(!bridge.respond(&idle).ack);
            bridge.clock(&idle);
        }
        assert_eq!(bridge.beat(), 0);
        let (edges, data) = run(&mut bridge, req);
        assert_eq!(edges, 5);
        assert_eq!(data, 0x1312_1110);
    }

    #[test]
    fn test_back_to_back_transactions() {
        let mut bridge = WishboneCsrBridge::new(Scratch::new(), 16).unwrap();
        assert_eq!(bridge.ratio(), 2);
        assert_eq!(run(&mut bridge, WishboneRequest::read(0, 0b11)), (3, 0x1110));
        assert_eq!(run(&mut bridge, WishboneRequest::read(1, 0b11)), (3, 0x1312));
    }

    #[test]
    fn test_rejects_unsupported_targets() {
        let mut slow = Scratch::new();
        slow.latency = 2;
        assert!(matches!(
            WishboneCsrBridge::new(slow, 32),
            Err(FabricError::Configuration(_))
        ));
        assert!(matches!(
            WishboneCsrBridge::new(Scratch::new(), 4),
            Err(FabricError::Configuration(_))
        ));
    }
}
