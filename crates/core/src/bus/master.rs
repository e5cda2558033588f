// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Wishbone initiator model.

use super::{burst_increment, BurstType, CycleType, WishboneRequest, WishboneResponse};
use crate::{BusTarget, FabricError, FabricResult};

/// Outcome of one acknowledged transfer. `cycles` counts the edges that passed before the
/// acknowledge became visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub data: u64,
    pub cycles: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BurstBeat {
    pub adr: u64,
    pub data: u64,
}

/// Drives one target tick by tick, holding every request stable until it is acknowledged.
#[derive(Debug, Clone)]
pub struct BusMaster {
    timeout: u64,
    cycles: u64,
}

impl Default for BusMaster {
    fn default() -> Self {
        Self::new()
    }
}

impl BusMaster {
    pub const DEFAULT_TIMEOUT: u64 = 1024;

    pub fn new() -> Self {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: u64) -> Self {
        Self { timeout, cycles: 0 }
    }

    /// Clock edges driven so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Presents `req` for one tick and clocks the target.
    pub fn tick(
        &mut self,
        target: &mut dyn BusTarget,
        req: &WishboneRequest,
    ) -> FabricResult<WishboneResponse> {
        let resp = target.respond(req);
        if resp.ack && !req.is_active() {
            return Err(FabricError::ProtocolViolation(format!(
                "ack asserted with cyc={} stb={} at cycle {}",
                req.cyc, req.stb, self.cycles
            )));
        }
        target.clock(req);
        self.cycles += 1;
        Ok(resp)
    }

    pub fn idle(&mut self, target: &mut dyn BusTarget, cycles: u64) -> FabricResult<()> {
        let idle = WishboneRequest::idle();
        for _ in 0..cycles {
            self.tick(target, &idle)?;
        }
        Ok(())
    }

    pub fn transfer(
        &mut self,
        target: &mut dyn BusTarget,
        req: WishboneRequest,
    ) -> FabricResult<Completion> {
        let mut waited = 0;
        loop {
            let resp = self.tick(target, &req)?;
            if resp.err {
                return Err(FabricError::BusError(
                    target.interface().unit_address(req.adr),
                ));
            }
            if resp.ack {
                return Ok(Completion {
                    data: resp.dat_r,
                    cycles: waited,
                });
            }
            waited += 1;
            if waited > self.timeout {
                return Err(FabricError::Timeout {
                    addr: target.interface().unit_address(req.adr),
                    cycles: waited,
                });
            }
        }
    }

    /// Reads the full word at word address `adr`.
    pub fn read(&mut self, target: &mut dyn BusTarget, adr: u64) -> FabricResult<Completion> {
        let sel = target.interface().sel_mask();
        self.transfer(target, WishboneRequest::read(adr, sel))
    }

    pub fn write(
        &mut self,
        target: &mut dyn BusTarget,
        adr: u64,
        data: u64,
        sel: u8,
    ) -> FabricResult<Completion> {
        self.transfer(target, WishboneRequest::write(adr, data, sel))
    }

    /// Incrementing-burst read of `beats` words starting at `adr`; the last beat is flagged
    /// end-of-burst.
    pub fn burst_read(
        &mut self,
        target: &mut dyn BusTarget,
        adr: u64,
        bte: BurstType,
        beats: usize,
    ) -> FabricResult<Vec<BurstBeat>> {
        let sel = target.interface().sel_mask();
        let mut req = WishboneRequest::read(adr, sel).with_burst(CycleType::IncrBurst, bte);
        let mut out = Vec::with_capacity(beats);
        for beat in 0..beats {
            if beat + 1 == beats {
                req.cti = CycleType::EndOfBurst;
            }
            let done = self.transfer(target, req)?;
            out.push(BurstBeat {
                adr: req.adr,
                data: done.data,
            });
            req.adr = burst_increment(req.adr, bte);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusInterface, Features};

    #[derive(Debug, Default)]
    struct Faulty {
        stray_ack: bool,
        silent: bool,
        ack: bool,
    }

    impl BusTarget for Faulty {
        fn interface(&self) -> BusInterface {
            BusInterface::new(4, 32, 8).unwrap().with_features(Features::ERR)
        }

        fn respond(&self, req: &WishboneRequest) -> WishboneResponse {
            WishboneResponse {
                ack: self.ack || self.stray_ack,
                dat_r: req.adr * 3,
                err: req.we && req.adr == 0xF,
            }
        }

        fn clock(&mut self, req: &WishboneRequest) {
            self.ack = !self.silent && req.is_active() && !self.ack;
        }
    }

    #[test]
    fn test_read_reports_wait_cycles() {
        let mut target = Faulty::default();
        let mut master = BusMaster::new();
        let done = master.read(&mut target, 5).unwrap();
        assert_eq!(done, Completion { data: 15, cycles: 1 });
        assert_eq!(master.cycles(), 2);
    }

    #[test]
    fn test_stray_ack_is_a_protocol_violation() {
        let mut target = Faulty {
            stray_ack: true,
            ..Default::default()
        };
        let mut master = BusMaster::new();
        assert!(matches!(
            master.idle(&mut target, 1),
            Err(FabricError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_timeout_and_bus_error() {
        let mut target = Faulty {
            silent: true,
            ..Default::default()
        };
        let mut master = BusMaster::with_timeout(8);
        assert_eq!(
            master.read(&mut target, 1).unwrap_err(),
            FabricError::Timeout { addr: 4, cycles: 9 }
        );

        let mut target = Faulty::default();
        assert_eq!(
            master.write(&mut target, 0xF, 0, 0xF).unwrap_err(),
            FabricError::BusError(0x3C)
        );
    }

    #[test]
    fn test_empty_burst() {
        let mut target = Faulty::default();
        let mut master = BusMaster::new();
        let beats = master
            .burst_read(&mut target, 0, BurstType::Linear, 0)
            .unwrap();
        assert!(beats.is_empty());
        assert_eq!(master.cycles(), 0);
    }
}
