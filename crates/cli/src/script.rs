// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::Serialize;
use socfab_config::{BurstKind, ScriptStep, TransactionScript};
use socfab_core::bus::master::BusMaster;
use socfab_core::bus::{BurstType, BusInterface};
use socfab_core::BusTarget;
use std::fmt;

/// A script step with its byte address already converted to a bus word address.
#[derive(Debug, Clone, PartialEq)]
pub enum Planned {
    Read {
        address: u64,
        adr: u64,
        expect: Option<u64>,
    },
    Write {
        address: u64,
        adr: u64,
        value: u64,
        sel: u8,
    },
    BurstRead {
        address: u64,
        adr: u64,
        beats: usize,
        bte: BurstType,
        expect: Option<Vec<u64>>,
    },
    Idle {
        cycles: u64,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<u64>,
    pub data: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Vec<u64>>,
    pub cycles: u64,
    pub passed: bool,
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<10}", self.op)?;
        if let Some(address) = self.address {
            write!(f, " {:#010x}", address)?;
        }
        for d in &self.data {
            write!(f, " {:#x}", d)?;
        }
        write!(f, "  ({} cycles)", self.cycles)?;
        if !self.passed {
            if let Some(expected) = &self.expected {
                write!(f, "  MISMATCH, expected {:x?}", expected)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub steps: Vec<StepResult>,
    pub cycles: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn word_address(address: u64, bus: &BusInterface) -> anyhow::Result<u64> {
    let unit = address
        .checked_mul(8)
        .map(|bits| bits / u64::from(bus.granularity()))
        .ok_or_else(|| anyhow::anyhow!("Address {:#x} is beyond the bus", address))?;
    if unit % u64::from(bus.sel_width()) != 0 {
        anyhow::bail!(
            "Address {:#x} is not aligned to the {}-bit bus word",
            address,
            bus.data_width()
        );
    }
    let adr = unit >> bus.granularity_bits();
    if adr > bus.addr_mask() {
        anyhow::bail!("Address {:#x} is beyond the bus", address);
    }
    Ok(adr)
}

fn burst_type(kind: BurstKind) -> BurstType {
    match kind {
        BurstKind::Linear => BurstType::Linear,
        BurstKind::Wrap4 => BurstType::Wrap4,
        BurstKind::Wrap8 => BurstType::Wrap8,
        BurstKind::Wrap16 => BurstType::Wrap16,
    }
}

/// Checks every step against `bus` before anything runs.
pub fn plan(script: &TransactionScript, bus: &BusInterface) -> anyhow::Result<Vec<Planned>> {
    if script.steps.is_empty() {
        tracing::warn!("Transaction script has no steps");
    }
    let mut steps = Vec::with_capacity(script.steps.len());
    for (i, step) in script.steps.iter().enumerate() {
        let planned = match step {
            ScriptStep::Read { address, expect } => Planned::Read {
                address: *address,
                adr: word_address(*address, bus)?,
                expect: *expect,
            },
            ScriptStep::Write {
                address,
                value,
                sel,
            } => Planned::Write {
                address: *address,
                adr: word_address(*address, bus)?,
                value: *value & bus.data_mask(),
                sel: sel.unwrap_or(bus.sel_mask()) & bus.sel_mask(),
            },
            ScriptStep::BurstRead {
                address,
                beats,
                burst,
                expect,
            } => Planned::BurstRead {
                address: *address,
                adr: word_address(*address, bus)?,
                beats: *beats as usize,
                bte: burst_type(*burst),
                expect: expect.clone(),
            },
            ScriptStep::Idle { cycles } => Planned::Idle { cycles: *cycles },
        };
        tracing::debug!("Step {}: {:?}", i, planned);
        steps.push(planned);
    }
    Ok(steps)
}

/// Runs `steps` in order and stops at the first transfer the bus does not complete.
pub fn run(target: &mut dyn BusTarget, steps: &[Planned], max_cycles: Option<u64>) -> Report {
    let mut master = BusMaster::with_timeout(max_cycles.unwrap_or(BusMaster::DEFAULT_TIMEOUT));
    let mut results = Vec::with_capacity(steps.len());
    for step in steps {
        let before = master.cycles();
        let outcome = match step {
            Planned::Read {
                address,
                adr,
                expect,
            } => master.read(target, *adr).map(|done| StepResult {
                op: "read",
                address: Some(*address),
                data: vec![done.data],
                expected: expect.map(|e| vec![e]),
                cycles: 0,
                passed: expect.map_or(true, |e| e == done.data),
            }),
            Planned::Write {
                address,
                adr,
                value,
                sel,
            } => master.write(target, *adr, *value, *sel).map(|_| StepResult {
                op: "write",
                address: Some(*address),
                data: vec![*value],
                expected: None,
                cycles: 0,
                passed: true,
            }),
            Planned::BurstRead {
                address,
                adr,
                beats,
                bte,
                expect,
            } => master
                .burst_read(target, *adr, *bte, *beats)
                .map(|beats| {
                    let data: Vec<u64> = beats.iter().map(|b| b.data).collect();
                    StepResult {
                        op: "burst_read",
                        address: Some(*address),
                        passed: expect.as_ref().map_or(true, |e| *e == data),
                        data,
                        expected: expect.clone(),
                        cycles: 0,
                    }
                }),
            Planned::Idle { cycles } => master.idle(target, *cycles).map(|_| StepResult {
                op: "idle",
                address: None,
                data: Vec::new(),
                expected: None,
                cycles: 0,
                passed: true,
            }),
        };
        match outcome {
            Ok(mut result) => {
                result.cycles = master.cycles() - before;
                results.push(result);
            }
            Err(e) => {
                return Report {
                    steps: results,
                    cycles: master.cycles(),
                    error: Some(e.to_string()),
                }
            }
        }
    }
    Report {
        steps: results,
        cycles: master.cycles(),
        error: None,
    }
}
