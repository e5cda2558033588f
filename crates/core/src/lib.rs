// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod bus;
pub mod event;
pub mod interrupt;
pub mod peripherals;
pub mod register;
pub mod signals;
pub mod system;

use bus::csr::{CsrInterface, CsrRequest};
use bus::{BusInterface, WishboneRequest, WishboneResponse};

/// Every failure the fabric can report.
///
/// The first four variants are elaboration errors: they are raised while a decoder tree or a
/// peripheral is being composed and are never recovered from. `BusError` and `Timeout` are only
/// produced by [`bus::master::BusMaster`] when it observes a transaction that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FabricError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Address conflict: '{name}' at {start:#x}..{end:#x} overlaps '{existing}'")]
    AddressConflict {
        name: String,
        start: u64,
        end: u64,
        existing: String,
    },
    #[error("Index {index} out of range ({count} available)")]
    OutOfRange { index: u64, count: u64 },
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("Bus error at {0:#x}")]
    BusError(u64),
    #[error("Transaction at {addr:#x} not acknowledged after {cycles} cycles")]
    Timeout { addr: u64, cycles: u64 },
}

pub type FabricResult<T> = Result<T, FabricError>;

/// A Wishbone target clocked by the global fabric clock.
///
/// Each tick the initiator presents a request, samples [`BusTarget::respond`] (the combinational
/// view of the target's outputs for that request) and then calls [`BusTarget::clock`] once, which
/// applies every edge-triggered update atomically.
pub trait BusTarget: std::fmt::Debug + Send {
    fn interface(&self) -> BusInterface;
    fn respond(&self, req: &WishboneRequest) -> WishboneResponse;
    fn clock(&mut self, req: &WishboneRequest);

    /// Level of the target's interrupt line after the last clock edge.
    fn irq(&self) -> bool {
        false
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// The narrow register bus behind a [`bus::bridge::WishboneCsrBridge`].
pub trait CsrTarget: std::fmt::Debug + Send {
    fn csr_interface(&self) -> CsrInterface;

    /// Read data for the request strobed on the previous edge.
    fn r_data(&self) -> u64;

    /// Cycles between a read strobe and valid `r_data`.
    fn read_latency(&self) -> u32 {
        1
    }

    fn clock(&mut self, req: &CsrRequest);
}
