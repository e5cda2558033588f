// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::RegisterFile;
use crate::bus::csr::{CsrInterface, CsrMultiplexer, CsrRequest};
use crate::{CsrTarget, FabricError, FabricResult};

/// A finalized register file behind its multiplexer.
///
/// Clocking the bank only stages bus accesses; the owner commits the file once hardware-side
/// updates for the same edge are in.
#[derive(Debug)]
pub struct RegisterBank {
    file: RegisterFile,
    mux: CsrMultiplexer,
    addr_width: u32,
}

impl RegisterBank {
    /// `addr_width` may exceed what the placed elements need, to leave room in a fixed window.
    pub fn new(file: RegisterFile, mux: CsrMultiplexer, addr_width: u32) -> FabricResult<Self> {
        if addr_width < mux.addr_width() {
            return Err(FabricError::Configuration(format!(
                "Register bank needs {} address bits, {} given",
                mux.addr_width(),
                addr_width
            )));
        }
        Ok(Self {
            file,
            mux,
            addr_width,
        })
    }

    pub fn file(&self) -> &RegisterFile {
        &self.file
    }

    pub fn file_mut(&mut self) -> &mut RegisterFile {
        &mut self.file
    }
}

impl CsrTarget for RegisterBank {
    fn csr_interface(&self) -> CsrInterface {
        CsrInterface {
            addr_width: self.addr_width,
            data_width: self.mux.data_width(),
        }
    }

    fn r_data(&self) -> u64 {
        self.mux.r_data()
    }

    fn clock(&mut self, req: &CsrRequest) {
        self.mux.clock(req, self.file.elements_mut());
    }
}
