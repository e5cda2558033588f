// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Narrow register bus: elements and the multiplexer that lays them out.

use super::{bits_for, mask};
use crate::{FabricError, FabricResult};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsrInterface {
    pub addr_width: u32,
    pub data_width: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CsrRequest {
    pub addr: u64,
    pub r_stb: bool,
    pub w_stb: bool,
    pub w_data: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
    /// Writing 0 to a bit clears it, writing 1 leaves it alone.
    WriteZeroToClear,
}

impl Access {
    pub fn readable(self) -> bool {
        !matches!(self, Access::WriteOnly)
    }

    pub fn writable(self) -> bool {
        !matches!(self, Access::ReadOnly)
    }
}

/// A materialized register.
///
/// Bus writes and hardware updates are staged during a tick and applied together by
/// [`CsrElement::commit`] on the clock edge. A bus write overrides a hardware value; sticky bits
/// set through [`CsrElement::set_bits`] survive a simultaneous software clear.
#[derive(Debug, Clone)]
pub struct CsrElement {
    name: String,
    width: u32,
    access: Access,
    reset: u64,
    value: u64,
    bus_write: Option<u64>,
    hw_value: Option<u64>,
    hw_set: u64,
    written: bool,
    read: bool,
    read_pending: bool,
}

impl CsrElement {
    pub fn new(name: &str, width: u32, access: Access, reset: u64) -> Self {
        let reset = reset & mask(width);
        Self {
            name: name.to_string(),
            width,
            access,
            reset,
            value: reset,
            bus_write: None,
            hw_value: None,
            hw_set: 0,
            written: false,
            read: false,
            read_pending: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn reset_value(&self) -> u64 {
        self.reset
    }

    /// Value as of the last clock edge.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Whether the bus wrote this element on the last clock edge.
    pub fn written(&self) -> bool {
        self.written
    }

    /// Whether the bus read this element on the last clock edge.
    pub fn read(&self) -> bool {
        self.read
    }

    /// Stages a hardware-side value for the next edge.
    pub fn set(&mut self, value: u64) {
        self.hw_value = Some(value & mask(self.width));
    }

    /// Stages sticky bits for the next edge.
    pub fn set_bits(&mut self, bits: u64) {
        self.hw_set |= bits & mask(self.width);
    }

    pub(crate) fn force(&mut self, value: u64) {
        self.value = value & mask(self.width);
    }

    pub(crate) fn bus_read(&mut self) -> u64 {
        self.read_pending = true;
        if self.access.readable() {
            self.value
        } else {
            0
        }
    }

    pub(crate) fn bus_write(&mut self, value: u64) {
        if self.access.writable() {
            self.bus_write = Some(value & mask(self.width));
        }
    }

    pub(crate) fn commit(&mut self) {
        let mut next = self.hw_value.take().unwrap_or(self.value);
        self.written = false;
        if let Some(w) = self.bus_write.take() {
            next = match self.access {
                Access::WriteZeroToClear => next & w,
                _ => w,
            };
            self.written = true;
        }
        next |= std::mem::take(&mut self.hw_set);
        self.value = next & mask(self.width);
        self.read = std::mem::take(&mut self.read_pending);
    }
}

/// Index of an element inside the table a multiplexer serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementHandle(pub(crate) usize);

impl ElementHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Placement {
    handle: ElementHandle,
    addr: u64,
    lsb: u32,
    width: u32,
    chunks: u64,
}

impl Placement {
    fn bits_in(&self, chunk: u64, dw: u32) -> u64 {
        if chunk < self.addr || chunk >= self.addr + self.chunks {
            return 0;
        }
        let k = (chunk - self.addr) as u32;
        mask((self.width - k * dw).min(dw)) << self.lsb
    }
}

/// Register-bank multiplexer.
///
/// Elements wider than the bus are split into consecutive chunks. Reading the first chunk
/// captures the whole element into a shadow register that the remaining chunks are read from;
/// writes collect in the shadow and reach the element together with the last chunk. Elements
/// narrower than the bus may share a chunk as long as their bit ranges are disjoint. Reads are
/// registered: `r_data` holds the data for the chunk strobed on the previous edge.
#[derive(Debug)]
pub struct CsrMultiplexer {
    data_width: u32,
    alignment: u32,
    placements: Vec<Placement>,
    names: Vec<String>,
    chunks: BTreeMap<u64, Vec<usize>>,
    occupancy: BTreeMap<u64, u64>,
    shadows: Vec<u64>,
    strobed: Vec<u64>,
    r_data: u64,
    end: u64,
}

impl CsrMultiplexer {
    pub fn new(data_width: u32, alignment: u32) -> FabricResult<Self> {
        if !matches!(data_width, 8 | 16 | 32 | 64) {
            return Err(FabricError::Configuration(format!(
                "Register bus data width must be one of 8, 16, 32, 64, not {}",
                data_width
            )));
        }
        Ok(Self {
            data_width,
            alignment,
            placements: Vec::new(),
            names: Vec::new(),
            chunks: BTreeMap::new(),
            occupancy: BTreeMap::new(),
            shadows: Vec::new(),
            strobed: Vec::new(),
            r_data: 0,
            end: 0,
        })
    }

    pub fn data_width(&self) -> u32 {
        self.data_width
    }

    /// First chunk address past every placed element.
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn addr_width(&self) -> u32 {
        bits_for(self.end)
    }

    pub fn r_data(&self) -> u64 {
        self.r_data
    }

    /// Places an element of `width` bits at chunk `addr`, starting at bit `lsb` of that chunk.
    pub fn add(
        &mut self,
        name: &str,
        handle: ElementHandle,
        width: u32,
        addr: u64,
        lsb: u32,
    ) -> FabricResult<()> {
        let dw = self.data_width;
        if width == 0 || width > 64 {
            return Err(FabricError::Configuration(format!(
                "Register '{}' width {} must be between 1 and 64 bits",
                name, width
            )));
        }
        if addr & mask(self.alignment) != 0 {
            return Err(FabricError::Configuration(format!(
                "Register '{}' at {:#x} violates the bank alignment of {} chunks",
                name,
                addr,
                1u64 << self.alignment
            )));
        }
        if lsb > 0 && lsb + width > dw {
            return Err(FabricError::Configuration(format!(
                "Register '{}' at bit {} does not fit a {}-bit chunk",
                name, lsb, dw
            )));
        }
        let chunks = u64::from(width.div_ceil(dw));
        let end = addr + chunks;

        let placement = Placement {
            handle,
            addr,
            lsb,
            width,
            chunks,
        };
        let chunk_masks: Vec<(u64, u64)> = (addr..end)
            .map(|chunk| (chunk, placement.bits_in(chunk, dw)))
            .collect();
        for &(chunk, bits) in &chunk_masks {
            let taken = self.occupancy.get(&chunk).copied().unwrap_or(0);
            if taken & bits != 0 {
                let existing = self
                    .chunks
                    .get(&chunk)
                    .into_iter()
                    .flatten()
                    .find(|&&p| self.placements[p].bits_in(chunk, dw) & bits != 0)
                    .map(|&p| self.names[p].clone())
                    .unwrap_or_default();
                return Err(FabricError::AddressConflict {
                    name: name.to_string(),
                    start: addr,
                    end,
                    existing,
                });
            }
        }

        let index = self.placements.len();
        for (chunk, bits) in chunk_masks {
            *self.occupancy.entry(chunk).or_insert(0) |= bits;
            self.chunks.entry(chunk).or_default().push(index);
        }
        self.placements.push(placement);
        self.names.push(name.to_string());
        self.shadows.push(0);
        self.strobed.push(0);
        self.end = self.end.max(end);
        Ok(())
    }

    /// Applies one register-bus cycle to the elements in `table`.
    pub fn clock(&mut self, req: &CsrRequest, table: &mut [CsrElement]) {
        let dw = self.data_width;
        let dmask = mask(dw);
        let mut r_data = 0;

        if let Some(indices) = self.chunks.get(&req.addr) {
            for &p in indices {
                let pl = &self.placements[p];
                let k = req.addr - pl.addr;
                let shift = (k as u32) * dw;
                let Some(elem) = table.get_mut(pl.handle.0) else {
                    continue;
                };

                if req.r_stb {
                    let chunk = if pl.chunks == 1 {
                        elem.bus_read()
                    } else if k == 0 {
                        let v = elem.bus_read();
                        self.shadows[p] = v;
                        v & dmask
                    } else {
                        (self.shadows[p] >> shift) & dmask
                    };
                    r_data |= (chunk << pl.lsb) & dmask;
                }

                if req.w_stb {
                    let slice = (req.w_data >> pl.lsb) & mask(pl.width.min(dw));
                    if pl.chunks == 1 {
                        elem.bus_write(slice);
                    } else {
                        let shadow = &mut self.shadows[p];
                        *shadow = (*shadow & !(dmask << shift)) | (slice << shift);
                        self.strobed[p] |= dmask << shift;
                        if k + 1 == pl.chunks {
                            // Lanes not written in this access leave W0C bits alone.
                            let value = match elem.access() {
                                Access::WriteZeroToClear => *shadow | !self.strobed[p],
                                _ => *shadow,
                            };
                            elem.bus_write(value);
                            self.strobed[p] = 0;
                        }
                    }
                }
            }
        }

        self.r_data = r_data;
    }
}
