// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use super::{bits_for, exact_log2, MAX_MAP_BITS};
use crate::{FabricError, FabricResult};

/// One claimed address range. `start..end` is in granularity units.
#[derive(Debug)]
pub struct WindowEntry<T> {
    pub name: String,
    pub start: u64,
    pub end: u64,
    pub route: T,
}

impl<T> WindowEntry<T> {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// Non-overlapping, size-aligned, power-of-two address windows.
///
/// A fixed map rejects windows that do not fit its address width; a growable map widens itself
/// instead.
#[derive(Debug)]
pub struct MemoryMap<T> {
    addr_width: u32,
    growable: bool,
    entries: Vec<WindowEntry<T>>,
    next_free: u64,
}

impl<T> MemoryMap<T> {
    pub fn new(addr_width: u32) -> Self {
        Self {
            addr_width,
            growable: false,
            entries: Vec::new(),
            next_free: 0,
        }
    }

    pub fn growable() -> Self {
        Self {
            growable: true,
            ..Self::new(0)
        }
    }

    pub fn addr_width(&self) -> u32 {
        self.addr_width
    }

    pub fn span(&self) -> u64 {
        1u64 << self.addr_width
    }

    /// Claims `size` units at `addr`, or at the next free size-aligned address when `addr` is
    /// `None`. Returns the window start.
    pub fn add(&mut self, name: &str, size: u64, addr: Option<u64>, route: T) -> FabricResult<u64> {
        if exact_log2(size).is_none() {
            return Err(FabricError::Configuration(format!(
                "Window '{}' size must be a power of two, not {:#x}",
                name, size
            )));
        }
        let start = match addr {
            Some(addr) if addr & (size - 1) != 0 => {
                return Err(FabricError::Configuration(format!(
                    "Window '{}' at {:#x} is not aligned to its size {:#x}",
                    name, addr, size
                )));
            }
            Some(addr) => addr,
            None => self
                .next_free
                .checked_add(size - 1)
                .map(|v| v & !(size - 1))
                .ok_or_else(|| {
                    FabricError::Configuration(format!("No room left for window '{}'", name))
                })?,
        };
        let end = start.checked_add(size).ok_or_else(|| {
            FabricError::Configuration(format!(
                "Window '{}' at {:#x} wraps the address space",
                name, start
            ))
        })?;

        if let Some(existing) = self.entries.iter().find(|e| start < e.end && e.start < end) {
            return Err(FabricError::AddressConflict {
                name: name.to_string(),
                start,
                end,
                existing: existing.name.clone(),
            });
        }

        let needed = bits_for(end);
        if needed > self.addr_width {
            if !self.growable || needed > MAX_MAP_BITS {
                return Err(FabricError::Configuration(format!(
                    "Window '{}' ({:#x}..{:#x}) exceeds the {:#x} unit address space",
                    name,
                    start,
                    end,
                    self.span()
                )));
            }
            self.addr_width = needed;
        }

        let pos = self.entries.partition_point(|e| e.start < start);
        self.entries.insert(
            pos,
            WindowEntry {
                name: name.to_string(),
                start,
                end,
                route,
            },
        );
        self.next_free = self.next_free.max(end);
        Ok(start)
    }

    pub fn decode(&self, addr: u64) -> Option<(usize, &WindowEntry<T>)> {
        let pos = self.entries.partition_point(|e| e.start <= addr);
        let idx = pos.checked_sub(1)?;
        let entry = &self.entries[idx];
        entry.contains(addr).then_some((idx, entry))
    }

    pub fn find_start(&self, start: u64) -> Option<usize> {
        self.entries
            .binary_search_by_key(&start, |e| e.start)
            .ok()
    }

    pub fn entries(&self) -> &[WindowEntry<T>] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [WindowEntry<T>] {
        &mut self.entries
    }
}
