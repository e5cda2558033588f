// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod bridge;
pub mod declarative;
pub mod memory;
pub mod timer;

use crate::event::{EventBlock, EventSpec};
use crate::register::{FieldSpec, RegisterFile};
use crate::signals::TriggerMode;
use crate::{BusTarget, FabricError, FabricResult};
use std::collections::HashSet;
use std::sync::Arc;

/// Register and event layout shared by every instance of one peripheral type.
#[derive(Debug, Clone)]
pub struct PeripheralSpec {
    name: String,
    fields: Arc<[FieldSpec]>,
    events: Arc<[EventSpec]>,
    word_width: u32,
    register_width: u32,
    alignment: u32,
}

impl PeripheralSpec {
    pub fn builder(name: &str) -> PeripheralSpecBuilder {
        PeripheralSpecBuilder {
            name: name.to_string(),
            fields: Vec::new(),
            events: Vec::new(),
            word_width: 32,
            register_width: 8,
            alignment: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &Arc<[FieldSpec]> {
        &self.fields
    }

    pub fn events(&self) -> &Arc<[EventSpec]> {
        &self.events
    }

    /// Width of a `FixedWord` register.
    pub fn word_width(&self) -> u32 {
        self.word_width
    }

    /// Data width of the register bus; field addresses count chunks of this width.
    pub fn register_width(&self) -> u32 {
        self.register_width
    }

    pub fn alignment(&self) -> u32 {
        self.alignment
    }

    /// Fresh per-instance register and event state.
    pub fn instantiate(&self) -> (RegisterFile, EventBlock) {
        (
            RegisterFile::new(Arc::clone(&self.fields), self.word_width),
            EventBlock::new(Arc::clone(&self.events)),
        )
    }
}

#[derive(Debug, Clone)]
pub struct PeripheralSpecBuilder {
    name: String,
    fields: Vec<FieldSpec>,
    events: Vec<EventSpec>,
    word_width: u32,
    register_width: u32,
    alignment: u32,
}

impl PeripheralSpecBuilder {
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn constant(self, name: &str, addr: u64, value: u64, width: u32) -> Self {
        self.field(FieldSpec::constant(name, addr, value, width))
    }

    pub fn bit(self, name: &str, addr: u64, bit: u32) -> Self {
        self.field(FieldSpec::bit(name, addr, bit))
    }

    pub fn word(self, name: &str, addr: u64) -> Self {
        self.field(FieldSpec::word(name, addr))
    }

    pub fn variable(self, name: &str, addr: u64, width_source: &str) -> Self {
        self.field(FieldSpec::variable(name, addr, width_source))
    }

    pub fn event(mut self, name: &str, bit: u32, mode: TriggerMode) -> Self {
        self.events.push(EventSpec::new(name, bit, mode));
        self
    }

    pub fn word_width(mut self, width: u32) -> Self {
        self.word_width = width;
        self
    }

    pub fn register_width(mut self, width: u32) -> Self {
        self.register_width = width;
        self
    }

    pub fn alignment(mut self, alignment: u32) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn build(self) -> FabricResult<PeripheralSpec> {
        if self.word_width == 0 || self.word_width > 64 {
            return Err(FabricError::Configuration(format!(
                "'{}': word width must be within 1..=64, not {}",
                self.name, self.word_width
            )));
        }
        let mut names = HashSet::new();
        let all_names = self
            .fields
            .iter()
            .map(|f| &f.name)
            .chain(self.events.iter().map(|e| &e.name));
        for name in all_names {
            if !names.insert(name.as_str()) {
                return Err(FabricError::Configuration(format!(
                    "'{}': '{}' is declared twice",
                    self.name, name
                )));
            }
        }
        let mut keys = HashSet::new();
        for field in &self.fields {
            if !keys.insert(field.key()) {
                return Err(FabricError::Configuration(format!(
                    "'{}': register '{}' reuses the address of another field",
                    self.name, field.name
                )));
            }
        }
        Ok(PeripheralSpec {
            name: self.name,
            fields: Arc::from(self.fields),
            events: Arc::from(self.events),
            word_width: self.word_width,
            register_width: self.register_width,
            alignment: self.alignment,
        })
    }
}

/// A memory window a peripheral exposes directly, at a peripheral-relative address in
/// granularity units.
#[derive(Debug)]
pub struct RawWindow {
    pub name: String,
    pub addr: u64,
    pub target: Box<dyn BusTarget>,
}

/// Per-instance state handed to a [`PeripheralCore`].
#[derive(Debug)]
pub struct CoreContext<'a> {
    pub registers: &'a mut RegisterFile,
    pub events: &'a mut EventBlock,
}

/// Functional logic of a peripheral; register and event plumbing is left to
/// [`bridge::PeripheralBridge`].
pub trait PeripheralCore: std::fmt::Debug + Send {
    /// Sets instance attributes and resolves the registers and events the core drives. Runs
    /// once, before the register bank is laid out.
    fn elaborate(&mut self, ctx: &mut CoreContext<'_>) -> FabricResult<()>;

    fn take_windows(&mut self) -> Vec<RawWindow> {
        Vec::new()
    }

    /// One tick of hardware-side logic. Register values are those of the last edge; updates are
    /// staged and land on the coming edge.
    fn tick(&mut self, ctx: &mut CoreContext<'_>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_rejects_duplicates() {
        let err = PeripheralSpec::builder("dup")
            .word("a", 0x0)
            .event("a", 0, TriggerMode::Rise)
            .build()
            .unwrap_err();
        assert!(matches!(err, FabricError::Configuration(_)));

        let err = PeripheralSpec::builder("dup")
            .bit("x", 0x8, 1)
            .bit("y", 0x8, 1)
            .build()
            .unwrap_err();
        assert!(matches!(err, FabricError::Configuration(_)));

        let spec = PeripheralSpec::builder("ok")
            .bit("x", 0x8, 0)
            .bit("y", 0x8, 1)
            .build()
            .unwrap();
        assert_eq!(spec.fields().len(), 2);
        let (file, events) = spec.instantiate();
        assert_eq!(file.word_width(), 32);
        assert!(events.is_empty());
    }
}
