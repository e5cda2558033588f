// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Declared register fields and their per-instance materialization.

mod bank;

pub use crate::bus::csr::{Access, CsrElement, ElementHandle};
pub use bank::RegisterBank;

use crate::bus::csr::CsrMultiplexer;
use crate::bus::decoder::RecordWindow;
use crate::{FabricError, FabricResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Fixed value; reads return it, writes are rejected.
    StaticConstant { value: u64, width: u32 },
    /// Single bit at position `bit` counted from `addr`.
    FixedBit { bit: u32 },
    /// Register as wide as the bank's word.
    FixedWord,
    /// Register whose width is taken from the named instance attribute when it is resolved.
    VariableWidth { width_source: String },
}

/// Cache key of a materialized field: its address and, for bits, the bit position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub addr: u64,
    pub sub: Option<u32>,
}

/// Immutable description of one register field. Addresses count register-bus chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub addr: u64,
    pub kind: FieldKind,
    pub access: Access,
    pub reset: u64,
}

impl FieldSpec {
    pub fn constant(name: &str, addr: u64, value: u64, width: u32) -> Self {
        Self {
            name: name.to_string(),
            addr,
            kind: FieldKind::StaticConstant { value, width },
            access: Access::ReadOnly,
            reset: value,
        }
    }

    pub fn bit(name: &str, addr: u64, bit: u32) -> Self {
        Self {
            name: name.to_string(),
            addr,
            kind: FieldKind::FixedBit { bit },
            access: Access::ReadWrite,
            reset: 0,
        }
    }

    pub fn word(name: &str, addr: u64) -> Self {
        Self {
            name: name.to_string(),
            addr,
            kind: FieldKind::FixedWord,
            access: Access::ReadWrite,
            reset: 0,
        }
    }

    pub fn variable(name: &str, addr: u64, width_source: &str) -> Self {
        Self {
            name: name.to_string(),
            addr,
            kind: FieldKind::VariableWidth {
                width_source: width_source.to_string(),
            },
            access: Access::ReadWrite,
            reset: 0,
        }
    }

    pub fn with_reset(mut self, reset: u64) -> Self {
        if !matches!(self.kind, FieldKind::StaticConstant { .. }) {
            self.reset = reset;
        }
        self
    }

    pub fn with_access(mut self, access: Access) -> Self {
        if !matches!(self.kind, FieldKind::StaticConstant { .. }) {
            self.access = access;
        }
        self
    }

    pub fn key(&self) -> FieldKey {
        FieldKey {
            addr: self.addr,
            sub: match self.kind {
                FieldKind::FixedBit { bit } => Some(bit),
                _ => None,
            },
        }
    }
}

/// Per-instance register state: instance attributes plus the elements materialized from a shared
/// list of field specs.
///
/// Elements are created on first access and cached by [`FieldKey`], so resolving the same field
/// again returns the same handle.
#[derive(Debug)]
pub struct RegisterFile {
    fields: Arc<[FieldSpec]>,
    word_width: u32,
    attributes: BTreeMap<String, u64>,
    index: HashMap<FieldKey, ElementHandle>,
    elements: Vec<CsrElement>,
}

impl RegisterFile {
    pub fn new(fields: Arc<[FieldSpec]>, word_width: u32) -> Self {
        Self {
            fields,
            word_width,
            attributes: BTreeMap::new(),
            index: HashMap::new(),
            elements: Vec::new(),
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn word_width(&self) -> u32 {
        self.word_width
    }

    pub fn set_attribute(&mut self, name: &str, value: u64) {
        self.attributes.insert(name.to_string(), value);
    }

    pub fn attribute(&self, name: &str) -> Option<u64> {
        self.attributes.get(name).copied()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Width `spec` materializes with on this instance. Widths above 64 bits are rejected.
    pub fn width_of(&self, spec: &FieldSpec) -> FabricResult<u32> {
        let width = match &spec.kind {
            FieldKind::StaticConstant { width, .. } => u64::from(*width),
            FieldKind::FixedBit { .. } => 1,
            FieldKind::FixedWord => u64::from(self.word_width),
            FieldKind::VariableWidth { width_source } => {
                self.attribute(width_source).ok_or_else(|| {
                    FabricError::ProtocolViolation(format!(
                        "Register '{}' resolved before its width source '{}' was set",
                        spec.name, width_source
                    ))
                })?
            }
        };
        if width > 64 {
            return Err(FabricError::Configuration(format!(
                "Register '{}' width {} exceeds 64 bits",
                spec.name, width
            )));
        }
        Ok(width as u32)
    }

    /// Handle of the element backing field `name`, materializing it on first access.
    pub fn resolve(&mut self, name: &str) -> FabricResult<ElementHandle> {
        let pos = self
            .fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| FabricError::Configuration(format!("No register named '{}'", name)))?;
        self.materialize(pos)
    }

    pub fn resolve_key(&mut self, key: FieldKey) -> FabricResult<ElementHandle> {
        if let Some(&handle) = self.index.get(&key) {
            return Ok(handle);
        }
        let pos = self
            .fields
            .iter()
            .position(|f| f.key() == key)
            .ok_or_else(|| {
                FabricError::Configuration(format!(
                    "No register at {:#x}{}",
                    key.addr,
                    key.sub.map(|b| format!(" bit {}", b)).unwrap_or_default()
                ))
            })?;
        self.materialize(pos)
    }

    fn materialize(&mut self, pos: usize) -> FabricResult<ElementHandle> {
        let fields = Arc::clone(&self.fields);
        let spec = &fields[pos];
        if let Some(&handle) = self.index.get(&spec.key()) {
            return Ok(handle);
        }
        let width = self.width_of(spec)?;
        let handle = self.push_element(CsrElement::new(&spec.name, width, spec.access, spec.reset));
        self.index.insert(spec.key(), handle);
        tracing::debug!(
            "Materialized register '{}' ({} bits) at {:#x}",
            spec.name,
            width,
            spec.addr
        );
        Ok(handle)
    }

    /// Adds an element that is not backed by a declared field.
    pub fn push_element(&mut self, element: CsrElement) -> ElementHandle {
        self.elements.push(element);
        ElementHandle(self.elements.len() - 1)
    }

    /// Materialized element for field `name`, if it has been resolved.
    pub fn get(&self, name: &str) -> Option<&CsrElement> {
        let handle = self.index.get(&self.field(name)?.key())?;
        self.elements.get(handle.0)
    }

    pub fn is_materialized(&self, key: FieldKey) -> bool {
        self.index.contains_key(&key)
    }

    pub fn element(&self, handle: ElementHandle) -> &CsrElement {
        &self.elements[handle.0]
    }

    pub fn element_mut(&mut self, handle: ElementHandle) -> &mut CsrElement {
        &mut self.elements[handle.0]
    }

    pub fn elements_mut(&mut self) -> &mut [CsrElement] {
        &mut self.elements
    }

    /// Resolves every declared field and places it into `mux` at its declared address.
    pub fn finalize(&mut self, mux: &mut CsrMultiplexer) -> FabricResult<()> {
        let dw = mux.data_width();
        let fields = Arc::clone(&self.fields);
        for (pos, spec) in fields.iter().enumerate() {
            let handle = self.materialize(pos)?;
            let width = self.elements[handle.0].width();
            if width == 0 {
                tracing::warn!("Register '{}' has zero width and is not mapped", spec.name);
                continue;
            }
            let (addr, lsb) = match spec.kind {
                FieldKind::FixedBit { bit } => {
                    (spec.addr + u64::from(bit / dw), bit % dw)
                }
                _ => (spec.addr, 0),
            };
            mux.add(&spec.name, handle, width, addr, lsb)?;
        }
        Ok(())
    }

    /// Applies every staged update. Called once per clock edge.
    pub fn commit(&mut self) {
        self.elements.iter_mut().for_each(CsrElement::commit);
    }

    pub fn snapshot(&self) -> serde_json::Value {
        let map = self
            .elements
            .iter()
            .map(|e| (e.name().to_string(), serde_json::Value::from(e.value())))
            .collect();
        serde_json::Value::Object(map)
    }

    /// Reads field `name` from a record window instead of a materialized element.
    pub fn read_record(&self, name: &str, window: &RecordWindow) -> FabricResult<u64> {
        let spec = self.record_field(name)?;
        match spec.kind {
            FieldKind::StaticConstant { value, .. } => Ok(value),
            FieldKind::FixedBit { bit } => {
                let byte = window.read_u8(spec.addr + u64::from(bit / 8))?;
                Ok(u64::from((byte >> (bit % 8)) & 1))
            }
            _ => {
                let width = self.width_of(spec)?;
                window.read_le(spec.addr, width.div_ceil(8) as usize)
            }
        }
    }

    pub fn write_record(&self, name: &str, window: &RecordWindow, value: u64) -> FabricResult<()> {
        let spec = self.record_field(name)?;
        match spec.kind {
            FieldKind::StaticConstant { .. } => Err(FabricError::ProtocolViolation(format!(
                "Register '{}' is constant",
                spec.name
            ))),
            FieldKind::FixedBit { bit } => {
                let at = spec.addr + u64::from(bit / 8);
                let byte = window.read_u8(at)?;
                let flag = 1u8 << (bit % 8);
                let byte = if value & 1 != 0 { byte | flag } else { byte & !flag };
                window.write_u8(at, byte)
            }
            _ => {
                let width = self.width_of(spec)?;
                window.write_le(
                    spec.addr,
                    width.div_ceil(8) as usize,
                    value & crate::bus::mask(width),
                )
            }
        }
    }

    fn record_field(&self, name: &str) -> FabricResult<&FieldSpec> {
        self.field(name)
            .ok_or_else(|| FabricError::Configuration(format!("No register named '{}'", name)))
    }
}
