// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// A size given either as a plain number of bytes or a human-readable string such as "4KiB".
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum SizeValue {
    Bytes(u64),
    Text(String),
}

impl SizeValue {
    pub fn bytes(&self) -> Result<u64> {
        match self {
            SizeValue::Bytes(n) => Ok(*n),
            SizeValue::Text(s) => parse_size(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusFeature {
    Cti,
    Bte,
    Err,
}

fn default_features() -> Vec<BusFeature> {
    vec![BusFeature::Cti, BusFeature::Bte, BusFeature::Err]
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BusDescriptor {
    pub addr_width: u32,
    pub data_width: u32,
    pub granularity: u32,
    pub features: Vec<BusFeature>,
}

impl Default for BusDescriptor {
    fn default() -> Self {
        Self {
            addr_width: 30,
            data_width: 32,
            granularity: 8,
            features: default_features(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PeripheralConfig {
    pub id: String,
    pub r#type: String, // "ram", "rom", "timer", "declarative"
    pub slot: usize,
    #[serde(default)]
    pub irq: Option<u32>,
    #[serde(default)]
    pub size: Option<SizeValue>,
    #[serde(default)]
    pub config: HashMap<String, serde_yaml::Value>,
}

fn default_interrupts() -> u32 {
    32
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SocDescriptor {
    pub name: String,
    #[serde(default)]
    pub bus: BusDescriptor,
    pub window_size: SizeValue,
    #[serde(default = "default_interrupts")]
    pub interrupts: u32,
    #[serde(default)]
    pub peripherals: Vec<PeripheralConfig>,
}

impl SocDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).with_context(|| {
            format!("Failed to read SoC descriptor {}", path.as_ref().display())
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let desc: Self = serde_yaml::from_str(yaml).context("Failed to parse SoC Descriptor")?;
        desc.validate()?;
        Ok(desc)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_size.bytes()? == 0 {
            anyhow::bail!("'window_size' must be greater than zero");
        }
        let mut ids = HashSet::new();
        let mut slots = HashMap::new();
        for p in &self.peripherals {
            if !ids.insert(p.id.as_str()) {
                anyhow::bail!("Peripheral id '{}' is used twice", p.id);
            }
            if let Some(other) = slots.insert(p.slot, p.id.as_str()) {
                anyhow::bail!(
                    "Peripherals '{}' and '{}' both claim slot {}",
                    other,
                    p.id,
                    p.slot
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    #[serde(alias = "R/W", alias = "rw")]
    ReadWrite,
    #[serde(alias = "RO", alias = "r")]
    ReadOnly,
    #[serde(alias = "WO", alias = "w")]
    WriteOnly,
    #[serde(alias = "W0C", alias = "w0c")]
    WriteZeroToClear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Constant,
    Bit,
    Word,
    Variable,
}

/// One register of a declarative peripheral. Which of the optional keys apply depends on
/// `kind`: `value` and `width` for constants, `bit` for single bits, `width_source` for
/// variable-width registers.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RegisterFieldDescriptor {
    pub name: String,
    pub address: u64,
    pub kind: FieldKind,
    #[serde(default)]
    pub value: Option<u64>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub bit: Option<u32>,
    #[serde(default)]
    pub width_source: Option<String>,
    #[serde(default)]
    pub reset: Option<u64>,
    #[serde(default)]
    pub access: Option<Access>,
}

impl RegisterFieldDescriptor {
    fn validate(&self) -> Result<()> {
        let missing = match self.kind {
            FieldKind::Constant if self.value.is_none() => Some("value"),
            FieldKind::Constant if self.width.is_none() => Some("width"),
            FieldKind::Bit if self.bit.is_none() => Some("bit"),
            FieldKind::Variable if self.width_source.is_none() => Some("width_source"),
            _ => None,
        };
        if let Some(key) = missing {
            anyhow::bail!("Register '{}' is missing '{}'", self.name, key);
        }
        if let Some(width) = self.width.filter(|w| *w > 64) {
            anyhow::bail!("Register '{}' width {} exceeds 64 bits", self.name, width);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    #[default]
    Rise,
    Fall,
    Level,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct EventDescriptor {
    pub name: String,
    pub bit: u32,
    #[serde(default)]
    pub mode: TriggerMode,
    /// Pulses the event input once every this many cycles.
    #[serde(default)]
    pub period_cycles: Option<u64>,
}

/// A raw memory window exposed by a declarative peripheral, at a peripheral-relative byte
/// address.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct WindowDescriptor {
    pub name: String,
    pub address: u64,
    pub size: SizeValue,
    #[serde(default = "default_true")]
    pub writable: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PeripheralDescriptor {
    pub peripheral: String,
    #[serde(default)]
    pub word_width: Option<u32>,
    #[serde(default)]
    pub alignment: Option<u32>,
    #[serde(default)]
    pub attributes: HashMap<String, u64>,
    #[serde(default)]
    pub registers: Vec<RegisterFieldDescriptor>,
    #[serde(default)]
    pub events: Vec<EventDescriptor>,
    #[serde(default)]
    pub windows: Vec<WindowDescriptor>,
}

impl PeripheralDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read Peripheral Descriptor {}",
                path.as_ref().display()
            )
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let desc: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Peripheral Descriptor")?;
        desc.validate()?;
        Ok(desc)
    }

    pub fn validate(&self) -> Result<()> {
        for reg in &self.registers {
            reg.validate()?;
        }
        for ev in &self.events {
            if ev.period_cycles == Some(0) {
                anyhow::bail!("Event '{}': 'period_cycles' must be greater than zero", ev.name);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BurstKind {
    #[default]
    Linear,
    Wrap4,
    Wrap8,
    Wrap16,
}

/// One bus operation. Addresses are byte addresses on the SoC bus.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptStep {
    Read {
        address: u64,
        #[serde(default)]
        expect: Option<u64>,
    },
    Write {
        address: u64,
        value: u64,
        #[serde(default)]
        sel: Option<u8>,
    },
    BurstRead {
        address: u64,
        beats: u32,
        #[serde(default)]
        burst: BurstKind,
        #[serde(default)]
        expect: Option<Vec<u64>>,
    },
    Idle {
        cycles: u64,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TransactionScript {
    /// Cycles a single transfer may wait for its acknowledge.
    #[serde(default)]
    pub max_cycles: Option<u64>,
    pub steps: Vec<ScriptStep>,
}

impl TransactionScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read transaction script {}",
                path.as_ref().display()
            )
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let script: Self =
            serde_yaml::from_str(yaml).context("Failed to parse transaction script")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_cycles == Some(0) {
            anyhow::bail!("'max_cycles' must be greater than zero");
        }
        for (i, step) in self.steps.iter().enumerate() {
            if let ScriptStep::BurstRead { beats, expect, .. } = step {
                if *beats == 0 {
                    anyhow::bail!("Step {}: a burst needs at least one beat", i);
                }
                if let Some(expect) = expect {
                    if expect.len() != *beats as usize {
                        anyhow::bail!(
                            "Step {}: {} expected values for a burst of {} beats",
                            i,
                            expect.len(),
                            beats
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}
