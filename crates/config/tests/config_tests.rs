// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use socfab_config::{
    parse_size, Access, BurstKind, BusFeature, FieldKind, PeripheralDescriptor, ScriptStep,
    SizeValue, SocDescriptor, TransactionScript, TriggerMode,
};

#[test]
fn test_soc_descriptor_parses() {
    let yaml = r#"
name: "mini-soc"
bus:
  addr_width: 30
  data_width: 32
  granularity: 8
  features: [cti, bte]
window_size: "256MiB"
interrupts: 8
peripherals:
  - id: "rom"
    type: "rom"
    slot: 0
    size: "4KiB"
    config:
      init: [1, 2, 3]
  - id: "timer0"
    type: "timer"
    slot: 4
    irq: 0
    config:
      width: 16
"#;
    let desc = SocDescriptor::from_yaml(yaml).unwrap();
    assert_eq!(desc.name, "mini-soc");
    assert_eq!(desc.bus.features, vec![BusFeature::Cti, BusFeature::Bte]);
    assert_eq!(desc.window_size.bytes().unwrap(), 0x1000_0000);
    assert_eq!(desc.interrupts, 8);
    assert_eq!(desc.peripherals.len(), 2);
    assert_eq!(desc.peripherals[0].r#type, "rom");
    assert_eq!(
        desc.peripherals[0].size,
        Some(SizeValue::Text("4KiB".to_string()))
    );
    assert_eq!(desc.peripherals[0].irq, None);
    assert_eq!(desc.peripherals[1].slot, 4);
    assert_eq!(desc.peripherals[1].irq, Some(0));
    assert_eq!(
        desc.peripherals[1].config.get("width").and_then(|v| v.as_u64()),
        Some(16)
    );
}

#[test]
fn test_duplicate_ids_are_rejected() {
    let yaml = r#"
name: "dup"
window_size: 65536
peripherals:
  - id: "ram"
    type: "ram"
    slot: 0
  - id: "ram"
    type: "ram"
    slot: 1
"#;
    let err = SocDescriptor::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("ram"));
}

#[test]
fn test_peripheral_descriptor_parsing() {
    let yaml = r#"
peripheral: "watchdog"
word_width: 16
attributes:
  counter_width: 12
registers:
  - name: "id"
    address: 0x00
    kind: constant
    value: 0xBEEF
    width: 16
  - name: "ctrl"
    address: 0x04
    kind: bit
    bit: 3
    access: "R/W"
  - name: "status"
    address: 0x08
    kind: word
    access: w0c
    reset: 0x5
  - name: "count"
    address: 0x0C
    kind: variable
    width_source: counter_width
events:
  - name: "tick"
    bit: 0
    period_cycles: 10
  - name: "alarm"
    bit: 1
    mode: level
windows:
  - name: "buffer"
    address: 0x100
    size: 256
"#;
    let desc = PeripheralDescriptor::from_yaml(yaml).unwrap();
    assert_eq!(desc.peripheral, "watchdog");
    assert_eq!(desc.word_width, Some(16));
    assert_eq!(desc.attributes.get("counter_width"), Some(&12));
    assert_eq!(desc.registers.len(), 4);
    assert_eq!(desc.registers[0].kind, FieldKind::Constant);
    assert_eq!(desc.registers[0].value, Some(0xBEEF));
    assert_eq!(desc.registers[1].access, Some(Access::ReadWrite));
    assert_eq!(desc.registers[2].access, Some(Access::WriteZeroToClear));
    assert_eq!(desc.registers[2].reset, Some(5));
    assert_eq!(
        desc.registers[3].width_source.as_deref(),
        Some("counter_width")
    );
    assert_eq!(desc.events[0].mode, TriggerMode::Rise);
    assert_eq!(desc.events[0].period_cycles, Some(10));
    assert_eq!(desc.events[1].mode, TriggerMode::Level);
    assert!(desc.windows[0].writable);
    assert_eq!(desc.windows[0].size.bytes().unwrap(), 256);
}

#[test]
fn test_unknown_register_keys_are_rejected() {
    let yaml = r#"
peripheral: "typo"
registers:
  - name: "ctrl"
    address: 0x0
    kind: bit
    bti: 3
"#;
    assert!(PeripheralDescriptor::from_yaml(yaml).is_err());
}

#[test]
fn test_zero_period_is_rejected() {
    let yaml = r#"
peripheral: "bad"
events:
  - name: "never"
    bit: 0
    period_cycles: 0
"#;
    let err = PeripheralDescriptor::from_yaml(yaml).unwrap_err();
    assert!(err.to_string().contains("period_cycles"));
}

#[test]
fn test_transaction_script_parsing() {
    let yaml = r#"
steps:
  - op: write
    address: 0x40000004
    value: 7
  - op: read
    address: 0x40000004
    expect: 7
  - op: burst_read
    address: 0x20000018
    beats: 4
    burst: wrap4
  - op: idle
    cycles: 5
"#;
    let script = TransactionScript::from_yaml(yaml).unwrap();
    assert_eq!(script.max_cycles, None);
    assert_eq!(script.steps.len(), 4);
    assert_eq!(
        script.steps[0],
        ScriptStep::Write {
            address: 0x4000_0004,
            value: 7,
            sel: None
        }
    );
    assert_eq!(
        script.steps[2],
        ScriptStep::BurstRead {
            address: 0x2000_0018,
            beats: 4,
            burst: BurstKind::Wrap4,
            expect: None
        }
    );
}

#[test]
fn test_unknown_op_is_rejected() {
    let yaml = r#"
steps:
  - op: reset
"#;
    assert!(TransactionScript::from_yaml(yaml).is_err());
}

#[test]
fn test_parse_size() {
    assert_eq!(parse_size("4KiB").unwrap(), 4096);
    assert_eq!(parse_size("1MiB").unwrap(), 0x10_0000);
    assert!(parse_size("lots").is_err());
}
