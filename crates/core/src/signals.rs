// SocFab - System-on-Chip Bus Fabric
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

/// Represents a digital signal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigitalLevel {
    #[default]
    Low,
    High,
}

impl From<bool> for DigitalLevel {
    fn from(b: bool) -> Self {
        if b {
            DigitalLevel::High
        } else {
            DigitalLevel::Low
        }
    }
}

impl From<DigitalLevel> for bool {
    fn from(level: DigitalLevel) -> Self {
        match level {
            DigitalLevel::High => true,
            DigitalLevel::Low => false,
        }
    }
}

/// Condition on an input that produces an event strobe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    #[default]
    Rise,
    Fall,
    Level,
}

/// Turns an input level into a strobe according to a [`TriggerMode`].
///
/// The previous level is registered, so `rise` and `fall` strobe for exactly the one tick in
/// which the input differs from the level it had at the last edge.
#[derive(Debug, Clone, Default)]
pub struct EdgeDetector {
    mode: TriggerMode,
    prev: DigitalLevel,
}

impl EdgeDetector {
    pub fn new(mode: TriggerMode) -> Self {
        Self {
            mode,
            prev: DigitalLevel::Low,
        }
    }

    pub fn mode(&self) -> TriggerMode {
        self.mode
    }

    pub fn strobe(&self, input: DigitalLevel) -> bool {
        match self.mode {
            TriggerMode::Rise => input == DigitalLevel::High && self.prev == DigitalLevel::Low,
            TriggerMode::Fall => input == DigitalLevel::Low && self.prev == DigitalLevel::High,
            TriggerMode::Level => input.into(),
        }
    }

    pub fn clock(&mut self, input: DigitalLevel) {
        self.prev = input;
    }
}

/// Level-sensitive interrupt request line.
#[derive(Debug, Clone, Default)]
pub struct InterruptLine {
    asserted: bool,
}

impl InterruptLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, asserted: bool) {
        self.asserted = asserted;
    }

    pub fn is_asserted(&self) -> bool {
        self.asserted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(mode: TriggerMode, inputs: &[bool]) -> Vec<bool> {
        let mut det = EdgeDetector::new(mode);
        inputs
            .iter()
            .map(|&i| {
                let level = DigitalLevel::from(i);
                let stb = det.strobe(level);
                det.clock(level);
                stb
            })
            .collect()
    }

    #[test]
    fn test_rise_strobes_once() {
        let out = run(TriggerMode::Rise, &[false, true, true, true, false, true]);
        assert_eq!(out, vec![false, true, false, false, false, true]);
    }

    #[test]
    fn test_fall_strobes_once() {
        let out = run(TriggerMode::Fall, &[true, true, false, false, true, false]);
        assert_eq!(out, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn test_level_mirrors_input() {
        let inputs = [false, true, true, false, true];
        assert_eq!(run(TriggerMode::Level, &inputs), inputs.to_vec());
    }

    #[test]
    fn test_interrupt_line() {
        let mut irq = InterruptLine::new();
        assert!(!irq.is_asserted());
        irq.set(true);
        assert!(irq.is_asserted());
        irq.set(false);
        assert!(!irq.is_asserted());
        let b: bool = DigitalLevel::High.into();
        assert!(b);
    }
}
