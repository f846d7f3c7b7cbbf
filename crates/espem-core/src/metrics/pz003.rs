use core::fmt::Display;

use super::{Metrics, Quantity, join_words};

/// Number of input registers in a PZEM-003/017 measurement reply
pub const PZ003_REGISTERS: usize = 8;

/// One PZEM-003 (DC meter) reading
///
/// Raw values: voltage 0.01 V, current 0.01 A, power 0.1 W, energy 1 Wh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pz003Metrics {
    pub voltage: u16,
    pub current: u16,
    pub power: u32,
    pub energy: u32,
    pub alarm_h: u16,
    pub alarm_l: u16,
}

impl Pz003Metrics {
    pub const fn new(voltage: u16, current: u16, power: u32, energy: u32) -> Self {
        Self {
            voltage,
            current,
            power,
            energy,
            alarm_h: 0,
            alarm_l: 0,
        }
    }

    /// Decode the measurement register block (0x0000..0x0007).
    pub fn from_registers(regs: &[u16]) -> Option<Self> {
        if regs.len() < PZ003_REGISTERS {
            return None;
        }

        Some(Self {
            voltage: regs[0],
            current: regs[1],
            power: join_words(regs[2], regs[3]),
            energy: join_words(regs[4], regs[5]),
            alarm_h: regs[6],
            alarm_l: regs[7],
        })
    }
}

impl Metrics for Pz003Metrics {
    const QUANTITIES: &'static [Quantity] = &[
        Quantity::Voltage,
        Quantity::Current,
        Quantity::Power,
        Quantity::Energy,
    ];

    fn as_float(&self, q: Quantity) -> Option<f32> {
        match q {
            Quantity::Voltage => Some(self.voltage as f32 / 100.0),
            Quantity::Current => Some(self.current as f32 / 100.0),
            Quantity::Power => Some(self.power as f32 / 10.0),
            Quantity::Energy => Some(self.energy as f32),
            Quantity::Frequency | Quantity::PowerFactor => None,
        }
    }

    fn raw(&self, q: Quantity) -> Option<u32> {
        match q {
            Quantity::Voltage => Some(self.voltage.into()),
            Quantity::Current => Some(self.current.into()),
            Quantity::Power => Some(self.power),
            Quantity::Energy => Some(self.energy),
            Quantity::Frequency | Quantity::PowerFactor => None,
        }
    }
}

impl Display for Pz003Metrics {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "[PZ003] U:{:.2}V I:{:.2}A P:{:.1}W W:{}Wh",
            self.voltage as f32 / 100.0,
            self.current as f32 / 100.0,
            self.power as f32 / 10.0,
            self.energy
        )
    }
}
