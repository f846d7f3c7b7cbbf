use core::fmt::Display;

use super::{Metrics, Quantity, join_words};

/// Number of input registers in a PZEM-004T v3 measurement reply
pub const PZ004_REGISTERS: usize = 10;

/// One PZEM-004T v3 (AC meter) reading
///
/// Raw fixed-point values exactly as the meter reports them:
/// - voltage: 0.1 V
/// - current: 0.001 A
/// - power: 0.1 W
/// - energy: 1 Wh
/// - freq: 0.1 Hz
/// - pf: 0.01
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pz004Metrics {
    pub voltage: u16,
    pub current: u32,
    pub power: u32,
    pub energy: u32,
    pub freq: u16,
    pub pf: u16,
    pub alarm: u16,
}

impl Pz004Metrics {
    pub const fn new(voltage: u16, current: u32, power: u32, energy: u32, freq: u16, pf: u16) -> Self {
        Self {
            voltage,
            current,
            power,
            energy,
            freq,
            pf,
            alarm: 0,
        }
    }

    /// Decode the measurement register block (0x0000..0x0009).
    ///
    /// Returns `None` if fewer than [`PZ004_REGISTERS`] registers are given.
    pub fn from_registers(regs: &[u16]) -> Option<Self> {
        if regs.len() < PZ004_REGISTERS {
            return None;
        }

        Some(Self {
            voltage: regs[0],
            current: join_words(regs[1], regs[2]),
            power: join_words(regs[3], regs[4]),
            energy: join_words(regs[5], regs[6]),
            freq: regs[7],
            pf: regs[8],
            alarm: regs[9],
        })
    }
}

impl Metrics for Pz004Metrics {
    const QUANTITIES: &'static [Quantity] = &[
        Quantity::Voltage,
        Quantity::Current,
        Quantity::Power,
        Quantity::Energy,
        Quantity::Frequency,
        Quantity::PowerFactor,
    ];

    fn as_float(&self, q: Quantity) -> Option<f32> {
        Some(match q {
            Quantity::Voltage => self.voltage as f32 / 10.0,
            Quantity::Current => self.current as f32 / 1000.0,
            Quantity::Power => self.power as f32 / 10.0,
            Quantity::Energy => self.energy as f32,
            Quantity::Frequency => self.freq as f32 / 10.0,
            Quantity::PowerFactor => self.pf as f32 / 100.0,
        })
    }

    fn raw(&self, q: Quantity) -> Option<u32> {
        Some(match q {
            Quantity::Voltage => self.voltage.into(),
            Quantity::Current => self.current,
            Quantity::Power => self.power,
            Quantity::Energy => self.energy,
            Quantity::Frequency => self.freq.into(),
            Quantity::PowerFactor => self.pf.into(),
        })
    }
}

impl Display for Pz004Metrics {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "[PZ004] U:{:.1}V I:{:.3}A P:{:.1}W W:{}Wh hz:{:.1} pF:{:.2}",
            self.voltage as f32 / 10.0,
            self.current as f32 / 1000.0,
            self.power as f32 / 10.0,
            self.energy,
            self.freq as f32 / 10.0,
            self.pf as f32 / 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_float_scaling() {
        let m = Pz004Metrics::new(2305, 1470, 12160, 5_811_338, 500, 64);

        assert_eq!(m.as_float(Quantity::Voltage), Some(230.5));
        assert_eq!(m.as_float(Quantity::Current), Some(1.47));
        assert_eq!(m.as_float(Quantity::Power), Some(1216.0));
        assert_eq!(m.as_float(Quantity::Energy), Some(5_811_338.0));
        assert_eq!(m.as_float(Quantity::Frequency), Some(50.0));
        assert_eq!(m.as_float(Quantity::PowerFactor), Some(0.64));
    }

    #[test]
    fn test_from_registers() {
        // 230.0V, 70000mA (0x0001_1170), 16100dW, 100000Wh (0x0001_86a0), 50.0Hz, 0.98
        let regs = [2300, 0x1170, 0x0001, 16100, 0, 0x86a0, 0x0001, 500, 98, 0];
        let m = Pz004Metrics::from_registers(&regs).unwrap();

        assert_eq!(m.voltage, 2300);
        assert_eq!(m.current, 70_000);
        assert_eq!(m.power, 16_100);
        assert_eq!(m.energy, 100_000);
        assert_eq!(m.freq, 500);
        assert_eq!(m.pf, 98);
    }

    #[test]
    fn test_from_registers_too_short() {
        assert!(Pz004Metrics::from_registers(&[0; 9]).is_none());
    }
}
