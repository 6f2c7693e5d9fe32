//! The `Lab` interface and its two implementations.
//!
//! A lab exposes two temperature sensors (T1, T2), two heaters (Q1, Q2) with
//! their power limits (P1, P2), and a diagnostic LED. `TCLab` drives a real
//! board through a [`Transport`](crate::adapters::Transport); `TCLabModel`
//! simulates one in-process. Code written against `Lab` runs unchanged on
//! either.

use serde::Serialize;
use std::fmt;

pub mod model;
pub mod protocol;
pub mod tclab;

pub use model::TCLabModel;
pub use protocol::Command;
pub use tclab::TCLab;

use crate::error::LabResult;

/// Lower bound of heater output and LED percentages.
pub const OUTPUT_MIN: f64 = 0.0;
/// Upper bound of heater output and LED percentages.
pub const OUTPUT_MAX: f64 = 100.0;

/// Firmware default power limit of heater 1.
pub const DEFAULT_P1: f64 = 200.0;
/// Firmware default power limit of heater 2.
pub const DEFAULT_P2: f64 = 100.0;

/// Project a value into `[0, 100]`. Bounds are inclusive; NaN maps to 0.
pub fn clamp(value: f64) -> f64 {
    if value.is_nan() {
        return OUTPUT_MIN;
    }
    value.clamp(OUTPUT_MIN, OUTPUT_MAX)
}

/// One of the two sensor/heater pairs on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Sensor T1, heater Q1.
    One,
    /// Sensor T2, heater Q2.
    Two,
}

impl Channel {
    /// Both channels, in board order.
    pub const ALL: [Channel; 2] = [Channel::One, Channel::Two];

    /// Zero-based index for array storage.
    pub fn index(self) -> usize {
        match self {
            Channel::One => 0,
            Channel::Two => 1,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::One => f.write_str("1"),
            Channel::Two => f.write_str("2"),
        }
    }
}

/// A coherent snapshot of both sensors and both heater outputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scan {
    /// Temperature of sensor 1 in °C
    pub t1: f64,
    /// Temperature of sensor 2 in °C
    pub t2: f64,
    /// Heater 1 output in percent
    pub q1: f64,
    /// Heater 2 output in percent
    pub q2: f64,
}

impl From<Scan> for (f64, f64, f64, f64) {
    fn from(scan: Scan) -> Self {
        (scan.t1, scan.t2, scan.q1, scan.q2)
    }
}

/// Operations shared by the hardware and simulated labs.
///
/// Every method is a blocking round trip against the session. Once
/// [`close`](Lab::close) has run, every other method fails with
/// [`LabError::SessionClosed`](crate::error::LabError::SessionClosed).
pub trait Lab {
    /// Read a temperature sensor in °C. The value is reported as-is.
    fn temperature(&mut self, channel: Channel) -> LabResult<f64>;

    /// Current heater output in percent.
    fn heater(&mut self, channel: Channel) -> LabResult<f64>;

    /// Clamp `percent` into `[0, 100]`, apply it and return the applied value.
    fn set_heater(&mut self, channel: Channel, percent: f64) -> LabResult<f64>;

    /// Current heater power limit.
    fn power_limit(&mut self, channel: Channel) -> LabResult<f64>;

    /// Apply a heater power limit. The value is not clamped.
    fn set_power_limit(&mut self, channel: Channel, limit: f64) -> LabResult<f64>;

    /// Drive the diagnostic LED and return the applied percentage.
    fn led(&mut self, percent: f64) -> LabResult<f64>;

    /// Read `(T1, T2, Q1, Q2)` in one exchange.
    fn scan(&mut self) -> LabResult<Scan>;

    /// Turn the heaters off and release the session. Safe to call repeatedly.
    fn close(&mut self) -> LabResult<()>;

    /// Whether the session is still usable.
    fn is_open(&self) -> bool;

    /// Read the heater output, or set it first when `value` is given.
    fn output(&mut self, channel: Channel, value: Option<f64>) -> LabResult<f64> {
        match value {
            Some(percent) => self.set_heater(channel, percent),
            None => self.heater(channel),
        }
    }

    /// Temperature of sensor 1.
    fn t1(&mut self) -> LabResult<f64> {
        self.temperature(Channel::One)
    }

    /// Temperature of sensor 2.
    fn t2(&mut self) -> LabResult<f64> {
        self.temperature(Channel::Two)
    }

    /// Heater 1 output.
    fn q1(&mut self) -> LabResult<f64> {
        self.heater(Channel::One)
    }

    /// Set heater 1 output.
    fn set_q1(&mut self, percent: f64) -> LabResult<f64> {
        self.set_heater(Channel::One, percent)
    }

    /// Heater 2 output.
    fn q2(&mut self) -> LabResult<f64> {
        self.heater(Channel::Two)
    }

    /// Set heater 2 output.
    fn set_q2(&mut self, percent: f64) -> LabResult<f64> {
        self.set_heater(Channel::Two, percent)
    }

    /// Manipulated variable 1; an alias for the heater 1 output.
    fn u1(&mut self) -> LabResult<f64> {
        self.heater(Channel::One)
    }

    /// Assign manipulated variable 1 (clamped like `set_q1`).
    fn set_u1(&mut self, percent: f64) -> LabResult<f64> {
        self.set_heater(Channel::One, percent)
    }

    /// Manipulated variable 2; an alias for the heater 2 output.
    fn u2(&mut self) -> LabResult<f64> {
        self.heater(Channel::Two)
    }

    /// Assign manipulated variable 2 (clamped like `set_q2`).
    fn set_u2(&mut self, percent: f64) -> LabResult<f64> {
        self.set_heater(Channel::Two, percent)
    }

    /// Heater 1 power limit.
    fn p1(&mut self) -> LabResult<f64> {
        self.power_limit(Channel::One)
    }

    /// Set heater 1 power limit.
    fn set_p1(&mut self, limit: f64) -> LabResult<f64> {
        self.set_power_limit(Channel::One, limit)
    }

    /// Heater 2 power limit.
    fn p2(&mut self) -> LabResult<f64> {
        self.power_limit(Channel::Two)
    }

    /// Set heater 2 power limit.
    fn set_p2(&mut self, limit: f64) -> LabResult<f64> {
        self.set_power_limit(Channel::Two, limit)
    }
}

impl<L: Lab + ?Sized> Lab for Box<L> {
    fn temperature(&mut self, channel: Channel) -> LabResult<f64> {
        (**self).temperature(channel)
    }

    fn heater(&mut self, channel: Channel) -> LabResult<f64> {
        (**self).heater(channel)
    }

    fn set_heater(&mut self, channel: Channel, percent: f64) -> LabResult<f64> {
        (**self).set_heater(channel, percent)
    }

    fn power_limit(&mut self, channel: Channel) -> LabResult<f64> {
        (**self).power_limit(channel)
    }

    fn set_power_limit(&mut self, channel: Channel, limit: f64) -> LabResult<f64> {
        (**self).set_power_limit(channel, limit)
    }

    fn led(&mut self, percent: f64) -> LabResult<f64> {
        (**self).led(percent)
    }

    fn scan(&mut self) -> LabResult<Scan> {
        (**self).scan()
    }

    fn close(&mut self) -> LabResult<()> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_bounds_are_inclusive() {
        assert_eq!(clamp(-10.0), 0.0);
        assert_eq!(clamp(0.0), 0.0);
        assert_eq!(clamp(50.0), 50.0);
        assert_eq!(clamp(100.0), 100.0);
        assert_eq!(clamp(120.0), 100.0);
        assert_eq!(clamp(f64::NEG_INFINITY), 0.0);
        assert_eq!(clamp(f64::NAN), 0.0);
    }

    #[test]
    fn test_clamp_is_a_projection() {
        for v in [-1e9, -0.5, 0.0, 33.3, 99.999, 100.0, 250.0] {
            assert_eq!(clamp(clamp(v)), clamp(v));
        }
    }

    #[test]
    fn test_scan_into_tuple() {
        let scan = Scan {
            t1: 21.0,
            t2: 22.0,
            q1: 10.0,
            q2: 20.0,
        };
        let (t1, t2, q1, q2) = scan.into();
        assert_eq!((t1, t2, q1, q2), (21.0, 22.0, 10.0, 20.0));
    }

    #[test]
    fn test_channel_display_and_index() {
        assert_eq!(Channel::One.to_string(), "1");
        assert_eq!(Channel::Two.index(), 1);
    }
}
