//! Simulated TCLab
//!
//! A two-node-per-channel thermal model: each heater (H1, H2) exchanges heat
//! with the ambient and with the other heater, and each sensor (T1, T2) lags
//! behind its heater. The model is integrated with explicit Euler steps up to
//! the current lab time whenever a temperature is read.
//!
//! ```text
//! dH1/dt = P1·Q1/5720 + (Ta − H1)/20 − (H1 − H2)/100
//! dH2/dt = P2·Q2/5720 + (Ta − H2)/20 + (H1 − H2)/100
//! dT1/dt = (H1 − T1)/140
//! dT2/dt = (H2 − T2)/140
//! ```

use super::{clamp, Channel, Lab, Scan, DEFAULT_P1, DEFAULT_P2};
use crate::clock::{LabClock, SystemClock};
use crate::config::LabConfig;
use crate::error::{LabError, LabResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::{debug, info};

/// Converts power limit × percent into a heating rate in °C/s.
const HEATER_GAIN: f64 = 5720.0;
/// Heater-to-ambient time constant in seconds.
const AMBIENT_TAU: f64 = 20.0;
/// Heater-to-heater coupling time constant in seconds.
const COUPLING_TAU: f64 = 100.0;
/// Sensor lag time constant in seconds.
const SENSOR_TAU: f64 = 140.0;

/// Physical parameters of the simulation
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    /// Ambient temperature in °C
    pub ambient: f64,
    /// Standard deviation of sensor noise in °C
    pub noise_std: f64,
    /// Largest Euler step in seconds
    pub max_step: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            ambient: 21.0,
            noise_std: 0.043,
            max_step: 0.2,
        }
    }
}

/// In-process simulation of a TCLab board
pub struct TCLabModel<C: LabClock = SystemClock> {
    clock: C,
    params: ModelParams,
    heaters: [f64; 2],
    power_limits: [f64; 2],
    heater_temps: [f64; 2],
    sensor_temps: [f64; 2],
    led: f64,
    t_last: f64,
    rng: StdRng,
    open: bool,
}

impl TCLabModel<SystemClock> {
    /// Real-time simulation with default parameters.
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }

    /// Simulation configured from the `[model]` section of `config`.
    pub fn from_config(config: &LabConfig) -> Self {
        let params = ModelParams {
            ambient: config.model.ambient_c,
            noise_std: config.model.noise_std,
            ..ModelParams::default()
        };
        let model = Self::with_params(SystemClock::with_rate(config.model.speedup), params);
        match config.model.seed {
            Some(seed) => model.with_seed(seed),
            None => model,
        }
    }
}

impl Default for TCLabModel<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: LabClock> TCLabModel<C> {
    /// Simulation driven by `clock` with default parameters.
    pub fn with_clock(clock: C) -> Self {
        Self::with_params(clock, ModelParams::default())
    }

    /// Simulation driven by `clock` with explicit parameters.
    pub fn with_params(clock: C, params: ModelParams) -> Self {
        let ambient = params.ambient;
        let t_last = clock.now();
        info!("Simulated TCLab started (ambient {} °C)", ambient);
        Self {
            clock,
            params,
            heaters: [0.0, 0.0],
            power_limits: [DEFAULT_P1, DEFAULT_P2],
            heater_temps: [ambient, ambient],
            sensor_temps: [ambient, ambient],
            led: 0.0,
            t_last,
            rng: StdRng::from_entropy(),
            open: true,
        }
    }

    /// Use a fixed seed for the sensor noise.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// The clock driving this model.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Model parameters.
    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// Noise-free sensor temperatures at the last update.
    pub fn true_temperatures(&self) -> [f64; 2] {
        self.sensor_temps
    }

    /// Noise-free heater temperatures at the last update.
    pub fn heater_temperatures(&self) -> [f64; 2] {
        self.heater_temps
    }

    /// Integrate the model up to the clock's current lab time.
    pub fn update(&mut self) {
        let now = self.clock.now();
        self.update_to(now);
    }

    /// Integrate the model up to lab time `t`. Earlier times are ignored.
    pub fn update_to(&mut self, t: f64) {
        let mut t_euler = self.t_last;
        while t_euler < t {
            let dt = self.params.max_step.min(t - t_euler);
            self.step(dt);
            t_euler += dt;
        }
        if t > self.t_last {
            self.t_last = t;
        }
    }

    fn step(&mut self, dt: f64) {
        let [h1, h2] = self.heater_temps;
        let [t1, t2] = self.sensor_temps;
        let ambient = self.params.ambient;
        let delta_12 = h1 - h2;

        let d_h1 = self.power_limits[0] * self.heaters[0] / HEATER_GAIN
            + (ambient - h1) / AMBIENT_TAU
            - delta_12 / COUPLING_TAU;
        let d_h2 = self.power_limits[1] * self.heaters[1] / HEATER_GAIN
            + (ambient - h2) / AMBIENT_TAU
            + delta_12 / COUPLING_TAU;
        let d_t1 = (h1 - t1) / SENSOR_TAU;
        let d_t2 = (h2 - t2) / SENSOR_TAU;

        self.heater_temps = [h1 + dt * d_h1, h2 + dt * d_h2];
        self.sensor_temps = [t1 + dt * d_t1, t2 + dt * d_t2];
    }

    /// Sensor reading: true temperature plus Gaussian noise, to 0.01 °C.
    fn measure(&mut self, channel: Channel) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        let noise = self.params.noise_std * z;
        let value = self.sensor_temps[channel.index()] + noise;
        (value * 100.0).round() / 100.0
    }

    fn ensure_open(&self) -> LabResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(LabError::SessionClosed)
        }
    }
}

impl<C: LabClock> Lab for TCLabModel<C> {
    fn temperature(&mut self, channel: Channel) -> LabResult<f64> {
        self.ensure_open()?;
        self.update();
        Ok(self.measure(channel))
    }

    fn heater(&mut self, channel: Channel) -> LabResult<f64> {
        self.ensure_open()?;
        Ok(self.heaters[channel.index()])
    }

    fn set_heater(&mut self, channel: Channel, percent: f64) -> LabResult<f64> {
        self.ensure_open()?;
        // Integrate at the old output before the step change takes effect
        self.update();
        let applied = clamp(percent);
        self.heaters[channel.index()] = applied;
        debug!("Q{} = {}", channel, applied);
        Ok(applied)
    }

    fn power_limit(&mut self, channel: Channel) -> LabResult<f64> {
        self.ensure_open()?;
        Ok(self.power_limits[channel.index()])
    }

    fn set_power_limit(&mut self, channel: Channel, limit: f64) -> LabResult<f64> {
        self.ensure_open()?;
        self.update();
        self.power_limits[channel.index()] = limit;
        debug!("P{} = {}", channel, limit);
        Ok(limit)
    }

    fn led(&mut self, percent: f64) -> LabResult<f64> {
        self.ensure_open()?;
        self.led = clamp(percent);
        Ok(self.led)
    }

    fn scan(&mut self) -> LabResult<Scan> {
        self.ensure_open()?;
        self.update();
        Ok(Scan {
            t1: self.measure(Channel::One),
            t2: self.measure(Channel::Two),
            q1: self.heaters[0],
            q2: self.heaters[1],
        })
    }

    fn close(&mut self) -> LabResult<()> {
        if self.open {
            self.heaters = [0.0, 0.0];
            self.open = false;
            info!("Simulated TCLab closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn model() -> (TCLabModel<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let model = TCLabModel::with_clock(clock.clone()).with_seed(7);
        (model, clock)
    }

    #[test]
    fn test_starts_at_ambient() {
        let (mut lab, _clock) = model();
        let t1 = lab.t1().unwrap();
        assert!((t1 - 21.0).abs() < 0.5, "T1 = {t1}");
        assert_eq!(lab.true_temperatures(), [21.0, 21.0]);
    }

    #[test]
    fn test_heating_raises_temperature() {
        let (mut lab, clock) = model();
        lab.set_q1(100.0).unwrap();
        clock.advance(600.0);
        let scan = lab.scan().unwrap();

        let [h1, h2] = lab.heater_temperatures();
        assert!(h1 > h2, "heater 1 should be hotter: {h1} vs {h2}");
        assert!(scan.t1 > 40.0, "T1 = {}", scan.t1);
        assert!(scan.t1 > scan.t2);
        assert_eq!(scan.q1, 100.0);
    }

    #[test]
    fn test_without_heating_stays_at_ambient() {
        let (mut lab, clock) = model();
        clock.advance(3600.0);
        lab.update();
        for t in lab.true_temperatures() {
            assert!((t - 21.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_steady_state_is_bounded() {
        let (mut lab, clock) = model();
        lab.set_q1(100.0).unwrap();
        lab.set_q2(100.0).unwrap();
        clock.advance(20_000.0);
        lab.update();
        let [t1, t2] = lab.true_temperatures();
        assert!(t1 < 110.0 && t2 < 110.0, "T1 = {t1}, T2 = {t2}");
    }

    #[test]
    fn test_update_to_ignores_the_past() {
        let (mut lab, _clock) = model();
        lab.set_q1(100.0).unwrap();
        lab.update_to(100.0);
        let after = lab.true_temperatures();
        lab.update_to(50.0);
        assert_eq!(lab.true_temperatures(), after);
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let (mut a, _) = model();
        let (mut b, _) = model();
        assert_eq!(a.t1().unwrap(), b.t1().unwrap());
        assert_eq!(a.t2().unwrap(), b.t2().unwrap());
    }

    #[test]
    fn test_noise_matches_configured_spread() {
        let (mut lab, _clock) = model();
        let readings: Vec<f64> = (0..2000).map(|_| lab.t1().unwrap()).collect();
        let n = readings.len() as f64;
        let mean = readings.iter().sum::<f64>() / n;
        let std = (readings.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n).sqrt();
        assert!((mean - 21.0).abs() < 0.01, "mean = {mean}");
        assert!((0.03..0.06).contains(&std), "std = {std}");
    }

    #[test]
    fn test_noise_free_reading_is_exact() {
        let clock = ManualClock::new();
        let params = ModelParams {
            noise_std: 0.0,
            ..ModelParams::default()
        };
        let mut lab = TCLabModel::with_params(clock, params);
        assert_eq!(lab.t2().unwrap(), 21.0);
    }

    #[test]
    fn test_power_limit_unclamped_and_led_clamped() {
        let (mut lab, _clock) = model();
        assert_eq!(lab.set_p2(300.0).unwrap(), 300.0);
        assert_eq!(lab.p2().unwrap(), 300.0);
        assert_eq!(lab.led(150.0).unwrap(), 100.0);
    }

    #[test]
    fn test_close_turns_heaters_off_and_blocks_access() {
        let (mut lab, _clock) = model();
        lab.set_q1(40.0).unwrap();
        lab.close().unwrap();
        lab.close().unwrap();
        assert!(!lab.is_open());
        assert!(lab.q1().unwrap_err().is_state());
        assert!(lab.scan().unwrap_err().is_state());
    }

    #[test]
    fn test_from_config_applies_model_section() {
        let mut config = LabConfig::default();
        config.model.ambient_c = 25.0;
        config.model.noise_std = 0.0;
        config.model.seed = Some(1);
        let mut lab = TCLabModel::from_config(&config);
        assert_eq!(lab.params().ambient, 25.0);
        assert!((lab.t1().unwrap() - 25.0).abs() < 0.1);
    }
}
