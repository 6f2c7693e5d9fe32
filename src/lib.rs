//! Client library for the Temperature Control Lab (TCLab).
//!
//! The TCLab is a small board with two heaters and two temperature sensors,
//! driven over USB serial. This crate provides a hardware driver
//! ([`TCLab`]) and an in-process simulation ([`TCLabModel`]) behind one
//! [`Lab`] trait, so control code and tests run unchanged against either.
//!
//! ```no_run
//! use tclab::{Lab, TCLab};
//!
//! let mut lab = TCLab::connect(None)?;
//! lab.set_q1(50.0)?;
//! let (t1, t2, q1, q2) = lab.scan()?.into();
//! println!("{t1} {t2} {q1} {q2}");
//! # Ok::<(), tclab::LabError>(())
//! ```

pub mod adapters;
pub mod clock;
pub mod config;
pub mod discovery;
pub mod error;
pub mod historian;
pub mod instrument;

pub use clock::{LabClock, ManualClock, SystemClock, Ticker};
pub use config::LabConfig;
pub use error::{LabError, LabResult};
pub use historian::Historian;
pub use instrument::{clamp, Channel, Lab, Scan, TCLab, TCLabModel};
