//! Virtual gate arrangements for the QDAC-II
//!
//! `libqdac2` drives a QDAC-II voltage source over SCPI and groups its
//! channels into [`Arrangement`]s of named contacts. An arrangement keeps a
//! virtual voltage per contact and a [correction matrix][`CorrectionMatrix`]
//! that turns virtual voltages into the physical voltages actually output,
//! compensating for cross-capacitance between gates.
//!
//! On top of that an arrangement can build [`Sweep`]s: list programs for
//! every channel, armed on a shared internal trigger so that all channels
//! start in lock-step and then run on the instrument without further
//! involvement of the host. It can also characterise DC leakage between its
//! contacts.
//!
//! The instrument is reached through a [`Transport`]. [`TcpTransport`]
//! talks to real hardware; [`Simulator`] records commands in memory and is
//! what the tests use.
//!
//! ## Example
//!
//! ```
//! use libqdac2::{Qdac2, Simulator};
//!
//! let sim = Simulator::new();
//! let qdac = Qdac2::new(sim.clone());
//!
//! let mut arrangement = qdac.arrange(&[("plunger1", 1), ("plunger2", 2)], &[]).unwrap();
//! arrangement.set_virtual_voltage("plunger2", 1.0).unwrap();
//!
//! let voltages = libqdac2::linspace(-0.1, 0.1, 5);
//! let sweep = arrangement.virtual_sweep("plunger1", &voltages, 2e-5, None, 1).unwrap();
//! assert_eq!(sweep.actual_values_v("plunger2").unwrap(), vec![1.0; 5]);
//!
//! sweep.start().unwrap();
//! ```

#[macro_use] extern crate lazy_static;
#[macro_use] mod macros;

mod instrument;
pub mod instructions;
pub mod params;
mod triggers;
mod transport;
mod sim;
mod linalg;
mod correction;
mod arrangement;
mod sweep;
mod leakage;

pub use instrument::{Qdac2, Qdac2Config, Qdac2Error, Channel};
pub use triggers::TriggerError;
pub use transport::{Transport, TcpTransport, SCPI_PORT};
pub use sim::Simulator;
pub use linalg::{diff_matrix, linspace, forward_and_back, ForwardAndBack};
pub use correction::CorrectionMatrix;
pub use arrangement::Arrangement;
pub use sweep::Sweep;
pub use params::{InternalTrigger, OutputTrigger, CurrentRange};
