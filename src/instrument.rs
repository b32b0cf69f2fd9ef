use std::sync::{Arc, Mutex, MutexGuard, RwLock, PoisonError};
use thiserror::Error;

use crate::instructions::*;
use crate::params::{InternalTrigger, check_channel, check_voltage};
use crate::transport::Transport;
use crate::triggers::{TriggerPool, TriggerError, INTERNAL_TRIGGERS};

// Parameterless instructions are built once
lazy_static! {
    static ref RESET: Reset = Reset::new();
}

const QUERY_ERRORS: &str = "syst:err:all?";

#[derive(Error, Debug)]
pub enum Qdac2Error {
    /// Transport failure
    #[error("I/O error: {0}")]
    IOError(#[from] std::io::Error),
    /// Trigger allocation error
    #[error("Trigger error: {0}")]
    TriggerError(#[from] TriggerError),
    /// A contact name not in the arrangement
    #[error("No contact named \"{0}\"")]
    UnknownContact(String),
    /// The same contact name given twice
    #[error("Contact \"{0}\" given more than once")]
    DuplicateContact(String),
    /// The same channel assigned to two contacts
    #[error("Channel {0} assigned to more than one contact")]
    DuplicateChannel(u8),
    /// Channel number outside the instrument's range
    #[error("Invalid channel number: {0}")]
    InvalidChannel(u8),
    /// Output trigger number outside the instrument's range
    #[error("Invalid output trigger: {0}")]
    InvalidOutputTrigger(u8),
    /// The same output trigger name given twice
    #[error("Output trigger \"{0}\" given more than once")]
    DuplicateTrigger(String),
    /// Trigger name not bound by the arrangement
    #[error("No output trigger named \"{0}\"")]
    UnknownTrigger(String),
    /// Correction row of the wrong length
    #[error("Expected {expected} correction factors, got {got}")]
    CorrectionLength { expected: usize, got: usize },
    /// Detune voltages do not match the contacts
    #[error("There must be exactly one voltage per contact")]
    VoltageCount,
    /// Voltage that is NaN or infinite
    #[error("Invalid voltage: {0}")]
    InvalidVoltage(f64),
    /// A sweep without any points
    #[error("Sweep has no points")]
    EmptySweep,
    /// Instrument answered with something unparseable
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}


/// Instrument-wide settings
#[derive(Clone, Debug)]
pub struct Qdac2Config {
    /// Mains frequency used to time current measurements. 50 Hz is the
    /// slower of the two common frequencies and thus safe on either.
    pub line_frequency_hz: f64,
    /// Size of the internal trigger pool
    pub internal_triggers: usize,
    /// Pulse width of external trigger outputs
    pub output_trigger_width_s: f64,
}

impl Default for Qdac2Config {
    fn default() -> Self {
        Qdac2Config {
            line_frequency_hz: 50.0,
            internal_triggers: INTERNAL_TRIGGERS,
            output_trigger_width_s: 1e-6,
        }
    }
}


/// Parse a comma separated list of numbers as returned by `read?`
pub(crate) fn parse_floats(response: &str) -> Result<Vec<f64>, Qdac2Error> {
    response.trim()
        .split(',')
        .map(|v| v.trim().parse::<f64>()
            .map_err(|_| Qdac2Error::InvalidResponse(response.to_string())))
        .collect()
}


/// QDAC-II entry level object
///
/// `Qdac2` is a handle to a single instrument. It owns the transport and
/// the pool of internal triggers of that instrument. Cloning the handle is
/// cheap and every clone refers to the same instrument, which is how
/// [`Arrangement`][`crate::Arrangement`]s share it. Commands are written in
/// strict issue order; the transport is locked for the duration of each
/// instruction.
pub struct Qdac2<T: Transport> {

    // Handle to underlying transport
    transport: Arc<Mutex<T>>,

    // Internal trigger allocation, shared by all arrangements
    triggers: Arc<RwLock<TriggerPool>>,

    config: Qdac2Config,
}

impl<T: Transport> Clone for Qdac2<T> {
    fn clone(&self) -> Self {
        Qdac2 {
            transport: self.transport.clone(),
            triggers: self.triggers.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T: Transport> Qdac2<T> {

    /// Wrap a transport with the default configuration
    pub fn new(transport: T) -> Self {
        Qdac2::with_config(transport, Qdac2Config::default())
    }

    /// Wrap a transport with a specific configuration
    pub fn with_config(transport: T, config: Qdac2Config) -> Self {
        Qdac2 {
            transport: Arc::new(Mutex::new(transport)),
            triggers: Arc::new(RwLock::new(TriggerPool::new(config.internal_triggers))),
            config,
        }
    }

    /// Current configuration
    pub fn config(&self) -> &Qdac2Config {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write all lines of an instruction
    pub fn process<I: Instruction>(&self, instr: &I) -> Result<(), Qdac2Error> {
        let mut transport = self.lock();

        for line in instr.view() {
            scpidbg!(line);
            transport.write(line)?;
        }

        Ok(())
    }

    /// Write a single raw SCPI line
    pub fn write(&self, line: &str) -> Result<(), Qdac2Error> {
        scpidbg!(line);
        self.lock().write(line)
    }

    /// Write a single raw SCPI query and return the response
    pub fn query(&self, line: &str) -> Result<String, Qdac2Error> {
        scpidbg!(line);
        self.lock().query(line)
    }

    /// Block for `seconds`
    pub fn sleep_s(&self, seconds: f64) {
        self.lock().sleep_s(seconds)
    }

    /// Take an internal trigger out of the pool
    pub fn allocate_trigger(&self) -> Result<InternalTrigger, Qdac2Error> {
        let mut pool = self.triggers.write().unwrap_or_else(PoisonError::into_inner);
        let trigger = pool.allocate()?;
        log::debug!("Allocated {} ({} left)", trigger, pool.available());

        Ok(trigger)
    }

    /// Return an internal trigger to the pool. Triggers allocated before
    /// the last [`Qdac2::free_all_triggers()`] (or [`Qdac2::reset()`]) are
    /// no longer owned by the caller and are ignored.
    pub fn free_trigger(&self, trigger: InternalTrigger) -> Result<(), Qdac2Error> {
        let mut pool = self.triggers.write().unwrap_or_else(PoisonError::into_inner);

        if !pool.is_current(&trigger) {
            log::debug!("Ignoring release of {} from before the last reset", trigger);
            return Ok(());
        }

        pool.free(trigger)?;
        log::debug!("Released {} ({} left)", trigger, pool.available());

        Ok(())
    }

    /// Return all internal triggers to the pool regardless of who holds
    /// them. Arrangements and sweeps still alive keep their trigger
    /// numbers, but releasing them later has no effect on the pool.
    pub fn free_all_triggers(&self) {
        self.triggers.write().unwrap_or_else(PoisonError::into_inner).free_all();
    }

    /// Number of internal triggers available for allocation
    pub fn available_triggers(&self) -> usize {
        self.triggers.read().unwrap_or_else(PoisonError::into_inner).available()
    }

    /// Fire an internal trigger
    pub fn trigger(&self, trigger: InternalTrigger) -> Result<(), Qdac2Error> {
        self.process(&FireTrigger::new(trigger))
    }

    /// Access a single output channel
    pub fn channel(&self, number: u8) -> Result<Channel<'_, T>, Qdac2Error> {
        Ok(Channel { qdac: self, number: check_channel(number)? })
    }

    /// Reset the instrument and return every internal trigger to the pool
    pub fn reset(&self) -> Result<(), Qdac2Error> {
        self.process(&*RESET)?;
        self.free_all_triggers();
        Ok(())
    }

    /// Drain the instrument's error queue
    pub fn errors(&self) -> Result<String, Qdac2Error> {
        self.query(QUERY_ERRORS)
    }
}


/// A single output channel
pub struct Channel<'a, T: Transport> {
    qdac: &'a Qdac2<T>,
    number: u8,
}

impl<'a, T: Transport> Channel<'a, T> {

    /// Channel number
    pub fn number(&self) -> u8 {
        self.number
    }

    /// Set a constant output voltage, effective immediately
    pub fn set_dc_constant_v(&self, volts: f64) -> Result<(), Qdac2Error> {
        check_voltage(volts)?;
        self.qdac.process(&SetFixedVoltage::new(self.number, volts))
    }

    /// Read the current flowing through this channel
    pub fn read_current_a(&self) -> Result<f64, Qdac2Error> {
        let response = self.qdac.query(&format!("read? (@{})", self.number))?;
        parse_floats(&response)?
            .first()
            .copied()
            .ok_or(Qdac2Error::InvalidResponse(response))
    }
}
