//! In-memory stand-in for a QDAC-II
//!
//! [`Simulator`] implements [`Transport`] without any hardware. It records
//! every SCPI line and every requested wait, keeps track of fixed channel
//! voltages and answers current reads from a simple resistive model. It is
//! cheap to clone and all clones share the same state, so a test can hand
//! one clone to a [`Qdac2`][`crate::Qdac2`] and inspect the other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::instrument::Qdac2Error;
use crate::params::{MAX_CHANNEL, check_channel};
use crate::transport::Transport;

struct SimState {
    commands: Vec<String>,
    sleeps: Vec<f64>,
    voltages: Vec<f64>,
    currents: Vec<f64>,
    // (from, to) → conductance in S
    leakage: HashMap<(u8, u8), f64>,
}

impl SimState {

    fn new() -> Self {
        SimState {
            commands: Vec::new(),
            sleeps: Vec::new(),
            voltages: vec![0.0; MAX_CHANNEL as usize],
            // channel n idles at n/10 A
            currents: (1..=MAX_CHANNEL).map(|n| (n as f64) / 10.0).collect(),
            leakage: HashMap::new(),
        }
    }

    fn current(&self, channel: u8) -> f64 {
        let base = self.currents[(channel - 1) as usize];
        let induced: f64 = self.leakage.iter()
            .filter(|(path, _)| path.1 == channel)
            .map(|(path, g)| self.voltages[(path.0 - 1) as usize] * *g)
            .sum();

        base + induced
    }
}


/// Simulated QDAC-II transport
#[derive(Clone)]
pub struct Simulator {
    state: Arc<Mutex<SimState>>
}

impl Default for Simulator {
    fn default() -> Self {
        Simulator::new()
    }
}

impl Simulator {

    pub fn new() -> Self {
        Simulator { state: Arc::new(Mutex::new(SimState::new())) }
    }

    fn with_state<R, F: FnOnce(&mut SimState) -> R>(&self, f: F) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Discard everything recorded so far
    pub fn start_recording_scpi(&self) {
        self.with_state(|s| { s.commands.clear(); s.sleeps.clear(); });
    }

    /// SCPI lines recorded since the last call (or since
    /// [`Simulator::start_recording_scpi`])
    pub fn recorded_scpi_commands(&self) -> Vec<String> {
        self.with_state(|s| std::mem::take(&mut s.commands))
    }

    /// Waits requested since the last call, in seconds
    pub fn recorded_sleeps(&self) -> Vec<f64> {
        self.with_state(|s| std::mem::take(&mut s.sleeps))
    }

    /// Override the idle current of a channel
    pub fn set_current_a(&self, channel: u8, current: f64) -> Result<(), Qdac2Error> {
        let index = (check_channel(channel)? - 1) as usize;
        self.with_state(|s| s.currents[index] = current);
        Ok(())
    }

    /// Connect channel `from` to the sensor on channel `to` through
    /// `ohms`, so that the current read on `to` changes by `V(from)/ohms`.
    pub fn add_leakage(&self, from: u8, to: u8, ohms: f64) -> Result<(), Qdac2Error> {
        let path = (check_channel(from)?, check_channel(to)?);
        self.with_state(|s| { s.leakage.insert(path, 1.0 / ohms); });
        Ok(())
    }

    /// Last fixed voltage applied to a channel
    pub fn voltage_v(&self, channel: u8) -> Result<f64, Qdac2Error> {
        let index = (check_channel(channel)? - 1) as usize;
        Ok(self.with_state(|s| s.voltages[index]))
    }

    fn channel_from(text: &str) -> Result<u8, Qdac2Error> {
        match text.parse::<u8>() {
            Ok(c) if c >= 1 && c <= MAX_CHANNEL => Ok(c),
            _ => Err(Qdac2Error::InvalidResponse(format!("Bad channel \"{}\"", text)))
        }
    }

    // "(@1,2,3)" → [1, 2, 3]
    fn channel_list(suffix: &str) -> Result<Vec<u8>, Qdac2Error> {
        let inner = suffix.trim()
            .strip_prefix("(@")
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| Qdac2Error::InvalidResponse(format!("Bad channel list \"{}\"", suffix)))?;

        inner.split(',').map(Simulator::channel_from).collect()
    }
}

impl Transport for Simulator {

    fn write(&mut self, command: &str) -> Result<(), Qdac2Error> {
        // sour<n>:volt <V>
        let fixed = command.strip_prefix("sour")
            .and_then(|rest| rest.split_once(':'))
            .and_then(|(channel, tail)| tail.strip_prefix("volt ").map(|v| (channel, v)));

        let update = match fixed {
            Some((channel, value)) => {
                let channel = Simulator::channel_from(channel)?;
                let volts = value.trim().parse::<f64>()
                    .map_err(|_| Qdac2Error::InvalidResponse(command.to_string()))?;
                Some((channel, volts))
            },
            None => None
        };

        self.with_state(|s| {
            if let Some((channel, volts)) = update {
                s.voltages[(channel - 1) as usize] = volts;
            }
            if command == "*rst" {
                s.voltages.iter_mut().for_each(|v| *v = 0.0);
            }
            s.commands.push(command.to_string());
        });

        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String, Qdac2Error> {
        self.with_state(|s| s.commands.push(command.to_string()));

        if let Some(suffix) = command.strip_prefix("read? ") {
            let channels = Simulator::channel_list(suffix)?;
            let values: Vec<String> = self.with_state(|s| {
                channels.iter().map(|c| s.current(*c).to_string()).collect()
            });
            return Ok(values.join(","));
        }

        if command == "syst:err:all?" {
            return Ok(String::from("0, \"No error\""));
        }

        Err(Qdac2Error::InvalidResponse(format!("Unsupported query \"{}\"", command)))
    }

    fn sleep_s(&mut self, seconds: f64) {
        self.with_state(|s| s.sleeps.push(seconds));
    }
}
