use ndarray::Array2;

use crate::arrangement::Arrangement;
use crate::instructions::{ListProgram, StepMarker};
use crate::instrument::Qdac2Error;
use crate::params::InternalTrigger;
use crate::transport::Transport;


/// A synchronised list sweep over all contacts of an arrangement
///
/// A `Sweep` holds the physical voltage list of every contact, computed
/// when the sweep was built, together with an internal trigger of its own
/// that starts all channels at the same instant. Nothing is sent to the
/// instrument until [`Sweep::start()`] is called; after that the instrument
/// plays the lists on its own. The start trigger is returned to the pool
/// when the sweep is dropped, so keep the sweep around for as long as the
/// instrument is running it.
///
/// Sweeps are created with [`Arrangement::virtual_sweep()`],
/// [`Arrangement::virtual_sweep2d()`] and [`Arrangement::virtual_detune()`].
pub struct Sweep<'a, T: Transport> {
    arrangement: &'a Arrangement<T>,
    // one row per point, one column per contact
    actual: Array2<f64>,
    step_time_s: f64,
    repetitions: u32,
    start_trigger: InternalTrigger,
    step_trigger: Option<InternalTrigger>,
}

impl<'a, T: Transport> Sweep<'a, T> {

    pub(crate) fn new(arrangement: &'a Arrangement<T>, virtual_points: Array2<f64>,
        step_time_s: f64, step_trigger: Option<InternalTrigger>, repetitions: u32)
        -> Result<Self, Qdac2Error> {

        let actual = arrangement.actual_values(&virtual_points);
        let start_trigger = arrangement.qdac().allocate_trigger()?;

        Ok(Sweep {
            arrangement,
            actual,
            step_time_s,
            repetitions,
            start_trigger,
            step_trigger,
        })
    }

    /// Physical voltages a contact will go through
    pub fn actual_values_v(&self, contact: &str) -> Result<Vec<f64>, Qdac2Error> {
        let index = self.arrangement.contact_index(contact)?;
        Ok(self.actual.column(index).to_vec())
    }

    /// Number of points in one pass of the sweep
    pub fn points(&self) -> usize {
        self.actual.nrows()
    }

    /// Dwell time of every point
    pub fn step_time_s(&self) -> f64 {
        self.step_time_s
    }

    /// Number of times the lists are played
    pub fn repetitions(&self) -> u32 {
        self.repetitions
    }

    /// Internal trigger that starts the sweep
    pub fn start_trigger(&self) -> InternalTrigger {
        self.start_trigger
    }

    /// Program every channel of the arrangement and start them together.
    ///
    /// Each channel is loaded with its list and left waiting on the start
    /// trigger, which is fired once at the end. If a step trigger was
    /// requested the first channel of the arrangement is set to pulse it at
    /// the start of every step.
    pub fn start(&self) -> Result<(), Qdac2Error> {
        let qdac = self.arrangement.qdac();
        let channels = self.arrangement.channel_numbers();

        if let (Some(step), Some(first)) = (self.step_trigger, channels.first()) {
            qdac.process(&StepMarker::new(*first, step))?;
        }

        for (index, channel) in channels.iter().enumerate() {
            let voltages = self.actual.column(index).to_vec();
            qdac.process(&ListProgram::new(*channel, &voltages, self.step_time_s,
                self.repetitions, self.start_trigger))?;
        }

        log::debug!("Starting sweep on {} ({} points, {} channels)",
            self.start_trigger, self.points(), channels.len());

        qdac.trigger(self.start_trigger)
    }
}

impl<'a, T: Transport> Drop for Sweep<'a, T> {
    fn drop(&mut self) {
        if let Err(err) = self.arrangement.qdac().free_trigger(self.start_trigger) {
            log::warn!("Could not release sweep trigger: {}", err);
        }
    }
}


#[cfg(test)]
mod tests {

    use crate::instrument::Qdac2;
    use crate::sim::Simulator;

    #[test]
    fn sweep_holds_its_trigger() {
        let qdac = Qdac2::new(Simulator::new());
        let arrangement = qdac.arrange(&[("p1", 1)], &[]).unwrap();
        let before = qdac.available_triggers();

        let sweep = arrangement.virtual_sweep("p1", &[0.0, 0.1], 1e-5, None, 3).unwrap();
        assert_eq!(qdac.available_triggers(), before - 1);
        assert_eq!(sweep.start_trigger().value(), 1);
        assert_eq!(sweep.points(), 2);
        assert_eq!(sweep.repetitions(), 3);
        assert_eq!(sweep.step_time_s(), 1e-5);

        drop(sweep);
        assert_eq!(qdac.available_triggers(), before);
    }

    #[test]
    fn step_marker_precedes_programming() {
        let sim = Simulator::new();
        let qdac = Qdac2::new(sim.clone());
        let arrangement = qdac.arrange(&[("s", 5), ("p", 6)], &[("dmm", 2)]).unwrap();
        let sweep = arrangement.virtual_sweep("p", &[0.0, 0.5], 1e-4, Some("dmm"), 1).unwrap();
        sim.start_recording_scpi();

        sweep.start().unwrap();

        let commands = sim.recorded_scpi_commands();
        assert_eq!(commands.len(), 1 + 2 * 13 + 1);
        assert_eq!(commands[0], "sour5:dc:mark:sst 1");
        assert_eq!(commands[1], "sour5:dc:trig:sour hold");
        assert_eq!(commands[14], "sour6:dc:trig:sour hold");
        assert_eq!(commands[16], "sour6:list:volt 0,0.5");
        assert_eq!(commands[27], "tint 2");
    }
}
