use std::collections::HashMap;
use ndarray::{Array1, Array2, ArrayView1};

use crate::correction::CorrectionMatrix;
use crate::instructions::{SetFixedVoltage, RouteOutputTrigger};
use crate::instrument::{Qdac2, Qdac2Error, Channel};
use crate::linalg::forward_and_back;
use crate::params::{InternalTrigger, OutputTrigger, check_channel, check_voltage};
use crate::sweep::Sweep;
use crate::transport::Transport;


/// A group of named contacts with a shared virtual voltage space
///
/// An `Arrangement` maps each contact (a gate or terminal of the sample) to
/// one output channel and keeps a *virtual* voltage per contact. The
/// physical voltage that is actually output is obtained by multiplying the
/// virtual voltages with the [correction matrix][`CorrectionMatrix`], which
/// compensates for cross-capacitance between contacts. Because a change of
/// one virtual voltage may move every physical voltage, all channels are
/// updated whenever any virtual voltage changes.
///
/// Arrangements are created with [`Qdac2::arrange()`]. Any internal
/// triggers they allocate are released when the arrangement is dropped,
/// whichever way the scope holding it is left.
///
/// ## Examples
///
/// ```
/// use libqdac2::{Qdac2, Simulator};
///
/// let qdac = Qdac2::new(Simulator::new());
/// let mut arrangement = qdac.arrange(&[("plunger1", 1), ("plunger2", 2)], &[]).unwrap();
///
/// arrangement.initiate_correction("plunger1", &[1.0, 0.1]).unwrap();
/// arrangement.set_virtual_voltage("plunger2", 1.0).unwrap();
///
/// assert_eq!(arrangement.actual_voltages().to_vec(), vec![0.1, 1.0]);
/// ```
pub struct Arrangement<T: Transport> {
    qdac: Qdac2<T>,
    contacts: Vec<String>,
    indices: HashMap<String, usize>,
    channels: Vec<u8>,
    correction: CorrectionMatrix,
    virtual_voltages: Array1<f64>,
    // output trigger name → internal trigger driving it
    output_triggers: HashMap<String, InternalTrigger>,
}

impl<T: Transport> Qdac2<T> {

    /// Arrange contacts into a virtual gate space.
    ///
    /// `contacts` maps contact names to channel numbers; the order of the
    /// slice is the order of the contacts everywhere else (matrix rows,
    /// command order). `output_triggers` maps names to external trigger
    /// outputs; each of them gets an internal trigger of its own, which
    /// can then be used as a step trigger by sweeps.
    pub fn arrange(&self, contacts: &[(&str, u8)], output_triggers: &[(&str, u8)])
        -> Result<Arrangement<T>, Qdac2Error> {

        let mut indices: HashMap<String, usize> = HashMap::with_capacity(contacts.len());
        let mut names: Vec<String> = Vec::with_capacity(contacts.len());
        let mut channels: Vec<u8> = Vec::with_capacity(contacts.len());

        for (index, (name, channel)) in contacts.iter().enumerate() {
            let channel = check_channel(*channel)?;

            if channels.contains(&channel) {
                return Err(Qdac2Error::DuplicateChannel(channel));
            }

            if indices.insert(name.to_string(), index).is_some() {
                return Err(Qdac2Error::DuplicateContact(name.to_string()));
            }

            names.push(name.to_string());
            channels.push(channel);
        }

        let mut outputs: Vec<(String, OutputTrigger)> = Vec::with_capacity(output_triggers.len());
        for (name, number) in output_triggers {
            if outputs.iter().any(|(n, _)| n == name) {
                return Err(Qdac2Error::DuplicateTrigger(name.to_string()));
            }
            outputs.push((name.to_string(), OutputTrigger::from_number(*number)?));
        }

        let size = channels.len();
        let mut arrangement = Arrangement {
            qdac: self.clone(),
            contacts: names,
            indices,
            channels,
            correction: CorrectionMatrix::identity(size),
            virtual_voltages: Array1::zeros(size),
            output_triggers: HashMap::with_capacity(outputs.len()),
        };

        // From here on a failure drops `arrangement`, which releases
        // whatever has been allocated so far.
        let width_s = self.config().output_trigger_width_s;
        for (name, output) in outputs {
            let trigger = self.allocate_trigger()?;
            arrangement.output_triggers.insert(name, trigger);
            self.process(&RouteOutputTrigger::new(output, trigger, width_s))?;
        }

        log::debug!("Arranged {:?} on channels {:?}", arrangement.contacts, arrangement.channels);

        Ok(arrangement)
    }
}

impl<T: Transport> Arrangement<T> {

    /// Names of the contacts, in arrangement order
    pub fn contact_names(&self) -> &[String] {
        &self.contacts
    }

    /// Channel numbers of the contacts, in arrangement order
    pub fn channel_numbers(&self) -> &[u8] {
        &self.channels
    }

    /// Number of contacts
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// `true` if the arrangement has no contacts
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub(crate) fn qdac(&self) -> &Qdac2<T> {
        &self.qdac
    }

    pub(crate) fn contact_index(&self, contact: &str) -> Result<usize, Qdac2Error> {
        self.indices.get(contact)
            .copied()
            .ok_or_else(|| Qdac2Error::UnknownContact(contact.to_string()))
    }

    /// The output channel of a contact
    pub fn channel(&self, contact: &str) -> Result<Channel<'_, T>, Qdac2Error> {
        let index = self.contact_index(contact)?;
        self.qdac.channel(self.channels[index])
    }

    /// Internal trigger driving the named output trigger
    pub fn trigger_by_name(&self, name: &str) -> Result<InternalTrigger, Qdac2Error> {
        self.output_triggers.get(name)
            .copied()
            .ok_or_else(|| Qdac2Error::UnknownTrigger(name.to_string()))
    }

    /// Current correction matrix
    pub fn correction_matrix(&self) -> &Array2<f64> {
        self.correction.matrix()
    }

    /// Replace the correction factors of a contact. `factors` must hold one
    /// value per contact. Takes effect with the next voltage change.
    pub fn initiate_correction(&mut self, contact: &str, factors: &[f64]) -> Result<(), Qdac2Error> {
        let index = self.contact_index(contact)?;
        self.correction.initiate(index, factors)
    }

    /// Add a correction pass for a contact on top of the existing ones.
    /// This is useful when contacts mostly influence their neighbours and
    /// the correction can be built up one contact at a time.
    pub fn add_correction(&mut self, contact: &str, factors: &[f64]) -> Result<(), Qdac2Error> {
        let index = self.contact_index(contact)?;
        self.correction.add(index, factors)
    }

    /// Virtual voltage of a contact
    pub fn virtual_voltage(&self, contact: &str) -> Result<f64, Qdac2Error> {
        Ok(self.virtual_voltages[self.contact_index(contact)?])
    }

    /// Virtual voltages of all contacts, in arrangement order
    pub fn virtual_voltages(&self) -> &Array1<f64> {
        &self.virtual_voltages
    }

    /// Physical voltages corresponding to the current virtual voltages
    pub fn actual_voltages(&self) -> Array1<f64> {
        self.correction.apply(&self.virtual_voltages)
    }

    /// Set the virtual voltage of a contact. All channels of the
    /// arrangement are updated immediately.
    pub fn set_virtual_voltage(&mut self, contact: &str, volts: f64) -> Result<(), Qdac2Error> {
        let index = self.contact_index(contact)?;
        check_voltage(volts)?;
        self.effectuate_virtual_voltage(index, volts)
    }

    /// Set several virtual voltages at once. The channels are updated
    /// once, after all values have been changed.
    pub fn set_virtual_voltages(&mut self, voltages: &[(&str, f64)]) -> Result<(), Qdac2Error> {
        let indices = voltages.iter()
            .map(|(contact, _)| self.contact_index(contact))
            .collect::<Result<Vec<usize>, Qdac2Error>>()?;

        for (_, volts) in voltages {
            check_voltage(*volts)?;
        }

        for (index, (_, volts)) in indices.into_iter().zip(voltages) {
            self.virtual_voltages[index] = *volts;
        }

        self.effectuate()
    }

    pub(crate) fn effectuate_virtual_voltage(&mut self, index: usize, volts: f64) -> Result<(), Qdac2Error> {
        self.virtual_voltages[index] = volts;
        self.effectuate()
    }

    fn effectuate(&self) -> Result<(), Qdac2Error> {
        let actuals = self.actual_voltages();

        for (channel, volts) in self.channels.iter().zip(actuals.iter()) {
            self.qdac.process(&SetFixedVoltage::new(*channel, *volts))?;
        }

        Ok(())
    }

    /// Physical voltages for a set of virtual sweep points (one row per
    /// point). Every point goes through the full correction.
    pub(crate) fn actual_values(&self, points: &Array2<f64>) -> Array2<f64> {
        points.dot(&self.correction.matrix().t())
    }

    // One row per point, each holding the present virtual voltages
    fn steady_points(&self, points: usize) -> Array2<f64> {
        let mut steady = Array2::zeros((points, self.len()));
        for mut row in steady.rows_mut() {
            row.assign(&self.virtual_voltages);
        }
        steady
    }

    fn check_voltages(voltages: &[f64]) -> Result<(), Qdac2Error> {
        voltages.iter().try_for_each(|v| check_voltage(*v).map(|_| ()))
    }

    fn step_trigger(&self, name: Option<&str>) -> Result<Option<InternalTrigger>, Qdac2Error> {
        name.map(|n| self.trigger_by_name(n)).transpose()
    }

    /// Sweep the virtual voltage of a single contact.
    ///
    /// All other contacts stay at their present virtual voltage, although
    /// their physical voltage will follow the sweep wherever the correction
    /// matrix couples them to `contact`. Each point is held for
    /// `step_time_s`; the whole list is played `repetitions` times. If
    /// `step_trigger` names an output trigger of the arrangement it will
    /// pulse at every step.
    pub fn virtual_sweep(&self, contact: &str, voltages: &[f64], step_time_s: f64,
        step_trigger: Option<&str>, repetitions: u32) -> Result<Sweep<'_, T>, Qdac2Error> {

        let index = self.contact_index(contact)?;
        let step = self.step_trigger(step_trigger)?;
        Self::check_voltages(voltages)?;

        if voltages.is_empty() {
            return Err(Qdac2Error::EmptySweep);
        }

        let mut points = self.steady_points(voltages.len());
        points.column_mut(index).assign(&ArrayView1::from(voltages));

        log::debug!("Sweep of \"{}\" over {} points", contact, voltages.len());

        Sweep::new(self, points, step_time_s, step, repetitions)
    }

    /// Sweep two contacts against each other.
    ///
    /// The inner contact runs through all of `inner_voltages` for every
    /// value of the outer contact, so the sweep has
    /// `inner_voltages.len() × outer_voltages.len()` points, each held for
    /// `inner_step_time_s`. An `inner_step_trigger` pulses at every inner
    /// step, typically to make an external meter sample.
    pub fn virtual_sweep2d(&self, inner_contact: &str, inner_voltages: &[f64],
        outer_contact: &str, outer_voltages: &[f64], inner_step_time_s: f64,
        inner_step_trigger: Option<&str>, repetitions: u32) -> Result<Sweep<'_, T>, Qdac2Error> {

        let inner = self.contact_index(inner_contact)?;
        let outer = self.contact_index(outer_contact)?;
        let step = self.step_trigger(inner_step_trigger)?;
        Self::check_voltages(inner_voltages)?;
        Self::check_voltages(outer_voltages)?;

        let count = inner_voltages.len() * outer_voltages.len();
        if count == 0 {
            return Err(Qdac2Error::EmptySweep);
        }

        let mut points = self.steady_points(count);
        for (o, outer_v) in outer_voltages.iter().enumerate() {
            for (i, inner_v) in inner_voltages.iter().enumerate() {
                let row = o * inner_voltages.len() + i;
                points[[row, outer]] = *outer_v;
                points[[row, inner]] = *inner_v;
            }
        }

        log::debug!("2D sweep of \"{}\" ({} points) within \"{}\" ({} points)",
            inner_contact, inner_voltages.len(), outer_contact, outer_voltages.len());

        Sweep::new(self, points, inner_step_time_s, step, repetitions)
    }

    /// Detune several contacts at once.
    ///
    /// Every contact ramps from its `start_v` to its `end_v` value in
    /// `steps` steps and back again (see
    /// [`forward_and_back`][`crate::forward_and_back`]), all in lock-step.
    /// There must be exactly one start and one end voltage per contact.
    pub fn virtual_detune(&self, contacts: &[&str], start_v: &[f64], end_v: &[f64],
        steps: usize, step_time_s: f64, step_trigger: Option<&str>, repetitions: u32)
        -> Result<Sweep<'_, T>, Qdac2Error> {

        if start_v.len() != contacts.len() || end_v.len() != contacts.len() {
            return Err(Qdac2Error::VoltageCount);
        }

        let indices = contacts.iter()
            .map(|c| self.contact_index(c))
            .collect::<Result<Vec<usize>, Qdac2Error>>()?;
        let step = self.step_trigger(step_trigger)?;
        Self::check_voltages(start_v)?;
        Self::check_voltages(end_v)?;

        let count = forward_and_back(0.0, 0.0, steps).len();
        if count == 0 {
            return Err(Qdac2Error::EmptySweep);
        }

        let mut points = self.steady_points(count);
        for (k, index) in indices.iter().enumerate() {
            let ramp: Vec<f64> = forward_and_back(start_v[k], end_v[k], steps).collect();
            points.column_mut(*index).assign(&Array1::from(ramp));
        }

        log::debug!("Detune of {:?} over {} points", contacts, count);

        Sweep::new(self, points, step_time_s, step, repetitions)
    }
}

impl<T: Transport> Drop for Arrangement<T> {
    fn drop(&mut self) {
        for (name, trigger) in self.output_triggers.drain() {
            if let Err(err) = self.qdac.free_trigger(trigger) {
                log::warn!("Could not release trigger of \"{}\": {}", name, err);
            }
        }
    }
}


#[cfg(test)]
mod tests {

    use assert_matches::assert_matches;
    use ndarray::array;
    use crate::instrument::{Qdac2, Qdac2Error};
    use crate::sim::Simulator;

    #[test]
    fn construction_is_validated() {
        let qdac = Qdac2::new(Simulator::new());

        assert_matches!(qdac.arrange(&[("a", 1), ("b", 1)], &[]).map(|a| a.len()),
            Err(Qdac2Error::DuplicateChannel(1)));
        assert_matches!(qdac.arrange(&[("a", 1), ("a", 2)], &[]).map(|a| a.len()),
            Err(Qdac2Error::DuplicateContact(ref n)) if n == "a");
        assert_matches!(qdac.arrange(&[("a", 25)], &[]).map(|a| a.len()),
            Err(Qdac2Error::InvalidChannel(25)));
        assert_matches!(qdac.arrange(&[], &[("dmm", 9)]).map(|a| a.len()),
            Err(Qdac2Error::InvalidOutputTrigger(9)));
        assert_matches!(qdac.arrange(&[], &[("dmm", 4), ("dmm", 5)]).map(|a| a.len()),
            Err(Qdac2Error::DuplicateTrigger(ref n)) if n == "dmm");
    }

    #[test]
    fn failed_construction_releases_triggers() {
        let qdac = Qdac2::new(Simulator::new());

        // keep only one trigger available
        let held: Vec<_> = (0..13).map(|_| qdac.allocate_trigger().unwrap()).collect();
        assert_eq!(qdac.available_triggers(), 1);

        let result = qdac.arrange(&[("a", 1)], &[("dmm", 4), ("scope", 5)]);
        assert_matches!(result.map(|a| a.len()), Err(Qdac2Error::TriggerError(_)));
        assert_eq!(qdac.available_triggers(), 1);

        for t in held {
            qdac.free_trigger(t).unwrap();
        }
    }

    #[test]
    fn unknown_contact_leaves_state_alone() {
        let sim = Simulator::new();
        let qdac = Qdac2::new(sim.clone());
        let mut arrangement = qdac.arrange(&[("plunger", 1)], &[]).unwrap();
        arrangement.set_virtual_voltage("plunger", 0.2).unwrap();
        sim.start_recording_scpi();

        let err = arrangement.set_virtual_voltage("sensor", 1.0).unwrap_err();
        assert!(err.to_string().contains("No contact named \"sensor\""));

        let err = arrangement.set_virtual_voltages(&[("plunger", 0.5), ("sensor", 1.0)]).unwrap_err();
        assert_matches!(err, Qdac2Error::UnknownContact(ref n) if n == "sensor");

        assert_eq!(arrangement.virtual_voltages(), &array![0.2]);
        assert!(sim.recorded_scpi_commands().is_empty());
    }

    #[test]
    fn non_finite_voltages_are_rejected() {
        let sim = Simulator::new();
        let qdac = Qdac2::new(sim.clone());
        let mut arrangement = qdac.arrange(&[("g1", 1), ("g2", 2)], &[]).unwrap();
        arrangement.set_virtual_voltage("g1", 0.2).unwrap();
        sim.start_recording_scpi();

        assert_matches!(arrangement.set_virtual_voltage("g1", f64::NAN),
            Err(Qdac2Error::InvalidVoltage(_)));
        assert_matches!(arrangement.set_virtual_voltages(&[("g2", 0.5), ("g1", f64::INFINITY)]),
            Err(Qdac2Error::InvalidVoltage(_)));
        assert_matches!(arrangement.virtual_sweep("g1", &[0.0, f64::NAN], 1e-5, None, 1)
            .map(|s| s.points()), Err(Qdac2Error::InvalidVoltage(_)));
        assert_matches!(arrangement.virtual_detune(&["g1"], &[0.0], &[f64::NEG_INFINITY], 3, 1e-5, None, 1)
            .map(|s| s.points()), Err(Qdac2Error::InvalidVoltage(_)));

        assert_eq!(arrangement.virtual_voltages(), &array![0.2, 0.0]);
        assert!(sim.recorded_scpi_commands().is_empty());
        assert_eq!(qdac.available_triggers(), 14);
    }

    #[test]
    fn correction_through_arrangement() {
        let qdac = Qdac2::new(Simulator::new());
        let mut arrangement = qdac.arrange(&[("g1", 1), ("g2", 2)], &[]).unwrap();

        assert_matches!(arrangement.initiate_correction("g1", &[1.0]),
            Err(Qdac2Error::CorrectionLength { expected: 2, got: 1 }));
        assert_matches!(arrangement.add_correction("g3", &[1.0, 0.0]),
            Err(Qdac2Error::UnknownContact(_)));

        arrangement.initiate_correction("g2", &[0.5, 1.0]).unwrap();
        arrangement.set_virtual_voltages(&[("g1", 1.0), ("g2", 1.0)]).unwrap();

        assert_eq!(arrangement.actual_voltages(), array![1.0, 1.5]);
        assert_eq!(arrangement.virtual_voltage("g2").unwrap(), 1.0);
    }

    #[test]
    fn sweep_arguments_are_validated() {
        let qdac = Qdac2::new(Simulator::new());
        let arrangement = qdac.arrange(&[("p1", 1), ("p2", 2)], &[]).unwrap();

        assert_matches!(arrangement.virtual_sweep("p1", &[], 1e-5, None, 1).map(|s| s.points()),
            Err(Qdac2Error::EmptySweep));
        assert_matches!(arrangement.virtual_sweep("p3", &[0.0], 1e-5, None, 1).map(|s| s.points()),
            Err(Qdac2Error::UnknownContact(_)));
        assert_matches!(arrangement.virtual_sweep("p1", &[0.0], 1e-5, Some("dmm"), 1).map(|s| s.points()),
            Err(Qdac2Error::UnknownTrigger(ref n)) if n == "dmm");
        assert_matches!(arrangement.virtual_sweep2d("p1", &[0.0], "p2", &[], 1e-5, None, 1)
            .map(|s| s.points()), Err(Qdac2Error::EmptySweep));

        let err = arrangement.virtual_detune(&["p1", "p2"], &[-0.3, 0.6], &[0.3], 2, 1e-5, None, 1)
            .map(|s| s.points())
            .unwrap_err();
        assert!(err.to_string().contains("There must be exactly one voltage per contact"));

        // nothing was left allocated by the failed attempts
        assert_eq!(qdac.available_triggers(), 14);
    }

    #[test]
    fn sweeps_do_not_touch_virtual_voltages() {
        let qdac = Qdac2::new(Simulator::new());
        let mut arrangement = qdac.arrange(&[("p1", 1), ("p2", 2)], &[]).unwrap();
        arrangement.set_virtual_voltage("p1", 0.25).unwrap();

        {
            let sweep = arrangement.virtual_sweep("p1", &[0.0, 1.0], 1e-5, None, 1).unwrap();
            assert_eq!(sweep.actual_values_v("p1").unwrap(), vec![0.0, 1.0]);
        }

        assert_eq!(arrangement.virtual_voltages(), &array![0.25, 0.0]);
    }
}
