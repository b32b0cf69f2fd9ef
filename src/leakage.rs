use ndarray::{Array1, Array2};

use crate::arrangement::Arrangement;
use crate::instructions::SenseSetup;
use crate::instrument::{Qdac2Error, parse_floats};
use crate::linalg::diff_matrix;
use crate::params::{ChannelList, CurrentRange, ToScpi, check_voltage};
use crate::transport::Transport;


impl<T: Transport> Arrangement<T> {

    /// Steady-state currents of all contacts in the low range, in
    /// arrangement order. See [`Arrangement::currents_a_in_range()`].
    pub fn currents_a(&self, nplc: u32) -> Result<Vec<f64>, Qdac2Error> {
        self.currents_a_in_range(nplc, CurrentRange::Low)
    }

    /// Steady-state currents of all contacts, in arrangement order.
    ///
    /// The range and integration time (`nplc` power line cycles) are
    /// applied to all channels, then one reading is discarded to let the
    /// change settle and a second one is taken after a full integration
    /// period plus one line cycle.
    pub fn currents_a_in_range(&self, nplc: u32, range: CurrentRange) -> Result<Vec<f64>, Qdac2Error> {
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let qdac = self.qdac();
        let line_frequency_hz = qdac.config().line_frequency_hz;
        let channels = ChannelList::new(self.channel_numbers());
        let read = format!("read? {}", channels.to_scpi());

        qdac.process(&SenseSetup::new(&channels, range, nplc))?;

        // discarded
        qdac.sleep_s(1.0 / line_frequency_hz);
        qdac.query(&read)?;

        qdac.sleep_s(((nplc + 1) as f64) / line_frequency_hz);
        let response = qdac.query(&read)?;
        let currents = parse_floats(&response)?;

        if currents.len() != self.len() {
            return Err(Qdac2Error::InvalidResponse(response));
        }

        Ok(currents)
    }

    /// Leakage resistance between all pairs of contacts.
    ///
    /// After measuring a baseline, every contact in turn has its virtual
    /// voltage raised by `modulation_v` while the currents of all contacts
    /// are measured, and is then restored. Row `i` of the result belongs
    /// to modulating contact `i`, column `j` to the current measured on
    /// contact `j`; the entry is `|modulation_v / ΔI|` in Ω. A current that
    /// does not respond at all gives an infinite resistance.
    ///
    /// Each contact is put back to its original virtual voltage even if
    /// modulating or measuring it fails.
    pub fn leakage(&mut self, modulation_v: f64, nplc: u32) -> Result<Array2<f64>, Qdac2Error> {
        check_voltage(modulation_v)?;
        let size = self.len();

        log::debug!("Leakage with {} V modulation over {} contacts", modulation_v, size);

        let baseline = Array1::from(self.currents_a(nplc)?);
        let mut currents: Array2<f64> = Array2::from_elem((size, size), f64::NAN);

        for index in 0..size {
            let original_v = self.virtual_voltages()[index];
            let measured = self.effectuate_virtual_voltage(index, original_v + modulation_v)
                .and_then(|_| self.currents_a(nplc));
            // the virtual voltage is restored even if the write fails
            let restored = self.effectuate_virtual_voltage(index, original_v);

            currents.row_mut(index).assign(&Array1::from(measured?));
            restored?;

            log::debug!("Modulated {} of {}", index + 1, size);
        }

        let deltas = diff_matrix(&baseline, &currents);
        Ok(deltas.mapv(|delta| (modulation_v / delta).abs()))
    }
}
