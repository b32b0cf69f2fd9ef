use ndarray::{Array1, Array2};

use crate::instrument::Qdac2Error;


/// Cross-capacitance compensation for an arrangement
///
/// Row `i` describes how the physical voltage of contact `i` is composed of
/// the virtual voltages of all contacts; the physical output vector is
/// `matrix · virtual`. A fresh matrix is the identity, ie. physical and
/// virtual voltages coincide.
#[derive(Clone, Debug)]
pub struct CorrectionMatrix {
    matrix: Array2<f64>
}

impl CorrectionMatrix {

    /// Identity correction for `size` contacts
    pub fn identity(size: usize) -> Self {
        CorrectionMatrix { matrix: Array2::eye(size) }
    }

    /// Number of contacts covered
    pub fn size(&self) -> usize {
        self.matrix.nrows()
    }

    /// Current matrix
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    fn check_row(&self, factors: &[f64]) -> Result<(), Qdac2Error> {
        if factors.len() != self.size() {
            return Err(Qdac2Error::CorrectionLength {
                expected: self.size(),
                got: factors.len()
            });
        }
        Ok(())
    }

    /// Replace the correction factors of contact `index`
    pub fn initiate(&mut self, index: usize, factors: &[f64]) -> Result<(), Qdac2Error> {
        self.check_row(factors)?;
        self.matrix.row_mut(index).assign(&Array1::from(factors.to_vec()));

        Ok(())
    }

    /// Layer a tuning pass for contact `index` on top of the existing
    /// corrections. The factors are extended into an identity matrix and
    /// multiplied onto the current correction, so contacts that have
    /// already been compensated keep their compensation.
    pub fn add(&mut self, index: usize, factors: &[f64]) -> Result<(), Qdac2Error> {
        self.check_row(factors)?;

        let mut multiplier: Array2<f64> = Array2::eye(self.size());
        multiplier.row_mut(index).assign(&Array1::from(factors.to_vec()));
        self.matrix = multiplier.dot(&self.matrix);

        Ok(())
    }

    /// Physical voltages for a virtual voltage vector
    pub fn apply(&self, virtual_v: &Array1<f64>) -> Array1<f64> {
        self.matrix.dot(virtual_v)
    }
}
