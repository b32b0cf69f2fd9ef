//! Vector and matrix helpers for arrangements

use ndarray::{Array1, Array2};


/// Subtract a baseline from every row of a measurement matrix.
///
/// Each row of `measurements` is a full measurement vector (one value per
/// sensor) and `baseline` holds the unperturbed value of every sensor, so
/// `result[[i, j]] = measurements[[i, j]] - baseline[j]`.
///
/// ```
/// use ndarray::array;
/// use libqdac2::diff_matrix;
///
/// let diff = diff_matrix(&array![0.1, 0.2], &array![[0.1, 0.3], [0.3, 0.2]]);
/// let expected = array![[0.0, 0.1], [0.2, 0.0]];
/// assert!(diff.iter().zip(expected.iter()).all(|(a, b)| (a - b).abs() < 1e-12));
/// ```
pub fn diff_matrix(baseline: &Array1<f64>, measurements: &Array2<f64>) -> Array2<f64> {
    measurements - baseline
}


/// `steps` evenly spaced values between `start` and `end`, both inclusive.
/// The last value is always exactly `end`.
pub fn linspace(start: f64, end: f64, steps: usize) -> Vec<f64> {
    (0..steps).map(|i| linspace_at(start, end, steps, i)).collect()
}

fn linspace_at(start: f64, end: f64, steps: usize, index: usize) -> f64 {
    if steps > 1 && index == steps - 1 {
        return end;
    }

    if steps < 2 {
        return start;
    }

    let step = (end - start) / ((steps - 1) as f64);
    (index as f64) * step + start
}


/// Ramp from `start` to `end` and back again.
///
/// The forward leg is `steps` evenly spaced values including both ends;
/// the way back revisits the inner points in reverse, so neither turning
/// point is visited twice. Repeating the sequence therefore gives a
/// continuous triangle wave.
///
/// ```
/// use libqdac2::forward_and_back;
///
/// let ramp: Vec<f64> = forward_and_back(-1.0, 1.0, 3).collect();
/// assert_eq!(ramp, vec![-1.0, 0.0, 1.0, 0.0]);
/// ```
pub fn forward_and_back(start: f64, end: f64, steps: usize) -> ForwardAndBack {
    ForwardAndBack { start, end, steps, position: 0 }
}

/// Iterator returned by [`forward_and_back`]. Cloning it gives an
/// independent iterator from the same position.
#[derive(Clone, Debug)]
pub struct ForwardAndBack {
    start: f64,
    end: f64,
    steps: usize,
    position: usize,
}

impl ForwardAndBack {

    fn total(&self) -> usize {
        if self.steps >= 2 {
            2 * self.steps - 2
        } else {
            self.steps
        }
    }
}

impl Iterator for ForwardAndBack {

    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.position >= self.total() {
            return None;
        }

        let index = if self.position < self.steps {
            self.position
        } else {
            2 * self.steps - 2 - self.position
        };

        self.position += 1;
        Some(linspace_at(self.start, self.end, self.steps, index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total() - self.position;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ForwardAndBack {}


#[cfg(test)]
mod tests {

    use ndarray::array;
    use super::*;

    fn close(a: &Array2<f64>, b: &Array2<f64>) -> bool {
        a.shape() == b.shape() &&
            a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-12)
    }

    #[test]
    fn diff_matrix_subtracts_baseline_per_sensor() {
        let diff = diff_matrix(&array![0.1, 0.2], &array![[0.1, 0.3], [0.3, 0.2]]);
        assert!(close(&diff, &array![[0.0, 0.1], [0.2, 0.0]]));
    }

    #[test]
    fn diff_matrix_larger() {
        let baseline = array![1.0, 2.0, 3.0];
        let measured = array![[1.0, 2.0, 3.0], [2.0, 2.0, 2.0], [0.0, 0.0, 0.0]];
        let diff = diff_matrix(&baseline, &measured);

        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(diff[[i, j]], measured[[i, j]] - baseline[j]);
            }
        }
    }

    #[test]
    fn linspace_endpoints() {
        assert_eq!(linspace(-0.1, 0.1, 5)[4], 0.1);
        assert_eq!(linspace(-0.1, 0.1, 5)[0], -0.1);
        assert_eq!(linspace(-2.0, 2.0, 5), vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
        assert_eq!(linspace(3.0, 4.0, 1), vec![3.0]);
        assert!(linspace(3.0, 4.0, 0).is_empty());
    }

    #[test]
    fn forward_and_back_values() {
        let ramp: Vec<f64> = forward_and_back(-1.0, 1.0, 3).collect();
        assert_eq!(ramp, vec![-1.0, 0.0, 1.0, 0.0]);

        let ramp: Vec<f64> = forward_and_back(-2.0, 2.0, 5).collect();
        assert_eq!(ramp, vec![-2.0, -1.0, 0.0, 1.0, 2.0, 1.0, 0.0, -1.0]);
    }

    #[test]
    fn forward_and_back_length() {
        for steps in 2..20 {
            let ramp = forward_and_back(0.0, 1.0, steps);
            assert_eq!(ramp.len(), 2 * steps - 2);
            assert_eq!(ramp.count(), 2 * steps - 2);
        }

        assert_eq!(forward_and_back(0.0, 1.0, 1).collect::<Vec<f64>>(), vec![0.0]);
        assert_eq!(forward_and_back(0.0, 1.0, 0).count(), 0);
    }

    #[test]
    fn forward_and_back_restarts() {
        let ramp = forward_and_back(0.0, 3.0, 4);
        let first: Vec<f64> = ramp.clone().collect();
        let second: Vec<f64> = ramp.collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![0.0, 1.0, 2.0, 3.0, 2.0, 1.0]);
    }
}
