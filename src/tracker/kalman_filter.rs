//! Constant-velocity Kalman filter over the tracked centroid, using ndarray
//! for the state and nalgebra for the 2x2 innovation inverse.

use ndarray::{Array1, Array2, array};

use crate::error::{Result, TrackerError};

/// 4-state (x, y, vx, vy), 2-measurement (x, y) estimator with unit time step.
#[derive(Debug, Clone)]
pub struct KalmanEstimator {
    motion_mat: Array2<f64>,
    update_mat: Array2<f64>,
    process_cov: Array2<f64>,
    measurement_cov: Array2<f64>,
    mean: Array1<f64>,
    covariance: Array2<f64>,
    initialized: bool,
}

impl Default for KalmanEstimator {
    fn default() -> Self {
        Self::new(0.5, 5.0)
    }
}

impl KalmanEstimator {
    /// Constant-velocity model with isotropic process and measurement noise.
    /// The filter starts uninitialized.
    pub fn new(process_noise: f64, measurement_noise: f64) -> Self {
        let mut motion_mat = Array2::eye(4);
        motion_mat[[0, 2]] = 1.0;
        motion_mat[[1, 3]] = 1.0;

        let update_mat = array![[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]];

        Self {
            motion_mat,
            update_mat,
            process_cov: Array2::<f64>::eye(4) * process_noise,
            measurement_cov: Array2::<f64>::eye(2) * measurement_noise,
            mean: Array1::zeros(4),
            covariance: Array2::eye(4),
            initialized: false,
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Start a new identity at `(x, y)` with zero velocity and a fresh prior.
    pub fn init(&mut self, x: f64, y: f64) {
        self.mean = array![x, y, 0.0, 0.0];
        self.covariance = Array2::eye(4);
        self.initialized = true;
    }

    /// Current position estimate (posterior after the last update, or the
    /// open-loop prediction if no measurement followed it).
    pub fn position(&self) -> Result<(f64, f64)> {
        self.ensure_initialized()?;
        Ok((self.mean[0], self.mean[1]))
    }

    /// Estimated velocity in pixels per frame.
    pub fn velocity(&self) -> Result<(f64, f64)> {
        self.ensure_initialized()?;
        Ok((self.mean[2], self.mean[3]))
    }

    pub fn covariance(&self) -> &Array2<f64> {
        &self.covariance
    }

    /// Advance one frame and return the predicted position.
    pub fn predict(&mut self) -> Result<(f64, f64)> {
        self.ensure_initialized()?;
        self.mean = self.motion_mat.dot(&self.mean);
        self.covariance =
            self.motion_mat.dot(&self.covariance).dot(&self.motion_mat.t()) + &self.process_cov;
        Ok((self.mean[0], self.mean[1]))
    }

    /// Correct the state with a position measurement and return the posterior position.
    pub fn update(&mut self, x: f64, y: f64) -> Result<(f64, f64)> {
        self.ensure_initialized()?;

        let projected_mean = self.update_mat.dot(&self.mean);
        let projected_cov =
            self.update_mat.dot(&self.covariance).dot(&self.update_mat.t()) + &self.measurement_cov;
        let innovation = array![x, y] - projected_mean;

        // K = P * H^T * S^-1
        let s_inv = invert_2x2(&projected_cov)?;
        let pht = self.covariance.dot(&self.update_mat.t()); // 4x2
        let kalman_gain = pht.dot(&s_inv); // 4x2

        self.mean = &self.mean + &kalman_gain.dot(&innovation);
        self.covariance =
            &self.covariance - &kalman_gain.dot(&projected_cov).dot(&kalman_gain.t());

        Ok((self.mean[0], self.mean[1]))
    }

    /// Drop the identity and reset the uncertainty to the prior.
    pub fn reset(&mut self) {
        self.initialized = false;
        self.mean = Array1::zeros(4);
        self.covariance = Array2::eye(4);
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(TrackerError::NotInitialized)
        }
    }
}

fn invert_2x2(m: &Array2<f64>) -> Result<Array2<f64>> {
    let nm = nalgebra::Matrix2::new(m[[0, 0]], m[[0, 1]], m[[1, 0]], m[[1, 1]]);
    let inv = nm.try_inverse().ok_or_else(|| {
        TrackerError::InvalidConfig("innovation covariance is singular".to_owned())
    })?;
    Ok(array![[inv[(0, 0)], inv[(0, 1)]], [inv[(1, 0)], inv[(1, 1)]]])
}
