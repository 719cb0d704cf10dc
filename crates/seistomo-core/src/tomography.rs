//! Tomography parameters and solver artifacts.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Largest accepted `iter_max`.
pub const MAX_ITER: u32 = 1_000;
/// Largest accepted `lin_sys_lsqr_iter_max`.
pub const MAX_LSQR_ITER: u32 = 1_000_000;
/// Largest accepted node count along one grid axis.
pub const MAX_GRID_AXIS: usize = 1_024;
/// Largest accepted `nx * ny * nz`.
pub const MAX_GRID_NODES: usize = 1 << 24;
/// Largest accepted number of `base_model` rows.
pub const MAX_BASE_MODEL_ROWS: usize = 10_000;

/// Solver hyperparameters and starting model submitted for stage 2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomographyParameters {
    /// Outer iteration limit.
    pub iter_max: u32,
    /// LSQR iteration limit for each linear solve.
    pub lin_sys_lsqr_iter_max: u32,

    pub damping_p: f64,
    pub damping_p4v: f64,
    pub damping_s: f64,
    pub damping_s4v: f64,

    pub smooth_hp: f64,
    pub smooth_hp4v: f64,
    pub smooth_hs: f64,
    pub smooth_hs4v: f64,
    pub smooth_vp: f64,
    pub smooth_vp4v: f64,
    pub smooth_vs: f64,
    pub smooth_vs4v: f64,

    pub srcs_psv_corr_h: f64,
    pub srcs_psv_corr_i: f64,
    pub srcs_psv_corr_v: f64,

    /// `[low, high]` P velocity bounds, km/s.
    pub v_limits_p: Vec<f64>,
    /// `[low, high]` S velocity bounds, km/s.
    pub v_limits_s: Vec<f64>,

    /// Velocity grid node counts `[nx, ny, nz]`.
    pub grid_size: Vec<usize>,
    /// Tomography grid step `[dx, dy, dz]`, km.
    pub grid_step: Vec<f64>,

    /// 1-D starting model, rows of `[depth_km, vp, vs]`.
    pub base_model: Vec<[f64; 3]>,
}

impl TomographyParameters {
    /// Check the parameters before they are persisted.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(1..=MAX_ITER).contains(&self.iter_max) {
            return Err(invalid(format!(
                "iter_max must be between 1 and {}, got {}",
                MAX_ITER, self.iter_max
            )));
        }
        if !(1..=MAX_LSQR_ITER).contains(&self.lin_sys_lsqr_iter_max) {
            return Err(invalid(format!(
                "lin_sys_lsqr_iter_max must be between 1 and {}, got {}",
                MAX_LSQR_ITER, self.lin_sys_lsqr_iter_max
            )));
        }

        let coefficients = [
            ("damping_p", self.damping_p),
            ("damping_p4v", self.damping_p4v),
            ("damping_s", self.damping_s),
            ("damping_s4v", self.damping_s4v),
            ("smooth_hp", self.smooth_hp),
            ("smooth_hp4v", self.smooth_hp4v),
            ("smooth_hs", self.smooth_hs),
            ("smooth_hs4v", self.smooth_hs4v),
            ("smooth_vp", self.smooth_vp),
            ("smooth_vp4v", self.smooth_vp4v),
            ("smooth_vs", self.smooth_vs),
            ("smooth_vs4v", self.smooth_vs4v),
            ("srcs_psv_corr_h", self.srcs_psv_corr_h),
            ("srcs_psv_corr_i", self.srcs_psv_corr_i),
            ("srcs_psv_corr_v", self.srcs_psv_corr_v),
        ];
        for (name, value) in coefficients {
            if !value.is_finite() {
                return Err(invalid(format!("{} must be finite", name)));
            }
        }

        validate_limits("v_limits_p", &self.v_limits_p)?;
        validate_limits("v_limits_s", &self.v_limits_s)?;

        if self.grid_size.len() != 3 {
            return Err(invalid(format!(
                "grid_size must have length 3, got {}",
                self.grid_size.len()
            )));
        }
        if self.grid_size.iter().any(|&n| !(2..=MAX_GRID_AXIS).contains(&n)) {
            return Err(invalid(format!(
                "every grid_size entry must be between 2 and {}",
                MAX_GRID_AXIS
            )));
        }
        let nodes = self
            .grid_size
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .filter(|&n| n <= MAX_GRID_NODES);
        if nodes.is_none() {
            return Err(invalid(format!(
                "grid_size {:?} exceeds {} nodes",
                self.grid_size, MAX_GRID_NODES
            )));
        }

        if self.grid_step.len() != 3 {
            return Err(invalid(format!(
                "grid_step must have length 3, got {}",
                self.grid_step.len()
            )));
        }
        if self.grid_step.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(invalid("every grid_step entry must be positive"));
        }

        if self.base_model.is_empty() {
            return Err(invalid("base_model must contain at least one row"));
        }
        if self.base_model.len() > MAX_BASE_MODEL_ROWS {
            return Err(invalid(format!(
                "base_model must have at most {} rows",
                MAX_BASE_MODEL_ROWS
            )));
        }
        if self.base_model.iter().flatten().any(|v| !v.is_finite()) {
            return Err(invalid("base_model values must be finite"));
        }
        if self.base_model.windows(2).any(|w| w[1][0] < w[0][0]) {
            return Err(invalid("base_model depths must be non-decreasing"));
        }

        Ok(())
    }

    /// Grid dimensions as a fixed array. Call after [`validate`](Self::validate).
    pub fn grid_dims(&self) -> [usize; 3] {
        [self.grid_size[0], self.grid_size[1], self.grid_size[2]]
    }
}

fn validate_limits(name: &str, limits: &[f64]) -> Result<(), CoreError> {
    if limits.len() != 2 {
        return Err(invalid(format!(
            "{} must have length 2, got {}",
            name,
            limits.len()
        )));
    }
    if limits[0] > limits[1] {
        return Err(invalid(format!(
            "{}[0] ({}) must not exceed {}[1] ({})",
            name, limits[0], name, limits[1]
        )));
    }
    Ok(())
}

fn invalid(msg: impl Into<String>) -> CoreError {
    CoreError::InvalidInput(msg.into())
}

/// Files produced by a successful tomography run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverArtifact {
    /// Solver input container written by the tomography worker.
    pub input_path: PathBuf,
    /// Solver output container.
    pub output_path: PathBuf,
    /// Visualization export, when the solver produced one.
    pub export_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}
