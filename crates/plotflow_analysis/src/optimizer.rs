// SPDX-License-Identifier: MIT OR Apache-2.0
//! Least-squares minimization for fits, on top of the `levenberg-marquardt`
//! solver.
//!
//! Fixed parameters are kept out of the solver: it only sees the varied
//! entries, and the full vector is reassembled around them.

use crate::error::{AnalysisError, Result};
use levenberg_marquardt as lm;
use levenberg_marquardt::{LeastSquaresProblem, TerminationReason};
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};
use std::cell::{Cell, RefCell};

/// Outcome of a minimization
#[derive(Debug, Clone)]
pub struct Solution {
    /// Final parameter vector (fixed entries untouched)
    pub params: Vec<f64>,
    /// Residual evaluations made by the solver
    pub iterations: usize,
    /// Residual evaluations, including those spent on Jacobians
    pub nfev: usize,
    /// Sum of squared residuals at `params`
    pub cost: f64,
    /// Number of residuals
    pub points: usize,
    /// Indices of the varied parameters
    pub free: Vec<usize>,
    /// Unscaled covariance `(JᵀJ)⁻¹` over the varied parameters
    pub covariance: Option<DMatrix<f64>>,
}

/// Levenberg-Marquardt minimizer settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevenbergMarquardt {
    /// Evaluation budget, in multiples of `varied parameters + 1`
    pub patience: usize,
    /// Relative cost reduction below which the fit is converged
    pub ftol: f64,
    /// Relative step size below which the fit is converged
    pub xtol: f64,
    /// Orthogonality between residuals and Jacobian below which the fit is
    /// converged
    pub gtol: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            patience: 100,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-12,
        }
    }
}

impl LevenbergMarquardt {
    /// Minimize the sum of squared `residuals` starting at `initial`.
    ///
    /// Only entries with `vary[i] == true` are optimized.
    pub fn minimize<F>(&self, residuals: F, initial: &[f64], vary: &[bool]) -> Result<Solution>
    where
        F: Fn(&[f64]) -> Result<Vec<f64>>,
    {
        let free: Vec<usize> = (0..initial.len()).filter(|&i| vary.get(i) == Some(&true)).collect();
        let start = residuals(initial)?;
        let cost = start.iter().map(|v| v * v).sum::<f64>();
        if !cost.is_finite() {
            return Err(AnalysisError::FitDivergence {
                iterations: 0,
                reason: "non-finite residuals at the initial parameters".to_string(),
            });
        }
        if free.is_empty() {
            return Ok(Solution {
                params: initial.to_vec(),
                iterations: 0,
                nfev: 1,
                cost,
                points: start.len(),
                free,
                covariance: None,
            });
        }

        let problem = Problem {
            residuals: &residuals,
            params: initial.to_vec(),
            free: &free,
            nfev: Cell::new(1),
            error: RefCell::new(None),
        };
        let (problem, report) = lm::LevenbergMarquardt::new()
            .with_ftol(self.ftol)
            .with_xtol(self.xtol)
            .with_gtol(self.gtol)
            .with_patience(self.patience)
            .minimize(problem);

        if let Some(err) = problem.error.take() {
            return Err(err);
        }
        match report.termination {
            TerminationReason::ResidualsZero
            | TerminationReason::Orthogonal
            | TerminationReason::Converged { .. } => {}
            // tolerances below machine precision: the solver sits on the minimum
            TerminationReason::NoImprovementPossible(tol) => {
                tracing::debug!("Fit stopped, {} cannot improve further", tol);
            }
            TerminationReason::LostPatience => {
                return Err(AnalysisError::FitDivergence {
                    iterations: report.number_of_evaluations,
                    reason: format!(
                        "no convergence within {} evaluations",
                        self.patience * (free.len() + 1)
                    ),
                });
            }
            other => {
                return Err(AnalysisError::FitDivergence {
                    iterations: report.number_of_evaluations,
                    reason: format!("{other:?}"),
                });
            }
        }
        tracing::trace!(
            "Fit converged after {} evaluations ({:?})",
            report.number_of_evaluations,
            report.termination
        );

        let covariance = problem.jacobian_at().and_then(|j| j.tr_mul(&j).try_inverse());
        if let Some(err) = problem.error.take() {
            return Err(err);
        }

        Ok(Solution {
            iterations: report.number_of_evaluations,
            nfev: problem.nfev.get(),
            // the solver reports half the sum of squares
            cost: 2.0 * report.objective_function,
            points: start.len(),
            covariance,
            params: problem.params,
            free,
        })
    }
}

/// The varied parameters of a fit, seen by the solver
struct Problem<'a, F> {
    residuals: &'a F,
    params: Vec<f64>,
    free: &'a [usize],
    nfev: Cell<usize>,
    error: RefCell<Option<AnalysisError>>,
}

impl<F> Problem<'_, F>
where
    F: Fn(&[f64]) -> Result<Vec<f64>>,
{
    fn evaluate(&self, params: &[f64]) -> Option<Vec<f64>> {
        self.nfev.set(self.nfev.get() + 1);
        match (self.residuals)(params) {
            Ok(r) => Some(r),
            Err(err) => {
                self.error.borrow_mut().get_or_insert(err);
                None
            }
        }
    }

    /// Forward-difference Jacobian, one column per varied parameter
    fn jacobian_at(&self) -> Option<DMatrix<f64>> {
        let r = self.evaluate(&self.params)?;
        let mut jac = DMatrix::zeros(r.len(), self.free.len());
        for (k, &i) in self.free.iter().enumerate() {
            let h = f64::EPSILON.sqrt() * self.params[i].abs().max(1.0);
            let mut shifted = self.params.clone();
            shifted[i] += h;
            let shifted_r = self.evaluate(&shifted)?;
            for (row, (a, b)) in shifted_r.iter().zip(&r).enumerate() {
                jac[(row, k)] = (a - b) / h;
            }
        }
        jac.iter().all(|v| v.is_finite()).then_some(jac)
    }
}

impl<F> LeastSquaresProblem<f64, Dyn, Dyn> for Problem<'_, F>
where
    F: Fn(&[f64]) -> Result<Vec<f64>>,
{
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        for (&i, value) in self.free.iter().zip(x.iter()) {
            self.params[i] = *value;
        }
    }

    fn params(&self) -> DVector<f64> {
        DVector::from_iterator(self.free.len(), self.free.iter().map(|&i| self.params[i]))
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        self.evaluate(&self.params).map(DVector::from_vec)
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        self.jacobian_at()
    }
}
