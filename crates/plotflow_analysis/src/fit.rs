// SPDX-License-Identifier: MIT OR Apache-2.0
//! Parametric curve fitting on top of the analysis contract.
//!
//! A [`FitModel`] describes the curve and a heuristic initial guess; [`Fit`]
//! binds a model to data and runs the least-squares optimizer. Callers can
//! override guessed values, hold parameters fixed, or request a dry fit in
//! which nothing is optimized at all.

use crate::analysis::{check_aligned, Analysis, AnalysisInput, Coordinates};
use crate::error::{AnalysisError, Result};
use crate::optimizer::LevenbergMarquardt;
use crate::result::{AnalysisOutput, Parameter, Parameters};
use indexmap::IndexMap;

/// A parametric model that can be fitted to data
pub trait FitModel: Clone {
    /// Model name used in logs
    fn name(&self) -> &'static str;

    /// Parameter names, in the order `model` expects its values
    fn param_names(&self) -> &'static [&'static str];

    /// Evaluate the curve at the given coordinates
    fn model(&self, _coordinates: &Coordinates, _params: &[f64]) -> Result<Vec<f64>> {
        Err(AnalysisError::NotImplementedCapability("model"))
    }

    /// Heuristic initial values for the parameters
    fn guess(&self, _coordinates: &Coordinates, _data: &[f64]) -> Result<IndexMap<String, f64>> {
        Err(AnalysisError::NotImplementedCapability("guess"))
    }
}

/// Caller-supplied value for one fit parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitParam {
    /// Starting value, optimized by the fit
    Initial(f64),
    /// Value held fixed during the fit
    Fixed(f64),
}

/// Per-call options of a fit
#[derive(Debug, Clone, Default)]
pub struct FitOptions {
    /// Hold every parameter fixed and skip optimization
    pub dry: bool,
    /// Overrides of the guessed parameter values
    pub params: IndexMap<String, FitParam>,
    /// Optimizer settings
    pub solver: LevenbergMarquardt,
}

impl FitOptions {
    /// Enable or disable dry mode
    pub fn dry(mut self, dry: bool) -> Self {
        self.dry = dry;
        self
    }

    /// Override the starting value of a parameter
    pub fn initial(mut self, name: impl Into<String>, value: f64) -> Self {
        self.params.insert(name.into(), FitParam::Initial(value));
        self
    }

    /// Hold a parameter fixed at a value
    pub fn fixed(mut self, name: impl Into<String>, value: f64) -> Self {
        self.params.insert(name.into(), FitParam::Fixed(value));
        self
    }
}

/// Optimized parameters plus the means to reproduce the fitted curve
#[derive(Debug, Clone)]
pub struct FitResult<M> {
    model: M,
    params: Parameters,
    /// Solver steps (zero for dry fits)
    pub iterations: usize,
    /// Residual evaluations
    pub nfev: usize,
    /// Sum of squared residuals
    pub chi_square: f64,
    /// Chi-square per degree of freedom, when there are spare degrees of freedom
    pub reduced_chi_square: Option<f64>,
    /// Whether this was a dry fit
    pub dry: bool,
}

impl<M: FitModel> FitResult<M> {
    /// Parameter values in model order
    pub fn values(&self) -> Vec<f64> {
        self.model
            .param_names()
            .iter()
            .map(|name| self.params.value(name).unwrap_or(f64::NAN))
            .collect()
    }

    /// Value of one parameter
    pub fn value(&self, name: &str) -> Option<f64> {
        self.params.value(name)
    }

    /// The fitted model
    pub fn model(&self) -> &M {
        &self.model
    }
}

impl<M: FitModel> AnalysisOutput for FitResult<M> {
    fn params(&self) -> &Parameters {
        &self.params
    }

    fn eval(&self, coordinates: &Coordinates) -> Result<Vec<f64>> {
        self.model.model(coordinates, &self.values())
    }
}

/// A fit of model `M` to stored coordinates and data
#[derive(Debug, Clone)]
pub struct Fit<M> {
    model: M,
    input: AnalysisInput,
}

impl<M: FitModel> Fit<M> {
    /// Bind a model to data
    pub fn new(model: M, coordinates: impl Into<Coordinates>, data: Vec<f64>) -> Result<Self> {
        Ok(Self {
            model,
            input: AnalysisInput::new(coordinates, data)?,
        })
    }

    /// Starting values and vary flags, in model order
    fn starting_point(
        &self,
        coordinates: &Coordinates,
        data: &[f64],
        options: &FitOptions,
    ) -> Result<(Vec<f64>, Vec<bool>)> {
        let names = self.model.param_names();
        if let Some(unknown) = options.params.keys().find(|k| !names.contains(&k.as_str())) {
            return Err(AnalysisError::UnknownParameter(unknown.clone()));
        }

        let guess = self.model.guess(coordinates, data)?;
        let mut initial = Vec::with_capacity(names.len());
        let mut vary = Vec::with_capacity(names.len());
        for name in names {
            let (value, fixed) = match options.params.get(*name) {
                Some(FitParam::Initial(v)) => (Some(*v), false),
                Some(FitParam::Fixed(v)) => (Some(*v), true),
                None => (guess.get(*name).copied(), false),
            };
            let value = value.ok_or_else(|| AnalysisError::MissingInitialValue(name.to_string()))?;
            initial.push(value);
            vary.push(!options.dry && !fixed);
        }
        Ok((initial, vary))
    }
}

impl<M: FitModel> Analysis for Fit<M> {
    type Options = FitOptions;
    type Output = FitResult<M>;

    fn input(&self) -> &AnalysisInput {
        &self.input
    }

    fn analyze(&self, coordinates: &Coordinates, data: &[f64], options: &FitOptions) -> Result<FitResult<M>> {
        check_aligned(coordinates, data)?;
        let (initial, vary) = self.starting_point(coordinates, data, options)?;

        let residuals = |p: &[f64]| -> Result<Vec<f64>> {
            let curve = self.model.model(coordinates, p)?;
            if curve.len() != data.len() {
                return Err(AnalysisError::LengthMismatch {
                    coordinates: curve.len(),
                    data: data.len(),
                });
            }
            Ok(curve.iter().zip(data).map(|(m, d)| m - d).collect())
        };
        let solution = options.solver.minimize(residuals, &initial, &vary)?;

        let dof = solution.points.saturating_sub(solution.free.len());
        let reduced_chi_square = (dof > 0).then(|| solution.cost / dof as f64);

        let mut params = Parameters::new();
        for (i, name) in self.model.param_names().iter().enumerate() {
            let mut param = Parameter::new(*name, solution.params[i])
                .with_attr("init_value", initial[i])
                .with_attr("vary", vary[i]);
            let free_index = solution.free.iter().position(|&f| f == i);
            if let (Some(k), Some(cov), Some(redchi)) = (free_index, &solution.covariance, reduced_chi_square) {
                param = param.with_attr("stderr", (cov[(k, k)] * redchi).max(0.0).sqrt());
            }
            params.add(param);
        }

        tracing::debug!(
            "Fit {} finished: {} iterations, chi-square {:e}",
            self.model.name(),
            solution.iterations,
            solution.cost
        );

        Ok(FitResult {
            model: self.model.clone(),
            params,
            iterations: solution.iterations,
            nfev: solution.nfev,
            chi_square: solution.cost,
            reduced_chi_square,
            dry: options.dry,
        })
    }
}
