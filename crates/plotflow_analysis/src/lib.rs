// SPDX-License-Identifier: MIT OR Apache-2.0
//! Analysis units for `plotflow`.
//!
//! An analysis is a stateless computation over coordinates and aligned data
//! that produces a named parameter result. This crate provides:
//! - The [`Analysis`] contract and the [`AnalysisResult`] parameter set
//! - Curve fitting through [`FitModel`] and [`Fit`], with dry fits
//! - Levenberg-Marquardt minimization backing the fits, via `levenberg-marquardt`
//! - Concrete units: [`FindMax`], [`T1Decay`], [`T2Ramsey`]

pub mod analysis;
pub mod error;
pub mod find_max;
pub mod fit;
pub mod models;
pub mod optimizer;
pub mod result;

pub use analysis::{Analysis, AnalysisInput, Coordinates};
pub use error::AnalysisError;
pub use find_max::FindMax;
pub use fit::{Fit, FitModel, FitOptions, FitParam, FitResult};
pub use models::{T1Decay, T2Ramsey};
pub use optimizer::LevenbergMarquardt;
pub use result::{AnalysisOutput, AnalysisResult, AttrValue, ExportedValue, Parameter, Parameters, ParamsDict};
