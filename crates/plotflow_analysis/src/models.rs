// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fit models for common qubit characterization experiments.

use crate::analysis::Coordinates;
use crate::error::Result;
use crate::fit::FitModel;
use indexmap::IndexMap;
use std::f64::consts::{E, PI};

/// Energy relaxation: `amp * exp(-x / tau)`
#[derive(Debug, Clone, Copy, Default)]
pub struct T1Decay;

impl FitModel for T1Decay {
    fn name(&self) -> &'static str {
        "T1_Decay"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["amp", "tau"]
    }

    fn model(&self, coordinates: &Coordinates, params: &[f64]) -> Result<Vec<f64>> {
        let (amp, tau) = (params[0], params[1]);
        Ok(coordinates.first().iter().map(|x| amp * (-x / tau).exp()).collect())
    }

    fn guess(&self, coordinates: &Coordinates, data: &[f64]) -> Result<IndexMap<String, f64>> {
        let xs = coordinates.first();
        let span = span(xs);
        let amp = match data.first() {
            Some(&first) if first != 0.0 && first.is_finite() => first,
            _ => 1.0,
        };

        // first point that fell below amp / e
        let threshold = amp.abs() / E;
        let tau = xs
            .iter()
            .zip(data)
            .find(|(_, d)| d.abs() <= threshold)
            .map(|(x, _)| x - xs[0])
            .filter(|t| *t > 0.0)
            .unwrap_or(if span > 0.0 { span / 2.0 } else { 1.0 });

        Ok(IndexMap::from([("amp".to_string(), amp), ("tau".to_string(), tau)]))
    }
}

/// Ramsey fringes: `amp * exp(-x / tau) * sin(2π * freq * x + phase)`
#[derive(Debug, Clone, Copy, Default)]
pub struct T2Ramsey;

impl FitModel for T2Ramsey {
    fn name(&self) -> &'static str {
        "T2_Ramsey"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["amp", "tau", "freq", "phase"]
    }

    fn model(&self, coordinates: &Coordinates, params: &[f64]) -> Result<Vec<f64>> {
        let (amp, tau, freq, phase) = (params[0], params[1], params[2], params[3]);
        Ok(coordinates
            .first()
            .iter()
            .map(|x| amp * (-x / tau).exp() * (2.0 * PI * freq * x + phase).sin())
            .collect())
    }

    fn guess(&self, coordinates: &Coordinates, data: &[f64]) -> Result<IndexMap<String, f64>> {
        let xs = coordinates.first();
        let span = span(xs);
        let amp = data.iter().fold(0.0_f64, |acc, d| acc.max(d.abs()));
        let amp = if amp > 0.0 { amp } else { 1.0 };

        let crossings = data
            .windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count();
        let (tau, freq) = if span > 0.0 {
            (span / 2.0, (crossings.max(1) as f64) / (2.0 * span))
        } else {
            (1.0, 1.0)
        };
        let phase = data.first().map_or(0.0, |d| (d / amp).clamp(-1.0, 1.0).asin());

        Ok(IndexMap::from([
            ("amp".to_string(), amp),
            ("tau".to_string(), tau),
            ("freq".to_string(), freq),
            ("phase".to_string(), phase),
        ]))
    }
}

fn span(xs: &[f64]) -> f64 {
    match (xs.first(), xs.last()) {
        (Some(a), Some(b)) => (b - a).abs(),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Analysis;
    use crate::fit::{Fit, FitOptions};
    use crate::result::{AnalysisOutput, ExportedValue};

    fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
        let step = (stop - start) / (n - 1) as f64;
        (0..n).map(|i| start + step * i as f64).collect()
    }

    fn decay_data() -> (Vec<f64>, Vec<f64>) {
        let xs = linspace(0.0, 10.0, 50);
        let ys = xs.iter().map(|x| 2.0 * (-x / 3.0).exp()).collect();
        (xs, ys)
    }

    #[test]
    fn test_t1_fit_recovers_parameters() {
        let (xs, ys) = decay_data();
        let result = Fit::new(T1Decay, xs, ys).unwrap().run(&FitOptions::default()).unwrap();
        assert!((result.value("amp").unwrap() - 2.0).abs() < 1e-3);
        assert!((result.value("tau").unwrap() - 3.0).abs() < 1e-3);
        assert!(result.iterations > 0);
        assert!(!result.dry);
    }

    #[test]
    fn test_t1_fit_from_constant_start() {
        let (xs, ys) = decay_data();
        let options = FitOptions::default().initial("amp", 1.0).initial("tau", 2.0);
        let result = Fit::new(T1Decay, xs, ys).unwrap().run(&options).unwrap();
        assert!((result.value("amp").unwrap() - 2.0).abs() < 1e-3);
        assert!((result.value("tau").unwrap() - 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_t1_dry_fit_keeps_values() {
        let (xs, ys) = decay_data();
        let options = FitOptions::default().dry(true).fixed("amp", 2.0).fixed("tau", 3.0);
        let result = Fit::new(T1Decay, xs.clone(), ys.clone()).unwrap().run(&options).unwrap();
        assert_eq!(result.value("amp"), Some(2.0));
        assert_eq!(result.value("tau"), Some(3.0));
        assert_eq!(result.iterations, 0);
        assert!(result.dry);

        let dict = result.params_to_dict();
        assert_eq!(dict["amp"]["vary"], ExportedValue::Flag(false));
        assert!(!dict["amp"].contains_key("stderr"));

        let curve = result.eval(&Coordinates::single(xs)).unwrap();
        for (c, y) in curve.iter().zip(&ys) {
            assert!((c - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_dry_fit_uses_guess_when_nothing_supplied() {
        let (xs, ys) = decay_data();
        let fit = Fit::new(T1Decay, xs.clone(), ys.clone()).unwrap();
        let guess = T1Decay.guess(&Coordinates::single(xs), &ys).unwrap();
        let result = fit.run(&FitOptions::default().dry(true)).unwrap();
        assert_eq!(result.value("amp"), guess.get("amp").copied());
        assert_eq!(result.value("tau"), guess.get("tau").copied());
        assert_eq!(result.iterations, 0);
    }

    #[test]
    fn test_t2_model_shape() {
        let xs = linspace(0.0, 1.0, 5);
        let curve = T2Ramsey
            .model(&Coordinates::single(xs), &[1.0, 1e9, 0.25, 0.0])
            .unwrap();
        assert!(curve[0].abs() < 1e-12);
        // quarter period at x = 1
        assert!((curve[4] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_t2_fit_with_good_start() {
        let xs = linspace(0.0, 4.0, 200);
        let ys: Vec<f64> = xs
            .iter()
            .map(|x| 0.8 * (-x / 2.0).exp() * (2.0 * PI * 1.5 * x + 0.3).sin())
            .collect();
        let options = FitOptions::default()
            .initial("amp", 0.7)
            .initial("tau", 1.5)
            .initial("freq", 1.45)
            .initial("phase", 0.2);
        let result = Fit::new(T2Ramsey, xs, ys).unwrap().run(&options).unwrap();
        assert!((result.value("freq").unwrap() - 1.5).abs() < 1e-3);
        assert!((result.value("tau").unwrap() - 2.0).abs() < 1e-3);
    }
}
