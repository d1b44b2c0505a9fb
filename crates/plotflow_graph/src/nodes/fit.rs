// SPDX-License-Identifier: MIT OR Apache-2.0
//! Analysis nodes: curve fits and peak search on one-dimensional data.
//!
//! Both nodes forward their input and memoize the last analysis result.
//! The fit node also appends the fitted curve as `<dependent>_fit`.

use crate::data::{DataDict, DataField};
use crate::node::{Node, NodeCategory, NodeCore, NodeError, NodeOutput, NodeType};
use crate::option::{OptionKind, OptionSpec};
use plotflow_analysis::{
    Analysis, AnalysisOutput, AnalysisResult, Coordinates, FindMax, Fit, FitModel, FitOptions, FitResult,
};
use std::any::Any;
use std::fmt;

/// Option naming the dependent to analyze; the first dependent when unset
pub const DEPENDENT: &str = "dependent";

/// Option requesting a dry fit
pub const DRY: &str = "dry";

/// Pick the dependent to analyze and its single axis
fn select_trace(core: &NodeCore, data: &DataDict) -> Result<(String, String), NodeError> {
    let dependent = match core.options().text(DEPENDENT)? {
        Some(dep) => dep.to_string(),
        None => data
            .dependents()
            .into_iter()
            .next()
            .ok_or_else(|| NodeError::invalid_input(core.name(), "no dependent to analyze"))?,
    };
    match data.axes_of(&dependent) {
        Some([axis]) => Ok((dependent, axis.clone())),
        Some(axes) => Err(NodeError::invalid_input(
            core.name(),
            format!("'{dependent}' has {} axes, expected 1", axes.len()),
        )),
        None => Err(NodeError::invalid_input(
            core.name(),
            format!("'{dependent}' is not a dependent"),
        )),
    }
}

fn trace(data: &DataDict, dependent: &str, axis: &str) -> (Vec<f64>, Vec<f64>) {
    let xs = data.values(axis).map(<[f64]>::to_vec).unwrap_or_default();
    let ys = data.values(dependent).map(<[f64]>::to_vec).unwrap_or_default();
    (xs, ys)
}

/// Fits model `M` to the selected dependent
pub struct FitNode<M: FitModel> {
    core: NodeCore,
    model: M,
    last_result: Option<FitResult<M>>,
}

impl<M> FitNode<M>
where
    M: FitModel + Default + fmt::Debug + 'static,
{
    /// Create an instance.
    ///
    /// Besides `dependent` and `dry`, every model parameter is an optional
    /// float option; a set value replaces the model's guess.
    pub fn new(name: &str) -> Self {
        let model = M::default();
        let mut core = NodeCore::new(name, model.name())
            .with_option(DEPENDENT, OptionSpec::text(None))
            .with_option(DRY, OptionSpec::flag(false))
            .with_ui(true);
        for param in model.param_names() {
            core = core.with_option(*param, OptionSpec::new(OptionKind::Float));
        }
        Self {
            core,
            model,
            last_result: None,
        }
    }

    /// Node type for registries, identified by the model name
    pub fn node_type() -> NodeType {
        let model = M::default();
        NodeType::new(model.name(), format!("{} fit", model.name()), NodeCategory::Analysis, |name| {
            Box::new(Self::new(name))
        })
        .with_description(format!("Fit {} to a 1D dependent", model.param_names().join(", ")))
    }

    /// Result of the last successful fit
    pub fn last_result(&self) -> Option<&FitResult<M>> {
        self.last_result.as_ref()
    }

    fn fit_options(&self) -> Result<FitOptions, NodeError> {
        let options = self.core.options();
        let mut fit_options = FitOptions::default().dry(options.flag(DRY)?.unwrap_or(false));
        for param in self.model.param_names() {
            if let Some(value) = options.float(param)? {
                fit_options = fit_options.initial(*param, value);
            }
        }
        Ok(fit_options)
    }
}

impl<M> Node for FitNode<M>
where
    M: FitModel + Default + fmt::Debug + 'static,
{
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn process(&mut self, data_in: Option<&DataDict>) -> Result<Option<NodeOutput>, NodeError> {
        let Some((mut data, (dependent, axis))) = self.core.accept_checked(data_in, select_trace)? else {
            return Ok(None);
        };
        let (xs, ys) = trace(&data, &dependent, &axis);

        let options = self.fit_options()?;
        let result = Fit::new(self.model.clone(), xs.clone(), ys)?.run(&options)?;
        let curve = result.eval(&Coordinates::single(xs))?;
        tracing::debug!(
            "Node {} fitted {} to {}: {:?}",
            self.core.name(),
            self.model.name(),
            dependent,
            result.values()
        );

        let unit = data.field(&dependent).map(|f| f.unit.clone()).unwrap_or_default();
        data.insert_field(
            format!("{dependent}_fit"),
            DataField::new(curve).with_axes(&[axis]).with_unit(unit),
        );
        self.last_result = Some(result);
        Ok(Some(NodeOutput::data_out(data)))
    }
}

impl<M: FitModel + fmt::Debug> fmt::Debug for FitNode<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FitNode")
            .field("core", &self.core)
            .field("model", &self.model)
            .field("fitted", &self.last_result.is_some())
            .finish()
    }
}

/// Locates the maximum of the selected dependent
#[derive(Debug)]
pub struct FindMaxNode {
    core: NodeCore,
    last_result: Option<AnalysisResult>,
}

impl FindMaxNode {
    /// Type identifier
    pub const TYPE_ID: &'static str = "FindMax";

    /// Create an instance
    pub fn new(name: &str) -> Self {
        Self {
            core: NodeCore::new(name, Self::TYPE_ID).with_option(DEPENDENT, OptionSpec::text(None)),
            last_result: None,
        }
    }

    /// Node type for registries
    pub fn node_type() -> NodeType {
        NodeType::new(Self::TYPE_ID, "Find max", NodeCategory::Analysis, |name| {
            Box::new(Self::new(name))
        })
        .with_description("Locate the maximum of a 1D dependent")
    }

    /// Result of the last run: `max_val` and `max_pos`
    pub fn last_result(&self) -> Option<&AnalysisResult> {
        self.last_result.as_ref()
    }
}

impl Node for FindMaxNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn process(&mut self, data_in: Option<&DataDict>) -> Result<Option<NodeOutput>, NodeError> {
        let Some((data, (dependent, axis))) = self.core.accept_checked(data_in, select_trace)? else {
            return Ok(None);
        };
        let (xs, ys) = trace(&data, &dependent, &axis);
        self.last_result = Some(FindMax::new(xs, ys)?.run(&())?);
        Ok(Some(NodeOutput::data_out(data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataKind;
    use crate::option::OptionValue;
    use crate::signal::EventLog;
    use plotflow_analysis::{AnalysisError, ExportedValue, T1Decay};
    use std::rc::Rc;

    fn decay() -> DataDict {
        let xs: Vec<f64> = (0..50).map(|i| 10.0 * f64::from(i) / 49.0).collect();
        let ys = xs.iter().map(|x| 2.0 * (-x / 3.0).exp()).collect();
        DataDict::tabular()
            .with_axis("time", xs)
            .with_dependent("signal", ys, &["time"])
    }

    #[test]
    fn test_fit_node_appends_curve_and_keeps_result() {
        let mut node = FitNode::<T1Decay>::new("t1");
        let data = decay();
        let output = node.process(Some(&data)).unwrap().unwrap();
        let out = output.data().unwrap();

        assert_eq!(out.axes_of("signal_fit").unwrap(), &["time".to_string()]);
        let fitted = out.values("signal_fit").unwrap();
        for (f, y) in fitted.iter().zip(data.values("signal").unwrap()) {
            assert!((f - y).abs() < 1e-4);
        }

        let result = node.last_result().unwrap();
        assert!((result.value("amp").unwrap() - 2.0).abs() < 1e-3);
        assert!((result.value("tau").unwrap() - 3.0).abs() < 1e-3);
        assert!(data.field("signal_fit").is_none());
    }

    #[test]
    fn test_dry_fit_through_options() {
        let mut node = FitNode::<T1Decay>::new("t1");
        node.set_option(DRY, OptionValue::Bool(true)).unwrap();
        node.set_option("amp", OptionValue::Float(2.0)).unwrap();
        node.set_option("tau", OptionValue::Float(3.0)).unwrap();
        node.process(Some(&decay())).unwrap();

        let result = node.last_result().unwrap();
        assert_eq!(result.value("amp"), Some(2.0));
        assert_eq!(result.iterations, 0);
        assert_eq!(result.params_to_dict()["tau"]["vary"], ExportedValue::Flag(false));
    }

    fn grid() -> DataDict {
        DataDict::meshgrid_from_axes(vec![("x", vec![0.0, 1.0]), ("y", vec![0.0, 1.0])])
            .with_dependent("z", vec![1.0, 2.0, 3.0, 4.0], &["x", "y"])
    }

    #[test]
    fn test_fit_needs_one_dimensional_data() {
        let mut node = FitNode::<T1Decay>::new("t1");
        assert_eq!(node.process(Some(&grid())).unwrap(), None);
        assert!(node.last_result().is_none());

        node.set_option(DEPENDENT, OptionValue::from("missing")).unwrap();
        assert_eq!(node.process(Some(&decay())).unwrap(), None);
    }

    #[test]
    fn test_rejected_input_keeps_previous_structure() {
        let log = Rc::new(EventLog::default());
        let mut node = FitNode::<T1Decay>::new("t1");
        node.core_mut().subscribe(log.clone());
        node.process(Some(&decay())).unwrap().unwrap();
        let fitted = node.state().clone();
        assert_eq!(fitted.data_axes, vec!["time".to_string()]);
        log.take();

        assert_eq!(node.process(Some(&grid())).unwrap(), None);
        assert_eq!(node.state(), &fitted);
        assert!(log.is_empty());
        assert!(node.last_result().is_some());

        let mut peak = FindMaxNode::new("peak");
        peak.process(Some(&decay())).unwrap().unwrap();
        let before = peak.state().clone();
        assert_eq!(peak.process(Some(&grid())).unwrap(), None);
        assert_eq!(peak.state(), &before);
        assert_eq!(before.data_type, Some(DataKind::Tabular));
    }

    #[test]
    fn test_find_max_node() {
        let data = DataDict::tabular()
            .with_axis("x", vec![0.0, 1.0, 2.0, 3.0])
            .with_dependent("y", vec![1.0, 5.0, 3.0, 2.0], &["x"]);
        let mut node = FindMaxNode::new("peak");
        let output = node.process(Some(&data)).unwrap().unwrap();
        assert_eq!(output.data(), Some(&data));

        let result = node.last_result().unwrap();
        assert_eq!(result.value("max_val"), Some(5.0));
        assert_eq!(result.value("max_pos"), Some(1.0));

        let nan = DataDict::tabular()
            .with_axis("x", vec![0.0])
            .with_dependent("y", vec![f64::NAN], &["x"]);
        assert_eq!(
            node.process(Some(&nan)).unwrap_err(),
            NodeError::Analysis(AnalysisError::EmptyData)
        );
    }
}
