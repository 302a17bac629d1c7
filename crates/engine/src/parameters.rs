//! Parameter values over a time step.
//!
//! Constant parameters keep their declared value. Time-dependent ones are
//! re-evaluated for every step attempt over its window `[start, end]`:
//!
//! - expressions are sampled at `end`, or averaged over the window when
//!   preintegrated (through the antiderivative if one is given, otherwise by
//!   adaptive Simpson quadrature)
//! - sample tables are interpolated linearly and never extrapolated
//! - field time series pick the frame at `end`, the mean of the two frames
//!   bracketing it, or the nearest end frame outside the recorded range
//!
//! Space-dependent expressions are inlined into the compiled forms and only
//! validated here.

use std::fmt;

use ndarray::Array1;
use ninterp::prelude::*;
use reacdiff_core::{ConfigurationError, Container, Expr, Parameter, ParameterSource};
use reacdiff_mesh::MeshHierarchy;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors evaluating a parameter at a given time.
#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("parameter `{name}` is sampled on [{min}, {max}] and cannot be evaluated at t = {t}")]
    OutOfRange {
        name: String,
        t: f64,
        min: f64,
        max: f64,
    },

    #[error("parameter `{name}` is not finite at t = {t}")]
    NonFinite { name: String, t: f64 },

    #[error("interpolating parameter `{name}` failed: {reason}")]
    Interpolation { name: String, reason: String },
}

/// The interval `[start, end]` covered by one step attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepWindow {
    pub start: f64,
    pub end: f64,
}

impl StepWindow {
    #[must_use]
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// A zero-length window, used before the first step.
    #[must_use]
    pub fn at(t: f64) -> Self {
        Self { start: t, end: t }
    }

    #[must_use]
    pub fn dt(&self) -> f64 {
        self.end - self.start
    }
}

const SIMPSON_TOL: f64 = 1e-12;
const SIMPSON_DEPTH: u32 = 48;

enum Source {
    Constant,
    /// A closed form in `t` only.
    Expression {
        expr: Expr,
        antiderivative: Option<Expr>,
        preintegrate: bool,
    },
    /// A closed form in space, evaluated inside the forms.
    Inline,
    Sampled {
        table: Interp1DOwned<f64, ninterp::strategy::Linear>,
        times: Vec<f64>,
        values: Vec<f64>,
        /// Integral of the piecewise-linear table from the first sample.
        cumulative: Vec<f64>,
        preintegrate: bool,
    },
    /// Frames restricted to the local vertices of one compartment.
    Field {
        times: Vec<f64>,
        frames: Vec<Vec<f64>>,
    },
}

/// Current values of every model parameter.
pub(crate) struct ParameterTable {
    names: Vec<String>,
    sources: Vec<Source>,
    scalars: Vec<f64>,
    fields: Vec<Vec<f64>>,
}

impl fmt::Debug for ParameterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterTable")
            .field("names", &self.names)
            .field("scalars", &self.scalars)
            .finish_non_exhaustive()
    }
}

impl ParameterTable {
    /// Prepares runtime sources for `parameters`.
    ///
    /// Field frames are given per parent-mesh vertex and are restricted here
    /// to the vertices of their compartment.
    pub(crate) fn new(
        parameters: &Container<Parameter>,
        hierarchy: &MeshHierarchy,
    ) -> Result<Self, ConfigurationError> {
        let mut sources = Vec::with_capacity(parameters.len());
        for parameter in parameters {
            sources.push(prepare(parameter, hierarchy)?);
        }
        let table = Self {
            names: parameters.names().map(str::to_owned).collect(),
            scalars: parameters.iter().map(|p| p.value).collect(),
            fields: vec![Vec::new(); parameters.len()],
            sources,
        };
        Ok(table)
    }

    /// Re-evaluates every time-dependent parameter for `window`.
    pub(crate) fn update(&mut self, window: StepWindow) -> Result<(), ParameterError> {
        for (i, source) in self.sources.iter().enumerate() {
            let name = &self.names[i];
            match source {
                Source::Constant | Source::Inline => {}
                Source::Expression {
                    expr,
                    antiderivative,
                    preintegrate,
                } => {
                    let value = if *preintegrate && window.dt() > 0.0 {
                        match antiderivative {
                            Some(anti) => {
                                (eval_at(anti, window.end) - eval_at(anti, window.start))
                                    / window.dt()
                            }
                            None => {
                                simpson(&|t| eval_at(expr, t), window.start, window.end)
                                    / window.dt()
                            }
                        }
                    } else {
                        eval_at(expr, window.end)
                    };
                    self.scalars[i] = finite(name, value, window.end)?;
                }
                Source::Sampled {
                    table,
                    times,
                    values,
                    cumulative,
                    preintegrate,
                } => {
                    let value = if *preintegrate && window.dt() > 0.0 {
                        let integral = |t| integral_to(name, table, times, values, cumulative, t);
                        (integral(window.end)? - integral(window.start)?) / window.dt()
                    } else {
                        interpolate(name, table, times, window.end)?
                    };
                    self.scalars[i] = finite(name, value, window.end)?;
                }
                Source::Field { times, frames } => {
                    self.fields[i] = select_frame(name, times, frames, window.end);
                }
            }
        }
        if self.sources.iter().any(|s| !matches!(s, Source::Constant | Source::Inline)) {
            debug!(start = window.start, end = window.end, "updated time-dependent parameters");
        }
        Ok(())
    }

    pub(crate) fn scalars(&self) -> &[f64] {
        &self.scalars
    }

    /// Per-vertex values of a field parameter; empty for other kinds.
    pub(crate) fn field(&self, index: usize) -> &[f64] {
        &self.fields[index]
    }

    pub(crate) fn value(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.scalars[i])
    }

    /// Resets a constant parameter's value.
    pub(crate) fn set_constant(&mut self, name: &str, value: f64) -> bool {
        match self.names.iter().position(|n| n == name) {
            Some(i) if matches!(self.sources[i], Source::Constant) => {
                self.scalars[i] = value;
                true
            }
            _ => false,
        }
    }
}

fn prepare(parameter: &Parameter, hierarchy: &MeshHierarchy) -> Result<Source, ConfigurationError> {
    let invalid = |reason: String| ConfigurationError::InvalidEntity {
        kind: "parameter",
        name: parameter.name.clone(),
        reason,
    };
    Ok(match &parameter.source {
        ParameterSource::Constant => Source::Constant,
        ParameterSource::Expression { .. } => {
            let Some((expr, antiderivative)) = parameter.expression()? else {
                return Ok(Source::Constant);
            };
            if parameter.is_space_dependent {
                if parameter.use_preintegration && antiderivative.is_none() {
                    return Err(invalid(
                        "preintegrating a space-dependent expression requires an antiderivative"
                            .into(),
                    ));
                }
                Source::Inline
            } else {
                Source::Expression {
                    expr,
                    antiderivative,
                    preintegrate: parameter.use_preintegration,
                }
            }
        }
        ParameterSource::Sampled { samples } => {
            let times: Vec<f64> = samples.iter().map(|s| s.0).collect();
            let values: Vec<f64> = samples.iter().map(|s| s.1).collect();
            let table = Interp1DOwned::new(
                Array1::from(times.clone()),
                Array1::from(values.clone()),
                ninterp::strategy::Linear,
                ninterp::interpolator::Extrapolate::Error,
            )
            .map_err(|e| invalid(e.to_string()))?;
            let mut cumulative = vec![0.0; times.len()];
            for k in 1..times.len() {
                cumulative[k] =
                    cumulative[k - 1] + 0.5 * (times[k] - times[k - 1]) * (values[k] + values[k - 1]);
            }
            Source::Sampled {
                table,
                times,
                values,
                cumulative,
                preintegrate: parameter.use_preintegration,
            }
        }
        ParameterSource::Field {
            compartment,
            times,
            frames,
        } => {
            let child = hierarchy.child(compartment).ok_or_else(|| {
                ConfigurationError::UnknownReference {
                    kind: "parameter",
                    name: parameter.name.clone(),
                    target_kind: "compartment",
                    target: compartment.clone(),
                }
            })?;
            let expected = hierarchy.num_parent_vertices();
            if let Some(frame) = frames.iter().find(|f| f.len() != expected) {
                return Err(invalid(format!(
                    "field frames hold {} values but the mesh has {expected} vertices",
                    frame.len()
                )));
            }
            let frames = frames
                .iter()
                .map(|frame| child.local_to_parent().iter().map(|&p| frame[p]).collect())
                .collect();
            Source::Field {
                times: times.clone(),
                frames,
            }
        }
    })
}

fn eval_at(expr: &Expr, t: f64) -> f64 {
    expr.eval(&|name: &String| if name == "t" { t } else { 0.0 })
}

fn finite(name: &str, value: f64, t: f64) -> Result<f64, ParameterError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ParameterError::NonFinite {
            name: name.to_owned(),
            t,
        })
    }
}

fn check_range(name: &str, times: &[f64], t: f64) -> Result<(), ParameterError> {
    let (min, max) = (times[0], times[times.len() - 1]);
    let slack = 1e-12 * (1.0 + t.abs());
    if t < min - slack || t > max + slack {
        return Err(ParameterError::OutOfRange {
            name: name.to_owned(),
            t,
            min,
            max,
        });
    }
    Ok(())
}

fn interpolate(
    name: &str,
    table: &Interp1DOwned<f64, ninterp::strategy::Linear>,
    times: &[f64],
    t: f64,
) -> Result<f64, ParameterError> {
    check_range(name, times, t)?;
    let t = t.clamp(times[0], times[times.len() - 1]);
    table
        .interpolate(&[t])
        .map_err(|e| ParameterError::Interpolation {
            name: name.to_owned(),
            reason: e.to_string(),
        })
}

/// Exact integral of the piecewise-linear table from its first sample to `t`.
fn integral_to(
    name: &str,
    table: &Interp1DOwned<f64, ninterp::strategy::Linear>,
    times: &[f64],
    values: &[f64],
    cumulative: &[f64],
    t: f64,
) -> Result<f64, ParameterError> {
    let value = interpolate(name, table, times, t)?;
    let t = t.clamp(times[0], times[times.len() - 1]);
    let k = times.partition_point(|&s| s <= t).saturating_sub(1);
    Ok(cumulative[k] + 0.5 * (t - times[k]) * (values[k] + value))
}

fn select_frame(name: &str, times: &[f64], frames: &[Vec<f64>], t: f64) -> Vec<f64> {
    let last = times.len() - 1;
    let close = |a: f64, b: f64| (a - b).abs() <= 1e-12 * (1.0 + a.abs());
    if let Some(k) = times.iter().position(|&s| close(s, t)) {
        return frames[k].clone();
    }
    if t < times[0] || t > times[last] {
        let k = if t < times[0] { 0 } else { last };
        warn!(
            parameter = name,
            t,
            frame_time = times[k],
            "time is outside the recorded field; using the nearest frame"
        );
        return frames[k].clone();
    }
    let k = times.partition_point(|&s| s < t);
    frames[k - 1]
        .iter()
        .zip(&frames[k])
        .map(|(a, b)| 0.5 * (a + b))
        .collect()
}

/// Adaptive Simpson quadrature of `f` over `[a, b]`.
fn simpson(f: &impl Fn(f64) -> f64, a: f64, b: f64) -> f64 {
    let (fa, fm, fb) = (f(a), f(0.5 * (a + b)), f(b));
    let whole = (b - a) / 6.0 * (fa + 4.0 * fm + fb);
    let tol = SIMPSON_TOL * (1.0 + whole.abs());
    refine(f, [a, b], [fa, fm, fb], whole, tol, SIMPSON_DEPTH)
}

fn refine(
    f: &impl Fn(f64) -> f64,
    [a, b]: [f64; 2],
    [fa, fm, fb]: [f64; 3],
    whole: f64,
    tol: f64,
    depth: u32,
) -> f64 {
    let m = 0.5 * (a + b);
    let (flm, frm) = (f(0.5 * (a + m)), f(0.5 * (m + b)));
    let left = (m - a) / 6.0 * (fa + 4.0 * flm + fm);
    let right = (b - m) / 6.0 * (fm + 4.0 * frm + fb);
    let delta = left + right - whole;
    if depth == 0 || delta.abs() <= 15.0 * tol {
        return left + right + delta / 15.0;
    }
    refine(f, [a, m], [fa, flm, fm], left, 0.5 * tol, depth - 1)
        + refine(f, [m, b], [fm, frm, fb], right, 0.5 * tol, depth - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn simpson_integrates_smooth_functions() {
        let integral = simpson(&|t: f64| (-3.0 * t).exp(), 0.0, 2.0);
        assert_relative_eq!(integral, (1.0 - (-6.0f64).exp()) / 3.0, max_relative = 1e-10);
    }

    #[test]
    fn sampled_integral_is_exact_for_linear_pieces() {
        let times = vec![0.0, 1.0, 3.0];
        let values = vec![0.0, 2.0, 2.0];
        let table = Interp1DOwned::new(
            Array1::from(times.clone()),
            Array1::from(values.clone()),
            ninterp::strategy::Linear,
            ninterp::interpolator::Extrapolate::Error,
        )
        .unwrap();
        let cumulative = vec![0.0, 1.0, 5.0];

        let at = |t| integral_to("p", &table, &times, &values, &cumulative, t).unwrap();
        assert_relative_eq!(at(0.5), 0.25);
        assert_relative_eq!(at(1.0), 1.0);
        assert_relative_eq!(at(2.0), 3.0);
        assert_relative_eq!(interpolate("p", &table, &times, 0.25).unwrap(), 0.5);

        let err = interpolate("p", &table, &times, 3.5).unwrap_err();
        assert!(matches!(err, ParameterError::OutOfRange { max, .. } if max == 3.0));
    }

    #[test]
    fn field_frames_are_selected_or_averaged() {
        let times = [0.0, 1.0, 2.0];
        let frames = [vec![0.0, 0.0], vec![2.0, 4.0], vec![4.0, 8.0]];
        assert_eq!(select_frame("f", &times, &frames, 1.0), vec![2.0, 4.0]);
        assert_eq!(select_frame("f", &times, &frames, 1.5), vec![3.0, 6.0]);
        assert_eq!(select_frame("f", &times, &frames, 7.0), vec![4.0, 8.0]);
        assert_eq!(select_frame("f", &times, &frames, -1.0), vec![0.0, 0.0]);
    }

    #[test]
    fn step_window_length() {
        let window = StepWindow::new(0.5, 0.75);
        assert_relative_eq!(window.dt(), 0.25);
        assert_relative_eq!(StepWindow::at(2.0).dt(), 0.0);
    }
}
