//! Search-space definition and conversion between flat name/value maps and
//! typed parameter configurations.
//!
//! Optimizers suggest plain `f64` points. A [`ParameterConfig`] keeps that raw
//! value; casting to the declared [`ParamType`] happens only in
//! [`configs_to_values`], which is what script templates consume.
//!
//! # Example
//!
//! ```
//! use paropt::parameter::{Parameter, ParameterConfig, configs_to_values};
//! use paropt::ParamValue;
//!
//! let threads = Parameter::int("threads", 1, 16);
//! let configs = vec![ParameterConfig::new(threads, 7.6)];
//! let values = configs_to_values(&configs);
//! assert_eq!(values["threads"], ParamValue::Int(8));
//! ```

use core::hash::{Hash, Hasher};
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::param::ParamValue;

/// The declared type of a tunable parameter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// Integer-valued; suggestions are rounded at the config boundary.
    #[default]
    Int,
    /// Real-valued.
    Float,
}

impl core::fmt::Display for ParamType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ParamType::Int => f.write_str("int"),
            ParamType::Float => f.write_str("float"),
        }
    }
}

/// A tunable dimension of an experiment.
///
/// Identity (equality and hashing) is the `(name, minimum, maximum, type)`
/// tuple.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Parameter {
    /// Name used for `${name}` substitution. Unique within an experiment.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type", default)]
    pub kind: ParamType,
    /// Lower bound (inclusive).
    pub minimum: f64,
    /// Upper bound (inclusive).
    pub maximum: f64,
}

impl Parameter {
    /// Creates an integer parameter over `[minimum, maximum]`.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn int(name: impl Into<String>, minimum: i64, maximum: i64) -> Self {
        Self {
            name: name.into(),
            kind: ParamType::Int,
            minimum: minimum as f64,
            maximum: maximum as f64,
        }
    }

    /// Creates a float parameter over `[minimum, maximum]`.
    #[must_use]
    pub fn float(name: impl Into<String>, minimum: f64, maximum: f64) -> Self {
        Self {
            name: name.into(),
            kind: ParamType::Float,
            minimum,
            maximum,
        }
    }

    /// Checks that the bounds are finite and ordered, and whole numbers for
    /// integer parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`] otherwise.
    pub fn validate(&self) -> Result<()> {
        let ordered = self.minimum.is_finite()
            && self.maximum.is_finite()
            && self.minimum <= self.maximum;
        let integral = self.kind == ParamType::Float
            || (self.minimum.fract() == 0.0 && self.maximum.fract() == 0.0);
        if !(ordered && integral) {
            return Err(Error::InvalidBounds {
                name: self.name.clone(),
                minimum: self.minimum,
                maximum: self.maximum,
            });
        }
        Ok(())
    }

    /// Casts a raw suggestion to this parameter's declared type.
    ///
    /// Integer parameters are rounded to the nearest integer and clamped to
    /// the bounds; float values pass through.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn cast(&self, value: f64) -> ParamValue {
        match self.kind {
            ParamType::Int => {
                ParamValue::Int(value.round().clamp(self.minimum, self.maximum) as i64)
            }
            ParamType::Float => ParamValue::Float(value),
        }
    }

    /// Width of the range.
    #[must_use]
    pub fn span(&self) -> f64 {
        self.maximum - self.minimum
    }
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.kind == other.kind
            && self.minimum.to_bits() == other.minimum.to_bits()
            && self.maximum.to_bits() == other.maximum.to_bits()
    }
}

impl Eq for Parameter {}

impl Hash for Parameter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.minimum.to_bits().hash(state);
        self.maximum.to_bits().hash(state);
        self.kind.hash(state);
    }
}

/// A concrete value assigned to one parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterConfig {
    /// The parameter being assigned.
    pub parameter: Parameter,
    /// The raw (uncast) value.
    pub value: f64,
}

impl ParameterConfig {
    /// Creates a new assignment.
    #[must_use]
    pub fn new(parameter: Parameter, value: f64) -> Self {
        Self { parameter, value }
    }

    /// The parameter's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.parameter.name
    }

    /// The value cast to the parameter's declared type.
    #[must_use]
    pub fn cast(&self) -> ParamValue {
        self.parameter.cast(self.value)
    }
}

/// Builds the `name -> (minimum, maximum)` bounds map optimizers consume.
#[must_use]
pub fn parameters_to_bounds(parameters: &[Parameter]) -> BTreeMap<String, (f64, f64)> {
    parameters
        .iter()
        .map(|p| (p.name.clone(), (p.minimum, p.maximum)))
        .collect()
}

/// Converts configurations to a `name -> value` map, casting each value to its
/// parameter's declared type.
#[must_use]
pub fn configs_to_values(configs: &[ParameterConfig]) -> BTreeMap<String, ParamValue> {
    configs
        .iter()
        .map(|c| (c.parameter.name.clone(), c.cast()))
        .collect()
}

/// Converts a flat `name -> value` map into configurations, in declaration
/// order of `parameters`.
///
/// # Errors
///
/// Returns [`Error::UnknownParameter`] if a name has no matching parameter.
pub fn values_to_configs(
    parameters: &[Parameter],
    values: &BTreeMap<String, f64>,
) -> Result<Vec<ParameterConfig>> {
    if let Some(name) = values
        .keys()
        .find(|name| !parameters.iter().any(|p| &p.name == *name))
    {
        return Err(Error::UnknownParameter(name.clone()));
    }
    Ok(parameters
        .iter()
        .filter_map(|p| {
            values
                .get(&p.name)
                .map(|&v| ParameterConfig::new(p.clone(), v))
        })
        .collect())
}

/// Stable string key for a configuration: `#name#value` per parameter, sorted
/// by name, using cast values.
///
/// Two configurations that cast to the same values share a key, so an integer
/// parameter suggested as `4.6` and `5.2` is the same configuration.
#[must_use]
pub fn config_key(configs: &[ParameterConfig]) -> String {
    use core::fmt::Write;

    let mut key = String::new();
    for (name, value) in configs_to_values(configs) {
        let _ = write!(key, "#{name}#{value}");
    }
    key
}

/// A validated, ordered set of parameters with name lookup.
///
/// Points are `f64` slices in declaration order.
#[derive(Clone, Debug)]
pub struct SearchSpace {
    parameters: Vec<Parameter>,
    index: HashMap<String, usize>,
}

impl SearchSpace {
    /// Validates `parameters` and builds the name index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`] or [`Error::DuplicateParameter`].
    pub fn new(parameters: Vec<Parameter>) -> Result<Self> {
        let mut index = HashMap::with_capacity(parameters.len());
        for (i, p) in parameters.iter().enumerate() {
            p.validate()?;
            if index.insert(p.name.clone(), i).is_some() {
                return Err(Error::DuplicateParameter(p.name.clone()));
            }
        }
        Ok(Self { parameters, index })
    }

    /// The parameters in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Number of dimensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Returns `true` if no parameters are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Position of a parameter by name.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Per-dimension `(minimum, maximum)`.
    #[must_use]
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.parameters
            .iter()
            .map(|p| (p.minimum, p.maximum))
            .collect()
    }

    /// Wraps a point into configurations.
    #[must_use]
    pub fn to_configs(&self, point: &[f64]) -> Vec<ParameterConfig> {
        self.parameters
            .iter()
            .zip(point)
            .map(|(p, &v)| ParameterConfig::new(p.clone(), v))
            .collect()
    }

    /// Extracts a point from configurations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownParameter`] for a name outside the space and
    /// [`Error::IncompleteConfig`] if a declared parameter has no value.
    pub fn to_point(&self, configs: &[ParameterConfig]) -> Result<Vec<f64>> {
        let mut point = vec![None; self.parameters.len()];
        for config in configs {
            let pos = self
                .position(config.name())
                .ok_or_else(|| Error::UnknownParameter(config.name().to_string()))?;
            point[pos] = Some(config.value);
        }
        point
            .into_iter()
            .zip(&self.parameters)
            .map(|(v, p)| v.ok_or_else(|| Error::IncompleteConfig(p.name.clone())))
            .collect()
    }
}
