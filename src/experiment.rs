//! Experiment definitions and their content hash.
//!
//! Two experiments that differ only in `id` hash identically, which is what
//! lets [`Storage::get_or_create_experiment`](crate::storage::Storage::get_or_create_experiment)
//! resolve repeated submissions to one persisted row.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::parameter::{Parameter, SearchSpace};

/// Where trials of an experiment execute.
///
/// Persisted with an explicit discriminator (see [`Compute::kind`]) rather
/// than through type inheritance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Compute {
    /// Local thread pool.
    Local {
        /// Worker threads available to the executor.
        max_threads: u32,
    },
    /// A provisioned cloud instance.
    Ec2 {
        /// Instance family, e.g. `c5`.
        instance_family: String,
        /// Instance model, e.g. `c5.2xlarge`.
        instance_model: String,
        /// Machine image id.
        ami: String,
    },
    /// A PBS Pro batch scheduler.
    #[serde(rename = "pbspro")]
    PbsPro {
        /// CPUs requested per node.
        cpus_per_node: u32,
        /// Walltime string, e.g. `1:00:00`.
        walltime: String,
        /// Extra `#PBS` directives.
        #[serde(default)]
        scheduler_options: String,
        /// Shell run on each worker before tasks.
        #[serde(default)]
        worker_init: String,
    },
}

impl Compute {
    /// Discriminator stored next to the compute payload.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Compute::Local { .. } => "local",
            Compute::Ec2 { .. } => "ec2",
            Compute::PbsPro { .. } => "pbspro",
        }
    }
}

impl Default for Compute {
    fn default() -> Self {
        Compute::Local { max_threads: 8 }
    }
}

/// A tool, its script templates, and the parameters to search.
///
/// # Examples
///
/// ```
/// use paropt::experiment::{Compute, Experiment};
/// use paropt::parameter::Parameter;
///
/// let a = Experiment::new("sleep", "sleep ${secs}")
///     .parameter(Parameter::int("secs", 0, 3))
///     .compute(Compute::Local { max_threads: 2 });
/// let mut b = a.clone();
/// b.id = Some(41);
///
/// assert_eq!(a.content_hash(), b.content_hash());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    /// Storage-assigned id. Not part of the content hash.
    #[serde(default)]
    pub id: Option<u64>,
    /// Name of the tool under test.
    pub tool_name: String,
    /// Body of the main command script.
    #[serde(alias = "command_template_string")]
    pub command_template: String,
    /// Optional script run before the command.
    #[serde(default, alias = "setup_template_string")]
    pub setup_template: Option<String>,
    /// Optional script run after the command.
    #[serde(default, alias = "finish_template_string")]
    pub finish_template: Option<String>,
    /// Searched parameters, in declaration order.
    pub parameters: Vec<Parameter>,
    /// Execution target.
    #[serde(default)]
    pub compute: Compute,
}

/// Hashed view of an experiment: every field except `id`.
#[derive(Serialize)]
struct HashView<'a> {
    tool_name: &'a str,
    parameters: &'a [Parameter],
    command_template: &'a str,
    setup_template: Option<&'a str>,
    finish_template: Option<&'a str>,
    compute: &'a Compute,
}

impl Experiment {
    /// Creates an experiment with no parameters on the default local compute.
    #[must_use]
    pub fn new(tool_name: impl Into<String>, command_template: impl Into<String>) -> Self {
        Self {
            id: None,
            tool_name: tool_name.into(),
            command_template: command_template.into(),
            setup_template: None,
            finish_template: None,
            parameters: Vec::new(),
            compute: Compute::default(),
        }
    }

    /// Appends a parameter.
    #[must_use]
    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Sets the setup script template.
    #[must_use]
    pub fn setup(mut self, template: impl Into<String>) -> Self {
        self.setup_template = Some(template.into());
        self
    }

    /// Sets the finish script template.
    #[must_use]
    pub fn finish(mut self, template: impl Into<String>) -> Self {
        self.finish_template = Some(template.into());
        self
    }

    /// Sets the compute descriptor.
    #[must_use]
    pub fn compute(mut self, compute: Compute) -> Self {
        self.compute = compute;
        self
    }

    /// Validates the parameter set and returns it as a [`SearchSpace`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`] or [`Error::DuplicateParameter`].
    pub fn search_space(&self) -> Result<SearchSpace> {
        SearchSpace::new(self.parameters.clone())
    }

    /// The storage id, or an error if the experiment was never persisted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] when `id` is unset.
    pub fn require_id(&self) -> Result<u64> {
        self.id
            .ok_or_else(|| Error::Storage(format!("experiment '{}' has no id", self.tool_name)))
    }

    /// Hex SHA-256 over every field except `id`.
    #[must_use]
    pub fn content_hash(&self) -> String {
        let view = HashView {
            tool_name: &self.tool_name,
            parameters: &self.parameters,
            command_template: &self.command_template,
            setup_template: self.setup_template.as_deref(),
            finish_template: self.finish_template.as_deref(),
            compute: &self.compute,
        };
        // Serializing plain strings, numbers and enums cannot fail.
        let canonical = serde_json::to_vec(&view).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }

    /// Returns `true` if both experiments hash identically.
    #[must_use]
    pub fn same_definition(&self, other: &Experiment) -> bool {
        self.content_hash() == other.content_hash()
    }
}
