//! Non-strict `$name` / `${name}` substitution and the rendered [`RunConfig`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::experiment::Experiment;
use crate::param::ParamValue;
use crate::parameter::{ParameterConfig, configs_to_values};

/// Substitutes `$name` and `${name}` placeholders from `values`.
///
/// Placeholders without a value are left verbatim and `$$` renders a single
/// `$`, so templates may under-specify or contain ordinary shell variables.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use paropt::template::substitute;
///
/// let mut values = BTreeMap::new();
/// values.insert("secs".to_string(), "3".to_string());
/// assert_eq!(substitute("sleep ${secs}; echo $HOME", &values), "sleep 3; echo $HOME");
/// ```
#[must_use]
pub fn substitute(template: &str, values: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
            continue;
        }

        if let Some(braced) = after.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                let name = &braced[..end];
                if is_identifier(name) {
                    if let Some(value) = values.get(name) {
                        out.push_str(value);
                    } else {
                        out.push_str(&rest[pos..pos + end + 3]);
                    }
                    rest = &braced[end + 1..];
                    continue;
                }
            }
            out.push('$');
            rest = after;
            continue;
        }

        let len = identifier_len(after);
        if len == 0 {
            out.push('$');
            rest = after;
            continue;
        }
        let name = &after[..len];
        match values.get(name) {
            Some(value) => out.push_str(value),
            None => {
                out.push('$');
                out.push_str(name);
            }
        }
        rest = &after[len..];
    }

    out.push_str(rest);
    out
}

fn identifier_len(s: &str) -> usize {
    let mut len = 0;
    for (i, c) in s.char_indices() {
        let ok = if i == 0 {
            c == '_' || c.is_ascii_alphabetic()
        } else {
            c == '_' || c.is_ascii_alphanumeric()
        };
        if !ok {
            break;
        }
        len = i + c.len_utf8();
    }
    len
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && identifier_len(s) == s.len()
}

/// Rendered scripts for one trial plus the context needed to run them.
///
/// Ephemeral; never persisted.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Rendered setup script, if the experiment has one.
    pub setup: Option<String>,
    /// Rendered command script.
    pub command: String,
    /// Rendered finish script, if the experiment has one.
    pub finish: Option<String>,
    /// Cast parameter values used for rendering.
    pub values: BTreeMap<String, ParamValue>,
    /// Snapshot of the experiment being run.
    pub experiment: Experiment,
    /// Directory that receives audit copies of executed scripts.
    pub scripts_dir: PathBuf,
}

impl RunConfig {
    /// Renders all of `experiment`'s templates for `configs`.
    #[must_use]
    pub fn render(
        experiment: &Experiment,
        configs: &[ParameterConfig],
        scripts_dir: impl Into<PathBuf>,
    ) -> Self {
        let values = configs_to_values(configs);
        let strings: BTreeMap<String, String> = values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect();
        Self {
            setup: experiment
                .setup_template
                .as_deref()
                .map(|t| substitute(t, &strings)),
            command: substitute(&experiment.command_template, &strings),
            finish: experiment
                .finish_template
                .as_deref()
                .map(|t| substitute(t, &strings)),
            values,
            experiment: experiment.clone(),
            scripts_dir: scripts_dir.into(),
        }
    }

    /// `name=value` pairs, comma separated; used in logs and error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        self.values
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
