//! Rendering of custom-script sources.
//!
//! Two expression forms are substituted: `${secrets.getValue("name")}`,
//! resolved through the secret manager for the stream's account, and
//! `${name}`, resolved from the stream's template variables. Expressions
//! that cannot be resolved are left untouched.

use super::models::{ArtifactStream, AttributeMapping, CustomScript, ScriptAction};
use crate::collaborators::SecretManager;
use crate::error::{CollectionError, CollectionResult};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

lazy_static! {
    static ref SECRET_EXPRESSION: Regex =
        Regex::new(r#"\$\{\s*secrets\.getValue\(\s*"([^"]+)"\s*\)\s*\}"#)
            .expect("valid secret expression regex");
    static ref VARIABLE_EXPRESSION: Regex =
        Regex::new(r"\$\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}").expect("valid variable regex");
}

/// A custom script ready to be shipped to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedScript {
    pub script: String,
    pub timeout_secs: u64,
    pub mapping: Option<AttributeMapping>,
}

struct ExpressionRenderer<'a> {
    account_id: &'a str,
    variables: &'a BTreeMap<String, String>,
    secrets: &'a dyn SecretManager,
}

impl ExpressionRenderer<'_> {
    fn render(&self, text: &str) -> CollectionResult<String> {
        let mut failure = None;
        let with_secrets = SECRET_EXPRESSION.replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            match self.secrets.resolve_secret(self.account_id, name) {
                Ok(Some(value)) => value,
                Ok(None) => caps[0].to_string(),
                Err(e) => {
                    failure.get_or_insert_with(|| format!("secret '{}': {}", name, e));
                    caps[0].to_string()
                }
            }
        });
        if let Some(message) = failure {
            return Err(CollectionError::InvalidScript(message));
        }

        let rendered = VARIABLE_EXPRESSION.replace_all(&with_secrets, |caps: &Captures| {
            self.variables
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        });
        Ok(rendered.into_owned())
    }
}

fn fetch_versions_script(scripts: &[CustomScript]) -> Option<&CustomScript> {
    scripts
        .iter()
        .find(|s| s.action.is_none() || s.action == Some(ScriptAction::FetchVersions))
}

/// Render the fetch-versions script of a custom stream.
pub fn render_custom_script(
    stream: &ArtifactStream,
    secrets: &dyn SecretManager,
    default_timeout_secs: u64,
) -> CollectionResult<RenderedScript> {
    if stream.account_id.is_empty() {
        return Err(CollectionError::InvalidScript(
            "Account does not exist".to_string(),
        ));
    }
    let empty = Default::default();
    let config = stream.custom.as_ref().unwrap_or(&empty);
    let script = fetch_versions_script(&config.scripts).ok_or_else(|| {
        CollectionError::InvalidScript("Fetch Version script is missing".to_string())
    })?;
    if script.script.trim().is_empty() {
        return Err(CollectionError::InvalidScript(
            "Script string can not be empty".to_string(),
        ));
    }

    let renderer = ExpressionRenderer {
        account_id: &stream.account_id,
        variables: &config.template_variables,
        secrets,
    };

    let timeout_secs = match script.timeout.as_deref() {
        Some(expression) => renderer
            .render(expression)?
            .trim()
            .parse::<u64>()
            .unwrap_or(default_timeout_secs),
        None => default_timeout_secs,
    };

    let mapping = match &script.mapping {
        Some(mapping) => {
            if mapping.artifact_root.is_empty() {
                return Err(CollectionError::InvalidScript(
                    "Artifacts Array Path cannot be empty".to_string(),
                ));
            }
            if mapping.build_no_path.is_empty() {
                return Err(CollectionError::InvalidScript(
                    "BuildNo. Path cannot be empty".to_string(),
                ));
            }
            let mut attributes = BTreeMap::new();
            for (relative_path, mapped) in &mapping.attributes {
                attributes.insert(renderer.render(relative_path)?, renderer.render(mapped)?);
            }
            Some(AttributeMapping {
                artifact_root: renderer.render(&mapping.artifact_root)?,
                build_no_path: renderer.render(&mapping.build_no_path)?,
                attributes,
            })
        }
        None => None,
    };

    Ok(RenderedScript {
        script: renderer.render(&script.script)?,
        timeout_secs,
        mapping,
    })
}
