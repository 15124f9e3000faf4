//! Interactive parameter prompts

use dialoguer::{Input, Password};
use secrecy::SecretString;

use crate::errors::DeployError;

/// Source of operator answers for fields not given on the command line
pub trait Prompter: Send + Sync {
    /// Ask for a plain value, offering `default` when given
    fn input(&self, label: &str, default: Option<&str>) -> Result<String, DeployError>;

    /// Ask for a secret without echoing it
    fn secret(&self, label: &str) -> Result<SecretString, DeployError>;
}

/// Prompts on the controlling terminal
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn input(&self, label: &str, default: Option<&str>) -> Result<String, DeployError> {
        let mut input = Input::<String>::new().with_prompt(label);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        input
            .interact_text()
            .map_err(|e| DeployError::Prompt(format!("{}: {}", label, e)))
    }

    fn secret(&self, label: &str) -> Result<SecretString, DeployError> {
        Password::new()
            .with_prompt(label)
            .interact()
            .map(SecretString::from)
            .map_err(|e| DeployError::Prompt(format!("{}: {}", label, e)))
    }
}
