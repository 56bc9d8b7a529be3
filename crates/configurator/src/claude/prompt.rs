//! System prompt for the house configurator assistant.

use std::sync::Arc;

use askama::Template;
use mood_core::Catalog;

use super::error::ClaudeError;
use super::types::SystemBlock;

/// Instructions template for the configurator assistant.
#[derive(Template)]
#[template(path = "claude/system_prompt.txt")]
struct InstructionsTemplate;

/// Render the instructions template.
fn render_instructions() -> String {
    // Static template with no variables.
    InstructionsTemplate.render().unwrap_or_else(|_| {
        String::from("Eres un asistente de MOOD que ayuda a elegir viviendas modulares.")
    })
}

/// Instructions plus the catalog they refer to.
///
/// The catalog is kept as a reference and only serialized when the request
/// is built, so every request sees the same data the selection tool
/// validates against.
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    instructions: String,
    catalog: Arc<Catalog>,
}

impl SystemPrompt {
    /// The configurator instructions for `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            instructions: render_instructions(),
            catalog,
        }
    }

    /// Custom instructions for `catalog`.
    #[must_use]
    pub fn with_instructions(instructions: impl Into<String>, catalog: Arc<Catalog>) -> Self {
        Self {
            instructions: instructions.into(),
            catalog,
        }
    }

    /// The rendered instructions.
    #[must_use]
    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// The catalog the prompt refers to.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Build the system blocks: instructions first, then the catalog as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be serialized.
    pub fn to_blocks(&self) -> Result<Vec<SystemBlock>, ClaudeError> {
        let catalog_json = serde_json::to_string(&*self.catalog)
            .map_err(|e| ClaudeError::Request(format!("Failed to serialize catalog: {e}")))?;

        Ok(vec![
            SystemBlock {
                text: self.instructions.clone(),
            },
            SystemBlock {
                text: format!("CATÁLOGO (JSON):\n{catalog_json}"),
            },
        ])
    }
}
