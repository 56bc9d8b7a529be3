//! The house selection tool and its executor.
//!
//! The model calls `select_houses` with the ids of the houses it is talking
//! about. The tool only validates the ids and answers `{"success": true}`;
//! the widget reacts to the call by showing those houses.

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::instrument;

use mood_core::{Catalog, HouseId};

use super::types::Tool;

/// Name of the selection tool as the model sees it.
pub const SELECT_HOUSES_TOOL: &str = "select_houses";

/// Errors raised while running a tool call.
///
/// These are reported back to the model as an error tool result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// The model asked for a tool that does not exist.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The input does not have the `{"house_ids": [string]}` shape.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An id is not a house in the catalog.
    #[error("unknown house id: {0}")]
    UnknownHouse(String),
}

/// Input of the selection tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionInput {
    /// Ids of the selected houses. May be empty.
    pub house_ids: Vec<HouseId>,
}

/// Output of the selection tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionOutput {
    pub success: bool,
}

/// Build the selection tool definition for `catalog`.
///
/// The schema's enum is generated from the catalog's house ids, so the
/// model is only offered ids that exist.
#[must_use]
pub fn selection_tool(catalog: &Catalog) -> Tool {
    let ids: Vec<&str> = catalog.house_ids().map(HouseId::as_str).collect();

    Tool {
        name: SELECT_HOUSES_TOOL.to_string(),
        description: "Selecciona las casas que cumplen con los requisitos del usuario dados los IDs de las casas seleccionadas".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "house_ids": {
                    "type": "array",
                    "description": "IDs of the selected houses",
                    "items": {
                        "type": "string",
                        "enum": ids
                    }
                }
            },
            "required": ["house_ids"]
        }),
    }
}

/// Validate raw tool input against `catalog`.
///
/// # Errors
///
/// Returns `InvalidInput` if the shape is wrong and `UnknownHouse` for the
/// first id that is not a house in the catalog.
pub fn validate_selection(
    catalog: &Catalog,
    input: &serde_json::Value,
) -> Result<SelectionInput, SelectionError> {
    let selection = SelectionInput::deserialize(input)
        .map_err(|e| SelectionError::InvalidInput(e.to_string()))?;

    if let Some(unknown) = selection
        .house_ids
        .iter()
        .find(|id| !catalog.contains_house(id.as_str()))
    {
        return Err(SelectionError::UnknownHouse(unknown.to_string()));
    }

    Ok(selection)
}

/// Executes tool calls against the catalog.
pub struct ToolExecutor<'a> {
    catalog: &'a Catalog,
}

impl<'a> ToolExecutor<'a> {
    /// Create a new tool executor.
    #[must_use]
    pub const fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Execute a tool and return its JSON output.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool is unknown or its input fails validation.
    #[instrument(skip(self, input), fields(tool_name = %name))]
    pub fn execute(
        &self,
        name: &str,
        input: &serde_json::Value,
    ) -> Result<serde_json::Value, SelectionError> {
        match name {
            SELECT_HOUSES_TOOL => {
                let selection = validate_selection(self.catalog, input)?;
                tracing::info!(house_ids = ?selection.house_ids, "Houses selected");
                Ok(json!(SelectionOutput { success: true }))
            }
            other => Err(SelectionError::UnknownTool(other.to_string())),
        }
    }
}
