//! Memory operations exposed to the model as tools.
//!
//! Every tool is bound to one (agent, user) pair and one category when the
//! turn starts, so the model can only reach the current agent's partition.

use crate::error::MemoryError;
use crate::memory::{MemoryCategory, MemoryEntry, MemoryStore};
use async_trait::async_trait;
use recall_ai::{Tool, ToolDefinition, ToolError};
use recall_core::{AgentAddress, MemoryEntryId, UserAddress};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemoryOp {
    Save,
    List,
    Delete,
}

/// A single memory tool bound to one agent/user pair and category.
pub struct MemoryTool {
    store: Arc<dyn MemoryStore>,
    agent: AgentAddress,
    user: UserAddress,
    category: MemoryCategory,
    op: MemoryOp,
}

/// Builds the save/list/delete tools for every memory category.
#[must_use]
pub fn memory_tools(
    store: &Arc<dyn MemoryStore>,
    agent: &AgentAddress,
    user: &UserAddress,
) -> Vec<Arc<dyn Tool>> {
    let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
    for category in MemoryCategory::ALL {
        for op in [MemoryOp::Save, MemoryOp::List, MemoryOp::Delete] {
            tools.push(Arc::new(MemoryTool {
                store: Arc::clone(store),
                agent: agent.clone(),
                user: user.clone(),
                category,
                op,
            }));
        }
    }
    tools
}

impl MemoryTool {
    fn name(&self) -> &'static str {
        match (self.op, self.category) {
            (MemoryOp::Save, MemoryCategory::Todo) => "save_todo",
            (MemoryOp::List, MemoryCategory::Todo) => "list_todos",
            (MemoryOp::Delete, MemoryCategory::Todo) => "delete_todo",
            (MemoryOp::Save, MemoryCategory::Knowledge) => "save_knowledge",
            (MemoryOp::List, MemoryCategory::Knowledge) => "list_knowledge",
            (MemoryOp::Delete, MemoryCategory::Knowledge) => "delete_knowledge",
        }
    }

    fn noun(&self) -> &'static str {
        match self.category {
            MemoryCategory::Todo => "todo",
            MemoryCategory::Knowledge => "knowledge entry",
        }
    }

    fn store_error(&self, err: MemoryError) -> ToolError {
        match err {
            MemoryError::NotFound { .. } => ToolError::failed(self.name(), err.to_string()),
            MemoryError::StorageFailed { .. } => ToolError::fatal(self.name(), err.to_string()),
        }
    }

    fn string_arg<'a>(&self, input: &'a JsonValue, key: &str) -> Result<&'a str, ToolError> {
        input
            .get(key)
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ToolError::invalid_input(self.name(), format!("'{key}' is required")))
    }
}

fn entry_json(entry: &MemoryEntry) -> JsonValue {
    json!({
        "id": entry.id.to_string(),
        "content": entry.content,
        "user": entry.user,
        "created": entry.created_at,
        "deleted": entry.deleted_at,
    })
}

#[async_trait]
impl Tool for MemoryTool {
    fn definition(&self) -> ToolDefinition {
        let noun = self.noun();
        match self.op {
            MemoryOp::Save => ToolDefinition::new(self.name(), format!("Saves a new {noun}."))
                .with_input_schema(json!({
                    "type": "object",
                    "properties": {
                        "content": {
                            "type": "string",
                            "description": format!("The text of the {noun}.")
                        }
                    },
                    "required": ["content"]
                })),
            MemoryOp::List => ToolDefinition::new(
                self.name(),
                format!(
                    "Lists every saved {noun}, oldest first. Entries with a non-null 'deleted' \
                     have been deleted."
                ),
            ),
            MemoryOp::Delete => ToolDefinition::new(self.name(), format!("Deletes a {noun} by id."))
                .with_input_schema(json!({
                    "type": "object",
                    "properties": {
                        "id": {
                            "type": "string",
                            "description": format!("The id of the {noun}, as returned by the list tool.")
                        }
                    },
                    "required": ["id"]
                })),
        }
    }

    async fn execute(&self, input: JsonValue) -> Result<JsonValue, ToolError> {
        match self.op {
            MemoryOp::Save => {
                let content = self.string_arg(&input, "content")?;
                let entry = self
                    .store
                    .save(&self.agent, &self.user, self.category, content)
                    .await
                    .map_err(|e| self.store_error(e))?;
                Ok(entry_json(&entry))
            }
            MemoryOp::List => {
                let entries = self
                    .store
                    .list(&self.agent)
                    .await
                    .map_err(|e| self.store_error(e))?;
                let listed: Vec<_> = entries
                    .iter()
                    .filter(|e| e.category == self.category)
                    .map(entry_json)
                    .collect();
                Ok(json!({ "entries": listed }))
            }
            MemoryOp::Delete => {
                let raw = self.string_arg(&input, "id")?;
                let id: MemoryEntryId = raw
                    .parse()
                    .map_err(|e: recall_core::ParseIdError| {
                        ToolError::invalid_input(self.name(), e.to_string())
                    })?;
                let in_category = self
                    .store
                    .list(&self.agent)
                    .await
                    .map_err(|e| self.store_error(e))?
                    .iter()
                    .any(|e| e.id == id && e.category == self.category);
                if !in_category {
                    return Err(self.store_error(MemoryError::NotFound {
                        id,
                        agent: self.agent.clone(),
                    }));
                }

                let entry = self
                    .store
                    .delete(&self.agent, id)
                    .await
                    .map_err(|e| self.store_error(e))?;
                Ok(json!({ "deleted": entry.id.to_string() }))
            }
        }
    }
}
