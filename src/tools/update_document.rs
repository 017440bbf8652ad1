use super::schema::{FieldSpec, ParamSchema, ValidatedParams};
use super::traits::{Tool, ToolError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Process-local document store. Contents are lost on exit.
#[derive(Default)]
pub struct DocumentStore {
    docs: Mutex<HashMap<String, String>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document. Returns true when it already existed.
    pub fn put(&self, name: &str, content: &str) -> bool {
        self.docs
            .lock()
            .insert(name.to_string(), content.to_string())
            .is_some()
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.docs.lock().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.lock().is_empty()
    }
}

/// Writes a named document into the shared [`DocumentStore`].
pub struct UpdateDocumentTool {
    store: Arc<DocumentStore>,
    schema: ParamSchema,
}

impl UpdateDocumentTool {
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self {
            store,
            schema: ParamSchema::new(vec![
                FieldSpec::string("doc_name")
                    .min_len(1)
                    .describe("Name of the document to update"),
                FieldSpec::string("content")
                    .min_len(1)
                    .describe("New content of the document"),
            ]),
        }
    }
}

#[async_trait]
impl Tool for UpdateDocumentTool {
    fn name(&self) -> &str {
        "update_document"
    }

    fn description(&self) -> &str {
        "Update a document's content"
    }

    fn schema(&self) -> &ParamSchema {
        &self.schema
    }

    async fn execute(&self, params: &ValidatedParams) -> Result<String, ToolError> {
        let (Some(doc_name), Some(content)) = (params.get_str("doc_name"), params.get_str("content"))
        else {
            return Err(ToolError::Other("doc_name and content are required".into()));
        };

        let replaced = self.store.put(doc_name, content);
        tracing::info!(doc_name, replaced, bytes = content.len(), "Document updated");
        Ok(format!("Document \"{doc_name}\" updated successfully."))
    }
}
