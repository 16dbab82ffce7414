//! Procedural layer - reusable workflows and their track record

use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::model::{Procedure, ProcedureInput};
use crate::store::Store;

/// Procedural memory service
pub struct ProceduralLayer {
    store: Arc<Store>,
}

impl ProceduralLayer {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Create a procedure; name is unique per project
    pub fn create(&self, project_id: &str, input: &ProcedureInput) -> Result<Procedure> {
        self.store.procedure_insert(project_id, input)
    }

    /// Lookup by id
    pub fn get(&self, id: &str) -> Result<Option<Procedure>> {
        self.store.procedure_get(id)
    }

    /// Lookup by name
    pub fn get_by_name(&self, project_id: &str, name: &str) -> Result<Option<Procedure>> {
        self.store.procedure_get_by_name(project_id, name)
    }

    /// Find procedures matching a query, most effective first
    pub fn find(&self, project_id: &str, query: &str, k: usize) -> Result<Vec<Procedure>> {
        if k == 0 {
            return Ok(vec![]);
        }
        self.store.procedure_find(project_id, query, k)
    }

    /// Record one execution outcome
    pub fn record_execution(&self, id: &str, success: bool, duration_ms: i64) -> Result<Procedure> {
        if duration_ms < 0 {
            return Err(EngineError::InvalidArgument(
                "duration cannot be negative".to_string(),
            ));
        }
        self.store.procedure_record_execution(id, success, duration_ms)
    }

    /// Delete a procedure
    pub fn delete(&self, id: &str) -> Result<()> {
        self.store.procedure_delete(id)
    }
}
