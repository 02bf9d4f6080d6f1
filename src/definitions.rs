//! Definition query engine and mutations.
//!
//! One logical request fans out across the three definition tables, applies
//! only the filters valid for each table, transforms rows into the unified
//! shape, and merges the results. Mutations route a variant-tagged payload
//! to the single matching table.

use crate::error::{Error, Result};
use crate::storage::{Filter, Order, Storage, StorageError};
use crate::transform::{definition_from_row, definition_patch_row, definition_to_row};
use crate::types::{
    DefinitionFilter, DefinitionPatch, DefinitionSort, DefinitionSortField, NewDefinition,
    TaskDefinition, TaskOrigin,
};
use chrono::Utc;
use serde_json::json;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Comparator for the client-side merge re-sort. Only used when a request
/// spans all origins; single-origin queries rely on storage ordering alone.
fn compare_definitions(
    a: &TaskDefinition,
    b: &TaskDefinition,
    field: DefinitionSortField,
    ascending: bool,
) -> Ordering {
    let ord = match field {
        DefinitionSortField::TaskName => a.task_name.cmp(&b.task_name),
        DefinitionSortField::Priority => a.priority.cmp(&b.priority),
        DefinitionSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        DefinitionSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    };
    if ascending { ord } else { ord.reverse() }
}

/// Query and mutation surface for task definitions.
#[derive(Clone)]
pub struct DefinitionService {
    storage: Arc<dyn Storage>,
}

impl DefinitionService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Build the filters valid for one origin's table. Common filters always
    /// apply; a dimension filter applies only to its own table and is
    /// silently a no-op against the other two.
    fn table_filters(filter: &DefinitionFilter, origin: TaskOrigin) -> Vec<Filter> {
        let mut filters = Vec::new();

        if let Some(ref term) = filter.search {
            if !term.is_empty() {
                filters.push(Filter::Search {
                    columns: vec!["task_name", "description"],
                    term: term.clone(),
                });
            }
        }
        if !filter.priorities.is_empty() {
            filters.push(Filter::In(
                "priority",
                filter.priorities.iter().map(|p| json!(p)).collect(),
            ));
        }
        if let Some(ref v) = filter.task_category_id {
            filters.push(Filter::Eq("task_category_id", json!(v)));
        }
        if let Some(ref v) = filter.document_type_id {
            filters.push(Filter::Eq("document_type_id", json!(v)));
        }

        let dimension = match origin {
            TaskOrigin::Predefined => filter.service_id.as_ref(),
            TaskOrigin::Case => filter.case_id.as_ref(),
            TaskOrigin::Company => filter.company_id.as_ref(),
        };
        if let Some(v) = dimension {
            filters.push(Filter::Eq(origin.dimension_column(), json!(v)));
        }

        filters
    }

    fn target_origins(origin: Option<TaskOrigin>) -> Vec<TaskOrigin> {
        match origin {
            Some(o) => vec![o],
            None => TaskOrigin::ALL.to_vec(),
        }
    }

    /// List definitions matching the filter, optionally restricted to one
    /// origin. With no explicit sort, each table is ordered by `created_at`
    /// descending and the results are concatenated in origin order.
    pub async fn list(
        &self,
        filter: &DefinitionFilter,
        sort: Option<DefinitionSort>,
        origin: Option<TaskOrigin>,
    ) -> Result<Vec<TaskDefinition>> {
        let origins = Self::target_origins(origin);
        let order = Order {
            column: sort.map(|s| s.field.column()).unwrap_or("created_at"),
            ascending: sort.map(|s| s.ascending).unwrap_or(false),
        };

        let mut merged = Vec::new();
        for o in &origins {
            let filters = Self::table_filters(filter, *o);
            debug!(origin = o.as_str(), filters = filters.len(), "definition query");
            let rows = self
                .storage
                .select(o.table(), &filters, Some(&order), None)
                .await
                .map_err(Error::storage("list definitions"))?;
            merged.extend(rows.iter().filter_map(|row| definition_from_row(row, *o)));
        }

        // Per-table ordering alone does not interleave across tables, so the
        // merged list is re-sorted when the request spanned every origin and
        // an explicit sort was given. The stable sort keeps ties in
        // concatenation order (predefined, case, company).
        if origins.len() > 1 {
            if let Some(sort) = sort {
                merged.sort_by(|a, b| compare_definitions(a, b, sort.field, sort.ascending));
            }
        }

        Ok(merged)
    }

    /// Count definitions matching the filter: one count per target table,
    /// summed. No rows are transformed.
    pub async fn count(
        &self,
        filter: &DefinitionFilter,
        origin: Option<TaskOrigin>,
    ) -> Result<u64> {
        let mut total = 0;
        for o in Self::target_origins(origin) {
            let filters = Self::table_filters(filter, o);
            total += self
                .storage
                .count(o.table(), &filters)
                .await
                .map_err(Error::storage("count definitions"))?;
        }
        Ok(total)
    }

    /// Fetch a single definition by origin and id.
    pub async fn get(&self, origin: TaskOrigin, id: &str) -> Result<Option<TaskDefinition>> {
        let rows = self
            .storage
            .select(
                origin.table(),
                &[Filter::Eq(origin.id_column(), json!(id))],
                None,
                Some(1),
            )
            .await
            .map_err(Error::storage("get definition"))?;
        Ok(rows.first().and_then(|row| definition_from_row(row, origin)))
    }

    /// Create a definition in the table matching its variant.
    pub async fn create(&self, new: NewDefinition) -> Result<TaskDefinition> {
        let now = Utc::now();
        let def = TaskDefinition {
            id: Uuid::now_v7().to_string(),
            task_name: new.task_name,
            description: new.description,
            priority: new.priority,
            task_category_id: new.task_category_id,
            document_type_id: new.document_type_id,
            created_at: now,
            updated_at: now,
            detail: new.detail,
        };
        let origin = def.origin();

        let stored = self
            .storage
            .insert(origin.table(), definition_to_row(&def))
            .await
            .map_err(Error::storage("create definition"))?;

        definition_from_row(&stored, origin).ok_or(Error::MalformedRow {
            op: "create definition",
        })
    }

    /// Apply a partial update. Variant fields that do not belong to the
    /// target table are stripped before the write.
    pub async fn update(
        &self,
        origin: TaskOrigin,
        id: &str,
        patch: &DefinitionPatch,
    ) -> Result<TaskDefinition> {
        let changes = definition_patch_row(patch, origin, Utc::now());
        let stored = self
            .storage
            .update(
                origin.table(),
                changes,
                Filter::Eq(origin.id_column(), json!(id)),
            )
            .await
            .map_err(|e| match e {
                StorageError::NotFound => Error::DefinitionNotFound { id: id.to_string() },
                e => Error::Storage {
                    op: "update definition",
                    source: e,
                },
            })?;

        definition_from_row(&stored, origin).ok_or(Error::MalformedRow {
            op: "update definition",
        })
    }

    /// Delete a definition. Deleting an absent id is tolerated silently, and
    /// existing instances keep their (now dangling) origin reference.
    pub async fn delete(&self, origin: TaskOrigin, id: &str) -> Result<()> {
        self.storage
            .delete(origin.table(), Filter::Eq(origin.id_column(), json!(id)))
            .await
            .map_err(Error::storage("delete definition"))
    }
}
