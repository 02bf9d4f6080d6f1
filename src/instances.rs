//! Instance query engine, mutations, and the status toggle.
//!
//! Instances live in a single table, but three of the filters resolve
//! through a definition table first: "instances for service X" looks up
//! predefined task ids for X, then constrains the matching foreign key to
//! that id set. An empty id set short-circuits the whole query.

use crate::error::{Error, Result};
use crate::storage::{Filter, Order, Storage, StorageError, Table};
use crate::transform::{instance_from_row, instance_patch_row, instance_to_row};
use crate::types::{
    InstanceFilter, InstancePatch, InstanceSort, NewInstance, TaskInstance, TaskInstanceStatus,
    TaskOrigin,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Query and mutation surface for task instances.
#[derive(Clone)]
pub struct InstanceService {
    storage: Arc<dyn Storage>,
}

impl InstanceService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Filters that apply directly to instance table columns.
    fn direct_filters(filter: &InstanceFilter) -> Vec<Filter> {
        let mut filters = Vec::new();

        if let Some(ref v) = filter.assigned_to {
            filters.push(Filter::Eq("assigned_to", json!(v)));
        }
        if !filter.statuses.is_empty() {
            filters.push(Filter::In(
                "status",
                filter.statuses.iter().map(|s| json!(s.as_str())).collect(),
            ));
        }
        if !filter.priorities.is_empty() {
            filters.push(Filter::In(
                "priority",
                filter.priorities.iter().map(|p| json!(p)).collect(),
            ));
        }
        if let Some(v) = filter.active {
            filters.push(Filter::Eq("active", json!(v)));
        }
        if let Some(ref term) = filter.search {
            if !term.is_empty() {
                filters.push(Filter::Search {
                    columns: vec!["task_name", "description"],
                    term: term.clone(),
                });
            }
        }

        filters
    }

    /// Resolve one dimension value to the definition ids it owns.
    async fn resolve_definition_ids(
        &self,
        origin: TaskOrigin,
        dimension_value: &str,
    ) -> Result<Vec<Value>> {
        let rows = self
            .storage
            .select(
                origin.table(),
                &[Filter::Eq(origin.dimension_column(), json!(dimension_value))],
                None,
                None,
            )
            .await
            .map_err(Error::storage("resolve origin filter"))?;

        Ok(rows
            .iter()
            .filter_map(|row| row.get(origin.id_column()))
            .filter(|v| v.as_str().is_some_and(|s| !s.is_empty()))
            .cloned()
            .collect())
    }

    /// Build the full instance filter set, resolving origin filters first.
    /// Returns `None` when a resolution came back empty: the overall result
    /// is known to be empty and the instance table is never queried.
    async fn resolve_filters(&self, filter: &InstanceFilter) -> Result<Option<Vec<Filter>>> {
        let mut filters = Self::direct_filters(filter);

        let dimensions = [
            (TaskOrigin::Predefined, filter.service_id_for_origin.as_ref()),
            (TaskOrigin::Case, filter.case_id_for_origin.as_ref()),
            (TaskOrigin::Company, filter.company_id_for_origin.as_ref()),
        ];

        for (origin, value) in dimensions {
            let Some(value) = value else { continue };
            let ids = self.resolve_definition_ids(origin, value).await?;
            if ids.is_empty() {
                debug!(
                    origin = origin.as_str(),
                    dimension = value.as_str(),
                    "origin filter resolved to no definitions, short-circuiting"
                );
                return Ok(None);
            }
            filters.push(Filter::In(origin.id_column(), ids));
        }

        Ok(Some(filters))
    }

    /// List instances matching the filter. Default sort field is
    /// `created_at`; direction comes from the request.
    pub async fn list(
        &self,
        filter: &InstanceFilter,
        sort: Option<InstanceSort>,
    ) -> Result<Vec<TaskInstance>> {
        let Some(filters) = self.resolve_filters(filter).await? else {
            return Ok(Vec::new());
        };

        let order = Order {
            column: sort.map(|s| s.field.column()).unwrap_or("created_at"),
            ascending: sort.map(|s| s.ascending).unwrap_or(false),
        };

        let rows = self
            .storage
            .select(Table::TaskInstances, &filters, Some(&order), None)
            .await
            .map_err(Error::storage("list instances"))?;

        Ok(rows.iter().filter_map(instance_from_row).collect())
    }

    /// Count instances matching the filter. Repeats the same resolution
    /// steps as `list`; counting is not a cheaper code path.
    pub async fn count(&self, filter: &InstanceFilter) -> Result<u64> {
        let Some(filters) = self.resolve_filters(filter).await? else {
            return Ok(0);
        };

        self.storage
            .count(Table::TaskInstances, &filters)
            .await
            .map_err(Error::storage("count instances"))
    }

    /// Fetch a single instance by id.
    pub async fn get(&self, id: &str) -> Result<Option<TaskInstance>> {
        let rows = self
            .storage
            .select(
                Table::TaskInstances,
                &[Filter::Eq("task_instance_id", json!(id))],
                None,
                Some(1),
            )
            .await
            .map_err(Error::storage("get instance"))?;
        Ok(rows.first().and_then(instance_from_row))
    }

    /// Create an instance referencing an existing definition. The origin tag
    /// decides which foreign key column is written.
    pub async fn create(&self, new: NewInstance) -> Result<TaskInstance> {
        let now = Utc::now();
        let inst = TaskInstance {
            id: Uuid::now_v7().to_string(),
            task_name: new.task_name,
            description: new.description,
            origin: new.origin,
            origin_task_id: new.origin_task_id,
            status: new.status.unwrap_or(TaskInstanceStatus::NotStarted),
            assigned_to: new.assigned_to,
            start_date: new.start_date,
            due_date: new.due_date,
            completed_at: None,
            actual_duration_days: 0,
            priority: new.priority,
            active: new.active,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        };

        let stored = self
            .storage
            .insert(Table::TaskInstances, instance_to_row(&inst))
            .await
            .map_err(Error::storage("create instance"))?;

        instance_from_row(&stored).ok_or(Error::MalformedRow {
            op: "create instance",
        })
    }

    /// Apply a partial update; only keys present in the patch are written.
    pub async fn update(&self, id: &str, patch: &InstancePatch) -> Result<TaskInstance> {
        let changes = instance_patch_row(patch, Utc::now());
        let stored = self
            .storage
            .update(
                Table::TaskInstances,
                changes,
                Filter::Eq("task_instance_id", json!(id)),
            )
            .await
            .map_err(|e| match e {
                StorageError::NotFound => Error::InstanceNotFound { id: id.to_string() },
                e => Error::Storage {
                    op: "update instance",
                    source: e,
                },
            })?;

        instance_from_row(&stored).ok_or(Error::MalformedRow {
            op: "update instance",
        })
    }

    /// Delete an instance. Deleting an already-absent id is tolerated.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.storage
            .delete(
                Table::TaskInstances,
                Filter::Eq("task_instance_id", json!(id)),
            )
            .await
            .map_err(Error::storage("delete instance"))
    }

    /// Advance an instance one step along the fixed toggle cycle. This is a
    /// plain status update; it does not set `completed_at` — that stays with
    /// callers that explicitly complete a task.
    pub async fn toggle_status(&self, id: &str) -> Result<TaskInstance> {
        let inst = self
            .get(id)
            .await?
            .ok_or_else(|| Error::InstanceNotFound { id: id.to_string() })?;

        let patch = InstancePatch {
            status: Some(inst.status.toggled()),
            ..Default::default()
        };
        self.update(id, &patch).await
    }
}
