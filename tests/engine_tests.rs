//! Integration tests for the definition and instance engines over the
//! SQLite backend.

use async_trait::async_trait;
use casetrack::db::SqliteStorage;
use casetrack::definitions::DefinitionService;
use casetrack::error::Error;
use casetrack::instances::InstanceService;
use casetrack::storage::{Filter, Order, Storage, StorageError, Table};
use casetrack::types::{
    DefinitionDetail, DefinitionFilter, DefinitionPatch, DefinitionSort, DefinitionSortField,
    InstanceFilter, InstancePatch, NewDefinition, NewInstance, Role, TaskInstanceStatus,
    TaskOrigin,
};
use chrono::NaiveDate;
use serde_json::Value;
use std::sync::{Arc, Mutex};

fn services() -> (Arc<SqliteStorage>, DefinitionService, InstanceService) {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let definitions = DefinitionService::new(storage.clone());
    let instances = InstanceService::new(storage.clone());
    (storage, definitions, instances)
}

fn predefined(name: &str, service_id: &str) -> NewDefinition {
    NewDefinition {
        task_name: name.to_string(),
        description: String::new(),
        priority: 1,
        task_category_id: None,
        document_type_id: None,
        detail: DefinitionDetail::Predefined {
            service_id: service_id.to_string(),
            default_responsible_role: Role::CaseManager,
            typical_duration_days: 7,
        },
    }
}

fn case_task(name: &str, case_id: &str, priority: i32) -> NewDefinition {
    NewDefinition {
        task_name: name.to_string(),
        description: String::new(),
        priority,
        task_category_id: None,
        document_type_id: None,
        detail: DefinitionDetail::Case {
            case_id: case_id.to_string(),
        },
    }
}

fn company_task(name: &str, company_id: &str) -> NewDefinition {
    NewDefinition {
        task_name: name.to_string(),
        description: String::new(),
        priority: 2,
        task_category_id: None,
        document_type_id: None,
        detail: DefinitionDetail::Company {
            company_id: company_id.to_string(),
        },
    }
}

fn instance_for(origin: TaskOrigin, definition_id: &str, name: &str) -> NewInstance {
    NewInstance {
        task_name: name.to_string(),
        description: String::new(),
        origin,
        origin_task_id: definition_id.to_string(),
        status: None,
        assigned_to: None,
        start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        due_date: NaiveDate::from_ymd_opt(2026, 3, 15).unwrap(),
        priority: 0,
        active: true,
        notes: String::new(),
    }
}

// ---------------------------------------------------------------------------
// Definition queries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_all_origins_query_concatenates_tables_and_count_matches() {
    let (_, definitions, _) = services();
    definitions.create(predefined("Collect documents", "S1")).await.unwrap();
    definitions.create(predefined("Schedule intake", "S1")).await.unwrap();
    definitions.create(case_task("Review evidence", "C1", 3)).await.unwrap();
    definitions.create(company_task("Verify registration", "K1")).await.unwrap();

    let all = definitions
        .list(&DefinitionFilter::default(), None, None)
        .await
        .unwrap();
    assert_eq!(all.len(), 4);
    // Without an explicit sort the result is the per-table concatenation in
    // origin order.
    assert_eq!(all[0].origin(), TaskOrigin::Predefined);
    assert_eq!(all[1].origin(), TaskOrigin::Predefined);
    assert_eq!(all[2].origin(), TaskOrigin::Case);
    assert_eq!(all[3].origin(), TaskOrigin::Company);

    let count = definitions
        .count(&DefinitionFilter::default(), None)
        .await
        .unwrap();
    assert_eq!(count, 4);
}

#[tokio::test]
async fn test_service_filter_applies_only_to_predefined_table() {
    let (_, definitions, _) = services();
    definitions.create(predefined("Collect documents", "S1")).await.unwrap();
    definitions.create(case_task("Review evidence", "C1", 3)).await.unwrap();
    definitions.create(company_task("Verify registration", "K1")).await.unwrap();

    let filter = DefinitionFilter {
        service_id: Some("S-empty".to_string()),
        ..Default::default()
    };

    // Restricted to predefined: the filter excludes everything.
    let restricted = definitions
        .list(&filter, None, Some(TaskOrigin::Predefined))
        .await
        .unwrap();
    assert!(restricted.is_empty());

    // Across all origins the filter is a no-op for case/company tables.
    let all = definitions.list(&filter, None, None).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|d| d.origin() != TaskOrigin::Predefined));

    assert_eq!(definitions.count(&filter, None).await.unwrap(), 2);
    assert_eq!(
        definitions
            .count(&filter, Some(TaskOrigin::Predefined))
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_all_origins_sort_interleaves_tables() {
    let (_, definitions, _) = services();
    definitions.create(predefined("Beta", "S1")).await.unwrap();
    definitions.create(case_task("Alpha", "C1", 1)).await.unwrap();
    definitions.create(company_task("Gamma", "K1")).await.unwrap();

    let sorted = definitions
        .list(
            &DefinitionFilter::default(),
            Some(DefinitionSort {
                field: DefinitionSortField::TaskName,
                ascending: true,
            }),
            None,
        )
        .await
        .unwrap();

    let names: Vec<&str> = sorted.iter().map(|d| d.task_name.as_str()).collect();
    assert_eq!(names, vec!["Alpha", "Beta", "Gamma"]);
}

#[tokio::test]
async fn test_search_filter_matches_name_and_description() {
    let (_, definitions, _) = services();
    definitions.create(case_task("Submit passport form", "C1", 1)).await.unwrap();
    definitions
        .create(NewDefinition {
            description: "Includes PASSPORT copy".to_string(),
            ..company_task("Verify identity", "K1")
        })
        .await
        .unwrap();
    definitions.create(case_task("Unrelated", "C1", 1)).await.unwrap();

    let filter = DefinitionFilter {
        search: Some("passport".to_string()),
        ..Default::default()
    };
    let found = definitions.list(&filter, None, None).await.unwrap();
    assert_eq!(found.len(), 2);
}

// ---------------------------------------------------------------------------
// Definition mutations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_definition_create_get_update_delete() {
    let (_, definitions, _) = services();
    let created = definitions
        .create(case_task("Submit Form", "C1", 3))
        .await
        .unwrap();
    assert_eq!(created.origin(), TaskOrigin::Case);
    assert_eq!(created.priority, 3);

    let fetched = definitions
        .get(TaskOrigin::Case, &created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched, created);

    let patch = DefinitionPatch {
        task_name: Some("Submit Form v2".to_string()),
        priority: Some(5),
        ..Default::default()
    };
    let updated = definitions
        .update(TaskOrigin::Case, &created.id, &patch)
        .await
        .unwrap();
    assert_eq!(updated.task_name, "Submit Form v2");
    assert_eq!(updated.priority, 5);
    // Untouched fields survive the partial update.
    assert_eq!(updated.created_at, created.created_at);
    match updated.detail {
        DefinitionDetail::Case { ref case_id } => assert_eq!(case_id, "C1"),
        _ => panic!("variant changed"),
    }

    definitions.delete(TaskOrigin::Case, &created.id).await.unwrap();
    assert!(definitions
        .get(TaskOrigin::Case, &created.id)
        .await
        .unwrap()
        .is_none());
    // Idempotent delete.
    definitions.delete(TaskOrigin::Case, &created.id).await.unwrap();
}

#[tokio::test]
async fn test_update_missing_definition_is_typed_not_found() {
    let (_, definitions, _) = services();
    let err = definitions
        .update(
            TaskOrigin::Company,
            "missing-id",
            &DefinitionPatch {
                priority: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DefinitionNotFound { ref id } if id == "missing-id"));
}

// ---------------------------------------------------------------------------
// Instance queries and lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_case_definition_to_instance_end_to_end() {
    let (_, definitions, instances) = services();
    let definition = definitions
        .create(case_task("Submit Form", "C1", 3))
        .await
        .unwrap();

    let created = instances
        .create(instance_for(TaskOrigin::Case, &definition.id, "Submit Form"))
        .await
        .unwrap();
    assert_eq!(created.origin, TaskOrigin::Case);
    assert_eq!(created.origin_task_id, definition.id);
    assert_eq!(created.status, TaskInstanceStatus::NotStarted);

    let filter = InstanceFilter {
        case_id_for_origin: Some("C1".to_string()),
        ..Default::default()
    };
    let found = instances.list(&filter, None).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, created.id);
    assert_eq!(instances.count(&filter).await.unwrap(), 1);

    // A different case resolves to no definitions and therefore no instances.
    let other = InstanceFilter {
        case_id_for_origin: Some("C2".to_string()),
        ..Default::default()
    };
    assert!(instances.list(&other, None).await.unwrap().is_empty());
    assert_eq!(instances.count(&other).await.unwrap(), 0);
}

#[tokio::test]
async fn test_toggle_advances_status_and_is_queryable() {
    let (_, definitions, instances) = services();
    let definition = definitions
        .create(case_task("Review evidence", "C1", 2))
        .await
        .unwrap();
    let created = instances
        .create(NewInstance {
            status: Some(TaskInstanceStatus::InProgress),
            ..instance_for(TaskOrigin::Case, &definition.id, "Review evidence")
        })
        .await
        .unwrap();

    let toggled = instances.toggle_status(&created.id).await.unwrap();
    assert_eq!(toggled.status, TaskInstanceStatus::Completed);
    // Toggle never sets completed_at; explicit completion does.
    assert_eq!(toggled.completed_at, None);

    let filter = InstanceFilter {
        statuses: vec![TaskInstanceStatus::Completed],
        ..Default::default()
    };
    let completed = instances.list(&filter, None).await.unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, created.id);

    // Two more toggles complete the cycle back to not_started.
    instances.toggle_status(&created.id).await.unwrap();
    let cycled = instances.toggle_status(&created.id).await.unwrap();
    assert_eq!(cycled.status, TaskInstanceStatus::InProgress);
}

#[tokio::test]
async fn test_instance_partial_update_leaves_other_fields_alone() {
    let (_, definitions, instances) = services();
    let definition = definitions
        .create(company_task("Verify registration", "K1"))
        .await
        .unwrap();
    let created = instances
        .create(NewInstance {
            notes: "initial notes".to_string(),
            priority: 2,
            ..instance_for(TaskOrigin::Company, &definition.id, "Verify registration")
        })
        .await
        .unwrap();

    let updated = instances
        .update(
            &created.id,
            &InstancePatch {
                priority: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.priority, 5);
    assert_eq!(updated.notes, "initial notes");
    assert_eq!(updated.task_name, created.task_name);
    assert_eq!(updated.status, created.status);
    assert_eq!(updated.origin_task_id, definition.id);

    // Explicitly clearing a nullable field.
    let assigned = instances
        .update(
            &created.id,
            &InstancePatch {
                assigned_to: Some(Some("user-7".to_string())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(assigned.assigned_to.as_deref(), Some("user-7"));
    let cleared = instances
        .update(
            &created.id,
            &InstancePatch {
                assigned_to: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(cleared.assigned_to, None);
}

#[tokio::test]
async fn test_deleting_definition_leaves_instance_with_dangling_origin() {
    let (_, definitions, instances) = services();
    let definition = definitions
        .create(case_task("Submit Form", "C1", 1))
        .await
        .unwrap();
    let created = instances
        .create(instance_for(TaskOrigin::Case, &definition.id, "Submit Form"))
        .await
        .unwrap();

    definitions.delete(TaskOrigin::Case, &definition.id).await.unwrap();

    // The instance stays addressable; the origin reference now dangles.
    let fetched = instances.get(&created.id).await.unwrap().unwrap();
    assert_eq!(fetched.origin_task_id, definition.id);

    instances.delete(&created.id).await.unwrap();
    instances.delete(&created.id).await.unwrap();
    assert!(instances.get(&created.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_toggle_missing_instance_is_typed_not_found() {
    let (_, _, instances) = services();
    let err = instances.toggle_status("missing-id").await.unwrap_err();
    assert!(matches!(err, Error::InstanceNotFound { ref id } if id == "missing-id"));
}

// ---------------------------------------------------------------------------
// Short-circuit behavior
// ---------------------------------------------------------------------------

/// Storage wrapper recording which tables were touched.
struct RecordingStorage {
    inner: SqliteStorage,
    touched: Mutex<Vec<Table>>,
}

impl RecordingStorage {
    fn new(inner: SqliteStorage) -> Self {
        Self {
            inner,
            touched: Mutex::new(Vec::new()),
        }
    }

    fn touched(&self) -> Vec<Table> {
        self.touched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Storage for RecordingStorage {
    async fn select(
        &self,
        table: Table,
        filters: &[Filter],
        order: Option<&Order>,
        limit: Option<u32>,
    ) -> Result<Vec<Value>, StorageError> {
        self.touched.lock().unwrap().push(table);
        self.inner.select(table, filters, order, limit).await
    }

    async fn count(&self, table: Table, filters: &[Filter]) -> Result<u64, StorageError> {
        self.touched.lock().unwrap().push(table);
        self.inner.count(table, filters).await
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value, StorageError> {
        self.inner.insert(table, row).await
    }

    async fn update(
        &self,
        table: Table,
        changes: Value,
        key: Filter,
    ) -> Result<Value, StorageError> {
        self.inner.update(table, changes, key).await
    }

    async fn delete(&self, table: Table, key: Filter) -> Result<(), StorageError> {
        self.inner.delete(table, key).await
    }
}

#[tokio::test]
async fn test_empty_origin_resolution_never_queries_instances_table() {
    let sqlite = SqliteStorage::open_in_memory().unwrap();
    let recording = Arc::new(RecordingStorage::new(sqlite));
    let instances = InstanceService::new(recording.clone());

    let filter = InstanceFilter {
        company_id_for_origin: Some("K-empty".to_string()),
        ..Default::default()
    };

    assert!(instances.list(&filter, None).await.unwrap().is_empty());
    assert_eq!(instances.count(&filter).await.unwrap(), 0);

    let touched = recording.touched();
    assert!(touched.contains(&Table::CompanyTasks));
    assert!(!touched.contains(&Table::TaskInstances));
}

#[tokio::test]
async fn test_nonempty_resolution_filters_by_resolved_ids() {
    let sqlite = SqliteStorage::open_in_memory().unwrap();
    let recording = Arc::new(RecordingStorage::new(sqlite));
    let definitions = DefinitionService::new(recording.clone());
    let instances = InstanceService::new(recording.clone());

    let in_service = definitions.create(predefined("Collect documents", "S1")).await.unwrap();
    let other = definitions.create(predefined("Schedule intake", "S2")).await.unwrap();
    instances
        .create(instance_for(TaskOrigin::Predefined, &in_service.id, "Collect documents"))
        .await
        .unwrap();
    instances
        .create(instance_for(TaskOrigin::Predefined, &other.id, "Schedule intake"))
        .await
        .unwrap();

    let filter = InstanceFilter {
        service_id_for_origin: Some("S1".to_string()),
        ..Default::default()
    };
    let found = instances.list(&filter, None).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].origin_task_id, in_service.id);

    let touched = recording.touched();
    assert!(touched.contains(&Table::PredefinedTasks));
    assert!(touched.contains(&Table::TaskInstances));
}
