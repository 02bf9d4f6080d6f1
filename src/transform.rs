//! Row transforms between storage rows and the unified task models.
//!
//! Everything here is pure, best-effort mapping. Rows missing their id are
//! skipped (`None`), never an error; every optional column gets an explicit
//! default so the unified types carry no holes. Validation of business rules
//! is the caller's responsibility.

use crate::types::{
    DefinitionDetail, DefinitionPatch, InstancePatch, Role, TaskDefinition, TaskInstance,
    TaskInstanceStatus, TaskOrigin,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Map, Value};
use tracing::warn;

// ---------------------------------------------------------------------------
// Field helpers: the only place raw JSON rows are picked apart.
// ---------------------------------------------------------------------------

fn field<'a>(row: &'a Value, key: &str) -> Option<&'a Value> {
    row.as_object().and_then(|obj| obj.get(key))
}

/// Text column, defaulting missing/null to the empty string.
fn text(row: &Value, key: &str) -> String {
    match field(row, key) {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

/// Non-empty text, or `None`.
fn non_empty_text(row: &Value, key: &str) -> Option<String> {
    let s = text(row, key);
    if s.is_empty() { None } else { Some(s) }
}

/// Optional reference column: null, missing, and empty all read as `None`.
fn opt_text(row: &Value, key: &str) -> Option<String> {
    non_empty_text(row, key)
}

/// Numeric column, defaulting to 0. Accepts numbers and numeric strings.
fn integer(row: &Value, key: &str) -> i64 {
    match field(row, key) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

/// Boolean column, defaulting to false. Accepts booleans and 0/1 integers.
fn boolean(row: &Value, key: &str) -> bool {
    match field(row, key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Timestamp column, defaulting missing or unparsable values to the epoch.
/// Callers treat epoch timestamps as "unset", not a real point in time.
fn timestamp(row: &Value, key: &str) -> DateTime<Utc> {
    field(row, key)
        .and_then(|v| v.as_str())
        .and_then(parse_timestamp)
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Nullable timestamp column.
fn opt_timestamp(row: &Value, key: &str) -> Option<DateTime<Utc>> {
    field(row, key).and_then(|v| v.as_str()).and_then(parse_timestamp)
}

/// Date column, defaulting missing or unparsable values to the epoch date.
fn date(row: &Value, key: &str) -> NaiveDate {
    field(row, key)
        .and_then(|v| v.as_str())
        .and_then(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .or_else(|| parse_timestamp(s).map(|dt| dt.date_naive()))
        })
        .unwrap_or(DateTime::UNIX_EPOCH.date_naive())
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// Build a unified definition from a raw table row.
///
/// The variant id column must be present and non-empty; otherwise the row is
/// skipped and the caller drops it from results.
pub fn definition_from_row(row: &Value, origin: TaskOrigin) -> Option<TaskDefinition> {
    let id = non_empty_text(row, origin.id_column())?;

    let detail = match origin {
        TaskOrigin::Predefined => DefinitionDetail::Predefined {
            service_id: text(row, "service_id"),
            default_responsible_role: Role::parse(&text(row, "default_responsible_role")),
            typical_duration_days: integer(row, "typical_duration_days") as i32,
        },
        TaskOrigin::Case => DefinitionDetail::Case {
            case_id: text(row, "case_id"),
        },
        TaskOrigin::Company => DefinitionDetail::Company {
            company_id: text(row, "company_id"),
        },
    };

    Some(TaskDefinition {
        id,
        task_name: text(row, "task_name"),
        description: text(row, "description"),
        priority: integer(row, "priority") as i32,
        task_category_id: opt_text(row, "task_category_id"),
        document_type_id: opt_text(row, "document_type_id"),
        created_at: timestamp(row, "created_at"),
        updated_at: timestamp(row, "updated_at"),
        detail,
    })
}

/// Inverse of [`definition_from_row`]: a full storage row for the variant's
/// table. Only columns that exist on that table are emitted.
pub fn definition_to_row(def: &TaskDefinition) -> Value {
    let origin = def.origin();
    let mut row = Map::new();
    row.insert(origin.id_column().to_string(), json!(def.id));
    row.insert("task_name".to_string(), json!(def.task_name));
    row.insert("description".to_string(), json!(def.description));
    row.insert("priority".to_string(), json!(def.priority));
    row.insert("task_category_id".to_string(), json!(def.task_category_id));
    row.insert("document_type_id".to_string(), json!(def.document_type_id));
    row.insert("created_at".to_string(), json!(def.created_at.to_rfc3339()));
    row.insert("updated_at".to_string(), json!(def.updated_at.to_rfc3339()));

    match &def.detail {
        DefinitionDetail::Predefined {
            service_id,
            default_responsible_role,
            typical_duration_days,
        } => {
            row.insert("service_id".to_string(), json!(service_id));
            row.insert(
                "default_responsible_role".to_string(),
                json!(default_responsible_role.as_str()),
            );
            row.insert(
                "typical_duration_days".to_string(),
                json!(typical_duration_days),
            );
        }
        DefinitionDetail::Case { case_id } => {
            row.insert("case_id".to_string(), json!(case_id));
        }
        DefinitionDetail::Company { company_id } => {
            row.insert("company_id".to_string(), json!(company_id));
        }
    }

    Value::Object(row)
}

/// Column changes for a partial definition update.
///
/// Only keys present in the patch are emitted, and variant fields are
/// stripped unless they belong to the destination table.
pub fn definition_patch_row(
    patch: &DefinitionPatch,
    origin: TaskOrigin,
    now: DateTime<Utc>,
) -> Value {
    let mut row = Map::new();

    if let Some(ref v) = patch.task_name {
        row.insert("task_name".to_string(), json!(v));
    }
    if let Some(ref v) = patch.description {
        row.insert("description".to_string(), json!(v));
    }
    if let Some(v) = patch.priority {
        row.insert("priority".to_string(), json!(v));
    }
    if let Some(ref v) = patch.task_category_id {
        row.insert("task_category_id".to_string(), json!(v));
    }
    if let Some(ref v) = patch.document_type_id {
        row.insert("document_type_id".to_string(), json!(v));
    }

    match origin {
        TaskOrigin::Predefined => {
            if let Some(ref v) = patch.service_id {
                row.insert("service_id".to_string(), json!(v));
            }
            if let Some(v) = patch.default_responsible_role {
                row.insert("default_responsible_role".to_string(), json!(v.as_str()));
            }
            if let Some(v) = patch.typical_duration_days {
                row.insert("typical_duration_days".to_string(), json!(v));
            }
        }
        TaskOrigin::Case => {
            if let Some(ref v) = patch.case_id {
                row.insert("case_id".to_string(), json!(v));
            }
        }
        TaskOrigin::Company => {
            if let Some(ref v) = patch.company_id {
                row.insert("company_id".to_string(), json!(v));
            }
        }
    }

    row.insert("updated_at".to_string(), json!(now.to_rfc3339()));
    Value::Object(row)
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

/// Build a unified instance from a raw `task_instances` row.
///
/// The origin is derived from whichever definition foreign key is populated,
/// checked in fixed precedence order predefined, case, company. A row with no
/// foreign key set falls back to a predefined origin with an empty id; that
/// default is a last resort and callers must not rely on it.
pub fn instance_from_row(row: &Value) -> Option<TaskInstance> {
    let id = non_empty_text(row, "task_instance_id")?;

    let (origin, origin_task_id) = TaskOrigin::ALL
        .iter()
        .find_map(|o| non_empty_text(row, o.id_column()).map(|fk| (*o, fk)))
        .unwrap_or_else(|| {
            warn!(task_instance_id = %id, "instance row has no definition foreign key");
            (TaskOrigin::Predefined, String::new())
        });

    Some(TaskInstance {
        id,
        task_name: text(row, "task_name"),
        description: text(row, "description"),
        origin,
        origin_task_id,
        status: TaskInstanceStatus::parse_or_default(&text(row, "status")),
        assigned_to: opt_text(row, "assigned_to"),
        start_date: date(row, "start_date"),
        due_date: date(row, "due_date"),
        completed_at: opt_timestamp(row, "completed_at"),
        actual_duration_days: integer(row, "actual_duration_days") as i32,
        priority: integer(row, "priority") as i32,
        active: boolean(row, "active"),
        notes: text(row, "notes"),
        created_at: timestamp(row, "created_at"),
        updated_at: timestamp(row, "updated_at"),
    })
}

/// Inverse of [`instance_from_row`]: a full storage row. Exactly one of the
/// three definition foreign keys is emitted, chosen by the instance's origin.
pub fn instance_to_row(inst: &TaskInstance) -> Value {
    let mut row = Map::new();
    row.insert("task_instance_id".to_string(), json!(inst.id));
    row.insert("task_name".to_string(), json!(inst.task_name));
    row.insert("description".to_string(), json!(inst.description));
    row.insert(inst.origin.id_column().to_string(), json!(inst.origin_task_id));
    row.insert("status".to_string(), json!(inst.status.as_str()));
    row.insert("assigned_to".to_string(), json!(inst.assigned_to));
    row.insert("start_date".to_string(), json!(inst.start_date.to_string()));
    row.insert("due_date".to_string(), json!(inst.due_date.to_string()));
    row.insert(
        "completed_at".to_string(),
        json!(inst.completed_at.map(|t| t.to_rfc3339())),
    );
    row.insert(
        "actual_duration_days".to_string(),
        json!(inst.actual_duration_days),
    );
    row.insert("priority".to_string(), json!(inst.priority));
    row.insert("active".to_string(), json!(inst.active));
    row.insert("notes".to_string(), json!(inst.notes));
    row.insert("created_at".to_string(), json!(inst.created_at.to_rfc3339()));
    row.insert("updated_at".to_string(), json!(inst.updated_at.to_rfc3339()));
    Value::Object(row)
}

/// Column changes for a partial instance update. Only keys present in the
/// patch are emitted, so unset fields are never overwritten.
pub fn instance_patch_row(patch: &InstancePatch, now: DateTime<Utc>) -> Value {
    let mut row = Map::new();

    if let Some(ref v) = patch.task_name {
        row.insert("task_name".to_string(), json!(v));
    }
    if let Some(ref v) = patch.description {
        row.insert("description".to_string(), json!(v));
    }
    if let Some(v) = patch.status {
        row.insert("status".to_string(), json!(v.as_str()));
    }
    if let Some(ref v) = patch.assigned_to {
        row.insert("assigned_to".to_string(), json!(v));
    }
    if let Some(v) = patch.start_date {
        row.insert("start_date".to_string(), json!(v.to_string()));
    }
    if let Some(v) = patch.due_date {
        row.insert("due_date".to_string(), json!(v.to_string()));
    }
    if let Some(ref v) = patch.completed_at {
        row.insert(
            "completed_at".to_string(),
            json!(v.map(|t| t.to_rfc3339())),
        );
    }
    if let Some(v) = patch.actual_duration_days {
        row.insert("actual_duration_days".to_string(), json!(v));
    }
    if let Some(v) = patch.priority {
        row.insert("priority".to_string(), json!(v));
    }
    if let Some(v) = patch.active {
        row.insert("active".to_string(), json!(v));
    }
    if let Some(ref v) = patch.notes {
        row.insert("notes".to_string(), json!(v));
    }

    row.insert("updated_at".to_string(), json!(now.to_rfc3339()));
    Value::Object(row)
}
