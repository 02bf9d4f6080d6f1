//! Core types for the casetrack task engine.
//!
//! A logical task definition can live in one of three physical tables
//! (service-level predefined tasks, case-specific tasks, company-specific
//! tasks). `TaskOrigin` is the discriminant tying a definition or instance
//! to its table and foreign key; `TaskDefinition` unifies the three variants
//! behind a closed sum so the per-table fan-out is an exhaustive match.

use crate::storage::Table;
use chrono::{DateTime, NaiveDate, Utc};
use clap::ValueEnum;
use heck::ToTitleCase;
use serde::{Deserialize, Serialize};

/// Which definition table a task definition or instance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TaskOrigin {
    Predefined,
    Case,
    Company,
}

impl TaskOrigin {
    /// All origins in fan-out (and tie-break) order.
    pub const ALL: [TaskOrigin; 3] = [TaskOrigin::Predefined, TaskOrigin::Case, TaskOrigin::Company];

    /// The definition table for this origin.
    pub fn table(self) -> Table {
        match self {
            TaskOrigin::Predefined => Table::PredefinedTasks,
            TaskOrigin::Case => Table::CaseTasks,
            TaskOrigin::Company => Table::CompanyTasks,
        }
    }

    /// The id column of the definition table. The same column name doubles
    /// as the nullable foreign key on the instances table.
    pub fn id_column(self) -> &'static str {
        match self {
            TaskOrigin::Predefined => "predefined_task_id",
            TaskOrigin::Case => "case_task_id",
            TaskOrigin::Company => "company_task_id",
        }
    }

    /// The dimension column that scopes this origin's definitions
    /// (service for predefined, case and company for the other two).
    pub fn dimension_column(self) -> &'static str {
        match self {
            TaskOrigin::Predefined => "service_id",
            TaskOrigin::Case => "case_id",
            TaskOrigin::Company => "company_id",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskOrigin::Predefined => "predefined",
            TaskOrigin::Case => "case",
            TaskOrigin::Company => "company",
        }
    }
}

/// Staff role that owns a predefined task by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    CaseManager,
    Attorney,
    Staff,
    Client,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::CaseManager => "case_manager",
            Role::Attorney => "attorney",
            Role::Staff => "staff",
            Role::Client => "client",
        }
    }

    /// Parse a stored role string. Unrecognized values fall back to `Staff`,
    /// matching the fail-soft contract of the transform layer.
    pub fn parse(s: &str) -> Role {
        match s {
            "admin" => Role::Admin,
            "case_manager" => Role::CaseManager,
            "attorney" => Role::Attorney,
            "client" => Role::Client,
            _ => Role::Staff,
        }
    }
}

/// Variant-specific fields of a task definition, discriminated by origin.
///
/// Exactly one foreign key shape exists per variant; a definition never
/// migrates between variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum DefinitionDetail {
    Predefined {
        service_id: String,
        default_responsible_role: Role,
        typical_duration_days: i32,
    },
    Case {
        case_id: String,
    },
    Company {
        company_id: String,
    },
}

impl DefinitionDetail {
    pub fn origin(&self) -> TaskOrigin {
        match self {
            DefinitionDetail::Predefined { .. } => TaskOrigin::Predefined,
            DefinitionDetail::Case { .. } => TaskOrigin::Case,
            DefinitionDetail::Company { .. } => TaskOrigin::Company,
        }
    }
}

/// A task definition: a reusable template from one of the three tables,
/// unified into a single shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: String,
    pub task_name: String,
    pub description: String,
    pub priority: i32,
    pub task_category_id: Option<String>,
    pub document_type_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub detail: DefinitionDetail,
}

impl TaskDefinition {
    pub fn origin(&self) -> TaskOrigin {
        self.detail.origin()
    }
}

/// Lifecycle status of a task instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TaskInstanceStatus {
    NotStarted,
    InProgress,
    Completed,
    Blocked,
    OnHold,
}

impl TaskInstanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskInstanceStatus::NotStarted => "not_started",
            TaskInstanceStatus::InProgress => "in_progress",
            TaskInstanceStatus::Completed => "completed",
            TaskInstanceStatus::Blocked => "blocked",
            TaskInstanceStatus::OnHold => "on_hold",
        }
    }

    /// Parse a stored status string. Returns `None` for unrecognized values;
    /// callers wanting the fail-soft default use [`Self::parse_or_default`].
    pub fn parse(s: &str) -> Option<TaskInstanceStatus> {
        match s {
            "not_started" => Some(TaskInstanceStatus::NotStarted),
            "in_progress" => Some(TaskInstanceStatus::InProgress),
            "completed" => Some(TaskInstanceStatus::Completed),
            "blocked" => Some(TaskInstanceStatus::Blocked),
            "on_hold" => Some(TaskInstanceStatus::OnHold),
            _ => None,
        }
    }

    /// Parse with the transform-layer default: unknown stored values map to
    /// `NotStarted`.
    pub fn parse_or_default(s: &str) -> TaskInstanceStatus {
        Self::parse(s).unwrap_or(TaskInstanceStatus::NotStarted)
    }

    /// Human-readable name, derived (never stored): underscores become
    /// spaces, words are title-cased.
    pub fn display_name(self) -> String {
        self.as_str().to_title_case()
    }

    /// The fixed toggle cycle. Arbitrary transitions remain allowed through
    /// a direct update; this is only the convenience step.
    pub fn toggled(self) -> TaskInstanceStatus {
        match self {
            TaskInstanceStatus::NotStarted => TaskInstanceStatus::InProgress,
            TaskInstanceStatus::InProgress => TaskInstanceStatus::Completed,
            TaskInstanceStatus::Completed => TaskInstanceStatus::NotStarted,
            TaskInstanceStatus::Blocked => TaskInstanceStatus::InProgress,
            TaskInstanceStatus::OnHold => TaskInstanceStatus::InProgress,
        }
    }
}

/// A concrete occurrence of a definition, assigned to a person.
///
/// `origin`/`origin_task_id` are derived from whichever of the three
/// definition foreign keys is populated on the stored row; they are never
/// stored as separate columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: String,
    pub task_name: String,
    pub description: String,
    pub origin: TaskOrigin,
    pub origin_task_id: String,
    pub status: TaskInstanceStatus,
    pub assigned_to: Option<String>,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
    pub completed_at: Option<DateTime<Utc>>,
    pub actual_duration_days: i32,
    pub priority: i32,
    pub active: bool,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Query contracts
// ---------------------------------------------------------------------------

/// Filters for definition queries. Common filters apply to every table;
/// the three dimension filters each apply only to their own table and are
/// silently a no-op against the other two.
#[derive(Debug, Clone, Default)]
pub struct DefinitionFilter {
    /// Case-insensitive substring match over task_name and description.
    pub search: Option<String>,
    pub priorities: Vec<i32>,
    pub task_category_id: Option<String>,
    pub document_type_id: Option<String>,
    pub service_id: Option<String>,
    pub case_id: Option<String>,
    pub company_id: Option<String>,
}

/// Sortable fields for definition queries. The set is fixed; the storage
/// column and the in-memory merge comparator stay in sync through this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DefinitionSortField {
    TaskName,
    Priority,
    CreatedAt,
    UpdatedAt,
}

impl DefinitionSortField {
    pub fn column(self) -> &'static str {
        match self {
            DefinitionSortField::TaskName => "task_name",
            DefinitionSortField::Priority => "priority",
            DefinitionSortField::CreatedAt => "created_at",
            DefinitionSortField::UpdatedAt => "updated_at",
        }
    }
}

/// Requested sort for definition queries.
#[derive(Debug, Clone, Copy)]
pub struct DefinitionSort {
    pub field: DefinitionSortField,
    pub ascending: bool,
}

/// Filters for instance queries. The three dimension filters resolve to
/// definition id sets first, then constrain the matching foreign key.
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    pub assigned_to: Option<String>,
    pub statuses: Vec<TaskInstanceStatus>,
    pub priorities: Vec<i32>,
    pub active: Option<bool>,
    /// Case-insensitive substring match over task_name and description.
    pub search: Option<String>,
    /// Instances whose definition belongs to this service.
    pub service_id_for_origin: Option<String>,
    /// Instances whose definition belongs to this case.
    pub case_id_for_origin: Option<String>,
    /// Instances whose definition belongs to this company.
    pub company_id_for_origin: Option<String>,
}

/// Sortable fields for instance queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InstanceSortField {
    TaskName,
    Priority,
    StartDate,
    DueDate,
    CreatedAt,
    UpdatedAt,
}

impl InstanceSortField {
    pub fn column(self) -> &'static str {
        match self {
            InstanceSortField::TaskName => "task_name",
            InstanceSortField::Priority => "priority",
            InstanceSortField::StartDate => "start_date",
            InstanceSortField::DueDate => "due_date",
            InstanceSortField::CreatedAt => "created_at",
            InstanceSortField::UpdatedAt => "updated_at",
        }
    }
}

/// Requested sort for instance queries.
#[derive(Debug, Clone, Copy)]
pub struct InstanceSort {
    pub field: InstanceSortField,
    pub ascending: bool,
}

// ---------------------------------------------------------------------------
// Mutation payloads
// ---------------------------------------------------------------------------

/// Payload for creating a definition. The variant tag rides in `detail`;
/// the mutation layer strips it and routes the write to the matching table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDefinition {
    pub task_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: i32,
    pub task_category_id: Option<String>,
    pub document_type_id: Option<String>,
    #[serde(flatten)]
    pub detail: DefinitionDetail,
}

/// Partial update for a definition. Absent fields are never written.
/// Double-`Option` fields distinguish "leave alone" from "clear to null".
/// Variant fields only reach storage when they match the target origin.
#[derive(Debug, Clone, Default)]
pub struct DefinitionPatch {
    pub task_name: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i32>,
    pub task_category_id: Option<Option<String>>,
    pub document_type_id: Option<Option<String>>,
    pub service_id: Option<String>,
    pub default_responsible_role: Option<Role>,
    pub typical_duration_days: Option<i32>,
    pub case_id: Option<String>,
    pub company_id: Option<String>,
}

/// Payload for creating an instance referencing an existing definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInstance {
    pub task_name: String,
    #[serde(default)]
    pub description: String,
    pub origin: TaskOrigin,
    pub origin_task_id: String,
    pub status: Option<TaskInstanceStatus>,
    pub assigned_to: Option<String>,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub notes: String,
}

/// Partial update for an instance. Only present keys are written.
#[derive(Debug, Clone, Default)]
pub struct InstancePatch {
    pub task_name: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskInstanceStatus>,
    pub assigned_to: Option<Option<String>>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub actual_duration_days: Option<i32>,
    pub priority: Option<i32>,
    pub active: Option<bool>,
    pub notes: Option<String>,
}
