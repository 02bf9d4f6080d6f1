//! CLI command definitions and dispatch.
//!
//! Thin wrapper over the two services for back-office scripting: list and
//! count queries print JSON to stdout, toggle advances one instance along
//! the status cycle.

use crate::definitions::DefinitionService;
use crate::instances::InstanceService;
use crate::storage::Storage;
use crate::types::{
    DefinitionFilter, DefinitionSort, DefinitionSortField, InstanceFilter, InstanceSort,
    InstanceSortField, TaskInstanceStatus, TaskOrigin,
};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// Case-management task definition and instance tooling.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List task definitions as JSON
    ListDefinitions(DefinitionQueryArgs),

    /// Count task definitions matching the filters
    CountDefinitions(DefinitionQueryArgs),

    /// List task instances as JSON
    ListInstances(InstanceQueryArgs),

    /// Count task instances matching the filters
    CountInstances(InstanceQueryArgs),

    /// Advance an instance one step along the status cycle
    ToggleInstance {
        /// Instance id
        id: String,
    },
}

/// Filter and sort flags for definition queries.
#[derive(Args, Debug)]
pub struct DefinitionQueryArgs {
    /// Restrict to one origin (default: all three)
    #[arg(long, value_enum)]
    pub origin: Option<TaskOrigin>,

    /// Substring match over task name and description
    #[arg(long)]
    pub search: Option<String>,

    /// Priority values to include (repeatable)
    #[arg(long = "priority")]
    pub priorities: Vec<i32>,

    /// Filter by task category id
    #[arg(long)]
    pub category: Option<String>,

    /// Filter by document type id
    #[arg(long)]
    pub document_type: Option<String>,

    /// Filter predefined tasks by service id
    #[arg(long)]
    pub service: Option<String>,

    /// Filter case tasks by case id
    #[arg(long = "case")]
    pub case_id: Option<String>,

    /// Filter company tasks by company id
    #[arg(long = "company")]
    pub company_id: Option<String>,

    /// Sort field
    #[arg(long, value_enum)]
    pub sort_by: Option<DefinitionSortField>,

    /// Sort ascending instead of descending
    #[arg(long)]
    pub ascending: bool,
}

impl DefinitionQueryArgs {
    fn filter(&self) -> DefinitionFilter {
        DefinitionFilter {
            search: self.search.clone(),
            priorities: self.priorities.clone(),
            task_category_id: self.category.clone(),
            document_type_id: self.document_type.clone(),
            service_id: self.service.clone(),
            case_id: self.case_id.clone(),
            company_id: self.company_id.clone(),
        }
    }

    fn sort(&self) -> Option<DefinitionSort> {
        self.sort_by.map(|field| DefinitionSort {
            field,
            ascending: self.ascending,
        })
    }
}

/// Filter and sort flags for instance queries.
#[derive(Args, Debug)]
pub struct InstanceQueryArgs {
    /// Filter by assignee user id
    #[arg(long)]
    pub assigned_to: Option<String>,

    /// Status values to include (repeatable)
    #[arg(long = "status", value_enum)]
    pub statuses: Vec<TaskInstanceStatus>,

    /// Priority values to include (repeatable)
    #[arg(long = "priority")]
    pub priorities: Vec<i32>,

    /// Filter by active flag
    #[arg(long)]
    pub active: Option<bool>,

    /// Substring match over task name and description
    #[arg(long)]
    pub search: Option<String>,

    /// Instances whose definition belongs to this service
    #[arg(long)]
    pub service: Option<String>,

    /// Instances whose definition belongs to this case
    #[arg(long = "case")]
    pub case_id: Option<String>,

    /// Instances whose definition belongs to this company
    #[arg(long = "company")]
    pub company_id: Option<String>,

    /// Sort field
    #[arg(long, value_enum)]
    pub sort_by: Option<InstanceSortField>,

    /// Sort ascending instead of descending
    #[arg(long)]
    pub ascending: bool,
}

impl InstanceQueryArgs {
    fn filter(&self) -> InstanceFilter {
        InstanceFilter {
            assigned_to: self.assigned_to.clone(),
            statuses: self.statuses.clone(),
            priorities: self.priorities.clone(),
            active: self.active,
            search: self.search.clone(),
            service_id_for_origin: self.service.clone(),
            case_id_for_origin: self.case_id.clone(),
            company_id_for_origin: self.company_id.clone(),
        }
    }

    fn sort(&self) -> Option<InstanceSort> {
        self.sort_by.map(|field| InstanceSort {
            field,
            ascending: self.ascending,
        })
    }
}

/// Execute a subcommand against the given storage backend.
pub async fn run(command: Command, storage: Arc<dyn Storage>) -> Result<()> {
    match command {
        Command::ListDefinitions(args) => {
            let service = DefinitionService::new(storage);
            let definitions = service
                .list(&args.filter(), args.sort(), args.origin)
                .await?;
            println!("{}", serde_json::to_string_pretty(&definitions)?);
        }
        Command::CountDefinitions(args) => {
            let service = DefinitionService::new(storage);
            let count = service.count(&args.filter(), args.origin).await?;
            println!("{}", count);
        }
        Command::ListInstances(args) => {
            let service = InstanceService::new(storage);
            let instances = service.list(&args.filter(), args.sort()).await?;
            println!("{}", serde_json::to_string_pretty(&instances)?);
        }
        Command::CountInstances(args) => {
            let service = InstanceService::new(storage);
            let count = service.count(&args.filter()).await?;
            println!("{}", count);
        }
        Command::ToggleInstance { id } => {
            let service = InstanceService::new(storage);
            let instance = service.toggle_status(&id).await?;
            println!("{}", serde_json::to_string_pretty(&instance)?);
        }
    }
    Ok(())
}
