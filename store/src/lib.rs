//! Taskboard Store - task document model and repository contract.
//!
//! This crate owns everything the sync service needs to know about a task
//! store without caring how the store is synchronized: the JSON document
//! types, the [`TaskRepository`] capability trait, and a file-backed
//! implementation of it.
//!
//! # Overview
//!
//! A task store is a single JSON document (`{ "tasks": [...] }`) holding
//! top-level tasks, each with an optional list of subtasks. Tasks are
//! addressed by id (`"3"`), subtasks by `parent.id` (`"3.2"`); see
//! [`TaskRef`].
//!
//! # Modules
//!
//! - [`types`]: Task, subtask and report document types
//! - [`repository`]: The [`TaskRepository`] trait and its parameter types
//! - [`json_repo`]: File-backed repository with atomic writes
//! - [`dependencies`]: Dependency graph validation and repair
//! - [`export`]: Task file and README renderings
//! - [`error`]: Error types for repository operations

pub mod dependencies;
pub mod error;
pub mod export;
pub mod json_repo;
pub mod repository;
pub mod types;

pub use error::{RepoError, Result};
pub use json_repo::JsonTaskRepository;
pub use repository::{
    ComplexityOptions, DependencyIssue, ExpandAllOptions, ExpandOptions, IssueKind, NewSubtask,
    NewTask, ParsePrdOptions, ReadmeOptions, TaskRepository, TaskUpdate, ValidationReport,
};
pub use types::{
    ComplexityAnalysis, ComplexityReport, ComplexityReportMeta, Priority, Subtask, Task,
    TaskDocument, TaskRef, TaskRefError, TaskStatus,
};
