//! Plain-text renderings of the task store: per-task files and the README
//! task table.

use std::fmt::Write as _;

use crate::types::{Task, TaskStatus};

/// Marker opening the generated README section.
pub const README_START_MARKER: &str = "<!-- TASKBOARD:START -->";

/// Marker closing the generated README section.
pub const README_END_MARKER: &str = "<!-- TASKBOARD:END -->";

/// File name for a generated task file, e.g. `task_007.txt`.
#[must_use]
pub fn task_file_name(id: u32) -> String {
    format!("task_{id:03}.txt")
}

fn join_ids(ids: &[u32]) -> String {
    if ids.is_empty() {
        return "None".to_string();
    }
    ids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders one task, including its subtasks, as a text file body.
#[must_use]
pub fn render_task_file(task: &Task) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(out, "# Task ID: {}", task.id);
    let _ = writeln!(out, "# Title: {}", task.title);
    let _ = writeln!(out, "# Status: {}", task.status);
    let _ = writeln!(out, "# Dependencies: {}", join_ids(&task.dependencies));
    let _ = writeln!(out, "# Priority: {}", task.priority.as_str());
    let _ = writeln!(out, "# Description: {}", task.description);
    let _ = writeln!(out, "# Details:\n{}\n", task.details);
    let _ = writeln!(out, "# Test Strategy:\n{}", task.test_strategy);

    if !task.subtasks.is_empty() {
        let _ = writeln!(out, "\n# Subtasks:");
        for sub in &task.subtasks {
            let deps: Vec<String> = sub
                .dependencies
                .iter()
                .map(|d| format!("{}.{d}", task.id))
                .collect();
            let deps = if deps.is_empty() {
                "None".to_string()
            } else {
                deps.join(", ")
            };

            let _ = writeln!(out, "## {}. {} [{}]", sub.id, sub.title, sub.status);
            let _ = writeln!(out, "### Dependencies: {deps}");
            let _ = writeln!(out, "### Description: {}", sub.description);
            let _ = writeln!(out, "### Details:\n{}\n", sub.details);
        }
    }

    out
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Renders the markdown task table placed between the README markers.
#[must_use]
pub fn render_readme_section(
    tasks: &[Task],
    status: Option<TaskStatus>,
    with_subtasks: bool,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{README_START_MARKER}");
    let _ = writeln!(out, "## Tasks\n");
    let _ = writeln!(out, "| ID | Title | Status | Priority | Dependencies |");
    let _ = writeln!(out, "|----|-------|--------|----------|--------------|");

    for task in tasks.iter().filter(|t| status.is_none_or(|s| t.status == s)) {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            task.id,
            escape_cell(&task.title),
            task.status,
            task.priority.as_str(),
            join_ids(&task.dependencies)
        );

        if with_subtasks {
            for sub in &task.subtasks {
                let _ = writeln!(
                    out,
                    "| {}.{} | {} | {} | | |",
                    task.id,
                    sub.id,
                    escape_cell(&sub.title),
                    sub.status
                );
            }
        }
    }

    let _ = write!(out, "{README_END_MARKER}");
    out
}

/// Replaces the marked section of `readme`, appending it when absent.
#[must_use]
pub fn splice_readme(readme: &str, section: &str) -> String {
    if let (Some(start), Some(end)) = (
        readme.find(README_START_MARKER),
        readme.find(README_END_MARKER),
    ) {
        if start < end {
            let tail = &readme[end + README_END_MARKER.len()..];
            return format!("{}{section}{tail}", &readme[..start]);
        }
    }

    if readme.is_empty() {
        return format!("{section}\n");
    }

    let separator = if readme.ends_with('\n') { "\n" } else { "\n\n" };
    format!("{readme}{separator}{section}\n")
}
