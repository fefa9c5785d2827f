// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Output formatting: a `clap::ValueEnum` format switch plus a handful of
//! free functions, rather than a trait hierarchy — there's no polymorphism
//! here worth the ceremony.

use clap::ValueEnum;
use serde_json::Value;

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub fn print_issue(format: OutputFormat, issue: &Value) {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(issue).unwrap_or_default()),
        OutputFormat::Text => {
            let id = issue.get("id").and_then(Value::as_str).unwrap_or("?");
            let title = issue.get("title").and_then(Value::as_str).unwrap_or("");
            let status = issue.get("status").and_then(Value::as_str).unwrap_or("?");
            let priority = issue.get("priority").and_then(Value::as_u64).unwrap_or(0);
            println!("{id}  [{status}] p{priority}  {title}");
            if let Some(assignee) = issue.get("assignee").and_then(Value::as_str) {
                println!("  assignee: {assignee}");
            }
            if let Some(desc) = issue.get("description").and_then(Value::as_str) {
                if !desc.is_empty() {
                    println!("\n{desc}");
                }
            }
        }
    }
}

pub fn print_issue_list(format: OutputFormat, issues: &[Value]) {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(issues).unwrap_or_default()),
        OutputFormat::Text => {
            if issues.is_empty() {
                println!("No issues");
                return;
            }
            println!("{:<12} {:<8} {:<4} TITLE", "ID", "STATUS", "PRI");
            for issue in issues {
                let id = issue.get("id").and_then(Value::as_str).unwrap_or("?");
                let status = issue.get("status").and_then(Value::as_str).unwrap_or("?");
                let priority = issue.get("priority").and_then(Value::as_u64).unwrap_or(0);
                let title = issue.get("title").and_then(Value::as_str).unwrap_or("");
                println!("{id:<12} {status:<8} {priority:<4} {title}");
            }
        }
    }
}

pub fn print_value(format: OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value).unwrap_or_default()),
        OutputFormat::Text => println!("{value}"),
    }
}
