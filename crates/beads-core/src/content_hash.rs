// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! Deterministic content hashing over an issue's semantic fields.
//!
//! The hash excludes `id`, the auditing timestamps, and the hash field
//! itself, so that importing an identical issue on a different clone (with
//! a different `updated_at` from clock skew) can still be recognized as
//! unchanged content when compared to the last export's hash. Used both as
//! `Issue.content_hash` and, summed over all issues, as the export file's
//! `jsonl_content_hash` metadata value.

use sha2::{Digest, Sha256};

use crate::issue::Issue;

/// Field separator. Chosen to be unlikely to appear raw in free-text
/// fields; every field is still length-prefixed via `write_str`, so an
/// adversarial value containing the separator cannot create a collision.
const SEP: u8 = 0x1f; // ASCII unit separator

fn write_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
    hasher.update([SEP]);
}

fn write_str_opt(hasher: &mut Sha256, s: Option<&str>) {
    match s {
        Some(s) => write_str(hasher, s),
        None => write_str(hasher, ""),
    }
}

fn write_int(hasher: &mut Sha256, n: i64) {
    hasher.update(n.to_le_bytes());
    hasher.update([SEP]);
}

fn write_flag(hasher: &mut Sha256, b: bool) {
    hasher.update([b as u8, SEP]);
}

fn write_opt_u32(hasher: &mut Sha256, n: Option<u32>) {
    write_int(hasher, n.map(i64::from).unwrap_or(-1));
}

/// Computes the content hash of an issue's semantic fields.
///
/// Excludes `id`, `created_at`, `updated_at`, `closed_at`, `deleted_at`,
/// and `content_hash` itself so the hash reflects content, not provenance.
pub fn compute_content_hash(issue: &Issue) -> String {
    let mut hasher = Sha256::new();

    write_str(&mut hasher, &issue.title);
    write_str(&mut hasher, &issue.description);
    write_str(&mut hasher, &issue.design);
    write_str(&mut hasher, &issue.notes);
    write_str(&mut hasher, &issue.acceptance_criteria);
    write_str(&mut hasher, issue.status.as_str());
    write_int(&mut hasher, issue.priority as i64);
    write_str(&mut hasher, issue.kind.as_str());
    write_str_opt(&mut hasher, issue.assignee.as_deref());
    write_str_opt(&mut hasher, issue.external_ref.as_deref());
    write_opt_u32(&mut hasher, issue.estimate_minutes);
    write_int(
        &mut hasher,
        issue.defer_until.map(|t| t.timestamp()).unwrap_or(-1),
    );
    write_flag(&mut hasher, issue.ephemeral);
    write_flag(&mut hasher, issue.is_template);
    write_flag(&mut hasher, issue.pinned);
    write_str_opt(&mut hasher, issue.source_repo.as_deref());
    write_str_opt(&mut hasher, issue.pod_id.as_deref());
    write_str_opt(&mut hasher, issue.pod_status.as_deref());
    write_str_opt(&mut hasher, issue.screen_session.as_deref());
    write_str_opt(&mut hasher, issue.deleted_by.as_deref());
    write_str_opt(&mut hasher, issue.delete_reason.as_deref());
    write_str_opt(
        &mut hasher,
        issue.original_type.as_ref().map(|k| k.as_str()),
    );

    let mut labels: Vec<&str> = issue.labels.iter().map(String::as_str).collect();
    labels.sort_unstable();
    write_int(&mut hasher, labels.len() as i64);
    for label in labels {
        write_str(&mut hasher, label);
    }

    write_int(&mut hasher, issue.comments.len() as i64);
    for comment in &issue.comments {
        write_str(&mut hasher, &comment.author);
        write_str(&mut hasher, &comment.text);
        write_int(&mut hasher, comment.created_at.timestamp());
    }

    format!("{:x}", hasher.finalize())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::issue::IssueBuilder;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn hash_is_64_char_lowercase_hex(title in "\\PC{1,200}") {
            let issue = IssueBuilder::new("bd-1", &title).build();
            let hash = compute_content_hash(&issue);
            prop_assert_eq!(hash.len(), 64);
            prop_assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }

        #[test]
        fn hash_deterministic_for_same_content(title in "\\PC{1,100}") {
            let a = IssueBuilder::new("bd-1", &title).build();
            let b = IssueBuilder::new("bd-1", &title).build();
            prop_assert_eq!(compute_content_hash(&a), compute_content_hash(&b));
        }

        #[test]
        fn hash_ignores_timestamps(title in "\\PC{1,100}", hours in 0i64..10_000i64) {
            let a = IssueBuilder::new("bd-1", &title).build();
            let mut b = a.clone();
            b.created_at += chrono::Duration::hours(hours);
            b.updated_at += chrono::Duration::hours(hours);
            prop_assert_eq!(compute_content_hash(&a), compute_content_hash(&b));
        }

        #[test]
        fn different_titles_almost_always_differ(t1 in "[a-zA-Z0-9 ]{5,50}", t2 in "[a-zA-Z0-9 ]{5,50}") {
            prop_assume!(t1 != t2);
            let a = IssueBuilder::new("bd-1", &t1).build();
            let b = IssueBuilder::new("bd-1", &t2).build();
            prop_assert_ne!(compute_content_hash(&a), compute_content_hash(&b));
        }
    }
}
