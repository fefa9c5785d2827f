// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The Beads Authors

//! `dimension:value` scoped-name helpers used by state-dimension labels.

/// Joins a dimension and value into the `dimension:value` label form.
pub fn scoped_name(dimension: &str, value: &str) -> String {
    format!("{dimension}:{value}")
}

/// Splits a `dimension:value` label back into its parts. Returns `None`
/// if the label has no `:` separator.
pub fn split_scoped_name(label: &str) -> Option<(&str, &str)> {
    label.split_once(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let label = scoped_name("review", "approved");
        assert_eq!(label, "review:approved");
        assert_eq!(split_scoped_name(&label), Some(("review", "approved")));
    }

    #[test]
    fn rejects_unscoped() {
        assert_eq!(split_scoped_name("not-scoped"), None);
    }

    #[test]
    fn value_may_itself_contain_colons() {
        let label = scoped_name("url", "http://example.com");
        assert_eq!(split_scoped_name(&label), Some(("url", "http://example.com")));
    }
}
