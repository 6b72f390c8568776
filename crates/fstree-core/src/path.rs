// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Helpers for the '/'-separated absolute paths used as index keys

use crate::config::CaseSensitivity;

pub const ROOT: &str = "/";

/// Collapse repeated and trailing separators and force a leading '/'
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

pub fn join(parent: &str, name: &str) -> String {
    if parent == ROOT {
        normalize(name)
    } else {
        normalize(&format!("{parent}/{name}"))
    }
}

pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or_default()
}

pub fn parent(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

pub fn depth(path: &str) -> usize {
    segments(path).count()
}

/// True when `candidate` lies strictly below `ancestor`
pub fn is_descendant(candidate: &str, ancestor: &str, case: CaseSensitivity) -> bool {
    let candidate = case.fold(candidate);
    let ancestor = case.fold(ancestor);
    if depth(&candidate) <= depth(&ancestor) {
        return false;
    }
    if ancestor == ROOT {
        return true;
    }
    candidate
        .strip_prefix(ancestor.as_str())
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Replace the `old_prefix` ancestor of `path` with `new_prefix`
pub fn rebase(path: &str, old_prefix: &str, new_prefix: &str) -> String {
    let rest: Vec<&str> = segments(path).skip(depth(old_prefix)).collect();
    join(new_prefix, &rest.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_separators() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("a//b/"), "/a/b");
        assert_eq!(normalize("/"), "/");
    }

    #[test]
    fn parent_and_name() {
        assert_eq!(parent("/a/b"), Some("/a"));
        assert_eq!(parent("/a"), Some("/"));
        assert_eq!(parent("/"), None);
        assert_eq!(file_name("/a/b"), "b");
        assert_eq!(join("/", "x"), "/x");
        assert_eq!(join("/d", "x"), "/d/x");
    }

    #[test]
    fn descendant_requires_separator_boundary() {
        let case = CaseSensitivity::Sensitive;
        assert!(is_descendant("/d/sub", "/d", case));
        assert!(!is_descendant("/dd", "/d", case));
        assert!(!is_descendant("/d", "/d", case));
        assert!(is_descendant("/D/sub", "/d", CaseSensitivity::InsensitivePreserving));
    }

    #[test]
    fn rebase_swaps_prefix() {
        assert_eq!(rebase("/d/x/y", "/d", "/e"), "/e/x/y");
        assert_eq!(rebase("/d", "/d", "/e"), "/e");
    }
}
