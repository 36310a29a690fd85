//! Catchment selection on the map.

use std::collections::BTreeSet;

/// How a catchment outline is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineStyle {
    Selected,
    Upstream,
}

/// Catchments picked on the map, in click order, and everything upstream
/// of them.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    selected: Vec<String>,
    upstream: BTreeSet<String>,
}

impl Selection {
    /// Add `cat_id` to the selection, or remove it if already selected.
    /// Returns whether it is selected afterwards.
    pub fn toggle(&mut self, cat_id: &str) -> bool {
        if let Some(pos) = self.selected.iter().position(|c| c == cat_id) {
            self.selected.remove(pos);
            if self.selected.is_empty() {
                self.upstream.clear();
            }
            false
        } else {
            self.selected.push(cat_id.to_string());
            true
        }
    }

    /// Replace the upstream set. Results for a selection that has since
    /// changed are ignored; returns whether they were applied.
    pub fn set_upstream(&mut self, traced_for: &[String], upstream: BTreeSet<String>) -> bool {
        if traced_for != self.selected.as_slice() {
            return false;
        }
        self.upstream = upstream;
        true
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.upstream.clear();
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Upstream catchments that are not themselves selected
    pub fn upstream_only(&self) -> impl Iterator<Item = &String> {
        self.upstream
            .iter()
            .filter(|c| !self.selected.contains(*c))
    }

    pub fn style(&self, cat_id: &str) -> Option<OutlineStyle> {
        if self.selected.iter().any(|c| c == cat_id) {
            Some(OutlineStyle::Selected)
        } else if self.upstream.contains(cat_id) {
            Some(OutlineStyle::Upstream)
        } else {
            None
        }
    }

    /// Output folder used when none is typed: the first selected catchment
    pub fn default_folder_name(&self) -> Option<&str> {
        self.selected.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn toggle_adds_and_removes() {
        let mut sel = Selection::default();
        assert!(sel.toggle("cat-3"));
        assert!(sel.toggle("cat-7"));
        assert_eq!(sel.selected(), ["cat-3".to_string(), "cat-7".to_string()]);
        assert!(!sel.toggle("cat-3"));
        assert_eq!(sel.selected(), ["cat-7".to_string()]);
        assert_eq!(sel.default_folder_name(), Some("cat-7"));
    }

    #[test]
    fn styles_follow_selection_and_upstream() {
        let mut sel = Selection::default();
        sel.toggle("cat-3");
        let traced = sel.selected().to_vec();
        assert!(sel.set_upstream(&traced, set(&["cat-1", "cat-2", "cat-3"])));

        assert_eq!(sel.style("cat-3"), Some(OutlineStyle::Selected));
        assert_eq!(sel.style("cat-1"), Some(OutlineStyle::Upstream));
        assert_eq!(sel.style("cat-9"), None);
        assert_eq!(sel.upstream_only().count(), 2);
    }

    #[test]
    fn stale_trace_is_ignored() {
        let mut sel = Selection::default();
        sel.toggle("cat-3");
        let traced = sel.selected().to_vec();
        sel.toggle("cat-4");
        assert!(!sel.set_upstream(&traced, set(&["cat-1"])));
        assert_eq!(sel.style("cat-1"), None);
    }

    #[test]
    fn emptying_clears_upstream() {
        let mut sel = Selection::default();
        sel.toggle("cat-3");
        let traced = sel.selected().to_vec();
        sel.set_upstream(&traced, set(&["cat-1", "cat-3"]));
        sel.toggle("cat-3");
        assert!(sel.is_empty());
        assert_eq!(sel.style("cat-1"), None);
        assert_eq!(sel.default_folder_name(), None);
    }
}
