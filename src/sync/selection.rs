//! Active project pointer.

use crate::models::Project;

/// Tracks which project is open and keeps the pointer valid across merges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSelection {
    active_id: Option<String>,
    /// A just-created id whose record has not been delivered yet.
    pending: Option<String>,
}

impl ActiveSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a previously persisted pointer.
    pub fn restored(active_id: Option<String>) -> Self {
        Self {
            active_id,
            pending: None,
        }
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    /// Explicit selection by the user.
    pub fn select(&mut self, id: Option<String>) {
        self.active_id = id;
        self.pending = None;
    }

    /// Select a record that was just written and may not be in the list yet.
    pub fn select_pending(&mut self, id: String) {
        self.active_id = Some(id.clone());
        self.pending = Some(id);
    }

    pub fn clear(&mut self) {
        self.active_id = None;
        self.pending = None;
    }

    /// Re-derive the pointer after the project list changed.
    ///
    /// A pointer that still resolves is never moved. A stale pointer snaps to
    /// the first project, or to `None` for an empty list, unless it is the
    /// pending id of a record still on its way.
    pub fn resolve(&mut self, projects: &[Project]) {
        if let Some(id) = self.active_id.as_deref() {
            if projects.iter().any(|p| p.id == id) {
                if self.pending.as_deref() == Some(id) {
                    self.pending = None;
                }
                return;
            }
            if self.pending.as_deref() == Some(id) {
                return;
            }
        }

        self.pending = None;
        self.active_id = projects.first().map(|p| p.id.clone());
    }

    /// The active project: the pointed-to entry, else the first entry.
    pub fn active_project<'a>(&self, projects: &'a [Project]) -> Option<&'a Project> {
        self.active_id
            .as_deref()
            .and_then(|id| projects.iter().find(|p| p.id == id))
            .or_else(|| projects.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fields, Origin};

    fn list(ids: &[&str]) -> Vec<Project> {
        ids.iter()
            .map(|id| Project::from_record(*id, Origin::Legacy, Fields::new()))
            .collect()
    }

    #[test]
    fn test_empty_to_selected_picks_first() {
        let mut selection = ActiveSelection::new();
        selection.resolve(&[]);
        assert_eq!(selection.active_id(), None);

        selection.resolve(&list(&["a", "b"]));
        assert_eq!(selection.active_id(), Some("a"));
    }

    #[test]
    fn test_present_pointer_is_untouched() {
        let mut selection = ActiveSelection::new();
        selection.select(Some("b".to_string()));

        selection.resolve(&list(&["a", "b"]));
        assert_eq!(selection.active_id(), Some("b"));

        selection.resolve(&list(&["c", "a", "b"]));
        assert_eq!(selection.active_id(), Some("b"));
    }

    #[test]
    fn test_stale_pointer_is_reassigned() {
        let mut selection = ActiveSelection::new();
        selection.select(Some("b".to_string()));

        selection.resolve(&list(&["a", "c"]));
        assert_eq!(selection.active_id(), Some("a"));
    }

    #[test]
    fn test_empty_list_clears_pointer() {
        let mut selection = ActiveSelection::new();
        selection.resolve(&list(&["a"]));
        selection.resolve(&[]);
        assert_eq!(selection.active_id(), None);
    }

    #[test]
    fn test_pending_pointer_survives_until_echo() {
        let mut selection = ActiveSelection::new();
        selection.resolve(&list(&["a"]));
        selection.select_pending("new".to_string());

        selection.resolve(&list(&["a"]));
        assert_eq!(selection.active_id(), Some("new"));

        selection.resolve(&list(&["new", "a"]));
        assert_eq!(selection.active_id(), Some("new"));

        // Once delivered it behaves like any other pointer.
        selection.resolve(&list(&["a"]));
        assert_eq!(selection.active_id(), Some("a"));
    }

    #[test]
    fn test_active_project_falls_back_to_first() {
        let projects = list(&["a", "b"]);
        let mut selection = ActiveSelection::new();
        selection.select_pending("missing".to_string());

        assert_eq!(selection.active_project(&projects).map(|p| p.id.as_str()), Some("a"));
        assert!(selection.active_project(&[]).is_none());

        selection.select(Some("b".to_string()));
        assert_eq!(selection.active_project(&projects).map(|p| p.id.as_str()), Some("b"));
    }
}
