//! Decides what the sidebar shows when the menu is not simply "ready".
//!
//! The menu region is never left blank. A usable tree, even a stale one,
//! always wins over an error screen; the error then rides along as a banner.

use serde::Serialize;

use crate::error::MenuError;
use crate::tree::MenuTree;

pub const RETRY_LABEL: &str = "Retry";
pub const SIGN_IN_LABEL: &str = "Sign in";

/// A labeled message with a manual retry affordance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub title: String,
    pub message: String,
    pub retry_label: String,
}

impl Notice {
    fn new(title: &str, message: impl Into<String>, retry_label: &str) -> Self {
        Self {
            title: title.to_string(),
            message: message.into(),
            retry_label: retry_label.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MenuView {
    /// Nothing to show yet and nothing has failed.
    Loading,
    /// Draw the tree. `banner` is set when the last refresh failed.
    Ready { banner: Option<Notice> },
    /// No usable tree and the fetch failed, or the tree came back empty.
    Degraded { notice: Notice },
    SignedOut { notice: Notice },
}

impl MenuView {
    pub fn is_degraded(&self) -> bool {
        matches!(self, MenuView::Degraded { .. })
    }

    pub fn notice(&self) -> Option<&Notice> {
        match self {
            MenuView::Loading => None,
            MenuView::Ready { banner } => banner.as_ref(),
            MenuView::Degraded { notice } | MenuView::SignedOut { notice } => Some(notice),
        }
    }
}

pub fn menu_view(loading: bool, tree: Option<&MenuTree>, error: Option<&MenuError>) -> MenuView {
    match error {
        Some(MenuError::Unauthenticated) => {
            return MenuView::SignedOut {
                notice: Notice::new(
                    "Signed out",
                    MenuError::Unauthenticated.user_message(),
                    SIGN_IN_LABEL,
                ),
            };
        }
        Some(MenuError::AuthNotReady) => return MenuView::Loading,
        _ => {}
    }

    match (tree, error) {
        (Some(tree), Some(err)) if !tree.is_empty() => MenuView::Ready {
            banner: Some(Notice::new("Menu may be out of date", err.user_message(), RETRY_LABEL)),
        },
        (Some(tree), None) if !tree.is_empty() => MenuView::Ready { banner: None },
        (_, Some(err)) => MenuView::Degraded {
            notice: Notice::new("No menu available", err.user_message(), RETRY_LABEL),
        },
        (None, None) => MenuView::Loading,
        (Some(_), None) if loading => MenuView::Loading,
        (Some(_), None) => MenuView::Degraded {
            notice: Notice::new(
                "No menu available",
                "No menu entries are available for this context.",
                RETRY_LABEL,
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::test_support::leaf;

    fn tree() -> MenuTree {
        MenuTree::new(vec![leaf(1, "/a", 0)]).unwrap()
    }

    #[test]
    fn failure_without_tree_is_degraded_and_labeled() {
        let err = MenuError::network("timeout");
        let view = menu_view(false, None, Some(&err));
        assert!(view.is_degraded());
        let notice = view.notice().unwrap();
        assert_eq!(notice.title, "No menu available");
        assert!(!notice.message.is_empty());
        assert_eq!(notice.retry_label, RETRY_LABEL);
    }

    #[test]
    fn stale_tree_shows_banner_instead_of_degrading() {
        let err = MenuError::malformed("missing menus");
        let tree = tree();
        let view = menu_view(false, Some(&tree), Some(&err));
        assert!(matches!(view, MenuView::Ready { banner: Some(_) }));
    }

    #[test]
    fn healthy_tree_is_ready() {
        let tree = tree();
        assert_eq!(menu_view(false, Some(&tree), None), MenuView::Ready { banner: None });
        assert_eq!(menu_view(true, Some(&tree), None), MenuView::Ready { banner: None });
    }

    #[test]
    fn empty_tree_is_not_blank() {
        let empty = MenuTree::empty();
        assert!(menu_view(false, Some(&empty), None).is_degraded());
        assert_eq!(menu_view(true, Some(&empty), None), MenuView::Loading);
    }

    #[test]
    fn session_states() {
        assert_eq!(menu_view(true, None, None), MenuView::Loading);
        assert_eq!(
            menu_view(true, None, Some(&MenuError::AuthNotReady)),
            MenuView::Loading
        );
        let signed_out = menu_view(false, None, Some(&MenuError::Unauthenticated));
        assert!(matches!(signed_out, MenuView::SignedOut { .. }));
        assert_eq!(signed_out.notice().unwrap().retry_label, SIGN_IN_LABEL);
    }

    #[test]
    fn serializes_with_kind_tag() {
        let value = serde_json::to_value(MenuView::Loading).unwrap();
        assert_eq!(value, serde_json::json!({ "kind": "loading" }));
    }
}
