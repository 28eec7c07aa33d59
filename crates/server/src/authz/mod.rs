//! Role-based permission table with an ownership rule for edits.

pub mod visibility;

use crate::{
    db::models::Role,
    error::{AppError, Result},
    middleware::auth::AuthUser,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Like,
    Follow,
    View,
    Create,
    Update,
    Delete,
    ViewStatistics,
    Manage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Post,
    Comment,
    User,
    AdminDashboard,
}

use Action::*;
use Resource::*;

const ADMIN_PERMISSIONS: &[(Action, Resource)] = &[
    (View, Post),
    (Create, Post),
    (Update, Post),
    (Delete, Post),
    (Like, Post),
    (Manage, Post),
    (View, Comment),
    (Create, Comment),
    (Update, Comment),
    (Delete, Comment),
    (Follow, User),
    (View, User),
    (Manage, User),
    (ViewStatistics, AdminDashboard),
];

const USER_PERMISSIONS: &[(Action, Resource)] = &[
    (View, Post),
    (Create, Post),
    (Update, Post),
    (Delete, Post),
    (Like, Post),
    (Create, Comment),
    (Update, Comment),
    (Delete, Comment),
    (Follow, User),
];

const VIEWER_PERMISSIONS: &[(Action, Resource)] = &[(View, Post), (View, Comment)];

fn permissions(role: Option<Role>) -> &'static [(Action, Resource)] {
    match role {
        Some(Role::Admin) => ADMIN_PERMISSIONS,
        Some(Role::User) => USER_PERMISSIONS,
        None => VIEWER_PERMISSIONS,
    }
}

fn requires_ownership(action: Action, resource: Resource) -> bool {
    matches!(
        (action, resource),
        (Update | Delete, Post) | (Update | Delete, Comment)
    )
}

/// Returns whether `user` (or an anonymous viewer when `None`) may perform
/// `action` on `resource`. For edits of posts and comments the caller must
/// also own the resource unless they are an admin.
pub fn check_permission(
    user: Option<&AuthUser>,
    action: Action,
    resource: Resource,
    resource_owner_id: Option<&str>,
) -> bool {
    let role = user.map(|u| u.role);

    if !permissions(role).contains(&(action, resource)) {
        return false;
    }

    if requires_ownership(action, resource) && role != Some(Role::Admin) {
        return match (user, resource_owner_id) {
            (Some(user), Some(owner_id)) => user.id == owner_id,
            _ => false,
        };
    }

    true
}

/// Like [`check_permission`] for an authenticated caller, turning a denial
/// into a `Forbidden` error.
pub fn authorize(
    user: &AuthUser,
    action: Action,
    resource: Resource,
    resource_owner_id: Option<&str>,
) -> Result<()> {
    if check_permission(Some(user), action, resource, resource_owner_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "You do not have permission to {} this {}",
            action.verb(),
            resource.noun()
        )))
    }
}

impl Action {
    fn verb(self) -> &'static str {
        match self {
            Like => "like",
            Follow => "follow",
            View => "view",
            Create => "create",
            Update => "update",
            Delete => "delete",
            ViewStatistics => "view statistics of",
            Manage => "manage",
        }
    }
}

impl Resource {
    fn noun(self) -> &'static str {
        match self {
            Post => "project",
            Comment => "comment",
            User => "user",
            AdminDashboard => "dashboard",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(id: &str, role: Role) -> AuthUser {
        AuthUser {
            id: id.to_string(),
            username: format!("user-{id}"),
            role,
            avatar_url: None,
        }
    }

    #[test]
    fn anonymous_viewers_can_only_view() {
        assert!(check_permission(None, View, Post, None));
        assert!(check_permission(None, View, Comment, None));
        assert!(!check_permission(None, Like, Post, None));
        assert!(!check_permission(None, Create, Comment, None));
        assert!(!check_permission(None, Follow, User, None));
        assert!(!check_permission(None, Delete, Post, Some("someone")));
    }

    #[test]
    fn users_edit_only_their_own_resources() {
        let alice = caller("alice", Role::User);

        assert!(check_permission(Some(&alice), Update, Post, Some("alice")));
        assert!(!check_permission(Some(&alice), Update, Post, Some("bob")));
        assert!(check_permission(Some(&alice), Delete, Comment, Some("alice")));
        assert!(!check_permission(Some(&alice), Delete, Comment, Some("bob")));
        // Unknown owner never passes the ownership check
        assert!(!check_permission(Some(&alice), Delete, Post, None));
    }

    #[test]
    fn users_cannot_reach_admin_actions() {
        let alice = caller("alice", Role::User);

        assert!(check_permission(Some(&alice), Like, Post, None));
        assert!(check_permission(Some(&alice), Follow, User, None));
        assert!(!check_permission(Some(&alice), Manage, Post, None));
        assert!(!check_permission(Some(&alice), Manage, User, None));
        assert!(!check_permission(
            Some(&alice),
            ViewStatistics,
            AdminDashboard,
            None
        ));
        // Not in the user table even though comments are readable anonymously
        assert!(!check_permission(Some(&alice), View, Comment, None));
    }

    #[test]
    fn admins_bypass_ownership() {
        let root = caller("root", Role::Admin);

        assert!(check_permission(Some(&root), Update, Post, Some("alice")));
        assert!(check_permission(Some(&root), Delete, Comment, Some("bob")));
        assert!(check_permission(Some(&root), Delete, Post, None));
        assert!(check_permission(Some(&root), Manage, User, None));
        assert!(check_permission(
            Some(&root),
            ViewStatistics,
            AdminDashboard,
            None
        ));
    }

    #[test]
    fn authorize_reports_forbidden() {
        let alice = caller("alice", Role::User);

        let err = authorize(&alice, Delete, Post, Some("bob")).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(
            err.to_string(),
            "You do not have permission to delete this project"
        );
        assert!(authorize(&alice, Delete, Post, Some("alice")).is_ok());
    }
}
