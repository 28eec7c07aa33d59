//! Who may see a project.
//!
//! A project is visible when it is public, or when it is private and the
//! viewer either owns it or is an admin. Anonymous viewers only see public
//! projects. The SQL rendering below is the one used by every project read
//! path, so the Rust and SQL forms must stay in step.

use sqlx::{QueryBuilder, Sqlite};

use crate::{
    db::models::{Role, Visibility},
    middleware::auth::AuthUser,
};

pub fn can_view(viewer: Option<&AuthUser>, owner_id: &str, visibility: Visibility) -> bool {
    match visibility {
        Visibility::Public => true,
        Visibility::Private => {
            viewer.is_some_and(|v| v.id == owner_id || v.role == Role::Admin)
        }
    }
}

/// Appends the visibility condition over the `p` (projects) alias.
pub fn push_visibility_filter(qb: &mut QueryBuilder<'_, Sqlite>, viewer: Option<&AuthUser>) {
    match viewer {
        None => {
            qb.push("p.visibility = ");
            qb.push_bind(Visibility::Public);
        }
        Some(viewer) => {
            qb.push("(p.visibility = ");
            qb.push_bind(Visibility::Public);
            qb.push(" OR (p.visibility = ");
            qb.push_bind(Visibility::Private);
            qb.push(" AND (p.user_id = ");
            qb.push_bind(viewer.id.clone());
            qb.push(" OR ");
            qb.push_bind(viewer.role == Role::Admin);
            qb.push(")))");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewer(id: &str, role: Role) -> AuthUser {
        AuthUser {
            id: id.to_string(),
            username: id.to_string(),
            role,
            avatar_url: None,
        }
    }

    #[test]
    fn public_projects_are_visible_to_everyone() {
        assert!(can_view(None, "owner", Visibility::Public));
        assert!(can_view(
            Some(&viewer("other", Role::User)),
            "owner",
            Visibility::Public
        ));
    }

    #[test]
    fn private_projects_need_owner_or_admin() {
        assert!(!can_view(None, "owner", Visibility::Private));
        assert!(!can_view(
            Some(&viewer("other", Role::User)),
            "owner",
            Visibility::Private
        ));
        assert!(can_view(
            Some(&viewer("owner", Role::User)),
            "owner",
            Visibility::Private
        ));
        assert!(can_view(
            Some(&viewer("root", Role::Admin)),
            "owner",
            Visibility::Private
        ));
    }

    #[test]
    fn anonymous_filter_only_matches_public() {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT 1 FROM projects p WHERE ");
        push_visibility_filter(&mut qb, None);
        assert_eq!(qb.sql(), "SELECT 1 FROM projects p WHERE p.visibility = ?");
    }

    #[test]
    fn signed_in_filter_checks_owner_and_role() {
        let mut qb = QueryBuilder::<Sqlite>::new("");
        push_visibility_filter(&mut qb, Some(&viewer("alice", Role::User)));
        assert_eq!(
            qb.sql(),
            "(p.visibility = ? OR (p.visibility = ? AND (p.user_id = ? OR ?)))"
        );
    }
}
