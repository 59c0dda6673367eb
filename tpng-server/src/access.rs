//! Access resolution
//!
//! Which systems and talkgroups a user may see, from the system ACLs and
//! (when a system opts in) the talkgroup ACLs. Every call reads committed
//! state; nothing is cached. Results are ordered (systems by name,
//! talkgroups by decimal ID) so repeated calls return identical lists.

use serde::Serialize;
use sqlx::SqlitePool;
use tpng_common::db::{System, TalkGroup, Transmission};
use tpng_common::Result;
use uuid::Uuid;

use crate::db::{systems, talkgroups};

/// Identity every access check runs as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub is_site_admin: bool,
}

impl AuthContext {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_site_admin: false,
        }
    }

    pub fn site_admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_site_admin: true,
        }
    }
}

/// Systems visible to the caller
///
/// Site admins see everything; anyone else sees systems whose ACL is public
/// or lists them.
pub async fn allowed_systems(pool: &SqlitePool, auth: &AuthContext) -> Result<Vec<System>> {
    if auth.is_site_admin {
        return systems::list_systems(pool).await;
    }
    systems::list_systems_for_user(pool, auth.user_id).await
}

/// Talkgroups of `system` visible to the caller
///
/// Does not check system visibility. With talkgroup ACLs enabled this is
/// the union of every talkgroup ACL listing the user, which may be empty
/// while the system itself stays visible.
pub async fn allowed_talkgroups(
    pool: &SqlitePool,
    system: &System,
    auth: &AuthContext,
) -> Result<Vec<TalkGroup>> {
    if auth.is_site_admin || !system.enable_talkgroup_acls {
        return talkgroups::list_for_system(pool, system.id).await;
    }
    talkgroups::list_for_user_acls(pool, system.id, auth.user_id).await
}

pub async fn can_view_system(pool: &SqlitePool, system_id: Uuid, auth: &AuthContext) -> Result<bool> {
    Ok(allowed_systems(pool, auth)
        .await?
        .iter()
        .any(|s| s.id == system_id))
}

/// System visibility and talkgroup visibility together
pub async fn can_view_talkgroup(
    pool: &SqlitePool,
    system: &System,
    talkgroup_id: Uuid,
    auth: &AuthContext,
) -> Result<bool> {
    if !can_view_system(pool, system.id, auth).await? {
        return Ok(false);
    }
    Ok(allowed_talkgroups(pool, system, auth)
        .await?
        .iter()
        .any(|t| t.id == talkgroup_id))
}

pub async fn can_view_transmission(
    pool: &SqlitePool,
    transmission: &Transmission,
    auth: &AuthContext,
) -> Result<bool> {
    let Some(system) = systems::get_system(pool, transmission.system_id).await? else {
        return Ok(false);
    };
    can_view_talkgroup(pool, &system, transmission.talkgroup_id, auth).await
}

/// IDs of every talkgroup the caller may view across all visible systems
pub async fn visible_talkgroup_ids(pool: &SqlitePool, auth: &AuthContext) -> Result<Vec<Uuid>> {
    let mut ids = Vec::new();
    for system in allowed_systems(pool, auth).await? {
        ids.extend(allowed_talkgroups(pool, &system, auth).await?.into_iter().map(|t| t.id));
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::acls::{create_system_acl, create_talkgroup_acl, NewTalkGroupAcl};
    use crate::db::systems::{create_system, NewSystem};
    use crate::db::talkgroups::{create_talkgroup, NewTalkGroup};
    use crate::db::users::create_user;
    use tpng_common::db::init_memory_database;

    #[tokio::test]
    async fn test_private_system_requires_membership() {
        let pool = init_memory_database().await.unwrap();
        let member = Uuid::new_v4();
        let outsider = Uuid::new_v4();
        create_user(&pool, member, false).await.unwrap();
        create_user(&pool, outsider, false).await.unwrap();

        let public_acl = create_system_acl(&pool, "public", true, &[]).await.unwrap();
        let private_acl = create_system_acl(&pool, "private", false, &[member]).await.unwrap();
        let open = create_system(&pool, NewSystem::new("B Open", public_acl.id)).await.unwrap();
        let closed = create_system(&pool, NewSystem::new("A Closed", private_acl.id)).await.unwrap();

        let names = |systems: Vec<System>| systems.into_iter().map(|s| s.name).collect::<Vec<_>>();

        assert_eq!(
            names(allowed_systems(&pool, &AuthContext::user(member)).await.unwrap()),
            vec!["A Closed", "B Open"]
        );
        assert_eq!(
            names(allowed_systems(&pool, &AuthContext::user(outsider)).await.unwrap()),
            vec!["B Open"]
        );
        assert_eq!(
            names(allowed_systems(&pool, &AuthContext::site_admin(outsider)).await.unwrap()),
            vec!["A Closed", "B Open"]
        );
        assert!(can_view_system(&pool, open.id, &AuthContext::user(outsider)).await.unwrap());
        assert!(!can_view_system(&pool, closed.id, &AuthContext::user(outsider)).await.unwrap());
    }

    #[tokio::test]
    async fn test_talkgroup_acls_disabled_returns_every_talkgroup() {
        let pool = init_memory_database().await.unwrap();
        let user = Uuid::new_v4();
        create_user(&pool, user, false).await.unwrap();
        let acl = create_system_acl(&pool, "public", true, &[]).await.unwrap();
        let system = create_system(&pool, NewSystem::new("County", acl.id)).await.unwrap();
        create_talkgroup(&pool, NewTalkGroup::new(system.id, 200, "EMS")).await.unwrap();
        create_talkgroup(&pool, NewTalkGroup::new(system.id, 100, "FIRE1")).await.unwrap();

        let tags: Vec<String> = allowed_talkgroups(&pool, &system, &AuthContext::user(user))
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.alpha_tag)
            .collect();
        assert_eq!(tags, vec!["FIRE1", "EMS"]);
    }

    #[tokio::test]
    async fn test_talkgroup_acl_union_and_empty_result() {
        let pool = init_memory_database().await.unwrap();
        let listed = Uuid::new_v4();
        let unlisted = Uuid::new_v4();
        create_user(&pool, listed, false).await.unwrap();
        create_user(&pool, unlisted, false).await.unwrap();

        let acl = create_system_acl(&pool, "public", true, &[]).await.unwrap();
        let mut new_system = NewSystem::new("County", acl.id);
        new_system.enable_talkgroup_acls = true;
        let system = create_system(&pool, new_system).await.unwrap();
        let fire = create_talkgroup(&pool, NewTalkGroup::new(system.id, 100, "FIRE1")).await.unwrap();
        let ems = create_talkgroup(&pool, NewTalkGroup::new(system.id, 200, "EMS")).await.unwrap();
        create_talkgroup(&pool, NewTalkGroup::new(system.id, 300, "PD")).await.unwrap();

        for (name, talkgroup) in [("fire", fire.id), ("ems", ems.id)] {
            create_talkgroup_acl(
                &pool,
                NewTalkGroupAcl {
                    name: name.to_string(),
                    users: vec![listed],
                    talkgroups: vec![talkgroup],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let visible = allowed_talkgroups(&pool, &system, &AuthContext::user(listed)).await.unwrap();
        assert_eq!(visible.iter().map(|t| t.id).collect::<Vec<_>>(), vec![fire.id, ems.id]);

        // System stays visible with zero talkgroups
        let auth = AuthContext::user(unlisted);
        assert!(can_view_system(&pool, system.id, &auth).await.unwrap());
        assert!(allowed_talkgroups(&pool, &system, &auth).await.unwrap().is_empty());
        assert!(!can_view_talkgroup(&pool, &system, fire.id, &auth).await.unwrap());
    }

    #[tokio::test]
    async fn test_allowed_talkgroups_is_idempotent() {
        let pool = init_memory_database().await.unwrap();
        let user = Uuid::new_v4();
        create_user(&pool, user, false).await.unwrap();
        let acl = create_system_acl(&pool, "public", true, &[]).await.unwrap();
        let mut new_system = NewSystem::new("County", acl.id);
        new_system.enable_talkgroup_acls = true;
        let system = create_system(&pool, new_system).await.unwrap();
        let everyone = create_talkgroup_acl(
            &pool,
            NewTalkGroupAcl {
                name: "everyone".to_string(),
                users: vec![user],
                ..Default::default()
            },
        )
        .await
        .unwrap();
        for decimal in [5, 3, 9] {
            let tg = create_talkgroup(&pool, NewTalkGroup::new(system.id, decimal, "TG"))
                .await
                .unwrap();
            crate::db::acls::add_talkgroup_acl_talkgroup(&pool, everyone.id, tg.id)
                .await
                .unwrap();
        }

        let auth = AuthContext::user(user);
        let first = allowed_talkgroups(&pool, &system, &auth).await.unwrap();
        let second = allowed_talkgroups(&pool, &system, &auth).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.iter().map(|t| t.decimal_id).collect::<Vec<_>>(), vec![3, 5, 9]);
    }

    #[tokio::test]
    async fn test_new_talkgroup_joins_default_acls() {
        let pool = init_memory_database().await.unwrap();
        let user = Uuid::new_v4();
        create_user(&pool, user, false).await.unwrap();
        create_talkgroup_acl(
            &pool,
            NewTalkGroupAcl {
                name: "everyone".to_string(),
                users: vec![user],
                default_new_talkgroups: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let acl = create_system_acl(&pool, "public", true, &[]).await.unwrap();
        let mut new_system = NewSystem::new("County", acl.id);
        new_system.enable_talkgroup_acls = true;
        let system = create_system(&pool, new_system).await.unwrap();
        let tg = create_talkgroup(&pool, NewTalkGroup::new(system.id, 100, "FIRE1")).await.unwrap();

        assert!(can_view_talkgroup(&pool, &system, tg.id, &AuthContext::user(user)).await.unwrap());
    }
}
