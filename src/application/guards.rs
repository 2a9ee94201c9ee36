//! Role and ownership checks shared by every use case.

use crate::domain::UserId;
use crate::domain::ports::MarketStore;
use crate::domain::user::{Actor, Role};
use crate::error::{MarketError, Result};

/// Resolves the caller's identity. A missing or unknown user id is
/// `Unauthenticated`; roles are always taken from the stored profile.
pub async fn authenticate(store: &dyn MarketStore, user_id: Option<UserId>) -> Result<Actor> {
    let user_id = user_id.ok_or(MarketError::Unauthenticated)?;
    match store.user(user_id).await? {
        Some(profile) => Ok(Actor::from(&profile)),
        None => Err(MarketError::Unauthenticated),
    }
}

pub fn require_role(actor: &Actor, role: Role) -> Result<()> {
    if actor.role == role {
        Ok(())
    } else {
        Err(MarketError::Forbidden(format!(
            "this operation requires the {role} role (caller is {})",
            actor.role
        )))
    }
}

pub fn require_admin(actor: &Actor) -> Result<()> {
    require_role(actor, Role::Admin)
}

/// The actor must be `owner_id` itself; admins get no bypass here.
pub fn require_ownership(actor: &Actor, owner_id: UserId, what: &str) -> Result<()> {
    if actor.user_id == owner_id {
        Ok(())
    } else {
        Err(MarketError::Forbidden(format!("caller does not own this {what}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::store::{ChangeSet, Record};
    use crate::domain::user::UserProfile;
    use crate::infrastructure::in_memory::InMemoryMarketStore;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_authenticate() {
        let store = InMemoryMarketStore::new();
        let profile = UserProfile {
            id: Uuid::new_v4(),
            email: "olga@example.com".to_string(),
            full_name: "Olga Ops".to_string(),
            role: Role::Admin,
            payee_account: None,
            created_at: Utc::now(),
        };
        store
            .commit(ChangeSet::new().put(Record::User(profile.clone())))
            .await
            .unwrap();

        let actor = authenticate(&store, Some(profile.id)).await.unwrap();
        assert_eq!(actor.role, Role::Admin);
        assert!(matches!(
            authenticate(&store, None).await,
            Err(MarketError::Unauthenticated)
        ));
        assert!(matches!(
            authenticate(&store, Some(Uuid::new_v4())).await,
            Err(MarketError::Unauthenticated)
        ));
    }

    #[test]
    fn test_role_and_ownership() {
        let actor = Actor::new(Uuid::new_v4(), Role::Client);
        assert!(require_role(&actor, Role::Client).is_ok());
        assert!(matches!(
            require_admin(&actor),
            Err(MarketError::Forbidden(_))
        ));
        assert!(require_ownership(&actor, actor.user_id, "project").is_ok());
        assert!(require_ownership(&actor, Uuid::new_v4(), "project").is_err());
    }
}
