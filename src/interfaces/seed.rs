use crate::domain::ports::MarketStore;
use crate::domain::store::{ChangeSet, Record};
use crate::domain::user::UserProfile;
use crate::error::Result;
use std::io::Read;
use tracing::info;

/// Loads user profiles from a JSON array and stores them in one commit.
///
/// Profiles already present are overwritten, so seeding the same file twice
/// against a persistent store is harmless.
pub async fn seed_users(store: &dyn MarketStore, source: impl Read) -> Result<usize> {
    let users: Vec<UserProfile> = serde_json::from_reader(source)?;
    let count = users.len();
    let changes = users
        .into_iter()
        .fold(ChangeSet::new(), |changes, user| changes.put(Record::User(user)));
    store.commit(changes).await?;
    info!(count, "seeded users");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::Role;
    use crate::infrastructure::in_memory::InMemoryMarketStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_seed_users() {
        let store = InMemoryMarketStore::new();
        let client = Uuid::new_v4();
        let expert = Uuid::new_v4();
        let json = format!(
            r#"[
                {{"id":"{client}","email":"c@example.com","full_name":"Carla","role":"client"}},
                {{"id":"{expert}","email":"e@example.com","full_name":"Eli","role":"expert",
                  "payee_account":"acct_eli"}}
            ]"#
        );

        let count = seed_users(&store, json.as_bytes()).await.unwrap();
        assert_eq!(count, 2);

        let loaded = store.user(expert).await.unwrap().unwrap();
        assert_eq!(loaded.role, Role::Expert);
        assert_eq!(loaded.payee_account.unwrap().0, "acct_eli");
        assert!(store.user(client).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_seed_rejects_malformed_file() {
        let store = InMemoryMarketStore::new();
        let result = seed_users(&store, "{not a list}".as_bytes()).await;
        assert!(result.is_err());
    }
}
