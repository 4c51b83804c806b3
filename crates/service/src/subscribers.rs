//! Email subscriber list: normalized, deduplicated, sorted.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::info;

use crate::errors::ServiceError;
use crate::storage::{ListStore, Mutation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    AlreadySubscribed,
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// `local@domain.tld`: one `@`, no whitespace, and a `.` inside the domain
/// with at least one character on each side.
pub fn is_valid_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = s.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => (local, domain),
        _ => return false,
    };
    if local.is_empty() {
        return false;
    }
    let chars: Vec<char> = domain.chars().collect();
    chars.len() >= 3 && chars[1..chars.len() - 1].contains(&'.')
}

/// Stored entries reduced to the set of valid, normalized addresses.
/// Non-string entries are dropped.
pub fn normalize_list(items: &[Value]) -> BTreeSet<String> {
    items
        .iter()
        .filter_map(Value::as_str)
        .map(normalize_email)
        .filter(|e| is_valid_email(e))
        .collect()
}

#[derive(Clone)]
pub struct SubscriberService {
    list: ListStore,
}

impl SubscriberService {
    pub fn new(list: ListStore) -> Self {
        Self { list }
    }

    /// Normalize and validate raw input before any store access.
    pub fn parse_email(raw: &str) -> Result<String, ServiceError> {
        let email = normalize_email(raw);
        if is_valid_email(&email) {
            Ok(email)
        } else {
            Err(ServiceError::invalid("Invalid email"))
        }
    }

    /// Add `raw_email` unless it is already on the list.
    pub async fn subscribe(&self, raw_email: &str) -> Result<SubscribeOutcome, ServiceError> {
        let email = Self::parse_email(raw_email)?;
        let outcome = self
            .list
            .modify(|items| {
                let mut set = normalize_list(&items);
                if !set.insert(email.clone()) {
                    return Mutation::Keep(SubscribeOutcome::AlreadySubscribed);
                }
                Mutation::Replace {
                    items: set.into_iter().collect::<Vec<_>>(),
                    outcome: SubscribeOutcome::Subscribed,
                }
            })
            .await?;
        if outcome == SubscribeOutcome::Subscribed {
            info!(path = %self.list.path(), "new subscriber stored");
        }
        Ok(outcome)
    }

    /// Current subscribers, normalized and sorted.
    pub async fn list(&self) -> Result<Vec<String>, ServiceError> {
        let snapshot = self.list.read().await?;
        Ok(normalize_list(&snapshot.items).into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryContentStore;
    use serde_json::json;
    use std::sync::Arc;

    const PATH: &str = "subscribers.json";

    fn service(store: &Arc<MemoryContentStore>) -> SubscriberService {
        SubscriberService::new(ListStore::new(store.clone(), PATH, "chore(subscribers): +1").with_legacy_key("subscribers"))
    }

    #[test]
    fn email_shape_rules() {
        for ok in ["a@b.co", "first.last@sub.example.org", "x+tag@d.io", "a@b.c.d"] {
            assert!(is_valid_email(ok), "{ok} should be valid");
        }
        for bad in [
            "", "plain", "@b.co", "a@", "a@b", "a@.co", "a@b.", "a@@b.co", "a@b@c.co", "a b@c.co", "a@b .co",
            "a@b.co\t",
        ] {
            assert!(!is_valid_email(bad), "{bad:?} should be invalid");
        }
    }

    #[test]
    fn parse_trims_and_lowercases() {
        assert_eq!(SubscriberService::parse_email("  Foo@Example.COM ").unwrap(), "foo@example.com");
        assert!(matches!(SubscriberService::parse_email("nope"), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn normalize_list_filters_and_dedups() {
        let items = vec![json!("B@x.io"), json!("b@x.io "), json!(42), json!({"email": "c@x.io"}), json!("bad"), json!("a@x.io")];
        let set: Vec<_> = normalize_list(&items).into_iter().collect();
        assert_eq!(set, vec!["a@x.io".to_string(), "b@x.io".to_string()]);
    }

    #[tokio::test]
    async fn subscribe_twice_is_idempotent() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        let svc = service(&store);

        assert_eq!(svc.subscribe("Zed@Example.com").await?, SubscribeOutcome::Subscribed);
        assert_eq!(svc.subscribe("zed@example.com").await?, SubscribeOutcome::AlreadySubscribed);
        assert_eq!(store.put_count(), 1);
        assert_eq!(store.json(PATH).await, Some(json!(["zed@example.com"])));
        Ok(())
    }

    #[tokio::test]
    async fn new_email_lands_in_sorted_position() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        store.seed(PATH, r#"["c@x.io", "A@x.io", "A@X.IO", 7]"#).await;
        service(&store).subscribe("b@x.io").await?;
        assert_eq!(store.json(PATH).await, Some(json!(["a@x.io", "b@x.io", "c@x.io"])));
        Ok(())
    }

    #[tokio::test]
    async fn invalid_email_never_touches_store() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        let svc = service(&store);
        for bad in ["no-at-sign", "sp ace@x.io", "a@nodot"] {
            assert!(matches!(svc.subscribe(bad).await, Err(ServiceError::Validation(_))));
        }
        assert_eq!(store.fetch_count(), 0);
        assert_eq!(store.put_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn legacy_wrapper_is_migrated_on_write() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        store.seed(PATH, r#"{"subscribers": ["old@x.io"]}"#).await;
        service(&store).subscribe("new@x.io").await?;
        assert_eq!(store.json(PATH).await, Some(json!(["new@x.io", "old@x.io"])));
        Ok(())
    }

    #[tokio::test]
    async fn conflict_merges_concurrent_subscriber() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        store.seed(PATH, r#"["a@x.io"]"#).await;
        store.interleave_write(PATH, r#"["a@x.io", "z@x.io"]"#).await;

        let out = service(&store).subscribe("m@x.io").await?;
        assert_eq!(out, SubscribeOutcome::Subscribed);
        assert_eq!(store.json(PATH).await, Some(json!(["a@x.io", "m@x.io", "z@x.io"])));
        Ok(())
    }

    #[tokio::test]
    async fn conflict_with_same_email_needs_no_second_write() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        store.interleave_write(PATH, r#"["m@x.io"]"#).await;

        let out = service(&store).subscribe("m@x.io").await?;
        assert_eq!(out, SubscribeOutcome::AlreadySubscribed);
        assert_eq!(store.put_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn round_trip_yields_normalized_sorted_set() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        let svc = service(&store);
        ListStore::new(store.clone(), PATH, "seed")
            .write(&["Q@x.io", "a@x.io", "q@x.io", "junk", " b@x.io"], None)
            .await?;
        assert_eq!(svc.list().await?, vec!["a@x.io", "b@x.io", "q@x.io"]);
        Ok(())
    }
}
