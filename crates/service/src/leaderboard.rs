//! Ranked score list with fixed capacity.

use std::cmp::Ordering;

use chrono::Utc;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::ServiceError;
use crate::storage::{ListStore, Mutation};

pub const MAX_NAME_LEN: usize = 16;
pub const MAX_SCORE: f64 = 9_999_999.0;
pub const MAX_SCORES: usize = 100;
pub const TOP_N: usize = 10;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScoreEntry {
    pub name: String,
    /// Any finite value in `0..=MAX_SCORE`; whole numbers are written without a fraction.
    #[serde(serialize_with = "serialize_score")]
    pub score: f64,
    /// Submission time, epoch milliseconds.
    #[serde(default, alias = "timestamp")]
    pub ts: i64,
}

fn serialize_score<S: Serializer>(score: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if score.fract() == 0.0 && score_ok(*score) {
        serializer.serialize_u64(*score as u64)
    } else {
        serializer.serialize_f64(*score)
    }
}

impl ScoreEntry {
    pub fn is_valid(&self) -> bool {
        name_ok(&self.name) && score_ok(self.score)
    }
}

fn name_ok(name: &str) -> bool {
    let len = name.trim().chars().count();
    len > 0 && len <= MAX_NAME_LEN
}

fn score_ok(score: f64) -> bool {
    score.is_finite() && (0.0..=MAX_SCORE).contains(&score)
}

/// Higher score first; on equal scores the earlier submission wins.
pub fn rank_order(a: &ScoreEntry, b: &ScoreEntry) -> Ordering {
    b.score.total_cmp(&a.score).then(a.ts.cmp(&b.ts))
}

/// Valid stored entries, ranked. Anything that does not decode is skipped.
pub fn ranked(items: Vec<Value>) -> Vec<ScoreEntry> {
    let total = items.len();
    let mut entries: Vec<ScoreEntry> = items
        .into_iter()
        .filter_map(|v| serde_json::from_value::<ScoreEntry>(v).ok())
        .filter(ScoreEntry::is_valid)
        .collect();
    if entries.len() < total {
        warn!(skipped = total - entries.len(), "dropping invalid leaderboard entries");
    }
    entries.sort_by(rank_order);
    entries
}

/// A validated score submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    name: String,
    score: f64,
}

impl Submission {
    /// `name` is trimmed and cut to `MAX_NAME_LEN` characters; `score` must be
    /// finite and within `0..=MAX_SCORE`.
    pub fn parse(name: &str, score: f64) -> Result<Self, ServiceError> {
        let name: String = name.trim().chars().take(MAX_NAME_LEN).collect();
        if !name_ok(&name) || !score_ok(score) {
            return Err(ServiceError::invalid("Invalid name or score"));
        }
        Ok(Self { name, score })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    fn into_entry(self, ts: i64) -> ScoreEntry {
        ScoreEntry { name: self.name, score: self.score, ts }
    }
}

#[derive(Clone)]
pub struct LeaderboardService {
    list: ListStore,
    max_entries: usize,
    top_n: usize,
}

impl LeaderboardService {
    pub fn new(list: ListStore) -> Self {
        Self { list, max_entries: MAX_SCORES, top_n: TOP_N }
    }

    pub fn with_limits(mut self, max_entries: usize, top_n: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self.top_n = top_n.max(1);
        self
    }

    /// Read-only view of the best `top_n` entries.
    pub async fn top(&self) -> Result<Vec<ScoreEntry>, ServiceError> {
        let snapshot = self.list.read().await?;
        let mut entries = ranked(snapshot.items);
        entries.truncate(self.top_n);
        Ok(entries)
    }

    /// Store a submission stamped with the current time; returns the new top slice.
    pub async fn submit(&self, submission: Submission) -> Result<Vec<ScoreEntry>, ServiceError> {
        self.submit_at(submission, Utc::now().timestamp_millis()).await
    }

    /// Same as `submit` with an explicit timestamp. A conflict re-applies the
    /// same entry (same `ts`) to the freshly read list.
    pub async fn submit_at(&self, submission: Submission, ts: i64) -> Result<Vec<ScoreEntry>, ServiceError> {
        let entry = submission.into_entry(ts);
        let (max_entries, top_n) = (self.max_entries, self.top_n);
        let top = self
            .list
            .modify(|items| {
                let mut entries = ranked(items);
                entries.push(entry.clone());
                entries.sort_by(rank_order);
                entries.truncate(max_entries);
                let top: Vec<ScoreEntry> = entries.iter().take(top_n).cloned().collect();
                Mutation::Replace { items: entries, outcome: top }
            })
            .await?;
        info!(path = %self.list.path(), name = %entry.name, score = entry.score, "score saved");
        Ok(top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryContentStore;
    use serde_json::json;
    use std::sync::Arc;

    const PATH: &str = "tetris_scores.json";

    fn service(store: &Arc<MemoryContentStore>) -> LeaderboardService {
        LeaderboardService::new(ListStore::new(store.clone(), PATH, "chore(tetris): leaderboard update"))
    }

    fn sub(name: &str, score: f64) -> Submission {
        Submission::parse(name, score).unwrap()
    }

    #[test]
    fn submission_rules() {
        assert_eq!(sub("  AL ", 100.0).name(), "AL");
        assert_eq!(sub("x", 0.0).score(), 0.0);
        assert_eq!(sub("sixteen-chars-16", 9_999_999.0).score(), MAX_SCORE);
        assert_eq!(sub("ÄÖÜäöüßÄÖÜäöüßÄ", 1.0).name().chars().count(), 15);
        assert_eq!(sub("ok", 12.5).score(), 12.5);
        // 超长名字截断为前 16 个字符
        assert_eq!(sub("  seventeen-chars-x ", 1.0).name(), "seventeen-chars-");
        assert_eq!(sub("ÄÖÜäöüßÄÖÜäöüßÄÖÜ", 1.0).name(), "ÄÖÜäöüßÄÖÜäöüßÄÖ");

        for (name, score) in [
            ("", 1.0),
            ("   ", 1.0),
            ("ok", -1.0),
            ("ok", 10_000_000.0),
            ("ok", f64::NAN),
            ("ok", f64::INFINITY),
        ] {
            assert!(
                matches!(Submission::parse(name, score), Err(ServiceError::Validation(_))),
                "{name:?}/{score} should be rejected"
            );
        }
    }

    #[test]
    fn ranking_breaks_ties_by_earlier_timestamp() {
        let items = vec![
            json!({"name": "late", "score": 50, "ts": 20}),
            json!({"name": "top", "score": 90, "ts": 30}),
            json!({"name": "early", "score": 50, "ts": 10}),
            json!({"name": "", "score": 99, "ts": 1}),
            json!({"name": "neg", "score": -5, "ts": 1}),
            json!({"name": "huge", "score": 10_000_000, "ts": 1}),
            json!("not an entry"),
            json!({"name": "legacy", "score": 40, "timestamp": 5}),
        ];
        let names: Vec<_> = ranked(items).into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["top", "early", "late", "legacy"]);
    }

    #[tokio::test]
    async fn same_name_entries_are_both_kept() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        let svc = service(&store);
        svc.submit_at(sub("AL", 100.0), 1).await?;
        svc.submit_at(sub("AL", 50.0), 2).await?;

        let top = svc.top().await?;
        assert_eq!(
            top,
            vec![
                ScoreEntry { name: "AL".into(), score: 100.0, ts: 1 },
                ScoreEntry { name: "AL".into(), score: 50.0, ts: 2 },
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn top_is_limited_to_ten_in_rank_order() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        let svc = service(&store);
        let mut last = Vec::new();
        for i in 0..15u32 {
            last = svc.submit_at(sub(&format!("p{i}"), f64::from(i % 5) * 10.0), i64::from(i)).await?;
        }
        assert_eq!(last.len(), TOP_N);
        let top = svc.top().await?;
        assert_eq!(top, last);
        assert!(top.windows(2).all(|w| rank_order(&w[0], &w[1]) != Ordering::Greater));
        // 同分时先提交者排前
        assert_eq!(top[0].name, "p4");
        assert_eq!(top[1].name, "p9");
        assert_eq!(top[2].name, "p14");
        Ok(())
    }

    #[tokio::test]
    async fn capacity_evicts_lowest_ranked() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        let svc = service(&store);
        // 101 entries: scores 1..=101, lowest one must go
        for i in 1..=101u32 {
            svc.submit_at(sub("p", f64::from(i)), i64::from(i)).await?;
        }
        let stored = store.json(PATH).await.unwrap();
        let stored = stored.as_array().unwrap();
        assert_eq!(stored.len(), MAX_SCORES);
        assert_eq!(stored[0]["score"], 101);
        assert_eq!(stored[MAX_SCORES - 1]["score"], 2);
        assert!(stored.iter().all(|e| e["score"] != 1));
        Ok(())
    }

    #[tokio::test]
    async fn tie_at_capacity_evicts_later_submission() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        let svc = service(&store).with_limits(2, 2);
        svc.submit_at(sub("a", 10.0), 1).await?;
        svc.submit_at(sub("b", 10.0), 2).await?;
        svc.submit_at(sub("c", 10.0), 3).await?;
        let names: Vec<_> = svc.top().await?.into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        Ok(())
    }

    #[tokio::test]
    async fn stored_file_uses_ts_field() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        service(&store).submit_at(sub("AL", 7.0), 1_700_000_000_000).await?;
        assert_eq!(
            store.json(PATH).await,
            Some(json!([{"name": "AL", "score": 7, "ts": 1_700_000_000_000_i64}]))
        );
        Ok(())
    }

    #[tokio::test]
    async fn conflict_keeps_both_writers() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        store.seed(PATH, r#"[{"name":"old","score":5,"ts":1}]"#).await;
        store
            .interleave_write(PATH, r#"[{"name":"old","score":5,"ts":1},{"name":"rival","score":60,"ts":2}]"#)
            .await;

        let top = service(&store).submit_at(sub("me", 30.0), 3).await?;
        let names: Vec<_> = top.into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["rival", "me", "old"]);
        assert_eq!(store.put_count(), 2);
        assert_eq!(store.json(PATH).await.unwrap().as_array().unwrap().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_file_is_replaced() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        store.seed(PATH, "<<garbage>>").await;
        let svc = service(&store);
        assert!(svc.top().await?.is_empty());
        svc.submit_at(sub("AL", 1.0), 1).await?;
        assert_eq!(svc.top().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn fractional_scores_survive_reads_and_writes() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        store.seed(PATH, r#"[{"name":"legacy","score":1234.5,"ts":1}]"#).await;
        let svc = service(&store);

        let top = svc.top().await?;
        assert_eq!(top, vec![ScoreEntry { name: "legacy".into(), score: 1234.5, ts: 1 }]);

        svc.submit_at(sub("new", 1.0), 2).await?;
        assert_eq!(
            store.json(PATH).await,
            Some(json!([
                {"name": "legacy", "score": 1234.5, "ts": 1},
                {"name": "new", "score": 1, "ts": 2}
            ]))
        );
        Ok(())
    }

    #[tokio::test]
    async fn fractional_submission_is_ranked_between_whole_scores() -> anyhow::Result<()> {
        let store = MemoryContentStore::new();
        let svc = service(&store);
        svc.submit_at(sub("a", 12.0), 1).await?;
        svc.submit_at(sub("b", 13.0), 2).await?;
        let top = svc.submit_at(sub("c", 12.5), 3).await?;
        let names: Vec<_> = top.into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["b", "c", "a"]);
        Ok(())
    }
}
