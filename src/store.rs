//! Subject Store
//!
//! SQLite persistence for subjects, chat messages, facts, contacts and lead
//! signals. Contacts and signals are proper one-to-many tables; they are not
//! mirrored into fact rows.
//!
//! Every operation is a single statement, so callers can share the store
//! behind a mutex without holding it across `.await` points.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use crate::facts::{Fact, FactCategory, FactSnapshot, MergeOutcome, MergePolicy};
use crate::scoring::Profile;

/// Current time in unix milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The person being conversed with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    /// Bot replies enabled
    pub active: bool,
    /// Human timing simulation (delays, typing, quiet hours)
    pub human_mode: bool,
    pub quiet_start: u8,
    pub quiet_end: u8,
    pub joined_at: i64,
    pub last_activity: i64,
}

impl Subject {
    /// Name for display in logs and the dashboard
    pub fn display_name(&self) -> String {
        self.first_name
            .clone()
            .or_else(|| self.username.clone())
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub subject_id: i64,
    pub role: Role,
    pub content: String,
    /// Unix milliseconds
    pub timestamp: i64,
}

/// A person the subject mentioned
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub subject_id: i64,
    pub name: String,
    pub relationship: Option<String>,
    pub info: Option<String>,
    /// Free-form rating, e.g. "high", "medium", "low"
    pub potential: Option<String>,
    pub created_at: i64,
}

/// A recorded buying/interest signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSignal {
    pub subject_id: i64,
    pub text: String,
    pub category: Option<String>,
    pub created_at: i64,
}

/// Store with SQLite backend
pub struct Store {
    conn: Connection,
    default_quiet_start: u8,
    default_quiet_end: u8,
}

impl Store {
    /// Open or create the database
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn,
            default_quiet_start: 0,
            default_quiet_end: 7,
        };
        store.init_schema()?;

        info!("Store opened: {}", path.display());
        Ok(store)
    }

    /// In-memory database (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn,
            default_quiet_start: 0,
            default_quiet_end: 7,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Quiet window given to newly created subjects
    pub fn with_default_quiet_hours(mut self, start: u8, end: u8) -> Self {
        self.default_quiet_start = start;
        self.default_quiet_end = end;
        self
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                username TEXT,
                first_name TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                human_mode INTEGER NOT NULL DEFAULT 1,
                quiet_start INTEGER NOT NULL DEFAULT 0,
                quiet_end INTEGER NOT NULL DEFAULT 7,
                joined_at INTEGER NOT NULL,
                last_activity INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                role TEXT NOT NULL CHECK(role IN ('user', 'assistant')),
                content TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_user ON messages(user_id, id);

            CREATE TABLE IF NOT EXISTS facts (
                user_id INTEGER NOT NULL REFERENCES users(id),
                fact_key TEXT NOT NULL,
                fact_value TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT 'fact',
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, fact_key)
            );

            CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                name TEXT NOT NULL,
                relationship TEXT,
                info TEXT,
                potential TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_contacts_user ON contacts(user_id);

            CREATE TABLE IF NOT EXISTS lead_signals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                signal TEXT NOT NULL,
                category TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_signals_user ON lead_signals(user_id);
            "#,
        )?;

        Ok(())
    }

    // --- Subjects ---

    /// Create a subject on first contact or refresh its names.
    /// Always touches `last_activity`.
    pub fn upsert_subject(
        &self,
        id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<()> {
        let now = now_millis();
        self.conn.execute(
            r#"
            INSERT INTO users (id, username, first_name, quiet_start, quiet_end, joined_at, last_activity)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT(id) DO UPDATE SET
                username = COALESCE(excluded.username, username),
                first_name = COALESCE(excluded.first_name, first_name),
                last_activity = excluded.last_activity
            "#,
            params![
                id,
                username,
                first_name,
                self.default_quiet_start,
                self.default_quiet_end,
                now
            ],
        )?;
        Ok(())
    }

    pub fn get_subject(&self, id: i64) -> Result<Option<Subject>> {
        let subject = self
            .conn
            .query_row(
                "SELECT id, username, first_name, is_active, human_mode, quiet_start, quiet_end,
                        joined_at, last_activity
                 FROM users WHERE id = ?1",
                params![id],
                subject_from_row,
            )
            .optional()?;
        Ok(subject)
    }

    /// All subjects, most recently active first
    pub fn list_subjects(&self) -> Result<Vec<Subject>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, username, first_name, is_active, human_mode, quiet_start, quiet_end,
                    joined_at, last_activity
             FROM users ORDER BY last_activity DESC",
        )?;
        let subjects = stmt
            .query_map([], subject_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(subjects)
    }

    /// Flip the active flag; returns the new value (None for unknown subjects)
    pub fn toggle_active(&self, id: i64) -> Result<Option<bool>> {
        self.conn.execute(
            "UPDATE users SET is_active = NOT is_active WHERE id = ?1",
            params![id],
        )?;
        Ok(self.get_subject(id)?.map(|s| s.active))
    }

    /// Flip the human-mode flag; returns the new value (None for unknown subjects)
    pub fn toggle_human_mode(&self, id: i64) -> Result<Option<bool>> {
        self.conn.execute(
            "UPDATE users SET human_mode = NOT human_mode WHERE id = ?1",
            params![id],
        )?;
        Ok(self.get_subject(id)?.map(|s| s.human_mode))
    }

    /// Set the quiet window; hours must be 0-23. Returns false for unknown subjects.
    pub fn set_quiet_hours(&self, id: i64, start: u8, end: u8) -> Result<bool> {
        if start > 23 || end > 23 {
            anyhow::bail!("quiet hours out of range: {}-{}", start, end);
        }
        let rows = self.conn.execute(
            "UPDATE users SET quiet_start = ?1, quiet_end = ?2 WHERE id = ?3",
            params![start, end, id],
        )?;
        Ok(rows > 0)
    }

    /// Unknown subjects count as active
    pub fn is_active(&self, id: i64) -> Result<bool> {
        Ok(self.get_subject(id)?.map(|s| s.active).unwrap_or(true))
    }

    /// Unknown subjects have human mode off
    pub fn is_human_mode(&self, id: i64) -> Result<bool> {
        Ok(self.get_subject(id)?.map(|s| s.human_mode).unwrap_or(false))
    }

    // --- Messages ---

    /// Append a message to the subject's history
    pub fn append_message(&self, subject_id: i64, role: Role, content: &str) -> Result<i64> {
        let now = now_millis();
        self.conn.execute(
            "INSERT INTO messages (user_id, role, content, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![subject_id, role.as_str(), content, now],
        )?;
        self.conn.execute(
            "UPDATE users SET last_activity = ?1 WHERE id = ?2",
            params![now, subject_id],
        )?;
        debug!("Stored {} message for subject {}", role, subject_id);
        Ok(self.conn.last_insert_rowid())
    }

    /// The `limit` most recent messages in chronological order
    pub fn recent_messages(&self, subject_id: i64, limit: usize) -> Result<Vec<StoredMessage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, role, content, timestamp FROM messages
             WHERE user_id = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let mut messages = stmt
            .query_map(params![subject_id, limit as i64], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Complete history in insertion order
    pub fn full_chat(&self, subject_id: i64) -> Result<Vec<StoredMessage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, role, content, timestamp FROM messages
             WHERE user_id = ?1
             ORDER BY id ASC",
        )?;
        let messages = stmt
            .query_map(params![subject_id], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    // --- Facts ---

    pub fn get_fact(&self, subject_id: i64, key: &str) -> Result<Option<Fact>> {
        let fact = self
            .conn
            .query_row(
                "SELECT user_id, fact_key, fact_value, category, updated_at
                 FROM facts WHERE user_id = ?1 AND fact_key = ?2",
                params![subject_id, key],
                fact_from_row,
            )
            .optional()?;
        Ok(fact)
    }

    /// Last-write-wins upsert of one key
    pub fn put_fact(
        &self,
        subject_id: i64,
        key: &str,
        value: &str,
        category: FactCategory,
    ) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO facts (user_id, fact_key, fact_value, category, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_id, fact_key) DO UPDATE SET
                fact_value = excluded.fact_value,
                category = excluded.category,
                updated_at = excluded.updated_at
            "#,
            params![subject_id, key, value, category.as_str(), now_millis()],
        )?;
        Ok(())
    }

    /// Apply the merge policy for a reported hard fact.
    /// Returns the stored value, or None when the value was discarded.
    pub fn apply_fact(
        &self,
        policy: &MergePolicy,
        subject_id: i64,
        key: &str,
        value: &str,
    ) -> Result<Option<String>> {
        let old = self.get_fact(subject_id, key)?;
        let outcome = policy.merge(key, old.as_ref().map(|f| f.value.as_str()), value);

        match outcome {
            MergeOutcome::Skip => {
                debug!("Discarded empty/unknown value for {}", key);
                Ok(None)
            }
            MergeOutcome::Unchanged(stored) | MergeOutcome::Write(stored) => {
                self.put_fact(subject_id, key, &stored, FactCategory::Fact)?;
                Ok(Some(stored))
            }
        }
    }

    /// All facts of a subject
    pub fn facts(&self, subject_id: i64) -> Result<Vec<Fact>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, fact_key, fact_value, category, updated_at
             FROM facts WHERE user_id = ?1 ORDER BY fact_key",
        )?;
        let facts = stmt
            .query_map(params![subject_id], fact_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(facts)
    }

    /// Facts grouped by category
    pub fn fact_snapshot(&self, subject_id: i64) -> Result<FactSnapshot> {
        let mut snapshot = FactSnapshot::default();
        for fact in self.facts(subject_id)? {
            snapshot.insert(fact.key, fact.value, fact.category);
        }
        Ok(snapshot)
    }

    // --- Contacts & signals ---

    pub fn add_contact(
        &self,
        subject_id: i64,
        name: &str,
        relationship: Option<&str>,
        info: Option<&str>,
        potential: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO contacts (user_id, name, relationship, info, potential, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![subject_id, name, relationship, info, potential, now_millis()],
        )?;
        Ok(())
    }

    pub fn contacts(&self, subject_id: i64) -> Result<Vec<Contact>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, name, relationship, info, potential, created_at
             FROM contacts WHERE user_id = ?1 ORDER BY id",
        )?;
        let contacts = stmt
            .query_map(params![subject_id], |row| {
                Ok(Contact {
                    subject_id: row.get(0)?,
                    name: row.get(1)?,
                    relationship: row.get(2)?,
                    info: row.get(3)?,
                    potential: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(contacts)
    }

    pub fn add_signal(&self, subject_id: i64, text: &str, category: Option<&str>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO lead_signals (user_id, signal, category, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![subject_id, text, category, now_millis()],
        )?;
        Ok(())
    }

    pub fn signals(&self, subject_id: i64) -> Result<Vec<LeadSignal>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, signal, category, created_at
             FROM lead_signals WHERE user_id = ?1 ORDER BY id",
        )?;
        let signals = stmt
            .query_map(params![subject_id], |row| {
                Ok(LeadSignal {
                    subject_id: row.get(0)?,
                    text: row.get(1)?,
                    category: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(signals)
    }

    /// Scorer input for a subject
    pub fn profile(&self, subject_id: i64) -> Result<Profile> {
        let snapshot = self.fact_snapshot(subject_id)?;
        Ok(Profile {
            facts: snapshot.facts,
            meta: snapshot.meta,
            signals: self.signals(subject_id)?,
            contacts: self.contacts(subject_id)?,
        })
    }

    /// Totals for the health endpoint
    pub fn stats(&self) -> Result<StoreStats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(StoreStats {
            subjects: count("SELECT COUNT(*) FROM users")?,
            messages: count("SELECT COUNT(*) FROM messages")?,
            facts: count("SELECT COUNT(*) FROM facts")?,
        })
    }
}

/// Store totals
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub subjects: usize,
    pub messages: usize,
    pub facts: usize,
}

fn subject_from_row(row: &Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: row.get(0)?,
        username: row.get(1)?,
        first_name: row.get(2)?,
        active: row.get(3)?,
        human_mode: row.get(4)?,
        quiet_start: row.get(5)?,
        quiet_end: row.get(6)?,
        joined_at: row.get(7)?,
        last_activity: row.get(8)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<StoredMessage> {
    let role: String = row.get(2)?;
    Ok(StoredMessage {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        role: if role == "assistant" { Role::Assistant } else { Role::User },
        content: row.get(3)?,
        timestamp: row.get(4)?,
    })
}

fn fact_from_row(row: &Row<'_>) -> rusqlite::Result<Fact> {
    let category: String = row.get(3)?;
    Ok(Fact {
        subject_id: row.get(0)?,
        key: row.get(1)?,
        value: row.get(2)?,
        category: FactCategory::from_tag(&category),
        updated_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    #[test]
    fn test_subject_defaults() {
        let store = store().with_default_quiet_hours(23, 6);
        store.upsert_subject(42, Some("maxi"), Some("Max")).unwrap();

        let subject = store.get_subject(42).unwrap().unwrap();
        assert!(subject.active);
        assert!(subject.human_mode);
        assert_eq!(subject.quiet_start, 23);
        assert_eq!(subject.quiet_end, 6);
        assert_eq!(subject.display_name(), "Max");
    }

    #[test]
    fn test_upsert_keeps_names_when_missing() {
        let store = store();
        store.upsert_subject(1, Some("maxi"), Some("Max")).unwrap();
        store.upsert_subject(1, None, None).unwrap();

        let subject = store.get_subject(1).unwrap().unwrap();
        assert_eq!(subject.username.as_deref(), Some("maxi"));
        assert_eq!(subject.first_name.as_deref(), Some("Max"));
    }

    #[test]
    fn test_toggles() {
        let store = store();
        store.upsert_subject(1, None, Some("A")).unwrap();

        assert_eq!(store.toggle_active(1).unwrap(), Some(false));
        assert!(!store.is_active(1).unwrap());
        assert_eq!(store.toggle_human_mode(1).unwrap(), Some(false));
        assert!(!store.is_human_mode(1).unwrap());

        // unknown subjects
        assert_eq!(store.toggle_active(99).unwrap(), None);
        assert!(store.is_active(99).unwrap());
        assert!(!store.is_human_mode(99).unwrap());
    }

    #[test]
    fn test_quiet_hours_validation() {
        let store = store();
        store.upsert_subject(1, None, None).unwrap();

        assert!(store.set_quiet_hours(1, 22, 6).unwrap());
        let subject = store.get_subject(1).unwrap().unwrap();
        assert_eq!((subject.quiet_start, subject.quiet_end), (22, 6));

        assert!(store.set_quiet_hours(1, 24, 6).is_err());
        assert!(!store.set_quiet_hours(77, 1, 2).unwrap());
    }

    #[test]
    fn test_messages_in_insertion_order() {
        let store = store();
        store.upsert_subject(1, None, None).unwrap();
        for i in 0..5 {
            store
                .append_message(1, Role::User, &format!("Nachricht {}", i))
                .unwrap();
        }
        store.append_message(1, Role::Assistant, "Antwort").unwrap();

        let recent = store.recent_messages(1, 3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "Nachricht 3");
        assert_eq!(recent[2].content, "Antwort");
        assert_eq!(recent[2].role, Role::Assistant);

        assert_eq!(store.full_chat(1).unwrap().len(), 6);
        assert!(store.full_chat(2).unwrap().is_empty());
    }

    #[test]
    fn test_apply_fact_merge_rules() {
        let store = store();
        let policy = MergePolicy::default();
        store.upsert_subject(1, None, None).unwrap();

        store.apply_fact(&policy, 1, "hobbys", "Fußball").unwrap();
        store.apply_fact(&policy, 1, "hobbys", "Kochen").unwrap();
        store.apply_fact(&policy, 1, "hobbys", "Kochen").unwrap();
        assert_eq!(
            store.get_fact(1, "hobbys").unwrap().unwrap().value,
            "Fußball, Kochen"
        );

        store.apply_fact(&policy, 1, "wohnort", "Berlin").unwrap();
        store.apply_fact(&policy, 1, "wohnort", "München").unwrap();
        assert_eq!(store.get_fact(1, "wohnort").unwrap().unwrap().value, "München");
    }

    #[test]
    fn test_apply_fact_discards_unknown() {
        let store = store();
        let policy = MergePolicy::default();
        store.upsert_subject(1, None, None).unwrap();

        assert_eq!(store.apply_fact(&policy, 1, "name", "unbekannt").unwrap(), None);
        assert!(store.get_fact(1, "name").unwrap().is_none());

        store.apply_fact(&policy, 1, "name", "Max").unwrap();
        store.apply_fact(&policy, 1, "name", "").unwrap();
        assert_eq!(store.get_fact(1, "name").unwrap().unwrap().value, "Max");
    }

    #[test]
    fn test_unchanged_value_touches_timestamp() {
        let store = store();
        let policy = MergePolicy::default();
        store.upsert_subject(1, None, None).unwrap();

        store.apply_fact(&policy, 1, "hobbys", "Kochen").unwrap();
        let first = store.get_fact(1, "hobbys").unwrap().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.apply_fact(&policy, 1, "hobbys", "Kochen").unwrap();
        let second = store.get_fact(1, "hobbys").unwrap().unwrap();

        assert_eq!(first.value, second.value);
        assert!(second.updated_at > first.updated_at);
    }

    #[test]
    fn test_snapshot_and_profile() {
        let store = store();
        store.upsert_subject(1, None, None).unwrap();
        store.put_fact(1, "alter", "30", FactCategory::Fact).unwrap();
        store.put_fact(1, "stimmung", "gut", FactCategory::Meta).unwrap();
        store.put_fact(1, "lead_score", "1.5", FactCategory::Score).unwrap();
        store
            .add_contact(1, "Tom", Some("Bruder"), Some("Ingenieur"), Some("high"))
            .unwrap();
        store.add_signal(1, "fragt nach Altersvorsorge", Some("finanzen")).unwrap();

        let snap = store.fact_snapshot(1).unwrap();
        assert_eq!(snap.facts.get("alter").map(String::as_str), Some("30"));
        assert_eq!(snap.meta.get("stimmung").map(String::as_str), Some("gut"));
        assert_eq!(snap.scores.get("lead_score").map(String::as_str), Some("1.5"));

        let profile = store.profile(1).unwrap();
        assert_eq!(profile.facts.len(), 1);
        assert_eq!(profile.contacts.len(), 1);
        assert_eq!(profile.signals.len(), 1);
        assert_eq!(profile.contacts[0].potential.as_deref(), Some("high"));
    }

    #[test]
    fn test_contacts_append_without_dedup() {
        let store = store();
        store.upsert_subject(1, None, None).unwrap();
        store.add_contact(1, "Tom", None, None, None).unwrap();
        store.add_contact(1, "Tom", None, None, None).unwrap();
        assert_eq!(store.contacts(1).unwrap().len(), 2);
    }

    #[test]
    fn test_list_subjects_by_activity() {
        let store = store();
        store.upsert_subject(1, None, Some("Erster")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.upsert_subject(2, None, Some("Zweiter")).unwrap();

        let subjects = store.list_subjects().unwrap();
        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0].id, 2);

        let stats = store.stats().unwrap();
        assert_eq!(stats.subjects, 2);
    }
}
