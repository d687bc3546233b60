//! Structured local storage backed by libSQL.
//!
//! Collections: projects, conversations, library items, templates, settings
//! (key/value), file blobs and secrets — each addressable by id and, where it
//! applies, by the owning project. A one-time migration copies legacy flat
//! records into this schema under a default project.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use libsql::{Builder, Connection, Database, params};

use super::FlatStore;
use super::error::StorageError;
use super::types::{Conversation, Project, RepositoryItem, Template, now_ms};

const DB_BUSY_TIMEOUT: Duration = Duration::from_secs(10);
const MIGRATION_FLAG: &str = "flat_migration_completed";
const DEFAULT_PROJECT_ID: &str = "proj_default";
const DEFAULT_PROJECT_TITLE: &str = "Geral";

async fn retry_db_locked<T, Fut, F>(mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut delay = Duration::from_millis(25);
    for attempt in 0..5 {
        match op().await {
            Ok(v) => return Ok(v),
            Err(err) => {
                if attempt >= 4 || !matches!(err, StorageError::Locked { .. }) {
                    return Err(err);
                }
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_millis(400));
            }
        }
    }
    Err(StorageError::locked("Structured store retry exhausted"))
}

pub struct StructuredStore {
    db: Database,
}

impl StructuredStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(path_str)
            .build()
            .await
            .map_err(StorageError::from)?;
        let store = Self { db };
        store.migrate_schema().await?;
        Ok(store)
    }

    async fn connect(&self) -> Result<Connection, StorageError> {
        let conn = self.db.connect()?;
        let _ = conn.busy_timeout(DB_BUSY_TIMEOUT);
        let _ = conn.query("PRAGMA journal_mode = WAL;", ()).await;
        let _ = conn.query("PRAGMA synchronous = NORMAL;", ()).await;
        let _ = conn.query("PRAGMA foreign_keys = ON;", ()).await;
        Ok(conn)
    }

    async fn migrate_schema(&self) -> Result<(), StorageError> {
        let conn = self.connect().await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (\n  key TEXT PRIMARY KEY NOT NULL,\n  value TEXT NOT NULL\n);",
            (),
        )
        .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS projects (\n  id TEXT PRIMARY KEY NOT NULL,\n  title TEXT NOT NULL,\n  repository TEXT,\n  created_at_ms INTEGER NOT NULL,\n  updated_at_ms INTEGER NOT NULL\n);",
            (),
        )
        .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversations (\n  id TEXT PRIMARY KEY NOT NULL,\n  project_id TEXT NOT NULL,\n  title TEXT NOT NULL,\n  payload TEXT NOT NULL,\n  created_at_ms INTEGER NOT NULL,\n  updated_at_ms INTEGER NOT NULL\n);",
            (),
        )
        .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS library_items (\n  id TEXT PRIMARY KEY NOT NULL,\n  project_id TEXT NOT NULL,\n  title TEXT NOT NULL,\n  content TEXT NOT NULL,\n  tags TEXT NOT NULL DEFAULT '[]',\n  created_at_ms INTEGER NOT NULL\n);",
            (),
        )
        .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS templates (\n  id TEXT PRIMARY KEY NOT NULL,\n  project_id TEXT NOT NULL,\n  title TEXT NOT NULL,\n  content TEXT NOT NULL,\n  created_at_ms INTEGER NOT NULL\n);",
            (),
        )
        .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS file_blobs (\n  id TEXT PRIMARY KEY NOT NULL,\n  project_id TEXT NOT NULL,\n  name TEXT NOT NULL,\n  mime_type TEXT NOT NULL,\n  data TEXT NOT NULL,\n  size_bytes INTEGER NOT NULL,\n  created_at_ms INTEGER NOT NULL\n);",
            (),
        )
        .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS secrets (\n  key TEXT PRIMARY KEY NOT NULL,\n  value TEXT NOT NULL\n);",
            (),
        )
        .await?;

        for sql in [
            "CREATE INDEX IF NOT EXISTS idx_conversations_project ON conversations(project_id);",
            "CREATE INDEX IF NOT EXISTS idx_library_items_project ON library_items(project_id);",
            "CREATE INDEX IF NOT EXISTS idx_templates_project ON templates(project_id);",
            "CREATE INDEX IF NOT EXISTS idx_file_blobs_project ON file_blobs(project_id);",
        ] {
            conn.execute(sql, ()).await?;
        }

        Ok(())
    }

    // ---- Settings ----

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT value FROM settings WHERE key = ?1 LIMIT 1;",
                params![key],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(row.get(0)?))
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), StorageError> {
        retry_db_locked(|| async {
            let conn = self.connect().await?;
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)\nON CONFLICT(key) DO UPDATE SET value = excluded.value;",
                params![key, value],
            )
            .await?;
            Ok(())
        })
        .await
    }

    // ---- Secrets (e.g. the per-project GitHub token) ----

    pub async fn set_secret(&self, key: &str, value: &str) -> Result<(), StorageError> {
        retry_db_locked(|| async {
            let conn = self.connect().await?;
            conn.execute(
                "INSERT INTO secrets (key, value) VALUES (?1, ?2)\nON CONFLICT(key) DO UPDATE SET value = excluded.value;",
                params![key, value],
            )
            .await?;
            Ok(())
        })
        .await
    }

    pub async fn get_secret(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT value FROM secrets WHERE key = ?1 LIMIT 1;",
                params![key],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(row.get(0)?))
    }

    pub async fn delete_secret(&self, key: &str) -> Result<(), StorageError> {
        retry_db_locked(|| async {
            let conn = self.connect().await?;
            conn.execute("DELETE FROM secrets WHERE key = ?1;", params![key])
                .await?;
            Ok(())
        })
        .await
    }

    // ---- Projects ----

    pub async fn upsert_project(&self, project: &Project) -> Result<(), StorageError> {
        if project.id.trim().is_empty() {
            return Err(StorageError::invalid_input("Project id is required"));
        }
        retry_db_locked(|| async {
            let conn = self.connect().await?;
            let repository = match project.repository.as_deref() {
                Some(repo) => libsql::Value::from(repo),
                None => libsql::Value::Null,
            };
            conn.execute(
                "INSERT INTO projects (id, title, repository, created_at_ms, updated_at_ms)\nVALUES (?1, ?2, ?3, ?4, ?5)\nON CONFLICT(id) DO UPDATE SET\n  title = excluded.title,\n  repository = excluded.repository,\n  updated_at_ms = excluded.updated_at_ms;",
                params![
                    project.id.as_str(),
                    project.title.as_str(),
                    repository,
                    project.created_at_ms as i64,
                    project.updated_at_ms as i64
                ],
            )
            .await?;
            Ok(())
        })
        .await
    }

    pub async fn get_project(&self, id: &str) -> Result<Option<Project>, StorageError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT id, title, repository, created_at_ms, updated_at_ms\n   FROM projects WHERE id = ?1 LIMIT 1;",
                params![id],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(Project {
            id: row.get(0)?,
            title: row.get(1)?,
            repository: row.get::<String>(2).ok(),
            created_at_ms: row.get::<i64>(3)?.max(0) as u64,
            updated_at_ms: row.get::<i64>(4)?.max(0) as u64,
        }))
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, StorageError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT id, title, repository, created_at_ms, updated_at_ms\n   FROM projects ORDER BY updated_at_ms DESC;",
                (),
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(Project {
                id: row.get(0)?,
                title: row.get(1)?,
                repository: row.get::<String>(2).ok(),
                created_at_ms: row.get::<i64>(3)?.max(0) as u64,
                updated_at_ms: row.get::<i64>(4)?.max(0) as u64,
            });
        }
        Ok(out)
    }

    // ---- Conversations ----

    pub async fn save_conversation(
        &self,
        project_id: &str,
        conv: &Conversation,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_string(conv)
            .map_err(|e| StorageError::internal(format!("Conversation serialize failed: {e}")))?;
        retry_db_locked(|| {
            let payload = payload.clone();
            async move {
                let conn = self.connect().await?;
                conn.execute(
                    "INSERT INTO conversations (id, project_id, title, payload, created_at_ms, updated_at_ms)\nVALUES (?1, ?2, ?3, ?4, ?5, ?6)\nON CONFLICT(id) DO UPDATE SET\n  project_id = excluded.project_id,\n  title = excluded.title,\n  payload = excluded.payload,\n  updated_at_ms = excluded.updated_at_ms;",
                    params![
                        conv.id.as_str(),
                        project_id,
                        conv.title.as_str(),
                        payload,
                        conv.created_at_ms as i64,
                        conv.updated_at_ms as i64
                    ],
                )
                .await?;
                Ok(())
            }
        })
        .await
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, StorageError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT payload FROM conversations WHERE id = ?1 LIMIT 1;",
                params![id],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let payload: String = row.get(0)?;
        serde_json::from_str(&payload)
            .map(Some)
            .map_err(|e| StorageError::corrupted(format!("Conversation payload unreadable: {e}")))
    }

    pub async fn list_conversations(
        &self,
        project_id: &str,
    ) -> Result<Vec<Conversation>, StorageError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT payload FROM conversations WHERE project_id = ?1\n  ORDER BY updated_at_ms DESC;",
                params![project_id],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            let payload: String = row.get(0)?;
            match serde_json::from_str(&payload) {
                Ok(conv) => out.push(conv),
                Err(err) => log::warn!("Skipping unreadable conversation payload: {err}"),
            }
        }
        Ok(out)
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<(), StorageError> {
        retry_db_locked(|| async {
            let conn = self.connect().await?;
            conn.execute("DELETE FROM conversations WHERE id = ?1;", params![id])
                .await?;
            Ok(())
        })
        .await
    }

    // ---- Library items and templates ----

    pub async fn insert_library_item(
        &self,
        project_id: &str,
        item: &RepositoryItem,
    ) -> Result<(), StorageError> {
        let tags = serde_json::to_string(&item.tags)
            .map_err(|e| StorageError::internal(format!("Tag serialize failed: {e}")))?;
        retry_db_locked(|| {
            let tags = tags.clone();
            async move {
                let conn = self.connect().await?;
                conn.execute(
                    "INSERT INTO library_items (id, project_id, title, content, tags, created_at_ms)\nVALUES (?1, ?2, ?3, ?4, ?5, ?6)\nON CONFLICT(id) DO UPDATE SET\n  title = excluded.title,\n  content = excluded.content,\n  tags = excluded.tags;",
                    params![
                        item.id.as_str(),
                        project_id,
                        item.title.as_str(),
                        item.content.as_str(),
                        tags,
                        item.created_at_ms as i64
                    ],
                )
                .await?;
                Ok(())
            }
        })
        .await
    }

    pub async fn list_library_items(
        &self,
        project_id: &str,
    ) -> Result<Vec<RepositoryItem>, StorageError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT id, project_id, title, content, tags, created_at_ms\n   FROM library_items WHERE project_id = ?1\n  ORDER BY created_at_ms DESC;",
                params![project_id],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            let tags_json: String = row.get(4)?;
            out.push(RepositoryItem {
                id: row.get(0)?,
                project_id: Some(row.get(1)?),
                title: row.get(2)?,
                content: row.get(3)?,
                tags: serde_json::from_str(&tags_json).unwrap_or_default(),
                created_at_ms: row.get::<i64>(5)?.max(0) as u64,
            });
        }
        Ok(out)
    }

    pub async fn insert_template(
        &self,
        project_id: &str,
        template: &Template,
    ) -> Result<(), StorageError> {
        retry_db_locked(|| async {
            let conn = self.connect().await?;
            conn.execute(
                "INSERT INTO templates (id, project_id, title, content, created_at_ms)\nVALUES (?1, ?2, ?3, ?4, ?5)\nON CONFLICT(id) DO UPDATE SET\n  title = excluded.title,\n  content = excluded.content;",
                params![
                    template.id.as_str(),
                    project_id,
                    template.title.as_str(),
                    template.content.as_str(),
                    template.created_at_ms as i64
                ],
            )
            .await?;
            Ok(())
        })
        .await
    }

    pub async fn list_templates(&self, project_id: &str) -> Result<Vec<Template>, StorageError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT id, project_id, title, content, created_at_ms\n   FROM templates WHERE project_id = ?1\n  ORDER BY created_at_ms DESC;",
                params![project_id],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(Template {
                id: row.get(0)?,
                project_id: Some(row.get(1)?),
                title: row.get(2)?,
                content: row.get(3)?,
                created_at_ms: row.get::<i64>(4)?.max(0) as u64,
            });
        }
        Ok(out)
    }

    // ---- File blobs ----

    pub async fn put_file_blob(
        &self,
        project_id: &str,
        file: &super::types::AttachedFile,
    ) -> Result<(), StorageError> {
        retry_db_locked(|| async {
            let conn = self.connect().await?;
            conn.execute(
                "INSERT INTO file_blobs (id, project_id, name, mime_type, data, size_bytes, created_at_ms)\nVALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)\nON CONFLICT(id) DO UPDATE SET\n  name = excluded.name,\n  mime_type = excluded.mime_type,\n  data = excluded.data,\n  size_bytes = excluded.size_bytes;",
                params![
                    file.id.as_str(),
                    project_id,
                    file.name.as_str(),
                    file.mime_type.as_str(),
                    file.data_base64.as_str(),
                    file.size_bytes as i64,
                    now_ms() as i64
                ],
            )
            .await?;
            Ok(())
        })
        .await
    }

    pub async fn get_file_blob(
        &self,
        id: &str,
    ) -> Result<Option<super::types::AttachedFile>, StorageError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT id, name, mime_type, data, size_bytes FROM file_blobs WHERE id = ?1 LIMIT 1;",
                params![id],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(super::types::AttachedFile {
            id: row.get(0)?,
            name: row.get(1)?,
            mime_type: row.get(2)?,
            data_base64: row.get(3)?,
            size_bytes: row.get::<i64>(4)?.max(0) as u64,
        }))
    }

    // ---- Legacy migration ----

    /// One-time copy of the legacy flat records into the structured schema,
    /// tagged with a default project. Guarded by a settings flag so it never
    /// re-runs, and executed inside a single transaction so a failure rolls
    /// the whole migration back. Returns whether a migration actually ran.
    pub async fn migrate_from_flat(&self, flat: &FlatStore) -> Result<bool, StorageError> {
        if self.get_setting(MIGRATION_FLAG).await?.as_deref() == Some("1") {
            return Ok(false);
        }

        let conversations = flat.get_all_conversations();
        let items = flat.list_repository_items(None);
        let templates = flat.list_templates(None);
        let now = now_ms() as i64;

        retry_db_locked(|| {
            let conversations = conversations.clone();
            let items = items.clone();
            let templates = templates.clone();
            async move {
                let conn = self.connect().await?;
                let tx = conn.transaction().await?;

                tx.execute(
                    "INSERT OR IGNORE INTO projects (id, title, repository, created_at_ms, updated_at_ms)\nVALUES (?1, ?2, NULL, ?3, ?3);",
                    params![DEFAULT_PROJECT_ID, DEFAULT_PROJECT_TITLE, now],
                )
                .await?;

                for conv in &conversations {
                    let payload = serde_json::to_string(conv).map_err(|e| {
                        StorageError::internal(format!("Conversation serialize failed: {e}"))
                    })?;
                    tx.execute(
                        "INSERT OR IGNORE INTO conversations (id, project_id, title, payload, created_at_ms, updated_at_ms)\nVALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                        params![
                            conv.id.as_str(),
                            DEFAULT_PROJECT_ID,
                            conv.title.as_str(),
                            payload,
                            conv.created_at_ms as i64,
                            conv.updated_at_ms as i64
                        ],
                    )
                    .await?;
                }

                for item in &items {
                    let tags = serde_json::to_string(&item.tags).unwrap_or_else(|_| "[]".into());
                    tx.execute(
                        "INSERT OR IGNORE INTO library_items (id, project_id, title, content, tags, created_at_ms)\nVALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                        params![
                            item.id.as_str(),
                            DEFAULT_PROJECT_ID,
                            item.title.as_str(),
                            item.content.as_str(),
                            tags,
                            item.created_at_ms as i64
                        ],
                    )
                    .await?;
                }

                for template in &templates {
                    tx.execute(
                        "INSERT OR IGNORE INTO templates (id, project_id, title, content, created_at_ms)\nVALUES (?1, ?2, ?3, ?4, ?5);",
                        params![
                            template.id.as_str(),
                            DEFAULT_PROJECT_ID,
                            template.title.as_str(),
                            template.content.as_str(),
                            template.created_at_ms as i64
                        ],
                    )
                    .await?;
                }

                tx.execute(
                    "INSERT INTO settings (key, value) VALUES (?1, '1')\nON CONFLICT(key) DO UPDATE SET value = '1';",
                    params![MIGRATION_FLAG],
                )
                .await?;

                tx.commit().await?;
                Ok(())
            }
        })
        .await?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::storage::types::Turn;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> StructuredStore {
        StructuredStore::open(dir.path().join("tessy.db"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn settings_and_secrets_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.set_setting("theme", "dark").await.unwrap();
        assert_eq!(store.get_setting("theme").await.unwrap().as_deref(), Some("dark"));
        assert_eq!(store.get_setting("missing").await.unwrap(), None);

        store.set_secret("github_token:proj_1", "ghp_abc").await.unwrap();
        assert_eq!(
            store.get_secret("github_token:proj_1").await.unwrap().as_deref(),
            Some("ghp_abc")
        );
        store.delete_secret("github_token:proj_1").await.unwrap();
        assert_eq!(store.get_secret("github_token:proj_1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn conversations_are_indexed_by_project() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let project = Project::new("Docs");
        store.upsert_project(&project).await.unwrap();

        let mut conv = Conversation::new(Some(project.id.clone()));
        conv.append_turn(Turn::new("oi".into(), "olá".into(), vec![], vec![]));
        store.save_conversation(&project.id, &conv).await.unwrap();

        let listed = store.list_conversations(&project.id).await.unwrap();
        assert_eq!(listed, vec![conv.clone()]);
        assert_eq!(store.get_conversation(&conv.id).await.unwrap(), Some(conv));
        assert_eq!(store.list_conversations("other").await.unwrap(), vec![]);
    }

    #[tokio::test]
    async fn projects_and_file_blobs_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let mut project = Project::new("Site");
        project.repository = Some("octo/site".to_string());
        store.upsert_project(&project).await.unwrap();

        let listed = store.list_projects().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].repository.as_deref(), Some("octo/site"));
        assert_eq!(store.get_project(&project.id).await.unwrap(), Some(project.clone()));
        assert_eq!(store.get_project("proj_missing").await.unwrap(), None);

        let file = crate::plugins::storage::AttachedFile::intake(
            "logo.png",
            "image/png",
            &[137, 80, 78, 71],
        )
        .unwrap();
        store.put_file_blob(&project.id, &file).await.unwrap();
        assert_eq!(store.get_file_blob(&file.id).await.unwrap(), Some(file));
    }

    #[tokio::test]
    async fn flat_migration_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let flat = FlatStore::new(dir.path().join("flat")).unwrap();

        let mut conv = Conversation::new(None);
        conv.append_turn(Turn::new("migre-me".into(), "ok".into(), vec![], vec![]));
        flat.save_conversation(&conv);
        flat.add_repository_item(RepositoryItem {
            id: String::new(),
            project_id: None,
            title: "salvo".into(),
            content: "conteúdo".into(),
            tags: vec!["legado".into()],
            created_at_ms: 0,
        });

        let store = open_store(&dir).await;
        assert!(store.migrate_from_flat(&flat).await.unwrap());
        // Second run is a no-op thanks to the completion flag.
        assert!(!store.migrate_from_flat(&flat).await.unwrap());

        let migrated = store.list_conversations(DEFAULT_PROJECT_ID).await.unwrap();
        assert_eq!(migrated.len(), 1);
        assert_eq!(migrated[0].id, conv.id);

        let items = store.list_library_items(DEFAULT_PROJECT_ID).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].tags, vec!["legado".to_string()]);
    }
}
