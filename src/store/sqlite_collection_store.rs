use super::models::{Artifact, ArtifactFile, ArtifactStatus, ContentStatus};
use super::schema::COLLECTION_VERSIONED_SCHEMAS;
use super::{ArtifactStore, StreamCursor, StreamStore};
use crate::source::{ArtifactStream, CollectionStatus, KeyFields, SourceType};
use crate::sqlite_persistence::{open_in_memory, open_versioned};
use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

const STREAM_COLUMNS: &str = "id, account_id, app_id, service_id, name, source_name, source_type, \
     connection_id, attributes, custom_config, parameterized, metadata_only, auto_download, \
     auto_approve, failed_cron_attempts, perpetual_task_id, collection_status, last_iteration, \
     last_successful_iteration, created_at";

const ARTIFACT_COLUMNS: &str = "id, account_id, app_id, stream_id, source_name, source_type, \
     display_name, description, revision, ui_display_name, metadata, labels, status, \
     content_status, created_at";

pub struct SqliteCollectionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCollectionStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path, COLLECTION_VERSIONED_SCHEMAS, "collection")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = open_in_memory(COLLECTION_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conversion_error(
        idx: usize,
        err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
    }

    fn source_type_at(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<SourceType> {
        let raw: String = row.get(idx)?;
        SourceType::from_str(&raw)
            .ok_or_else(|| Self::conversion_error(idx, format!("Unknown source type {}", raw)))
    }

    fn json_at<T: serde::de::DeserializeOwned>(
        row: &rusqlite::Row,
        idx: usize,
    ) -> rusqlite::Result<T> {
        let raw: String = row.get(idx)?;
        serde_json::from_str(&raw).map_err(|e| Self::conversion_error(idx, e))
    }

    fn row_to_stream(row: &rusqlite::Row) -> rusqlite::Result<ArtifactStream> {
        let custom_raw: Option<String> = row.get(9)?;
        let custom = match custom_raw {
            Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| Self::conversion_error(9, e))?),
            None => None,
        };
        let collection_status: String = row.get(16)?;

        Ok(ArtifactStream {
            id: row.get(0)?,
            account_id: row.get(1)?,
            app_id: row.get(2)?,
            service_id: row.get(3)?,
            name: row.get(4)?,
            source_name: row.get(5)?,
            source_type: Self::source_type_at(row, 6)?,
            connection_id: row.get(7)?,
            attributes: Self::json_at(row, 8)?,
            custom,
            parameterized: row.get(10)?,
            metadata_only: row.get(11)?,
            auto_download: row.get(12)?,
            auto_approve: row.get(13)?,
            failed_cron_attempts: row.get(14)?,
            perpetual_task_id: row.get(15)?,
            collection_status: CollectionStatus::from_db_str(&collection_status),
            last_iteration: row.get(17)?,
            last_successful_iteration: row.get(18)?,
            created_at: row.get(19)?,
        })
    }

    fn row_to_artifact(row: &rusqlite::Row) -> rusqlite::Result<Artifact> {
        let status: String = row.get(12)?;
        let content_status: Option<String> = row.get(13)?;

        Ok(Artifact {
            id: row.get(0)?,
            account_id: row.get(1)?,
            app_id: row.get(2)?,
            stream_id: row.get(3)?,
            source_name: row.get(4)?,
            source_type: Self::source_type_at(row, 5)?,
            display_name: row.get(6)?,
            description: row.get(7)?,
            revision: row.get(8)?,
            ui_display_name: row.get(9)?,
            metadata: Self::json_at(row, 10)?,
            labels: Self::json_at(row, 11)?,
            status: ArtifactStatus::from_db_str(&status),
            content_status: content_status.as_deref().and_then(ContentStatus::from_db_str),
            files: Vec::new(),
            created_at: row.get(14)?,
        })
    }

    fn load_files(conn: &Connection, artifact: &mut Artifact) -> Result<()> {
        let mut stmt = conn.prepare_cached(
            "SELECT file_id, name FROM artifact_files WHERE artifact_id = ?1 ORDER BY position",
        )?;
        artifact.files = stmt
            .query_map(params![artifact.id], |row| {
                Ok(ArtifactFile {
                    file_id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(())
    }

    fn query_artifacts(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Artifact>> {
        let mut stmt = conn.prepare(sql)?;
        let mut artifacts: Vec<Artifact> = stmt
            .query_map(params, Self::row_to_artifact)?
            .collect::<rusqlite::Result<_>>()?;
        for artifact in artifacts.iter_mut() {
            Self::load_files(conn, artifact)?;
        }
        Ok(artifacts)
    }

    fn query_streams(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<ArtifactStream>> {
        let mut stmt = conn.prepare(sql)?;
        let streams = stmt
            .query_map(params, Self::row_to_stream)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(streams)
    }
}

// === Streams ===

impl StreamStore for SqliteCollectionStore {
    fn create_stream(&self, stream: &ArtifactStream) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let custom = stream
            .custom
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        conn.execute(
            &format!(
                "INSERT INTO artifact_streams ({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
                STREAM_COLUMNS
            ),
            params![
                stream.id,
                stream.account_id,
                stream.app_id,
                stream.service_id,
                stream.name,
                stream.source_name,
                stream.source_type.as_str(),
                stream.connection_id,
                serde_json::to_string(&stream.attributes)?,
                custom,
                stream.parameterized,
                stream.metadata_only,
                stream.auto_download,
                stream.auto_approve,
                stream.failed_cron_attempts,
                stream.perpetual_task_id,
                stream.collection_status.as_db_str(),
                stream.last_iteration,
                stream.last_successful_iteration,
                stream.created_at,
            ],
        )
        .with_context(|| format!("Failed to insert artifact stream {}", stream.id))?;
        Ok(())
    }

    fn get_stream(&self, stream_id: &str) -> Result<Option<ArtifactStream>> {
        let conn = self.conn.lock().unwrap();
        let stream = conn
            .query_row(
                &format!("SELECT {} FROM artifact_streams WHERE id = ?1", STREAM_COLUMNS),
                params![stream_id],
                Self::row_to_stream,
            )
            .optional()?;
        Ok(stream)
    }

    fn list_streams(&self, after: Option<&StreamCursor>, limit: usize) -> Result<Vec<ArtifactStream>> {
        let conn = self.conn.lock().unwrap();
        Self::query_streams(
            &conn,
            &format!(
                "SELECT {} FROM artifact_streams \
                 WHERE ?1 IS NULL OR created_at > ?1 OR (created_at = ?1 AND id > ?2) \
                 ORDER BY created_at, id LIMIT ?3",
                STREAM_COLUMNS
            ),
            params![
                after.map(|cursor| cursor.created_at),
                after.map(|cursor| cursor.id.as_str()),
                limit as i64
            ],
        )
    }

    fn list_streams_by_connection(&self, connection_id: &str) -> Result<Vec<ArtifactStream>> {
        let conn = self.conn.lock().unwrap();
        Self::query_streams(
            &conn,
            &format!(
                "SELECT {} FROM artifact_streams WHERE connection_id = ?1 ORDER BY created_at, id",
                STREAM_COLUMNS
            ),
            params![connection_id],
        )
    }

    fn list_streams_without_perpetual_task(
        &self,
        accounts: Option<&BTreeSet<String>>,
        limit: usize,
    ) -> Result<Vec<ArtifactStream>> {
        let conn = self.conn.lock().unwrap();
        match accounts {
            None => Self::query_streams(
                &conn,
                &format!(
                    "SELECT {} FROM artifact_streams WHERE perpetual_task_id IS NULL \
                     ORDER BY created_at, id LIMIT ?1",
                    STREAM_COLUMNS
                ),
                params![limit as i64],
            ),
            Some(accounts) if accounts.is_empty() => Ok(Vec::new()),
            Some(accounts) => {
                let placeholders: Vec<String> =
                    (1..=accounts.len()).map(|i| format!("?{}", i)).collect();
                let sql = format!(
                    "SELECT {} FROM artifact_streams WHERE perpetual_task_id IS NULL \
                     AND account_id IN ({}) ORDER BY created_at, id LIMIT {}",
                    STREAM_COLUMNS,
                    placeholders.join(", "),
                    limit
                );
                Self::query_streams(&conn, &sql, params_from_iter(accounts.iter()))
            }
        }
    }

    fn delete_stream(&self, stream_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM artifact_streams WHERE id = ?1",
            params![stream_id],
        )?;
        Ok(deleted > 0)
    }

    fn increment_failed_attempts(&self, stream_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE artifact_streams SET failed_cron_attempts = failed_cron_attempts + 1 \
             WHERE id = ?1",
            params![stream_id],
        )?;
        Ok(updated > 0)
    }

    fn record_successful_iteration(&self, stream_id: &str, at_millis: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE artifact_streams SET failed_cron_attempts = 0, last_iteration = ?2, \
             last_successful_iteration = ?2, collection_status = ?3 WHERE id = ?1",
            params![stream_id, at_millis, CollectionStatus::Stable.as_db_str()],
        )?;
        Ok(updated > 0)
    }

    fn update_collection_status(&self, stream_id: &str, status: CollectionStatus) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE artifact_streams SET collection_status = ?2 WHERE id = ?1",
            params![stream_id, status.as_db_str()],
        )?;
        Ok(updated > 0)
    }

    fn reset_stopped_collection(&self, stream_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE artifact_streams SET collection_status = ?2, failed_cron_attempts = 0 \
             WHERE id = ?1 AND collection_status = ?3",
            params![
                stream_id,
                CollectionStatus::Unstable.as_db_str(),
                CollectionStatus::Stopped.as_db_str()
            ],
        )?;
        Ok(updated > 0)
    }

    fn attach_perpetual_task(&self, stream_id: &str, task_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE artifact_streams SET perpetual_task_id = ?2 \
             WHERE id = ?1 AND perpetual_task_id IS NULL",
            params![stream_id, task_id],
        )?;
        Ok(updated > 0)
    }

    fn detach_perpetual_task(&self, stream_id: &str, task_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE artifact_streams SET perpetual_task_id = NULL \
             WHERE id = ?1 AND perpetual_task_id = ?2",
            params![stream_id, task_id],
        )?;
        Ok(updated > 0)
    }
}

// === Artifacts ===

impl ArtifactStore for SqliteCollectionStore {
    fn insert_artifact(&self, artifact: &Artifact, dedup_key: Option<&str>) -> Result<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO artifacts (id, account_id, app_id, stream_id, source_name, \
                 source_type, display_name, description, revision, ui_display_name, build_no, \
                 artifact_path, dedup_key, metadata, labels, status, content_status, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    artifact.id,
                    artifact.account_id,
                    artifact.app_id,
                    artifact.stream_id,
                    artifact.source_name,
                    artifact.source_type.as_str(),
                    artifact.display_name,
                    artifact.description,
                    artifact.revision,
                    artifact.ui_display_name,
                    artifact.build_no(),
                    artifact.artifact_path(),
                    dedup_key,
                    serde_json::to_string(&artifact.metadata)?,
                    serde_json::to_string(&artifact.labels)?,
                    artifact.status.as_db_str(),
                    artifact.content_status.map(|s| s.as_db_str()),
                    artifact.created_at,
                ],
            )
            .with_context(|| format!("Failed to insert artifact {}", artifact.id))?;

        if inserted == 0 {
            return Ok(false);
        }
        for (position, file) in artifact.files.iter().enumerate() {
            tx.execute(
                "INSERT INTO artifact_files (file_id, artifact_id, name, position) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![file.file_id, artifact.id, file.name, position as i64],
            )?;
        }
        tx.commit()?;
        Ok(true)
    }

    fn get_artifact(&self, artifact_id: &str) -> Result<Option<Artifact>> {
        let conn = self.conn.lock().unwrap();
        let artifact = conn
            .query_row(
                &format!("SELECT {} FROM artifacts WHERE id = ?1", ARTIFACT_COLUMNS),
                params![artifact_id],
                Self::row_to_artifact,
            )
            .optional()?;
        match artifact {
            Some(mut artifact) => {
                Self::load_files(&conn, &mut artifact)?;
                Ok(Some(artifact))
            }
            None => Ok(None),
        }
    }

    fn list_artifacts(&self, stream_id: &str) -> Result<Vec<Artifact>> {
        let conn = self.conn.lock().unwrap();
        Self::query_artifacts(
            &conn,
            &format!(
                "SELECT {} FROM artifacts WHERE stream_id = ?1 ORDER BY created_at DESC, rowid DESC",
                ARTIFACT_COLUMNS
            ),
            params![stream_id],
        )
    }

    fn count_artifacts(&self, stream_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM artifacts WHERE stream_id = ?1",
            params![stream_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn existing_key_projections(&self, stream_id: &str) -> Result<Vec<KeyFields>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT revision, build_no, artifact_path FROM artifacts WHERE stream_id = ?1",
        )?;
        let keys = stmt
            .query_map(params![stream_id], |row| {
                Ok(KeyFields {
                    revision: row.get(0)?,
                    build_no: row.get(1)?,
                    artifact_path: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(keys)
    }

    fn update_status_if(
        &self,
        artifact_id: &str,
        expected: ArtifactStatus,
        next: ArtifactStatus,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE artifacts SET status = ?3 WHERE id = ?1 AND status = ?2",
            params![artifact_id, expected.as_db_str(), next.as_db_str()],
        )?;
        Ok(updated > 0)
    }

    fn update_content_status_if(
        &self,
        artifact_id: &str,
        expected: Option<ContentStatus>,
        next: ContentStatus,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE artifacts SET content_status = ?3 WHERE id = ?1 AND content_status IS ?2",
            params![
                artifact_id,
                expected.map(|s| s.as_db_str()),
                next.as_db_str()
            ],
        )?;
        Ok(updated > 0)
    }

    fn set_statuses(
        &self,
        artifact_id: &str,
        status: ArtifactStatus,
        content_status: Option<ContentStatus>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE artifacts SET status = ?2, content_status = ?3 WHERE id = ?1",
            params![
                artifact_id,
                status.as_db_str(),
                content_status.map(|s| s.as_db_str())
            ],
        )?;
        Ok(updated > 0)
    }

    fn add_file(&self, artifact_id: &str, file: &ArtifactFile) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO artifact_files (file_id, artifact_id, name, position) VALUES (?1, ?2, ?3, \
             (SELECT COALESCE(MAX(position) + 1, 0) FROM artifact_files WHERE artifact_id = ?2))",
            params![file.file_id, artifact_id, file.name],
        )
        .with_context(|| format!("Failed to add file {} to artifact {}", file.file_id, artifact_id))?;
        Ok(())
    }

    fn downloaded_beyond_retention(&self, stream_id: &str, keep: usize) -> Result<Vec<Artifact>> {
        let conn = self.conn.lock().unwrap();
        Self::query_artifacts(
            &conn,
            &format!(
                "SELECT {} FROM artifacts WHERE stream_id = ?1 AND content_status = ?2 \
                 ORDER BY created_at DESC, rowid DESC LIMIT -1 OFFSET ?3",
                ARTIFACT_COLUMNS
            ),
            params![
                stream_id,
                ContentStatus::Downloaded.as_db_str(),
                keep as i64
            ],
        )
    }

    fn delete_artifacts(&self, artifact_ids: &[String]) -> Result<usize> {
        if artifact_ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM artifacts WHERE id = ?1")?;
            for id in artifact_ids {
                deleted += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }
}
