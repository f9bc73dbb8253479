//! Database schema for the collection database.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};

// =============================================================================
// Version 0
// =============================================================================

const ARTIFACT_STREAMS_TABLE_V0: Table = Table {
    name: "artifact_streams",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("account_id", &SqlType::Text, non_null = true),
        sqlite_column!("app_id", &SqlType::Text, non_null = true),
        sqlite_column!("service_id", &SqlType::Text),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("source_name", &SqlType::Text, non_null = true),
        sqlite_column!("source_type", &SqlType::Text, non_null = true),
        sqlite_column!("connection_id", &SqlType::Text),
        // JSON: StreamAttributes
        sqlite_column!("attributes", &SqlType::Text, non_null = true),
        // JSON: CustomSourceConfig
        sqlite_column!("custom_config", &SqlType::Text),
        sqlite_column!("parameterized", &SqlType::Integer, default_value = Some("0")),
        sqlite_column!("metadata_only", &SqlType::Integer, default_value = Some("0")),
        sqlite_column!("auto_download", &SqlType::Integer, default_value = Some("0")),
        sqlite_column!("auto_approve", &SqlType::Integer, default_value = Some("0")),
        sqlite_column!(
            "failed_cron_attempts",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("perpetual_task_id", &SqlType::Text),
        sqlite_column!("collection_status", &SqlType::Text, non_null = true),
        sqlite_column!("last_iteration", &SqlType::Integer),
        sqlite_column!("last_successful_iteration", &SqlType::Integer),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_streams_account", "account_id"),
        ("idx_streams_connection", "connection_id"),
        ("idx_streams_perpetual_task", "perpetual_task_id"),
    ],
    unique_constraints: &[],
};

const ARTIFACTS_TABLE_V0: Table = Table {
    name: "artifacts",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("account_id", &SqlType::Text, non_null = true),
        sqlite_column!("app_id", &SqlType::Text, non_null = true),
        sqlite_column!(
            "stream_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "artifact_streams",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("source_name", &SqlType::Text, non_null = true),
        sqlite_column!("source_type", &SqlType::Text, non_null = true),
        sqlite_column!("display_name", &SqlType::Text, non_null = true),
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!("revision", &SqlType::Text),
        sqlite_column!("ui_display_name", &SqlType::Text),
        // Projections of metadata used for dedup, never loaded with the full row
        sqlite_column!("build_no", &SqlType::Text),
        sqlite_column!("artifact_path", &SqlType::Text),
        sqlite_column!("dedup_key", &SqlType::Text),
        // JSON maps
        sqlite_column!("metadata", &SqlType::Text, non_null = true),
        sqlite_column!("labels", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("content_status", &SqlType::Text),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_artifacts_stream_created", "stream_id, created_at"),
        ("idx_artifacts_content_status", "stream_id, content_status"),
    ],
    unique_constraints: &[&["stream_id", "dedup_key"]],
};

const ARTIFACT_FILES_TABLE_V0: Table = Table {
    name: "artifact_files",
    columns: &[
        sqlite_column!("file_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "artifact_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "artifacts",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_artifact_files_artifact", "artifact_id")],
    unique_constraints: &[],
};

pub const COLLECTION_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        ARTIFACT_STREAMS_TABLE_V0,
        ARTIFACTS_TABLE_V0,
        ARTIFACT_FILES_TABLE_V0,
    ],
    migration: None,
}];
