//! SQLite-backed record store.
//!
//! This module provides the `SqliteRecordStore` struct, a concrete
//! `RecordStore` + `ProjectClient` used by the CLI and by local development:
//! - Image rows (path, signed URL + expiry, prompts, grouping, visibility)
//! - Projects and their slides
//! - Listing queries mirroring the remote store's visibility/owner filters

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::models::{parse_timestamp, CuratedFields, ProjectRecord, Slide, Visibility};
use crate::source::{ListingScope, ProjectClient, RecordStore, StoredImage};

const IMAGE_COLUMNS: &str = "id, path, name, url, url_expires_at, bucket, created_at, prompt,
    ai_prompt, ai_json_prompt, keywords, links, group_id, group_index, is_public, curated";

const PROJECT_COLUMNS: &str =
    "id, name, prompt, slide_count, created_at, updated_at, is_public, thumbnail_url";

/// How an image row entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Upload,
    Saved,
    Curated,
}

impl ImageSource {
    fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Saved => "saved",
            Self::Curated => "curated",
        }
    }
}

/// SQLite-backed storage for gallery rows.
///
/// The database is stored at `XDG_CONFIG_HOME/gallery-engine/gallery.sqlite`
/// by default and uses WAL mode.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Opens or creates the database at the default XDG location.
    pub fn open_default() -> Result<Self> {
        let db_path = Self::default_db_path()?;
        Self::open(&db_path)
    }

    /// Returns the default database path based on XDG directories.
    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("", "", "gallery-engine")
            .context("Failed to determine project directories")?;

        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;

        Ok(config_dir.join("gallery.sqlite"))
    }

    /// Opens or creates the database at the specified path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )
        .context("Failed to configure SQLite pragmas")?;

        Self::create_tables(&conn)?;

        info!("Opened record store at {:?}", path);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn create_tables(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS images (
                id TEXT PRIMARY KEY NOT NULL,
                path TEXT NOT NULL,
                name TEXT,
                url TEXT,
                url_expires_at TEXT,
                bucket TEXT,
                created_at TEXT NOT NULL,
                prompt TEXT,
                ai_prompt TEXT,
                ai_json_prompt TEXT,
                keywords TEXT NOT NULL DEFAULT '[]',
                links TEXT NOT NULL DEFAULT '[]',
                group_id TEXT,
                group_index INTEGER,
                is_public INTEGER NOT NULL DEFAULT 0,
                owner_id TEXT,
                source TEXT NOT NULL,
                curated TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_images_created ON images(created_at);
            CREATE INDEX IF NOT EXISTS idx_images_owner ON images(owner_id, source);

            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY NOT NULL,
                owner_id TEXT,
                name TEXT NOT NULL,
                prompt TEXT,
                slide_count INTEGER NOT NULL DEFAULT 0,
                is_public INTEGER NOT NULL DEFAULT 0,
                thumbnail_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS slides (
                id TEXT PRIMARY KEY NOT NULL,
                project_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                image_url TEXT,
                prompt TEXT,
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_slides_project ON slides(project_id, position);
            ",
        )
        .context("Failed to create database tables")?;

        debug!("Database tables created/verified");
        Ok(())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts or updates an image row.
    pub fn upsert_image(
        &self,
        image: &StoredImage,
        owner_id: Option<&str>,
        source: ImageSource,
    ) -> Result<()> {
        let created_at = image
            .created_at
            .clone()
            .unwrap_or_else(|| Utc::now().to_rfc3339());
        let curated = image
            .curated
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn
            .lock()
            .execute(
                "
            INSERT INTO images (
                id, path, name, url, url_expires_at, bucket, created_at, prompt, ai_prompt,
                ai_json_prompt, keywords, links, group_id, group_index, is_public, owner_id,
                source, curated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            ON CONFLICT(id) DO UPDATE SET
                path = excluded.path,
                name = excluded.name,
                url = excluded.url,
                url_expires_at = excluded.url_expires_at,
                bucket = excluded.bucket,
                created_at = excluded.created_at,
                prompt = excluded.prompt,
                ai_prompt = excluded.ai_prompt,
                ai_json_prompt = excluded.ai_json_prompt,
                keywords = excluded.keywords,
                links = excluded.links,
                group_id = excluded.group_id,
                group_index = excluded.group_index,
                is_public = excluded.is_public,
                owner_id = excluded.owner_id,
                source = excluded.source,
                curated = excluded.curated
            ",
                params![
                    image.id,
                    image.path,
                    image.name,
                    image.url,
                    image.url_expires_at,
                    image.bucket,
                    created_at,
                    image.prompt,
                    image.ai_prompt,
                    image.ai_json_prompt.as_ref().map(|v| v.to_string()),
                    serde_json::to_string(&image.keywords)?,
                    serde_json::to_string(&image.links)?,
                    image.group_id,
                    image.group_index,
                    image.is_public,
                    owner_id,
                    source.as_str(),
                    curated,
                ],
            )
            .context("Failed to upsert image")?;

        Ok(())
    }

    /// Inserts or updates a project row.
    pub fn upsert_project(&self, project: &ProjectRecord, owner_id: Option<&str>) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "
            INSERT INTO projects (
                id, owner_id, name, prompt, slide_count, is_public, thumbnail_url,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                name = excluded.name,
                prompt = excluded.prompt,
                slide_count = excluded.slide_count,
                is_public = excluded.is_public,
                thumbnail_url = excluded.thumbnail_url,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            ",
                params![
                    project.id,
                    owner_id,
                    project.name,
                    project.prompt,
                    project.slide_count,
                    project.visibility.is_public(),
                    project.thumbnail_url,
                    project.created_at.to_rfc3339(),
                    project.updated_at.to_rfc3339(),
                ],
            )
            .context("Failed to upsert project")?;

        Ok(())
    }

    /// Inserts or updates a slide of an existing project.
    pub fn upsert_slide(&self, project_id: &str, slide: &Slide) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "
            INSERT INTO slides (id, project_id, position, image_url, prompt)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                position = excluded.position,
                image_url = excluded.image_url,
                prompt = excluded.prompt
            ",
                params![slide.id, project_id, slide.position, slide.image_url, slide.prompt],
            )
            .context("Failed to upsert slide")?;

        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Lists image rows in `scope`, newest first.
    pub fn images_in_scope(&self, scope: &ListingScope) -> Result<Vec<StoredImage>> {
        let conn = self.conn.lock();
        let (filter, owner) = match scope {
            ListingScope::Public => ("is_public = 1 AND source IN ('upload', 'saved')", None),
            ListingScope::Owner(owner) => {
                ("owner_id = ?1 AND source IN ('upload', 'saved')", Some(owner))
            }
            ListingScope::Curated => ("source = 'curated'", None),
        };
        let sql = format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE {filter} ORDER BY created_at DESC"
        );
        let mut stmt = conn.prepare_cached(&sql)?;

        let rows = match owner {
            Some(owner) => stmt
                .query_map(params![owner], row_to_image)?
                .collect::<Result<Vec<_>, _>>(),
            None => stmt.query_map([], row_to_image)?.collect::<Result<Vec<_>, _>>(),
        }
        .context("Failed to list images")?;

        Ok(rows)
    }

    /// Lists projects in `scope`. Public listings are ordered by creation,
    /// owner listings by last update.
    pub fn projects_in_scope(&self, scope: &ListingScope) -> Result<Vec<ProjectRecord>> {
        let conn = self.conn.lock();
        let rows = match scope {
            ListingScope::Public => {
                let sql = format!(
                    "SELECT {PROJECT_COLUMNS} FROM projects WHERE is_public = 1
                     ORDER BY created_at DESC"
                );
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt.query_map([], row_to_project)?;
                rows.collect::<Result<Vec<_>, _>>()
            }
            ListingScope::Owner(owner) => {
                let sql = format!(
                    "SELECT {PROJECT_COLUMNS} FROM projects WHERE owner_id = ?1
                     ORDER BY updated_at DESC"
                );
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt.query_map(params![owner], row_to_project)?;
                rows.collect::<Result<Vec<_>, _>>()
            }
            ListingScope::Curated => Ok(Vec::new()),
        }
        .context("Failed to list projects")?;

        Ok(rows)
    }

    pub fn get_project(&self, id: &str) -> Result<Option<ProjectRecord>> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1");
        let project = self
            .conn
            .lock()
            .query_row(&sql, params![id], row_to_project)
            .optional()
            .context("Failed to query project")?;
        Ok(project)
    }

    pub fn get_slides(&self, project_id: &str) -> Result<Vec<Slide>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, position, image_url, prompt FROM slides
             WHERE project_id = ?1 ORDER BY position",
        )?;
        let slides = stmt
            .query_map(params![project_id], |row| {
                Ok(Slide {
                    id: row.get(0)?,
                    position: row.get(1)?,
                    image_url: row.get(2)?,
                    prompt: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to query slides")?;
        Ok(slides)
    }

    /// Stores a refreshed signed URL and its expiry.
    pub fn set_image_url(&self, id: &str, url: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        let rows = self
            .conn
            .lock()
            .execute(
                "UPDATE images SET url = ?1, url_expires_at = ?2 WHERE id = ?3",
                params![url, expires_at.to_rfc3339(), id],
            )
            .context("Failed to update image url")?;
        Ok(rows > 0)
    }

    /// Returns the total count of image rows.
    pub fn count_images(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn list_images(&self, scope: &ListingScope) -> Result<Vec<StoredImage>> {
        self.images_in_scope(scope)
    }

    async fn list_projects(&self, scope: &ListingScope) -> Result<Vec<ProjectRecord>> {
        self.projects_in_scope(scope)
    }

    async fn update_image_url(&self, id: &str, url: &str, expires_at: DateTime<Utc>) -> Result<()> {
        if self.set_image_url(id, url, expires_at)? {
            Ok(())
        } else {
            Err(anyhow!("no image row with id {id}"))
        }
    }
}

#[async_trait]
impl ProjectClient for SqliteRecordStore {
    async fn project(&self, id: &str) -> Result<ProjectRecord> {
        self.get_project(id)?
            .ok_or_else(|| anyhow!("no project with id {id}"))
    }

    async fn slides(&self, id: &str) -> Result<Vec<Slide>> {
        self.get_slides(id)
    }
}

// =========================================================================
// Helper Functions
// =========================================================================

fn row_to_image(row: &Row<'_>) -> rusqlite::Result<StoredImage> {
    let keywords: String = row.get(10)?;
    let links: String = row.get(11)?;
    let ai_json_prompt: Option<String> = row.get(9)?;
    let curated: Option<String> = row.get(15)?;

    Ok(StoredImage {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        url: row.get(3)?,
        url_expires_at: row.get(4)?,
        bucket: row.get(5)?,
        created_at: row.get(6)?,
        prompt: row.get(7)?,
        ai_prompt: row.get(8)?,
        ai_json_prompt: ai_json_prompt.and_then(|s| serde_json::from_str(&s).ok()),
        keywords: serde_json::from_str(&keywords).unwrap_or_default(),
        links: serde_json::from_str(&links).unwrap_or_default(),
        group_id: row.get(12)?,
        group_index: row.get(13)?,
        is_public: row.get(14)?,
        curated: curated.and_then(|s| serde_json::from_str::<CuratedFields>(&s).ok()),
    })
}

fn row_to_project(row: &Row<'_>) -> rusqlite::Result<ProjectRecord> {
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    let created_at = parse_timestamp(&created_at).unwrap_or(DateTime::UNIX_EPOCH);
    let updated_at = parse_timestamp(&updated_at).unwrap_or(created_at);

    Ok(ProjectRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        prompt: row.get(2)?,
        slide_count: row.get(3)?,
        created_at,
        updated_at,
        visibility: Visibility::from_flag(row.get(6)?),
        thumbnail_url: row.get(7)?,
    })
}
