//! Document Store - 원문 문서 저장소 경계
//!
//! 검색 코어는 인덱싱 시점에만 이 경계를 통해 문서를 읽습니다.
//! 기본 구현은 rusqlite 기반이며, 저장 위치: ~/.campus-rag/documents.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.campus-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".campus-rag")
}

// ============================================================================
// Types
// ============================================================================

/// 문서 메타데이터
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    pub title: String,
    pub source: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// 저장된 문서
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub title: String,
    pub source: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// 새 문서 입력용 구조체
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub source: String,
    pub content: String,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub document_count: usize,
    pub total_content_bytes: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// DocumentStore Trait
// ============================================================================

/// 문서 저장소 경계 트레이트
///
/// 인덱스 upsert/rebuild가 의존하는 최소 인터페이스입니다.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 문서 본문 조회
    async fn get_text(&self, document_id: &str) -> Result<Option<String>>;

    /// 문서 메타데이터 조회
    async fn get_meta(&self, document_id: &str) -> Result<Option<DocumentMeta>>;

    /// 전체 문서 ID 목록 (리빌드용)
    async fn list_ids(&self) -> Result<Vec<String>>;
}

// ============================================================================
// SqliteDocumentStore
// ============================================================================

/// rusqlite 기반 문서 저장소
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SqliteDocumentStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// 기본 위치에서 열기 (~/.campus-rag/documents.db)
    pub fn open_default() -> Result<Self> {
        let data_dir = get_data_dir();
        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
        }

        Self::open(&data_dir.join("documents.db"))
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                source TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )
        .context("Failed to create documents table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source)",
            [],
        )
        .context("Failed to create source index")?;

        tracing::debug!("Document store initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 새 문서 저장
    ///
    /// # Returns
    /// 생성된 문서 ID (uuid v4)
    pub fn add_document(&self, doc: NewDocument) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.put_document(&id, doc)?;
        Ok(id)
    }

    /// ID를 지정하여 저장 (같은 ID면 교체)
    pub fn put_document(&self, id: &str, doc: NewDocument) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT OR REPLACE INTO documents (id, title, source, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, doc.title, doc.source, doc.content, now],
        )
        .context("Failed to insert document")?;

        tracing::info!("Stored document: {} ({})", doc.title, id);
        Ok(())
    }

    /// ID로 문서 조회
    pub fn get_document(&self, id: &str) -> Result<Option<StoredDocument>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT id, title, source, content, created_at FROM documents WHERE id = ?1",
        )?;

        let doc = stmt
            .query_row(params![id], |row| {
                Ok(StoredDocument {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    source: row.get(2)?,
                    content: row.get(3)?,
                    created_at: parse_datetime(row.get::<_, String>(4)?),
                })
            })
            .ok();

        Ok(doc)
    }

    /// 문서 목록 조회 (최신순)
    pub fn list_documents(&self, limit: usize) -> Result<Vec<StoredDocument>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT id, title, source, content, created_at FROM documents
             ORDER BY created_at DESC
             LIMIT ?1",
        )?;

        let docs = stmt
            .query_map(params![limit as i64], |row| {
                Ok(StoredDocument {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    source: row.get(2)?,
                    content: row.get(3)?,
                    created_at: parse_datetime(row.get::<_, String>(4)?),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(docs)
    }

    /// 문서 삭제
    pub fn delete_document(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let rows = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;

        Ok(rows > 0)
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .unwrap_or(0);

        let total_size: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(content)), 0) FROM documents",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        Ok(StoreStats {
            document_count: count as usize,
            total_content_bytes: total_size as usize,
            db_path: self.db_path.clone(),
        })
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get_text(&self, document_id: &str) -> Result<Option<String>> {
        Ok(self.get_document(document_id)?.map(|d| d.content))
    }

    async fn get_meta(&self, document_id: &str) -> Result<Option<DocumentMeta>> {
        Ok(self.get_document(document_id)?.map(|d| DocumentMeta {
            title: d.title,
            source: d.source,
            created_at: Some(d.created_at),
        }))
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare("SELECT id FROM documents ORDER BY created_at ASC")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(ids)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, SqliteDocumentStore) {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let store = SqliteDocumentStore::open(&db_path).unwrap();
        (dir, store)
    }

    fn sample_doc(title: &str) -> NewDocument {
        NewDocument {
            title: title.to_string(),
            source: "handbook".to_string(),
            content: format!("Content for {}", title),
        }
    }

    #[test]
    fn test_add_and_get_document() {
        let (_dir, store) = create_test_store();

        let id = store.add_document(sample_doc("Admissions Guide")).unwrap();
        assert!(!id.is_empty());

        let doc = store.get_document(&id).unwrap().unwrap();
        assert_eq!(doc.title, "Admissions Guide");
        assert_eq!(doc.source, "handbook");
    }

    #[test]
    fn test_put_document_replaces() {
        let (_dir, store) = create_test_store();

        store.put_document("fixed-id", sample_doc("V1")).unwrap();
        store.put_document("fixed-id", sample_doc("V2")).unwrap();

        let doc = store.get_document("fixed-id").unwrap().unwrap();
        assert_eq!(doc.title, "V2");
        assert_eq!(store.stats().unwrap().document_count, 1);
    }

    #[test]
    fn test_delete_document() {
        let (_dir, store) = create_test_store();

        let id = store.add_document(sample_doc("To Delete")).unwrap();
        assert!(store.delete_document(&id).unwrap());
        assert!(store.get_document(&id).unwrap().is_none());
        assert!(!store.delete_document(&id).unwrap());
    }

    #[test]
    fn test_list_documents() {
        let (_dir, store) = create_test_store();

        for i in 0..5 {
            store.add_document(sample_doc(&format!("Doc {}", i))).unwrap();
        }

        let docs = store.list_documents(3).unwrap();
        assert_eq!(docs.len(), 3);

        let all = store.list_documents(100).unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn test_store_trait_boundary() {
        let (_dir, store) = create_test_store();

        let id = store.add_document(sample_doc("Boundary")).unwrap();

        let text = store.get_text(&id).await.unwrap();
        assert_eq!(text.unwrap(), "Content for Boundary");

        let meta = store.get_meta(&id).await.unwrap().unwrap();
        assert_eq!(meta.title, "Boundary");

        let ids = store.list_ids().await.unwrap();
        assert_eq!(ids, vec![id]);

        assert!(store.get_text("missing").await.unwrap().is_none());
    }
}
