//! CLI 모듈
//!
//! 검색 코어의 관리 연산(addOrUpdateDocument / removeDocument /
//! rebuildAll / search)을 명령어로 바인딩합니다.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::document::{get_data_dir, NewDocument, SqliteDocumentStore};
use crate::embedding::{has_api_key, GeminiEmbedding};
use crate::knowledge::KnowledgeBase;
use crate::retrieval::{ContextOrigin, RetrievalEngine, VectorIndex};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "campus-rag")]
#[command(version, about = "캠퍼스 챗봇 검색 코어", long_about = None)]
pub struct Cli {
    /// 지식베이스 소스 디렉토리 (기본: ~/.campus-rag/knowledge)
    #[arg(long, global = true)]
    pub knowledge_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 파일 또는 텍스트를 문서 저장소에 추가하고 인덱싱
    Ingest {
        /// 수집할 파일 경로
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// 직접 입력할 텍스트
        #[arg(short, long)]
        text: Option<String>,

        /// 문서 제목
        #[arg(long)]
        title: Option<String>,

        /// 문서 출처
        #[arg(short, long, default_value = "user-upload")]
        source: String,
    },

    /// 컨텍스트 검색
    Query {
        /// 검색 쿼리
        query: String,

        /// 데드라인 (ms, 지정 시 부분 결과 허용)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// 저장된 문서 목록
    List {
        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 문서 삭제 (저장소 + 인덱스)
    Remove {
        /// 삭제할 문서 ID
        id: String,
    },

    /// 전체 인덱스 리빌드
    Rebuild,

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let knowledge_dir = cli
        .knowledge_dir
        .unwrap_or_else(|| get_data_dir().join("knowledge"));

    match cli.command {
        Commands::Ingest {
            file,
            text,
            title,
            source,
        } => cmd_ingest(&knowledge_dir, file, text, title, source).await,
        Commands::Query { query, timeout_ms } => {
            cmd_query(&knowledge_dir, &query, timeout_ms).await
        }
        Commands::List { limit } => cmd_list(limit),
        Commands::Remove { id } => cmd_remove(&knowledge_dir, &id).await,
        Commands::Rebuild => cmd_rebuild(&knowledge_dir).await,
        Commands::Status => cmd_status(&knowledge_dir),
    }
}

/// 엔진 구성
///
/// API 키가 없으면 경고 후 저하 모드로 계속 동작합니다
/// (임베딩 호출 실패 시 인덱스가 제로 벡터로 대체).
fn build_engine(
    knowledge_dir: &PathBuf,
) -> Result<(Arc<SqliteDocumentStore>, RetrievalEngine)> {
    let store = Arc::new(SqliteDocumentStore::open_default().context("문서 저장소 열기 실패")?);

    let embedder = if has_api_key() {
        GeminiEmbedding::from_env().context("임베딩 프로바이더 생성 실패")?
    } else {
        tracing::warn!("API key not set; retrieval will run in degraded mode");
        GeminiEmbedding::new(String::new()).context("임베딩 프로바이더 생성 실패")?
    };

    let index = VectorIndex::with_default_chunker(Arc::new(embedder));
    let knowledge = KnowledgeBase::load_dir(knowledge_dir).context("지식베이스 로드 실패")?;

    let engine = RetrievalEngine::new(
        Arc::clone(&store) as Arc<dyn crate::document::DocumentStore>,
        Arc::new(index),
        Arc::new(knowledge),
    );

    Ok((store, engine))
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 문서 수집 명령어 (ingest)
async fn cmd_ingest(
    knowledge_dir: &PathBuf,
    file: Option<PathBuf>,
    text: Option<String>,
    title: Option<String>,
    source: String,
) -> Result<()> {
    let (content, default_title) = if let Some(ref path) = file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("파일 읽기 실패: {:?}", path))?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Untitled")
            .to_string();
        (content, stem)
    } else if let Some(text) = text {
        (text, "Untitled".to_string())
    } else {
        bail!("--file 또는 --text 중 하나를 지정해야 합니다");
    };

    let (store, engine) = build_engine(knowledge_dir)?;

    println!("[*] 문서 저장 및 인덱싱 중...");

    let doc_id = store
        .add_document(NewDocument {
            title: title.unwrap_or(default_title),
            source,
            content,
        })
        .context("문서 저장 실패")?;

    let chunks = engine
        .add_or_update_document(&doc_id)
        .await
        .context("문서 인덱싱 실패")?;

    println!("[OK] 문서가 추가되었습니다 (ID: {}, 청크: {})", doc_id, chunks);

    Ok(())
}

/// 검색 명령어 (query)
async fn cmd_query(knowledge_dir: &PathBuf, query: &str, timeout_ms: Option<u64>) -> Result<()> {
    let (store, engine) = build_engine(knowledge_dir)?;

    // CLI 프로세스는 매번 새로 시작하므로 저장된 문서로 인덱스 재구성
    if store.stats()?.document_count > 0 {
        engine.rebuild_all().await.context("인덱스 구성 실패")?;
    }

    println!("[*] 검색 중: \"{}\"", query);

    let deadline = timeout_ms.map(Duration::from_millis);
    let results = engine.search_with_deadline(query, deadline).await;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 컨텍스트 ({} 건):\n", results.len());

    for (i, item) in results.iter().enumerate() {
        let origin_str = match item.origin {
            ContextOrigin::Vector => "VEC",
            ContextOrigin::Knowledge => "KB",
        };

        println!(
            "{}. [{}] [점수: {:.4}] {}",
            i + 1,
            origin_str,
            item.relevance_score,
            item.title
        );
        println!("   출처: {}", item.source);
        println!("   내용: {}", truncate_text(&item.text, 200));
        println!();
    }

    Ok(())
}

/// 목록 명령어 (list)
fn cmd_list(limit: usize) -> Result<()> {
    let store = SqliteDocumentStore::open_default().context("문서 저장소 열기 실패")?;

    let docs = store.list_documents(limit).context("문서 목록 조회 실패")?;

    if docs.is_empty() {
        println!("[!] 저장된 문서가 없습니다.");
        return Ok(());
    }

    println!("[OK] 저장된 문서 ({} 건):\n", docs.len());

    for doc in docs {
        println!("  {} [{}] {}", doc.id, doc.source, truncate_text(&doc.title, 40));
        println!(
            "      {} | {} chars",
            doc.created_at.format("%Y-%m-%d %H:%M"),
            doc.content.len()
        );
        println!();
    }

    Ok(())
}

/// 삭제 명령어 (remove)
async fn cmd_remove(knowledge_dir: &PathBuf, id: &str) -> Result<()> {
    let (store, engine) = build_engine(knowledge_dir)?;

    if store.get_document(id).context("문서 조회 실패")?.is_none() {
        bail!("ID '{}'인 문서를 찾을 수 없습니다", id);
    }

    let removed_chunks = engine
        .remove_document(id)
        .await
        .context("인덱스 제거 실패")?;
    store.delete_document(id).context("문서 삭제 실패")?;

    println!("[OK] 문서 {} 삭제됨 (청크 {} 개 제거)", id, removed_chunks);

    Ok(())
}

/// 리빌드 명령어 (rebuild)
async fn cmd_rebuild(knowledge_dir: &PathBuf) -> Result<()> {
    let (_store, engine) = build_engine(knowledge_dir)?;

    println!("[*] 전체 인덱스 리빌드 중...");

    let stats = engine.rebuild_all().await.context("리빌드 실패")?;

    println!(
        "[OK] 리빌드 완료: 문서 {}, 청크 {} (저하 {}, 건너뜀 {})",
        stats.documents, stats.chunks, stats.degraded_chunks, stats.skipped_documents
    );

    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(knowledge_dir: &PathBuf) -> Result<()> {
    println!("campus-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let data_dir = get_data_dir();
    println!("[*] 데이터 디렉토리: {}", data_dir.display());

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정 (저하 모드로 동작)");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    // 문서 저장소 통계
    match SqliteDocumentStore::open_default() {
        Ok(store) => match store.stats() {
            Ok(stats) => {
                println!("[OK] 저장된 문서: {} 건", stats.document_count);
                println!("     총 콘텐츠: {}", format_bytes(stats.total_content_bytes));
            }
            Err(e) => println!("[!] 통계 조회 실패: {}", e),
        },
        Err(e) => println!("[!] 문서 저장소 열기 실패: {}", e),
    }

    // 지식베이스 상태
    match KnowledgeBase::load_dir(knowledge_dir) {
        Ok(base) => {
            let report = base.load_report();
            println!(
                "[OK] 지식베이스: {} 카테고리, {} 엔트리",
                report.categories, report.entries
            );
            if !report.skipped.is_empty() {
                println!("[!] 건너뛴 소스: {} 건", report.skipped.len());
                for s in &report.skipped {
                    println!("    {:?}: {}", s.path, s.reason);
                }
            }
        }
        Err(e) => println!("[!] 지식베이스 로드 실패: {}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_truncate_unicode() {
        let korean = "안녕하세요 세계";
        let truncated = truncate_text(korean, 5);
        assert_eq!(truncated, "안녕하세요...");
    }
}
