//! Vector Index - 스냅샷 기반 인메모리 최근접 이웃 인덱스
//!
//! 임베딩 백엔드 위에 불변 스냅샷을 얹어 운영합니다:
//! - 읽기: 스냅샷 `Arc` 복제 후 잠금 없이 탐색
//! - 쓰기: 새 스냅샷을 옆에서 만들어 publish 시점에만 잠금
//! - 리빌드: 단일 실행, 완성된 스냅샷을 원자적으로 교체
//!
//! 임베딩 백엔드 장애 시 제로 벡터로 대체하고 결과에
//! 저신뢰(degraded) 플래그를 남깁니다.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock};

use anyhow::Result;
use tokio::sync::Mutex;

use crate::embedding::EmbeddingProvider;
use crate::error::RetrievalError;

use super::chunker::{Chunker, TextChunker};
use super::vector::{cosine_distance, ChunkMeta, IndexSnapshot, IndexedChunk, VectorMatch};

// ============================================================================
// Types
// ============================================================================

/// 리빌드 입력 레코드
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    pub source: String,
    pub text: String,
}

/// 리빌드 결과 통계
#[derive(Debug, Clone, Default)]
pub struct RebuildStats {
    pub documents: usize,
    pub chunks: usize,
    pub degraded_chunks: usize,
    /// 소스 읽기 실패로 건너뛴 문서 수 (엔진에서 집계)
    pub skipped_documents: usize,
}

// ============================================================================
// VectorIndex
// ============================================================================

/// 스냅샷 기반 벡터 인덱스
pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Box<dyn Chunker>,
    /// 발행된 불변 스냅샷. 교체(publish)만 잠금이 필요합니다.
    snapshot: RwLock<Arc<IndexSnapshot>>,
    /// 문서 ID별 쓰기 직렬화 락
    doc_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
    /// 리빌드 단일 실행 보장
    rebuild_lock: Mutex<()>,
}

impl VectorIndex {
    /// 새 인덱스 생성
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, chunker: Box<dyn Chunker>) -> Self {
        Self {
            embedder,
            chunker,
            snapshot: RwLock::new(Arc::new(IndexSnapshot::empty())),
            doc_locks: StdMutex::new(HashMap::new()),
            rebuild_lock: Mutex::new(()),
        }
    }

    /// 기본 청커로 생성
    pub fn with_default_chunker(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self::new(embedder, Box::new(TextChunker::with_defaults()))
    }

    /// 문서 upsert (문서 단위 원자성)
    ///
    /// 모든 청크의 임베딩을 먼저 계산한 뒤 한 번의 스냅샷 교체로
    /// 해당 문서의 기존 청크를 통째로 대체합니다.
    /// 같은 문서 ID의 동시 upsert/remove는 직렬화됩니다.
    ///
    /// # Returns
    /// 인덱싱된 청크 수
    pub async fn upsert(
        &self,
        document_id: &str,
        title: &str,
        source: &str,
        text: &str,
    ) -> Result<usize> {
        let _doc_guard = self.acquire_doc_lock(document_id).await;

        let segments = self.chunker.chunk(text);
        let total_chunks = segments.len();

        // 스냅샷 교체 전에 전체 임베딩 완료 (부분 인덱싱 방지)
        let mut new_chunks = Vec::with_capacity(total_chunks);
        let mut degraded_count = 0;

        for (i, segment) in segments.into_iter().enumerate() {
            let (embedding, degraded) = self.embed_or_degraded(&segment).await;
            if degraded {
                degraded_count += 1;
            }

            new_chunks.push(IndexedChunk {
                meta: ChunkMeta {
                    document_id: document_id.to_string(),
                    chunk_index: i,
                    total_chunks,
                    title: title.to_string(),
                    source: source.to_string(),
                    degraded,
                },
                text: segment,
                embedding,
            });
        }

        let added = new_chunks.len();
        self.publish_replacing(document_id, new_chunks)?;

        if degraded_count > 0 {
            tracing::warn!(
                "Indexed document {} with {} degraded chunks (embedding backend unavailable)",
                document_id,
                degraded_count
            );
        } else {
            tracing::info!("Indexed document {} ({} chunks)", document_id, added);
        }

        Ok(added)
    }

    /// 문서 청크 삭제 (멱등)
    ///
    /// # Returns
    /// 삭제된 청크 수 (없었으면 0, 에러 아님)
    pub async fn remove(&self, document_id: &str) -> Result<usize> {
        let _doc_guard = self.acquire_doc_lock(document_id).await;

        let removed = self.publish_replacing(document_id, Vec::new())?;
        if removed > 0 {
            tracing::info!("Removed {} chunks for document {}", removed, document_id);
        }

        Ok(removed)
    }

    /// 벡터 검색
    ///
    /// 코사인 거리 오름차순으로 최대 `k`개를 반환합니다.
    /// 동점은 인덱스 내 순서를 유지합니다 (안정 정렬).
    /// 임베딩 백엔드가 죽어 있으면 제로 벡터 쿼리로 저하 운영하며,
    /// 이때 모든 결과는 고정 거리 1.0과 degraded 플래그를 가집니다.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<VectorMatch>> {
        if k == 0 {
            return Ok(vec![]);
        }

        let (query_embedding, query_degraded) = self.embed_or_degraded(text).await;
        let snapshot = self.current_snapshot()?;

        let mut matches: Vec<VectorMatch> = snapshot
            .chunks
            .iter()
            .map(|chunk| {
                let mut meta = chunk.meta.clone();
                meta.degraded = meta.degraded || query_degraded;

                VectorMatch {
                    chunk_text: chunk.text.clone(),
                    meta,
                    distance: cosine_distance(&query_embedding, &chunk.embedding),
                }
            })
            .collect();

        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);

        Ok(matches)
    }

    /// 전체 리빌드
    ///
    /// 새 스냅샷을 옆에서 완성한 뒤 원자적으로 발행합니다.
    /// 동시 쿼리는 이전 또는 새 스냅샷 중 하나만 관찰합니다.
    /// 이미 리빌드가 진행 중이면 `RebuildInProgress`로 거부합니다.
    pub async fn rebuild(&self, documents: Vec<DocumentRecord>) -> Result<RebuildStats> {
        let _rebuild_guard = self
            .rebuild_lock
            .try_lock()
            .map_err(|_| RetrievalError::RebuildInProgress)?;

        let mut stats = RebuildStats::default();
        let mut chunks = Vec::new();

        for doc in &documents {
            let segments = self.chunker.chunk(&doc.text);
            let total_chunks = segments.len();
            if total_chunks == 0 {
                continue;
            }

            for (i, segment) in segments.into_iter().enumerate() {
                let (embedding, degraded) = self.embed_or_degraded(&segment).await;
                if degraded {
                    stats.degraded_chunks += 1;
                }

                chunks.push(IndexedChunk {
                    meta: ChunkMeta {
                        document_id: doc.id.clone(),
                        chunk_index: i,
                        total_chunks,
                        title: doc.title.clone(),
                        source: doc.source.clone(),
                        degraded,
                    },
                    text: segment,
                    embedding,
                });
            }

            stats.documents += 1;
        }

        stats.chunks = chunks.len();

        // 완성된 스냅샷만 발행
        let mut guard = self
            .snapshot
            .write()
            .map_err(|e| anyhow::anyhow!("Snapshot lock poisoned: {}", e))?;
        *guard = Arc::new(IndexSnapshot { chunks });
        drop(guard);

        tracing::info!(
            "Rebuilt vector index: {} documents, {} chunks ({} degraded)",
            stats.documents,
            stats.chunks,
            stats.degraded_chunks
        );

        Ok(stats)
    }

    /// 인덱싱된 청크 수
    pub fn chunk_count(&self) -> usize {
        self.current_snapshot()
            .map(|s| s.chunks.len())
            .unwrap_or(0)
    }

    /// 특정 문서의 청크 수
    pub fn document_chunk_count(&self, document_id: &str) -> usize {
        self.current_snapshot()
            .map(|s| s.document_chunk_count(document_id))
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// 현재 스냅샷 Arc 복제
    fn current_snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        let guard = self
            .snapshot
            .read()
            .map_err(|e| anyhow::anyhow!("Snapshot lock poisoned: {}", e))?;
        Ok(Arc::clone(&guard))
    }

    /// 문서의 청크를 통째로 교체한 새 스냅샷 발행
    ///
    /// # Returns
    /// 교체로 제거된 기존 청크 수
    fn publish_replacing(
        &self,
        document_id: &str,
        new_chunks: Vec<IndexedChunk>,
    ) -> Result<usize> {
        let mut guard = self
            .snapshot
            .write()
            .map_err(|e| anyhow::anyhow!("Snapshot lock poisoned: {}", e))?;

        let mut chunks: Vec<IndexedChunk> = guard
            .chunks
            .iter()
            .filter(|c| c.meta.document_id != document_id)
            .cloned()
            .collect();
        let removed = guard.chunks.len() - chunks.len();

        chunks.extend(new_chunks);
        *guard = Arc::new(IndexSnapshot { chunks });

        Ok(removed)
    }

    /// 문서 ID별 쓰기 락 획득
    async fn acquire_doc_lock(&self, document_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            // 락 맵 포이즈닝은 복구 가능 (맵 자체는 항상 일관된 상태)
            let mut locks = self
                .doc_locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(
                locks
                    .entry(document_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// 임베딩 또는 저하 모드 대체
    ///
    /// 백엔드 장애 시 제로 벡터를 대체 사용하여 가용성을 유지합니다.
    async fn embed_or_degraded(&self, text: &str) -> (Vec<f32>, bool) {
        match self.embedder.embed(text).await {
            Ok(embedding) => (embedding, false),
            Err(e) => {
                tracing::warn!("Embedding unavailable, falling back to zero vector: {:#}", e);
                (vec![0.0; self.embedder.dimension()], true)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::retrieval::chunker::ChunkConfig;

    /// 결정적 스텁 임베더: 단어별 해시 빈도 벡터
    struct StubEmbedder {
        dimension: usize,
        fail: bool,
    }

    impl StubEmbedder {
        fn new(dimension: usize) -> Self {
            Self {
                dimension,
                fail: false,
            }
        }

        fn failing(dimension: usize) -> Self {
            Self {
                dimension,
                fail: true,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self.fail {
                anyhow::bail!("backend down");
            }

            let mut vector = vec![0.0f32; self.dimension];
            for word in text.split_whitespace() {
                let mut h: usize = 0;
                for b in word.to_lowercase().bytes() {
                    h = h.wrapping_mul(31).wrapping_add(b as usize);
                }
                vector[h % self.dimension] += 1.0;
            }
            Ok(vector)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn test_index(fail: bool) -> VectorIndex {
        let embedder: Arc<dyn EmbeddingProvider> = if fail {
            Arc::new(StubEmbedder::failing(32))
        } else {
            Arc::new(StubEmbedder::new(32))
        };
        let chunker = TextChunker::new(ChunkConfig {
            size: 200,
            overlap: 20,
        })
        .unwrap();
        VectorIndex::new(embedder, Box::new(chunker))
    }

    #[tokio::test]
    async fn test_upsert_and_query() {
        let index = test_index(false);

        index
            .upsert("doc-1", "Admissions", "handbook", "apply before the deadline")
            .await
            .unwrap();
        index
            .upsert("doc-2", "Housing", "handbook", "campus housing options")
            .await
            .unwrap();

        let matches = index.query("deadline to apply", 5).await.unwrap();
        assert!(!matches.is_empty());
        assert_eq!(matches[0].meta.document_id, "doc-1");
        assert!(!matches[0].meta.degraded);

        // 거리 오름차순
        for pair in matches.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_previous_chunks() {
        let index = test_index(false);

        index
            .upsert("doc-1", "T", "s", &"first version text. ".repeat(30))
            .await
            .unwrap();
        let before = index.document_chunk_count("doc-1");
        assert!(before > 0);

        index.upsert("doc-1", "T", "s", "tiny").await.unwrap();
        assert_eq!(index.document_chunk_count("doc-1"), 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let index = test_index(false);

        index.upsert("doc-1", "T", "s", "some text").await.unwrap();
        assert_eq!(index.remove("doc-1").await.unwrap(), 1);
        assert_eq!(index.remove("doc-1").await.unwrap(), 0);
        assert_eq!(index.remove("never-indexed").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_query_k_bound() {
        let index = test_index(false);

        for i in 0..5 {
            index
                .upsert(&format!("doc-{}", i), "T", "s", "same words everywhere")
                .await
                .unwrap();
        }

        let matches = index.query("words", 3).await.unwrap();
        assert_eq!(matches.len(), 3);

        let matches = index.query("words", 0).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_degraded_mode_flags_results() {
        let index = test_index(true);

        // 백엔드가 죽어도 인덱싱/검색은 성공해야 함
        index.upsert("doc-1", "T", "s", "some text").await.unwrap();

        let matches = index.query("anything", 5).await.unwrap();
        assert!(!matches.is_empty());
        for m in &matches {
            assert!(m.meta.degraded);
            assert_eq!(m.distance, 1.0); // 고정 센티넬 거리
        }
    }

    #[tokio::test]
    async fn test_rebuild_swaps_whole_snapshot() {
        let index = test_index(false);

        index.upsert("old-doc", "T", "s", "old content").await.unwrap();

        let stats = index
            .rebuild(vec![
                DocumentRecord {
                    id: "new-1".to_string(),
                    title: "T1".to_string(),
                    source: "s".to_string(),
                    text: "new content one".to_string(),
                },
                DocumentRecord {
                    id: "new-2".to_string(),
                    title: "T2".to_string(),
                    source: "s".to_string(),
                    text: "new content two".to_string(),
                },
            ])
            .await
            .unwrap();

        assert_eq!(stats.documents, 2);
        assert_eq!(index.document_chunk_count("old-doc"), 0);
        assert!(index.document_chunk_count("new-1") > 0);

        // 리빌드 후 쿼리는 새 인덱스만 관찰
        let matches = index.query("content", 10).await.unwrap();
        assert!(matches
            .iter()
            .all(|m| m.meta.document_id != "old-doc"));
    }

    #[tokio::test]
    async fn test_concurrent_rebuild_rejected() {
        let index = test_index(false);

        // 첫 리빌드의 락을 선점한 상태에서 두 번째 요청
        let _guard = index.rebuild_lock.try_lock().unwrap();
        let result = index.rebuild(vec![]).await;

        assert!(result.is_err());
        let err = result.err().unwrap();
        assert!(err
            .downcast_ref::<RetrievalError>()
            .map(|e| matches!(e, RetrievalError::RebuildInProgress))
            .unwrap_or(false));
    }

    #[tokio::test]
    async fn test_query_during_rebuild_sees_single_snapshot() {
        /// 임베딩마다 잠시 멈추는 스텁 (리빌드를 길게 끌기 위함)
        struct SlowEmbedder;

        #[async_trait]
        impl EmbeddingProvider for SlowEmbedder {
            async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                Ok(vec![1.0; 8])
            }

            fn dimension(&self) -> usize {
                8
            }

            fn name(&self) -> &str {
                "slow-stub"
            }
        }

        let chunker = TextChunker::new(ChunkConfig {
            size: 50,
            overlap: 5,
        })
        .unwrap();
        let index = Arc::new(VectorIndex::new(Arc::new(SlowEmbedder), Box::new(chunker)));

        // 이전 세대: old-* 문서들
        index
            .rebuild(
                (0..3)
                    .map(|i| DocumentRecord {
                        id: format!("old-{}", i),
                        title: "old".to_string(),
                        source: "s".to_string(),
                        text: "old generation text".to_string(),
                    })
                    .collect(),
            )
            .await
            .unwrap();

        // 새 세대 리빌드를 백그라운드로 시작
        let rebuild_index = Arc::clone(&index);
        let rebuild_task = tokio::spawn(async move {
            rebuild_index
                .rebuild(
                    (0..3)
                        .map(|i| DocumentRecord {
                            id: format!("new-{}", i),
                            title: "new".to_string(),
                            source: "s".to_string(),
                            text: "new generation text".to_string(),
                        })
                        .collect(),
                )
                .await
                .unwrap();
        });

        // 리빌드 진행 중 반복 쿼리: 세대가 섞인 결과는 없어야 함
        for _ in 0..20 {
            let matches = index.query("text", 10).await.unwrap();
            let has_old = matches.iter().any(|m| m.meta.document_id.starts_with("old-"));
            let has_new = matches.iter().any(|m| m.meta.document_id.starts_with("new-"));
            assert!(
                !(has_old && has_new),
                "query observed a mix of pre- and post-rebuild chunks"
            );
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        rebuild_task.await.unwrap();

        // 완료 후에는 새 세대만 관찰
        let matches = index.query("text", 10).await.unwrap();
        assert!(matches.iter().all(|m| m.meta.document_id.starts_with("new-")));
    }

    #[tokio::test]
    async fn test_empty_document_indexes_nothing() {
        let index = test_index(false);
        let added = index.upsert("doc-1", "T", "s", "").await.unwrap();
        assert_eq!(added, 0);
        assert_eq!(index.chunk_count(), 0);
    }
}
