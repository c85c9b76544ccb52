//! Retrieval Engine - 검색 오케스트레이션
//!
//! 벡터 인덱스와 지식베이스를 독립 검색기로 합성하고,
//! 결과를 ResultMerger로 병합합니다. 검색은 베스트 에포트 인프라로,
//! 어떤 장애도 엔진 경계를 넘지 않습니다 (빈 목록으로 대체).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::document::DocumentStore;
use crate::error::RetrievalError;
use crate::knowledge::KnowledgeBase;

use super::index::{DocumentRecord, RebuildStats, VectorIndex};
use super::merger::{merge, ContextItem};
use super::vector::VectorMatch;

// ============================================================================
// Configuration
// ============================================================================

/// 엔진 검색 설정
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// 벡터 검색 후보 수
    pub vector_top_k: usize,
    /// 지식베이스 검색 후보 수
    pub knowledge_top_k: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vector_top_k: 5,
            knowledge_top_k: 5,
        }
    }
}

// ============================================================================
// RetrievalEngine
// ============================================================================

/// 검색 엔진
///
/// 상태(인덱스 스냅샷, 지식베이스 맵)는 엔진 인스턴스가 소유하며,
/// 협력자에게는 핸들로 전달됩니다. 쿼리 처리는 무상태이고
/// 인덱스 변경 작업과 동시에 실행될 수 있습니다.
pub struct RetrievalEngine {
    store: Arc<dyn DocumentStore>,
    index: Arc<VectorIndex>,
    knowledge: Arc<KnowledgeBase>,
    config: EngineConfig,
}

impl RetrievalEngine {
    /// 새 엔진 생성
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: Arc<VectorIndex>,
        knowledge: Arc<KnowledgeBase>,
    ) -> Self {
        Self::with_config(store, index, knowledge, EngineConfig::default())
    }

    /// 설정을 지정하여 생성
    pub fn with_config(
        store: Arc<dyn DocumentStore>,
        index: Arc<VectorIndex>,
        knowledge: Arc<KnowledgeBase>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            index,
            knowledge,
            config,
        }
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// 쿼리에 대한 컨텍스트 검색
    ///
    /// 항상 (비어 있을 수 있는) 목록을 반환하며 실패하지 않습니다.
    pub async fn search(&self, query: &str) -> Vec<ContextItem> {
        self.search_with_deadline(query, None).await
    }

    /// 데드라인이 있는 컨텍스트 검색
    ///
    /// 데드라인을 넘긴 백엔드 호출은 중단하고,
    /// 그때까지 완료된 부분 결과만으로 병합합니다.
    /// 아무것도 완료되지 않았으면 빈 목록이 정의된 저하 응답입니다.
    pub async fn search_with_deadline(
        &self,
        query: &str,
        deadline: Option<Duration>,
    ) -> Vec<ContextItem> {
        // 지식베이스 검색은 인메모리라 데드라인 대상이 아님
        let knowledge_results = self.knowledge.search(query, self.config.knowledge_top_k);

        let vector_future = self.index.query(query, self.config.vector_top_k);
        let vector_results: Vec<VectorMatch> = match deadline {
            Some(limit) => match tokio::time::timeout(limit, vector_future).await {
                Ok(Ok(matches)) => matches,
                Ok(Err(e)) => {
                    tracing::warn!("Vector search failed, continuing without it: {:#}", e);
                    vec![]
                }
                Err(_) => {
                    tracing::warn!(
                        "Vector search missed deadline ({:?}), returning partial context",
                        limit
                    );
                    vec![]
                }
            },
            None => match vector_future.await {
                Ok(matches) => matches,
                Err(e) => {
                    tracing::warn!("Vector search failed, continuing without it: {:#}", e);
                    vec![]
                }
            },
        };

        merge(&vector_results, &knowledge_results)
    }

    // ------------------------------------------------------------------
    // Management Operations
    // ------------------------------------------------------------------

    /// 문서 추가 또는 갱신 (인덱싱 포함)
    ///
    /// 저장소에서 본문과 메타데이터를 읽어 해당 문서의 청크를
    /// 통째로 교체합니다.
    ///
    /// # Returns
    /// 인덱싱된 청크 수
    pub async fn add_or_update_document(&self, document_id: &str) -> Result<usize> {
        let text = self
            .store
            .get_text(document_id)
            .await
            .context("Failed to read document text")?
            .ok_or_else(|| RetrievalError::DocumentNotFound(document_id.to_string()))?;

        let meta = self
            .store
            .get_meta(document_id)
            .await
            .context("Failed to read document metadata")?
            .ok_or_else(|| RetrievalError::DocumentNotFound(document_id.to_string()))?;

        self.index
            .upsert(document_id, &meta.title, &meta.source, &text)
            .await
    }

    /// 문서 인덱스 제거 (멱등)
    pub async fn remove_document(&self, document_id: &str) -> Result<usize> {
        self.index.remove(document_id).await
    }

    /// 전체 인덱스 리빌드
    ///
    /// 읽기 실패한 문서는 건너뛰고 기록한 뒤 계속 진행합니다.
    /// 이미 리빌드가 진행 중이면 거부됩니다.
    pub async fn rebuild_all(&self) -> Result<RebuildStats> {
        let ids = self
            .store
            .list_ids()
            .await
            .context("Failed to list documents for rebuild")?;

        let mut records = Vec::with_capacity(ids.len());
        let mut skipped = 0usize;

        for id in ids {
            let text = match self.store.get_text(&id).await {
                Ok(Some(text)) => text,
                Ok(None) => {
                    tracing::warn!("Skipping document {} during rebuild: text missing", id);
                    skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Skipping document {} during rebuild: {:#}", id, e);
                    skipped += 1;
                    continue;
                }
            };

            let meta = match self.store.get_meta(&id).await {
                Ok(Some(meta)) => meta,
                Ok(None) | Err(_) => {
                    tracing::warn!("Skipping document {} during rebuild: metadata missing", id);
                    skipped += 1;
                    continue;
                }
            };

            records.push(DocumentRecord {
                id,
                title: meta.title,
                source: meta.source,
                text,
            });
        }

        let mut stats = self.index.rebuild(records).await?;
        stats.skipped_documents = skipped;

        Ok(stats)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// 벡터 인덱스 핸들
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// 지식베이스 핸들
    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }
}

// ============================================================================
// Tests
// ============================================================================
