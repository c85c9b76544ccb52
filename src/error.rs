//! 검색 코어 오류 타입
//!
//! 구성 오류는 생성 시점에 즉시 실패하고,
//! 소스 데이터 오류는 건너뛰고 기록 후 계속 진행합니다.

use thiserror::Error;

/// 검색 코어 오류
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// 청킹 설정 오류 (overlap >= size는 무한 루프를 유발)
    #[error("invalid chunk config: overlap ({overlap}) must be smaller than size ({size})")]
    InvalidChunkConfig { size: usize, overlap: usize },

    /// 리빌드 중복 실행 요청
    #[error("index rebuild already in progress")]
    RebuildInProgress,

    /// 문서를 찾을 수 없음
    #[error("document not found: {0}")]
    DocumentNotFound(String),
}

// ============================================================================
// Tests
// ============================================================================
