//! Result Merger - 벡터/지식 결과 인터리브
//!
//! 서로 다른 스케일로 스코어링된 두 결과 스트림을 하나의 고정 길이
//! 시퀀스로 합칩니다. 재정렬 병합이 아니라 위치 고정 인터리브로,
//! 벡터 결과가 양으로 우세해도 구조화 결과가 상단 근처에
//! 보장적으로 노출됩니다. 호환성을 위해 위치 정책을 그대로 유지합니다.

use crate::knowledge::ScoredEntry;

use super::vector::VectorMatch;

// ============================================================================
// Types
// ============================================================================

/// 병합 출력 상한
pub const MAX_CONTEXT_ITEMS: usize = 10;
/// 최상위 1개 이후 끼워 넣는 지식 결과 상한
const MAX_WOVEN_KNOWLEDGE: usize = 8;

/// 결과 출처
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextOrigin {
    /// 벡터 인덱스 (문서 청크)
    Vector,
    /// 구조화 지식베이스
    Knowledge,
}

/// 응답 생성기로 전달되는 컨텍스트 단위
#[derive(Debug, Clone)]
pub struct ContextItem {
    pub text: String,
    pub title: String,
    pub source: String,
    pub kind: String,
    pub relevance_score: f32,
    pub origin: ContextOrigin,
}

impl ContextItem {
    /// 벡터 매치 정규화
    pub fn from_vector_match(m: &VectorMatch) -> Self {
        Self {
            text: m.chunk_text.clone(),
            title: m.meta.title.clone(),
            source: m.meta.source.clone(),
            kind: if m.meta.degraded {
                "document_chunk_degraded".to_string()
            } else {
                "document_chunk".to_string()
            },
            // 거리 -> 유사도 변환 (낮은 거리 = 높은 스코어)
            relevance_score: 1.0 / (1.0 + m.distance),
            origin: ContextOrigin::Vector,
        }
    }

    /// 지식 엔트리 정규화
    ///
    /// 질문/답변과 타입별 페이로드를 하나의 텍스트 블록으로 렌더링합니다.
    pub fn from_scored_entry(s: &ScoredEntry) -> Self {
        let mut text = format!("{}\n\n{}", s.entry.question, s.entry.answer);
        if let Some(extra) = s.entry.payload.render() {
            text.push_str("\n\n");
            text.push_str(&extra);
        }

        let title = if s.entry.question.is_empty() {
            format!("{} Knowledge", title_case(&s.category))
        } else {
            s.entry.question.clone()
        };

        Self {
            text,
            title,
            source: format!("Knowledge Base: {}", title_case(&s.category)),
            kind: s.entry.payload.entry_type().as_str().to_string(),
            relevance_score: s.score,
            origin: ContextOrigin::Knowledge,
        }
    }
}

// ============================================================================
// Merge
// ============================================================================

/// 두 결과 스트림 병합
///
/// 입력은 이미 정렬되어 있어야 합니다
/// (벡터: 거리 오름차순, 지식: 스코어 내림차순).
///
/// 1. 한쪽이 비어 있으면 다른 쪽을 상한까지 잘라 반환
/// 2. 출력은 벡터 결과로 시작
/// 3. 최고 스코어 지식 결과를 인덱스 1에 삽입
/// 4. 남은 지식 결과(최대 8개)를 한 칸 건너 위치에 끼워 넣어
///    `[v0, k0, v1, k1, v2, k2, ...]` 형태를 만들고,
///    자리가 없으면 끝에 덧붙임
/// 5. 10개로 절단
pub fn merge(vector_results: &[VectorMatch], knowledge_results: &[ScoredEntry]) -> Vec<ContextItem> {
    let vector_items: Vec<ContextItem> = vector_results
        .iter()
        .map(ContextItem::from_vector_match)
        .collect();
    let mut knowledge_items = knowledge_results
        .iter()
        .map(ContextItem::from_scored_entry)
        .collect::<Vec<_>>()
        .into_iter();

    if knowledge_results.is_empty() {
        let mut out = vector_items;
        out.truncate(MAX_CONTEXT_ITEMS);
        return out;
    }

    if vector_results.is_empty() {
        let mut out: Vec<ContextItem> = knowledge_items.collect();
        out.truncate(MAX_CONTEXT_ITEMS);
        return out;
    }

    let mut out = vector_items;

    // 최고 스코어 지식 결과는 항상 상단 근처에 노출
    if let Some(top) = knowledge_items.next() {
        out.insert(1, top);
    }

    let mut position = 3;
    for item in knowledge_items.take(MAX_WOVEN_KNOWLEDGE) {
        if position <= out.len() {
            out.insert(position, item);
        } else {
            out.push(item);
        }
        position += 2;
    }

    out.truncate(MAX_CONTEXT_ITEMS);
    out
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 카테고리 레이블을 표시용으로 변환 (`campus_life` -> `Campus Life`)
fn title_case(label: &str) -> String {
    label
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Tests
// ============================================================================
