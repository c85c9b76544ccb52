//! Keyword Scorer - 지식 엔트리 관련도 스코어링
//!
//! 쿼리 전처리 후 카테고리/질문/답변/메타데이터 필드 매칭과
//! 엔트리 타입 보너스를 합산합니다. 스코어는 0 이상의 실수이며
//! 높을수록 관련도가 높습니다.

use regex::Regex;

use super::entry::{EntryType, KnowledgeEntry};

// ============================================================================
// Scoring Constants
// ============================================================================

/// 전처리에서 제거되는 불용어
const STOP_WORDS: [&str; 25] = [
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is",
    "it", "its", "of", "on", "that", "the", "to", "was", "were", "will", "with",
];

/// 필드 가중치
const QUESTION_WEIGHT: f32 = 3.0;
const ANSWER_WEIGHT: f32 = 1.0;
const METADATA_WEIGHT: f32 = 0.5;

/// 카테고리 단어 일치당 가산점
const CATEGORY_MATCH_SCORE: f32 = 2.0;
/// 전 텀 일치 보너스 배수
const ALL_TERMS_BONUS: f32 = 5.0;
/// 필드 시작 일치 보너스 배수
const LEADING_MATCH_BONUS: f32 = 2.0;
/// 텀당 출현 횟수 상한
const OCCURRENCE_CAP: usize = 3;
/// 타입 지시어 보너스
const TYPE_BONUS: f32 = 2.0;

/// 엔트리 타입별 지시어 집합
///
/// 쿼리 텀이 하나라도 포함되면 해당 타입 엔트리에 고정 보너스를 줍니다.
fn indicator_words(entry_type: EntryType) -> &'static [&'static str] {
    match entry_type {
        EntryType::Short => &[],
        EntryType::Long => &["explain", "detail", "details", "overview"],
        EntryType::Link => &["link", "website", "url", "visit", "webpage"],
        EntryType::Table => &["table", "list", "compare", "comparison", "data"],
        EntryType::Statistical => &["statistics", "number", "percentage", "average", "rate"],
        EntryType::Date => &["date", "deadline", "when", "schedule", "calendar"],
        EntryType::Procedural => &["how", "steps", "process", "procedure", "guide"],
    }
}

// ============================================================================
// KeywordScorer
// ============================================================================

/// 키워드 기반 관련도 스코어러
pub struct KeywordScorer {
    punctuation: Regex,
}

impl Default for KeywordScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordScorer {
    /// 새 스코어러 생성
    pub fn new() -> Self {
        Self {
            // 구두점 제거용 (단어/공백 문자 외 전부)
            punctuation: Regex::new(r"[^\w\s]").unwrap(),
        }
    }

    /// 쿼리 전처리
    ///
    /// 소문자화, 구두점 제거, 공백 분할 후
    /// 길이 2 이하 텀과 불용어를 버립니다.
    pub fn preprocess(&self, query: &str) -> Vec<String> {
        let lowered = query.to_lowercase();
        let stripped = self.punctuation.replace_all(&lowered, " ");

        stripped
            .split_whitespace()
            .filter(|term| term.len() > 2)
            .filter(|term| !STOP_WORDS.contains(term))
            .map(|term| term.to_string())
            .collect()
    }

    /// 엔트리 총점 계산
    ///
    /// 카테고리 관련도 + 질문/답변/메타데이터 필드 점수 + 타입 보너스.
    pub fn score(&self, terms: &[String], category: &str, entry: &KnowledgeEntry) -> f32 {
        if terms.is_empty() {
            return 0.0;
        }

        let mut total = self.category_score(terms, category);

        total += self.field_score(terms, &entry.question, QUESTION_WEIGHT);
        total += self.field_score(terms, &entry.answer, ANSWER_WEIGHT);

        if !entry.metadata.is_empty() {
            // BTreeMap이라 연결 순서가 결정적
            let metadata_text = entry
                .metadata
                .values()
                .cloned()
                .collect::<Vec<_>>()
                .join(" ");
            total += self.field_score(terms, &metadata_text, METADATA_WEIGHT);
        }

        total += self.type_bonus(terms, entry.payload.entry_type());

        total
    }

    /// 카테고리 레이블 관련도
    ///
    /// 레이블을 구분자(`_`, `-`, 공백)로 나눈 단어 집합과
    /// 쿼리 텀의 교집합 크기에 비례합니다.
    fn category_score(&self, terms: &[String], category: &str) -> f32 {
        let lowered = category.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
            .filter(|w| !w.is_empty())
            .collect();

        let matches = terms
            .iter()
            .filter(|term| words.contains(&term.as_str()))
            .count();

        CATEGORY_MATCH_SCORE * matches as f32
    }

    /// 단일 필드 텍스트 매칭 점수 (가중치 `weight`)
    ///
    /// - 모든 텀 출현: `+5w`
    /// - 텀별 출현 횟수(상한 3): `+min(n,3)×w`
    /// - 필드 맨 앞 일치(선행 비문자 허용): `+2w`
    fn field_score(&self, terms: &[String], field: &str, weight: f32) -> f32 {
        if field.is_empty() {
            return 0.0;
        }

        let lowered = field.to_lowercase();
        let mut score = 0.0;

        if terms.iter().all(|term| lowered.contains(term.as_str())) {
            score += ALL_TERMS_BONUS * weight;
        }

        let lead = lowered.trim_start_matches(|c: char| !c.is_alphanumeric());

        for term in terms {
            let occurrences = lowered.matches(term.as_str()).count();
            if occurrences == 0 {
                continue;
            }

            score += occurrences.min(OCCURRENCE_CAP) as f32 * weight;

            if lead.starts_with(term.as_str()) {
                score += LEADING_MATCH_BONUS * weight;
            }
        }

        score
    }

    /// 타입 지시어 보너스
    fn type_bonus(&self, terms: &[String], entry_type: EntryType) -> f32 {
        let indicators = indicator_words(entry_type);
        let hit = terms
            .iter()
            .any(|term| indicators.contains(&term.as_str()));

        if hit {
            TYPE_BONUS
        } else {
            0.0
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
