//! 지식 엔트리 데이터 모델
//!
//! 카테고리별 질문/답변 엔트리와 타입별 페이로드를 정의합니다.
//! 페이로드는 닫힌 태그드 유니온으로, 스코어링과 포매팅의
//! 타입 분기가 컴파일러 검사를 받습니다.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Category Source
// ============================================================================

/// 지식 소스 파일 단위 (카테고리 하나 + 엔트리 목록)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySource {
    pub category: String,
    pub entries: Vec<KnowledgeEntry>,
}

// ============================================================================
// Knowledge Entry
// ============================================================================

/// 구조화된 지식 엔트리
///
/// `id`는 카테고리 안에서만 유일합니다 (전역 유일 보장 없음).
/// 로드 후 불변입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub question: String,
    pub answer: String,
    #[serde(flatten)]
    pub payload: EntryPayload,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

// ============================================================================
// Entry Payload
// ============================================================================

/// 링크 항목
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkItem {
    pub text: String,
    pub url: String,
}

/// 테이블 데이터
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableData {
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

/// 통계 항목
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistic {
    pub metric: String,
    pub value: String,
}

/// 일정 항목 (전형 라운드 + 마감일)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateItem {
    pub round: String,
    pub deadline: String,
}

/// 타입별 페이로드 (태그드 유니온)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EntryPayload {
    #[serde(rename = "short_response")]
    Short,
    #[serde(rename = "long_response")]
    Long,
    #[serde(rename = "link_response")]
    Link {
        #[serde(default)]
        links: Vec<LinkItem>,
    },
    #[serde(rename = "table_response")]
    Table {
        #[serde(default)]
        table: TableData,
    },
    #[serde(rename = "statistical_response")]
    Statistical {
        #[serde(default)]
        statistics: Vec<Statistic>,
    },
    #[serde(rename = "date_response")]
    Date {
        #[serde(default)]
        dates: Vec<DateItem>,
    },
    #[serde(rename = "procedural_response")]
    Procedural {
        #[serde(default)]
        steps: Vec<String>,
    },
}

/// 엔트리 타입 (페이로드의 판별자)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    Short,
    Long,
    Link,
    Table,
    Statistical,
    Date,
    Procedural,
}

impl EntryType {
    /// 표시용 레이블
    pub fn label(&self) -> &'static str {
        match self {
            EntryType::Short => "Quick Answer",
            EntryType::Long => "Detailed Explanation",
            EntryType::Link => "Resource Links",
            EntryType::Table => "Tabular Data",
            EntryType::Statistical => "Statistics",
            EntryType::Date => "Important Dates",
            EntryType::Procedural => "Process Guide",
        }
    }

    /// 직렬화 태그와 동일한 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Short => "short_response",
            EntryType::Long => "long_response",
            EntryType::Link => "link_response",
            EntryType::Table => "table_response",
            EntryType::Statistical => "statistical_response",
            EntryType::Date => "date_response",
            EntryType::Procedural => "procedural_response",
        }
    }
}

impl EntryPayload {
    /// 페이로드의 엔트리 타입
    pub fn entry_type(&self) -> EntryType {
        match self {
            EntryPayload::Short => EntryType::Short,
            EntryPayload::Long => EntryType::Long,
            EntryPayload::Link { .. } => EntryType::Link,
            EntryPayload::Table { .. } => EntryType::Table,
            EntryPayload::Statistical { .. } => EntryType::Statistical,
            EntryPayload::Date { .. } => EntryType::Date,
            EntryPayload::Procedural { .. } => EntryType::Procedural,
        }
    }

    /// 페이로드를 컨텍스트용 보조 텍스트로 렌더링
    ///
    /// 텍스트 타입(short/long)은 추가 블록이 없습니다.
    pub fn render(&self) -> Option<String> {
        match self {
            EntryPayload::Short | EntryPayload::Long => None,

            EntryPayload::Link { links } if !links.is_empty() => Some(
                links
                    .iter()
                    .map(|l| format!("- {}: {}", l.text, l.url))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),

            EntryPayload::Table { table } if !table.rows.is_empty() => {
                let mut out = String::from("Table data:\n");
                if !table.headers.is_empty() {
                    out.push_str(&format!("  {}\n", table.headers.join(", ")));
                }
                for row in &table.rows {
                    out.push_str(&format!("  {}\n", row.join(", ")));
                }
                Some(out.trim_end().to_string())
            }

            EntryPayload::Statistical { statistics } if !statistics.is_empty() => Some(
                statistics
                    .iter()
                    .map(|s| format!("- {}: {}", s.metric, s.value))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),

            EntryPayload::Date { dates } if !dates.is_empty() => Some(
                dates
                    .iter()
                    .map(|d| format!("- {}: {}", d.round, d.deadline))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),

            EntryPayload::Procedural { steps } if !steps.is_empty() => Some(
                steps
                    .iter()
                    .enumerate()
                    .map(|(i, step)| format!("{}. {}", i + 1, step))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),

            // 페이로드 내용이 비어있는 변형들
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_link_entry() {
        let json = r#"{
            "id": "adm001",
            "question": "Where do I apply?",
            "answer": "Use the online portal.",
            "type": "link_response",
            "links": [{"text": "Portal", "url": "https://apply.example.edu"}]
        }"#;

        let entry: KnowledgeEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.payload.entry_type(), EntryType::Link);

        let rendered = entry.payload.render().unwrap();
        assert!(rendered.contains("Portal"));
        assert!(rendered.contains("https://apply.example.edu"));
    }

    #[test]
    fn test_deserialize_date_entry() {
        let json = r#"{
            "id": "adm002",
            "question": "When are the deadlines?",
            "answer": "Three rounds per year.",
            "type": "date_response",
            "dates": [
                {"round": "Round 1", "deadline": "2025-01-15"},
                {"round": "Round 2", "deadline": "2025-04-15"}
            ],
            "metadata": {"source": "admissions office"}
        }"#;

        let entry: KnowledgeEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.payload.entry_type(), EntryType::Date);
        assert_eq!(entry.metadata.get("source").unwrap(), "admissions office");

        let rendered = entry.payload.render().unwrap();
        assert!(rendered.contains("Round 1: 2025-01-15"));
    }

    #[test]
    fn test_short_entry_renders_nothing() {
        let json = r#"{
            "id": "gen001",
            "question": "What is the mascot?",
            "answer": "A lion.",
            "type": "short_response"
        }"#;

        let entry: KnowledgeEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.payload.entry_type(), EntryType::Short);
        assert!(entry.payload.render().is_none());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let json = r#"{
            "id": "x",
            "question": "q",
            "answer": "a",
            "type": "mystery_response"
        }"#;

        assert!(serde_json::from_str::<KnowledgeEntry>(json).is_err());
    }

    #[test]
    fn test_procedural_steps_numbered() {
        let payload = EntryPayload::Procedural {
            steps: vec!["Fill the form".to_string(), "Submit it".to_string()],
        };

        let rendered = payload.render().unwrap();
        assert!(rendered.starts_with("1. Fill the form"));
        assert!(rendered.contains("2. Submit it"));
    }
}
