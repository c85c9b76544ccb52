//! Knowledge Base - 카테고리별 구조화 지식 저장소
//!
//! JSON 소스 파일(카테고리당 한 개)을 로드하여 인메모리 맵으로 보관합니다.
//! 파싱 실패한 소스는 건너뛰고 기록한 뒤 나머지를 계속 로드합니다.
//! 로드 후에는 불변이며, 교체는 통째로만 일어납니다.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use walkdir::WalkDir;

use super::entry::{CategorySource, KnowledgeEntry};
use super::scorer::KeywordScorer;

// ============================================================================
// Types
// ============================================================================

/// 스코어링된 검색 결과
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: KnowledgeEntry,
    pub category: String,
    pub score: f32,
}

/// 건너뛴 소스 기록
#[derive(Debug, Clone)]
pub struct SkippedSource {
    pub path: PathBuf,
    pub reason: String,
}

/// 로드 결과 리포트
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// 로드된 카테고리 수
    pub categories: usize,
    /// 로드된 엔트리 총 수
    pub entries: usize,
    /// 건너뛴 소스 목록
    pub skipped: Vec<SkippedSource>,
}

// ============================================================================
// KnowledgeBase
// ============================================================================

/// 카테고리 -> 엔트리 목록 매핑
///
/// `BTreeMap`이라 카테고리 순회가 결정적이며,
/// 중복 ID 조회는 항상 같은 엔트리를 돌려줍니다.
pub struct KnowledgeBase {
    categories: BTreeMap<String, Vec<KnowledgeEntry>>,
    scorer: KeywordScorer,
    report: LoadReport,
}

impl KnowledgeBase {
    /// 디렉토리에서 모든 `*.json` 소스를 로드
    ///
    /// 디렉토리가 없으면 빈 지식베이스를 반환합니다 (에러 아님).
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut paths: Vec<PathBuf> = Vec::new();

        if dir.exists() {
            for dir_entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
                let path = dir_entry.path();
                if path.is_file()
                    && path
                        .extension()
                        .map(|ext| ext.eq_ignore_ascii_case("json"))
                        .unwrap_or(false)
                {
                    paths.push(path.to_path_buf());
                }
            }
            // 로드 순서 고정
            paths.sort();
        } else {
            tracing::warn!("Knowledge directory not found: {:?}", dir);
        }

        let mut sources = Vec::new();
        let mut skipped = Vec::new();

        for path in paths {
            let raw = match std::fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(e) => {
                    skipped.push(SkippedSource {
                        path: path.clone(),
                        reason: format!("read failed: {}", e),
                    });
                    continue;
                }
            };

            // category/entries 누락이나 잘못된 타입 태그는 여기서 걸러짐
            match serde_json::from_str::<CategorySource>(&raw) {
                Ok(source) => sources.push(source),
                Err(e) => {
                    skipped.push(SkippedSource {
                        path: path.clone(),
                        reason: format!("parse failed: {}", e),
                    });
                }
            }
        }

        let mut base = Self::from_sources(sources);
        for s in &skipped {
            tracing::warn!("Skipped knowledge source {:?}: {}", s.path, s.reason);
        }
        base.report.skipped = skipped;

        tracing::info!(
            "Loaded knowledge base: {} categories, {} entries ({} sources skipped)",
            base.report.categories,
            base.report.entries,
            base.report.skipped.len()
        );

        Ok(base)
    }

    /// 파싱된 소스들로 직접 구성
    pub fn from_sources(sources: Vec<CategorySource>) -> Self {
        let mut categories: BTreeMap<String, Vec<KnowledgeEntry>> = BTreeMap::new();

        for source in sources {
            categories
                .entry(source.category)
                .or_default()
                .extend(source.entries);
        }

        let entries = categories.values().map(|v| v.len()).sum();
        let report = LoadReport {
            categories: categories.len(),
            entries,
            skipped: Vec::new(),
        };

        Self {
            categories,
            scorer: KeywordScorer::new(),
            report,
        }
    }

    /// 빈 지식베이스
    pub fn empty() -> Self {
        Self::from_sources(Vec::new())
    }

    /// 관련도 검색
    ///
    /// 스코어 내림차순, 최대 `top_k`개.
    /// 0 이하 스코어는 제외되고, 동점은 후보 순서(카테고리/엔트리 순)를
    /// 유지합니다 (안정 정렬).
    pub fn search(&self, query: &str, top_k: usize) -> Vec<ScoredEntry> {
        let terms = self.scorer.preprocess(query);
        if terms.is_empty() || top_k == 0 {
            return vec![];
        }

        let mut results: Vec<ScoredEntry> = Vec::new();

        for (category, entries) in &self.categories {
            for entry in entries {
                let score = self.scorer.score(&terms, category, entry);
                if score > 0.0 {
                    results.push(ScoredEntry {
                        entry: entry.clone(),
                        category: category.clone(),
                        score,
                    });
                }
            }
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);

        results
    }

    /// ID로 엔트리 조회
    ///
    /// ID는 카테고리 내에서만 유일하므로, 카테고리 정렬 순으로
    /// 스캔해 첫 번째 일치를 반환합니다.
    pub fn get_by_id(&self, entry_id: &str) -> Option<(&str, &KnowledgeEntry)> {
        for (category, entries) in &self.categories {
            if let Some(entry) = entries.iter().find(|e| e.id == entry_id) {
                return Some((category.as_str(), entry));
            }
        }
        None
    }

    /// 카테고리별 엔트리 조회 (최대 `limit`개)
    pub fn get_by_category(&self, category: &str, limit: usize) -> Vec<&KnowledgeEntry> {
        self.categories
            .get(category)
            .map(|entries| entries.iter().take(limit).collect())
            .unwrap_or_default()
    }

    /// 카테고리 이름 목록
    pub fn category_names(&self) -> Vec<&str> {
        self.categories.keys().map(|k| k.as_str()).collect()
    }

    /// 로드 리포트
    pub fn load_report(&self) -> &LoadReport {
        &self.report
    }

    /// 엔트리 총 수
    pub fn entry_count(&self) -> usize {
        self.categories.values().map(|v| v.len()).sum()
    }
}

// ============================================================================
// Tests
// ============================================================================
