//! Federated search across the employee and document index partitions.
//!
//! One user query fans out into two sub-queries that run concurrently. A
//! failing sub-query degrades to an empty contribution with a warning rather
//! than failing the whole search. Document hits are grouped by owner and
//! folded into the employee hits: an employee who matched directly gets their
//! matching documents nested under them, and an employee who only matched
//! through documents appears as a document-only entry scored by their best
//! document.
//!
//! Ordering is deterministic: score descending, then owner id ascending, so
//! paginated requests over an unchanged corpus never shuffle.

use crate::config::SearchConfig;
use crate::index::IndexClient;
use crate::models::{DocumentHit, EmployeeHit, MatchedDocument, ResultKind, SearchEntry};

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    /// Exact department filter (case-insensitive). Document-only entries have
    /// no department and never survive the filter.
    pub department: Option<String>,
    pub offset: usize,
    pub limit: Option<usize>,
}

#[derive(Debug)]
pub struct SearchResults {
    /// Entry count before pagination, for page controls.
    pub total: usize,
    pub entries: Vec<SearchEntry>,
}

pub async fn federated_search(
    index: &dyn IndexClient,
    config: &SearchConfig,
    request: &SearchRequest,
) -> SearchResults {
    // Empty and whitespace-only queries short-circuit without touching any
    // backend.
    if request.query.trim().is_empty() {
        return SearchResults {
            total: 0,
            entries: Vec::new(),
        };
    }

    let (employee_result, document_result) = tokio::join!(
        index.search_employees(&request.query, config.candidate_k),
        index.search_documents(&request.query, config.candidate_k),
    );

    let employee_hits = match employee_result {
        Ok(hits) => hits,
        Err(e) => {
            tracing::warn!(error = %e, "employee sub-query failed, degrading to empty");
            Vec::new()
        }
    };
    let document_hits = match document_result {
        Ok(hits) => hits,
        Err(e) => {
            tracing::warn!(error = %e, "document sub-query failed, degrading to empty");
            Vec::new()
        }
    };

    let mut entries = merge_hits(employee_hits, document_hits, config.max_docs_per_owner);

    if let Some(department) = &request.department {
        entries.retain(|e| {
            e.department
                .as_deref()
                .is_some_and(|d| d.eq_ignore_ascii_case(department))
        });
    }

    let total = entries.len();
    let limit = request.limit.unwrap_or(config.page_size as usize);
    let entries = entries
        .into_iter()
        .skip(request.offset)
        .take(limit)
        .collect();

    SearchResults { total, entries }
}

/// Folds document hits into employee hits, producing one entry per owner,
/// sorted by score descending then owner id.
///
/// Employee entries keep their own index score, raised to the best nested
/// document score when a document outranks the employee record itself.
/// Document-only entries are scored by their best document. At most
/// `max_docs_per_owner` documents are kept per entry, best first.
pub fn merge_hits(
    employee_hits: Vec<EmployeeHit>,
    mut document_hits: Vec<DocumentHit>,
    max_docs_per_owner: usize,
) -> Vec<SearchEntry> {
    document_hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });

    let mut entries: Vec<SearchEntry> = employee_hits
        .into_iter()
        .map(|hit| SearchEntry {
            kind: ResultKind::Employee,
            owner_id: hit.id,
            owner_name: hit.name,
            department: Some(hit.department),
            role: Some(hit.role),
            score: hit.score,
            snippet: Some(hit.snippet),
            documents: Vec::new(),
        })
        .collect();

    for doc in document_hits {
        let entry = match entries.iter_mut().find(|e| e.owner_id == doc.owner_id) {
            Some(entry) => entry,
            None => {
                entries.push(SearchEntry {
                    kind: ResultKind::DocumentOnly,
                    owner_id: doc.owner_id.clone(),
                    owner_name: doc.owner_name.clone(),
                    department: None,
                    role: None,
                    score: 0.0,
                    snippet: None,
                    documents: Vec::new(),
                });
                entries.last_mut().unwrap()
            }
        };

        if entry.documents.len() < max_docs_per_owner {
            entry.documents.push(MatchedDocument {
                id: doc.id,
                file_name: doc.file_name,
                score: doc.score,
                snippet: doc.snippet,
            });
        }
        if doc.score > entry.score {
            entry.score = doc.score;
        }
    }

    entries.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.owner_id.cmp(&b.owner_id))
    });
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentIndexRecord, EmployeeIndexRecord};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn employee_hit(id: &str, score: f64) -> EmployeeHit {
        EmployeeHit {
            id: id.to_string(),
            name: format!("Employee {}", id),
            department: "Engineering".to_string(),
            role: "Engineer".to_string(),
            score,
            snippet: String::new(),
        }
    }

    fn doc_hit(id: &str, owner: &str, score: f64) -> DocumentHit {
        DocumentHit {
            id: id.to_string(),
            owner_id: owner.to_string(),
            owner_name: format!("Employee {}", owner),
            file_name: format!("{}.pdf", id),
            score,
            snippet: String::new(),
        }
    }

    #[test]
    fn documents_nest_under_matching_employee() {
        let entries = merge_hits(
            vec![employee_hit("e1", 5.0)],
            vec![doc_hit("d1", "e1", 2.0), doc_hit("d2", "e1", 1.0)],
            5,
        );
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, ResultKind::Employee);
        assert_eq!(entries[0].score, 5.0);
        assert_eq!(entries[0].documents.len(), 2);
        assert_eq!(entries[0].documents[0].id, "d1");
    }

    #[test]
    fn document_only_owner_scored_by_best_document() {
        let entries = merge_hits(
            Vec::new(),
            vec![doc_hit("d1", "e9", 3.0), doc_hit("d2", "e9", 7.0)],
            5,
        );
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, ResultKind::DocumentOnly);
        assert_eq!(entries[0].score, 7.0);
        // best document first
        assert_eq!(entries[0].documents[0].id, "d2");
    }

    #[test]
    fn strong_document_raises_employee_entry_score() {
        let entries = merge_hits(
            vec![employee_hit("e1", 1.0), employee_hit("e2", 2.0)],
            vec![doc_hit("d1", "e1", 9.0)],
            5,
        );
        assert_eq!(entries[0].owner_id, "e1");
        assert_eq!(entries[0].score, 9.0);
        assert_eq!(entries[0].kind, ResultKind::Employee);
    }

    #[test]
    fn documents_per_owner_are_bounded() {
        let docs: Vec<DocumentHit> = (0..8)
            .map(|i| doc_hit(&format!("d{}", i), "e1", 8.0 - i as f64))
            .collect();
        let entries = merge_hits(Vec::new(), docs, 3);
        assert_eq!(entries[0].documents.len(), 3);
        assert_eq!(entries[0].documents[0].id, "d0");
    }

    #[test]
    fn merge_order_is_deterministic_on_score_ties() {
        let entries = merge_hits(
            vec![employee_hit("e2", 4.0), employee_hit("e1", 4.0)],
            Vec::new(),
            5,
        );
        assert_eq!(entries[0].owner_id, "e1");
        assert_eq!(entries[1].owner_id, "e2");
    }

    /// Fake index that counts sub-query calls and can fail one partition.
    #[derive(Default)]
    struct FakeIndex {
        employee_calls: AtomicUsize,
        document_calls: AtomicUsize,
        fail_documents: bool,
        employee_hits: Vec<EmployeeHit>,
        document_hits: Vec<DocumentHit>,
    }

    #[async_trait]
    impl IndexClient for FakeIndex {
        async fn publish_document(&self, _record: &DocumentIndexRecord) -> Result<()> {
            Ok(())
        }
        async fn publish_employee(&self, _record: &EmployeeIndexRecord) -> Result<()> {
            Ok(())
        }
        async fn delete_document(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn search_employees(&self, _query: &str, _limit: i64) -> Result<Vec<EmployeeHit>> {
            self.employee_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.employee_hits.clone())
        }
        async fn search_documents(&self, _query: &str, _limit: i64) -> Result<Vec<DocumentHit>> {
            self.document_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_documents {
                anyhow::bail!("document partition unavailable");
            }
            Ok(self.document_hits.clone())
        }
    }

    fn request(query: &str) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            department: None,
            offset: 0,
            limit: None,
        }
    }

    #[tokio::test]
    async fn empty_query_never_reaches_backends() {
        let fake = FakeIndex::default();
        let config = SearchConfig::default();

        for query in ["", "   ", "\n\t"] {
            let results = federated_search(&fake, &config, &request(query)).await;
            assert_eq!(results.total, 0);
            assert!(results.entries.is_empty());
        }
        assert_eq!(fake.employee_calls.load(Ordering::SeqCst), 0);
        assert_eq!(fake.document_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failing_partition_degrades_to_partial_results() {
        let fake = FakeIndex {
            fail_documents: true,
            employee_hits: vec![employee_hit("e1", 3.0)],
            ..FakeIndex::default()
        };
        let config = SearchConfig::default();

        let results = federated_search(&fake, &config, &request("budget")).await;
        assert_eq!(results.entries.len(), 1);
        assert_eq!(results.entries[0].owner_id, "e1");
    }

    #[tokio::test]
    async fn department_filter_drops_document_only_entries() {
        let fake = FakeIndex {
            employee_hits: vec![employee_hit("e1", 3.0)],
            document_hits: vec![doc_hit("d1", "e2", 9.0)],
            ..FakeIndex::default()
        };
        let config = SearchConfig::default();

        let mut req = request("budget");
        req.department = Some("engineering".to_string());
        let results = federated_search(&fake, &config, &req).await;
        assert_eq!(results.entries.len(), 1);
        assert_eq!(results.entries[0].owner_id, "e1");
    }

    #[tokio::test]
    async fn pagination_applies_after_merge() {
        let fake = FakeIndex {
            employee_hits: (0..7).map(|i| employee_hit(&format!("e{}", i), 7.0 - i as f64)).collect(),
            ..FakeIndex::default()
        };
        let config = SearchConfig::default();

        let mut req = request("budget");
        req.offset = 2;
        req.limit = Some(3);
        let results = federated_search(&fake, &config, &req).await;
        assert_eq!(results.total, 7);
        assert_eq!(results.entries.len(), 3);
        assert_eq!(results.entries[0].owner_id, "e2");
    }
}
