use std::cmp::Ordering;

use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

use crate::{
    catalog::Catalog,
    dataset::DatasetRecord,
    error::Result,
    query::{FieldVocabulary, Operator, QueryTerm, parse_size_value},
    search_index::truncate_snippet,
};

/// How many full-text candidates to pull before structured filtering.
const FTS_CANDIDATE_LIMIT: usize = 1000;

/// One search result.
///
/// `rank` is 1-indexed, 1 = best. `score` is BM25 relevance, higher = better;
/// it is 0 when the query had no free-text component (no relevance signal).
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub rank: usize,
    pub score: f32,
    pub id: String,
    pub name: String,
    pub snippet: String,
    pub record: DatasetRecord,
}

/// Best-effort search: storage and index errors are logged and turned into
/// an empty result list, never surfaced to the caller. A zero-row answer is
/// therefore indistinguishable from a recoverable backend failure without
/// inspecting the logs; this keeps the hot read path always available.
pub fn search(
    query: &str,
    limit: usize,
    vocab: &FieldVocabulary,
    catalog: &Catalog,
) -> Vec<SearchHit> {
    match execute_search(query, limit, vocab, catalog) {
        Ok(hits) => hits,
        Err(e) => {
            error!(query, error = %e, "search failed, returning no results");
            Vec::new()
        }
    }
}

/// Execute the search pipeline.
///
/// 1. Parse the query (infallible).
/// 2. No field filters: pure full-text search, BM25-ranked, or a
///    most-recently-updated listing when the query is empty.
/// 3. Field filters present: conjunctive predicates over the stored
///    payloads, applied to full-text candidates when free text is also
///    present (relevance order) or to a full catalog scan when not
///    (implementation-defined order, score 0).
pub fn execute_search(
    query: &str,
    limit: usize,
    vocab: &FieldVocabulary,
    catalog: &Catalog,
) -> Result<Vec<SearchHit>> {
    let parsed = vocab.parse(query);

    if !parsed.has_filters() {
        return match catalog.index().build_free_text_query(&parsed)? {
            Some(q) => {
                let fts = catalog.index().search(&*q, limit)?;
                Ok(hydrate(catalog, fts))
            }
            // Nothing to rank on: list by recency instead.
            None => {
                let fts = catalog.index().list_recent(limit)?;
                Ok(hydrate(catalog, fts))
            }
        };
    }

    let filters: Vec<&QueryTerm> = parsed.filters().collect();

    if let Some(q) = catalog.index().build_free_text_query(&parsed)? {
        // Free text narrows and ranks; filters then prune the candidates.
        let candidates = catalog.index().search(&*q, FTS_CANDIDATE_LIMIT)?;
        let mut hits = Vec::new();
        for fts in candidates {
            if hits.len() == limit {
                break;
            }
            let Some(record) = lookup(catalog, &fts.id)? else {
                continue;
            };
            if matches_filters(&record, &filters)? {
                hits.push(SearchHit {
                    rank: hits.len() + 1,
                    score: fts.score,
                    id: fts.id,
                    name: fts.name,
                    snippet: fts.snippet,
                    record,
                });
            }
        }
        return Ok(hits);
    }

    // Filters only: scan the payload store. No relevance signal, so the
    // order is implementation-defined (not guaranteed stable across schema
    // changes) and scores stay at 0.
    let mut hits = Vec::new();
    for record in catalog.db().list_all()? {
        if hits.len() == limit {
            break;
        }
        if matches_filters(&record, &filters)? {
            hits.push(SearchHit {
                rank: hits.len() + 1,
                score: 0.0,
                id: record.id.clone(),
                name: record.name.clone(),
                snippet: truncate_snippet(&record.description),
                record,
            });
        }
    }
    Ok(hits)
}

/// "List all": same pipeline as an empty query, up to `limit` rows ordered
/// by most recently updated.
pub fn list_datasets(limit: usize, catalog: &Catalog) -> Result<Vec<SearchHit>> {
    execute_search("", limit, &FieldVocabulary::default(), catalog)
}

fn lookup(catalog: &Catalog, id: &str) -> Result<Option<DatasetRecord>> {
    let record = catalog.db().get(id)?;
    if record.is_none() {
        // Shadow row without a payload row: should not happen, but a torn
        // write must not take the whole query down.
        warn!(id, "indexed dataset has no payload row, skipping");
    }
    Ok(record)
}

fn hydrate(
    catalog: &Catalog,
    fts: Vec<crate::search_index::FtsHit>,
) -> Vec<SearchHit> {
    let mut hits = Vec::with_capacity(fts.len());
    for f in fts {
        let record = match lookup(catalog, &f.id) {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(e) => {
                warn!(id = %f.id, error = %e, "failed to load payload row");
                continue;
            }
        };
        hits.push(SearchHit {
            rank: hits.len() + 1,
            score: f.score,
            id: f.id,
            name: f.name,
            snippet: f.snippet,
            record,
        });
    }
    hits
}

/// Conjunctive (AND) evaluation: every filter clause must hold. Filters on
/// the same field are also AND'ed; that is what makes ranges work
/// (`year>=2020 year<=2023`) and it deliberately extends to non-range
/// fields like repeated `tag:` filters.
fn matches_filters(
    record: &DatasetRecord,
    filters: &[&QueryTerm],
) -> Result<bool> {
    let payload = serde_json::to_value(record)?;
    Ok(filters.iter().all(|term| clause_matches(&payload, term)))
}

fn clause_matches(payload: &Value, term: &QueryTerm) -> bool {
    let field = term.field.as_deref().unwrap_or_default();
    let Some(attribute) = map_field(field) else {
        warn!(field, "filter field has no payload attribute mapping, clause skipped");
        return true;
    };
    let Some(value) = payload.get(attribute) else {
        // Records simply missing the attribute do not match.
        return false;
    };

    match term.operator {
        Operator::Contains => contains_matches(value, &term.value),
        op => compare_matches(value, &term.value, op, field),
    }
}

/// Map a recognized filter field name to the payload attribute it
/// constrains. Returns `None` for vocabulary entries with no attribute.
fn map_field(field: &str) -> Option<&'static str> {
    Some(match field {
        "id" => "id",
        "name" => "name",
        "project" | "projects" => "used_in_projects",
        "tag" | "tags" => "tags",
        "format" => "file_format",
        "type" => "data_type",
        "method" => "access_method",
        "source" => "source",
        "size" => "size",
        "category" => "category",
        "date" | "date_created" => "date_created",
        "year" => "year",
        "sr" => "spatial_resolution",
        "sc" | "spatial_coverage" => "spatial_coverage",
        "tr" => "temporal_resolution",
        "tc" | "temporal_coverage" => "temporal_coverage",
        _ => return None,
    })
}

/// The `:` operator. Arrays require the filter value to equal a complete
/// element (case-insensitive), so `project:ML` does not match a dataset
/// used only in "ML-Adjacent". Scalars use a case-insensitive substring
/// test.
fn contains_matches(value: &Value, filter: &str) -> bool {
    match value {
        Value::Array(items) => items
            .iter()
            .any(|item| scalar_text(item).eq_ignore_ascii_case(filter)),
        other => scalar_text(other)
            .to_lowercase()
            .contains(&filter.to_lowercase()),
    }
}

/// The `=,>,<,>=,<=` operators: numeric comparison when both sides coerce
/// to numbers (size values may carry B/KB/MB/GB/TB units), lexicographic
/// string comparison otherwise. No type inference is attempted beyond
/// that; the payload is schemaless per record.
fn compare_matches(
    value: &Value,
    filter: &str,
    op: Operator,
    field: &str,
) -> bool {
    if let (Some(a), Some(b)) = (numeric(value), numeric_filter(filter, field))
    {
        return ordering_matches(a.total_cmp(&b), op);
    }
    ordering_matches(scalar_text(value).as_str().cmp(filter), op)
}

fn ordering_matches(ordering: Ordering, op: Operator) -> bool {
    match op {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Gte => ordering != Ordering::Less,
        Operator::Lte => ordering != Ordering::Greater,
        Operator::Contains => false,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn numeric_filter(filter: &str, field: &str) -> Option<f64> {
    if field == "size" {
        return parse_size_value(filter).ok().map(|bytes| bytes as f64);
    }
    filter.trim().parse().ok()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Format results for human-readable terminal output.
pub fn format_human(results: &[SearchHit]) {
    if results.is_empty() {
        println!("No results found.");
        return;
    }

    for r in results {
        println!("{:>3}. [{:.3}] {} ({})", r.rank, r.score, r.name, r.id);
        if !r.snippet.is_empty() {
            println!("     {}", r.snippet);
        }
    }
    println!("\n{} result(s)", results.len());
}

/// Format results as JSON output.
pub fn format_json(results: &[SearchHit], query: &str) -> Result<()> {
    let out = serde_json::json!({
        "query": query,
        "result_count": results.len(),
        "results": results,
    });
    println!("{}", serde_json::to_string(&out)?);
    Ok(())
}

/// Format results as plain dataset ids (one per line).
pub fn format_ids(results: &[SearchHit]) {
    for r in results {
        println!("{}", r.id);
    }
}
