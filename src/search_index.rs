use std::path::Path;

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    Order,
    TantivyDocument,
    collector::TopDocs,
    doc,
    query::{
        AllQuery,
        BooleanQuery,
        BoostQuery,
        Occur,
        PhraseQuery,
        Query,
        RegexQuery,
        TermQuery,
    },
    schema::*,
    snippet::SnippetGenerator,
    tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer},
};

use crate::{
    dataset::DatasetRecord,
    error::Result,
    query::ParsedQuery,
};

/// Field names used in the schema.
pub mod fields {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const DESCRIPTION: &str = "description";
    pub const TAGS: &str = "tags";
    pub const PROJECTS: &str = "projects";
    pub const UPDATED_AT: &str = "updated_at";
}

/// Maximum characters in a generated description snippet.
const SNIPPET_MAX_CHARS: usize = 160;

/// Manages the tantivy full-text shadow rows for cataloged datasets.
///
/// Text fields use a lowercasing tokenizer without stemming so that the
/// per-token prefix expansion done by the search layer behaves predictably
/// for as-you-type queries.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    schema: Schema,
}

/// Resolved field handles for the schema.
#[derive(Clone, Copy)]
pub struct SchemaFields {
    pub id: Field,
    pub name: Field,
    pub description: Field,
    pub tags: Field,
    pub projects: Field,
    pub updated_at: Field,
}

/// A full-text hit from the shadow index.
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub score: f32,
    pub id: String,
    pub name: String,
    pub snippet: String,
    pub updated_at: u64,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let id = builder.add_text_field(fields::ID, STRING | STORED);

    let text_opts = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("simple_lc")
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();
    let name = builder.add_text_field(fields::NAME, text_opts.clone());
    let description =
        builder.add_text_field(fields::DESCRIPTION, text_opts.clone());
    let tags = builder.add_text_field(fields::TAGS, text_opts.clone());
    let projects = builder.add_text_field(fields::PROJECTS, text_opts);

    let updated_at = builder.add_u64_field(fields::UPDATED_AT, STORED | FAST);

    let schema = builder.build();
    let fields = SchemaFields {
        id,
        name,
        description,
        tags,
        projects,
        updated_at,
    };

    (schema, fields)
}

fn register_tokenizers(index: &Index) {
    let simple_lc = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .build();
    index.tokenizers().register("simple_lc", simple_lc);
}

impl SearchIndex {
    /// Open or create a search index at the given directory.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let (schema, _) = build_schema();

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            Index::open(mmap_dir)?
        } else {
            Index::create(
                mmap_dir,
                schema.clone(),
                tantivy::IndexSettings::default(),
            )?
        };

        register_tokenizers(&index);
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            schema,
        })
    }

    /// Create an in-memory search index (for testing).
    pub fn open_in_ram() -> Result<Self> {
        let (schema, _) = build_schema();
        let index = Index::create_in_ram(schema.clone());
        register_tokenizers(&index);
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            schema,
        })
    }

    /// Get the resolved field handles.
    pub fn fields(&self) -> SchemaFields {
        let f = |name: &str| self.schema.get_field(name).unwrap();
        SchemaFields {
            id: f(fields::ID),
            name: f(fields::NAME),
            description: f(fields::DESCRIPTION),
            tags: f(fields::TAGS),
            projects: f(fields::PROJECTS),
            updated_at: f(fields::UPDATED_AT),
        }
    }

    /// Create a writer with the given memory budget (in bytes).
    pub fn writer(&self, memory_budget: usize) -> Result<IndexWriter> {
        Ok(self.index.writer(memory_budget)?)
    }

    /// Rebuild the shadow row for a dataset via the given writer.
    ///
    /// The row is always deleted and reinserted whole, never patched, so no
    /// stale postings survive an update.
    pub fn add_document(
        &self,
        writer: &IndexWriter,
        record: &DatasetRecord,
        updated_at: u64,
    ) -> Result<()> {
        let f = self.fields();

        let term = tantivy::Term::from_field_text(f.id, &record.id);
        writer.delete_term(term);

        writer.add_document(doc!(
            f.id => record.id.as_str(),
            f.name => record.name.as_str(),
            f.description => record.description.as_str(),
            f.tags => record.tags_text(),
            f.projects => record.projects_text(),
            f.updated_at => updated_at,
        ))?;

        Ok(())
    }

    /// Delete the shadow row for a dataset id. Unknown ids are a no-op.
    pub fn delete_document(&self, writer: &IndexWriter, id: &str) {
        let f = self.fields();
        let term = tantivy::Term::from_field_text(f.id, id);
        writer.delete_term(term);
    }

    /// Build a relevance query from the free-text part of a parsed query.
    ///
    /// Word tokens become prefix match units (as-you-type behavior), quoted
    /// phrases become exact phrase units over name and description. Name
    /// matches are boosted 2x. Returns `None` when nothing usable remains
    /// after analysis.
    pub fn build_free_text_query(
        &self,
        parsed: &ParsedQuery,
    ) -> Result<Option<Box<dyn Query>>> {
        let f = self.fields();
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        for term in parsed.free_terms() {
            let words = analyze(&term.value);
            if words.is_empty() {
                continue;
            }

            // A value with embedded whitespace came from a quoted phrase.
            if term.value.contains(char::is_whitespace) && words.len() >= 2 {
                for field in [f.name, f.description] {
                    let terms = words
                        .iter()
                        .map(|w| tantivy::Term::from_field_text(field, w))
                        .collect::<Vec<_>>();
                    clauses
                        .push((Occur::Should, Box::new(PhraseQuery::new(terms))));
                }
                continue;
            }

            for word in &words {
                clauses.push((
                    Occur::Should,
                    Box::new(BoostQuery::new(
                        Box::new(prefix_query(f.name, word)?),
                        2.0,
                    )),
                ));
                for field in [f.description, f.tags, f.projects] {
                    clauses
                        .push((Occur::Should, Box::new(prefix_query(field, word)?)));
                }
            }
        }

        if clauses.is_empty() {
            return Ok(None);
        }
        Ok(Some(Box::new(BooleanQuery::new(clauses))))
    }

    /// Execute a query with BM25 scoring, best first. Snippets are
    /// highlighted around the best match in the description.
    pub fn search(
        &self,
        query: &dyn Query,
        limit: usize,
    ) -> Result<Vec<FtsHit>> {
        // TopDocs rejects a zero limit; an empty page is the right answer.
        if limit == 0 {
            return Ok(Vec::new());
        }
        let f = self.fields();
        self.reader.reload()?;
        let searcher = self.reader.searcher();

        let top_docs = searcher.search(query, &TopDocs::with_limit(limit))?;

        let snippets = SnippetGenerator::create(&searcher, query, f.description)
            .ok()
            .map(|mut generator| {
                generator.set_max_num_chars(SNIPPET_MAX_CHARS);
                generator
            });

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            let description = extract_text(&doc, f.description);
            let snippet = snippets
                .as_ref()
                .map(|g| g.snippet_from_doc(&doc).fragment().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| truncate_snippet(&description));
            results.push(FtsHit {
                score,
                id: extract_text(&doc, f.id),
                name: extract_text(&doc, f.name),
                snippet,
                updated_at: extract_u64(&doc, f.updated_at),
            });
        }

        Ok(results)
    }

    /// Up to `limit` datasets ordered by most recently updated.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<FtsHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let f = self.fields();
        self.reader.reload()?;
        let searcher = self.reader.searcher();

        let collector = TopDocs::with_limit(limit)
            .order_by_fast_field::<u64>(fields::UPDATED_AT, Order::Desc);
        let top_docs = searcher.search(&AllQuery, &collector)?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (updated_at, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            let description = extract_text(&doc, f.description);
            results.push(FtsHit {
                score: 0.0,
                id: extract_text(&doc, f.id),
                name: extract_text(&doc, f.name),
                snippet: truncate_snippet(&description),
                updated_at,
            });
        }

        Ok(results)
    }

    pub fn num_docs(&self) -> Result<u64> {
        self.reader.reload()?;
        Ok(self.reader.searcher().num_docs())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex").finish_non_exhaustive()
    }
}

/// Mirror the index-side analyzer: lowercase and split on non-alphanumeric
/// runs. Querying through terms built here (rather than string
/// concatenation) means user input can never break the query syntax.
fn analyze(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn prefix_query(field: Field, word: &str) -> Result<Box<dyn Query>> {
    // Single chars expand too broadly as prefixes; match them exactly.
    if word.chars().count() < 2 {
        let term = tantivy::Term::from_field_text(field, word);
        return Ok(Box::new(TermQuery::new(term, IndexRecordOption::Basic)));
    }
    // `word` is a pure alphanumeric run, so it needs no regex escaping.
    Ok(Box::new(RegexQuery::from_pattern(
        &format!("{word}.*"),
        field,
    )?))
}

pub(crate) fn truncate_snippet(description: &str) -> String {
    if description.chars().count() <= SNIPPET_MAX_CHARS {
        return description.to_string();
    }
    let cut: String = description.chars().take(SNIPPET_MAX_CHARS).collect();
    format!("{cut}...")
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn extract_u64(doc: &TantivyDocument, field: Field) -> u64 {
    doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse;

    fn record(id: &str, name: &str, description: &str) -> DatasetRecord {
        let mut r = DatasetRecord::new(id, name);
        r.description = description.to_string();
        r
    }

    fn index_with(docs: &[(&str, &str, &str)]) -> SearchIndex {
        let idx = SearchIndex::open_in_ram().unwrap();
        let mut writer = idx.writer(15_000_000).unwrap();
        for (i, (id, name, description)) in docs.iter().enumerate() {
            idx.add_document(&writer, &record(id, name, description), i as u64)
                .unwrap();
        }
        writer.commit().unwrap();
        idx
    }

    fn run(idx: &SearchIndex, query: &str, limit: usize) -> Vec<FtsHit> {
        let parsed = parse(query);
        let q = idx.build_free_text_query(&parsed).unwrap().unwrap();
        idx.search(&*q, limit).unwrap()
    }

    #[test]
    fn add_and_search() {
        let idx = index_with(&[
            ("rain", "Rainfall 2023", "daily rainfall measurements"),
            ("temp", "Temperature", "hourly temperature readings"),
        ]);

        let results = run(&idx, "rainfall", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "rain");
        assert!(results[0].score > 0.0);
    }

    #[test]
    fn prefix_matching() {
        let idx = index_with(&[(
            "rain",
            "Rainfall 2023",
            "daily rainfall measurements",
        )]);

        // Incremental typing: "rainf" should already match "rainfall".
        let results = run(&idx, "rainf", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "rain");
    }

    #[test]
    fn phrase_matching_is_exact() {
        let idx = index_with(&[
            ("a", "Rice Fields", "satellite imagery of rice field borders"),
            ("b", "Fields of Rice", "rice appears, and field appears, apart"),
        ]);

        let results = run(&idx, r#""rice field""#, 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[test]
    fn name_matches_outrank_description_matches() {
        let idx = index_with(&[
            ("in_desc", "Survey Data", "rainfall numbers for the region"),
            ("in_name", "Rainfall Grid", "gridded precipitation estimates"),
        ]);

        let results = run(&idx, "rainfall", 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "in_name");
    }

    #[test]
    fn update_replaces_shadow_row() {
        let idx = SearchIndex::open_in_ram().unwrap();
        let mut writer = idx.writer(15_000_000).unwrap();

        idx.add_document(&writer, &record("x", "Old", "old words here"), 1)
            .unwrap();
        writer.commit().unwrap();

        idx.add_document(&writer, &record("x", "New", "fresh words here"), 2)
            .unwrap();
        writer.commit().unwrap();

        // Tokens from the old row must not linger in the inverted index.
        let parsed = parse("old");
        let q = idx.build_free_text_query(&parsed).unwrap().unwrap();
        assert!(idx.search(&*q, 10).unwrap().is_empty());

        let results = run(&idx, "fresh", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "New");
    }

    #[test]
    fn delete_document_removes_row() {
        let idx = index_with(&[("x", "Doomed", "some description")]);
        let mut writer = idx.writer(15_000_000).unwrap();

        idx.delete_document(&writer, "x");
        writer.commit().unwrap();

        let parsed = parse("doomed");
        let q = idx.build_free_text_query(&parsed).unwrap().unwrap();
        assert!(idx.search(&*q, 10).unwrap().is_empty());
    }

    #[test]
    fn delete_unknown_id_is_noop() {
        let idx = index_with(&[("x", "Kept", "still here")]);
        let mut writer = idx.writer(15_000_000).unwrap();

        idx.delete_document(&writer, "never-indexed");
        writer.commit().unwrap();

        assert_eq!(idx.num_docs().unwrap(), 1);
    }

    #[test]
    fn tags_and_projects_are_searchable() {
        let idx = SearchIndex::open_in_ram().unwrap();
        let mut writer = idx.writer(15_000_000).unwrap();

        let mut r = record("x", "Plain Name", "plain description");
        r.tags = vec!["hydrology".to_string()];
        r.used_in_projects = vec!["FloodWatch".to_string()];
        idx.add_document(&writer, &r, 1).unwrap();
        writer.commit().unwrap();

        assert_eq!(run(&idx, "hydrology", 10).len(), 1);
        assert_eq!(run(&idx, "floodwatch", 10).len(), 1);
    }

    #[test]
    fn no_usable_tokens_yields_no_query() {
        let idx = SearchIndex::open_in_ram().unwrap();
        let parsed = parse("?? !!");
        assert!(idx.build_free_text_query(&parsed).unwrap().is_none());
    }

    #[test]
    fn zero_limit_returns_empty() {
        let idx = index_with(&[(
            "rain",
            "Rainfall 2023",
            "daily rainfall measurements",
        )]);

        assert!(run(&idx, "rainfall", 0).is_empty());
        assert!(idx.list_recent(0).unwrap().is_empty());
    }

    #[test]
    fn list_recent_orders_by_update_time() {
        let idx = SearchIndex::open_in_ram().unwrap();
        let mut writer = idx.writer(15_000_000).unwrap();
        idx.add_document(&writer, &record("old", "Old", ""), 100)
            .unwrap();
        idx.add_document(&writer, &record("new", "New", ""), 300)
            .unwrap();
        idx.add_document(&writer, &record("mid", "Mid", ""), 200)
            .unwrap();
        writer.commit().unwrap();

        let recent = idx.list_recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "new");
        assert_eq!(recent[1].id, "mid");
    }

    #[test]
    fn snippet_comes_from_description() {
        let idx = index_with(&[(
            "x",
            "Gauge Network",
            "long-term rainfall gauge network covering the coastal plain",
        )]);

        let results = run(&idx, "coastal", 10);
        assert_eq!(results.len(), 1);
        assert!(results[0].snippet.contains("coastal"));
    }

    #[test]
    fn disk_persistence() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("tantivy");

        {
            let idx = SearchIndex::open(&dir).unwrap();
            let mut writer = idx.writer(15_000_000).unwrap();
            idx.add_document(
                &writer,
                &record("x", "Persistent", "survives reopen"),
                1,
            )
            .unwrap();
            writer.commit().unwrap();
        }

        {
            let idx = SearchIndex::open(&dir).unwrap();
            let results = run(&idx, "survives", 10);
            assert_eq!(results.len(), 1);
            assert_eq!(results[0].id, "x");
        }
    }
}
