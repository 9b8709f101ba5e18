//! datashelf - a personal dataset catalog with structured and full-text search.
//!
//! datashelf keeps one metadata record per dataset in a local
//! [redb](https://github.com/cberner/redb) store and mirrors the searchable
//! fields into a [Tantivy](https://github.com/quickwit-oss/tantivy) index.
//! Queries mix free text (BM25-ranked, prefix-expanded) with structured
//! field filters like `format:csv`, `project:FloodWatch` or `size>100MB`.
//!
//! # Quick start
//!
//! ```no_run
//! use datashelf::{Catalog, DataDir, DatasetRecord, FieldVocabulary, search};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let catalog = Catalog::open(
//!     &data_dir.catalog_db(),
//!     &data_dir.tantivy_dir().unwrap(),
//! )
//! .unwrap();
//!
//! let mut record = DatasetRecord::new("rainfall-2023", "Rainfall 2023");
//! record.description = "Daily rainfall gauge measurements".to_string();
//! record.file_format = Some("csv".to_string());
//! catalog.upsert(&record).unwrap();
//!
//! let vocab = FieldVocabulary::default();
//! for hit in search::search("format:csv rainfall", 10, &vocab, &catalog) {
//!     println!("{}. {} (score: {:.3})", hit.rank, hit.name, hit.score);
//! }
//! ```

pub mod catalog;
pub mod catalog_db;
pub mod cli;
pub mod data_dir;
pub mod dataset;
pub mod error;
pub mod query;
pub mod search;
pub mod search_index;

pub use catalog::{BulkOutcome, Catalog};
pub use catalog_db::CatalogDb;
pub use data_dir::DataDir;
pub use dataset::DatasetRecord;
pub use error::{Error, Result};
pub use query::{FieldVocabulary, Operator, ParsedQuery, QueryTerm, parse};
pub use search::SearchHit;
pub use search_index::SearchIndex;
