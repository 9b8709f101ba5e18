use std::{collections::BTreeSet, sync::OnceLock};

use chrono::NaiveDate;
use regex::Regex;

use crate::error::{Error, Result};

/// Minimum length (in chars) for a bare free-text token to be kept.
///
/// Shorter tokens carry almost no search signal and bloat the index query.
/// Quoted phrases are exempt.
pub const DEFAULT_MIN_TOKEN_LEN: usize = 2;

/// Field names recognized as structured filters by default.
pub const DEFAULT_FIELDS: &[&str] = &[
    "category",
    "date",
    "date_created",
    "format",
    "id",
    "method",
    "name",
    "project",
    "projects",
    "sc",
    "size",
    "source",
    "sr",
    "tag",
    "tags",
    "tc",
    "temporal_coverage",
    "spatial_coverage",
    "tr",
    "type",
    "year",
];

/// Fields whose values order meaningfully, so all comparison operators apply.
const RANGE_FIELDS: &[&str] = &["date", "date_created", "size", "year"];

const ALL_OPERATORS: &[&str] = &[":", "=", ">", "<", ">=", "<="];
const CONTAINS_ONLY: &[&str] = &[":"];

/// Comparison operator attached to a field filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Gt,
    Lt,
    Gte,
    Lte,
    /// Default operator (`:`): substring match for scalars, exact-element
    /// match for arrays.
    Contains,
}

impl Operator {
    fn from_symbol(symbol: &str) -> Self {
        match symbol {
            "=" => Self::Eq,
            ">" => Self::Gt,
            "<" => Self::Lt,
            ">=" => Self::Gte,
            "<=" => Self::Lte,
            _ => Self::Contains,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::Contains => ":",
        }
    }
}

/// One atomic unit of a parsed query: either a field filter or a free-text
/// word/phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTerm {
    /// Present only for field filters; `None` for free text.
    pub field: Option<String>,
    /// Ignored downstream when `is_free_text` is true.
    pub operator: Operator,
    /// The raw string value, not yet type-coerced.
    pub value: String,
    pub is_free_text: bool,
}

impl QueryTerm {
    fn filter(field: &str, operator: Operator, value: String) -> Self {
        Self {
            field: Some(field.to_string()),
            operator,
            value,
            is_free_text: false,
        }
    }

    fn free_text(value: &str) -> Self {
        Self {
            field: None,
            operator: Operator::Contains,
            value: value.to_string(),
            is_free_text: true,
        }
    }
}

/// The parse result for one input string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    /// Field filters in order of appearance, then free-text phrases, then
    /// free-text word tokens left to right.
    pub terms: Vec<QueryTerm>,
    /// Space-joined free-text values, reconstructed for engines that take a
    /// single query string. Same order as the free-text terms.
    pub free_text_query: String,
}

impl ParsedQuery {
    pub fn has_filters(&self) -> bool {
        self.terms.iter().any(|t| !t.is_free_text)
    }

    pub fn filters(&self) -> impl Iterator<Item = &QueryTerm> {
        self.terms.iter().filter(|t| !t.is_free_text)
    }

    pub fn free_terms(&self) -> impl Iterator<Item = &QueryTerm> {
        self.terms.iter().filter(|t| t.is_free_text)
    }
}

/// The closed set of field names recognized as structured filters.
///
/// Injected once and shared; anything outside the set degrades to free text
/// at parse time, so the vocabulary can grow per deployment without touching
/// the tokenizer.
#[derive(Debug, Clone)]
pub struct FieldVocabulary {
    fields: BTreeSet<String>,
    min_token_len: usize,
}

impl Default for FieldVocabulary {
    fn default() -> Self {
        Self::new(DEFAULT_FIELDS.iter().copied())
    }
}

impl FieldVocabulary {
    pub fn new<'a>(fields: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            fields: fields.into_iter().map(|f| f.to_lowercase()).collect(),
            min_token_len: DEFAULT_MIN_TOKEN_LEN,
        }
    }

    /// Override the minimum free-text token length (default 2).
    pub fn with_min_token_len(mut self, len: usize) -> Self {
        self.min_token_len = len;
        self
    }

    /// Add a field name to the recognized set.
    pub fn with_field(mut self, name: &str) -> Self {
        self.fields.insert(name.to_lowercase());
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains(&name.to_lowercase())
    }

    /// All recognized field names starting with `prefix`, case-insensitive,
    /// sorted. An empty prefix returns the whole vocabulary.
    pub fn complete(&self, prefix: &str) -> Vec<&str> {
        let prefix = prefix.to_lowercase();
        self.fields
            .iter()
            .filter(|f| f.starts_with(&prefix))
            .map(String::as_str)
            .collect()
    }

    /// Operator symbols valid for a field: date/size-like fields support all
    /// six, everything else only `:`.
    pub fn operators_for(&self, field: &str) -> &'static [&'static str] {
        if RANGE_FIELDS.contains(&field.to_lowercase().as_str()) {
            ALL_OPERATORS
        } else {
            CONTAINS_ONLY
        }
    }

    /// Parse a raw query string. Never fails: anything that does not scan as
    /// a recognized field filter degrades to free text.
    pub fn parse(&self, raw: &str) -> ParsedQuery {
        if raw.trim().is_empty() {
            return ParsedQuery::default();
        }

        let mut terms = Vec::new();
        let mut residual = raw.to_string();

        // Single pass over the raw string for `field<op>value` shapes. A
        // match with an unrecognized field name is left in place so it falls
        // through to free-text tokenization.
        for caps in filter_pattern().captures_iter(raw) {
            let field = caps[1].to_lowercase();
            if !self.contains(&field) {
                continue;
            }
            let operator = Operator::from_symbol(&caps[2]);
            let value = unquote(&caps[3]);
            terms.push(QueryTerm::filter(&field, operator, value));
            residual = residual.replacen(&caps[0], " ", 1);
        }

        // Quoted phrases survive as single units, verbatim.
        let mut free_values: Vec<String> = Vec::new();
        let snapshot = residual.clone();
        for caps in phrase_pattern().captures_iter(&snapshot) {
            let phrase = &caps[1];
            if !phrase.trim().is_empty() {
                free_values.push(phrase.to_string());
            }
            residual = residual.replacen(&caps[0], " ", 1);
        }

        for token in residual.split_whitespace() {
            if token.chars().count() >= self.min_token_len {
                free_values.push(token.to_string());
            }
        }

        let free_text_query = free_values.join(" ");
        terms.extend(free_values.iter().map(|v| QueryTerm::free_text(v)));

        ParsedQuery {
            terms,
            free_text_query,
        }
    }
}

/// Parse with the default vocabulary.
pub fn parse(raw: &str) -> ParsedQuery {
    static DEFAULT: OnceLock<FieldVocabulary> = OnceLock::new();
    DEFAULT.get_or_init(FieldVocabulary::default).parse(raw)
}

fn filter_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(\w+)(>=|<=|[:=<>])("[^"]*"|\S*)"#)
            .expect("filter pattern is a valid regex")
    })
}

fn phrase_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""([^"]*)""#).expect("phrase pattern is a valid regex")
    })
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}

/// Validate a date filter value: `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
///
/// Partial dates normalize to the first month/day. Unlike [`parse`], this
/// may fail; it is a secondary validation step invoked explicitly by
/// callers, not during tokenization.
pub fn parse_date_value(value: &str) -> Result<NaiveDate> {
    let invalid = || {
        Error::InvalidValue(format!(
            "'{value}' is not a date (expected YYYY, YYYY-MM or YYYY-MM-DD)"
        ))
    };

    let parts: Vec<&str> = value.trim().split('-').collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(invalid());
    }

    let year: i32 = parts[0].parse().map_err(|_| invalid())?;
    let month: u32 = match parts.get(1) {
        Some(m) => m.parse().map_err(|_| invalid())?,
        None => 1,
    };
    let day: u32 = match parts.get(2) {
        Some(d) => d.parse().map_err(|_| invalid())?,
        None => 1,
    };

    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

/// Validate a size filter value: a decimal number with an optional unit in
/// B/KB/MB/GB/TB (case-insensitive, binary multiples, default B).
///
/// Returns the equivalent byte count. May fail, same contract as
/// [`parse_date_value`].
pub fn parse_size_value(value: &str) -> Result<u64> {
    let invalid = || {
        Error::InvalidValue(format!(
            "'{value}' is not a size (expected a number with optional B/KB/MB/GB/TB unit)"
        ))
    };

    let trimmed = value.trim();
    let unit_start = trimmed
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(unit_start);

    let number: f64 = number.trim().parse().map_err(|_| invalid())?;
    if number < 0.0 || !number.is_finite() {
        return Err(invalid());
    }

    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "KB" => 1 << 10,
        "MB" => 1 << 20,
        "GB" => 1 << 30,
        "TB" => 1 << 40,
        _ => return Err(invalid()),
    };

    Ok((number * multiplier as f64).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_free_text_consistent(parsed: &ParsedQuery) {
        let values: Vec<&str> =
            parsed.free_terms().map(|t| t.value.as_str()).collect();
        // Phrase values contain spaces, so compare by reassembling rather
        // than re-splitting.
        assert_eq!(parsed.free_text_query, values.join(" "));
    }

    #[test]
    fn empty_input() {
        for input in ["", "   ", "\t\n"] {
            let parsed = parse(input);
            assert!(parsed.terms.is_empty());
            assert_eq!(parsed.free_text_query, "");
        }
    }

    #[test]
    fn single_contains_filter() {
        let parsed = parse("project:ML-Research");
        assert_eq!(parsed.terms.len(), 1);
        let term = &parsed.terms[0];
        assert_eq!(term.field.as_deref(), Some("project"));
        assert_eq!(term.operator, Operator::Contains);
        assert_eq!(term.value, "ML-Research");
        assert!(!term.is_free_text);
        assert_eq!(parsed.free_text_query, "");
    }

    #[test]
    fn equality_filter() {
        let parsed = parse("format=CSV");
        assert_eq!(parsed.terms.len(), 1);
        assert_eq!(parsed.terms[0].operator, Operator::Eq);
        assert_eq!(parsed.terms[0].value, "CSV");
    }

    #[test]
    fn greater_than_filter() {
        let parsed = parse("size>100MB");
        assert_eq!(parsed.terms.len(), 1);
        assert_eq!(parsed.terms[0].field.as_deref(), Some("size"));
        assert_eq!(parsed.terms[0].operator, Operator::Gt);
        assert_eq!(parsed.terms[0].value, "100MB");
    }

    #[test]
    fn range_as_two_filters_on_same_field() {
        let parsed = parse("year>=2020 year<=2023");
        assert_eq!(parsed.terms.len(), 2);
        assert_eq!(parsed.terms[0].field.as_deref(), Some("year"));
        assert_eq!(parsed.terms[0].operator, Operator::Gte);
        assert_eq!(parsed.terms[0].value, "2020");
        assert_eq!(parsed.terms[1].field.as_deref(), Some("year"));
        assert_eq!(parsed.terms[1].operator, Operator::Lte);
        assert_eq!(parsed.terms[1].value, "2023");
        assert_eq!(parsed.free_terms().count(), 0);
    }

    #[test]
    fn plain_free_text() {
        let parsed = parse("neural network");
        assert_eq!(parsed.terms.len(), 2);
        assert!(parsed.terms.iter().all(|t| t.is_free_text));
        assert_eq!(parsed.terms[0].value, "neural");
        assert_eq!(parsed.terms[1].value, "network");
        assert_eq!(parsed.free_text_query, "neural network");
    }

    #[test]
    fn short_tokens_dropped_but_phrases_kept() {
        let parsed = parse(r#"a b "rice field""#);
        // "a" and "b" fall below the 2-char minimum and must not survive as
        // separate terms; the quoted phrase stays intact.
        assert_eq!(parsed.terms.len(), 1);
        assert!(parsed.terms[0].is_free_text);
        assert_eq!(parsed.terms[0].value, "rice field");
        assert_eq!(parsed.free_text_query, "rice field");
    }

    #[test]
    fn mixed_filters_and_free_text() {
        let parsed =
            parse("project:DeepLearning type=model size>50MB neural network");
        assert_eq!(parsed.terms.len(), 5);

        let filters: Vec<&QueryTerm> = parsed.filters().collect();
        assert_eq!(filters.len(), 3);
        assert_eq!(filters[0].field.as_deref(), Some("project"));
        assert_eq!(filters[0].operator, Operator::Contains);
        assert_eq!(filters[1].field.as_deref(), Some("type"));
        assert_eq!(filters[1].operator, Operator::Eq);
        assert_eq!(filters[2].field.as_deref(), Some("size"));
        assert_eq!(filters[2].operator, Operator::Gt);

        // Field filters come first, free text after.
        assert!(parsed.terms[..3].iter().all(|t| !t.is_free_text));
        assert_eq!(parsed.terms[3].value, "neural");
        assert_eq!(parsed.terms[4].value, "network");
        assert_eq!(parsed.free_text_query, "neural network");
    }

    #[test]
    fn unrecognized_field_degrades_to_free_text() {
        let parsed = parse("bogus:value rainfall");
        assert!(!parsed.has_filters());
        let values: Vec<&str> =
            parsed.free_terms().map(|t| t.value.as_str()).collect();
        assert_eq!(values, vec!["bogus:value", "rainfall"]);
    }

    #[test]
    fn quoted_filter_value_keeps_whitespace() {
        let parsed = parse(r#"project:"Climate Modeling" rainfall"#);
        let filters: Vec<&QueryTerm> = parsed.filters().collect();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].value, "Climate Modeling");
        assert_eq!(parsed.free_text_query, "rainfall");
    }

    #[test]
    fn empty_filter_value_is_valid() {
        let parsed = parse("source:");
        assert_eq!(parsed.terms.len(), 1);
        assert_eq!(parsed.terms[0].field.as_deref(), Some("source"));
        assert_eq!(parsed.terms[0].value, "");
    }

    #[test]
    fn field_name_is_lowercased() {
        let parsed = parse("Format=CSV");
        assert_eq!(parsed.terms[0].field.as_deref(), Some("format"));
    }

    #[test]
    fn free_text_query_matches_terms() {
        for input in [
            "neural network",
            r#"a b "rice field""#,
            "project:X temperature readings",
            r#""exact phrase" loose words"#,
            "year>=2020",
            "",
        ] {
            assert_free_text_consistent(&parse(input));
        }
    }

    #[test]
    fn parse_never_panics_on_junk() {
        for input in [
            ">>>", "::::", r#"""""#, "a:", "=x", "<", "\"unterminated",
            "field:\"open", "🦀🦀 size>", "size>=",
        ] {
            let _ = parse(input);
        }
    }

    #[test]
    fn min_token_len_is_configurable() {
        let vocab = FieldVocabulary::default().with_min_token_len(1);
        let parsed = vocab.parse("a b");
        assert_eq!(parsed.terms.len(), 2);
        assert_eq!(parsed.free_text_query, "a b");
    }

    #[test]
    fn custom_field_extends_vocabulary() {
        let vocab = FieldVocabulary::default().with_field("license");
        let parsed = vocab.parse("license:MIT");
        assert!(parsed.has_filters());
    }

    #[test]
    fn complete_by_prefix() {
        let vocab = FieldVocabulary::default();
        assert_eq!(vocab.complete("ta"), vec!["tag", "tags"]);
        assert_eq!(vocab.complete("TA"), vec!["tag", "tags"]);
        assert!(vocab.complete("zz").is_empty());
        assert_eq!(vocab.complete("").len(), DEFAULT_FIELDS.len());
    }

    #[test]
    fn operators_depend_on_field() {
        let vocab = FieldVocabulary::default();
        assert_eq!(vocab.operators_for("size").len(), 6);
        assert_eq!(vocab.operators_for("year").len(), 6);
        assert_eq!(vocab.operators_for("tag"), [":"]);
        assert_eq!(vocab.operators_for("project"), [":"]);
    }

    #[test]
    fn date_values() {
        assert_eq!(
            parse_date_value("2023").unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
        );
        assert_eq!(
            parse_date_value("2023-06").unwrap(),
            NaiveDate::from_ymd_opt(2023, 6, 1).unwrap()
        );
        assert_eq!(
            parse_date_value("2023-06-15").unwrap(),
            NaiveDate::from_ymd_opt(2023, 6, 15).unwrap()
        );
        assert!(parse_date_value("not-a-date").is_err());
        assert!(parse_date_value("2023-13").is_err());
        assert!(parse_date_value("2023-02-30").is_err());
        assert!(parse_date_value("").is_err());
    }

    #[test]
    fn size_values() {
        assert_eq!(parse_size_value("100").unwrap(), 100);
        assert_eq!(parse_size_value("100B").unwrap(), 100);
        assert_eq!(parse_size_value("1KB").unwrap(), 1024);
        assert_eq!(parse_size_value("100MB").unwrap(), 100 * 1024 * 1024);
        assert_eq!(parse_size_value("2gb").unwrap(), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_size_value("1.5KB").unwrap(), 1536);
        assert_eq!(parse_size_value("1TB").unwrap(), 1 << 40);
        assert!(parse_size_value("abc").is_err());
        assert!(parse_size_value("10XB").is_err());
        assert!(parse_size_value("-5MB").is_err());
        assert!(parse_size_value("").is_err());
    }
}
