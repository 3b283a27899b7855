//! Search query builder
//!
//! Accumulates ordered AND/OR clauses (optionally grouped through nested
//! builders) and renders them as a single Solr-style query string.

use thiserror::Error;

/// Query rendered when no clause has been added
pub const MATCH_ALL: &str = "*:*";

/// Output format requested from the search endpoint
pub const DEFAULT_FORMAT: &str = "json";

/// Sort applied to every search request
pub const DEFAULT_SORT: &str = "_yz_id desc";

pub const DEFAULT_OFFSET: usize = 0;
pub const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("search value for field '{field}' cannot be empty")]
    EmptyValue { field: String },

    #[error("range query on field '{field}' should have exactly 2 bounds, got {len}")]
    RangeArity { field: String, len: usize },
}

/// Connector joining a clause to the one before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    fn keyword(self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

/// Raw value handed to a `where` call, validated into a [`Term`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchValue {
    Scalar(String),
    Sequence(Vec<String>),
}

impl From<&str> for SearchValue {
    fn from(value: &str) -> Self {
        SearchValue::Scalar(value.to_string())
    }
}

impl From<String> for SearchValue {
    fn from(value: String) -> Self {
        SearchValue::Scalar(value)
    }
}

impl From<&String> for SearchValue {
    fn from(value: &String) -> Self {
        SearchValue::Scalar(value.clone())
    }
}

impl<T: Into<String>> From<Vec<T>> for SearchValue {
    fn from(values: Vec<T>) -> Self {
        SearchValue::Sequence(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<String>, const N: usize> From<[T; N]> for SearchValue {
    fn from(values: [T; N]) -> Self {
        SearchValue::Sequence(values.into_iter().map(Into::into).collect())
    }
}

impl<A: Into<String>, B: Into<String>> From<(A, B)> for SearchValue {
    fn from((low, high): (A, B)) -> Self {
        SearchValue::Sequence(vec![low.into(), high.into()])
    }
}

/// Validated leaf value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// Rendered verbatim, wildcards included
    Exact(String),
    /// Inclusive range, rendered `[low TO high]`
    Range(String, String),
}

impl Term {
    fn parse(field: &str, value: SearchValue) -> Result<Self, QueryError> {
        match value {
            SearchValue::Scalar(s) if s.is_empty() => Err(QueryError::EmptyValue {
                field: field.to_string(),
            }),
            SearchValue::Scalar(s) => Ok(Term::Exact(s)),
            SearchValue::Sequence(v) if v.is_empty() => Err(QueryError::EmptyValue {
                field: field.to_string(),
            }),
            SearchValue::Sequence(v) => match <[String; 2]>::try_from(v) {
                Ok([low, high]) => Ok(Term::Range(low, high)),
                Err(v) => Err(QueryError::RangeArity {
                    field: field.to_string(),
                    len: v.len(),
                }),
            },
        }
    }

    fn render(&self) -> String {
        match self {
            Term::Exact(value) => value.clone(),
            Term::Range(low, high) => format!("[{} TO {}]", low, high),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Leaf { field: String, term: Term },
    Group(Query),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
    connector: Connector,
    expr: Expr,
}

/// Search request against one bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    bucket: String,
    clauses: Vec<Clause>,
    offset: usize,
    limit: usize,
}

impl Query {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            clauses: Vec::new(),
            offset: DEFAULT_OFFSET,
            limit: DEFAULT_LIMIT,
        }
    }

    /// Add `field:value` joined with AND.
    ///
    /// Scalars support wildcards (`foo*`, `foo*bar`); a two element sequence
    /// becomes an inclusive range. On error nothing is appended.
    pub fn and_where(
        &mut self,
        field: impl Into<String>,
        value: impl Into<SearchValue>,
    ) -> Result<&mut Self, QueryError> {
        self.push_leaf(Connector::And, field.into(), value.into())
    }

    /// Add `field:value` joined with OR.
    pub fn or_where(
        &mut self,
        field: impl Into<String>,
        value: impl Into<SearchValue>,
    ) -> Result<&mut Self, QueryError> {
        self.push_leaf(Connector::Or, field.into(), value.into())
    }

    /// Add a parenthesized group joined with AND.
    ///
    /// `build` receives a fresh builder scoped to the same bucket.
    pub fn and_group<F>(&mut self, build: F) -> Result<&mut Self, QueryError>
    where
        F: FnOnce(&mut Query) -> Result<&mut Query, QueryError>,
    {
        self.push_group(Connector::And, build)
    }

    /// Add a parenthesized group joined with OR.
    pub fn or_group<F>(&mut self, build: F) -> Result<&mut Self, QueryError>
    where
        F: FnOnce(&mut Query) -> Result<&mut Query, QueryError>,
    {
        self.push_group(Connector::Or, build)
    }

    pub fn offset(&mut self, offset: usize) -> &mut Self {
        self.offset = offset;
        self
    }

    /// Rows per page. Zero falls back to [`DEFAULT_LIMIT`].
    pub fn limit(&mut self, limit: usize) -> &mut Self {
        self.limit = if limit == 0 { DEFAULT_LIMIT } else { limit };
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn offset_value(&self) -> usize {
        self.offset
    }

    pub fn limit_value(&self) -> usize {
        self.limit
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    fn push_leaf(
        &mut self,
        connector: Connector,
        field: String,
        value: SearchValue,
    ) -> Result<&mut Self, QueryError> {
        let term = Term::parse(&field, value)?;
        self.clauses.push(Clause {
            connector,
            expr: Expr::Leaf { field, term },
        });
        Ok(self)
    }

    fn push_group<F>(&mut self, connector: Connector, build: F) -> Result<&mut Self, QueryError>
    where
        F: FnOnce(&mut Query) -> Result<&mut Query, QueryError>,
    {
        let mut group = Query::new(self.bucket.clone());
        build(&mut group)?;
        self.clauses.push(Clause {
            connector,
            expr: Expr::Group(group),
        });
        Ok(self)
    }

    /// Render the accumulated clauses.
    ///
    /// The first clause never carries its connector keyword; an empty
    /// builder renders [`MATCH_ALL`]. Values are not escaped here, see
    /// [`escape_value`].
    pub fn build_query(&self) -> String {
        if self.clauses.is_empty() {
            return MATCH_ALL.to_string();
        }

        let mut query = String::new();
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                query.push_str(clause.connector.keyword());
                query.push(' ');
            }

            match &clause.expr {
                Expr::Group(group) => {
                    query.push('(');
                    query.push_str(&group.build_query());
                    query.push(')');
                }
                Expr::Leaf { field, term } => {
                    query.push_str(field);
                    query.push(':');
                    query.push_str(&term.render());
                }
            }

            query.push(' ');
        }

        query.trim_end().to_string()
    }

    /// Ordered query-string pairs for the search endpoint
    pub fn search_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("wt", DEFAULT_FORMAT.to_string()),
            ("q", self.build_query()),
            ("start", self.offset.to_string()),
            ("rows", self.limit.to_string()),
            ("sort", DEFAULT_SORT.to_string()),
        ]
    }
}

/// Backslash-escape characters reserved by the search syntax, including space.
///
/// Works in one pass over the input, so backslashes it inserts are never
/// escaped again.
pub fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() * 2);
    for c in value.chars() {
        if is_reserved(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn is_reserved(c: char) -> bool {
    matches!(
        c,
        '\\' | '+'
            | '-'
            | '&'
            | '|'
            | '!'
            | '('
            | ')'
            | '{'
            | '}'
            | '['
            | ']'
            | '^'
            | '~'
            | '*'
            | '?'
            | ':'
            | '"'
            | ';'
            | ' '
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_query_matches_all() {
        let query = Query::new("articles");
        assert_eq!(query.build_query(), "*:*");
        assert!(query.is_empty());
    }

    #[test]
    fn test_where_or_where_with_range() {
        let mut query = Query::new("articles");
        query
            .and_where("title", "hello*")
            .unwrap()
            .or_where("tag", ["a", "b"])
            .unwrap();

        assert_eq!(query.build_query(), "title:hello* OR tag:[a TO b]");
    }

    #[test]
    fn test_first_clause_drops_connector() {
        let mut query = Query::new("articles");
        query.or_where("title", "x").unwrap();
        assert_eq!(query.build_query(), "title:x");

        query.and_where("body", "y").unwrap();
        let rendered = query.build_query();
        assert!(!rendered.starts_with("OR "));
        assert!(!rendered.starts_with("AND "));
        assert_eq!(rendered, "title:x AND body:y");
    }

    #[test]
    fn test_group_matches_manual_subquery() {
        let mut query = Query::new("articles");
        query
            .and_where("status", "published")
            .unwrap()
            .and_group(|g| g.and_where("title", "rust*")?.or_where("year", ("2020", "2024")))
            .unwrap();

        let mut manual = Query::new("articles");
        manual
            .and_where("title", "rust*")
            .unwrap()
            .or_where("year", ("2020", "2024"))
            .unwrap();

        assert_eq!(
            query.build_query(),
            format!("status:published AND ({})", manual.build_query())
        );
        assert_eq!(
            query.build_query(),
            "status:published AND (title:rust* OR year:[2020 TO 2024])"
        );
    }

    #[test]
    fn test_leading_group_and_nesting() {
        let mut query = Query::new("articles");
        query
            .or_group(|g| {
                g.and_where("a", "1")?
                    .or_group(|inner| inner.and_where("b", "2")?.and_where("c", "3"))
            })
            .unwrap()
            .or_where("d", "4")
            .unwrap();

        assert_eq!(query.build_query(), "(a:1 OR (b:2 AND c:3)) OR d:4");
    }

    #[test]
    fn test_empty_group_renders_match_all() {
        let mut query = Query::new("articles");
        query.and_group(|g| Ok(g)).unwrap();
        assert_eq!(query.build_query(), "(*:*)");
    }

    #[test]
    fn test_group_error_appends_nothing() {
        let mut query = Query::new("articles");
        let err = query
            .and_group(|g| g.and_where("title", "ok")?.and_where("body", ""))
            .unwrap_err();

        assert!(matches!(err, QueryError::EmptyValue { .. }));
        assert!(query.is_empty());
    }

    #[test]
    fn test_empty_value_rejected() {
        let mut query = Query::new("articles");

        let err = query.and_where("title", "").unwrap_err();
        assert_eq!(
            err,
            QueryError::EmptyValue {
                field: "title".to_string()
            }
        );

        let err = query.or_where("tag", Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, QueryError::EmptyValue { .. }));

        assert!(query.is_empty());
        assert_eq!(query.build_query(), "*:*");
    }

    #[test]
    fn test_zero_is_not_empty() {
        let mut query = Query::new("articles");
        query.and_where("count", "0").unwrap();
        assert_eq!(query.build_query(), "count:0");
    }

    #[test]
    fn test_range_arity_rejected() {
        let mut query = Query::new("articles");

        let err = query.and_where("year", ["2020"]).unwrap_err();
        assert_eq!(
            err,
            QueryError::RangeArity {
                field: "year".to_string(),
                len: 1
            }
        );

        let err = query.and_where("year", vec!["1", "2", "3"]).unwrap_err();
        assert!(matches!(err, QueryError::RangeArity { len: 3, .. }));
        assert!(query.is_empty());
    }

    #[test]
    fn test_build_query_is_idempotent() {
        let mut query = Query::new("articles");
        query.and_where("a", "1").unwrap().or_where("b", "2").unwrap();
        let first = query.build_query();
        assert_eq!(first, query.build_query());
    }

    #[test]
    fn test_values_rendered_verbatim() {
        let mut query = Query::new("articles");
        query.and_where("title", "a b:c").unwrap();
        assert_eq!(query.build_query(), "title:a b:c");
    }

    #[test]
    fn test_search_params() {
        let mut query = Query::new("articles");
        query.and_where("title", "x").unwrap();
        query.offset(20).limit(5);

        let params = query.search_params();
        assert_eq!(
            params,
            vec![
                ("wt", "json".to_string()),
                ("q", "title:x".to_string()),
                ("start", "20".to_string()),
                ("rows", "5".to_string()),
                ("sort", "_yz_id desc".to_string()),
            ]
        );
        assert_eq!(query.bucket(), "articles");
    }

    #[test]
    fn test_defaults() {
        let query = Query::new("articles");
        assert_eq!(query.offset_value(), 0);
        assert_eq!(query.limit_value(), 10);
    }

    #[test]
    fn test_zero_limit_uses_default() {
        let mut query = Query::new("articles");
        query.limit(0);
        assert_eq!(query.limit_value(), DEFAULT_LIMIT);
        assert!(query.search_params().contains(&("rows", "10".to_string())));

        query.limit(1);
        assert_eq!(query.limit_value(), 1);
    }

    #[test]
    fn test_escape_value_reserved_chars() {
        let reserved = "\\+-&|!(){}[]^~*?:\";";
        let escaped = escape_value(reserved);

        let expected: String = reserved.chars().flat_map(|c| ['\\', c]).collect();
        assert_eq!(escaped, expected);
        assert_eq!(escape_value("a b"), "a\\ b");
    }

    #[test]
    fn test_escape_value_no_double_escaping() {
        assert_eq!(escape_value("\\+"), "\\\\\\+");
        assert_eq!(escape_value("C:\\dir"), "C\\:\\\\dir");
        assert_eq!(escape_value("plain"), "plain");
    }
}
