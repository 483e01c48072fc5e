//! Search, ordering, filtering and pagination for list endpoints.
//!
//! Every list endpoint reads its parameters from the query string into a
//! [`ListParams`] and turns them into a typed props struct. The db layer then
//! composes the SQL with a [`QueryBuilder`] so that the count query and the
//! page query share exactly the same `WHERE` clause.

use std::collections::HashMap;

use serde::{
    de::{value::StrDeserializer, IntoDeserializer},
    Deserialize,
};
use sqlx::{QueryBuilder, Sqlite};

use crate::error::{Error, Result};

/// Raw query string parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ListParams(HashMap<String, String>);

impl ListParams {
    pub fn new<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Blank values count as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn search(&self) -> Option<String> {
        self.get("search").map(str::to_string)
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>> {
        self.get(key).map(|raw| parse_bool(key, raw)).transpose()
    }

    pub fn id(&self, key: &str) -> Result<Option<i64>> {
        self.get(key)
            .map(|raw| {
                raw.parse()
                    .map_err(|_| Error::Invalid(format!("{key}: Enter a whole number.")))
            })
            .transpose()
    }

    pub fn choice<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<Option<T>> {
        self.get(key).map(|raw| parse_choice(key, raw)).transpose()
    }

    pub fn ordering(&self, allowed: &[(&str, &'static str)]) -> Vec<SortKey> {
        self.get("ordering")
            .map(|raw| parse_ordering(raw, allowed))
            .unwrap_or_default()
    }

    pub fn page(&self, size: u32) -> Result<Page> {
        Page::parse(self.get("page"), size)
    }
}

pub fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(Error::Invalid(format!(
            "{key}: Select a valid choice. {raw} is not one of the available choices."
        ))),
    }
}

pub fn parse_choice<T: for<'de> Deserialize<'de>>(key: &str, raw: &str) -> Result<T> {
    let de: StrDeserializer<'_, serde::de::value::Error> = raw.into_deserializer();
    T::deserialize(de).map_err(|_| {
        Error::Invalid(format!(
            "{key}: Select a valid choice. {raw} is not one of the available choices."
        ))
    })
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub column: &'static str,
    pub descending: bool,
}

impl SortKey {
    pub const fn asc(column: &'static str) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    pub const fn desc(column: &'static str) -> Self {
        Self {
            column,
            descending: true,
        }
    }
}

/// `allowed` maps public field names to SQL column expressions. Unknown
/// names are dropped.
pub fn parse_ordering(raw: &str, allowed: &[(&str, &'static str)]) -> Vec<SortKey> {
    raw.split(',')
        .map(str::trim)
        .filter_map(|term| {
            let (descending, name) = match term.strip_prefix('-') {
                Some(name) => (true, name),
                None => (false, term),
            };
            allowed
                .iter()
                .find(|(field, _)| *field == name)
                .map(|&(_, column)| SortKey { column, descending })
        })
        .collect()
}

/// Appends `ORDER BY`, falling back to `default` when `keys` is empty.
/// `tiebreak` keeps pages stable when the sort keys collide.
pub fn push_order_by(
    qb: &mut QueryBuilder<'_, Sqlite>,
    keys: &[SortKey],
    default: &[SortKey],
    tiebreak: &'static str,
) {
    let keys = if keys.is_empty() { default } else { keys };
    qb.push(" ORDER BY ");
    for key in keys {
        qb.push(key.column);
        qb.push(if key.descending { " DESC, " } else { " ASC, " });
    }
    qb.push(tiebreak);
}

/// A `LIKE` pattern matching `term` anywhere, for use with `ESCAPE '\'`.
pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Appends ` AND (...)` requiring every whitespace separated term of `search`
/// to occur in at least one of `columns`. Matching is case-insensitive.
pub fn push_search(qb: &mut QueryBuilder<'_, Sqlite>, columns: &[&str], search: &str) {
    for term in search.split_whitespace() {
        let pattern = like_pattern(term);
        qb.push(" AND (");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push(*column);
            qb.push(" LIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" ESCAPE '\\'");
        }
        qb.push(")");
    }
}

/// A 1-based page number and the page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub fn first(size: u32) -> Self {
        Self { number: 1, size }
    }

    pub fn parse(raw: Option<&str>, size: u32) -> Result<Self> {
        let number = match raw {
            None => 1,
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| Error::not_found("Invalid page."))?,
        };
        Ok(Self { number, size })
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.number - 1) * i64::from(self.size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }

    /// The first page always exists, even for an empty result.
    pub fn ensure_within(&self, count: i64) -> Result<()> {
        if self.number > 1 && self.offset() >= count {
            return Err(Error::not_found("Invalid page."));
        }
        Ok(())
    }

    pub fn has_next(&self, count: i64) -> bool {
        self.offset() + self.limit() < count
    }

    pub fn push_limit(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" LIMIT ");
        qb.push_bind(self.limit());
        qb.push(" OFFSET ");
        qb.push_bind(self.offset());
    }
}

/// One page of a list result together with the size of the full set.
#[derive(Debug, Clone)]
pub struct Paged<T> {
    pub count: i64,
    pub page: Page,
    pub items: Vec<T>,
}

impl<T> Paged<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paged<U> {
        Paged {
            count: self.count,
            page: self.page,
            items: self.items.into_iter().map(f).collect(),
        }
    }
}
