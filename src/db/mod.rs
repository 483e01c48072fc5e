use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
    FromRow, QueryBuilder, Sqlite,
};

use crate::{
    error::{Error, Result},
    query::{push_order_by, Page, Paged, SortKey},
};

pub mod branch;
pub mod category;
pub mod customization;
pub mod ingredient;
pub mod menu_item;
pub mod restaurant;
pub mod review;
pub mod session;
pub mod user;

/// Opens the database, creating the file when missing, and applies pending
/// migrations.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// A private, migrated in-memory database. Every pool gets its own.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    // an in-memory database lives and dies with its only connection
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in partial updates.
pub(crate) fn nullable<'de, D, T>(de: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

pub(crate) fn ensure_affected(rows: u64) -> Result<()> {
    if rows == 0 {
        return Err(Error::not_found("Not found."));
    }
    Ok(())
}

/// The SQL shape of one list endpoint. `select` and `count` both end in an
/// open `WHERE` clause that the filter callback extends with `AND ...`.
pub(crate) struct Listing<'a> {
    pub select: &'a str,
    pub count: &'a str,
    pub ordering: &'a [SortKey],
    pub default_order: &'a [SortKey],
    pub tiebreak: &'static str,
}

impl Listing<'_> {
    pub async fn page<'args, T, F>(&self, db_conn: &SqlitePool, page: Page, filters: F) -> Result<Paged<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
        F: Fn(&mut QueryBuilder<'args, Sqlite>),
    {
        let mut count_qb = QueryBuilder::new(self.count);
        filters(&mut count_qb);
        let count: i64 = count_qb.build_query_scalar().fetch_one(db_conn).await?;
        page.ensure_within(count)?;

        let mut qb = QueryBuilder::new(self.select);
        filters(&mut qb);
        push_order_by(&mut qb, self.ordering, self.default_order, self.tiebreak);
        page.push_limit(&mut qb);
        let items = qb.build_query_as::<T>().fetch_all(db_conn).await?;

        Ok(Paged { count, page, items })
    }

    pub async fn all<'args, T, F>(&self, db_conn: &SqlitePool, filters: F) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
        F: Fn(&mut QueryBuilder<'args, Sqlite>),
    {
        self.first(db_conn, None, filters).await
    }

    /// Like `all`, but stops after `limit` rows when one is given.
    pub async fn first<'args, T, F>(
        &self,
        db_conn: &SqlitePool,
        limit: Option<i64>,
        filters: F,
    ) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
        F: Fn(&mut QueryBuilder<'args, Sqlite>),
    {
        let mut qb = QueryBuilder::new(self.select);
        filters(&mut qb);
        push_order_by(&mut qb, self.ordering, self.default_order, self.tiebreak);
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        Ok(qb.build_query_as::<T>().fetch_all(db_conn).await?)
    }
}
