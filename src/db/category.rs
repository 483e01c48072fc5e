use derive_builder::Builder;
use serde::Deserialize;
use sqlx::sqlite::SqlitePool;

use super::{ensure_affected, now, nullable, Listing};
use crate::{
    data::Category,
    error::{Error, Result},
    query::{push_search, ListParams, Page, Paged, SortKey},
    validate,
};

const SELECT: &str = r#"
SELECT
    c.id, c.name, c.description, c.image, c.display_order, c.is_active,
    (SELECT COUNT(*) FROM menu_item m WHERE m.category_id = c.id AND m.is_available = 1) AS item_count,
    c.created_at, c.updated_at
FROM category c
WHERE 1 = 1"#;

const COUNT: &str = "SELECT COUNT(*) FROM category c WHERE 1 = 1";

pub const ORDERING_FIELDS: &[(&str, &str)] = &[
    ("order", "c.display_order"),
    ("name", "c.name"),
    ("created_at", "c.created_at"),
];

const DEFAULT_ORDER: &[SortKey] = &[SortKey::asc("c.display_order"), SortKey::asc("c.name")];

fn yes() -> bool {
    true
}

/// Body of a create or full update.
#[derive(Debug, Clone, Deserialize, Builder)]
pub struct CategoryProps {
    #[builder(setter(into))]
    pub name: String,
    #[serde(default)]
    #[builder(setter(into), default)]
    pub description: String,
    #[serde(default)]
    #[builder(setter(into, strip_option), default)]
    pub image: Option<String>,
    #[serde(default, rename = "order")]
    #[builder(default)]
    pub display_order: i64,
    #[serde(default = "yes")]
    #[builder(default = "true")]
    pub is_active: bool,
}

impl CategoryProps {
    fn validate(&self) -> Result<()> {
        validate::required("name", &self.name)?;
        validate::max_len("name", &self.name, 100)
    }
}

impl From<Category> for CategoryProps {
    fn from(c: Category) -> Self {
        Self {
            name: c.name,
            description: c.description,
            image: c.image,
            display_order: c.display_order,
            is_active: c.is_active,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub image: Option<Option<String>>,
    #[serde(rename = "order")]
    pub display_order: Option<i64>,
    pub is_active: Option<bool>,
}

impl CategoryPatch {
    pub fn apply(self, props: &mut CategoryProps) {
        if let Some(name) = self.name {
            props.name = name;
        }
        if let Some(description) = self.description {
            props.description = description;
        }
        if let Some(image) = self.image {
            props.image = image;
        }
        if let Some(order) = self.display_order {
            props.display_order = order;
        }
        if let Some(active) = self.is_active {
            props.is_active = active;
        }
    }
}

#[derive(Debug, Clone, Default, Builder)]
#[builder(default)]
pub struct ListCategoryProps {
    #[builder(setter(into, strip_option))]
    pub search: Option<String>,
    pub ordering: Vec<SortKey>,
    pub include_inactive: bool,
}

impl ListCategoryProps {
    pub fn from_params(params: &ListParams, include_inactive: bool) -> Self {
        Self {
            search: params.search(),
            ordering: params.ordering(ORDERING_FIELDS),
            include_inactive,
        }
    }
}

pub async fn add_category(db_conn: &SqlitePool, props: &CategoryProps) -> Result<i64> {
    props.validate()?;
    let ts = now();
    let id = sqlx::query(
        r#"
INSERT INTO category
    (name, description, image, display_order, is_active, created_at, updated_at)
VALUES
    (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&props.name)
    .bind(&props.description)
    .bind(&props.image)
    .bind(props.display_order)
    .bind(props.is_active)
    .bind(ts)
    .bind(ts)
    .execute(db_conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

/// Inactive categories are only visible with `include_inactive`.
pub async fn get_category(
    db_conn: &SqlitePool,
    id: i64,
    include_inactive: bool,
) -> Result<Category> {
    let sql = format!("{SELECT} AND c.id = ? AND (c.is_active = 1 OR ?)");
    sqlx::query_as::<_, Category>(&sql)
        .bind(id)
        .bind(include_inactive)
        .fetch_optional(db_conn)
        .await?
        .ok_or_else(|| Error::not_found("Not found."))
}

pub async fn list_categories(
    db_conn: &SqlitePool,
    props: &ListCategoryProps,
    page: Page,
) -> Result<Paged<Category>> {
    let listing = Listing {
        select: SELECT,
        count: COUNT,
        ordering: &props.ordering,
        default_order: DEFAULT_ORDER,
        tiebreak: "c.id",
    };
    listing
        .page(db_conn, page, |qb| {
            if !props.include_inactive {
                qb.push(" AND c.is_active = 1");
            }
            if let Some(search) = &props.search {
                push_search(qb, &["c.name", "c.description"], search);
            }
        })
        .await
}

pub async fn update_category(db_conn: &SqlitePool, id: i64, props: &CategoryProps) -> Result<()> {
    props.validate()?;
    let rows = sqlx::query(
        r#"
UPDATE category
SET name = ?, description = ?, image = ?, display_order = ?, is_active = ?, updated_at = ?
WHERE id = ?"#,
    )
    .bind(&props.name)
    .bind(&props.description)
    .bind(&props.image)
    .bind(props.display_order)
    .bind(props.is_active)
    .bind(now())
    .bind(id)
    .execute(db_conn)
    .await?
    .rows_affected();
    ensure_affected(rows)
}

/// Removes the category together with its menu items.
pub async fn delete_category(db_conn: &SqlitePool, id: i64) -> Result<()> {
    let rows = sqlx::query("DELETE FROM category WHERE id = ?")
        .bind(id)
        .execute(db_conn)
        .await?
        .rows_affected();
    ensure_affected(rows)
}
