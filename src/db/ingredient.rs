use derive_builder::Builder;
use serde::Deserialize;
use sqlx::sqlite::SqlitePool;

use super::{ensure_affected, now, nullable, Listing};
use crate::{
    data::{Ingredient, IngredientDetails, IngredientUsage},
    error::{Error, Result},
    query::{push_search, ListParams, Page, Paged, SortKey},
    validate,
};

const SELECT: &str = r#"
SELECT
    i.id, i.name, i.description, i.is_allergen, i.origin, i.nutritional_info,
    i.supplier, i.seasonal, i.organic, i.image, i.created_at
FROM ingredient i
WHERE 1 = 1"#;

const COUNT: &str = "SELECT COUNT(*) FROM ingredient i WHERE 1 = 1";

pub const ORDERING_FIELDS: &[(&str, &str)] = &[("name", "i.name"), ("created_at", "i.created_at")];

const DEFAULT_ORDER: &[SortKey] = &[SortKey::asc("i.name")];

#[derive(Debug, Clone, Deserialize, Builder)]
pub struct IngredientProps {
    #[builder(setter(into))]
    pub name: String,
    #[serde(default)]
    #[builder(setter(into), default)]
    pub description: String,
    #[serde(default)]
    #[builder(default)]
    pub is_allergen: bool,
    #[serde(default)]
    #[builder(setter(into), default)]
    pub origin: String,
    #[serde(default)]
    #[builder(setter(into), default)]
    pub nutritional_info: String,
    #[serde(default)]
    #[builder(setter(into), default)]
    pub supplier: String,
    #[serde(default)]
    #[builder(default)]
    pub seasonal: bool,
    #[serde(default)]
    #[builder(default)]
    pub organic: bool,
    #[serde(default)]
    #[builder(setter(into, strip_option), default)]
    pub image: Option<String>,
}

impl IngredientProps {
    fn validate(&self) -> Result<()> {
        validate::required("name", &self.name)?;
        validate::max_len("name", &self.name, 100)?;
        validate::max_len("origin", &self.origin, 200)?;
        validate::max_len("supplier", &self.supplier, 200)
    }
}

impl From<Ingredient> for IngredientProps {
    fn from(i: Ingredient) -> Self {
        Self {
            name: i.name,
            description: i.description,
            is_allergen: i.is_allergen,
            origin: i.origin,
            nutritional_info: i.nutritional_info,
            supplier: i.supplier,
            seasonal: i.seasonal,
            organic: i.organic,
            image: i.image,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct IngredientPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_allergen: Option<bool>,
    pub origin: Option<String>,
    pub nutritional_info: Option<String>,
    pub supplier: Option<String>,
    pub seasonal: Option<bool>,
    pub organic: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub image: Option<Option<String>>,
}

impl IngredientPatch {
    pub fn apply(self, p: &mut IngredientProps) {
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    p.$field = value;
                })*
            };
        }
        merge!(
            name,
            description,
            is_allergen,
            origin,
            nutritional_info,
            supplier,
            seasonal,
            organic,
            image,
        );
    }
}

#[derive(Debug, Clone, Default, Builder)]
#[builder(default)]
pub struct ListIngredientProps {
    #[builder(setter(into, strip_option))]
    pub search: Option<String>,
    pub ordering: Vec<SortKey>,
}

impl ListIngredientProps {
    pub fn from_params(params: &ListParams) -> Self {
        Self {
            search: params.search(),
            ordering: params.ordering(ORDERING_FIELDS),
        }
    }
}

pub async fn add_ingredient(db_conn: &SqlitePool, props: &IngredientProps) -> Result<i64> {
    props.validate()?;
    let id = sqlx::query(
        r#"
INSERT INTO ingredient
    (name, description, is_allergen, origin, nutritional_info, supplier,
     seasonal, organic, image, created_at)
VALUES
    (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&props.name)
    .bind(&props.description)
    .bind(props.is_allergen)
    .bind(&props.origin)
    .bind(&props.nutritional_info)
    .bind(&props.supplier)
    .bind(props.seasonal)
    .bind(props.organic)
    .bind(&props.image)
    .bind(now())
    .execute(db_conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn get_ingredient(db_conn: &SqlitePool, id: i64) -> Result<Ingredient> {
    let sql = format!("{SELECT} AND i.id = ?");
    sqlx::query_as::<_, Ingredient>(&sql)
        .bind(id)
        .fetch_optional(db_conn)
        .await?
        .ok_or_else(|| Error::not_found("Not found."))
}

pub async fn list_ingredients(
    db_conn: &SqlitePool,
    props: &ListIngredientProps,
    page: Page,
) -> Result<Paged<Ingredient>> {
    let listing = Listing {
        select: SELECT,
        count: COUNT,
        ordering: &props.ordering,
        default_order: DEFAULT_ORDER,
        tiebreak: "i.id",
    };
    listing
        .page(db_conn, page, |qb| {
            if let Some(search) = &props.search {
                push_search(qb, &["i.name", "i.description"], search);
            }
        })
        .await
}

pub async fn allergen_ingredients(db_conn: &SqlitePool) -> Result<Vec<Ingredient>> {
    let listing = Listing {
        select: SELECT,
        count: COUNT,
        ordering: &[],
        default_order: DEFAULT_ORDER,
        tiebreak: "i.id",
    };
    listing
        .all(db_conn, |qb| {
            qb.push(" AND i.is_allergen = 1");
        })
        .await
}

/// The full ingredient record along with the menu items that use it.
pub async fn get_ingredient_details(db_conn: &SqlitePool, id: i64) -> Result<IngredientDetails> {
    let ingredient = get_ingredient(db_conn, id)
        .await
        .map_err(|e| match e {
            Error::NotFound(_) => Error::not_found("Ingredient not found"),
            other => other,
        })?;

    let used_in_menu_items = sqlx::query_as::<_, IngredientUsage>(
        r#"
SELECT DISTINCT m.id, m.name, c.name AS category, m.price
FROM menu_item m
JOIN category c ON c.id = m.category_id
JOIN menu_item_ingredient mi ON mi.menu_item_id = m.id
WHERE mi.ingredient_id = ?
ORDER BY m.name, m.id"#,
    )
    .bind(id)
    .fetch_all(db_conn)
    .await?;

    Ok(IngredientDetails {
        id: ingredient.id,
        name: ingredient.name,
        description: ingredient.description,
        origin: ingredient.origin,
        nutritional_info: ingredient.nutritional_info,
        supplier: ingredient.supplier,
        is_seasonal: ingredient.seasonal,
        is_organic: ingredient.organic,
        is_allergen: ingredient.is_allergen,
        image: ingredient.image,
        used_in_menu_items,
    })
}

pub async fn update_ingredient(
    db_conn: &SqlitePool,
    id: i64,
    props: &IngredientProps,
) -> Result<()> {
    props.validate()?;
    let rows = sqlx::query(
        r#"
UPDATE ingredient
SET name = ?, description = ?, is_allergen = ?, origin = ?, nutritional_info = ?,
    supplier = ?, seasonal = ?, organic = ?, image = ?
WHERE id = ?"#,
    )
    .bind(&props.name)
    .bind(&props.description)
    .bind(props.is_allergen)
    .bind(&props.origin)
    .bind(&props.nutritional_info)
    .bind(&props.supplier)
    .bind(props.seasonal)
    .bind(props.organic)
    .bind(&props.image)
    .bind(id)
    .execute(db_conn)
    .await?
    .rows_affected();
    ensure_affected(rows)
}

pub async fn delete_ingredient(db_conn: &SqlitePool, id: i64) -> Result<()> {
    let rows = sqlx::query("DELETE FROM ingredient WHERE id = ?")
        .bind(id)
        .execute(db_conn)
        .await?
        .rows_affected();
    ensure_affected(rows)
}
