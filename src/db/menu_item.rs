use std::cmp::Reverse;

use derive_builder::Builder;
use fuzzy_matcher::{skim::SkimMatcherV2, FuzzyMatcher};
use serde::Deserialize;
use sqlx::sqlite::SqlitePool;

use super::{
    category::get_category, ensure_affected, now, nullable, review::reviews_for_menu_item, Listing,
};
use crate::{
    data::{
        round_rating, Customization, IngredientRef, ItemIngredient, MenuItem, MenuItemDetail,
        SpiceLevel,
    },
    error::{Error, Result},
    money::Amount,
    query::{like_pattern, push_search, ListParams, Page, Paged, SortKey},
    validate,
};

const SELECT: &str = r#"
SELECT
    m.id, m.name, m.description, m.category_id, c.name AS category_name, m.price,
    m.image, m.video, m.model_3d, m.video_thumbnail, m.spice_level,
    m.is_vegetarian, m.is_vegan, m.is_gluten_free, m.contains_nuts,
    m.is_available, m.is_featured, m.preparation_time, m.calories, m.display_order,
    (SELECT AVG(r.rating) FROM review r WHERE r.menu_item_id = m.id AND r.is_approved = 1) AS average_rating,
    (SELECT COUNT(*) FROM review r WHERE r.menu_item_id = m.id AND r.is_approved = 1) AS review_count,
    m.created_at, m.updated_at
FROM menu_item m
JOIN category c ON c.id = m.category_id
WHERE 1 = 1"#;

const COUNT: &str =
    "SELECT COUNT(*) FROM menu_item m JOIN category c ON c.id = m.category_id WHERE 1 = 1";

pub const ORDERING_FIELDS: &[(&str, &str)] = &[
    ("name", "m.name"),
    ("price", "m.price"),
    ("created_at", "m.created_at"),
    ("order", "m.display_order"),
];

const DEFAULT_ORDER: &[SortKey] = &[
    SortKey::asc("c.display_order"),
    SortKey::asc("m.display_order"),
    SortKey::asc("m.name"),
];

/// How many approved reviews the item page embeds.
pub const DETAIL_REVIEWS: i64 = 5;

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Builder)]
pub struct MenuItemProps {
    #[builder(setter(into))]
    pub name: String,
    #[builder(setter(into))]
    pub description: String,
    #[serde(rename = "category", alias = "category_id")]
    pub category_id: i64,
    pub price: Amount,
    #[serde(default)]
    #[builder(setter(into, strip_option), default)]
    pub image: Option<String>,
    #[serde(default)]
    #[builder(setter(into, strip_option), default)]
    pub video: Option<String>,
    #[serde(default)]
    #[builder(setter(into, strip_option), default)]
    pub model_3d: Option<String>,
    #[serde(default)]
    #[builder(setter(into, strip_option), default)]
    pub video_thumbnail: Option<String>,
    #[serde(default)]
    #[builder(default)]
    pub spice_level: SpiceLevel,
    #[serde(default)]
    #[builder(default)]
    pub is_vegetarian: bool,
    #[serde(default)]
    #[builder(default)]
    pub is_vegan: bool,
    #[serde(default)]
    #[builder(default)]
    pub is_gluten_free: bool,
    #[serde(default)]
    #[builder(default)]
    pub contains_nuts: bool,
    #[serde(default = "yes")]
    #[builder(default = "true")]
    pub is_available: bool,
    #[serde(default)]
    #[builder(default)]
    pub is_featured: bool,
    #[serde(default)]
    #[builder(setter(strip_option), default)]
    pub preparation_time: Option<i64>,
    #[serde(default)]
    #[builder(setter(strip_option), default)]
    pub calories: Option<i64>,
    #[serde(default, rename = "order")]
    #[builder(default)]
    pub display_order: i64,
}

impl MenuItemProps {
    fn validate(&self) -> Result<()> {
        validate::required("name", &self.name)?;
        validate::max_len("name", &self.name, 200)?;
        validate::required("description", &self.description)?;
        validate::non_negative("price", self.price.hundredths())?;
        if let Some(minutes) = self.preparation_time {
            validate::non_negative("preparation_time", minutes)?;
        }
        if let Some(calories) = self.calories {
            validate::non_negative("calories", calories)?;
        }
        Ok(())
    }
}

impl From<MenuItem> for MenuItemProps {
    fn from(m: MenuItem) -> Self {
        Self {
            name: m.name,
            description: m.description,
            category_id: m.category_id,
            price: m.price,
            image: m.image,
            video: m.video,
            model_3d: m.model_3d,
            video_thumbnail: m.video_thumbnail,
            spice_level: m.spice_level,
            is_vegetarian: m.is_vegetarian,
            is_vegan: m.is_vegan,
            is_gluten_free: m.is_gluten_free,
            contains_nuts: m.contains_nuts,
            is_available: m.is_available,
            is_featured: m.is_featured,
            preparation_time: m.preparation_time,
            calories: m.calories,
            display_order: m.display_order,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MenuItemPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "category", alias = "category_id")]
    pub category_id: Option<i64>,
    pub price: Option<Amount>,
    #[serde(default, deserialize_with = "nullable")]
    pub image: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub video: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub model_3d: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub video_thumbnail: Option<Option<String>>,
    pub spice_level: Option<SpiceLevel>,
    pub is_vegetarian: Option<bool>,
    pub is_vegan: Option<bool>,
    pub is_gluten_free: Option<bool>,
    pub contains_nuts: Option<bool>,
    pub is_available: Option<bool>,
    pub is_featured: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub preparation_time: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub calories: Option<Option<i64>>,
    #[serde(rename = "order")]
    pub display_order: Option<i64>,
}

impl MenuItemPatch {
    pub fn apply(self, p: &mut MenuItemProps) {
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
            category_id,
            price,
            image,
            video,
            model_3d,
            video_thumbnail,
            spice_level,
            is_vegetarian,
            is_vegan,
            is_gluten_free,
            contains_nuts,
            is_available,
            is_featured,
            preparation_time,
            calories,
            display_order,
        );
    }
}

#[derive(Debug, Clone, Default, Builder)]
#[builder(default)]
pub struct ListMenuItemProps {
    #[builder(setter(strip_option))]
    pub category: Option<i64>,
    #[builder(setter(strip_option))]
    pub is_vegetarian: Option<bool>,
    #[builder(setter(strip_option))]
    pub is_vegan: Option<bool>,
    #[builder(setter(strip_option))]
    pub is_gluten_free: Option<bool>,
    #[builder(setter(strip_option))]
    pub is_featured: Option<bool>,
    #[builder(setter(strip_option))]
    pub spice_level: Option<SpiceLevel>,
    #[builder(setter(strip_option))]
    pub price_min: Option<Amount>,
    #[builder(setter(strip_option))]
    pub price_max: Option<Amount>,
    #[builder(setter(into, strip_option))]
    pub search: Option<String>,
    pub ordering: Vec<SortKey>,
}

impl ListMenuItemProps {
    pub fn from_params(params: &ListParams) -> Result<Self> {
        let amount = |key: &str| -> Result<Option<Amount>> {
            params
                .get(key)
                .map(|raw| {
                    raw.parse::<Amount>()
                        .map_err(|e| Error::Invalid(format!("{key}: {e}")))
                })
                .transpose()
        };
        Ok(Self {
            category: params.id("category")?,
            is_vegetarian: params.bool("is_vegetarian")?,
            is_vegan: params.bool("is_vegan")?,
            is_gluten_free: params.bool("is_gluten_free")?,
            is_featured: params.bool("is_featured")?,
            spice_level: params.choice("spice_level")?,
            price_min: amount("price__gte")?,
            price_max: amount("price__lte")?,
            search: params.search(),
            ordering: params.ordering(ORDERING_FIELDS),
        })
    }
}

/// One ingredient line of a menu item.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemIngredientProps {
    pub ingredient_id: i64,
    #[serde(default)]
    pub quantity: String,
    #[serde(default)]
    pub is_optional: bool,
}

#[derive(sqlx::FromRow)]
struct ItemIngredientRow {
    id: i64,
    ingredient_id: i64,
    ingredient_name: String,
    ingredient_description: String,
    ingredient_is_allergen: bool,
    quantity: String,
    is_optional: bool,
}

impl From<ItemIngredientRow> for ItemIngredient {
    fn from(row: ItemIngredientRow) -> Self {
        Self {
            id: row.id,
            ingredient: IngredientRef {
                id: row.ingredient_id,
                name: row.ingredient_name,
                description: row.ingredient_description,
                is_allergen: row.ingredient_is_allergen,
            },
            quantity: row.quantity,
            is_optional: row.is_optional,
        }
    }
}

fn finish(mut item: MenuItem) -> MenuItem {
    item.average_rating = round_rating(item.average_rating);
    item
}

fn listing(ordering: &[SortKey]) -> Listing<'_> {
    Listing {
        select: SELECT,
        count: COUNT,
        ordering,
        default_order: DEFAULT_ORDER,
        tiebreak: "m.id",
    }
}

pub async fn add_menu_item(db_conn: &SqlitePool, props: &MenuItemProps) -> Result<i64> {
    props.validate()?;
    let ts = now();
    let id = sqlx::query(
        r#"
INSERT INTO menu_item
    (name, description, category_id, price, image, video, model_3d, video_thumbnail,
     spice_level, is_vegetarian, is_vegan, is_gluten_free, contains_nuts, is_available,
     is_featured, preparation_time, calories, display_order, created_at, updated_at)
VALUES
    (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&props.name)
    .bind(&props.description)
    .bind(props.category_id)
    .bind(props.price)
    .bind(&props.image)
    .bind(&props.video)
    .bind(&props.model_3d)
    .bind(&props.video_thumbnail)
    .bind(props.spice_level)
    .bind(props.is_vegetarian)
    .bind(props.is_vegan)
    .bind(props.is_gluten_free)
    .bind(props.contains_nuts)
    .bind(props.is_available)
    .bind(props.is_featured)
    .bind(props.preparation_time)
    .bind(props.calories)
    .bind(props.display_order)
    .bind(ts)
    .bind(ts)
    .execute(db_conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn get_menu_item(db_conn: &SqlitePool, id: i64) -> Result<MenuItem> {
    let sql = format!("{SELECT} AND m.id = ?");
    sqlx::query_as::<_, MenuItem>(&sql)
        .bind(id)
        .fetch_optional(db_conn)
        .await?
        .map(finish)
        .ok_or_else(|| Error::not_found("Not found."))
}

pub async fn get_menu_item_detail(db_conn: &SqlitePool, id: i64) -> Result<MenuItemDetail> {
    let item = get_menu_item(db_conn, id).await?;
    let category = get_category(db_conn, item.category_id, true).await?;
    let ingredients = item_ingredients(db_conn, id).await?;
    let customizations = item_customizations(db_conn, id).await?;
    let reviews = reviews_for_menu_item(db_conn, id, Some(DETAIL_REVIEWS)).await?;

    Ok(MenuItemDetail {
        id: item.id,
        name: item.name,
        description: item.description,
        category,
        price: item.price,
        image: item.image,
        video: item.video,
        model_3d: item.model_3d,
        video_thumbnail: item.video_thumbnail,
        spice_level: item.spice_level,
        is_vegetarian: item.is_vegetarian,
        is_vegan: item.is_vegan,
        is_gluten_free: item.is_gluten_free,
        contains_nuts: item.contains_nuts,
        is_available: item.is_available,
        is_featured: item.is_featured,
        preparation_time: item.preparation_time,
        calories: item.calories,
        order: item.display_order,
        ingredients,
        customizations,
        reviews,
        average_rating: item.average_rating,
        review_count: item.review_count,
        created_at: item.created_at,
        updated_at: item.updated_at,
    })
}

pub async fn list_menu_items(
    db_conn: &SqlitePool,
    props: &ListMenuItemProps,
    page: Page,
) -> Result<Paged<MenuItem>> {
    let paged = listing(&props.ordering)
        .page(db_conn, page, |qb| {
            if let Some(category) = props.category {
                qb.push(" AND m.category_id = ").push_bind(category);
            }
            for (column, value) in [
                ("m.is_vegetarian", props.is_vegetarian),
                ("m.is_vegan", props.is_vegan),
                ("m.is_gluten_free", props.is_gluten_free),
                ("m.is_featured", props.is_featured),
            ] {
                if let Some(value) = value {
                    qb.push(format!(" AND {column} = ")).push_bind(value);
                }
            }
            if let Some(level) = props.spice_level {
                qb.push(" AND m.spice_level = ").push_bind(level);
            }
            if let Some(min) = props.price_min {
                qb.push(" AND m.price >= ").push_bind(min);
            }
            if let Some(max) = props.price_max {
                qb.push(" AND m.price <= ").push_bind(max);
            }
            if let Some(search) = &props.search {
                push_search(qb, &["m.name", "m.description"], search);
            }
        })
        .await?;
    Ok(paged.map(finish))
}

pub async fn featured_menu_items(db_conn: &SqlitePool) -> Result<Vec<MenuItem>> {
    let items = listing(&[])
        .all(db_conn, |qb| {
            qb.push(" AND m.is_featured = 1");
        })
        .await?;
    Ok(items.into_iter().map(finish).collect())
}

/// Available items of one category.
pub async fn items_in_category(db_conn: &SqlitePool, category_id: i64) -> Result<Vec<MenuItem>> {
    let items = listing(&[])
        .all(db_conn, |qb| {
            qb.push(" AND m.is_available = 1 AND m.category_id = ")
                .push_bind(category_id);
        })
        .await?;
    Ok(items.into_iter().map(finish).collect())
}

/// Items whose name, description or category name contains `query`, best
/// fuzzy name matches first.
pub async fn search_menu_items(db_conn: &SqlitePool, query: &str) -> Result<Vec<MenuItem>> {
    let query = query.trim();
    if query.is_empty() {
        return Err(Error::invalid("Search query is required"));
    }
    let mut items: Vec<MenuItem> = listing(&[])
        .all(db_conn, |qb| {
            let pattern = like_pattern(query);
            qb.push(" AND (m.name LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR m.description LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR c.name LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        })
        .await?;

    let matcher = SkimMatcherV2::default().ignore_case();
    // stable, so equal scores keep the menu order
    items.sort_by_cached_key(|item| Reverse(matcher.fuzzy_match(&item.name, query).unwrap_or(0)));
    Ok(items.into_iter().map(finish).collect())
}

pub async fn update_menu_item(db_conn: &SqlitePool, id: i64, props: &MenuItemProps) -> Result<()> {
    props.validate()?;
    let rows = sqlx::query(
        r#"
UPDATE menu_item
SET name = ?, description = ?, category_id = ?, price = ?, image = ?, video = ?,
    model_3d = ?, video_thumbnail = ?, spice_level = ?, is_vegetarian = ?, is_vegan = ?,
    is_gluten_free = ?, contains_nuts = ?, is_available = ?, is_featured = ?,
    preparation_time = ?, calories = ?, display_order = ?, updated_at = ?
WHERE id = ?"#,
    )
    .bind(&props.name)
    .bind(&props.description)
    .bind(props.category_id)
    .bind(props.price)
    .bind(&props.image)
    .bind(&props.video)
    .bind(&props.model_3d)
    .bind(&props.video_thumbnail)
    .bind(props.spice_level)
    .bind(props.is_vegetarian)
    .bind(props.is_vegan)
    .bind(props.is_gluten_free)
    .bind(props.contains_nuts)
    .bind(props.is_available)
    .bind(props.is_featured)
    .bind(props.preparation_time)
    .bind(props.calories)
    .bind(props.display_order)
    .bind(now())
    .bind(id)
    .execute(db_conn)
    .await?
    .rows_affected();
    ensure_affected(rows)
}

pub async fn delete_menu_item(db_conn: &SqlitePool, id: i64) -> Result<()> {
    let rows = sqlx::query("DELETE FROM menu_item WHERE id = ?")
        .bind(id)
        .execute(db_conn)
        .await?
        .rows_affected();
    ensure_affected(rows)
}

pub async fn item_ingredients(db_conn: &SqlitePool, menu_item: i64) -> Result<Vec<ItemIngredient>> {
    let rows = sqlx::query_as::<_, ItemIngredientRow>(
        r#"
SELECT
    mi.id, i.id AS ingredient_id, i.name AS ingredient_name,
    i.description AS ingredient_description, i.is_allergen AS ingredient_is_allergen,
    mi.quantity, mi.is_optional
FROM menu_item_ingredient mi
JOIN ingredient i ON i.id = mi.ingredient_id
WHERE mi.menu_item_id = ?
ORDER BY mi.id"#,
    )
    .bind(menu_item)
    .fetch_all(db_conn)
    .await?;
    Ok(rows.into_iter().map(ItemIngredient::from).collect())
}

pub async fn add_item_ingredient(
    db_conn: &SqlitePool,
    menu_item: i64,
    props: &ItemIngredientProps,
) -> Result<ItemIngredient> {
    validate::max_len("quantity", &props.quantity, 50)?;
    // 404 for the item itself, 400 for a dangling ingredient
    get_menu_item(db_conn, menu_item).await?;

    let id = sqlx::query(
        r#"
INSERT INTO menu_item_ingredient
    (menu_item_id, ingredient_id, quantity, is_optional)
VALUES
    (?, ?, ?, ?)"#,
    )
    .bind(menu_item)
    .bind(props.ingredient_id)
    .bind(&props.quantity)
    .bind(props.is_optional)
    .execute(db_conn)
    .await
    .map_err(|e| match Error::from(e) {
        Error::Invalid(msg) if msg.contains("already exists") => {
            Error::invalid("This ingredient is already listed for the menu item.")
        }
        other => other,
    })?
    .last_insert_rowid();

    item_ingredients(db_conn, menu_item)
        .await?
        .into_iter()
        .find(|line| line.id == id)
        .ok_or_else(|| Error::not_found("Not found."))
}

pub async fn remove_item_ingredient(
    db_conn: &SqlitePool,
    menu_item: i64,
    ingredient: i64,
) -> Result<()> {
    let rows = sqlx::query(
        "DELETE FROM menu_item_ingredient WHERE menu_item_id = ? AND ingredient_id = ?",
    )
    .bind(menu_item)
    .bind(ingredient)
    .execute(db_conn)
    .await?
    .rows_affected();
    ensure_affected(rows)
}

/// Active customizations offered for an item.
pub async fn item_customizations(
    db_conn: &SqlitePool,
    menu_item: i64,
) -> Result<Vec<Customization>> {
    let rows = sqlx::query_as::<_, Customization>(
        r#"
SELECT c.id, c.name, c.customization_type, c.price_modifier, c.is_active, c.created_at
FROM customization c
JOIN menu_item_customization mc ON mc.customization_id = c.id
WHERE mc.menu_item_id = ? AND c.is_active = 1
ORDER BY c.customization_type, c.name, c.id"#,
    )
    .bind(menu_item)
    .fetch_all(db_conn)
    .await?;
    Ok(rows)
}

/// Offers `customization` for `menu_item`. Linking twice is a no-op.
pub async fn link_customization(
    db_conn: &SqlitePool,
    menu_item: i64,
    customization: i64,
) -> Result<()> {
    get_menu_item(db_conn, menu_item).await?;
    sqlx::query(
        "INSERT OR IGNORE INTO menu_item_customization (customization_id, menu_item_id) VALUES (?, ?)",
    )
    .bind(customization)
    .bind(menu_item)
    .execute(db_conn)
    .await?;
    Ok(())
}

pub async fn unlink_customization(
    db_conn: &SqlitePool,
    menu_item: i64,
    customization: i64,
) -> Result<()> {
    let rows = sqlx::query(
        "DELETE FROM menu_item_customization WHERE menu_item_id = ? AND customization_id = ?",
    )
    .bind(menu_item)
    .bind(customization)
    .execute(db_conn)
    .await?
    .rows_affected();
    ensure_affected(rows)
}
