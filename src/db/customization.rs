use derive_builder::Builder;
use serde::Deserialize;
use sqlx::{sqlite::SqlitePool, Sqlite, Transaction};

use super::{ensure_affected, now, Listing};
use crate::{
    data::{Customization, CustomizationType},
    error::{Error, Result},
    money::Amount,
    query::{ListParams, Page, Paged, SortKey},
    validate,
};

const SELECT: &str = r#"
SELECT c.id, c.name, c.customization_type, c.price_modifier, c.is_active, c.created_at
FROM customization c
WHERE 1 = 1"#;

const COUNT: &str = "SELECT COUNT(*) FROM customization c WHERE 1 = 1";

pub const ORDERING_FIELDS: &[(&str, &str)] = &[
    ("name", "c.name"),
    ("price_modifier", "c.price_modifier"),
];

const DEFAULT_ORDER: &[SortKey] = &[SortKey::asc("c.customization_type"), SortKey::asc("c.name")];

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Builder)]
pub struct CustomizationProps {
    #[builder(setter(into))]
    pub name: String,
    pub customization_type: CustomizationType,
    #[serde(default)]
    #[builder(default)]
    pub price_modifier: Amount,
    #[serde(default = "yes")]
    #[builder(default = "true")]
    pub is_active: bool,
    /// Replaces the set of linked menu items when present.
    #[serde(default)]
    #[builder(setter(strip_option), default)]
    pub menu_items: Option<Vec<i64>>,
}

impl CustomizationProps {
    fn validate(&self) -> Result<()> {
        validate::required("name", &self.name)?;
        validate::max_len("name", &self.name, 100)
    }
}

impl From<Customization> for CustomizationProps {
    fn from(c: Customization) -> Self {
        Self {
            name: c.name,
            customization_type: c.customization_type,
            price_modifier: c.price_modifier,
            is_active: c.is_active,
            menu_items: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomizationPatch {
    pub name: Option<String>,
    pub customization_type: Option<CustomizationType>,
    pub price_modifier: Option<Amount>,
    pub is_active: Option<bool>,
    pub menu_items: Option<Vec<i64>>,
}

impl CustomizationPatch {
    pub fn apply(self, props: &mut CustomizationProps) {
        if let Some(name) = self.name {
            props.name = name;
        }
        if let Some(kind) = self.customization_type {
            props.customization_type = kind;
        }
        if let Some(modifier) = self.price_modifier {
            props.price_modifier = modifier;
        }
        if let Some(active) = self.is_active {
            props.is_active = active;
        }
        if self.menu_items.is_some() {
            props.menu_items = self.menu_items;
        }
    }
}

#[derive(Debug, Clone, Default, Builder)]
#[builder(default)]
pub struct ListCustomizationProps {
    #[builder(setter(strip_option))]
    pub customization_type: Option<CustomizationType>,
    pub ordering: Vec<SortKey>,
    pub include_inactive: bool,
}

impl ListCustomizationProps {
    pub fn from_params(params: &ListParams, include_inactive: bool) -> Result<Self> {
        Ok(Self {
            customization_type: params.choice("customization_type")?,
            ordering: params.ordering(ORDERING_FIELDS),
            include_inactive,
        })
    }
}

async fn replace_links(
    tx: &mut Transaction<'_, Sqlite>,
    customization: i64,
    menu_items: &[i64],
) -> Result<()> {
    sqlx::query("DELETE FROM menu_item_customization WHERE customization_id = ?")
        .bind(customization)
        .execute(&mut **tx)
        .await?;
    for menu_item in menu_items {
        sqlx::query(
            "INSERT OR IGNORE INTO menu_item_customization (customization_id, menu_item_id) VALUES (?, ?)",
        )
        .bind(customization)
        .bind(menu_item)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

pub async fn add_customization(db_conn: &SqlitePool, props: &CustomizationProps) -> Result<i64> {
    props.validate()?;
    let mut tx = db_conn.begin().await?;
    let id = sqlx::query(
        r#"
INSERT INTO customization
    (name, customization_type, price_modifier, is_active, created_at)
VALUES
    (?, ?, ?, ?, ?)"#,
    )
    .bind(&props.name)
    .bind(props.customization_type)
    .bind(props.price_modifier)
    .bind(props.is_active)
    .bind(now())
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();
    if let Some(menu_items) = &props.menu_items {
        replace_links(&mut tx, id, menu_items).await?;
    }
    tx.commit().await?;
    Ok(id)
}

pub async fn get_customization(
    db_conn: &SqlitePool,
    id: i64,
    include_inactive: bool,
) -> Result<Customization> {
    let sql = format!("{SELECT} AND c.id = ? AND (c.is_active = 1 OR ?)");
    sqlx::query_as::<_, Customization>(&sql)
        .bind(id)
        .bind(include_inactive)
        .fetch_optional(db_conn)
        .await?
        .ok_or_else(|| Error::not_found("Not found."))
}

pub async fn list_customizations(
    db_conn: &SqlitePool,
    props: &ListCustomizationProps,
    page: Page,
) -> Result<Paged<Customization>> {
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
            if let Some(kind) = props.customization_type {
                qb.push(" AND c.customization_type = ").push_bind(kind);
            }
        })
        .await
}

/// Active customizations of one type, or all active ones.
pub async fn customizations_by_type(
    db_conn: &SqlitePool,
    kind: Option<CustomizationType>,
) -> Result<Vec<Customization>> {
    let listing = Listing {
        select: SELECT,
        count: COUNT,
        ordering: &[],
        default_order: DEFAULT_ORDER,
        tiebreak: "c.id",
    };
    listing
        .all(db_conn, |qb| {
            qb.push(" AND c.is_active = 1");
            if let Some(kind) = kind {
                qb.push(" AND c.customization_type = ").push_bind(kind);
            }
        })
        .await
}

pub async fn update_customization(
    db_conn: &SqlitePool,
    id: i64,
    props: &CustomizationProps,
) -> Result<()> {
    props.validate()?;
    let mut tx = db_conn.begin().await?;
    let rows = sqlx::query(
        r#"
UPDATE customization
SET name = ?, customization_type = ?, price_modifier = ?, is_active = ?
WHERE id = ?"#,
    )
    .bind(&props.name)
    .bind(props.customization_type)
    .bind(props.price_modifier)
    .bind(props.is_active)
    .bind(id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    ensure_affected(rows)?;
    if let Some(menu_items) = &props.menu_items {
        replace_links(&mut tx, id, menu_items).await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn delete_customization(db_conn: &SqlitePool, id: i64) -> Result<()> {
    let rows = sqlx::query("DELETE FROM customization WHERE id = ?")
        .bind(id)
        .execute(db_conn)
        .await?
        .rows_affected();
    ensure_affected(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        category::{add_category, CategoryPropsBuilder},
        connect_in_memory,
        menu_item::{add_menu_item, item_customizations, MenuItemPropsBuilder},
    };

    fn props(name: &str, kind: CustomizationType, modifier: &str) -> CustomizationProps {
        CustomizationPropsBuilder::default()
            .name(name)
            .customization_type(kind)
            .price_modifier(modifier.parse().unwrap())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_filter_by_type_and_default_order() {
        let db = connect_in_memory().await.unwrap();
        add_customization(&db, &props("Large", CustomizationType::Size, "3.00"))
            .await
            .unwrap();
        add_customization(&db, &props("Extra Cheese", CustomizationType::Extra, "1.50"))
            .await
            .unwrap();
        add_customization(&db, &props("Kids", CustomizationType::Size, "-2.00"))
            .await
            .unwrap();

        let all = list_customizations(&db, &ListCustomizationProps::default(), Page::first(20))
            .await
            .unwrap();
        let names: Vec<_> = all.items.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Extra Cheese", "Kids", "Large"]);

        let sizes = customizations_by_type(&db, Some(CustomizationType::Size))
            .await
            .unwrap();
        assert_eq!(sizes.len(), 2);
        assert!(sizes[0].price_modifier.is_negative());

        let params = ListParams::new([("customization_type", "extra")]);
        let extras = ListCustomizationProps::from_params(&params, false).unwrap();
        let found = list_customizations(&db, &extras, Page::first(20)).await.unwrap();
        assert_eq!(found.count, 1);

        let params = ListParams::new([("customization_type", "topping")]);
        assert!(ListCustomizationProps::from_params(&params, false).is_err());
    }

    #[tokio::test]
    async fn test_menu_items_replace_links() {
        let db = connect_in_memory().await.unwrap();
        let cid = add_category(&db, &CategoryPropsBuilder::default().name("Pizzas").build().unwrap())
            .await
            .unwrap();
        let mut items = Vec::new();
        for name in ["Margherita", "Marinara"] {
            let item = MenuItemPropsBuilder::default()
                .name(name)
                .description("Classic")
                .category_id(cid)
                .price("8.00".parse().unwrap())
                .build()
                .unwrap();
            items.push(add_menu_item(&db, &item).await.unwrap());
        }

        let mut large = props("Large", CustomizationType::Size, "3.00");
        large.menu_items = Some(items.clone());
        let id = add_customization(&db, &large).await.unwrap();
        assert_eq!(item_customizations(&db, items[1]).await.unwrap().len(), 1);

        let mut current: CustomizationProps = get_customization(&db, id, false).await.unwrap().into();
        let patch: CustomizationPatch =
            serde_json::from_str(&format!(r#"{{"menu_items": [{}]}}"#, items[0])).unwrap();
        patch.apply(&mut current);
        update_customization(&db, id, &current).await.unwrap();
        assert_eq!(item_customizations(&db, items[0]).await.unwrap().len(), 1);
        assert!(item_customizations(&db, items[1]).await.unwrap().is_empty());

        large.menu_items = Some(vec![999]);
        assert!(matches!(
            update_customization(&db, id, &large).await,
            Err(Error::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_inactive_are_hidden() {
        let db = connect_in_memory().await.unwrap();
        let mut hidden = props("Truffle", CustomizationType::Extra, "5.00");
        hidden.is_active = false;
        let id = add_customization(&db, &hidden).await.unwrap();

        assert!(customizations_by_type(&db, None).await.unwrap().is_empty());
        assert!(get_customization(&db, id, false).await.is_err());
        assert!(get_customization(&db, id, true).await.is_ok());
        delete_customization(&db, id).await.unwrap();
    }
}
