use derive_builder::Builder;
use serde::Deserialize;
use sqlx::sqlite::SqlitePool;

use super::{now, Listing};
use crate::{
    data::RestaurantInfo,
    error::{Error, Result},
    money::Amount,
    query::{Page, Paged},
    validate,
};

/// The only id the singleton row can have.
pub const SINGLETON_ID: i64 = 1;

const SELECT: &str = r#"
SELECT
    id, name, description, logo, phone, email, address, opening_hours,
    facebook_url, instagram_url, twitter_url, currency_symbol, tax_rate, updated_at
FROM restaurant_info
WHERE 1 = 1"#;

const COUNT: &str = "SELECT COUNT(*) FROM restaurant_info WHERE 1 = 1";

fn euro() -> String {
    "€".to_string()
}

#[derive(Debug, Clone, Deserialize, Builder)]
pub struct RestaurantInfoProps {
    #[builder(setter(into))]
    pub name: String,
    #[builder(setter(into))]
    pub description: String,
    #[serde(default)]
    #[builder(setter(into, strip_option), default)]
    pub logo: Option<String>,
    #[builder(setter(into))]
    pub phone: String,
    #[builder(setter(into))]
    pub email: String,
    #[builder(setter(into))]
    pub address: String,
    #[builder(setter(into))]
    pub opening_hours: String,
    #[serde(default)]
    #[builder(setter(into), default)]
    pub facebook_url: String,
    #[serde(default)]
    #[builder(setter(into), default)]
    pub instagram_url: String,
    #[serde(default)]
    #[builder(setter(into), default)]
    pub twitter_url: String,
    #[serde(default = "euro")]
    #[builder(setter(into), default = "euro()")]
    pub currency_symbol: String,
    #[serde(default)]
    #[builder(default)]
    pub tax_rate: Amount,
}

impl RestaurantInfoProps {
    fn validate(&self) -> Result<()> {
        validate::required("name", &self.name)?;
        validate::max_len("name", &self.name, 200)?;
        validate::required("description", &self.description)?;
        validate::required("phone", &self.phone)?;
        validate::max_len("phone", &self.phone, 20)?;
        validate::required("email", &self.email)?;
        validate::email("email", &self.email)?;
        validate::required("address", &self.address)?;
        validate::required("opening_hours", &self.opening_hours)?;
        validate::url("facebook_url", &self.facebook_url)?;
        validate::url("instagram_url", &self.instagram_url)?;
        validate::url("twitter_url", &self.twitter_url)?;
        validate::max_len("currency_symbol", &self.currency_symbol, 5)?;
        // five digits, two of them decimals
        if self.tax_rate.is_negative() || self.tax_rate.hundredths() >= 100_000 {
            return Err(Error::invalid(
                "tax_rate: Ensure this value is between 0 and 999.99.",
            ));
        }
        Ok(())
    }
}

pub async fn current_restaurant_info(db_conn: &SqlitePool) -> Result<Option<RestaurantInfo>> {
    let sql = format!("{SELECT} AND id = ?");
    let info = sqlx::query_as::<_, RestaurantInfo>(&sql)
        .bind(SINGLETON_ID)
        .fetch_optional(db_conn)
        .await?;
    Ok(info)
}

pub async fn get_restaurant_info(db_conn: &SqlitePool, id: i64) -> Result<RestaurantInfo> {
    let sql = format!("{SELECT} AND id = ?");
    sqlx::query_as::<_, RestaurantInfo>(&sql)
        .bind(id)
        .fetch_optional(db_conn)
        .await?
        .ok_or_else(|| Error::not_found("Not found."))
}

pub async fn list_restaurant_info(db_conn: &SqlitePool, page: Page) -> Result<Paged<RestaurantInfo>> {
    let listing = Listing {
        select: SELECT,
        count: COUNT,
        ordering: &[],
        default_order: &[],
        tiebreak: "id",
    };
    listing.page(db_conn, page, |_| {}).await
}

/// Creates the singleton or replaces every field of it. Returns whether the
/// row was created.
pub async fn put_restaurant_info(db_conn: &SqlitePool, props: &RestaurantInfoProps) -> Result<bool> {
    props.validate()?;
    let existed = current_restaurant_info(db_conn).await?.is_some();
    sqlx::query(
        r#"
INSERT INTO restaurant_info
    (id, name, description, logo, phone, email, address, opening_hours,
     facebook_url, instagram_url, twitter_url, currency_symbol, tax_rate, updated_at)
VALUES
    (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT (id) DO UPDATE SET
    name = excluded.name,
    description = excluded.description,
    logo = excluded.logo,
    phone = excluded.phone,
    email = excluded.email,
    address = excluded.address,
    opening_hours = excluded.opening_hours,
    facebook_url = excluded.facebook_url,
    instagram_url = excluded.instagram_url,
    twitter_url = excluded.twitter_url,
    currency_symbol = excluded.currency_symbol,
    tax_rate = excluded.tax_rate,
    updated_at = excluded.updated_at"#,
    )
    .bind(SINGLETON_ID)
    .bind(&props.name)
    .bind(&props.description)
    .bind(&props.logo)
    .bind(&props.phone)
    .bind(&props.email)
    .bind(&props.address)
    .bind(&props.opening_hours)
    .bind(&props.facebook_url)
    .bind(&props.instagram_url)
    .bind(&props.twitter_url)
    .bind(&props.currency_symbol)
    .bind(props.tax_rate)
    .bind(now())
    .execute(db_conn)
    .await?;
    Ok(!existed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;

    fn props(name: &str) -> RestaurantInfoProps {
        RestaurantInfoPropsBuilder::default()
            .name(name)
            .description("Neapolitan kitchen")
            .phone("+39 081 000")
            .email("ciao@napoli.it")
            .address("Via Toledo 1")
            .opening_hours("Mon-Sun 12:00-23:00")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_creates_then_replaces_singleton() {
        let db = connect_in_memory().await.unwrap();
        assert!(current_restaurant_info(&db).await.unwrap().is_none());
        assert_eq!(list_restaurant_info(&db, Page::first(20)).await.unwrap().count, 0);

        assert!(put_restaurant_info(&db, &props("Da Michele")).await.unwrap());
        let mut second = props("Sorbillo");
        second.tax_rate = "22.00".parse().unwrap();
        assert!(!put_restaurant_info(&db, &second).await.unwrap());

        let info = current_restaurant_info(&db).await.unwrap().unwrap();
        assert_eq!(info.name, "Sorbillo");
        assert_eq!(info.currency_symbol, "€");
        assert_eq!(info.tax_rate.to_string(), "22.00");
        assert_eq!(list_restaurant_info(&db, Page::first(20)).await.unwrap().count, 1);
        assert_eq!(get_restaurant_info(&db, SINGLETON_ID).await.unwrap().name, "Sorbillo");
        assert!(get_restaurant_info(&db, 2).await.is_err());
    }

    #[tokio::test]
    async fn test_second_row_is_impossible() {
        let db = connect_in_memory().await.unwrap();
        put_restaurant_info(&db, &props("Da Michele")).await.unwrap();
        let err = sqlx::query(
            "INSERT INTO restaurant_info (id, name, description, phone, email, address, opening_hours, updated_at) \
             VALUES (2, 'x', 'x', 'x', 'x', 'x', 'x', 'x')",
        )
        .execute(&db)
        .await
        .unwrap_err();
        assert!(matches!(Error::from(err), Error::Invalid(_)));
    }

    #[tokio::test]
    async fn test_validation() {
        let db = connect_in_memory().await.unwrap();
        let mut bad = props("Da Michele");
        bad.facebook_url = "facebook.com/michele".to_string();
        assert!(put_restaurant_info(&db, &bad).await.is_err());

        let mut bad = props("Da Michele");
        bad.tax_rate = "1000".parse().unwrap();
        assert!(put_restaurant_info(&db, &bad).await.is_err());
        assert!(current_restaurant_info(&db).await.unwrap().is_none());
    }
}
