use derive_builder::Builder;
use serde::Deserialize;
use sqlx::sqlite::SqlitePool;

use super::{ensure_affected, now, nullable, Listing};
use crate::{
    data::{round_rating, Branch},
    error::{Error, Result},
    query::{push_search, ListParams, Page, Paged, SortKey},
    validate,
};

const SELECT: &str = r#"
SELECT
    b.id, b.name, b.address, b.city, b.phone, b.email, b.image, b.opening_hours,
    b.latitude, b.longitude, b.is_active,
    (SELECT COUNT(*) FROM review r WHERE r.branch_id = b.id AND r.is_approved = 1) AS review_count,
    (SELECT AVG(r.rating) FROM review r WHERE r.branch_id = b.id AND r.is_approved = 1) AS average_rating,
    b.created_at, b.updated_at
FROM branch b
WHERE 1 = 1"#;

const COUNT: &str = "SELECT COUNT(*) FROM branch b WHERE 1 = 1";

pub const ORDERING_FIELDS: &[(&str, &str)] = &[
    ("name", "b.name"),
    ("city", "b.city"),
    ("created_at", "b.created_at"),
];

const DEFAULT_ORDER: &[SortKey] = &[SortKey::asc("b.name")];

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Builder)]
pub struct BranchProps {
    #[builder(setter(into))]
    pub name: String,
    #[builder(setter(into))]
    pub address: String,
    #[builder(setter(into))]
    pub city: String,
    #[serde(default)]
    #[builder(setter(into), default)]
    pub phone: String,
    #[serde(default)]
    #[builder(setter(into), default)]
    pub email: String,
    #[serde(default)]
    #[builder(setter(into, strip_option), default)]
    pub image: Option<String>,
    #[serde(default)]
    #[builder(setter(into), default)]
    pub opening_hours: String,
    #[serde(default)]
    #[builder(setter(strip_option), default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    #[builder(setter(strip_option), default)]
    pub longitude: Option<f64>,
    #[serde(default = "yes")]
    #[builder(default = "true")]
    pub is_active: bool,
}

impl BranchProps {
    fn validate(&self) -> Result<()> {
        validate::required("name", &self.name)?;
        validate::max_len("name", &self.name, 200)?;
        validate::required("address", &self.address)?;
        validate::required("city", &self.city)?;
        validate::max_len("city", &self.city, 100)?;
        validate::max_len("phone", &self.phone, 20)?;
        validate::email("email", &self.email)?;
        if let Some(latitude) = self.latitude {
            validate::range("latitude", latitude, -90.0, 90.0)?;
        }
        if let Some(longitude) = self.longitude {
            validate::range("longitude", longitude, -180.0, 180.0)?;
        }
        Ok(())
    }
}

impl From<Branch> for BranchProps {
    fn from(b: Branch) -> Self {
        Self {
            name: b.name,
            address: b.address,
            city: b.city,
            phone: b.phone,
            email: b.email,
            image: b.image,
            opening_hours: b.opening_hours,
            latitude: b.latitude,
            longitude: b.longitude,
            is_active: b.is_active,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BranchPatch {
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub image: Option<Option<String>>,
    pub opening_hours: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub latitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub longitude: Option<Option<f64>>,
    pub is_active: Option<bool>,
}

impl BranchPatch {
    pub fn apply(self, p: &mut BranchProps) {
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    p.$field = value;
                })*
            };
        }
        merge!(
            name,
            address,
            city,
            phone,
            email,
            image,
            opening_hours,
            latitude,
            longitude,
            is_active,
        );
    }
}

#[derive(Debug, Clone, Default, Builder)]
#[builder(default)]
pub struct ListBranchProps {
    #[builder(setter(into, strip_option))]
    pub search: Option<String>,
    pub ordering: Vec<SortKey>,
    pub include_inactive: bool,
}

impl ListBranchProps {
    pub fn from_params(params: &ListParams, include_inactive: bool) -> Self {
        Self {
            search: params.search(),
            ordering: params.ordering(ORDERING_FIELDS),
            include_inactive,
        }
    }
}

fn finish(mut branch: Branch) -> Branch {
    branch.average_rating = round_rating(branch.average_rating);
    branch
}

pub async fn add_branch(db_conn: &SqlitePool, props: &BranchProps) -> Result<i64> {
    props.validate()?;
    let ts = now();
    let id = sqlx::query(
        r#"
INSERT INTO branch
    (name, address, city, phone, email, image, opening_hours, latitude, longitude,
     is_active, created_at, updated_at)
VALUES
    (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&props.name)
    .bind(&props.address)
    .bind(&props.city)
    .bind(&props.phone)
    .bind(&props.email)
    .bind(&props.image)
    .bind(&props.opening_hours)
    .bind(props.latitude)
    .bind(props.longitude)
    .bind(props.is_active)
    .bind(ts)
    .bind(ts)
    .execute(db_conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn get_branch(db_conn: &SqlitePool, id: i64, include_inactive: bool) -> Result<Branch> {
    let sql = format!("{SELECT} AND b.id = ? AND (b.is_active = 1 OR ?)");
    sqlx::query_as::<_, Branch>(&sql)
        .bind(id)
        .bind(include_inactive)
        .fetch_optional(db_conn)
        .await?
        .map(finish)
        .ok_or_else(|| Error::not_found("Not found."))
}

pub async fn list_branches(
    db_conn: &SqlitePool,
    props: &ListBranchProps,
    page: Page,
) -> Result<Paged<Branch>> {
    let listing = Listing {
        select: SELECT,
        count: COUNT,
        ordering: &props.ordering,
        default_order: DEFAULT_ORDER,
        tiebreak: "b.id",
    };
    let paged = listing
        .page(db_conn, page, |qb| {
            if !props.include_inactive {
                qb.push(" AND b.is_active = 1");
            }
            if let Some(search) = &props.search {
                push_search(qb, &["b.name", "b.city", "b.address"], search);
            }
        })
        .await?;
    Ok(paged.map(finish))
}

pub async fn update_branch(db_conn: &SqlitePool, id: i64, props: &BranchProps) -> Result<()> {
    props.validate()?;
    let rows = sqlx::query(
        r#"
UPDATE branch
SET name = ?, address = ?, city = ?, phone = ?, email = ?, image = ?, opening_hours = ?,
    latitude = ?, longitude = ?, is_active = ?, updated_at = ?
WHERE id = ?"#,
    )
    .bind(&props.name)
    .bind(&props.address)
    .bind(&props.city)
    .bind(&props.phone)
    .bind(&props.email)
    .bind(&props.image)
    .bind(&props.opening_hours)
    .bind(props.latitude)
    .bind(props.longitude)
    .bind(props.is_active)
    .bind(now())
    .bind(id)
    .execute(db_conn)
    .await?
    .rows_affected();
    ensure_affected(rows)
}

pub async fn delete_branch(db_conn: &SqlitePool, id: i64) -> Result<()> {
    let rows = sqlx::query("DELETE FROM branch WHERE id = ?")
        .bind(id)
        .execute(db_conn)
        .await?
        .rows_affected();
    ensure_affected(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::ReviewCategory,
        db::{
            connect_in_memory,
            review::{add_review, reviews_for_branch, set_review_approval, ReviewPropsBuilder},
        },
    };

    fn props(name: &str, city: &str) -> BranchProps {
        BranchPropsBuilder::default()
            .name(name)
            .address(format!("Via {name} 1"))
            .city(city)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_review_stats() {
        let db = connect_in_memory().await.unwrap();
        let id = add_branch(&db, &props("Centro", "Napoli")).await.unwrap();

        let fresh = get_branch(&db, id, false).await.unwrap();
        assert_eq!(fresh.review_count, 0);
        assert_eq!(fresh.average_rating, None);

        for (rating, approve) in [(5, true), (2, true), (1, false)] {
            let review = ReviewPropsBuilder::default()
                .category(ReviewCategory::Branch)
                .branch(id)
                .customer_name("Luca")
                .rating(rating)
                .build()
                .unwrap();
            let rid = add_review(&db, &review).await.unwrap();
            if approve {
                set_review_approval(&db, rid, true).await.unwrap();
            }
        }

        let branch = get_branch(&db, id, false).await.unwrap();
        assert_eq!(branch.review_count, 2);
        assert_eq!(branch.average_rating, Some(3.5));
        let reviews = reviews_for_branch(&db, id).await.unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].branch_name.as_deref(), Some("Centro"));
    }

    #[tokio::test]
    async fn test_search_and_visibility() {
        let db = connect_in_memory().await.unwrap();
        add_branch(&db, &props("Centro", "Napoli")).await.unwrap();
        add_branch(&db, &props("Navigli", "Milano")).await.unwrap();
        let mut closed = props("Porto", "Genova");
        closed.is_active = false;
        let closed = add_branch(&db, &closed).await.unwrap();

        let params = ListParams::new([("search", "milano")]);
        let found = list_branches(&db, &ListBranchProps::from_params(&params, false), Page::first(20))
            .await
            .unwrap();
        assert_eq!(found.count, 1);
        assert_eq!(found.items[0].name, "Navigli");

        let public = list_branches(&db, &ListBranchProps::default(), Page::first(20))
            .await
            .unwrap();
        assert_eq!(public.count, 2);
        assert!(get_branch(&db, closed, false).await.is_err());
        assert!(get_branch(&db, closed, true).await.is_ok());
    }

    #[tokio::test]
    async fn test_validation() {
        let db = connect_in_memory().await.unwrap();
        let mut bad = props("Centro", "Napoli");
        bad.latitude = Some(91.0);
        assert!(matches!(add_branch(&db, &bad).await, Err(Error::Invalid(_))));

        let mut bad = props("Centro", "Napoli");
        bad.email = "not-an-email".to_string();
        assert!(matches!(add_branch(&db, &bad).await, Err(Error::Invalid(_))));

        let mut ok = props("Centro", "Napoli");
        ok.latitude = Some(40.851_775);
        ok.longitude = Some(14.268_124);
        let id = add_branch(&db, &ok).await.unwrap();

        let mut current: BranchProps = get_branch(&db, id, false).await.unwrap().into();
        let patch: BranchPatch = serde_json::from_str(r#"{"longitude": null, "phone": "+39 081"}"#).unwrap();
        patch.apply(&mut current);
        update_branch(&db, id, &current).await.unwrap();
        let updated = get_branch(&db, id, false).await.unwrap();
        assert_eq!(updated.longitude, None);
        assert_eq!(updated.latitude, Some(40.851_775));
        assert_eq!(updated.phone, "+39 081");

        delete_branch(&db, id).await.unwrap();
    }
}
