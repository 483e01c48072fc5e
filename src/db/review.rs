use derive_builder::Builder;
use serde::Deserialize;
use sqlx::sqlite::SqlitePool;

use super::{ensure_affected, now, nullable, Listing};
use crate::{
    data::{Review, ReviewCategory},
    error::{Error, Result},
    query::{parse_choice, ListParams, Page, Paged, SortKey},
    validate,
};

const SELECT: &str = r#"
SELECT
    r.id, r.category, r.menu_item_id, m.name AS menu_item_name,
    r.branch_id, b.name AS branch_name, r.customer_name, r.rating, r.comment,
    r.created_at, r.is_approved
FROM review r
LEFT JOIN menu_item m ON m.id = r.menu_item_id
LEFT JOIN branch b ON b.id = r.branch_id
WHERE 1 = 1"#;

const COUNT: &str = "SELECT COUNT(*) FROM review r WHERE 1 = 1";

pub const ORDERING_FIELDS: &[(&str, &str)] = &[("created_at", "r.created_at"), ("rating", "r.rating")];

const DEFAULT_ORDER: &[SortKey] = &[SortKey::desc("r.created_at")];

// newest first among equal timestamps too
const TIEBREAK: &str = "r.id DESC";

fn listing(ordering: &[SortKey]) -> Listing<'_> {
    Listing {
        select: SELECT,
        count: COUNT,
        ordering,
        default_order: DEFAULT_ORDER,
        tiebreak: TIEBREAK,
    }
}

fn check_rating(rating: i64) -> Result<()> {
    if !(1..=5).contains(&rating) {
        return Err(Error::invalid("Rating must be between 1 and 5"));
    }
    Ok(())
}

/// Body of a review create or full update. Approval is never taken from
/// the body.
#[derive(Debug, Clone, Deserialize, Builder)]
pub struct ReviewProps {
    #[serde(default)]
    #[builder(default)]
    pub category: ReviewCategory,
    #[serde(default)]
    #[builder(setter(strip_option), default)]
    pub menu_item: Option<i64>,
    #[serde(default)]
    #[builder(setter(strip_option), default)]
    pub branch: Option<i64>,
    #[builder(setter(into))]
    pub customer_name: String,
    pub rating: i64,
    #[serde(default)]
    #[builder(setter(into), default)]
    pub comment: String,
}

impl ReviewProps {
    fn validate(&self) -> Result<()> {
        validate::required("customer_name", &self.customer_name)?;
        validate::max_len("customer_name", &self.customer_name, 100)?;
        check_rating(self.rating)?;
        match self.category {
            ReviewCategory::Product if self.menu_item.is_none() => {
                Err(Error::invalid("Menu item is required for product reviews"))
            }
            ReviewCategory::Branch if self.branch.is_none() => {
                Err(Error::invalid("Branch is required for branch reviews"))
            }
            _ => Ok(()),
        }
    }
}

impl From<Review> for ReviewProps {
    fn from(r: Review) -> Self {
        Self {
            category: r.category,
            menu_item: r.menu_item_id,
            branch: r.branch_id,
            customer_name: r.customer_name,
            rating: r.rating,
            comment: r.comment,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewPatch {
    pub category: Option<ReviewCategory>,
    #[serde(default, deserialize_with = "nullable")]
    pub menu_item: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub branch: Option<Option<i64>>,
    pub customer_name: Option<String>,
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

impl ReviewPatch {
    pub fn apply(self, props: &mut ReviewProps) {
        if let Some(category) = self.category {
            props.category = category;
        }
        if let Some(menu_item) = self.menu_item {
            props.menu_item = menu_item;
        }
        if let Some(branch) = self.branch {
            props.branch = branch;
        }
        if let Some(name) = self.customer_name {
            props.customer_name = name;
        }
        if let Some(rating) = self.rating {
            props.rating = rating;
        }
        if let Some(comment) = self.comment {
            props.comment = comment;
        }
    }
}

#[derive(Debug, Clone, Default, Builder)]
#[builder(default)]
pub struct ListReviewProps {
    #[builder(setter(strip_option))]
    pub menu_item: Option<i64>,
    #[builder(setter(strip_option))]
    pub branch: Option<i64>,
    #[builder(setter(strip_option))]
    pub category: Option<ReviewCategory>,
    #[builder(setter(strip_option))]
    pub rating: Option<i64>,
    pub approved_only: bool,
    pub ordering: Vec<SortKey>,
}

impl ListReviewProps {
    pub fn from_params(params: &ListParams, approved_only: bool) -> Result<Self> {
        Ok(Self {
            menu_item: params.id("menu_item")?,
            branch: params.id("branch")?,
            category: params.choice("category")?,
            rating: params.id("rating")?,
            approved_only,
            ordering: params.ordering(ORDERING_FIELDS),
        })
    }
}

/// Stores a new review awaiting approval.
pub async fn add_review(db_conn: &SqlitePool, props: &ReviewProps) -> Result<i64> {
    props.validate()?;
    let id = sqlx::query(
        r#"
INSERT INTO review
    (category, menu_item_id, branch_id, customer_name, rating, comment, created_at, is_approved)
VALUES
    (?, ?, ?, ?, ?, ?, ?, 0)"#,
    )
    .bind(props.category)
    .bind(props.menu_item)
    .bind(props.branch)
    .bind(&props.customer_name)
    .bind(props.rating)
    .bind(&props.comment)
    .bind(now())
    .execute(db_conn)
    .await?
    .last_insert_rowid();
    tracing::debug!("review {id} stored, pending approval");
    Ok(id)
}

pub async fn get_review(db_conn: &SqlitePool, id: i64, include_unapproved: bool) -> Result<Review> {
    let sql = format!("{SELECT} AND r.id = ? AND (r.is_approved = 1 OR ?)");
    sqlx::query_as::<_, Review>(&sql)
        .bind(id)
        .bind(include_unapproved)
        .fetch_optional(db_conn)
        .await?
        .ok_or_else(|| Error::not_found("Not found."))
}

pub async fn list_reviews(
    db_conn: &SqlitePool,
    props: &ListReviewProps,
    page: Page,
) -> Result<Paged<Review>> {
    listing(&props.ordering)
        .page(db_conn, page, |qb| {
            if props.approved_only {
                qb.push(" AND r.is_approved = 1");
            }
            if let Some(menu_item) = props.menu_item {
                qb.push(" AND r.menu_item_id = ").push_bind(menu_item);
            }
            if let Some(branch) = props.branch {
                qb.push(" AND r.branch_id = ").push_bind(branch);
            }
            if let Some(category) = props.category {
                qb.push(" AND r.category = ").push_bind(category);
            }
            if let Some(rating) = props.rating {
                qb.push(" AND r.rating = ").push_bind(rating);
            }
        })
        .await
}

/// Approved reviews of a menu item, newest first, at most `limit` of them.
pub async fn reviews_for_menu_item(
    db_conn: &SqlitePool,
    menu_item: i64,
    limit: Option<i64>,
) -> Result<Vec<Review>> {
    listing(&[])
        .first(db_conn, limit, |qb| {
            qb.push(" AND r.is_approved = 1 AND r.menu_item_id = ")
                .push_bind(menu_item);
        })
        .await
}

pub async fn reviews_for_branch(db_conn: &SqlitePool, branch: i64) -> Result<Vec<Review>> {
    listing(&[])
        .all(db_conn, |qb| {
            qb.push(" AND r.is_approved = 1 AND r.branch_id = ")
                .push_bind(branch);
        })
        .await
}

pub async fn approved_reviews_by_category(
    db_conn: &SqlitePool,
    category: Option<ReviewCategory>,
) -> Result<Vec<Review>> {
    listing(&[])
        .all(db_conn, |qb| {
            qb.push(" AND r.is_approved = 1");
            if let Some(category) = category {
                qb.push(" AND r.category = ").push_bind(category);
            }
        })
        .await
}

pub async fn update_review(db_conn: &SqlitePool, id: i64, props: &ReviewProps) -> Result<()> {
    props.validate()?;
    let rows = sqlx::query(
        r#"
UPDATE review
SET category = ?, menu_item_id = ?, branch_id = ?, customer_name = ?, rating = ?, comment = ?
WHERE id = ?"#,
    )
    .bind(props.category)
    .bind(props.menu_item)
    .bind(props.branch)
    .bind(&props.customer_name)
    .bind(props.rating)
    .bind(&props.comment)
    .bind(id)
    .execute(db_conn)
    .await?
    .rows_affected();
    ensure_affected(rows)
}

pub async fn set_review_approval(db_conn: &SqlitePool, id: i64, approved: bool) -> Result<()> {
    let rows = sqlx::query("UPDATE review SET is_approved = ? WHERE id = ?")
        .bind(approved)
        .bind(id)
        .execute(db_conn)
        .await?
        .rows_affected();
    ensure_affected(rows)
}

pub async fn delete_review(db_conn: &SqlitePool, id: i64) -> Result<()> {
    let rows = sqlx::query("DELETE FROM review WHERE id = ?")
        .bind(id)
        .execute(db_conn)
        .await?
        .rows_affected();
    ensure_affected(rows)
}

/// A JSON scalar that clients send either as a number or as a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Loose {
    Int(i64),
    Text(String),
    Float(f64),
    Bool(bool),
}

impl Loose {
    /// `None` for values a client would consider empty: `0`, `""`, `false`.
    fn present(&self) -> Option<&Self> {
        match self {
            Self::Int(0) | Self::Bool(false) => None,
            Self::Text(s) if s.is_empty() => None,
            Self::Float(f) if *f == 0.0 => None,
            _ => Some(self),
        }
    }

    fn to_int(&self, field: &str) -> Result<i64> {
        let invalid = || Error::Invalid(format!("{field}: A valid integer is required."));
        match self {
            Self::Int(n) => Ok(*n),
            Self::Text(s) => s.trim().parse().map_err(|_| invalid()),
            Self::Float(f) if f.fract() == 0.0 => Ok(*f as i64),
            Self::Bool(b) => Ok(i64::from(*b)),
            Self::Float(_) => Err(invalid()),
        }
    }
}

/// Body of the public review form. Targets are given by id and only the one
/// matching the category is kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitReviewProps {
    pub category: Option<String>,
    pub menu_item_id: Option<Loose>,
    pub branch_id: Option<Loose>,
    pub customer_name: Option<String>,
    pub rating: Option<Loose>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct SubmittedReview {
    pub review_id: i64,
    pub category: ReviewCategory,
}

async fn exists(db_conn: &SqlitePool, table: &str, id: i64) -> Result<bool> {
    let sql = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = ?)");
    let found: bool = sqlx::query_scalar(&sql).bind(id).fetch_one(db_conn).await?;
    Ok(found)
}

pub async fn submit_review(
    db_conn: &SqlitePool,
    props: SubmitReviewProps,
) -> Result<SubmittedReview> {
    let customer_name = props.customer_name.filter(|n| !n.is_empty());
    let rating = props.rating.as_ref().and_then(Loose::present);
    let (Some(customer_name), Some(rating)) = (customer_name, rating) else {
        return Err(Error::invalid("Please provide customer_name and rating"));
    };
    let rating = rating.to_int("rating")?;
    check_rating(rating)?;

    let category = match props.category.as_deref() {
        None => ReviewCategory::Other,
        Some(raw) => parse_choice::<ReviewCategory>("category", raw).map_err(|_| {
            Error::invalid("Invalid category. Must be: branch, service, product, or other")
        })?,
    };

    let mut menu_item = None;
    let mut branch = None;
    match category {
        ReviewCategory::Product => {
            let Some(id) = props.menu_item_id.as_ref().and_then(Loose::present) else {
                return Err(Error::invalid("menu_item_id is required for product reviews"));
            };
            let id = id.to_int("menu_item_id")?;
            if !exists(db_conn, "menu_item", id).await? {
                return Err(Error::not_found("Menu item not found"));
            }
            menu_item = Some(id);
        }
        ReviewCategory::Branch => {
            let Some(id) = props.branch_id.as_ref().and_then(Loose::present) else {
                return Err(Error::invalid("branch_id is required for branch reviews"));
            };
            let id = id.to_int("branch_id")?;
            if !exists(db_conn, "branch", id).await? {
                return Err(Error::not_found("Branch not found"));
            }
            branch = Some(id);
        }
        ReviewCategory::Service | ReviewCategory::Other => {}
    }

    let review = ReviewProps {
        category,
        menu_item,
        branch,
        customer_name,
        rating,
        comment: props.comment.unwrap_or_default(),
    };
    let review_id = add_review(db_conn, &review).await?;
    Ok(SubmittedReview {
        review_id,
        category,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        branch::{add_branch, BranchPropsBuilder},
        category::{add_category, CategoryPropsBuilder},
        connect_in_memory,
        menu_item::{add_menu_item, get_menu_item, MenuItemPropsBuilder},
    };

    async fn menu_item(db: &SqlitePool) -> i64 {
        let cid = add_category(db, &CategoryPropsBuilder::default().name("Pizzas").build().unwrap())
            .await
            .unwrap();
        let item = MenuItemPropsBuilder::default()
            .name("Margherita")
            .description("Tomato and mozzarella")
            .category_id(cid)
            .price("9.00".parse().unwrap())
            .build()
            .unwrap();
        add_menu_item(db, &item).await.unwrap()
    }

    fn submit(body: &str) -> SubmitReviewProps {
        serde_json::from_str(body).unwrap()
    }

    #[tokio::test]
    async fn test_new_reviews_wait_for_approval() {
        let db = connect_in_memory().await.unwrap();
        let item = menu_item(&db).await;
        let props = ReviewPropsBuilder::default()
            .category(ReviewCategory::Product)
            .menu_item(item)
            .customer_name("Jane")
            .rating(5)
            .comment("Great pizza!")
            .build()
            .unwrap();
        let id = add_review(&db, &props).await.unwrap();

        assert!(reviews_for_menu_item(&db, item, None).await.unwrap().is_empty());
        assert!(get_review(&db, id, false).await.is_err());
        let pending = get_review(&db, id, true).await.unwrap();
        assert!(!pending.is_approved);
        assert_eq!(pending.menu_item_name.as_deref(), Some("Margherita"));

        let staff = list_reviews(&db, &ListReviewProps::default(), Page::first(20))
            .await
            .unwrap();
        assert_eq!(staff.count, 1);
        let public = ListReviewPropsBuilder::default()
            .approved_only(true)
            .build()
            .unwrap();
        assert_eq!(list_reviews(&db, &public, Page::first(20)).await.unwrap().count, 0);

        set_review_approval(&db, id, true).await.unwrap();
        assert_eq!(reviews_for_menu_item(&db, item, None).await.unwrap().len(), 1);
        assert_eq!(list_reviews(&db, &public, Page::first(20)).await.unwrap().count, 1);
    }

    async fn approved_product_review(db: &SqlitePool, item: i64, name: &str, rating: i64) {
        let props = ReviewPropsBuilder::default()
            .category(ReviewCategory::Product)
            .menu_item(item)
            .customer_name(name)
            .rating(rating)
            .build()
            .unwrap();
        let id = add_review(db, &props).await.unwrap();
        set_review_approval(db, id, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_item_reviews_limit_keeps_newest() {
        let db = connect_in_memory().await.unwrap();
        let item = menu_item(&db).await;
        for i in 0..7 {
            approved_product_review(&db, item, &format!("Guest {i}"), 5).await;
        }

        let newest = reviews_for_menu_item(&db, item, Some(5)).await.unwrap();
        assert_eq!(newest.len(), 5);
        assert_eq!(newest[0].customer_name, "Guest 6");
        assert_eq!(newest[4].customer_name, "Guest 2");
        assert_eq!(reviews_for_menu_item(&db, item, None).await.unwrap().len(), 7);
        assert!(reviews_for_menu_item(&db, item, Some(0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_item_average_rounds_half_to_even() {
        let db = connect_in_memory().await.unwrap();
        let item = menu_item(&db).await;
        for (name, rating) in [("Ana", 5), ("Ben", 4), ("Cy", 4), ("Dee", 4)] {
            approved_product_review(&db, item, name, rating).await;
        }

        let found = get_menu_item(&db, item).await.unwrap();
        assert_eq!(found.review_count, 4);
        assert_eq!(found.average_rating, Some(4.2));
    }

    #[tokio::test]
    async fn test_target_is_required_by_category() {
        let db = connect_in_memory().await.unwrap();
        let mut props = ReviewPropsBuilder::default()
            .category(ReviewCategory::Product)
            .customer_name("Jane")
            .rating(4)
            .build()
            .unwrap();
        let err = add_review(&db, &props).await.unwrap_err();
        assert_eq!(err.to_string(), "Menu item is required for product reviews");

        props.category = ReviewCategory::Branch;
        let err = add_review(&db, &props).await.unwrap_err();
        assert_eq!(err.to_string(), "Branch is required for branch reviews");

        props.category = ReviewCategory::Service;
        props.rating = 6;
        let err = add_review(&db, &props).await.unwrap_err();
        assert_eq!(err.to_string(), "Rating must be between 1 and 5");

        props.rating = 3;
        props.menu_item = Some(404);
        assert!(matches!(add_review(&db, &props).await, Err(Error::Invalid(_))));
    }

    #[tokio::test]
    async fn test_submit_keeps_only_matching_target() {
        let db = connect_in_memory().await.unwrap();
        let item = menu_item(&db).await;
        let branch = BranchPropsBuilder::default()
            .name("Centro")
            .address("Via Roma 1")
            .city("Napoli")
            .build()
            .unwrap();
        let branch = add_branch(&db, &branch).await.unwrap();

        let body = format!(
            r#"{{"category": "product", "menu_item_id": "{item}", "branch_id": {branch},
                "customer_name": "Jane", "rating": "5"}}"#
        );
        let submitted = submit_review(&db, submit(&body)).await.unwrap();
        assert_eq!(submitted.category, ReviewCategory::Product);
        let review = get_review(&db, submitted.review_id, true).await.unwrap();
        assert_eq!(review.menu_item_id, Some(item));
        assert_eq!(review.branch_id, None);
        assert!(!review.is_approved);

        let service = submit(r#"{"category": "service", "menu_item_id": 1, "customer_name": "Al", "rating": 2}"#);
        let submitted = submit_review(&db, service).await.unwrap();
        let review = get_review(&db, submitted.review_id, true).await.unwrap();
        assert_eq!(review.menu_item_id, None);

        let defaulted = submit(r#"{"customer_name": "Al", "rating": 4}"#);
        let submitted = submit_review(&db, defaulted).await.unwrap();
        assert_eq!(submitted.category, ReviewCategory::Other);
    }

    #[tokio::test]
    async fn test_submit_errors() {
        let db = connect_in_memory().await.unwrap();
        let cases = [
            (r#"{"rating": 5}"#, "Please provide customer_name and rating"),
            (r#"{"customer_name": "Jane", "rating": 0}"#, "Please provide customer_name and rating"),
            (r#"{"customer_name": "Jane", "rating": 9}"#, "Rating must be between 1 and 5"),
            (
                r#"{"customer_name": "Jane", "rating": 3, "category": "food"}"#,
                "Invalid category. Must be: branch, service, product, or other",
            ),
            (
                r#"{"customer_name": "Jane", "rating": 3, "category": "product"}"#,
                "menu_item_id is required for product reviews",
            ),
            (
                r#"{"customer_name": "Jane", "rating": 3, "category": "branch", "branch_id": ""}"#,
                "branch_id is required for branch reviews",
            ),
        ];
        for (body, message) in cases {
            let err = submit_review(&db, submit(body)).await.unwrap_err();
            assert!(matches!(err, Error::Invalid(_)), "{body}");
            assert_eq!(err.to_string(), message);
        }

        let missing = submit(r#"{"customer_name": "Jane", "rating": 3, "category": "product", "menu_item_id": 77}"#);
        let err = submit_review(&db, missing).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.to_string(), "Menu item not found");

        let missing = submit(r#"{"customer_name": "Jane", "rating": 3, "category": "branch", "branch_id": 77}"#);
        let err = submit_review(&db, missing).await.unwrap_err();
        assert_eq!(err.to_string(), "Branch not found");
    }

    #[tokio::test]
    async fn test_by_category_and_ordering() {
        let db = connect_in_memory().await.unwrap();
        for (name, rating, category) in [
            ("A", 2, ReviewCategory::Service),
            ("B", 5, ReviewCategory::Other),
            ("C", 4, ReviewCategory::Service),
        ] {
            let props = ReviewPropsBuilder::default()
                .category(category)
                .customer_name(name)
                .rating(rating)
                .build()
                .unwrap();
            let id = add_review(&db, &props).await.unwrap();
            set_review_approval(&db, id, true).await.unwrap();
        }

        let service = approved_reviews_by_category(&db, Some(ReviewCategory::Service))
            .await
            .unwrap();
        let names: Vec<_> = service.iter().map(|r| r.customer_name.as_str()).collect();
        assert_eq!(names, ["C", "A"]);
        assert_eq!(approved_reviews_by_category(&db, None).await.unwrap().len(), 3);

        let params = ListParams::new([("ordering", "-rating")]);
        let props = ListReviewProps::from_params(&params, true).unwrap();
        let best = list_reviews(&db, &props, Page::first(20)).await.unwrap();
        assert_eq!(best.items[0].customer_name, "B");

        let params = ListParams::new([("rating", "4")]);
        let props = ListReviewProps::from_params(&params, true).unwrap();
        assert_eq!(list_reviews(&db, &props, Page::first(20)).await.unwrap().count, 1);
    }
}
