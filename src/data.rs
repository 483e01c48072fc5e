use chrono::{DateTime, Utc};
use serde::{ser::SerializeStruct, Deserialize, Serialize, Serializer};

use crate::money::Amount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SpiceLevel {
    #[default]
    None,
    Mild,
    Medium,
    Hot,
    ExtraHot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum CustomizationType {
    Size,
    Extra,
    Side,
    Sauce,
    Other,
}

/// What a review is about. Product and branch reviews carry a target row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ReviewCategory {
    Branch,
    Service,
    Product,
    #[default]
    Other,
}

impl ReviewCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::Branch => "Branch/Location",
            Self::Service => "Service/Staff",
            Self::Product => "Product/Food",
            Self::Other => "Other",
        }
    }
}

/// Mean of the approved ratings, rounded to one decimal place with ties to
/// even.
pub fn round_rating(average: Option<f64>) -> Option<f64> {
    average.map(|avg| (avg * 10.0).round_ties_even() / 10.0)
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    #[serde(rename = "order")]
    pub display_order: i64,
    pub is_active: bool,
    /// available items only
    pub item_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A menu item row joined with its category name and approved review stats.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MenuItem {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub category_id: i64,
    pub category_name: String,
    pub price: Amount,
    pub image: Option<String>,
    pub video: Option<String>,
    pub model_3d: Option<String>,
    pub video_thumbnail: Option<String>,
    pub spice_level: SpiceLevel,
    pub is_vegetarian: bool,
    pub is_vegan: bool,
    pub is_gluten_free: bool,
    pub contains_nuts: bool,
    pub is_available: bool,
    pub is_featured: bool,
    pub preparation_time: Option<i64>,
    pub calories: Option<i64>,
    pub display_order: i64,
    pub average_rating: Option<f64>,
    pub review_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lightweight shape used by every list of menu items.
#[derive(Debug, Clone, Serialize)]
pub struct MenuItemSummary {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub category: i64,
    pub category_name: String,
    pub price: Amount,
    pub image: Option<String>,
    pub video: Option<String>,
    pub video_thumbnail: Option<String>,
    pub spice_level: SpiceLevel,
    pub is_vegetarian: bool,
    pub is_vegan: bool,
    pub is_gluten_free: bool,
    pub contains_nuts: bool,
    pub is_available: bool,
    pub is_featured: bool,
    pub preparation_time: Option<i64>,
    pub calories: Option<i64>,
    pub average_rating: Option<f64>,
}

impl From<MenuItem> for MenuItemSummary {
    fn from(item: MenuItem) -> Self {
        Self {
            id: item.id,
            name: item.name,
            description: item.description,
            category: item.category_id,
            category_name: item.category_name,
            price: item.price,
            image: item.image,
            video: item.video,
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
            average_rating: item.average_rating,
        }
    }
}

/// Everything the item page needs in one document.
#[derive(Debug, Clone, Serialize)]
pub struct MenuItemDetail {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub price: Amount,
    pub image: Option<String>,
    pub video: Option<String>,
    pub model_3d: Option<String>,
    pub video_thumbnail: Option<String>,
    pub spice_level: SpiceLevel,
    pub is_vegetarian: bool,
    pub is_vegan: bool,
    pub is_gluten_free: bool,
    pub contains_nuts: bool,
    pub is_available: bool,
    pub is_featured: bool,
    pub preparation_time: Option<i64>,
    pub calories: Option<i64>,
    pub order: i64,
    pub ingredients: Vec<ItemIngredient>,
    pub customizations: Vec<Customization>,
    pub reviews: Vec<Review>,
    pub average_rating: Option<f64>,
    pub review_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub is_allergen: bool,
    #[serde(skip_serializing)]
    pub origin: String,
    #[serde(skip_serializing)]
    pub nutritional_info: String,
    #[serde(skip_serializing)]
    pub supplier: String,
    #[serde(skip_serializing)]
    pub seasonal: bool,
    #[serde(skip_serializing)]
    pub organic: bool,
    #[serde(skip_serializing)]
    pub image: Option<String>,
    #[serde(skip_serializing)]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngredientRef {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub is_allergen: bool,
}

/// An ingredient as used by one menu item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemIngredient {
    pub id: i64,
    pub ingredient: IngredientRef,
    pub quantity: String,
    pub is_optional: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct IngredientUsage {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub price: Amount,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngredientDetails {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub origin: String,
    pub nutritional_info: String,
    pub supplier: String,
    pub is_seasonal: bool,
    pub is_organic: bool,
    pub is_allergen: bool,
    pub image: Option<String>,
    pub used_in_menu_items: Vec<IngredientUsage>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Customization {
    pub id: i64,
    pub name: String,
    pub customization_type: CustomizationType,
    pub price_modifier: Amount,
    pub is_active: bool,
    #[serde(skip_serializing)]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Review {
    pub id: i64,
    pub category: ReviewCategory,
    pub menu_item_id: Option<i64>,
    pub menu_item_name: Option<String>,
    pub branch_id: Option<i64>,
    pub branch_name: Option<String>,
    pub customer_name: String,
    pub rating: i64,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub is_approved: bool,
}

impl Serialize for Review {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Review", 12)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("category", &self.category)?;
        s.serialize_field("category_display", self.category.label())?;
        s.serialize_field("menu_item", &self.menu_item_id)?;
        s.serialize_field("menu_item_name", &self.menu_item_name)?;
        s.serialize_field("branch", &self.branch_id)?;
        s.serialize_field("branch_name", &self.branch_name)?;
        s.serialize_field("customer_name", &self.customer_name)?;
        s.serialize_field("rating", &self.rating)?;
        s.serialize_field("comment", &self.comment)?;
        s.serialize_field("created_at", &self.created_at)?;
        s.serialize_field("is_approved", &self.is_approved)?;
        s.end()
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Branch {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub city: String,
    pub phone: String,
    pub email: String,
    pub image: Option<String>,
    pub opening_hours: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_active: bool,
    pub review_count: i64,
    pub average_rating: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RestaurantInfo {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub logo: Option<String>,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub opening_hours: String,
    pub facebook_url: String,
    pub instagram_url: String,
    pub twitter_url: String,
    pub currency_symbol: String,
    pub tax_rate: Amount,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    #[serde(serialize_with = "id_as_string")]
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(rename = "is_admin")]
    pub is_staff: bool,
    #[serde(rename = "is_superadmin")]
    pub is_superuser: bool,
    #[serde(skip_serializing)]
    pub is_active: bool,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub date_joined: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub last_login: Option<DateTime<Utc>>,
}

// the mobile client stores user ids as strings
fn id_as_string<S: Serializer>(id: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(id)
}
