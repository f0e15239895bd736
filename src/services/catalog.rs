use crate::{
    db::DbPool,
    entities::product::{self, Entity as ProductEntity, StringList},
    entities::product_variant::{self, Entity as VariantEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::money::validate_positive,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_percent(value: &Decimal) -> Result<(), ValidationError> {
    if *value >= Decimal::ZERO && *value <= Decimal::ONE_HUNDRED {
        Ok(())
    } else {
        Err(ValidationError::new("percent_out_of_range"))
    }
}

fn validate_rating(value: &Decimal) -> Result<(), ValidationError> {
    if *value >= Decimal::ZERO && *value <= Decimal::from(5) {
        Ok(())
    } else {
        Err(ValidationError::new("rating_out_of_range"))
    }
}

fn validate_image_urls(images: &Vec<String>) -> Result<(), ValidationError> {
    let all_http = images.iter().all(|raw| {
        url::Url::parse(raw)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false)
    });
    if all_http {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_image_url"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VariantInput {
    #[validate(length(min = 1, message = "Size is required"))]
    pub size: String,
    #[validate(length(min = 1, message = "Color is required"))]
    pub color: String,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
    #[validate(custom = "validate_positive")]
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[validate(length(min = 3, max = 100))]
    pub name: String,
    #[validate(length(min = 10))]
    pub description: String,
    #[validate(length(min = 3))]
    pub category: String,
    #[validate(custom = "validate_positive")]
    pub price: Decimal,
    #[serde(default)]
    #[validate(custom = "validate_percent")]
    pub discount: Decimal,
    /// Absolute http(s) URLs; the placeholder image is used when empty
    #[serde(default)]
    #[validate(custom = "validate_image_urls")]
    pub images: Vec<String>,
    #[serde(default)]
    #[validate(custom = "validate_rating")]
    pub rating: Decimal,
    pub brand: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub variants: Vec<VariantInput>,
}

impl CreateProductRequest {
    /// Field rules plus the per-variant rules and (size, color) uniqueness.
    pub fn validate_all(&self) -> Result<(), ServiceError> {
        self.validate()?;
        let mut seen = HashSet::new();
        for variant in &self.variants {
            variant.validate()?;
            if !seen.insert((variant.size.as_str(), variant.color.as_str())) {
                return Err(ServiceError::ValidationError(format!(
                    "Duplicate variant Size: {}, Color: {}",
                    variant.size, variant.color
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VariantView {
    pub id: Uuid,
    pub size: String,
    pub color: String,
    pub stock: i32,
    pub price: Decimal,
}

impl From<product_variant::Model> for VariantView {
    fn from(v: product_variant::Model) -> Self {
        Self {
            id: v.id,
            size: v.size,
            color: v.color,
            stock: v.stock,
            price: v.price,
        }
    }
}

/// A product as served to clients, variants in display order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: Decimal,
    pub discount: Decimal,
    pub images: Vec<String>,
    pub rating: Decimal,
    pub brand: Option<String>,
    pub tags: Vec<String>,
    /// Sum of variant stock
    pub stock_quantity: i64,
    pub variants: Vec<VariantView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductView {
    pub fn new(product: product::Model, mut variants: Vec<product_variant::Model>) -> Self {
        variants.sort_by_key(|v| v.position);
        let stock_quantity = stock_quantity(&variants);
        Self {
            id: product.id,
            name: product.name,
            description: product.description,
            category: product.category,
            price: product.price,
            discount: product.discount,
            images: product.images.0,
            rating: product.rating,
            brand: product.brand,
            tags: product.tags.0,
            stock_quantity,
            variants: variants.into_iter().map(VariantView::from).collect(),
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

/// Aggregate stock is never stored; it is always the sum over variants.
pub fn stock_quantity(variants: &[product_variant::Model]) -> i64 {
    variants.iter().map(|v| i64::from(v.stock.max(0))).sum()
}

#[derive(Clone)]
pub struct CatalogService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    default_image: String,
}

impl CatalogService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, default_image: String) -> Self {
        Self {
            db_pool,
            event_sender,
            default_image,
        }
    }

    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<ProductView>, ServiceError> {
        let rows = ProductEntity::find()
            .find_with_related(VariantEntity)
            .order_by_desc(product::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?;

        if rows.is_empty() {
            return Err(ServiceError::NotFound("No products found".to_string()));
        }

        Ok(rows
            .into_iter()
            .map(|(p, variants)| ProductView::new(p, variants))
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductView, ServiceError> {
        let db = &*self.db_pool;
        let product = ProductEntity::find_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))?;
        let variants = VariantEntity::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .all(db)
            .await?;
        Ok(ProductView::new(product, variants))
    }

    #[instrument(skip(self, request), fields(name = %request.name, variants = request.variants.len()))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<ProductView, ServiceError> {
        request.validate_all()?;

        let product_id = Uuid::new_v4();
        let images = if request.images.is_empty() {
            vec![self.default_image.clone()]
        } else {
            request.images
        };

        let txn = self.db_pool.begin().await?;

        let product = product::ActiveModel {
            id: Set(product_id),
            name: Set(request.name),
            description: Set(request.description),
            category: Set(request.category),
            price: Set(request.price),
            discount: Set(request.discount),
            images: Set(StringList(images)),
            rating: Set(request.rating),
            brand: Set(request.brand),
            tags: Set(StringList(request.tags)),
            ..Default::default()
        };
        let product = product.insert(&txn).await?;

        let mut variants = Vec::with_capacity(request.variants.len());
        for (position, input) in request.variants.into_iter().enumerate() {
            let variant = product_variant::Model {
                id: Uuid::new_v4(),
                product_id,
                size: input.size,
                color: input.color,
                stock: input.stock,
                price: input.price,
                position: position as i32,
            };
            VariantEntity::insert(product_variant::ActiveModel::from(variant.clone()))
                .exec_without_returning(&txn)
                .await?;
            variants.push(variant);
        }

        txn.commit().await?;

        info!(%product_id, "product created");
        self.event_sender
            .send_or_log(Event::ProductCreated(product_id))
            .await;

        Ok(ProductView::new(product, variants))
    }

    #[instrument(skip(self))]
    pub async fn delete_product(&self, product_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db_pool.begin().await?;

        VariantEntity::delete_many()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .exec(&txn)
            .await?;
        let result = ProductEntity::delete_by_id(product_id).exec(&txn).await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Err(ServiceError::not_found("Product", product_id));
        }
        txn.commit().await?;

        info!(%product_id, "product deleted");
        self.event_sender
            .send_or_log(Event::ProductDeleted(product_id))
            .await;
        Ok(())
    }
}
