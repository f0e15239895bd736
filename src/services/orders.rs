use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::address::{self, Entity as AddressEntity},
    entities::address_order,
    entities::order::{self, Entity as OrderEntity, OrderPaymentStatus, OrderStatus},
    entities::order_line::{self, Entity as OrderLineEntity},
    entities::product::{self, Entity as ProductEntity},
    entities::product_variant::{self, Entity as VariantEntity},
    entities::user::{self, Entity as UserEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::addresses::AddressView,
    services::catalog::ProductView,
    services::money::{from_minor_units, line_total, minor_units_of, validate_positive},
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Expected delivery for an order placed at `order_date`.
///
/// Every delivery date in the system is computed here.
pub fn delivery_date(order_date: DateTime<Utc>, lead_days: i64) -> DateTime<Utc> {
    order_date + Duration::days(lead_days)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct VariantSelection {
    #[validate(length(min = 1, message = "Size is required"))]
    pub size: String,
    #[validate(length(min = 1, message = "Color is required"))]
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    /// Ignored; the catalog name is snapshotted instead
    #[serde(default)]
    pub name: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
    /// Unit price the client displayed
    #[validate(custom = "validate_positive")]
    pub price: Decimal,
    pub variant: VariantSelection,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, message = "An order needs at least one product"))]
    pub products: Vec<OrderLineRequest>,
    #[validate(custom = "validate_positive")]
    pub total_amount: Decimal,
    pub shipping_address_id: Uuid,
}

impl CreateOrderRequest {
    pub fn validate_all(&self) -> Result<(), ServiceError> {
        self.validate()?;
        for line in &self.products {
            line.validate()?;
            line.variant.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    pub order_status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineView {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub variant: VariantSelection,
    /// Current catalog entry; `None` once the product is deleted
    pub product: Option<ProductView>,
}

/// An order with its user, lines and shipping address expanded.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user: Option<OrderUser>,
    pub products: Vec<OrderLineView>,
    pub total_amount: Decimal,
    pub payment_status: OrderPaymentStatus,
    pub order_status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub delivery_date: DateTime<Utc>,
    pub shipping_address_id: Uuid,
    pub shipping_address: Option<AddressView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order: order::Model,
    pub lines: Vec<order_line::Model>,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryEstimate {
    pub delivery_date: DateTime<Utc>,
    pub lead_days: i64,
}

/// Validates carts against the live catalog and persists orders.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    client_base: String,
    lead_days: i64,
}

impl OrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        client_base: impl Into<String>,
        lead_days: i64,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            client_base: client_base.into(),
            lead_days,
        }
    }

    pub fn delivery_estimate(&self) -> DeliveryEstimate {
        DeliveryEstimate {
            delivery_date: delivery_date(Utc::now(), self.lead_days),
            lead_days: self.lead_days,
        }
    }

    /// Creates an order after checking every line against the catalog.
    #[instrument(skip(self, caller, request), fields(user_id = %request.user_id, lines = request.products.len()))]
    pub async fn create_order(
        &self,
        caller: &AuthUser,
        request: CreateOrderRequest,
    ) -> Result<CreatedOrder, ServiceError> {
        request.validate_all()?;
        caller.ensure_can_access(request.user_id)?;

        let db = &*self.db_pool;

        AddressEntity::find_by_id(request.shipping_address_id)
            .filter(address::Column::UserId.eq(request.user_id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Address", request.shipping_address_id))?;

        let priced = price_lines(db, &request.products).await?;

        let computed_total = priced
            .iter()
            .try_fold(0i64, |acc, line| acc.checked_add(line.total_minor))
            .ok_or_else(|| ServiceError::InvalidInput("Order total overflows".to_string()))?;
        let requested_total = minor_units_of(request.total_amount, "totalAmount")?;
        if computed_total != requested_total {
            warn!(computed_total, requested_total, "order total mismatch");
            return Err(ServiceError::TotalMismatch(format!(
                "expected {}, got {}",
                from_minor_units(computed_total),
                request.total_amount
            )));
        }

        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let txn = self.db_pool.begin().await?;

        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(request.user_id),
            total_amount: Set(from_minor_units(computed_total)),
            payment_status: Set(OrderPaymentStatus::Pending),
            order_status: Set(OrderStatus::Processing),
            order_date: Set(now),
            delivery_date: Set(delivery_date(now, self.lead_days)),
            shipping_address_id: Set(request.shipping_address_id),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let mut lines = Vec::with_capacity(priced.len());
        for (line_no, line) in priced.into_iter().enumerate() {
            let model = order_line::Model {
                id: Uuid::new_v4(),
                order_id,
                line_no: line_no as i32,
                product_id: line.product_id,
                name: line.name,
                quantity: line.quantity,
                price: line.unit_price,
                size: line.size,
                color: line.color,
            };
            OrderLineEntity::insert(order_line::ActiveModel::from(model.clone()))
                .exec_without_returning(&txn)
                .await?;
            lines.push(model);
        }

        address_order::Entity::insert(address_order::ActiveModel {
            address_id: Set(request.shipping_address_id),
            order_id: Set(order_id),
        })
        .exec_without_returning(&txn)
        .await?;

        UserEntity::update_many()
            .col_expr(
                user::Column::CurrentAddressId,
                Expr::value(Some(request.shipping_address_id)),
            )
            .col_expr(user::Column::UpdatedAt, Expr::value(now))
            .filter(user::Column::Id.eq(request.user_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        info!(%order_id, total = %order.total_amount, "order created");
        crate::metrics::increment_counter("orders_created_total");
        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;

        Ok(CreatedOrder {
            redirect_url: format!("{}/payment/{}", self.client_base, order_id),
            order,
            lines,
        })
    }

    #[instrument(skip(self, caller))]
    pub async fn get_order(&self, caller: &AuthUser, order_id: Uuid) -> Result<OrderView, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
        caller.ensure_can_access(order.user_id)?;

        let mut views = expand_orders(&*self.db_pool, vec![order]).await?;
        views
            .pop()
            .ok_or_else(|| ServiceError::InternalError("order expansion returned nothing".into()))
    }

    /// Orders of `user_id`, newest first.
    #[instrument(skip(self, caller))]
    pub async fn list_user_orders(
        &self,
        caller: &AuthUser,
        user_id: Uuid,
    ) -> Result<Vec<OrderView>, ServiceError> {
        caller.ensure_can_access(user_id)?;

        let orders = OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::OrderDate)
            .all(&*self.db_pool)
            .await?;
        expand_orders(&*self.db_pool, orders).await
    }

    /// Admin-only fulfilment update. Completion belongs to settlement.
    #[instrument(skip(self, caller))]
    pub async fn update_order_status(
        &self,
        caller: &AuthUser,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<OrderView, ServiceError> {
        caller.ensure_admin()?;
        if status == OrderStatus::Completed {
            return Err(ServiceError::InvalidInput(
                "Orders are completed by payment settlement only".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let existing = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
        if existing.order_status == OrderStatus::Completed {
            return Err(ServiceError::Conflict(format!(
                "Order {} is already completed",
                order_id
            )));
        }

        let old_status = existing.order_status;
        let mut active: order::ActiveModel = existing.into();
        active.order_status = Set(status);
        let updated = active.update(db).await?;

        info!(%order_id, ?old_status, new_status = ?status, "order status updated");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: format!("{:?}", old_status),
                new_status: format!("{:?}", status),
            })
            .await;

        let mut views = expand_orders(db, vec![updated]).await?;
        views
            .pop()
            .ok_or_else(|| ServiceError::InternalError("order expansion returned nothing".into()))
    }
}

/// A request line checked against the catalog.
#[derive(Debug)]
struct PricedLine {
    product_id: Uuid,
    name: String,
    size: String,
    color: String,
    quantity: i32,
    unit_price: Decimal,
    total_minor: i64,
}

async fn price_lines<C: ConnectionTrait>(
    db: &C,
    lines: &[OrderLineRequest],
) -> Result<Vec<PricedLine>, ServiceError> {
    let mut catalog: HashMap<Uuid, (product::Model, Vec<product_variant::Model>)> = HashMap::new();
    let mut priced = Vec::with_capacity(lines.len());

    for line in lines {
        if !catalog.contains_key(&line.product_id) {
            let product = ProductEntity::find_by_id(line.product_id)
                .one(db)
                .await?
                .ok_or_else(|| ServiceError::not_found("Product", line.product_id))?;
            let variants = VariantEntity::find()
                .filter(product_variant::Column::ProductId.eq(line.product_id))
                .all(db)
                .await?;
            catalog.insert(line.product_id, (product, variants));
        }
        let Some((product, variants)) = catalog.get(&line.product_id) else {
            return Err(ServiceError::not_found("Product", line.product_id));
        };

        let variant = variants
            .iter()
            .find(|v| v.matches(&line.variant.size, &line.variant.color))
            .ok_or_else(|| {
                ServiceError::VariantNotFound(format!(
                    "Variant (Size: {}, Color: {}) not found for product {}",
                    line.variant.size, line.variant.color, product.name
                ))
            })?;

        let expected = minor_units_of(variant.price, "variant price")?;
        let offered = minor_units_of(line.price, "price")?;
        if expected != offered {
            return Err(ServiceError::PriceMismatch(format!(
                "product {} (Size: {}, Color: {}): expected {}, got {}",
                product.name, variant.size, variant.color, variant.price, line.price
            )));
        }

        priced.push(PricedLine {
            product_id: product.id,
            name: product.name.clone(),
            size: variant.size.clone(),
            color: variant.color.clone(),
            quantity: line.quantity,
            unit_price: variant.price,
            total_minor: line_total(expected, line.quantity)?,
        });
    }

    Ok(priced)
}

/// Loads lines, users, addresses and products for `orders` in bulk.
pub(crate) async fn expand_orders<C: ConnectionTrait>(
    db: &C,
    orders: Vec<order::Model>,
) -> Result<Vec<OrderView>, ServiceError> {
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let user_ids: Vec<Uuid> = orders.iter().map(|o| o.user_id).collect();
    let address_ids: Vec<Uuid> = orders.iter().map(|o| o.shipping_address_id).collect();

    let lines = OrderLineEntity::find()
        .filter(order_line::Column::OrderId.is_in(order_ids))
        .order_by_asc(order_line::Column::LineNo)
        .all(db)
        .await?;

    let product_ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
    let products: HashMap<Uuid, ProductView> = ProductEntity::find()
        .filter(product::Column::Id.is_in(product_ids))
        .find_with_related(VariantEntity)
        .all(db)
        .await?
        .into_iter()
        .map(|(p, variants)| (p.id, ProductView::new(p, variants)))
        .collect();

    let users: HashMap<Uuid, user::Model> = UserEntity::find()
        .filter(user::Column::Id.is_in(user_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    let addresses: HashMap<Uuid, address::Model> = AddressEntity::find()
        .filter(address::Column::Id.is_in(address_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|a| (a.id, a))
        .collect();

    let mut lines_by_order: HashMap<Uuid, Vec<OrderLineView>> = HashMap::new();
    for line in lines {
        let product = products.get(&line.product_id).cloned();
        lines_by_order
            .entry(line.order_id)
            .or_default()
            .push(OrderLineView {
                product_id: line.product_id,
                name: line.name,
                quantity: line.quantity,
                price: line.price,
                variant: VariantSelection {
                    size: line.size,
                    color: line.color,
                },
                product,
            });
    }

    Ok(orders
        .into_iter()
        .map(|o| OrderView {
            user: users.get(&o.user_id).map(|u| OrderUser {
                id: u.id,
                name: u.name.clone(),
                email: u.email.clone(),
            }),
            products: lines_by_order.remove(&o.id).unwrap_or_default(),
            shipping_address: addresses
                .get(&o.shipping_address_id)
                .cloned()
                .map(AddressView::from),
            id: o.id,
            user_id: o.user_id,
            total_amount: o.total_amount,
            payment_status: o.payment_status,
            order_status: o.order_status,
            order_date: o.order_date,
            delivery_date: o.delivery_date,
            shipping_address_id: o.shipping_address_id,
            created_at: o.created_at,
            updated_at: o.updated_at,
        })
        .collect())
}
