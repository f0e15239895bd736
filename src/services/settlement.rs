//! Post-payment settlement.
//!
//! Settlement is driven by the storefront's success redirect and may arrive
//! more than once for the same payment. Everything it writes happens in one
//! transaction that starts by claiming the payment with a conditional
//! `Pending -> Completed` update, so concurrent or repeated calls settle once.

use crate::{
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, OrderPaymentStatus, OrderStatus},
    entities::order_line::{self, Entity as OrderLineEntity},
    entities::payment::{self, Entity as PaymentEntity, PaymentStatus},
    entities::product_variant::{self, Entity as VariantEntity},
    entities::user_order,
    errors::ServiceError,
    events::{Event, EventSender},
    services::gateway::{CheckoutSession, PaymentGateway},
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// An order line whose variant could not cover the ordered quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockShortfall {
    pub product_id: Uuid,
    pub size: String,
    pub color: String,
    pub requested: i32,
    /// `None` when the variant no longer exists
    pub available: Option<i32>,
}

#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    Settled {
        payment: payment::Model,
        order: order::Model,
        shortfalls: Vec<StockShortfall>,
    },
    PaymentAlreadyProcessed(payment::Model),
    OrderAlreadyProcessed(order::Model),
}

impl SettlementOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            SettlementOutcome::Settled { .. } => "Payment successful and order updated",
            SettlementOutcome::PaymentAlreadyProcessed(_) => "Payment already processed",
            SettlementOutcome::OrderAlreadyProcessed(_) => "Order already processed",
        }
    }

    pub fn shortfalls(&self) -> &[StockShortfall] {
        match self {
            SettlementOutcome::Settled { shortfalls, .. } => shortfalls,
            _ => &[],
        }
    }
}

#[derive(Clone)]
pub struct SettlementService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    gateway: Arc<dyn PaymentGateway>,
}

impl SettlementService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            gateway,
        }
    }

    /// Settles `payment_id` once the processor reports `session_id` as paid.
    #[instrument(skip(self))]
    pub async fn handle_settlement(
        &self,
        session_id: &str,
        payment_id: &str,
    ) -> Result<SettlementOutcome, ServiceError> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(ServiceError::InvalidInput(
                "session_id is required".to_string(),
            ));
        }
        let payment_id = Uuid::parse_str(payment_id.trim()).map_err(|_| {
            ServiceError::InvalidInput(format!("Invalid paymentId: {}", payment_id))
        })?;

        let session = self
            .gateway
            .retrieve_checkout_session(session_id)
            .await?
            .ok_or_else(|| ServiceError::SessionNotFound(session_id.to_string()))?;

        let db = &*self.db_pool;
        let payment = PaymentEntity::find_by_id(payment_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Payment not found".to_string()))?;

        if payment.payment_status == PaymentStatus::Completed {
            info!(%payment_id, "payment already processed");
            return Ok(SettlementOutcome::PaymentAlreadyProcessed(payment));
        }
        if payment.payment_status != PaymentStatus::Pending {
            return Err(ServiceError::Conflict(format!(
                "Payment {} is {:?} and cannot be settled",
                payment_id, payment.payment_status
            )));
        }
        if !session_belongs_to(&session, &payment) {
            warn!(
                %payment_id,
                transaction_id = ?payment.transaction_id,
                got = %session.id,
                reference = ?session.client_reference_id,
                "session does not belong to payment"
            );
            return Err(ServiceError::InvalidInput(
                "Checkout session does not belong to this payment".to_string(),
            ));
        }
        if !session.is_paid() {
            warn!(%payment_id, status = %session.payment_status, "checkout session is not paid");
            return Err(ServiceError::PaymentProcessingFailed(format!(
                "Checkout session {} is {}",
                session.id, session.payment_status
            )));
        }

        let order = OrderEntity::find_by_id(payment.order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;
        if order.order_status == OrderStatus::Completed {
            info!(order_id = %order.id, "order already processed");
            return Ok(SettlementOutcome::OrderAlreadyProcessed(order));
        }

        let txn = self.db_pool.begin().await?;

        if !claim_payment(&txn, payment_id, &session.id).await? {
            txn.rollback().await?;
            let current = PaymentEntity::find_by_id(payment_id)
                .one(db)
                .await?
                .ok_or_else(|| ServiceError::NotFound("Payment not found".to_string()))?;
            info!(%payment_id, "settlement lost the race; payment already processed");
            return Ok(SettlementOutcome::PaymentAlreadyProcessed(current));
        }

        let shortfalls = deduct_stock(&txn, order.id).await?;

        OrderEntity::update_many()
            .set(order::ActiveModel {
                order_status: Set(OrderStatus::Completed),
                payment_status: Set(OrderPaymentStatus::Paid),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(order.id))
            .exec(&txn)
            .await?;

        let history_key = (order.user_id, order.id);
        if user_order::Entity::find_by_id(history_key)
            .one(&txn)
            .await?
            .is_none()
        {
            user_order::Entity::insert(user_order::ActiveModel {
                user_id: Set(order.user_id),
                order_id: Set(order.id),
                added_at: Set(Utc::now()),
            })
            .exec_without_returning(&txn)
            .await?;
        }

        txn.commit().await?;

        let payment = PaymentEntity::find_by_id(payment_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Payment not found".to_string()))?;
        let order = OrderEntity::find_by_id(order.id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        info!(
            %payment_id,
            order_id = %order.id,
            shortfalls = shortfalls.len(),
            "payment settled"
        );
        crate::metrics::increment_counter("settlements_total");
        if !shortfalls.is_empty() {
            crate::metrics::increment_counter_by("stock_shortfalls_total", shortfalls.len() as u64);
        }

        self.event_sender
            .send_or_log(Event::PaymentCompleted {
                payment_id,
                order_id: order.id,
            })
            .await;
        self.event_sender
            .send_or_log(Event::OrderCompleted(order.id))
            .await;
        for shortfall in &shortfalls {
            self.event_sender
                .send_or_log(Event::StockShortfall {
                    order_id: order.id,
                    product_id: shortfall.product_id,
                    size: shortfall.size.clone(),
                    color: shortfall.color.clone(),
                    requested: shortfall.requested,
                    available: shortfall.available,
                })
                .await;
        }

        Ok(SettlementOutcome::Settled {
            payment,
            order,
            shortfalls,
        })
    }
}

/// A session settles a payment only if it was opened for that payment: the
/// recorded transaction id must match, and any client reference the processor
/// echoes back must name the payment. An unstarted payment needs the reference.
fn session_belongs_to(session: &CheckoutSession, payment: &payment::Model) -> bool {
    let payment_ref = payment.id.to_string();
    if let Some(reference) = session.client_reference_id.as_deref() {
        if reference != payment_ref {
            return false;
        }
    }
    match payment.transaction_id.as_deref() {
        Some(tx) => tx == session.id,
        None => session.client_reference_id.is_some(),
    }
}

/// `Pending -> Completed`; false when another settlement got there first.
async fn claim_payment(
    txn: &DatabaseTransaction,
    payment_id: Uuid,
    session_id: &str,
) -> Result<bool, ServiceError> {
    let now = Utc::now();
    let result = PaymentEntity::update_many()
        .set(payment::ActiveModel {
            payment_status: Set(PaymentStatus::Completed),
            transaction_id: Set(Some(session_id.to_string())),
            completed_at: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(payment::Column::Id.eq(payment_id))
        .filter(payment::Column::PaymentStatus.eq(PaymentStatus::Pending))
        .exec(txn)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Decrements each line's variant, skipping lines the stock cannot cover.
async fn deduct_stock(
    txn: &DatabaseTransaction,
    order_id: Uuid,
) -> Result<Vec<StockShortfall>, ServiceError> {
    let lines = OrderLineEntity::find()
        .filter(order_line::Column::OrderId.eq(order_id))
        .order_by_asc(order_line::Column::LineNo)
        .all(txn)
        .await?;

    let mut shortfalls = Vec::new();
    for line in lines {
        let updated = VariantEntity::update_many()
            .col_expr(
                product_variant::Column::Stock,
                Expr::col(product_variant::Column::Stock).sub(line.quantity),
            )
            .filter(product_variant::Column::ProductId.eq(line.product_id))
            .filter(product_variant::Column::Size.eq(line.size.as_str()))
            .filter(product_variant::Column::Color.eq(line.color.as_str()))
            .filter(product_variant::Column::Stock.gte(line.quantity))
            .exec(txn)
            .await?;

        if updated.rows_affected > 0 {
            continue;
        }

        let available = VariantEntity::find()
            .filter(product_variant::Column::ProductId.eq(line.product_id))
            .filter(product_variant::Column::Size.eq(line.size.as_str()))
            .filter(product_variant::Column::Color.eq(line.color.as_str()))
            .one(txn)
            .await?
            .map(|v| v.stock);

        warn!(
            %order_id,
            product_id = %line.product_id,
            size = %line.size,
            color = %line.color,
            requested = line.quantity,
            available = ?available,
            "insufficient stock; decrement skipped"
        );
        shortfalls.push(StockShortfall {
            product_id: line.product_id,
            size: line.size,
            color: line.color,
            requested: line.quantity,
            available,
        });
    }

    Ok(shortfalls)
}
