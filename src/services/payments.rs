use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, OrderPaymentStatus},
    entities::order_line::{self, Entity as OrderLineEntity},
    entities::payment::{self, Entity as PaymentEntity, PaymentMethod, PaymentStatus},
    entities::product::{self, Entity as ProductEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::gateway::{CheckoutLineItem, CheckoutSessionRequest, PaymentGateway},
    services::money::minor_units_of,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub order_id: Uuid,
    /// One of "Credit Card", "Debit Card", "UPI", "Cash on Delivery"
    #[validate(length(min = 1, message = "Payment method is required"))]
    pub payment_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<payment::Model> for PaymentView {
    fn from(p: payment::Model) -> Self {
        Self {
            id: p.id,
            order_id: p.order_id,
            payment_method: p.payment_method,
            payment_status: p.payment_status,
            transaction_id: p.transaction_id,
            created_at: p.created_at,
            updated_at: p.updated_at,
            completed_at: p.completed_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub payment: payment::Model,
    pub redirect_url: String,
    /// Pending payments of the same order that this one replaced
    pub superseded: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedCheckout {
    pub session_id: String,
    pub url: String,
}

/// Settings applied to every hosted checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub client_base: String,
    pub currency: String,
    pub allowed_countries: Vec<String>,
    /// Shown for lines whose product has no image or no longer exists
    pub default_image: String,
}

impl From<&crate::config::AppConfig> for CheckoutSettings {
    fn from(cfg: &crate::config::AppConfig) -> Self {
        Self {
            client_base: cfg.client_base().to_string(),
            currency: cfg.checkout_currency.to_ascii_lowercase(),
            allowed_countries: cfg.allowed_countries(),
            default_image: cfg.default_product_image.clone(),
        }
    }
}

/// Creates payment records and hands them to the payment processor.
#[derive(Clone)]
pub struct PaymentService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    gateway: Arc<dyn PaymentGateway>,
    settings: CheckoutSettings,
}

impl PaymentService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            gateway,
            settings,
        }
    }

    /// Records a new Pending payment, cancelling any Pending one it replaces.
    #[instrument(skip(self, caller, request), fields(order_id = %request.order_id))]
    pub async fn create_payment(
        &self,
        caller: &AuthUser,
        request: CreatePaymentRequest,
    ) -> Result<CreatedPayment, ServiceError> {
        request.validate()?;
        let method: PaymentMethod = request
            .payment_method
            .parse()
            .map_err(ServiceError::ValidationError)?;

        let order = OrderEntity::find_by_id(request.order_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", request.order_id))?;
        caller.ensure_can_access(order.user_id)?;
        if order.payment_status == OrderPaymentStatus::Paid {
            return Err(ServiceError::Conflict(format!(
                "Order {} is already paid",
                order.id
            )));
        }

        let now = Utc::now();
        let txn = self.db_pool.begin().await?;

        let superseded: Vec<Uuid> = PaymentEntity::find()
            .filter(payment::Column::OrderId.eq(order.id))
            .filter(payment::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .all(&txn)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        if !superseded.is_empty() {
            PaymentEntity::update_many()
                .set(payment::ActiveModel {
                    payment_status: Set(PaymentStatus::Cancelled),
                    updated_at: Set(now),
                    ..Default::default()
                })
                .filter(payment::Column::Id.is_in(superseded.clone()))
                .exec(&txn)
                .await?;
        }

        let payment = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            payment_method: Set(method),
            payment_status: Set(PaymentStatus::Pending),
            transaction_id: Set(None),
            completed_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        info!(payment_id = %payment.id, method = method.label(), superseded = superseded.len(), "payment created");
        for payment_id in &superseded {
            self.event_sender
                .send_or_log(Event::PaymentCancelled {
                    payment_id: *payment_id,
                    order_id: order.id,
                })
                .await;
        }
        self.event_sender
            .send_or_log(Event::PaymentCreated {
                payment_id: payment.id,
                order_id: order.id,
            })
            .await;

        Ok(CreatedPayment {
            redirect_url: format!("{}/payments/{}", self.settings.client_base, payment.id),
            payment,
            superseded,
        })
    }

    /// Opens a hosted checkout session for a Pending payment.
    ///
    /// A processor failure leaves the payment Pending so the call can be retried.
    #[instrument(skip(self, caller))]
    pub async fn initiate_checkout(
        &self,
        caller: &AuthUser,
        payment_id: Uuid,
    ) -> Result<StartedCheckout, ServiceError> {
        let db = &*self.db_pool;

        let payment = PaymentEntity::find_by_id(payment_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Payment not found".to_string()))?;
        let order = OrderEntity::find_by_id(payment.order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;
        caller.ensure_can_access(order.user_id)?;

        if payment.payment_status != PaymentStatus::Pending {
            return Err(ServiceError::Conflict(format!(
                "Payment {} is {:?}, not Pending",
                payment.id, payment.payment_status
            )));
        }

        let lines = OrderLineEntity::find()
            .filter(order_line::Column::OrderId.eq(order.id))
            .order_by_asc(order_line::Column::LineNo)
            .all(db)
            .await?;

        let product_ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
        let images: HashMap<Uuid, String> = ProductEntity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(db)
            .await?
            .into_iter()
            .filter_map(|p| p.images.0.into_iter().next().map(|img| (p.id, img)))
            .collect();

        let request =
            self.session_request(&payment, &order, &lines, &images, caller.email.clone())?;

        let session = self
            .gateway
            .create_checkout_session(&request)
            .await
            .map_err(|e| {
                error!(error = %e, gateway = self.gateway.name(), "checkout session creation failed");
                crate::metrics::increment_counter("checkout_failures_total");
                ServiceError::from(e)
            })?;

        let url = session.url.clone().ok_or_else(|| {
            ServiceError::PaymentProcessingFailed("checkout session has no URL".to_string())
        })?;

        let mut active: payment::ActiveModel = payment.into();
        active.transaction_id = Set(Some(session.id.clone()));
        active.update(db).await?;

        info!(session_id = %session.id, "checkout session started");
        crate::metrics::increment_counter("checkout_sessions_total");
        self.event_sender
            .send_or_log(Event::CheckoutStarted {
                payment_id,
                session_id: session.id.clone(),
            })
            .await;

        Ok(StartedCheckout {
            session_id: session.id,
            url,
        })
    }

    #[instrument(skip(self, caller))]
    pub async fn get_payment(
        &self,
        caller: &AuthUser,
        payment_id: Uuid,
    ) -> Result<PaymentView, ServiceError> {
        let db = &*self.db_pool;
        let payment = PaymentEntity::find_by_id(payment_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Payment not found".to_string()))?;

        if !caller.is_admin() {
            let owner = OrderEntity::find_by_id(payment.order_id)
                .one(db)
                .await?
                .map(|o| o.user_id)
                .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;
            caller.ensure_can_access(owner)?;
        }

        Ok(payment.into())
    }

    fn session_request(
        &self,
        payment: &payment::Model,
        order: &order::Model,
        lines: &[order_line::Model],
        images: &HashMap<Uuid, String>,
        customer_email: Option<String>,
    ) -> Result<CheckoutSessionRequest, ServiceError> {
        let line_items = lines
            .iter()
            .map(|line| {
                Ok(CheckoutLineItem {
                    name: line.name.clone(),
                    description: format!("Size: {}, Color: {}", line.size, line.color),
                    unit_amount: minor_units_of(line.price, "line price")?,
                    quantity: i64::from(line.quantity),
                    currency: self.settings.currency.clone(),
                    image: images
                        .get(&line.product_id)
                        .cloned()
                        .unwrap_or_else(|| self.settings.default_image.clone()),
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        if line_items.is_empty() {
            return Err(ServiceError::InvalidInput(format!(
                "Order {} has no lines",
                order.id
            )));
        }

        let base = &self.settings.client_base;
        Ok(CheckoutSessionRequest {
            line_items,
            customer_email,
            allowed_countries: self.settings.allowed_countries.clone(),
            success_url: format!(
                "{}/success?session_id={{CHECKOUT_SESSION_ID}}&paymentId={}",
                base, payment.id
            ),
            cancel_url: format!("{}/cancel", base),
            client_reference_id: payment.id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gateway::{GatewayError, MockPaymentGateway};
    use rust_decimal_macros::dec;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use tokio::sync::mpsc;

    fn caller(user_id: Uuid) -> AuthUser {
        AuthUser {
            user_id,
            name: Some("Asha".into()),
            email: Some("asha@example.com".into()),
            roles: vec!["customer".into()],
            token_id: "t".into(),
        }
    }

    fn settings() -> CheckoutSettings {
        CheckoutSettings {
            client_base: "http://localhost:3000".into(),
            currency: "inr".into(),
            allowed_countries: vec!["IN".into()],
            default_image: "https://img.test/placeholder.png".into(),
        }
    }

    fn fixtures(user_id: Uuid) -> (payment::Model, order::Model, order_line::Model) {
        let now = Utc::now();
        let order = order::Model {
            id: Uuid::new_v4(),
            user_id,
            total_amount: dec!(1000),
            payment_status: OrderPaymentStatus::Pending,
            order_status: crate::entities::order::OrderStatus::Processing,
            order_date: now,
            delivery_date: now,
            shipping_address_id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        };
        let payment = payment::Model {
            id: Uuid::new_v4(),
            order_id: order.id,
            payment_method: PaymentMethod::CreditCard,
            payment_status: PaymentStatus::Pending,
            transaction_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        let line = order_line::Model {
            id: Uuid::new_v4(),
            order_id: order.id,
            line_no: 0,
            product_id: Uuid::new_v4(),
            name: "Linen Shirt".into(),
            quantity: 2,
            price: dec!(500),
            size: "M".into(),
            color: "Red".into(),
        };
        (payment, order, line)
    }

    fn service(db: DbPool, gateway: MockPaymentGateway) -> PaymentService {
        let (tx, _rx) = mpsc::channel(16);
        PaymentService::new(
            Arc::new(db),
            Arc::new(EventSender::new(tx)),
            Arc::new(gateway),
            settings(),
        )
    }

    #[test]
    fn session_request_carries_minor_units_and_redirects() {
        let user_id = Uuid::new_v4();
        let (payment, order, line) = fixtures(user_id);
        let svc = service(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockPaymentGateway::new(),
        );

        let req = svc
            .session_request(
                &payment,
                &order,
                &[line],
                &HashMap::new(),
                Some("asha@example.com".into()),
            )
            .unwrap();

        assert_eq!(req.line_items[0].unit_amount, 50_000);
        assert_eq!(req.line_items[0].description, "Size: M, Color: Red");
        assert_eq!(req.line_items[0].currency, "inr");
        assert_eq!(req.line_items[0].image, "https://img.test/placeholder.png");
        assert_eq!(
            req.success_url,
            format!(
                "http://localhost:3000/success?session_id={{CHECKOUT_SESSION_ID}}&paymentId={}",
                payment.id
            )
        );
        assert_eq!(req.cancel_url, "http://localhost:3000/cancel");
    }

    #[test]
    fn line_items_use_the_first_product_image() {
        let user_id = Uuid::new_v4();
        let (payment, order, line) = fixtures(user_id);
        let mut other = line.clone();
        other.product_id = Uuid::new_v4();
        let svc = service(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockPaymentGateway::new(),
        );
        let images = HashMap::from([(line.product_id, "https://img.test/shirt.png".to_string())]);

        let req = svc
            .session_request(&payment, &order, &[line, other], &images, None)
            .unwrap();

        assert_eq!(req.line_items[0].image, "https://img.test/shirt.png");
        assert_eq!(req.line_items[1].image, "https://img.test/placeholder.png");
    }

    #[tokio::test]
    async fn gateway_failure_leaves_payment_pending() {
        let user_id = Uuid::new_v4();
        let (payment, order, line) = fixtures(user_id);
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![payment]])
            .append_query_results([vec![order]])
            .append_query_results([vec![line]])
            .append_query_results([Vec::<product::Model>::new()])
            .into_connection();

        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_create_checkout_session()
            .times(1)
            .returning(|_| Err(GatewayError::NotConfigured));
        gateway.expect_name().return_const("mock");

        let svc = service(db, gateway);
        let payment_id = Uuid::new_v4();
        let err = svc
            .initiate_checkout(&caller(user_id), payment_id)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::PaymentProcessingFailed(_)));
    }

    #[tokio::test]
    async fn completed_payment_cannot_start_checkout() {
        let user_id = Uuid::new_v4();
        let (mut payment, order, _) = fixtures(user_id);
        payment.payment_status = PaymentStatus::Completed;
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![payment.clone()]])
            .append_query_results([vec![order]])
            .into_connection();

        let svc = service(db, MockPaymentGateway::new());
        let err = svc
            .initiate_checkout(&caller(user_id), payment.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn unknown_payment_method_is_a_validation_error() {
        let svc = service(
            MockDatabase::new(DatabaseBackend::Postgres).into_connection(),
            MockPaymentGateway::new(),
        );
        let err = svc
            .create_payment(
                &caller(Uuid::new_v4()),
                CreatePaymentRequest {
                    order_id: Uuid::new_v4(),
                    payment_method: "Bitcoin".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }
}
