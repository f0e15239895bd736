use crate::{
    db::DbPool,
    entities::address::{self, DeliveryStatus, Entity as AddressEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Indian mobile number: ten digits, leading 6-9
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[6-9]\d{9}$").unwrap());
static PINCODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{6}$").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddressInput {
    #[validate(length(min = 3, message = "Full name must be at least 3 characters"))]
    pub full_name: String,
    #[validate(regex(path = "PHONE_RE", message = "Invalid phone number"))]
    pub phone: String,
    #[validate(regex(path = "PINCODE_RE", message = "Pincode must be 6 digits"))]
    pub pincode: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "House number is required"))]
    pub house_no: String,
    pub road: Option<String>,
    pub area: Option<String>,
}

/// Partial update; absent fields keep their value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddressUpdate {
    #[validate(length(min = 3, message = "Full name must be at least 3 characters"))]
    pub full_name: Option<String>,
    #[validate(regex(path = "PHONE_RE", message = "Invalid phone number"))]
    pub phone: Option<String>,
    #[validate(regex(path = "PINCODE_RE", message = "Pincode must be 6 digits"))]
    pub pincode: Option<String>,
    #[validate(length(min = 1))]
    pub state: Option<String>,
    #[validate(length(min = 1))]
    pub city: Option<String>,
    #[validate(length(min = 1))]
    pub house_no: Option<String>,
    pub road: Option<String>,
    pub area: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddressView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub pincode: String,
    pub state: String,
    pub city: String,
    pub house_no: String,
    pub road: Option<String>,
    pub area: Option<String>,
    pub delivery_status: DeliveryStatus,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<address::Model> for AddressView {
    fn from(a: address::Model) -> Self {
        Self {
            id: a.id,
            user_id: a.user_id,
            full_name: a.full_name,
            phone: a.phone,
            pincode: a.pincode,
            state: a.state,
            city: a.city,
            house_no: a.house_no,
            road: a.road,
            area: a.area,
            delivery_status: a.delivery_status,
            tracking_number: a.tracking_number,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct AddressService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl AddressService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, input))]
    pub async fn add_address(
        &self,
        user_id: Uuid,
        input: AddressInput,
    ) -> Result<AddressView, ServiceError> {
        input.validate()?;

        let model = address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            full_name: Set(input.full_name),
            phone: Set(input.phone),
            pincode: Set(input.pincode),
            state: Set(input.state),
            city: Set(input.city),
            house_no: Set(input.house_no),
            road: Set(input.road),
            area: Set(input.area),
            delivery_status: Set(DeliveryStatus::Pending),
            tracking_number: Set(None),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await?;

        info!(address_id = %model.id, "address added");
        self.event_sender
            .send_or_log(Event::AddressCreated {
                address_id: model.id,
                user_id,
            })
            .await;

        Ok(model.into())
    }

    #[instrument(skip(self))]
    pub async fn list_addresses(&self, user_id: Uuid) -> Result<Vec<AddressView>, ServiceError> {
        let rows = AddressEntity::find()
            .filter(address::Column::UserId.eq(user_id))
            .order_by_desc(address::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?;
        Ok(rows.into_iter().map(AddressView::from).collect())
    }

    /// Only the owner may edit; someone else's address reads as missing.
    #[instrument(skip(self, update))]
    pub async fn edit_address(
        &self,
        address_id: Uuid,
        user_id: Uuid,
        update: AddressUpdate,
    ) -> Result<AddressView, ServiceError> {
        update.validate()?;

        let existing = AddressEntity::find_by_id(address_id)
            .filter(address::Column::UserId.eq(user_id))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Address", address_id))?;

        let mut active: address::ActiveModel = existing.into();
        if let Some(v) = update.full_name {
            active.full_name = Set(v);
        }
        if let Some(v) = update.phone {
            active.phone = Set(v);
        }
        if let Some(v) = update.pincode {
            active.pincode = Set(v);
        }
        if let Some(v) = update.state {
            active.state = Set(v);
        }
        if let Some(v) = update.city {
            active.city = Set(v);
        }
        if let Some(v) = update.house_no {
            active.house_no = Set(v);
        }
        if update.road.is_some() {
            active.road = Set(update.road);
        }
        if update.area.is_some() {
            active.area = Set(update.area);
        }

        let updated = active.update(&*self.db_pool).await?;
        self.event_sender
            .send_or_log(Event::AddressUpdated(address_id))
            .await;
        Ok(updated.into())
    }
}
