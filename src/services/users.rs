use crate::{
    db::DbPool,
    entities::user::{self, Entity as UserEntity},
    entities::user_order::{self, Entity as UserOrderEntity},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub roles: Vec<String>,
    pub current_address_id: Option<Uuid>,
    /// Settled orders, oldest first
    pub order_history: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct UserService {
    db_pool: Arc<DbPool>,
}

impl UserService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<user::Model, ServiceError> {
        UserEntity::find_by_id(user_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", user_id))
    }

    #[instrument(skip(self))]
    pub async fn get_profile(&self, user_id: Uuid) -> Result<UserProfile, ServiceError> {
        let user = self.get_user(user_id).await?;
        let order_history = UserOrderEntity::find()
            .filter(user_order::Column::UserId.eq(user_id))
            .order_by_asc(user_order::Column::AddedAt)
            .all(&*self.db_pool)
            .await?
            .into_iter()
            .map(|entry| entry.order_id)
            .collect();

        Ok(UserProfile {
            roles: user.role_list(),
            id: user.id,
            name: user.name,
            email: user.email,
            current_address_id: user.current_address_id,
            order_history,
            created_at: user.created_at,
        })
    }

    /// Returns the user with `email`, creating it on first sight.
    #[instrument(skip(self, name))]
    pub async fn find_or_create(
        &self,
        name: &str,
        email: &str,
        roles: &[&str],
    ) -> Result<user::Model, ServiceError> {
        let email = email.trim().to_ascii_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(ServiceError::ValidationError(format!(
                "Invalid email: {}",
                email
            )));
        }

        if let Some(existing) = UserEntity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(&*self.db_pool)
            .await?
        {
            return Ok(existing);
        }

        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.trim().to_string()),
            email: Set(email),
            roles: Set(roles.join(",")),
            current_address_id: Set(None),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await?;

        info!(user_id = %created.id, "user created");
        Ok(created)
    }
}
