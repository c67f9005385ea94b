use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::StaffIdentity;
use crate::error::ServiceError;
use crate::store::{from_document, to_document, FieldUpdate, Query, RecordStore, STAFF};
use crate::workflows::enrollment::{is_plausible_email, normalize_email};

/// Staff account keyed by its normalized email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaffDraft {
    pub email: String,
    #[serde(default = "default_role")]
    pub role: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaffRoleChange {
    pub role: String,
}

fn default_role() -> String {
    "staff".to_string()
}

pub struct StaffDirectory<S> {
    store: Arc<S>,
}

impl<S> StaffDirectory<S>
where
    S: RecordStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Oldest first.
    pub async fn list(&self) -> Result<Vec<StaffMember>, ServiceError> {
        let members = self
            .store
            .query(Query::collection(STAFF))
            .await?
            .into_iter()
            .map(|stored| from_document(stored.data))
            .collect::<Result<Vec<StaffMember>, _>>()?;
        Ok(members)
    }

    pub async fn get(&self, email: &str) -> Result<Option<StaffMember>, ServiceError> {
        match self.store.get(STAFF, &normalize_email(email)).await? {
            Some(document) => Ok(Some(from_document(document)?)),
            None => Ok(None),
        }
    }

    pub async fn add(
        &self,
        draft: StaffDraft,
        actor: &StaffIdentity,
    ) -> Result<StaffMember, ServiceError> {
        let email = normalize_email(&draft.email);
        if !is_plausible_email(&email) {
            return Err(ServiceError::validation("A valid email address is required."));
        }
        let role = required_role(&draft.role)?;
        if self.store.get(STAFF, &email).await?.is_some() {
            return Err(ServiceError::conflict("Staff member already exists"));
        }

        let member = StaffMember {
            email,
            role,
            created_at: Utc::now(),
        };
        self.store
            .set(STAFF, &member.email, to_document(&member)?)
            .await?;
        tracing::info!(staff = %member.email, role = %member.role, by = %actor.email, "staff member added");
        Ok(member)
    }

    pub async fn update_role(
        &self,
        email: &str,
        change: StaffRoleChange,
        actor: &StaffIdentity,
    ) -> Result<StaffMember, ServiceError> {
        let role = required_role(&change.role)?;
        let mut member = self
            .get(email)
            .await?
            .ok_or_else(|| ServiceError::not_found("Staff member not found"))?;

        self.store
            .update(
                STAFF,
                &member.email,
                vec![FieldUpdate::set("role", Value::from(role.as_str()))],
            )
            .await?;
        tracing::info!(staff = %member.email, role = %role, by = %actor.email, "staff role changed");
        member.role = role;
        Ok(member)
    }

    /// Staff cannot remove their own account.
    pub async fn remove(&self, email: &str, actor: &StaffIdentity) -> Result<(), ServiceError> {
        let email = normalize_email(email);
        if email == normalize_email(&actor.email) {
            return Err(ServiceError::validation("Cannot remove yourself"));
        }
        if self.store.get(STAFF, &email).await?.is_none() {
            return Err(ServiceError::not_found("Staff member not found"));
        }
        self.store.delete(STAFF, &email).await?;
        tracing::info!(staff = %email, by = %actor.email, "staff member removed");
        Ok(())
    }
}

fn required_role(raw: &str) -> Result<String, ServiceError> {
    let role = raw.trim();
    if role.is_empty() {
        return Err(ServiceError::validation("A role is required."));
    }
    Ok(role.to_string())
}
