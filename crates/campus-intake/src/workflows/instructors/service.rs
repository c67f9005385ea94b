use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use super::domain::{
    ApplicationId, ApplicationStatus, InstructorApplication, InstructorApplicationDraft,
};
use crate::auth::StaffIdentity;
use crate::error::ServiceError;
use crate::notifications::{Mailer, Notification};
use crate::ratelimit::RateLimiter;
use crate::store::{
    from_document, to_document, FieldUpdate, Query, RecordStore, INSTRUCTOR_APPLICATIONS,
};
use crate::workflows::enrollment::{
    is_plausible_email, normalize_email, ChangeRecorder, ChangelogEntry, Notifier,
};

/// Stamped by the service; edits naming them are ignored.
const PROTECTED: [&str; 4] = ["id", "created_at", "updated_at", "changelog"];

const TEXT_FIELDS: [&str; 5] = ["firstName", "lastName", "email", "contactNo", "otherCourses"];

#[derive(Debug, Clone)]
pub struct InstructorSettings {
    pub admissions_address: String,
    pub submissions_per_minute: u32,
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for InstructorSettings {
    fn default() -> Self {
        Self {
            admissions_address: "admissions@brighthii.com".to_string(),
            submissions_per_minute: 5,
            trusted_proxies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationChanges {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<ChangelogEntry>,
}

pub struct InstructorApplications<S, M> {
    store: Arc<S>,
    notifier: Notifier<M>,
    admissions_address: String,
    pub(super) limiter: RateLimiter,
}

impl<S, M> InstructorApplications<S, M>
where
    S: RecordStore,
    M: Mailer,
{
    pub fn new(store: Arc<S>, notifier: Notifier<M>, settings: InstructorSettings) -> Self {
        Self {
            store,
            notifier,
            admissions_address: settings.admissions_address,
            limiter: RateLimiter::per_minute(settings.submissions_per_minute)
                .trusting(settings.trusted_proxies),
        }
    }

    /// Store a new application and tell the admissions inbox. A failed notice
    /// does not fail the submission.
    pub async fn submit(
        &self,
        draft: InstructorApplicationDraft,
        client: &str,
    ) -> Result<InstructorApplication, ServiceError> {
        self.limiter.check(client)?;

        let details = validated(draft)?;
        let application = InstructorApplication {
            id: ApplicationId::generate(),
            details,
            status: ApplicationStatus::New,
            created_at: Utc::now(),
            updated_at: None,
            changelog: Vec::new(),
        };
        self.store
            .set(
                INSTRUCTOR_APPLICATIONS,
                application.id.as_str(),
                to_document(&application)?,
            )
            .await?;
        tracing::info!(application_id = %application.id, "instructor application received");

        let notice = Notification::InstructorApplication {
            applicant_name: application.applicant_name(),
            email: application.details.email.clone(),
            contact_no: application.details.contact_no.clone(),
            courses: application.details.courses_interested.clone(),
            other_courses: application.details.other_courses.clone(),
            application_id: application.id.to_string(),
        };
        if let Err(err) = self.notifier.send(&self.admissions_address, &notice).await {
            tracing::warn!(
                application_id = %application.id,
                to = %self.admissions_address,
                error = %err,
                "instructor application notice failed"
            );
        }
        Ok(application)
    }

    /// Newest first.
    pub async fn list(&self) -> Result<Vec<InstructorApplication>, ServiceError> {
        let applications = self
            .store
            .query(Query::collection(INSTRUCTOR_APPLICATIONS).newest_first())
            .await?
            .into_iter()
            .map(|stored| from_document(stored.data))
            .collect::<Result<Vec<InstructorApplication>, _>>()?;
        Ok(applications)
    }

    pub async fn get(&self, id: &ApplicationId) -> Result<InstructorApplication, ServiceError> {
        match self.store.get(INSTRUCTOR_APPLICATIONS, id.as_str()).await? {
            Some(document) => Ok(from_document(document)?),
            None => Err(ServiceError::not_found("Application not found")),
        }
    }

    /// Apply a staff edit. Only differing values are written and logged.
    pub async fn update(
        &self,
        id: &ApplicationId,
        fields: serde_json::Map<String, Value>,
        staff: &StaffIdentity,
    ) -> Result<ApplicationChanges, ServiceError> {
        let application = self.get(id).await?;
        if let Some(status) = fields.get("status") {
            match status.as_str() {
                Some(raw) => {
                    raw.parse::<ApplicationStatus>()
                        .map_err(|err| ServiceError::validation(err.to_string()))?;
                }
                None => return Err(ServiceError::validation(format!("Invalid status: {status}"))),
            }
        }

        let current = to_document(&application)?;
        let mut changes = ChangeRecorder::new(staff.email.clone());
        let mut updates = Vec::new();
        for (field, value) in fields {
            if PROTECTED.contains(&field.as_str()) {
                continue;
            }
            let value = editable_value(&field, value)?;
            let old = current.get(&field).cloned().unwrap_or(Value::Null);
            if changes.record(&field, old, value.clone()) {
                updates.push(FieldUpdate::set(field, value));
            }
        }

        if changes.is_empty() {
            return Ok(ApplicationChanges {
                message: "No changes detected".to_string(),
                changes: Vec::new(),
            });
        }

        let entries = changes.entries().to_vec();
        updates.extend(changes.into_update());
        updates.push(FieldUpdate::server_timestamp("updated_at"));
        self.store
            .update(INSTRUCTOR_APPLICATIONS, id.as_str(), updates)
            .await?;
        tracing::info!(
            application_id = %id,
            fields = entries.len(),
            by = %staff.email,
            "instructor application updated"
        );
        Ok(ApplicationChanges {
            message: format!("{} field(s) updated", entries.len()),
            changes: entries,
        })
    }

    pub async fn delete(&self, id: &ApplicationId, staff: &StaffIdentity) -> Result<(), ServiceError> {
        if self.store.get(INSTRUCTOR_APPLICATIONS, id.as_str()).await?.is_none() {
            return Err(ServiceError::not_found("Application not found"));
        }
        self.store.delete(INSTRUCTOR_APPLICATIONS, id.as_str()).await?;
        tracing::info!(application_id = %id, by = %staff.email, "instructor application deleted");
        Ok(())
    }
}

fn validated(draft: InstructorApplicationDraft) -> Result<InstructorApplicationDraft, ServiceError> {
    let first_name = draft.first_name.trim().to_string();
    let last_name = draft.last_name.trim().to_string();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(ServiceError::validation("First and last name are required."));
    }
    let email = normalize_email(&draft.email);
    if !is_plausible_email(&email) {
        return Err(ServiceError::validation("A valid email address is required."));
    }
    let contact_no = draft.contact_no.trim().to_string();
    if contact_no.is_empty() {
        return Err(ServiceError::validation("A contact number is required."));
    }
    Ok(InstructorApplicationDraft {
        first_name,
        last_name,
        email,
        contact_no,
        courses_interested: draft
            .courses_interested
            .into_iter()
            .map(|course| course.trim().to_string())
            .filter(|course| !course.is_empty())
            .collect(),
        other_courses: draft.other_courses.trim().to_string(),
    })
}

/// Checks the value's shape for a field staff may edit.
fn editable_value(field: &str, value: Value) -> Result<Value, ServiceError> {
    match field {
        "status" => Ok(value),
        "email" => {
            let email = value
                .as_str()
                .map(normalize_email)
                .filter(|email| is_plausible_email(email))
                .ok_or_else(|| ServiceError::validation("A valid email address is required."))?;
            Ok(Value::String(email))
        }
        "coursesInterested" => {
            let courses = value
                .as_array()
                .filter(|items| items.iter().all(Value::is_string))
                .ok_or_else(|| {
                    ServiceError::validation("coursesInterested must be a list of course names.")
                })?;
            Ok(Value::Array(courses.clone()))
        }
        text if TEXT_FIELDS.contains(&text) => match value {
            Value::String(_) => Ok(value),
            _ => Err(ServiceError::validation(format!("{field} must be a string."))),
        },
        other => Err(ServiceError::validation(format!("Unknown field: {other}"))),
    }
}
