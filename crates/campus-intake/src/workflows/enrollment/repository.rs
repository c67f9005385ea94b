use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use super::changelog::ChangeRecorder;
use super::documents::{DocumentEntry, DocumentKind};
use super::domain::{EnrollmentId, EnrollmentRecord, UserRecord, UserRole};
use super::status::EnrollmentStatus;
use crate::notifications::EmailLogEntry;
use crate::store::{
    from_document, to_document, FieldUpdate, Query, RecordStore, StoreError, ENROLLMENTS, USERS,
};

/// Field-level mutation of one enrollment. Every applied update also stamps
/// `updated_at`.
#[derive(Debug, Default)]
pub struct EnrollmentUpdate {
    updates: Vec<FieldUpdate>,
    encoding: Option<serde_json::Error>,
}

impl EnrollmentUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => self.updates.push(FieldUpdate::set(path, value)),
            Err(err) => self.encoding = Some(err),
        }
        self
    }

    pub fn status(self, status: EnrollmentStatus) -> Self {
        self.set("status", status)
    }

    pub fn document(self, kind: DocumentKind, entry: &DocumentEntry) -> Self {
        self.set(format!("documents.{}", kind.key()), entry)
    }

    pub fn remove(mut self, path: impl Into<String>) -> Self {
        self.updates.push(FieldUpdate::delete(path));
        self
    }

    pub fn changelog(mut self, recorder: ChangeRecorder) -> Self {
        if let Some(update) = recorder.into_update() {
            self.updates.push(update);
        }
        self
    }

    pub fn email_sent(mut self, entry: &EmailLogEntry) -> Self {
        match serde_json::to_value(entry) {
            Ok(value) => self
                .updates
                .push(FieldUpdate::append("emails_sent", vec![value])),
            Err(err) => self.encoding = Some(err),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.encoding.is_none()
    }

    fn into_updates(self) -> Result<Vec<FieldUpdate>, StoreError> {
        if let Some(err) = self.encoding {
            return Err(err.into());
        }
        let mut updates = self.updates;
        updates.push(FieldUpdate::server_timestamp("updated_at"));
        Ok(updates)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnrollmentFilter {
    pub status: Option<EnrollmentStatus>,
    pub course: Option<String>,
}

/// Typed access to the enrollments collection.
pub struct EnrollmentRepository<S> {
    store: Arc<S>,
}

impl<S> Clone for EnrollmentRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> EnrollmentRepository<S>
where
    S: RecordStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn insert(&self, record: &EnrollmentRecord) -> Result<(), StoreError> {
        self.store
            .set(ENROLLMENTS, record.id.as_str(), to_document(record)?)
            .await
    }

    pub async fn fetch(&self, id: &EnrollmentId) -> Result<Option<EnrollmentRecord>, StoreError> {
        match self.store.get(ENROLLMENTS, id.as_str()).await? {
            Some(document) => Ok(Some(from_document(document)?)),
            None => Ok(None),
        }
    }

    pub async fn apply(&self, id: &EnrollmentId, update: EnrollmentUpdate) -> Result<(), StoreError> {
        if update.is_empty() {
            return Ok(());
        }
        self.store
            .update(ENROLLMENTS, id.as_str(), update.into_updates()?)
            .await
    }

    /// Newest first.
    pub async fn list(&self, filter: &EnrollmentFilter) -> Result<Vec<EnrollmentRecord>, StoreError> {
        let mut query = Query::collection(ENROLLMENTS).newest_first();
        if let Some(status) = filter.status {
            query = query.where_eq("status", status.label());
        }
        if let Some(course) = &filter.course {
            query = query.where_eq("course", course.as_str());
        }
        self.run(query).await
    }

    /// Newest first.
    pub async fn by_email(&self, email: &str) -> Result<Vec<EnrollmentRecord>, StoreError> {
        self.run(
            Query::collection(ENROLLMENTS)
                .where_eq("email", email)
                .newest_first(),
        )
        .await
    }

    pub async fn any_for_email(&self, email: &str) -> Result<Option<EnrollmentRecord>, StoreError> {
        let mut found = self
            .run(Query::collection(ENROLLMENTS).where_eq("email", email).limit(1))
            .await?;
        Ok(found.pop())
    }

    pub async fn by_course_and_status(
        &self,
        course: &str,
        status: EnrollmentStatus,
    ) -> Result<Vec<EnrollmentRecord>, StoreError> {
        self.run(
            Query::collection(ENROLLMENTS)
                .where_eq("course", course)
                .where_eq("status", status.label()),
        )
        .await
    }

    async fn run(&self, query: Query) -> Result<Vec<EnrollmentRecord>, StoreError> {
        self.store
            .query(query)
            .await?
            .into_iter()
            .map(|stored| from_document(stored.data))
            .collect()
    }
}

/// Person-level accounts keyed by a generated id and looked up by email.
pub struct UserRepository<S> {
    store: Arc<S>,
}

impl<S> Clone for UserRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> UserRepository<S>
where
    S: RecordStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn fetch(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        match self.store.get(USERS, id).await? {
            Some(document) => Ok(Some(from_document(document)?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let mut found = self
            .store
            .query(Query::collection(USERS).where_eq("email", email).limit(1))
            .await?;
        match found.pop() {
            Some(stored) => Ok(Some(from_document(stored.data)?)),
            None => Ok(None),
        }
    }

    pub async fn with_role(&self, role: UserRole) -> Result<Vec<UserRecord>, StoreError> {
        self.store
            .query(Query::collection(USERS).where_eq("role", role.label()))
            .await?
            .into_iter()
            .map(|stored| from_document(stored.data))
            .collect()
    }

    /// Create an `applicant` account for the email unless one already exists.
    pub async fn ensure_applicant(&self, email: &str, name: &str) -> Result<UserRecord, StoreError> {
        if let Some(existing) = self.find_by_email(email).await? {
            return Ok(existing);
        }
        self.create(email, name, UserRole::Applicant).await
    }

    /// Promote the account to `student`, creating it when missing.
    pub async fn promote_to_student(
        &self,
        email: &str,
        name: &str,
    ) -> Result<UserRecord, StoreError> {
        match self.find_by_email(email).await? {
            Some(mut user) => {
                if user.role != UserRole::Student {
                    self.store
                        .update(
                            USERS,
                            &user.id,
                            vec![
                                FieldUpdate::set("role", Value::from(UserRole::Student.label())),
                                FieldUpdate::server_timestamp("updated_at"),
                            ],
                        )
                        .await?;
                    user.role = UserRole::Student;
                }
                Ok(user)
            }
            None => self.create(email, name, UserRole::Student).await,
        }
    }

    pub async fn change_email(&self, id: &str, email: &str) -> Result<(), StoreError> {
        self.store
            .update(
                USERS,
                id,
                vec![
                    FieldUpdate::set("email", Value::from(email)),
                    FieldUpdate::server_timestamp("updated_at"),
                ],
            )
            .await
    }

    async fn create(&self, email: &str, name: &str, role: UserRole) -> Result<UserRecord, StoreError> {
        let now = Utc::now();
        let user = UserRecord {
            id: uuid::Uuid::new_v4().simple().to_string(),
            email: email.to_string(),
            name: name.to_string(),
            role,
            created_at: now,
            updated_at: now,
        };
        self.store.set(USERS, &user.id, to_document(&user)?).await?;
        Ok(user)
    }
}
