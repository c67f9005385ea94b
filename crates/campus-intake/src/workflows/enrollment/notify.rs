use std::sync::Arc;

use chrono::Utc;

use super::domain::EnrollmentRecord;
use super::repository::{EnrollmentRepository, EnrollmentUpdate};
use crate::notifications::{MailError, Mailer, Notification, OutgoingMail};
use crate::store::RecordStore;

/// Best-effort applicant mail. Delivery failures never fail the mutation that
/// triggered them.
pub struct Notifier<M> {
    mailer: Arc<M>,
    from: String,
}

impl<M> Clone for Notifier<M> {
    fn clone(&self) -> Self {
        Self {
            mailer: Arc::clone(&self.mailer),
            from: self.from.clone(),
        }
    }
}

impl<M> Notifier<M>
where
    M: Mailer,
{
    pub fn new(mailer: Arc<M>, from: impl Into<String>) -> Self {
        Self {
            mailer,
            from: from.into(),
        }
    }

    /// Send and surface the failure. Used where the mail is the whole point,
    /// such as verification codes.
    pub async fn send(&self, to: &str, notification: &Notification) -> Result<(), MailError> {
        let mail = OutgoingMail::render(to, &self.from, notification);
        self.mailer.send(mail).await
    }

    /// Send to the enrollment's applicant and append the delivery to
    /// `emails_sent`. Failures are logged and swallowed.
    pub async fn notify<S>(
        &self,
        enrollments: &EnrollmentRepository<S>,
        record: &EnrollmentRecord,
        notification: Notification,
    ) -> bool
    where
        S: RecordStore,
    {
        let mail = OutgoingMail::render(&record.email, &self.from, &notification);
        let entry = mail.log_entry(Utc::now());

        if let Err(err) = self.mailer.send(mail).await {
            tracing::warn!(
                enrollment_id = %record.id,
                template = notification.template(),
                to = %record.email,
                error = %err,
                "notification failed"
            );
            return false;
        }

        let update = EnrollmentUpdate::new().email_sent(&entry);
        if let Err(err) = enrollments.apply(&record.id, update).await {
            tracing::warn!(
                enrollment_id = %record.id,
                template = notification.template(),
                error = %err,
                "email sent but history could not be recorded"
            );
        }
        true
    }
}
