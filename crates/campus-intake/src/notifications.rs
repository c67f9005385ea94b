//! Outbound applicant mail: templates, the mailer seam, and token refresh.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

const SIGNATURE: &str = "Bright Horizons Institute";

/// Every message the intake workflow sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ApplicationSubmitted {
        name: String,
        course: String,
    },
    InWaitlist {
        name: String,
    },
    DocumentRejected {
        name: String,
        document_label: String,
        reason: String,
    },
    InterviewSchedule {
        name: String,
        course: String,
        start_date: String,
        enrollment_deadline: Option<String>,
    },
    EnrollmentCompleted {
        name: String,
        course: String,
        start_date: Option<String>,
    },
    BatchRemoved {
        name: String,
        course: String,
    },
    FollowUp {
        name: String,
        course: String,
        status_label: String,
    },
    OtpCode {
        name: String,
        code: String,
    },
    /// Sent to the admissions inbox, not to the applicant.
    InstructorApplication {
        applicant_name: String,
        email: String,
        contact_no: String,
        courses: Vec<String>,
        other_courses: String,
        application_id: String,
    },
}

impl Notification {
    pub const fn template(&self) -> &'static str {
        match self {
            Notification::ApplicationSubmitted { .. } => "application_submitted",
            Notification::InWaitlist { .. } => "in_waitlist",
            Notification::DocumentRejected { .. } => "document_rejected",
            Notification::InterviewSchedule { .. } => "interview_schedule",
            Notification::EnrollmentCompleted { .. } => "enrollment_completed",
            Notification::BatchRemoved { .. } => "batch_removed",
            Notification::FollowUp { .. } => "follow_up",
            Notification::OtpCode { .. } => "otp_verification",
            Notification::InstructorApplication { .. } => "instructor_application",
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Notification::ApplicationSubmitted { course, .. } => {
                format!("Application Received: {course} - {SIGNATURE}")
            }
            Notification::InWaitlist { .. } => {
                format!("Your Documents Have Been Accepted - {SIGNATURE}")
            }
            Notification::DocumentRejected { document_label, .. } => {
                format!("Action Required: {document_label} - {SIGNATURE}")
            }
            Notification::InterviewSchedule { course, .. } => {
                format!("Physical Documents & Interview: {course} - {SIGNATURE}")
            }
            Notification::EnrollmentCompleted { course, .. } => {
                format!("Enrollment Complete: {course} - {SIGNATURE}")
            }
            Notification::BatchRemoved { course, .. } => {
                format!("Class Schedule Update: {course} - {SIGNATURE}")
            }
            Notification::FollowUp { course, .. } => {
                format!("Following Up on Your Application: {course} - {SIGNATURE}")
            }
            Notification::OtpCode { .. } => format!("Your Verification Code - {SIGNATURE}"),
            Notification::InstructorApplication { applicant_name, .. } => {
                format!("New Instructor Application: {applicant_name}")
            }
        }
    }

    pub fn html_body(&self) -> String {
        let (greeting_name, heading, paragraphs): (&str, &str, Vec<String>) = match self {
            Notification::ApplicationSubmitted { name, course } => (
                name,
                "Application Received!",
                vec![
                    format!("We received your application for <strong>{}</strong>.", escape(course)),
                    "Upload your required documents so our staff can review them.".to_string(),
                ],
            ),
            Notification::InWaitlist { name } => (
                name,
                "Great News!",
                vec![
                    "All of your documents have been accepted and you are now on the waitlist."
                        .to_string(),
                    "We will email you once a class schedule is available.".to_string(),
                ],
            ),
            Notification::DocumentRejected {
                name,
                document_label,
                reason,
            } => (
                name,
                "Document Requires Re-upload",
                vec![
                    format!("Document: <strong>{}</strong>", escape(document_label)),
                    format!("Reason: {}", escape(reason)),
                    "Please upload a corrected copy from your applicant portal.".to_string(),
                ],
            ),
            Notification::InterviewSchedule {
                name,
                course,
                start_date,
                enrollment_deadline,
            } => {
                let mut lines = vec![
                    format!(
                        "A slot in <strong>{}</strong> starting {} is reserved for you.",
                        escape(course),
                        escape(start_date)
                    ),
                    "Bring the originals of your required documents for verification and a short interview."
                        .to_string(),
                ];
                if let Some(deadline) = enrollment_deadline {
                    lines.push(format!("Please visit on or before {}.", escape(deadline)));
                }
                (name, "Physical Documents &amp; Interview", lines)
            }
            Notification::EnrollmentCompleted {
                name,
                course,
                start_date,
            } => {
                let mut lines = vec![format!(
                    "You are now enrolled in <strong>{}</strong>. Your student account has been activated.",
                    escape(course)
                )];
                if let Some(start) = start_date {
                    lines.push(format!("Classes begin on {}.", escape(start)));
                }
                (name, "Enrollment Complete!", lines)
            }
            Notification::BatchRemoved { name, course } => (
                name,
                "Class Schedule Update",
                vec![
                    format!(
                        "Enrollment for the upcoming <strong>{}</strong> class has closed before your visit.",
                        escape(course)
                    ),
                    "You remain on the waitlist and will be invited to the next schedule.".to_string(),
                ],
            ),
            Notification::FollowUp {
                name,
                course,
                status_label,
            } => (
                name,
                "Friendly Follow-Up",
                vec![
                    format!(
                        "We are following up on your application for <strong>{}</strong>.",
                        escape(course)
                    ),
                    format!("Current status: <strong>{}</strong>", escape(status_label)),
                ],
            ),
            Notification::OtpCode { name, code } => (
                name,
                "Verify Your Email",
                vec![
                    format!("Your verification code is <strong>{}</strong>.", escape(code)),
                    "The code expires in 10 minutes.".to_string(),
                ],
            ),
            Notification::InstructorApplication {
                applicant_name,
                email,
                contact_no,
                courses,
                other_courses,
                application_id,
            } => {
                let interested = if courses.is_empty() {
                    "None selected".to_string()
                } else {
                    courses.iter().map(|course| escape(course)).collect::<Vec<_>>().join(", ")
                };
                let mut lines = vec![
                    format!("Applicant: <strong>{}</strong>", escape(applicant_name)),
                    format!("Email: {}", escape(email)),
                    format!("Contact number: {}", escape(contact_no)),
                    format!("Courses of interest: {interested}"),
                ];
                if !other_courses.trim().is_empty() {
                    lines.push(format!("Other courses: {}", escape(other_courses)));
                }
                lines.push(format!("Application ID: {}", escape(application_id)));
                ("Admissions Team", "New Instructor Application", lines)
            }
        };

        let mut html = String::from("<html><body>");
        html.push_str(&format!("<h2>{heading}</h2>"));
        html.push_str(&format!("<p>Hi {},</p>", escape(greeting_name)));
        for paragraph in paragraphs {
            html.push_str(&format!("<p>{paragraph}</p>"));
        }
        html.push_str(&format!("<p>{SIGNATURE}</p></body></html>"));
        html
    }
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Fully rendered message handed to a [`Mailer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub html_body: String,
    pub template: &'static str,
}

impl OutgoingMail {
    pub fn render(to: &str, from: &str, notification: &Notification) -> Self {
        Self {
            to: to.to_string(),
            from: from.to_string(),
            subject: notification.subject(),
            html_body: notification.html_body(),
            template: notification.template(),
        }
    }

    pub fn log_entry(&self, sent_at: DateTime<Utc>) -> EmailLogEntry {
        EmailLogEntry {
            template: self.template.to_string(),
            to: self.to.clone(),
            subject: self.subject.clone(),
            sent_at,
        }
    }
}

/// One line of an enrollment's `emails_sent` history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailLogEntry {
    pub template: String,
    pub to: String,
    pub subject: String,
    pub sent_at: DateTime<Utc>,
}

/// Mail delivery seam.
pub trait Mailer: Send + Sync + 'static {
    fn send(&self, mail: OutgoingMail) -> impl Future<Output = Result<(), MailError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail transport rejected the access token")]
    Unauthorized,
    #[error("mail transport failed: {0}")]
    Transport(String),
    #[error("mail token refresh failed: {0}")]
    TokenRefresh(String),
}

/// Result of a single delivery attempt against an OAuth-protected API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Unauthorized,
    Failed(String),
}

impl From<TransportError> for MailError {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::Unauthorized => MailError::Unauthorized,
            TransportError::Failed(reason) => MailError::Transport(reason),
        }
    }
}

pub trait MailTransport: Send + Sync + 'static {
    fn deliver(
        &self,
        access_token: &str,
        mail: &OutgoingMail,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Exchanges a long-lived refresh credential for a fresh access token.
pub trait TokenSource: Send + Sync + 'static {
    fn refresh(&self) -> impl Future<Output = Result<String, MailError>> + Send;
}

/// [`Mailer`] that caches the access token and, on `Unauthorized`, refreshes
/// once and retries once.
pub struct RefreshingMailer<T, K> {
    transport: T,
    tokens: K,
    cached: Mutex<Option<String>>,
}

impl<T, K> RefreshingMailer<T, K>
where
    T: MailTransport,
    K: TokenSource,
{
    pub fn new(transport: T, tokens: K) -> Self {
        Self {
            transport,
            tokens,
            cached: Mutex::new(None),
        }
    }

    async fn current_token(&self) -> Result<String, MailError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = self.tokens.refresh().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    async fn refreshed_token(&self) -> Result<String, MailError> {
        let mut cached = self.cached.lock().await;
        let token = self.tokens.refresh().await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

impl<T, K> Mailer for RefreshingMailer<T, K>
where
    T: MailTransport,
    K: TokenSource,
{
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let token = self.current_token().await?;
        match self.transport.deliver(&token, &mail).await {
            Ok(()) => {}
            Err(TransportError::Unauthorized) => {
                tracing::info!(to = %mail.to, "mail token rejected, refreshing");
                let fresh = self.refreshed_token().await?;
                self.transport.deliver(&fresh, &mail).await?;
            }
            Err(other) => return Err(other.into()),
        }
        tracing::info!(to = %mail.to, subject = %mail.subject, "email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    /// Rejects every token except those listed as valid.
    struct ScriptedTransport {
        valid: Vec<&'static str>,
        attempts: StdMutex<Vec<String>>,
    }

    impl MailTransport for ScriptedTransport {
        async fn deliver(&self, access_token: &str, _mail: &OutgoingMail) -> Result<(), TransportError> {
            self.attempts
                .lock()
                .expect("attempts mutex")
                .push(access_token.to_string());
            if self.valid.contains(&access_token) {
                Ok(())
            } else {
                Err(TransportError::Unauthorized)
            }
        }
    }

    struct CountingTokens {
        issued: AtomicUsize,
    }

    impl TokenSource for CountingTokens {
        async fn refresh(&self) -> Result<String, MailError> {
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("token-{n}"))
        }
    }

    fn mail() -> OutgoingMail {
        OutgoingMail::render(
            "juan@example.com",
            "noreply@brighthii.com",
            &Notification::InWaitlist {
                name: "Juan".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn unauthorized_triggers_exactly_one_refresh_and_retry() {
        let mailer = RefreshingMailer::new(
            ScriptedTransport {
                valid: vec!["token-2"],
                attempts: StdMutex::new(Vec::new()),
            },
            CountingTokens {
                issued: AtomicUsize::new(0),
            },
        );

        mailer.send(mail()).await.expect("retry succeeds");

        let attempts = mailer.transport.attempts.lock().unwrap().clone();
        assert_eq!(attempts, vec!["token-1", "token-2"]);

        mailer.send(mail()).await.expect("cached token reused");
        assert_eq!(mailer.tokens.issued.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn a_second_unauthorized_is_surfaced_without_further_retries() {
        let mailer = RefreshingMailer::new(
            ScriptedTransport {
                valid: Vec::new(),
                attempts: StdMutex::new(Vec::new()),
            },
            CountingTokens {
                issued: AtomicUsize::new(0),
            },
        );

        let err = mailer.send(mail()).await.expect_err("still unauthorized");
        assert!(matches!(err, MailError::Unauthorized));
        assert_eq!(mailer.transport.attempts.lock().unwrap().len(), 2);
    }

    #[test]
    fn templates_escape_applicant_supplied_text() {
        let body = Notification::DocumentRejected {
            name: "Ana <script>".to_string(),
            document_label: "Valid Government ID".to_string(),
            reason: "Blurry & cropped".to_string(),
        }
        .html_body();

        assert!(body.contains("Ana &lt;script&gt;"));
        assert!(body.contains("Blurry &amp; cropped"));
    }

    #[test]
    fn instructor_application_notice_lists_the_applicant() {
        let notification = Notification::InstructorApplication {
            applicant_name: "Ana Reyes".to_string(),
            email: "ana@example.com".to_string(),
            contact_no: "09171234567".to_string(),
            courses: vec!["Bookkeeping NC III".to_string(), "Events & Catering".to_string()],
            other_courses: String::new(),
            application_id: "abc123".to_string(),
        };

        assert_eq!(notification.subject(), "New Instructor Application: Ana Reyes");
        let body = notification.html_body();
        assert!(body.contains("Hi Admissions Team,"));
        assert!(body.contains("Bookkeeping NC III, Events &amp; Catering"));
        assert!(!body.contains("Other courses"));
    }

    #[test]
    fn otp_subject_matches_branding() {
        let notification = Notification::OtpCode {
            name: "Ana".to_string(),
            code: "123456".to_string(),
        };
        assert_eq!(
            notification.subject(),
            "Your Verification Code - Bright Horizons Institute"
        );
        assert_eq!(notification.template(), "otp_verification");
    }
}
