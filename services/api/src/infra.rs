use campus_intake::auth::TokenIssuer;
use campus_intake::config::AppConfig;
use campus_intake::notifications::{MailError, Mailer, OutgoingMail};
use campus_intake::store::{LocalBlobStore, MemoryRecordStore};
use campus_intake::workflows::courses::{
    course_router, BatchRepository, Catalog, CourseOverrides, CourseService,
};
use campus_intake::workflows::directory::{directory_router, Directory};
use campus_intake::workflows::instructors::{
    instructor_router, InstructorApplications, InstructorSettings,
};
use campus_intake::workflows::enrollment::{
    enrollment_router, EnrollmentService, EnrollmentSettings, Notifier, WriterLocks,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) blobs: Arc<BlobFiles>,
}

/// Where signed blob links resolve to on disk.
#[derive(Debug, Clone)]
pub(crate) struct BlobFiles {
    pub(crate) root: PathBuf,
    pub(crate) signing_secret: String,
}

/// [`Mailer`] that writes each message to the log instead of delivering it.
/// Real delivery goes through [`Services::with_mailer`], typically with a
/// `RefreshingMailer` over the provider's `MailTransport` and `TokenSource`.
#[derive(Debug, Default, Clone)]
pub(crate) struct LogMailer;

impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        tracing::info!(
            to = %mail.to,
            from = %mail.from,
            subject = %mail.subject,
            template = mail.template,
            "mail delivered to log"
        );
        Ok(())
    }
}

type Store = MemoryRecordStore;

/// Every workflow service wired over the in-process store.
pub(crate) struct Services<M = LogMailer> {
    pub(crate) enrollments: Arc<EnrollmentService<Store, LocalBlobStore, M>>,
    pub(crate) courses: Arc<CourseService<Store, M>>,
    pub(crate) directory: Arc<Directory<Store, LocalBlobStore>>,
    pub(crate) instructors: Arc<InstructorApplications<Store, M>>,
    pub(crate) issuer: Arc<TokenIssuer>,
}

impl Services {
    pub(crate) fn from_config(config: &AppConfig) -> Self {
        Services::with_mailer(config, LogMailer)
    }
}

impl<M: Mailer> Services<M> {
    pub(crate) fn with_mailer(config: &AppConfig, mailer: M) -> Self {
        let store = Arc::new(MemoryRecordStore::new());
        let blobs = Arc::new(LocalBlobStore::new(
            config.storage.blob_root.clone(),
            config.storage.public_base_url.clone(),
            config.storage.signing_secret.clone(),
        ));
        let issuer = Arc::new(TokenIssuer::from_config(&config.auth));
        let catalog = Arc::new(Catalog::standard());
        let overrides = Arc::new(CourseOverrides::new(
            BatchRepository::new(Arc::clone(&store)),
            config.courses.override_ttl(),
        ));
        let notifier = Notifier::new(Arc::new(mailer), config.mail.from_address.clone());
        let writers = Arc::new(WriterLocks::default());

        let enrollments = Arc::new(EnrollmentService::new(
            Arc::clone(&store),
            Arc::clone(&blobs),
            notifier.clone(),
            Arc::clone(&catalog),
            Arc::clone(&overrides),
            Arc::clone(&issuer),
            Arc::clone(&writers),
            EnrollmentSettings {
                signed_url_ttl_minutes: config.storage.signed_url_ttl_minutes,
                submissions_per_minute: config.intake.submissions_per_minute,
                trusted_proxies: config.intake.trusted_proxies.clone(),
            },
        ));
        let instructors = Arc::new(InstructorApplications::new(
            Arc::clone(&store),
            notifier.clone(),
            InstructorSettings {
                admissions_address: config.mail.admissions_address.clone(),
                submissions_per_minute: config.intake.instructor_applications_per_minute,
                trusted_proxies: config.intake.trusted_proxies.clone(),
            },
        ));
        let courses = Arc::new(CourseService::new(
            Arc::clone(&store),
            catalog,
            overrides,
            notifier,
            Arc::clone(&writers),
        ));
        let directory = Arc::new(Directory::new(
            store,
            blobs,
            Arc::clone(&issuer),
            config.storage.signed_url_ttl_minutes,
            writers,
        ));

        Self {
            enrollments,
            courses,
            directory,
            instructors,
            issuer,
        }
    }

    pub(crate) fn router(&self) -> axum::Router {
        enrollment_router(Arc::clone(&self.enrollments), Arc::clone(&self.issuer))
            .merge(course_router(Arc::clone(&self.courses), Arc::clone(&self.issuer)))
            .merge(directory_router(Arc::clone(&self.directory)))
            .merge(instructor_router(Arc::clone(&self.instructors), Arc::clone(&self.issuer)))
    }
}

impl BlobFiles {
    pub(crate) fn from_config(config: &AppConfig) -> Self {
        Self {
            root: config.storage.blob_root.clone(),
            signing_secret: config.storage.signing_secret.clone(),
        }
    }
}
