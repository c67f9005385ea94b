//! Staff accounts and the student roster.

mod router;
mod staff;
mod students;


use std::sync::Arc;

use crate::auth::TokenIssuer;
use crate::store::{BlobStore, RecordStore};
use crate::workflows::enrollment::WriterLocks;

pub use router::directory_router;
pub use staff::{StaffDirectory, StaffDraft, StaffMember, StaffRoleChange};
pub use students::{
    EmailChange, EmailChangeRequest, StudentDetail, StudentDirectory, StudentDocument, StudentEnrollment,
};

/// Both rosters behind one router state.
pub struct Directory<S, B> {
    pub staff: StaffDirectory<S>,
    pub students: StudentDirectory<S, B>,
    pub(crate) issuer: Arc<TokenIssuer>,
}

impl<S, B> Directory<S, B>
where
    S: RecordStore,
    B: BlobStore,
{
    pub fn new(
        store: Arc<S>,
        blobs: Arc<B>,
        issuer: Arc<TokenIssuer>,
        signed_url_ttl_minutes: u32,
        writers: Arc<WriterLocks>,
    ) -> Self {
        Self {
            staff: StaffDirectory::new(Arc::clone(&store)),
            students: StudentDirectory::new(store, blobs, signed_url_ttl_minutes, writers),
            issuer,
        }
    }
}
