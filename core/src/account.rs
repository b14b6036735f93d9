//! The authenticated user's profile.

use crate::error::ToonDbError;
use crate::transport::{envelope, Transport};
use crate::types::UserProfile;

#[derive(Clone, Copy)]
pub struct Account<'a> {
    transport: &'a Transport,
}

impl<'a> Account<'a> {
    pub(crate) fn new(transport: &'a Transport) -> Self {
        Self { transport }
    }

    pub fn me(&self) -> Result<UserProfile, ToonDbError> {
        let body = self.transport.get("/api/user")?;
        envelope(body, "user")
    }
}
