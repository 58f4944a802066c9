/// Aliqin AccessKey credential (`app_key` + secret).
///
/// The `Debug` implementation redacts `access_key_secret` to prevent
/// accidental leakage in logs.
#[derive(Clone)]
pub struct Credential {
    pub access_key_id: String,
    pub access_key_secret: String,
}

impl Credential {
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: access_key_secret.into(),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"****")
            .finish()
    }
}
