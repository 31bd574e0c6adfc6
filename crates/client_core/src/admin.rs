/// Shared-passphrase check guarding administrative break edits. The
/// comparison is plain text; this keeps honest users out of the admin
/// editor and is not a security boundary.
#[derive(Debug, Clone)]
pub struct AdminGate {
    passphrase: String,
}

/// Proof that [`AdminGate::unlock`] succeeded.
#[derive(Debug)]
pub struct AdminAccess {
    _private: (),
}

impl AdminGate {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
        }
    }

    pub fn unlock(&self, attempt: &str) -> Option<AdminAccess> {
        if !self.passphrase.is_empty() && attempt == self.passphrase {
            Some(AdminAccess { _private: () })
        } else {
            None
        }
    }
}

#[cfg(test)]
impl AdminAccess {
    pub(crate) fn granted() -> Self {
        Self { _private: () }
    }
}
