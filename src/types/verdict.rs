use std::fmt;

use serde::{Deserialize, Serialize};

use super::issue::IssueFound;

/// Whole-manager validation verdict.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[must_use]
pub struct ValidationVerdict {
    is_valid: bool,
    do_not_save: bool,
    issues_found: Vec<IssueFound>,
    async_processing: bool,
}

impl fmt::Display for ValidationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "valid = {}, do_not_save = {}, issues = {}",
            self.is_valid,
            self.do_not_save,
            self.issues_found.len()
        )?;
        if self.async_processing {
            write!(f, " (async pending)")?;
        }
        Ok(())
    }
}

impl ValidationVerdict {
    pub fn new(
        is_valid: bool,
        do_not_save: bool,
        issues_found: Vec<IssueFound>,
        async_processing: bool,
    ) -> Self {
        Self {
            is_valid,
            do_not_save,
            issues_found,
            async_processing,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    #[must_use]
    pub fn do_not_save(&self) -> bool {
        self.do_not_save
    }

    /// Flat issue list, ordered by field with business-logic errors that have
    /// no field last.
    #[must_use]
    pub fn issues_found(&self) -> &[IssueFound] {
        &self.issues_found
    }

    #[must_use]
    pub fn async_processing(&self) -> bool {
        self.async_processing
    }
}
