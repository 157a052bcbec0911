use std::fmt;
use std::future::IntoFuture;
use std::rc::Weak;

use futures::future::LocalBoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};

use super::notify::Shared;
use crate::types::{ValidationError, ValidationVerdict, ValueHostValidateResult};
use crate::value_host::PendingRule;

/// The outcome of a validating call.
///
/// The synchronous part is available immediately. Awaiting it drives any
/// asynchronous conditions to completion, applying each result as it
/// arrives, and yields the verdict once nothing is left running. Dropping it
/// abandons those results; the affected fields stay `Undetermined` until
/// validated again.
#[must_use = "asynchronous rule results are only applied when this is awaited"]
pub struct PendingValidation {
    verdict: ValidationVerdict,
    results: Vec<ValueHostValidateResult>,
    rules: Vec<PendingRule>,
    shared: Weak<Shared>,
    skip_callbacks: bool,
}

impl fmt::Debug for PendingValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingValidation")
            .field("verdict", &self.verdict)
            .field("results", &self.results.len())
            .field("pending", &self.rules.len())
            .finish()
    }
}

impl PendingValidation {
    pub(crate) fn new(
        verdict: ValidationVerdict,
        results: Vec<ValueHostValidateResult>,
        rules: Vec<PendingRule>,
        shared: Weak<Shared>,
        skip_callbacks: bool,
    ) -> Self {
        Self {
            verdict,
            results,
            rules,
            shared,
            skip_callbacks,
        }
    }

    /// Verdict right after the synchronous part ran.
    pub fn verdict(&self) -> &ValidationVerdict {
        &self.verdict
    }

    /// Per-field reports from the synchronous part. Fields where nothing ran
    /// and nothing was found have no entry.
    #[must_use]
    pub fn results(&self) -> &[ValueHostValidateResult] {
        &self.results
    }

    /// `true` when no asynchronous condition is outstanding.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.rules.is_empty()
    }

    async fn settle(self) -> Result<ValidationVerdict, ValidationError> {
        let Self {
            mut verdict,
            rules,
            shared,
            skip_callbacks,
            ..
        } = self;
        if rules.is_empty() {
            return Ok(verdict);
        }

        let mut running: FuturesUnordered<_> = rules
            .into_iter()
            .map(|rule| async move {
                let PendingRule {
                    field,
                    error_code,
                    epoch,
                    future,
                } = rule;
                (field, error_code, epoch, future.await)
            })
            .collect();

        let mut first_error = None;
        while let Some((field, error_code, epoch, result)) = running.next().await {
            let Some(shared) = shared.upgrade() else {
                continue;
            };
            let applied = {
                let mut core = shared.core.borrow_mut();
                if core.disposed {
                    continue;
                }
                let applied = core.apply_async(&field, &error_code, epoch, result, skip_callbacks);
                verdict = core.verdict();
                applied
            };
            shared.flush();
            if let Err(err) = applied {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(verdict),
        }
    }
}

impl IntoFuture for PendingValidation {
    type Output = Result<ValidationVerdict, ValidationError>;
    type IntoFuture = LocalBoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.settle())
    }
}
