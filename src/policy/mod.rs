//! Capability classification and the authorization gate.
//!
//! A request is authorized when the capability it requires is present,
//! verbatim, in the caller's granted set. Anything that prevents the
//! capability from being derived is a denial.

mod classify;

pub use classify::{classify, resolve_job_capability, ClassificationError, RequestTarget};

use crate::backend::JobStatusStore;
use crate::domain::{Capability, Identity};
use crate::error::AppError;
use metrics::counter;

pub type PolicyResult<T> = std::result::Result<T, AppError>;

/// Exact set-membership check. No wildcards, prefixes or hierarchy.
pub fn authorize(identity: &Identity, capability: &Capability) -> PolicyResult<()> {
    if identity.has_capability(capability) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "Caller is not permitted to perform '{}'",
            capability
        )))
    }
}

/// Classify the request and gate it. Classification failures deny.
pub async fn enforce(
    identity: &Identity,
    target: &RequestTarget<'_>,
    store: &dyn JobStatusStore,
) -> PolicyResult<Capability> {
    let capability = match classify(target, store).await {
        Ok(capability) => capability,
        Err(e) => {
            tracing::warn!(
                user = %identity.distinguished_name(),
                action = "classify",
                path = %target.path,
                error = %e,
                "Request could not be classified, denying"
            );
            counter!("jobgate_authz_decisions_total", "decision" => "unclassified").increment(1);
            return Err(AppError::Forbidden(format!(
                "Unable to determine the capability required: {}",
                e
            )));
        }
    };

    match authorize(identity, &capability) {
        Ok(()) => {
            counter!("jobgate_authz_decisions_total", "decision" => "allow").increment(1);
            Ok(capability)
        }
        Err(e) => {
            tracing::warn!(
                user = %identity.distinguished_name(),
                action = "authorize",
                capability = %capability,
                "Capability not granted"
            );
            counter!("jobgate_authz_decisions_total", "decision" => "deny").increment(1);
            Err(e)
        }
    }
}
