//! The Issue, Validate, Renew and Cancel operations.

mod cancel;
mod common;
mod issue;
mod renew;
mod validate;

pub use cancel::CancelOperation;
pub use issue::IssueOperation;
pub use renew::RenewOperation;
pub use validate::ValidateOperation;
