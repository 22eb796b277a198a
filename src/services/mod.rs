//! Business logic services.

pub mod api_key;
pub mod browserid;
pub mod cleanup;
pub mod execution;
pub mod mailer;
pub mod openid;
pub mod runs;

pub use browserid::BrowserIdHandle;
pub use cleanup::{CleanupConfig, start_cleanup_task};
pub use mailer::MailerHandle;
pub use openid::OpenIdHandle;
