//! Clients for the Google APIs the service forwards to.
//!
//! Both clients sit behind traits so the HTTP layer can be exercised without
//! network access.

pub use self::oauth::{GoogleOAuthClient, IdentityProvider};
pub use self::resource_manager::{ProjectsApi, ResourceManagerClient};
pub use self::types::*;

mod oauth;
mod resource_manager;
mod types;
