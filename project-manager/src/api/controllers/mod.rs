pub mod auth;
pub mod bulk;
pub mod projects;
pub mod user;
