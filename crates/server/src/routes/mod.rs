pub mod admin;
pub mod auth;
pub mod comments;
pub mod projects;
pub mod users;
