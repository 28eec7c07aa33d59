pub mod admin;
pub mod featured;
pub mod interactions;
pub mod projects;
pub mod users;
