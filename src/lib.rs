//! EatS personal health tracker — account and credential layer.
//!
//! The tracker pages (food, sleep, BMI) live in the application frontend and
//! reach this crate through [`auth::AccountStore`]: register a user, verify a
//! login attempt, change a password. The store owns the durable account
//! table; everything else in the application is presentation glue on top of
//! the [`auth::Session`] it hands back.

pub mod auth;
