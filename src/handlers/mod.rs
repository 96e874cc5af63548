pub mod auth;
pub mod handoff;
pub mod passkey;
pub mod user;
