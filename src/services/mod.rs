pub mod auth;
pub mod handoff;
pub mod notify;
pub mod passkey;

pub use auth::AuthService;
pub use handoff::HandoffService;
pub use notify::NotifyService;
pub use passkey::PasskeyService;
