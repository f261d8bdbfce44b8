pub mod credentials;
pub mod oauth;
pub mod provision;
pub mod sheets;
pub mod tokens;
