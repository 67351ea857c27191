pub mod config;
pub mod onboarding;
pub mod session;
pub mod stats;
