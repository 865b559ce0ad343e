pub mod capture_delegate;
pub mod capture_provider;
pub mod capture_session;
pub mod clock;
pub mod encoder;
pub mod muxer;
