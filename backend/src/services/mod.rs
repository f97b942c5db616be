pub mod conversions_service;
pub mod registration_service;
pub mod sheets_service;
pub mod sinks;
