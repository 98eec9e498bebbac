pub mod pkg;
pub mod resolve;
pub mod version;
