pub mod clock;
pub mod content;
pub mod local;
pub mod random;
pub mod store;
