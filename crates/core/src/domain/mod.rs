pub mod backoff;
pub mod media;
pub mod model;
