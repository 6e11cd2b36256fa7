pub mod anonymous;
pub mod context;
pub mod likes;
pub mod pipeline;
pub mod seen;
