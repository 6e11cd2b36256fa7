pub mod api_store;
pub mod http_source;
pub mod local_file;
pub mod memory_store;
pub mod random;
pub mod system_clock;
pub mod wire;
