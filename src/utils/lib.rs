pub mod id;
pub mod logger;
pub mod time;
