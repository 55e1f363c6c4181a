pub mod apikey;
pub mod endpoint;
pub mod monitor;
pub mod queue;
pub mod task;
