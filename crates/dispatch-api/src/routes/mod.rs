pub mod endpoints;
pub mod monitors;
pub mod queues;
pub mod sync;
pub mod tasks;
