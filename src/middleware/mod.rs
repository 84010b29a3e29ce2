pub mod timing;

pub use timing::{judoscale_middleware, Instrumentation, QueueTime};
