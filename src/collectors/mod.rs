pub mod platform;

pub use platform::{CounterReading, CounterSnapshot, InterfaceQuery, LinkInfo, create_platform_query};
