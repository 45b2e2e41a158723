mod subscriber;

pub use subscriber::{default_level, init};
