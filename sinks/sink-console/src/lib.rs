mod sink;

pub use self::sink::{ConsoleSink, SinkConsoleError};
