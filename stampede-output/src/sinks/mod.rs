pub mod filesystem;
pub mod stdio;

pub use filesystem::FileSink;
pub use stdio::StdoutSink;
