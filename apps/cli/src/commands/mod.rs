//! 命令定义和实现

pub mod config;
pub mod decode;
pub mod ports;
pub mod record;

pub use config::ConfigCommand;
pub use decode::DecodeCommand;
pub use ports::PortsCommand;
pub use record::RecordCommand;
