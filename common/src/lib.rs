pub mod buffer2;
pub mod file_format;

pub use buffer2::Buffer2;
pub use file_format::{FileFormat, SerdeFormatError, deserialize, serialize};
