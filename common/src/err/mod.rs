pub mod decode_error;

pub use decode_error::MysqlError;

pub type CResult<T> = Result<T, MysqlError>;
