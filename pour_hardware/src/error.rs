use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("bus timeout")]
    Timeout,
    #[error("no acknowledge from device 0x{address:02x}")]
    Nack { address: u8 },
    #[error("bus is closed")]
    Closed,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
