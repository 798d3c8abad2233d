pub mod returns;
pub mod volatility;

pub use returns::TrailingReturn;
pub use volatility::{RollingVolatility, VolumeZScore};
