mod booking;
mod wallet;

pub use self::booking::*;
pub use self::wallet::*;
