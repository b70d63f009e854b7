mod availability;
mod booking;
mod customer;
mod desk;
mod pricing;
mod slot;
mod stats;
mod wallet;

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Neg, Sub};

use derive_more::{Display, Error, From};
use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};

use super::DataAccessError;

pub use self::availability::*;
pub use self::booking::*;
pub use self::customer::*;
pub use self::desk::*;
pub use self::pricing::*;
pub use self::slot::*;
pub use self::stats::*;
pub use self::wallet::*;

/// 通貨
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Currency {
    /// インドルピー
    #[default]
    INR,
}

impl Currency {
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::INR => "₹",
        }
    }

    pub fn locale(&self) -> Locale {
        match self {
            Currency::INR => Locale::en_IN,
        }
    }
}

/// 金額
///
/// 最小通貨単位(INRならパイサ)の整数で保持する。
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Money {
    minor: i64,
    currency: Currency,
}

impl Money {
    pub const ZERO: Money = Money {
        minor: 0,
        currency: Currency::INR,
    };

    pub fn new(minor: i64, currency: Currency) -> Self {
        Self { minor, currency }
    }

    pub fn from_minor(minor: i64) -> Self {
        Self::new(minor, Currency::INR)
    }

    pub fn from_major(major: i64) -> Self {
        Self::new(major * 100, Currency::INR)
    }

    pub fn minor(&self) -> i64 {
        self.minor
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_negative(&self) -> bool {
        self.minor < 0
    }

    /// `self * numerator / denominator` を四捨五入(0.5は切り上げ)する
    ///
    /// 負の金額には使わない。
    pub fn scale_round(&self, numerator: i64, denominator: i64) -> Money {
        let product = self.minor as i128 * numerator as i128;
        let denominator = denominator as i128;
        let rounded = (product + denominator / 2) / denominator;
        Money::new(rounded as i64, self.currency)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        debug_assert_eq!(self.currency, rhs.currency);
        Money::new(self.minor + rhs.minor, self.currency)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        debug_assert_eq!(self.currency, rhs.currency);
        Money::new(self.minor - rhs.minor, self.currency)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Self::Output {
        Money::new(-self.minor, self.currency)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.minor < 0 { "-" } else { "" };
        let abs = self.minor.unsigned_abs();
        write!(
            f,
            "{}{}{}.{:02}",
            sign,
            self.currency.symbol(),
            (abs / 100).to_formatted_string(&self.currency.locale()),
            abs % 100
        )
    }
}

/// 入力値の検証エラー
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// 利用時間が不正です
    #[display(fmt = "Invalid duration: {} minutes", _0)]
    InvalidDuration(#[error(not(source))] u32),
    /// コントローラー数が不正です
    #[display(fmt = "Controllers must be between 1 and 4, got {}", _0)]
    InvalidControllers(#[error(not(source))] u32),
    /// セットアップ番号が不正です
    #[display(fmt = "Invalid setup: {}", _0)]
    InvalidResource(#[error(not(source))] u32),
    /// チャージ額が最低額に届いていません
    #[display(fmt = "Minimum top-up amount is {}, got {}", minimum, amount)]
    BelowMinimumTopup { amount: Money, minimum: Money },
    /// 金額が負です
    #[display(fmt = "Amount must not be negative: {}", _0)]
    NegativeAmount(#[error(not(source))] Money),
    /// 区間の開始が終了以降です
    #[display(fmt = "Interval start {} is not before end {}", start, end)]
    EmptyInterval { start: TimeOfDay, end: TimeOfDay },
    /// 時刻の形式が不正です
    #[display(fmt = "Invalid time of day: {}", _0)]
    InvalidTime(#[error(not(source))] String),
    /// 日付の形式が不正です
    #[display(fmt = "Invalid date: {}", _0)]
    InvalidDate(#[error(not(source))] String),
    /// スロットの刻みが0です
    #[display(fmt = "Slot step must be positive")]
    InvalidStep,
    /// 予約が日付をまたぎます
    #[display(fmt = "Booking from {} for {} minutes runs past midnight", start, minutes)]
    EndsAfterMidnight { start: TimeOfDay, minutes: u32 },
    /// 開始時刻が営業時間の枠にありません
    #[display(fmt = "Start time {} is not an offered slot", _0)]
    OffGrid(#[error(not(source))] TimeOfDay),
}

/// 予約・ウォレット操作のエラー
#[derive(Error, Display, Debug, From)]
pub enum ArcadeError {
    /// 入力値が不正です
    #[display(fmt = "{}", _0)]
    Validation(#[error(source)] ValidationError),
    /// 指定の時間帯は予約済みです
    #[display(fmt = "Time slot {} on {} is already booked for setup {}", start, date, resource)]
    #[from(ignore)]
    Conflict {
        date: DateStamp,
        resource: ResourceId,
        start: TimeOfDay,
    },
    /// ウォレット残高が足りません
    #[display(fmt = "Insufficient wallet balance: {} available, {} required", balance, required)]
    #[from(ignore)]
    InsufficientBalance { balance: Money, required: Money },
    /// 受付側に拒否されました
    #[display(fmt = "{}", _0)]
    #[from(ignore)]
    Rejected(#[error(not(source))] String),
    /// 外部サービスが利用できません
    #[display(fmt = "Service unavailable: {}", _0)]
    UpstreamUnavailable(#[error(source)] DataAccessError),
}
