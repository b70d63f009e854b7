use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::{Deref, Display, Error, From};
use serde::{Deserialize, Serialize};

use crate::domain::{Aggregation, Entity, Event, EventQueue, Id};

use super::{ArcadeError, BookingId, CustomerId, Money, ValidationError};

/// チャージの最低額(ルピー)
pub const MINIMUM_TOPUP_MAJOR: i64 = 100;

/// ウォレット台帳
#[async_trait]
pub trait WalletLedger: Send + Sync {
    /// 現在の残高
    async fn balance(&self, customer: CustomerId) -> Result<Money, ArcadeError>;
    /// チャージしてボーナスを付与する
    async fn top_up(&self, customer: CustomerId, amount: Money) -> Result<TopupReceipt, ArcadeError>;
    /// 予約代金を引き落とし、引き落とし後の残高を返す
    async fn charge(
        &self,
        customer: CustomerId,
        booking: BookingId,
        amount: Money,
    ) -> Result<Money, ArcadeError>;
    /// 取引履歴を新しい順に返す
    async fn transactions(&self, customer: CustomerId) -> Result<Vec<WalletTransaction>, ArcadeError>;
}

/// チャージ額に応じたボーナス率(%)
///
/// 1000以上は10%、500以上1000未満は5%、それ未満は0%。
pub fn bonus_percentage(amount: Money) -> u32 {
    if amount >= Money::from_major(1000) {
        10
    } else if amount >= Money::from_major(500) {
        5
    } else {
        0
    }
}

/// チャージ額に付くボーナスを計算する。最低額未満はエラー。
pub fn compute_topup_bonus(amount: Money) -> Result<Money, ValidationError> {
    TopupPolicy::default().bonus(amount)
}

/// チャージの受付条件
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopupPolicy {
    minimum: Money,
}

impl TopupPolicy {
    pub fn new(minimum: Money) -> Result<Self, ValidationError> {
        if minimum.is_negative() {
            return Err(ValidationError::NegativeAmount(minimum));
        }
        Ok(Self { minimum })
    }

    pub fn minimum(&self) -> Money {
        self.minimum
    }

    pub fn bonus(&self, amount: Money) -> Result<Money, ValidationError> {
        if amount < self.minimum {
            return Err(ValidationError::BelowMinimumTopup {
                amount,
                minimum: self.minimum,
            });
        }
        Ok(amount.scale_round(bonus_percentage(amount) as i64, 100))
    }
}

impl Default for TopupPolicy {
    fn default() -> Self {
        Self {
            minimum: Money::from_major(MINIMUM_TOPUP_MAJOR),
        }
    }
}

/// チャージ結果
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopupReceipt {
    pub amount_paid: Money,
    pub bonus: Money,
    pub bonus_percentage: u32,
    pub credited_amount: Money,
    pub new_balance: Money,
}

/// 取引ID
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Deref, Default,
)]
pub struct TransactionId(u64);

impl Id for TransactionId {
    type Inner = u64;
}

/// 取引の種類
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    #[display(fmt = "topup")]
    Topup,
    #[display(fmt = "booking")]
    Booking,
}

/// ウォレットの取引
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    id: TransactionId,
    customer: CustomerId,
    kind: TransactionKind,
    amount: Money,
    bonus: Money,
    final_amount: Money,
    booking_id: Option<BookingId>,
    timestamp: DateTime<Utc>,
}

impl WalletTransaction {
    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn bonus(&self) -> Money {
        self.bonus
    }

    /// 残高に反映される額(引き落としは負)
    pub fn final_amount(&self) -> Money {
        self.final_amount
    }

    pub fn booking_id(&self) -> Option<BookingId> {
        self.booking_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Entity for WalletTransaction {
    type Id = TransactionId;

    const ENTITY_NAME: &'static str = "wallet_transaction";

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// ウォレットイベント
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletEvent {
    /// ウォレットが開設された
    WalletOpened { id: CustomerId },
    /// チャージされた
    WalletToppedUp {
        id: CustomerId,
        transaction: WalletTransaction,
    },
    /// 予約代金が引き落とされた
    WalletCharged {
        id: CustomerId,
        transaction: WalletTransaction,
    },
}

impl Event for WalletEvent {
    type Id = CustomerId;
}

/// ウォレットエンティティ
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Wallet {
    id: CustomerId,
    balance: Money,
    transactions: Vec<WalletTransaction>,
    #[serde(skip)]
    events: EventQueue<WalletEvent>,
}

impl Wallet {
    pub fn open(id: CustomerId) -> Self {
        let mut entity = Wallet {
            id,
            ..Default::default()
        };
        entity.events.push(WalletEvent::WalletOpened { id });
        entity
    }

    pub fn top_up(
        &mut self,
        transaction_id: TransactionId,
        amount: Money,
        policy: &TopupPolicy,
        at: DateTime<Utc>,
    ) -> Result<TopupReceipt, WalletError> {
        let bonus = policy.bonus(amount)?;
        let credited_amount = amount + bonus;
        let event = WalletEvent::WalletToppedUp {
            id: self.id,
            transaction: WalletTransaction {
                id: transaction_id,
                customer: self.id,
                kind: TransactionKind::Topup,
                amount,
                bonus,
                final_amount: credited_amount,
                booking_id: None,
                timestamp: at,
            },
        };
        self.validate(&event)?;
        self.mutate(event.clone());
        self.events.push(event);
        Ok(TopupReceipt {
            amount_paid: amount,
            bonus,
            bonus_percentage: bonus_percentage(amount),
            credited_amount,
            new_balance: self.balance,
        })
    }

    pub fn charge(
        &mut self,
        transaction_id: TransactionId,
        booking_id: BookingId,
        amount: Money,
        at: DateTime<Utc>,
    ) -> Result<Money, WalletError> {
        let event = WalletEvent::WalletCharged {
            id: self.id,
            transaction: WalletTransaction {
                id: transaction_id,
                customer: self.id,
                kind: TransactionKind::Booking,
                amount: -amount,
                bonus: Money::ZERO,
                final_amount: -amount,
                booking_id: Some(booking_id),
                timestamp: at,
            },
        };
        self.validate(&event)?;
        self.mutate(event.clone());
        self.events.push(event);
        Ok(self.balance)
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    /// 取引を新しい順に返す
    pub fn transactions(&self) -> impl Iterator<Item = &WalletTransaction> {
        self.transactions.iter().rev()
    }

    fn validate_id(&self, id: &CustomerId) -> Result<(), WalletError> {
        match self.id == *id {
            true => Ok(()),
            false => Err(WalletError::MismatchedId),
        }
    }

    fn validate_topped_up(transaction: &WalletTransaction) -> Result<(), WalletError> {
        if transaction.amount.is_negative() || transaction.bonus.is_negative() {
            return Err(ValidationError::NegativeAmount(transaction.amount).into());
        }
        Ok(())
    }

    fn validate_charged(&self, transaction: &WalletTransaction) -> Result<(), WalletError> {
        let required = -transaction.final_amount;
        if required.is_negative() {
            return Err(ValidationError::NegativeAmount(required).into());
        }
        if self.balance < required {
            return Err(WalletError::InsufficientBalance {
                balance: self.balance,
                required,
            });
        }
        Ok(())
    }

    fn mutate(&mut self, event: WalletEvent) {
        match event {
            WalletEvent::WalletOpened { id } => {
                *self = Wallet {
                    id,
                    ..Default::default()
                };
            }
            WalletEvent::WalletToppedUp { transaction, .. }
            | WalletEvent::WalletCharged { transaction, .. } => {
                self.balance = self.balance + transaction.final_amount;
                self.transactions.push(transaction);
            }
        }
    }
}

impl Entity for Wallet {
    type Id = CustomerId;

    const ENTITY_NAME: &'static str = "wallet";

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl Aggregation for Wallet {
    type Event = WalletEvent;
    type Error = WalletError;

    fn validate(&self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            WalletEvent::WalletOpened { .. } => Ok(()),
            WalletEvent::WalletToppedUp { id, transaction } => {
                self.validate_id(id)?;
                Self::validate_topped_up(transaction)
            }
            WalletEvent::WalletCharged { id, transaction } => {
                self.validate_id(id)?;
                self.validate_charged(transaction)
            }
        }
    }

    fn apply(&mut self, event: Self::Event) {
        if let WalletEvent::WalletOpened { id } = event {
            if self.id != id {
                self.mutate(event);
            }
            return;
        }
        if self.validate(&event).is_ok() {
            self.mutate(event);
        }
    }

    fn events(&self) -> &EventQueue<Self::Event> {
        &self.events
    }

    fn events_mut(&mut self) -> &mut EventQueue<Self::Event> {
        &mut self.events
    }
}

impl PartialEq for Wallet {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.balance == other.balance && self.transactions == other.transactions
    }
}

impl Eq for Wallet {}

/// ウォレットエラー
#[derive(Error, Display, Debug, From)]
pub enum WalletError {
    /// IDが一致しません
    #[display(fmt = "ID does not match")]
    #[from(ignore)]
    MismatchedId,
    /// 残高が足りません
    #[display(fmt = "Insufficient wallet balance")]
    #[from(ignore)]
    InsufficientBalance { balance: Money, required: Money },
    /// 入力値が不正です
    #[display(fmt = "{}", _0)]
    Validation(#[error(source)] ValidationError),
}

impl From<WalletError> for ArcadeError {
    fn from(value: WalletError) -> Self {
        match value {
            WalletError::MismatchedId => ArcadeError::Rejected("Wallet does not match".to_owned()),
            WalletError::InsufficientBalance { balance, required } => {
                ArcadeError::InsufficientBalance { balance, required }
            }
            WalletError::Validation(e) => ArcadeError::Validation(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_topup_bonus_tiers() {
        assert_eq!(compute_topup_bonus(Money::from_major(500)), Ok(Money::from_major(25)));
        assert_eq!(compute_topup_bonus(Money::from_major(999)), Ok(Money::from_minor(4995)));
        assert_eq!(compute_topup_bonus(Money::from_major(1000)), Ok(Money::from_major(100)));
        assert_eq!(compute_topup_bonus(Money::from_major(2000)), Ok(Money::from_major(200)));
        assert_eq!(compute_topup_bonus(Money::from_major(100)), Ok(Money::ZERO));
        assert_eq!(compute_topup_bonus(Money::from_major(499)), Ok(Money::ZERO));
    }

    #[test]
    fn test_topup_below_minimum_is_rejected() {
        assert_eq!(
            compute_topup_bonus(Money::from_major(99)),
            Err(ValidationError::BelowMinimumTopup {
                amount: Money::from_major(99),
                minimum: Money::from_major(100),
            })
        );
        assert!(compute_topup_bonus(Money::from_minor(9999)).is_err());
    }

    #[test]
    fn test_bonus_rounds_to_paise() {
        // 500.01 × 5% = 25.0005 -> 25.00
        assert_eq!(compute_topup_bonus(Money::from_minor(50001)), Ok(Money::from_major(25)));
        // 999.99 × 5% = 49.9995 -> 50.00
        assert_eq!(compute_topup_bonus(Money::from_minor(99999)), Ok(Money::from_major(50)));
    }

    #[test]
    fn test_wallet_topup_and_charge() {
        let mut wallet = Wallet::open(CustomerId::from(7));
        let receipt = wallet
            .top_up(TransactionId::from(1), Money::from_major(1000), &TopupPolicy::default(), now())
            .unwrap();
        assert_eq!(receipt.bonus, Money::from_major(100));
        assert_eq!(receipt.bonus_percentage, 10);
        assert_eq!(receipt.credited_amount, Money::from_major(1100));
        assert_eq!(receipt.new_balance, Money::from_major(1100));

        let balance = wallet
            .charge(TransactionId::from(2), BookingId::from(9), Money::from_major(229), now())
            .unwrap();
        assert_eq!(balance, Money::from_major(871));

        let history = wallet.transactions().collect::<Vec<_>>();
        assert_eq!(history[0].kind(), TransactionKind::Booking);
        assert_eq!(history[0].final_amount(), -Money::from_major(229));
        assert_eq!(history[0].booking_id(), Some(BookingId::from(9)));
        assert_eq!(history[1].kind(), TransactionKind::Topup);
        assert_eq!(wallet.pop_all().len(), 3);
    }

    #[test]
    fn test_wallet_rejects_overdraft() {
        let mut wallet = Wallet::open(CustomerId::from(7));
        let err = wallet
            .charge(TransactionId::from(1), BookingId::from(1), Money::from_major(149), now())
            .unwrap_err();
        assert!(matches!(err, WalletError::InsufficientBalance { .. }));
        assert_eq!(wallet.balance(), Money::ZERO);
        assert_eq!(wallet.events().len(), 1);
    }

    #[test]
    fn test_wallet_rebuilds_from_events() {
        let mut wallet = Wallet::open(CustomerId::from(3));
        wallet
            .top_up(TransactionId::from(1), Money::from_major(500), &TopupPolicy::default(), now())
            .unwrap();
        wallet
            .charge(TransactionId::from(2), BookingId::from(4), Money::from_minor(7450), now())
            .unwrap();

        let mut rebuilt = Wallet::default();
        for event in wallet.pop_all() {
            rebuilt.apply(event);
        }
        assert_eq!(rebuilt, wallet);
        assert_eq!(rebuilt.balance(), Money::from_minor(45050));
    }
}
