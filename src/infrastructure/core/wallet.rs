use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::core::{
    ArcadeError, BookingId, CustomerId, Money, TopupPolicy, TopupReceipt, TransactionId, Wallet,
    WalletEvent, WalletLedger, WalletTransaction,
};
use crate::domain::{Aggregation, DataAccessError, Entity, IdGeneratorTask};
use crate::infrastructure::{
    from_event, stream_name, try_from_record, ExpectedRevision, InMemoryEventStore,
};

/// イベントストアに記録するウォレット台帳
pub struct InMemoryWalletLedger {
    store: InMemoryEventStore,
    policy: TopupPolicy,
    ids: IdGeneratorTask,
    // 読み込みから保存までを直列化する
    commands: Mutex<()>,
}

impl InMemoryWalletLedger {
    pub fn new(policy: TopupPolicy) -> Self {
        Self::with_ids(policy, IdGeneratorTask::for_node(1, 2))
    }

    pub fn with_ids(policy: TopupPolicy, ids: IdGeneratorTask) -> Self {
        Self {
            store: InMemoryEventStore::new(),
            policy,
            ids,
            commands: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> &TopupPolicy {
        &self.policy
    }

    pub async fn find_by_id(&self, id: CustomerId) -> Result<Option<Wallet>, DataAccessError> {
        let stream_name = stream_name::<Wallet>(id);
        match self.store.read_stream(&stream_name).await {
            Some(records) => {
                let mut entity = Wallet::default();
                for record in records.iter() {
                    entity.apply(try_from_record::<WalletEvent, CustomerId>(&stream_name, record)?);
                }
                entity.clear();
                Ok(Some(entity))
            }
            None => Ok(None),
        }
    }

    pub async fn save(&self, entity: &mut Wallet) -> Result<bool, DataAccessError> {
        let stream_name = stream_name::<Wallet>(entity.id());
        let rev = match entity.peek() {
            Some(WalletEvent::WalletOpened { .. }) => ExpectedRevision::NoStream,
            Some(_) => ExpectedRevision::StreamExists,
            None => return Ok(false),
        };
        let records = entity
            .pop_all()
            .into_iter()
            .map(from_event)
            .collect::<Result<Vec<_>, _>>()?;
        self.store
            .append_to_stream(&stream_name, rev, records)
            .await?;
        Ok(true)
    }

    async fn find_or_open(&self, id: CustomerId) -> Result<Wallet, DataAccessError> {
        match self.find_by_id(id).await? {
            Some(wallet) => Ok(wallet),
            None => {
                debug!("ウォレットを開設します: {}", id);
                Ok(Wallet::open(id))
            }
        }
    }
}

#[async_trait]
impl WalletLedger for InMemoryWalletLedger {
    async fn balance(&self, customer: CustomerId) -> Result<Money, ArcadeError> {
        Ok(self
            .find_by_id(customer)
            .await?
            .map_or(Money::ZERO, |w| w.balance()))
    }

    async fn top_up(&self, customer: CustomerId, amount: Money) -> Result<TopupReceipt, ArcadeError> {
        let _guard = self.commands.lock().await;
        let mut wallet = self.find_or_open(customer).await?;
        let transaction_id = self.ids.generate::<TransactionId>().await?;
        let receipt = wallet.top_up(transaction_id, amount, &self.policy, Utc::now())?;
        self.save(&mut wallet).await?;
        Ok(receipt)
    }

    async fn charge(
        &self,
        customer: CustomerId,
        booking: BookingId,
        amount: Money,
    ) -> Result<Money, ArcadeError> {
        let _guard = self.commands.lock().await;
        let mut wallet = self.find_or_open(customer).await?;
        let transaction_id = self.ids.generate::<TransactionId>().await?;
        let balance = wallet.charge(transaction_id, booking, amount, Utc::now())?;
        self.save(&mut wallet).await?;
        debug!("引き落とし: customer={} booking={} amount={}", customer, booking, amount);
        Ok(balance)
    }

    async fn transactions(&self, customer: CustomerId) -> Result<Vec<WalletTransaction>, ArcadeError> {
        Ok(self
            .find_by_id(customer)
            .await?
            .map(|w| w.transactions().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::core::{compute_topup_bonus, TransactionKind, ValidationError};

    fn ledger() -> InMemoryWalletLedger {
        InMemoryWalletLedger::new(TopupPolicy::default())
    }

    #[tokio::test]
    async fn test_unknown_customer_has_empty_wallet() {
        let ledger = ledger();
        let id = CustomerId::from(5);
        assert_eq!(ledger.balance(id).await.unwrap(), Money::ZERO);
        assert!(ledger.transactions(id).await.unwrap().is_empty());
        assert_eq!(ledger.find_by_id(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_top_up_then_charge() {
        let ledger = ledger();
        let id = CustomerId::from(5);
        let receipt = ledger.top_up(id, Money::from_major(1000)).await.unwrap();
        assert_eq!(receipt.new_balance, Money::from_major(1100));

        let receipt = ledger.top_up(id, Money::from_major(500)).await.unwrap();
        assert_eq!(receipt.bonus, Money::from_major(25));
        assert_eq!(receipt.new_balance, Money::from_major(1625));

        let balance = ledger
            .charge(id, BookingId::from(77), Money::from_major(229))
            .await
            .unwrap();
        assert_eq!(balance, Money::from_major(1396));
        assert_eq!(ledger.balance(id).await.unwrap(), Money::from_major(1396));

        let history = ledger.transactions(id).await.unwrap();
        assert_eq!(
            history.iter().map(|t| t.kind()).collect::<Vec<_>>(),
            vec![TransactionKind::Booking, TransactionKind::Topup, TransactionKind::Topup]
        );
        assert_eq!(history[0].booking_id(), Some(BookingId::from(77)));
    }

    #[tokio::test]
    async fn test_rejected_commands_leave_no_trace() {
        let ledger = ledger();
        let id = CustomerId::from(6);
        let err = ledger.top_up(id, Money::from_major(99)).await.unwrap_err();
        assert!(matches!(
            err,
            ArcadeError::Validation(ValidationError::BelowMinimumTopup { .. })
        ));
        assert_eq!(ledger.find_by_id(id).await.unwrap(), None);

        ledger.top_up(id, Money::from_major(100)).await.unwrap();
        let err = ledger
            .charge(id, BookingId::from(1), Money::from_major(149))
            .await
            .unwrap_err();
        assert!(matches!(err, ArcadeError::InsufficientBalance { .. }));
        assert_eq!(ledger.balance(id).await.unwrap(), Money::from_major(100));
        assert_eq!(ledger.transactions(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ledger_bonus_matches_pure_computation() {
        let ledger = ledger();
        for (i, major) in [100, 250, 499, 500, 750, 999, 1000, 1500, 2000, 5000]
            .into_iter()
            .enumerate()
        {
            let id = CustomerId::from(100 + i as u64);
            let amount = Money::from_major(major);
            let receipt = ledger.top_up(id, amount).await.unwrap();
            assert_eq!(Ok(receipt.bonus), compute_topup_bonus(amount));
            assert_eq!(receipt.new_balance, amount + receipt.bonus);
        }
    }

    #[tokio::test]
    async fn test_concurrent_charges_never_overdraw() {
        let ledger = Arc::new(ledger());
        let id = CustomerId::from(9);
        ledger.top_up(id, Money::from_major(300)).await.unwrap();

        let mut handles = Vec::new();
        for booking in 0..4 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .charge(id, BookingId::from(booking), Money::from_major(149))
                    .await
            }));
        }
        let mut charged = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                charged += 1;
            }
        }
        assert_eq!(charged, 2);
        assert_eq!(ledger.balance(id).await.unwrap(), Money::from_major(2));
    }
}
