use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::Entity;

use super::{
    compute_price_breakdown, quote, ArcadeError, AvailabilityRule, AvailabilitySource, Booking,
    BookingRequest, BookingSink, BookingStats, Customer, CustomerId, DateStamp, Money,
    PaymentMethod, PriceBreakdown, RateCard, ResourceId, SessionLength, SlotBoard, SlotGrid,
    TopupReceipt, ValidationError, WalletLedger, WalletTransaction,
};

/// 予約受付窓口
///
/// 入力検証、空き確認、料金計算、支払い、登録を1回の操作としてまとめる。
/// 失敗は呼び出し元にそのまま返し、自動で再試行しない。
#[derive(Clone)]
pub struct BookingDesk {
    availability: Arc<dyn AvailabilitySource>,
    sink: Arc<dyn BookingSink>,
    wallet: Arc<dyn WalletLedger>,
    rates: RateCard,
    grid: SlotGrid,
    rule: AvailabilityRule,
}

impl BookingDesk {
    pub fn new(
        availability: Arc<dyn AvailabilitySource>,
        sink: Arc<dyn BookingSink>,
        wallet: Arc<dyn WalletLedger>,
        rates: RateCard,
    ) -> Self {
        Self {
            availability,
            sink,
            wallet,
            rates,
            grid: SlotGrid::venue(),
            rule: AvailabilityRule::default(),
        }
    }

    pub fn with_grid(self, grid: SlotGrid) -> Self {
        Self { grid, ..self }
    }

    pub fn with_rule(self, rule: AvailabilityRule) -> Self {
        Self { rule, ..self }
    }

    pub fn rates(&self) -> &RateCard {
        &self.rates
    }

    pub fn quote(&self, duration_minutes: u32, controllers: u32) -> Result<PriceBreakdown, ArcadeError> {
        Ok(quote(duration_minutes, controllers, &self.rates)?)
    }

    /// 予約画面の開始時刻一覧
    pub async fn slot_board(
        &self,
        date: DateStamp,
        resource: ResourceId,
        duration: SessionLength,
    ) -> Result<SlotBoard, ArcadeError> {
        let snapshot = self.availability.occupied(date, resource).await?;
        Ok(snapshot.board(&self.grid, duration, self.rule))
    }

    pub async fn submit(
        &self,
        customer: CustomerId,
        request: &BookingRequest,
        payment: PaymentMethod,
    ) -> Result<Booking, ArcadeError> {
        info!(
            "予約受付: customer={} date={} setup={} start={} duration={} controllers={}",
            customer,
            request.date(),
            request.resource(),
            request.start(),
            request.duration().minutes(),
            request.controllers()
        );
        if !self.grid.contains(request.start()) {
            return Err(ValidationError::OffGrid(request.start()).into());
        }

        let snapshot = self
            .availability
            .occupied(request.date(), request.resource())
            .await?;
        if !snapshot.is_available(request.start(), request.duration(), self.rule) {
            warn!("予約済みの時間帯です: {} {}", request.date(), request.start());
            return Err(ArcadeError::Conflict {
                date: request.date(),
                resource: request.resource(),
                start: request.start(),
            });
        }

        let price = compute_price_breakdown(request.duration(), request.controllers(), &self.rates);
        let total = price.total_price();
        if payment == PaymentMethod::Wallet {
            let balance = self.wallet.balance(customer).await?;
            if balance < total {
                return Err(ArcadeError::InsufficientBalance {
                    balance,
                    required: total,
                });
            }
        }

        let booking = self.sink.submit(customer, request, price, payment).await?;
        if payment == PaymentMethod::Wallet {
            if let Err(e) = self.wallet.charge(customer, booking.id(), total).await {
                warn!("引き落としに失敗したため予約を取り消します: {}", e);
                if let Err(cancel) = self.sink.cancel(booking.id()).await {
                    error!("予約{}の取り消しに失敗しました: {}", booking.id(), cancel);
                }
                return Err(e);
            }
        }
        info!("予約確定: booking={} total={}", booking.id(), total);
        Ok(booking)
    }

    pub async fn balance(&self, customer: CustomerId) -> Result<Money, ArcadeError> {
        self.wallet.balance(customer).await
    }

    pub async fn top_up(&self, customer: CustomerId, amount: Money) -> Result<TopupReceipt, ArcadeError> {
        let receipt = self.wallet.top_up(customer, amount).await?;
        info!(
            "チャージ: customer={} paid={} bonus={} balance={}",
            customer, receipt.amount_paid, receipt.bonus, receipt.new_balance
        );
        Ok(receipt)
    }

    pub async fn transactions(&self, customer: CustomerId) -> Result<Vec<WalletTransaction>, ArcadeError> {
        self.wallet.transactions(customer).await
    }

    pub async fn my_bookings(&self, customer: CustomerId) -> Result<Vec<Booking>, ArcadeError> {
        Ok(self.sink.bookings_for(customer).await?)
    }

    pub async fn admin_bookings(
        &self,
        admin: &Customer,
        date: Option<DateStamp>,
    ) -> Result<Vec<Booking>, ArcadeError> {
        Self::ensure_admin(admin)?;
        Ok(self.sink.all_bookings(date).await?)
    }

    pub async fn admin_stats(&self, admin: &Customer, today: DateStamp) -> Result<BookingStats, ArcadeError> {
        Self::ensure_admin(admin)?;
        let bookings = self.sink.all_bookings(None).await?;
        Ok(BookingStats::aggregate(&bookings, today))
    }

    fn ensure_admin(customer: &Customer) -> Result<(), ArcadeError> {
        match customer.is_admin() {
            true => Ok(()),
            false => Err(ArcadeError::Rejected("Admin access required".to_owned())),
        }
    }
}
