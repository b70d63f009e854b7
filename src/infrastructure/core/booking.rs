use std::ops::Range;

use async_trait::async_trait;
use bio::data_structures::interval_tree::IntervalTree;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::core::{
    ArcadeError, AvailabilitySnapshot, AvailabilitySource, Booking, BookingId, BookingRequest,
    BookingSink, BusyInterval, CustomerId, DateStamp, PaymentMethod, PriceBreakdown, ResourceId,
};
use crate::domain::{DataAccessError, Entity, IdGeneratorTask};

/// メモリ上の予約台帳
///
/// 空き状況の取得元と予約の受付先を兼ねる。重複の確認と登録は同じ書き込みロックの中で行う。
pub struct InMemoryBookingStore {
    bookings: RwLock<Vec<Booking>>,
    ids: IdGeneratorTask,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::with_ids(IdGeneratorTask::for_node(1, 1))
    }

    pub fn with_ids(ids: IdGeneratorTask) -> Self {
        Self {
            bookings: RwLock::new(Vec::new()),
            ids,
        }
    }

    fn occupied_windows(
        bookings: &[Booking],
        date: DateStamp,
        resource: ResourceId,
    ) -> Vec<(Range<u32>, BookingId)> {
        bookings
            .iter()
            .filter(|b| b.date() == date && b.resource() == resource)
            .map(|b| (b.request().window(), b.id()))
            .collect()
    }

    fn validate_overlapping(
        bookings: &[Booking],
        request: &BookingRequest,
    ) -> Result<(), ArcadeError> {
        let occupied = Self::occupied_windows(bookings, request.date(), request.resource());
        let window = request.window();
        match IntervalTree::from_iter(occupied.iter().map(|(w, id)| (w, *id)))
            .find(&window)
            .next()
        {
            Some(entry) => {
                warn!(
                    "予約{}と重なるため受け付けません: {} setup {} {}",
                    entry.data(),
                    request.date(),
                    request.resource(),
                    request.start()
                );
                Err(ArcadeError::Conflict {
                    date: request.date(),
                    resource: request.resource(),
                    start: request.start(),
                })
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AvailabilitySource for InMemoryBookingStore {
    async fn occupied(
        &self,
        date: DateStamp,
        resource: ResourceId,
    ) -> Result<AvailabilitySnapshot, DataAccessError> {
        let bookings = self.bookings.read().await;
        let busy = bookings
            .iter()
            .filter(|b| b.date() == date && b.resource() == resource)
            .filter_map(|b| BusyInterval::new(b.start_time(), b.end_time()).ok())
            .collect();
        Ok(AvailabilitySnapshot::new(date, resource, busy))
    }
}

#[async_trait]
impl BookingSink for InMemoryBookingStore {
    async fn submit(
        &self,
        customer: CustomerId,
        request: &BookingRequest,
        price: PriceBreakdown,
        payment: PaymentMethod,
    ) -> Result<Booking, ArcadeError> {
        let id = self.ids.generate::<BookingId>().await?;
        let mut bookings = self.bookings.write().await;
        Self::validate_overlapping(&bookings, request)?;
        let booking = Booking::confirm(id, customer, *request, price, payment, Utc::now());
        debug!("予約を登録しました: {}", booking.id());
        bookings.push(booking.clone());
        Ok(booking)
    }

    async fn cancel(&self, id: BookingId) -> Result<bool, DataAccessError> {
        let mut bookings = self.bookings.write().await;
        let before = bookings.len();
        bookings.retain(|b| b.id() != id);
        Ok(bookings.len() != before)
    }

    async fn bookings_for(&self, customer: CustomerId) -> Result<Vec<Booking>, DataAccessError> {
        let bookings = self.bookings.read().await;
        Ok(bookings
            .iter()
            .rev()
            .filter(|b| b.customer() == customer)
            .cloned()
            .collect())
    }

    async fn all_bookings(&self, date: Option<DateStamp>) -> Result<Vec<Booking>, DataAccessError> {
        let bookings = self.bookings.read().await;
        let mut result = bookings
            .iter()
            .filter(|b| date.map_or(true, |d| b.date() == d))
            .cloned()
            .collect::<Vec<_>>();
        result.sort_by(|a, b| {
            b.date()
                .cmp(&a.date())
                .then(a.start_time().cmp(&b.start_time()))
                .then(a.resource().cmp(&b.resource()))
        });
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::core::{compute_price_breakdown, RateCard};

    fn request(start: &str, duration: u32, setup: u32) -> BookingRequest {
        BookingRequest::parse("2025-03-14", setup, start, duration, 1).unwrap()
    }

    fn price(request: &BookingRequest) -> PriceBreakdown {
        compute_price_breakdown(request.duration(), request.controllers(), &RateCard::default())
    }

    async fn book(
        store: &InMemoryBookingStore,
        customer: u64,
        request: BookingRequest,
    ) -> Result<Booking, ArcadeError> {
        store
            .submit(
                CustomerId::from(customer),
                &request,
                price(&request),
                PaymentMethod::External,
            )
            .await
    }

    #[tokio::test]
    async fn test_submit_and_read_back() {
        let store = InMemoryBookingStore::new();
        let booking = book(&store, 1, request("12:00", 60, 1)).await.unwrap();
        assert_eq!(booking.end_time().to_string(), "13:00");

        let snapshot = store
            .occupied(booking.date(), ResourceId::Setup1)
            .await
            .unwrap();
        assert_eq!(snapshot.busy().len(), 1);
        assert_eq!(snapshot.busy()[0].to_string(), "12:00-13:00");

        let other = store
            .occupied(booking.date(), ResourceId::Setup2)
            .await
            .unwrap();
        assert!(other.busy().is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_submit_is_conflict() {
        let store = InMemoryBookingStore::new();
        book(&store, 1, request("12:00", 120, 1)).await.unwrap();

        let err = book(&store, 2, request("13:30", 60, 1)).await.unwrap_err();
        assert!(matches!(err, ArcadeError::Conflict { .. }));
        let err = book(&store, 2, request("11:30", 60, 1)).await.unwrap_err();
        assert!(matches!(err, ArcadeError::Conflict { .. }));

        // 終了時刻ちょうどの開始と別セットアップは受け付ける
        book(&store, 2, request("14:00", 60, 1)).await.unwrap();
        book(&store, 2, request("11:00", 60, 1)).await.unwrap();
        book(&store, 2, request("12:00", 120, 2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_submit_accepts_only_one() {
        let store = Arc::new(InMemoryBookingStore::new());
        let mut handles = Vec::new();
        for customer in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                book(&store, customer, request("18:00", 60, 2)).await
            }));
        }
        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(e) => assert!(matches!(e, ArcadeError::Conflict { .. })),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(store.all_bookings(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_frees_the_slot() {
        let store = InMemoryBookingStore::new();
        let booking = book(&store, 1, request("15:00", 60, 1)).await.unwrap();
        assert!(store.cancel(booking.id()).await.unwrap());
        assert!(!store.cancel(booking.id()).await.unwrap());
        book(&store, 2, request("15:00", 60, 1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_listings() {
        let store = InMemoryBookingStore::new();
        let first = book(&store, 1, request("10:00", 60, 1)).await.unwrap();
        let second = book(&store, 1, request("16:00", 60, 2)).await.unwrap();
        book(&store, 2, request("12:00", 60, 1)).await.unwrap();
        let later = BookingRequest::parse("2025-03-15", 1, "10:00", 30, 1).unwrap();
        book(&store, 3, later).await.unwrap();

        let mine = store.bookings_for(CustomerId::from(1)).await.unwrap();
        assert_eq!(
            mine.iter().map(|b| b.id()).collect::<Vec<_>>(),
            vec![second.id(), first.id()]
        );

        let all = store.all_bookings(None).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].date().to_string(), "2025-03-15");
        assert_eq!(all[1].start_time().to_string(), "10:00");

        let day = store
            .all_bookings(Some("2025-03-14".parse().unwrap()))
            .await
            .unwrap();
        assert_eq!(day.len(), 3);
    }
}
