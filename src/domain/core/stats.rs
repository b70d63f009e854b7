use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{Booking, DateStamp, Money};

/// 管理画面の集計
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingStats {
    pub total_bookings: usize,
    pub today_bookings: usize,
    /// 予約したことのあるお客様の数(登録ユーザー数ではない)
    pub booking_customers: usize,
    pub total_revenue: Money,
}

impl BookingStats {
    pub fn aggregate<'a, I>(bookings: I, today: DateStamp) -> Self
    where
        I: IntoIterator<Item = &'a Booking>,
    {
        let mut customers = HashSet::new();
        let mut stats = BookingStats {
            total_bookings: 0,
            today_bookings: 0,
            booking_customers: 0,
            total_revenue: Money::ZERO,
        };
        for booking in bookings {
            stats.total_bookings += 1;
            if booking.date() == today {
                stats.today_bookings += 1;
            }
            customers.insert(booking.customer());
            stats.total_revenue = stats.total_revenue + booking.price().total_price();
        }
        stats.booking_customers = customers.len();
        stats
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::core::{
        compute_price_breakdown, BookingId, BookingRequest, CustomerId, PaymentMethod, RateCard,
    };

    fn booking(id: u64, customer: u64, date: &str, start: &str, controllers: u32) -> Booking {
        let request = BookingRequest::parse(date, 1, start, 60, controllers).unwrap();
        let price = compute_price_breakdown(request.duration(), request.controllers(), &RateCard::default());
        Booking::confirm(
            BookingId::from(id),
            CustomerId::from(customer),
            request,
            price,
            PaymentMethod::External,
            Utc::now(),
        )
    }

    #[test]
    fn test_aggregate() {
        let bookings = vec![
            booking(1, 10, "2025-03-14", "10:00", 1),
            booking(2, 10, "2025-03-14", "12:00", 3),
            booking(3, 11, "2025-03-13", "12:00", 1),
        ];
        let stats = BookingStats::aggregate(&bookings, "2025-03-14".parse().unwrap());
        assert_eq!(stats.total_bookings, 3);
        assert_eq!(stats.today_bookings, 2);
        assert_eq!(stats.booking_customers, 2);
        assert_eq!(stats.total_revenue, Money::from_major(149 + 229 + 149));
    }

    #[test]
    fn test_booking_customers_counts_each_customer_once() {
        let bookings = vec![
            booking(1, 10, "2025-03-14", "10:00", 1),
            booking(2, 10, "2025-03-15", "10:00", 1),
            booking(3, 10, "2025-03-16", "10:00", 1),
        ];
        let stats = BookingStats::aggregate(&bookings, "2025-03-14".parse().unwrap());
        assert_eq!(stats.total_bookings, 3);
        assert_eq!(stats.booking_customers, 1);
    }

    #[test]
    fn test_aggregate_empty() {
        let stats = BookingStats::aggregate(&Vec::new(), "2025-03-14".parse().unwrap());
        assert_eq!(stats.total_bookings, 0);
        assert_eq!(stats.total_revenue, Money::ZERO);
    }
}
