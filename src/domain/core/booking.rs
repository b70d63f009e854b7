use std::ops::Range;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::{Deref, Display, From};
use serde::{Deserialize, Serialize};

use crate::domain::{DataAccessError, Entity, Id};

use super::{ArcadeError, CustomerId, DateStamp, PriceBreakdown, TimeOfDay, ValidationError};

/// 予約の受付先
#[async_trait]
pub trait BookingSink: Send + Sync {
    /// 予約を確定する。受付時点で時間帯が埋まっていれば`ArcadeError::Conflict`を返す。
    async fn submit(
        &self,
        customer: CustomerId,
        request: &BookingRequest,
        price: PriceBreakdown,
        payment: PaymentMethod,
    ) -> Result<Booking, ArcadeError>;
    /// 確定した予約を取り消す
    async fn cancel(&self, id: BookingId) -> Result<bool, DataAccessError>;
    /// お客様の予約を新しい順に返す
    async fn bookings_for(&self, customer: CustomerId) -> Result<Vec<Booking>, DataAccessError>;
    /// 全予約(管理画面用)
    async fn all_bookings(&self, date: Option<DateStamp>) -> Result<Vec<Booking>, DataAccessError>;
}

/// 予約ID
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Deref, Default,
)]
pub struct BookingId(u64);

impl Id for BookingId {
    type Inner = u64;
}

/// ゲーム機のセットアップ
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ResourceId {
    #[display(fmt = "1")]
    Setup1,
    #[display(fmt = "2")]
    Setup2,
}

impl ResourceId {
    pub const ALL: [ResourceId; 2] = [ResourceId::Setup1, ResourceId::Setup2];

    pub fn number(&self) -> u32 {
        match self {
            ResourceId::Setup1 => 1,
            ResourceId::Setup2 => 2,
        }
    }
}

impl TryFrom<u32> for ResourceId {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ResourceId::Setup1),
            2 => Ok(ResourceId::Setup2),
            other => Err(ValidationError::InvalidResource(other)),
        }
    }
}

impl From<ResourceId> for u32 {
    fn from(value: ResourceId) -> Self {
        value.number()
    }
}

/// 利用時間
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum SessionLength {
    HalfHour,
    OneHour,
    TwoHours,
    ThreeHours,
}

impl SessionLength {
    pub const ALL: [SessionLength; 4] = [
        SessionLength::HalfHour,
        SessionLength::OneHour,
        SessionLength::TwoHours,
        SessionLength::ThreeHours,
    ];

    pub fn minutes(&self) -> u32 {
        match self {
            SessionLength::HalfHour => 30,
            SessionLength::OneHour => 60,
            SessionLength::TwoHours => 120,
            SessionLength::ThreeHours => 180,
        }
    }
}

impl TryFrom<u32> for SessionLength {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|d| d.minutes() == value)
            .ok_or(ValidationError::InvalidDuration(value))
    }
}

impl From<SessionLength> for u32 {
    fn from(value: SessionLength) -> Self {
        value.minutes()
    }
}

/// コントローラー数(1〜4)
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Controllers(u8);

impl Controllers {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 4;

    pub fn new(count: u32) -> Result<Self, ValidationError> {
        if !(Self::MIN..=Self::MAX).contains(&count) {
            return Err(ValidationError::InvalidControllers(count));
        }
        Ok(Self(count as u8))
    }

    pub fn count(&self) -> u32 {
        self.0 as u32
    }

    /// 1台目を除いた追加分
    pub fn extra(&self) -> u32 {
        self.count().saturating_sub(1)
    }
}

impl TryFrom<u32> for Controllers {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Controllers> for u32 {
    fn from(value: Controllers) -> Self {
        value.count()
    }
}

/// 支払い方法
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// ウォレット残高から支払う
    #[display(fmt = "wallet")]
    Wallet,
    /// 外部決済(モック)
    #[display(fmt = "external")]
    #[serde(alias = "mock")]
    External,
}

/// 支払い状況
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    #[display(fmt = "completed")]
    Completed,
}

/// 予約の申し込み内容
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "BookingRequestRecord", into = "BookingRequestRecord")]
pub struct BookingRequest {
    date: DateStamp,
    resource: ResourceId,
    start: TimeOfDay,
    duration: SessionLength,
    controllers: Controllers,
}

impl BookingRequest {
    pub fn new(
        date: DateStamp,
        resource: ResourceId,
        start: TimeOfDay,
        duration: SessionLength,
        controllers: Controllers,
    ) -> Result<Self, ValidationError> {
        Self::validate_same_day(start, duration)?;
        Ok(Self {
            date,
            resource,
            start,
            duration,
            controllers,
        })
    }

    /// フォームの入力値から作る
    pub fn parse(
        date: &str,
        resource: u32,
        start: &str,
        duration_minutes: u32,
        controllers: u32,
    ) -> Result<Self, ValidationError> {
        Self::new(
            date.parse()?,
            ResourceId::try_from(resource)?,
            start.parse()?,
            SessionLength::try_from(duration_minutes)?,
            Controllers::new(controllers)?,
        )
    }

    pub fn date(&self) -> DateStamp {
        self.date
    }

    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    pub fn start(&self) -> TimeOfDay {
        self.start
    }

    pub fn duration(&self) -> SessionLength {
        self.duration
    }

    pub fn controllers(&self) -> Controllers {
        self.controllers
    }

    /// 終了時刻。`new`で`24:00`までに収まることを確認済み。
    pub fn end(&self) -> TimeOfDay {
        self.start
            .checked_add_minutes(self.duration.minutes())
            .unwrap_or(self.start)
    }

    /// 占有区間(0時からの分)
    pub fn window(&self) -> Range<u32> {
        self.start.window(self.duration.minutes())
    }

    fn validate_same_day(start: TimeOfDay, duration: SessionLength) -> Result<(), ValidationError> {
        match start.checked_add_minutes(duration.minutes()) {
            Some(_) => Ok(()),
            None => Err(ValidationError::EndsAfterMidnight {
                start,
                minutes: duration.minutes(),
            }),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct BookingRequestRecord {
    date: DateStamp,
    setup: ResourceId,
    start_time: TimeOfDay,
    duration_minutes: SessionLength,
    controllers: Controllers,
}

impl TryFrom<BookingRequestRecord> for BookingRequest {
    type Error = ValidationError;

    fn try_from(value: BookingRequestRecord) -> Result<Self, Self::Error> {
        BookingRequest::new(
            value.date,
            value.setup,
            value.start_time,
            value.duration_minutes,
            value.controllers,
        )
    }
}

impl From<BookingRequest> for BookingRequestRecord {
    fn from(value: BookingRequest) -> Self {
        Self {
            date: value.date,
            setup: value.resource,
            start_time: value.start,
            duration_minutes: value.duration,
            controllers: value.controllers,
        }
    }
}

/// 確定した予約
///
/// 一度確定した内容は変更しない。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    id: BookingId,
    customer: CustomerId,
    request: BookingRequest,
    end_time: TimeOfDay,
    price: PriceBreakdown,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    created_at: DateTime<Utc>,
}

impl Booking {
    pub fn confirm(
        id: BookingId,
        customer: CustomerId,
        request: BookingRequest,
        price: PriceBreakdown,
        payment_method: PaymentMethod,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            customer,
            end_time: request.end(),
            request,
            price,
            payment_method,
            payment_status: PaymentStatus::Completed,
            created_at,
        }
    }

    pub fn customer(&self) -> CustomerId {
        self.customer
    }

    pub fn request(&self) -> &BookingRequest {
        &self.request
    }

    pub fn date(&self) -> DateStamp {
        self.request.date()
    }

    pub fn resource(&self) -> ResourceId {
        self.request.resource()
    }

    pub fn start_time(&self) -> TimeOfDay {
        self.request.start()
    }

    pub fn end_time(&self) -> TimeOfDay {
        self.end_time
    }

    pub fn price(&self) -> &PriceBreakdown {
        &self.price
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for Booking {
    type Id = BookingId;

    const ENTITY_NAME: &'static str = "booking";

    fn id(&self) -> Self::Id {
        self.id
    }
}
