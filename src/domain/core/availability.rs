use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::DataAccessError;

use super::{
    AvailabilityRule, BusyInterval, DateStamp, ResourceId, SessionLength, SlotBoard, SlotGrid,
    TimeOfDay,
};

/// 予約済み時間帯の取得元
#[async_trait]
pub trait AvailabilitySource: Send + Sync {
    /// 指定日・セットアップの予約済み時間帯
    async fn occupied(
        &self,
        date: DateStamp,
        resource: ResourceId,
    ) -> Result<AvailabilitySnapshot, DataAccessError>;
}

/// ある時点の予約済み時間帯
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySnapshot {
    date: DateStamp,
    #[serde(rename = "setup")]
    resource: ResourceId,
    #[serde(rename = "occupied_slots")]
    busy: Vec<BusyInterval>,
}

impl AvailabilitySnapshot {
    pub fn new(date: DateStamp, resource: ResourceId, mut busy: Vec<BusyInterval>) -> Self {
        busy.sort();
        Self {
            date,
            resource,
            busy,
        }
    }

    pub fn date(&self) -> DateStamp {
        self.date
    }

    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    pub fn busy(&self) -> &[BusyInterval] {
        &self.busy
    }

    pub fn is_available(&self, start: TimeOfDay, duration: SessionLength, rule: AvailabilityRule) -> bool {
        rule.admits(start, duration, &self.busy)
    }

    pub fn board(&self, grid: &SlotGrid, duration: SessionLength, rule: AvailabilityRule) -> SlotBoard {
        SlotBoard::resolve(grid, duration, &self.busy, rule)
    }
}

/// 取得要求の控え
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RequestTicket {
    generation: u64,
    date: DateStamp,
    resource: ResourceId,
}

impl RequestTicket {
    pub fn date(&self) -> DateStamp {
        self.date
    }

    pub fn resource(&self) -> ResourceId {
        self.resource
    }
}

/// 日付やセットアップの選択が変わったとき、古い応答を捨てる
///
/// 最後に発行した控えに対応する応答だけを受け入れる。
#[derive(Debug, Default)]
pub struct AvailabilityTracker {
    latest: AtomicU64,
}

impl AvailabilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, date: DateStamp, resource: ResourceId) -> RequestTicket {
        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        RequestTicket {
            generation,
            date,
            resource,
        }
    }

    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.generation
    }

    pub fn accept(
        &self,
        ticket: RequestTicket,
        snapshot: AvailabilitySnapshot,
    ) -> Option<AvailabilitySnapshot> {
        if !self.is_current(&ticket) {
            debug!(
                "古い空き状況の応答を破棄しました: {} setup {}",
                ticket.date, ticket.resource
            );
            return None;
        }
        if snapshot.date != ticket.date || snapshot.resource != ticket.resource {
            debug!("要求と異なる空き状況の応答を破棄しました");
            return None;
        }
        Some(snapshot)
    }

    /// 取得して、その時点で最新の要求なら結果を返す
    pub async fn fetch<S>(
        &self,
        source: &S,
        date: DateStamp,
        resource: ResourceId,
    ) -> Result<Option<AvailabilitySnapshot>, DataAccessError>
    where
        S: AvailabilitySource + ?Sized,
    {
        let ticket = self.begin(date, resource);
        let snapshot = source.occupied(date, resource).await?;
        Ok(self.accept(ticket, snapshot))
    }
}
