use std::{fmt, ops::Range, str::FromStr};

use chrono::{NaiveDate, NaiveTime, Timelike};
use derive_more::{Deref, Display, From};
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};

use super::{SessionLength, ValidationError};

/// 1日の分数
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// 時刻(分単位)
///
/// `00:00`〜`24:00`の範囲で、`HH:MM`形式で入出力する。`24:00`は終了時刻としてだけ使う。
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, SerializeDisplay, DeserializeFromStr,
)]
pub struct TimeOfDay {
    minutes: u16,
}

impl TimeOfDay {
    /// その日の終わり(`24:00`)
    pub const END_OF_DAY: TimeOfDay = TimeOfDay {
        minutes: MINUTES_PER_DAY as u16,
    };

    pub fn new(hour: u32, minute: u32) -> Result<Self, ValidationError> {
        if hour == 24 && minute == 0 {
            return Ok(Self::END_OF_DAY);
        }
        if hour > 23 || minute > 59 {
            return Err(ValidationError::InvalidTime(format!("{hour:02}:{minute:02}")));
        }
        Ok(Self {
            minutes: (hour * 60 + minute) as u16,
        })
    }

    /// 0時からの経過分で作る
    pub fn from_minutes(minutes: u32) -> Result<Self, ValidationError> {
        if minutes > MINUTES_PER_DAY {
            return Err(ValidationError::InvalidTime(format!(
                "{:02}:{:02}",
                minutes / 60,
                minutes % 60
            )));
        }
        Ok(Self {
            minutes: minutes as u16,
        })
    }

    /// 0時からの経過分
    pub fn minutes(&self) -> u32 {
        self.minutes as u32
    }

    pub fn hour(&self) -> u32 {
        self.minutes() / 60
    }

    pub fn minute(&self) -> u32 {
        self.minutes() % 60
    }

    /// 同じ日のうち(`24:00`まで)に収まる場合だけ加算結果を返す
    pub fn checked_add_minutes(&self, minutes: u32) -> Option<TimeOfDay> {
        Self::from_minutes(self.minutes().checked_add(minutes)?).ok()
    }

    /// `self`から`minutes`分間の占有区間(0時からの分、日付をまたいでも折り返さない)
    pub fn window(&self, minutes: u32) -> Range<u32> {
        self.minutes()..self.minutes() + minutes
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "24:00" {
            return Ok(Self::END_OF_DAY);
        }
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map_err(|_| ValidationError::InvalidTime(s.to_owned()))
            .and_then(TimeOfDay::try_from)
    }
}

impl TryFrom<NaiveTime> for TimeOfDay {
    type Error = ValidationError;

    fn try_from(value: NaiveTime) -> Result<Self, Self::Error> {
        Self::new(value.hour(), value.minute())
    }
}

/// 日付(タイムゾーンに依存しない)
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From, Deref,
)]
#[serde(transparent)]
pub struct DateStamp(NaiveDate);

impl DateStamp {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self, ValidationError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| ValidationError::InvalidDate(format!("{year:04}-{month:02}-{day:02}")))
    }
}

impl FromStr for DateStamp {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(|_| ValidationError::InvalidDate(s.to_owned()))
    }
}

/// 予約済みの時間帯 `[start, end)`
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "BusyIntervalRecord", into = "BusyIntervalRecord")]
pub struct BusyInterval {
    start: TimeOfDay,
    end: TimeOfDay,
}

impl BusyInterval {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Result<Self, ValidationError> {
        if start >= end {
            return Err(ValidationError::EmptyInterval { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> TimeOfDay {
        self.start
    }

    pub fn end(&self) -> TimeOfDay {
        self.end
    }

    pub fn minutes(&self) -> Range<u32> {
        self.start.minutes()..self.end.minutes()
    }

    /// 半開区間同士の重なり判定。終了と開始が一致するだけなら重ならない。
    pub fn overlaps(&self, window: &Range<u32>) -> bool {
        window.start < self.end.minutes() && self.start.minutes() < window.end
    }

    pub fn contains(&self, time: TimeOfDay) -> bool {
        self.start <= time && time < self.end
    }
}

impl fmt::Display for BusyInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct BusyIntervalRecord {
    start_time: TimeOfDay,
    end_time: TimeOfDay,
}

impl TryFrom<BusyIntervalRecord> for BusyInterval {
    type Error = ValidationError;

    fn try_from(value: BusyIntervalRecord) -> Result<Self, Self::Error> {
        BusyInterval::new(value.start_time, value.end_time)
    }
}

impl From<BusyInterval> for BusyIntervalRecord {
    fn from(value: BusyInterval) -> Self {
        Self {
            start_time: value.start,
            end_time: value.end,
        }
    }
}

/// 空き判定の方式
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityRule {
    /// 利用区間全体が予約済み区間と重ならないこと
    #[default]
    Overlap,
    /// 開始時刻が予約済み区間に含まれないこと(旧画面の判定)
    ///
    /// 長時間の予約が後続の予約に食い込むケースを見逃す。
    StartPoint,
}

impl AvailabilityRule {
    pub fn admits(&self, candidate: TimeOfDay, duration: SessionLength, busy: &[BusyInterval]) -> bool {
        match self {
            AvailabilityRule::Overlap => is_slot_available(candidate, duration, busy),
            AvailabilityRule::StartPoint => !busy.iter().any(|b| b.contains(candidate)),
        }
    }
}

/// `candidate`から`duration`の利用がどの予約済み区間とも重ならなければ空き
pub fn is_slot_available(candidate: TimeOfDay, duration: SessionLength, busy: &[BusyInterval]) -> bool {
    let window = candidate.window(duration.minutes());
    !busy.iter().any(|b| b.overlaps(&window))
}

/// 開始時刻の候補を`open`から`close`まで(両端を含む)`step_minutes`刻みで列挙する
pub fn enumerate_candidate_slots(
    open: TimeOfDay,
    close: TimeOfDay,
    step_minutes: u32,
) -> Result<CandidateSlots, ValidationError> {
    SlotGrid::new(open, close, step_minutes).map(|grid| grid.iter())
}

/// 開始時刻候補の格子
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SlotGrid {
    open: TimeOfDay,
    close: TimeOfDay,
    step_minutes: u32,
}

impl SlotGrid {
    pub fn new(open: TimeOfDay, close: TimeOfDay, step_minutes: u32) -> Result<Self, ValidationError> {
        if step_minutes == 0 {
            return Err(ValidationError::InvalidStep);
        }
        Ok(Self {
            open,
            close,
            step_minutes,
        })
    }

    /// 店舗の営業時間(10:00〜22:00、30分刻み)
    pub fn venue() -> Self {
        Self {
            open: TimeOfDay { minutes: 10 * 60 },
            close: TimeOfDay { minutes: 22 * 60 },
            step_minutes: 30,
        }
    }

    pub fn open(&self) -> TimeOfDay {
        self.open
    }

    pub fn close(&self) -> TimeOfDay {
        self.close
    }

    pub fn step_minutes(&self) -> u32 {
        self.step_minutes
    }

    pub fn iter(&self) -> CandidateSlots {
        CandidateSlots {
            next: self.open.minutes(),
            close: self.close.minutes(),
            step: self.step_minutes,
        }
    }

    pub fn contains(&self, time: TimeOfDay) -> bool {
        self.iter().any(|t| t == time)
    }
}

impl Default for SlotGrid {
    fn default() -> Self {
        Self::venue()
    }
}

impl<'a> IntoIterator for &'a SlotGrid {
    type Item = TimeOfDay;
    type IntoIter = CandidateSlots;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// 開始時刻候補のイテレータ。`clone`すれば先頭からやり直せる。
#[derive(Clone, Debug)]
pub struct CandidateSlots {
    next: u32,
    close: u32,
    step: u32,
}

impl Iterator for CandidateSlots {
    type Item = TimeOfDay;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next > self.close {
            return None;
        }
        let current = TimeOfDay::from_minutes(self.next).ok()?;
        self.next = self.next.saturating_add(self.step);
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.next > self.close {
            0
        } else {
            ((self.close - self.next) / self.step + 1) as usize
        };
        (remaining, Some(remaining))
    }
}

/// スロットの状態
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    #[display(fmt = "open")]
    Open,
    #[display(fmt = "booked")]
    Booked,
    /// 利用が日付をまたぐ
    #[display(fmt = "overnight")]
    Overnight,
}

/// 予約画面の開始時刻一覧
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotBoard {
    slots: Vec<(TimeOfDay, SlotState)>,
}

impl SlotBoard {
    pub fn resolve(
        grid: &SlotGrid,
        duration: SessionLength,
        busy: &[BusyInterval],
        rule: AvailabilityRule,
    ) -> Self {
        let slots = grid
            .iter()
            .map(|candidate| {
                let state = if !rule.admits(candidate, duration, busy) {
                    SlotState::Booked
                } else if candidate.checked_add_minutes(duration.minutes()).is_none() {
                    SlotState::Overnight
                } else {
                    SlotState::Open
                };
                (candidate, state)
            })
            .collect();
        Self { slots }
    }

    pub fn slots(&self) -> &[(TimeOfDay, SlotState)] {
        &self.slots
    }

    pub fn state_of(&self, time: TimeOfDay) -> Option<SlotState> {
        self.slots
            .iter()
            .find(|(t, _)| *t == time)
            .map(|(_, state)| *state)
    }

    pub fn open_slots(&self) -> impl Iterator<Item = TimeOfDay> + '_ {
        self.slots
            .iter()
            .filter(|(_, state)| *state == SlotState::Open)
            .map(|(t, _)| *t)
    }
}
