pub mod core;

use std::{collections::HashMap, str::FromStr};

use derive_more::{Display, Error};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::domain::{DataAccessError, Entity, Event, Id};

impl From<EventConvertError> for DataAccessError {
    fn from(value: EventConvertError) -> Self {
        DataAccessError::ClientSideError(Box::new(value))
    }
}

impl From<StreamError> for DataAccessError {
    fn from(value: StreamError) -> Self {
        DataAccessError::WriteError(Box::new(value))
    }
}

#[derive(Debug, Display, Error)]
#[display(fmt = "Failed to convert event")]
pub struct EventConvertError;

impl From<serde_json::Error> for EventConvertError {
    fn from(_value: serde_json::Error) -> Self {
        EventConvertError
    }
}

#[derive(Debug, Display, Error)]
pub enum StreamError {
    #[display(fmt = "Stream {} already exists", _0)]
    AlreadyExists(#[error(not(source))] String),
    #[display(fmt = "Stream {} does not exist", _0)]
    NotFound(#[error(not(source))] String),
}

/// 追記時に期待するストリームの状態
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExpectedRevision {
    NoStream,
    StreamExists,
    Any,
}

/// 保存形式のイベント
#[derive(Clone, Debug, PartialEq)]
pub struct EventRecord {
    pub event_type: String,
    pub data: Value,
}

/// ストリーム単位でイベントを保持するメモリ上のストア
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<String, Vec<EventRecord>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read_stream(&self, stream_name: &str) -> Option<Vec<EventRecord>> {
        self.streams.read().await.get(stream_name).cloned()
    }

    pub async fn append_to_stream(
        &self,
        stream_name: &str,
        expected: ExpectedRevision,
        events: Vec<EventRecord>,
    ) -> Result<(), StreamError> {
        let mut streams = self.streams.write().await;
        match (expected, streams.contains_key(stream_name)) {
            (ExpectedRevision::NoStream, true) => {
                return Err(StreamError::AlreadyExists(stream_name.to_owned()))
            }
            (ExpectedRevision::StreamExists, false) => {
                return Err(StreamError::NotFound(stream_name.to_owned()))
            }
            _ => {}
        }
        streams
            .entry(stream_name.to_owned())
            .or_default()
            .extend(events);
        Ok(())
    }
}

fn entity_id<I, T>(stream_id: &str) -> Option<I>
where
    I: Id<Inner = T>,
    T: FromStr,
{
    stream_id
        .split('-')
        .filter_map(|s| s.parse::<T>().ok())
        .map(I::from)
        .last()
}

fn stream_name<E: Entity>(id: E::Id) -> String {
    E::ENTITY_NAME.to_owned() + "-" + &id.to_string()
}

fn from_event<E: Event>(event: E) -> Result<EventRecord, EventConvertError> {
    let root = serde_json::to_value(event)?;
    let (event_type, data) = root
        .as_object()
        .and_then(|o| o.iter().next())
        .ok_or(EventConvertError)?;
    let mut data = data.clone();
    if let Some(object) = data.as_object_mut() {
        object.remove("id");
    }
    Ok(EventRecord {
        event_type: event_type.clone(),
        data,
    })
}

fn try_from_record<E, I>(stream_id: &str, record: &EventRecord) -> Result<E, EventConvertError>
where
    E: DeserializeOwned + Event<Id = I>,
    I: Id,
{
    let id = entity_id::<I, I::Inner>(stream_id).ok_or(EventConvertError)?;
    let mut data = record.data.clone();
    data.as_object_mut()
        .ok_or(EventConvertError)?
        .insert("id".to_owned(), json!(id));
    let json = json!({ &record.event_type: data });
    Ok(serde_json::from_value(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::core::{CustomerId, Wallet, WalletEvent};

    #[test]
    fn test_event_record_round_trip_restores_id() {
        let id = CustomerId::from(42);
        let record = from_event(WalletEvent::WalletOpened { id }).unwrap();
        assert_eq!(record.event_type, "WalletOpened");
        assert_eq!(record.data, json!({}));

        let stream = stream_name::<Wallet>(id);
        assert_eq!(stream, "wallet-42");
        let event: WalletEvent = try_from_record(&stream, &record).unwrap();
        assert_eq!(event, WalletEvent::WalletOpened { id });
    }

    #[tokio::test]
    async fn test_append_respects_expected_revision() {
        let store = InMemoryEventStore::new();
        let record = EventRecord {
            event_type: "WalletOpened".to_owned(),
            data: json!({}),
        };
        assert!(store
            .append_to_stream("wallet-1", ExpectedRevision::StreamExists, vec![record.clone()])
            .await
            .is_err());
        store
            .append_to_stream("wallet-1", ExpectedRevision::NoStream, vec![record.clone()])
            .await
            .unwrap();
        assert!(store
            .append_to_stream("wallet-1", ExpectedRevision::NoStream, vec![record.clone()])
            .await
            .is_err());
        store
            .append_to_stream("wallet-1", ExpectedRevision::Any, vec![record])
            .await
            .unwrap();
        assert_eq!(store.read_stream("wallet-1").await.map(|s| s.len()), Some(2));
        assert_eq!(store.read_stream("wallet-2").await, None);
    }
}
