//! Sync payload codec.
//!
//! A sync response carries a list of [`UpdateRecord`]s. The engine only
//! depends on the [`SyncStateCodec`] contract; [`CborCodec`] is the default
//! implementation.
//!
//! Wire layout (CBOR map):
//!
//! ```text
//! { "ss": [ { "name": "/prefix/uri", "type": 0, "seqno": { "seq": N, "session": S } }, ... ] }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::name::Name;
use crate::record::{ActionType, UpdateRecord};

/// Encodes and decodes sync payloads.
pub trait SyncStateCodec: Send + Sync {
    fn encode(&self, records: &[UpdateRecord]) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Vec<UpdateRecord>>;
}

#[derive(Serialize, Deserialize)]
struct SyncStateMsg {
    ss: Vec<SyncState>,
}

#[derive(Serialize, Deserialize)]
struct SyncState {
    name: String,
    #[serde(rename = "type")]
    action: u8,
    seqno: SeqNo,
}

#[derive(Serialize, Deserialize)]
struct SeqNo {
    seq: i64,
    session: i64,
}

/// CBOR codec built on ciborium.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl SyncStateCodec for CborCodec {
    fn encode(&self, records: &[UpdateRecord]) -> Result<Vec<u8>> {
        let msg = SyncStateMsg {
            ss: records
                .iter()
                .map(|r| SyncState {
                    name: r.producer_prefix.to_uri(),
                    action: r.action.to_u8(),
                    seqno: SeqNo {
                        seq: r.seq,
                        session: r.session,
                    },
                })
                .collect(),
        };

        let mut buf = Vec::new();
        ciborium::ser::into_writer(&msg, &mut buf)
            .map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<UpdateRecord>> {
        let msg: SyncStateMsg = ciborium::de::from_reader(bytes)
            .map_err(|e| CoreError::DecodingError(e.to_string()))?;

        msg.ss
            .into_iter()
            .map(|state| {
                let producer_prefix: Name = state
                    .name
                    .parse()
                    .map_err(|e: CoreError| CoreError::DecodingError(e.to_string()))?;
                let action = ActionType::from_u8(state.action).ok_or_else(|| {
                    CoreError::DecodingError(format!("unknown action type {}", state.action))
                })?;
                Ok(UpdateRecord {
                    producer_prefix,
                    session: state.seqno.session,
                    seq: state.seqno.seq,
                    action,
                })
            })
            .collect()
    }
}
