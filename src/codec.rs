use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::BoxError;

/// Serializes request bodies and deserializes response payloads.
pub trait Codec: Send + Sync + 'static {
    /// Content type attached to encoded bodies when the caller set none.
    fn content_type(&self) -> &'static str;

    fn encode<T>(&self, value: &T) -> Result<Bytes, BoxError>
    where
        T: Serialize + ?Sized;

    fn decode<T>(&self, bytes: &[u8]) -> Result<T, BoxError>
    where
        T: DeserializeOwned;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode<T>(&self, value: &T) -> Result<Bytes, BoxError>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|source| Box::new(source) as BoxError)
    }

    fn decode<T>(&self, bytes: &[u8]) -> Result<T, BoxError>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(bytes).map_err(|source| Box::new(source) as BoxError)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Serialize};

    use super::{Codec, JsonCodec};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: u32,
        name: String,
    }

    #[test]
    fn json_codec_encodes_utf8_json() {
        let bytes = JsonCodec
            .encode(&Item {
                id: 7,
                name: "Grace".to_owned(),
            })
            .expect("item should encode");
        assert_eq!(&bytes[..], br#"{"id":7,"name":"Grace"}"#);
    }

    #[test]
    fn json_codec_rejects_non_string_map_keys() {
        let mut map = BTreeMap::new();
        map.insert(vec![1_u8], 1_u8);
        assert!(JsonCodec.encode(&map).is_err());
    }

    #[test]
    fn json_codec_decode_failure_is_an_error() {
        let result: Result<Item, _> = JsonCodec.decode(b"{\"id\":");
        assert!(result.is_err());
    }
}
