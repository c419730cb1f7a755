use core::hash::Hash;
use core::ops::{Deref, DerefMut};

use bincode::{
    de::Decoder,
    enc::Encoder,
    error::{DecodeError, EncodeError},
    Decode, Encode,
};
use hashbrown::HashMap;

/// A [`hashbrown::HashMap`] wrapper with a bincode codec.
///
/// Entries are encoded in key order so that the same map always produces the
/// same byte sequence.
#[derive(Debug, Clone, Default)]
pub struct SerializableHashMap<K, V>(pub HashMap<K, V>);

impl<K, V> Deref for SerializableHashMap<K, V> {
    type Target = HashMap<K, V>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<K, V> DerefMut for SerializableHashMap<K, V> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<K, V> Decode for SerializableHashMap<K, V>
where
    K: Encode + Decode + Eq + Hash,
    V: Encode + Decode,
{
    fn decode<D: Decoder>(decoder: &mut D) -> Result<Self, DecodeError> {
        let raw: Vec<(K, V)> = Decode::decode(decoder)?;
        Ok(Self(raw.into_iter().collect()))
    }
}

impl<K, V> Encode for SerializableHashMap<K, V>
where
    K: Encode + Decode + Ord,
    V: Encode + Decode,
{
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        let mut raw: Vec<(&K, &V)> = self.0.iter().collect();
        raw.sort_by(|a, b| a.0.cmp(b.0));
        Encode::encode(&raw, encoder)?;
        Ok(())
    }
}

/// Buckets a non-negative count into a small closed set of strings.
///
/// Distances and valencies share this bucketing so that numeric fields live
/// in the same string space as categorical ones.
pub fn bucket(n: usize) -> &'static str {
    match n {
        0 => "0",
        1 => "1",
        2 => "2",
        3 => "3",
        4 => "4",
        5 => "5",
        _ => "6+",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_exact_and_overflow() {
        assert_eq!("0", bucket(0));
        assert_eq!("5", bucket(5));
        assert_eq!("6+", bucket(6));
        assert_eq!("6+", bucket(100));
    }

    #[test]
    fn test_serializable_hash_map_roundtrip() {
        let mut map = SerializableHashMap::<String, u32>::default();
        map.insert("b".to_string(), 2);
        map.insert("a".to_string(), 1);
        let config = bincode::config::standard();
        let bytes = bincode::encode_to_vec(&map, config).unwrap();
        let (decoded, _): (SerializableHashMap<String, u32>, usize) =
            bincode::decode_from_slice(&bytes, config).unwrap();
        assert_eq!(Some(&1), decoded.get("a"));
        assert_eq!(Some(&2), decoded.get("b"));
        assert_eq!(2, decoded.len());
    }
}
