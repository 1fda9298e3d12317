use crate::error::Result;

/// Parse hex text, with or without a leading `0x` marker. Returns the bytes and whether the
/// marker was present, so output can be formatted the same way.
pub(crate) fn parse_hex(text: &str) -> Result<(Vec<u8>, bool)> {
    let text = text.trim();
    let (digits, prefixed) = match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(rest) => (rest, true),
        None => (text, false),
    };
    Ok((hex::decode(digits)?, prefixed))
}

pub(crate) fn format_hex(bytes: &[u8], prefixed: bool) -> String {
    if prefixed {
        format!("0x{}", hex::encode(bytes))
    } else {
        hex::encode(bytes)
    }
}

/// Serde adapter storing a list of byte strings as `0x`-prefixed hex text.
pub(crate) mod hex_list {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(list: &[Vec<u8>], ser: S) -> Result<S::Ok, S::Error> {
        ser.collect_seq(list.iter().map(|v| super::format_hex(v, true)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let list = Vec::<String>::deserialize(de)?;
        list.iter()
            .map(|s| super::parse_hex(s).map(|(v, _)| v).map_err(D::Error::custom))
            .collect()
    }
}

/// Serde adapter storing a 20-byte address as `0x`-prefixed hex text.
pub(crate) mod hex_address {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(addr: &[u8; 20], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&super::format_hex(addr, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<[u8; 20], D::Error> {
        let text = String::deserialize(de)?;
        let (bytes, _) = super::parse_hex(&text).map_err(D::Error::custom)?;
        <[u8; 20]>::try_from(bytes.as_slice())
            .map_err(|_| D::Error::custom(format!("expected 20 bytes, got {}", bytes.len())))
    }
}
