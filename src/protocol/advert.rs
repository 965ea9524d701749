use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Serialize, Deserialize};

use crate::core::{Error, NodeId, Result, NETID_DISABLED, NETID_ENABLED};

/// Manufacturer-data layout of a radio advertisement
///
/// | offset | size | field                       |
/// |--------|------|-----------------------------|
/// | 0      | 1    | enabled sentinel (127 / 0)  |
/// | 1      | 1    | node id                     |
/// | 2      | 4    | state, i32 LE (full only)   |
/// | 2 / 6  | 4    | vstate, i32 LE              |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvertLayout {
    /// Sentinel, node, state and vstate (10 bytes)
    #[default]
    Full,
    /// Sentinel followed by the 5-byte node + vstate block
    Compact,
}

impl AdvertLayout {
    /// Encoded payload length
    pub fn len(&self) -> usize {
        match self {
            AdvertLayout::Full => 10,
            AdvertLayout::Compact => 6,
        }
    }

    fn vstate_offset(&self) -> usize {
        match self {
            AdvertLayout::Full => 6,
            AdvertLayout::Compact => 2,
        }
    }
}

/// Decoded radio advertisement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advertisement {
    pub enabled: bool,
    pub node: NodeId,
    /// Present only in the full layout
    pub state: Option<i32>,
    pub vstate: i32,
}

impl Advertisement {
    /// Encodes the payload; a missing state is sent as 0 in the full layout
    pub fn encode(&self, layout: AdvertLayout) -> Bytes {
        let mut buf = BytesMut::with_capacity(layout.len());
        buf.put_u8(if self.enabled { NETID_ENABLED } else { NETID_DISABLED });
        buf.put_u8(self.node.0);
        if layout == AdvertLayout::Full {
            buf.put_i32_le(self.state.unwrap_or(0));
        }
        buf.put_i32_le(self.vstate);
        buf.freeze()
    }

    /// Decodes a payload; trailing bytes beyond the layout are ignored
    pub fn decode(payload: &[u8], layout: AdvertLayout) -> Result<Self> {
        if payload.len() < layout.len() {
            return Err(Error::protocol(format!(
                "advertisement too short: {} bytes, expected {}",
                payload.len(),
                layout.len()
            )));
        }

        let mut buf = payload;
        let enabled = buf.get_u8() == NETID_ENABLED;
        let node = NodeId(buf.get_u8());
        let state = match layout {
            AdvertLayout::Full => Some(buf.get_i32_le()),
            AdvertLayout::Compact => None,
        };
        let vstate = buf.get_i32_le();
        debug_assert_eq!(payload.len() - buf.len(), layout.vstate_offset() + 4);

        Ok(Advertisement { enabled, node, state, vstate })
    }

    /// Reads only the node id, as done while scanning for neighbors
    pub fn peek_node(payload: &[u8]) -> Option<NodeId> {
        payload.get(1).copied().map(NodeId)
    }
}

/// Formats a payload as space-separated `0x..` bytes for the advertising tool
pub fn hex_bytes(payload: &[u8]) -> String {
    payload
        .iter()
        .map(|b| format!("0x{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_round_trip() {
        let adv = Advertisement {
            enabled: true,
            node: NodeId(5),
            state: Some(1234),
            vstate: -5678,
        };
        let bytes = adv.encode(AdvertLayout::Full);
        assert_eq!(bytes.len(), 10);
        assert_eq!(bytes[0], 127);
        assert_eq!(bytes[1], 5);
        assert_eq!(&bytes[2..6], &1234i32.to_le_bytes());
        assert_eq!(&bytes[6..10], &(-5678i32).to_le_bytes());
        assert_eq!(Advertisement::decode(&bytes, AdvertLayout::Full).unwrap(), adv);
    }

    #[test]
    fn test_boundary_values() {
        for (node, state, vstate) in [
            (0u8, i32::MIN, i32::MAX),
            (255u8, i32::MAX, i32::MIN),
            (0u8, 0, 0),
        ] {
            for enabled in [true, false] {
                let adv = Advertisement { enabled, node: NodeId(node), state: Some(state), vstate };
                let decoded = Advertisement::decode(&adv.encode(AdvertLayout::Full), AdvertLayout::Full).unwrap();
                assert_eq!(decoded, adv);
            }
        }
    }

    #[test]
    fn test_compact_layout() {
        let adv = Advertisement {
            enabled: false,
            node: NodeId(255),
            state: None,
            vstate: i32::MIN,
        };
        let bytes = adv.encode(AdvertLayout::Compact);
        assert_eq!(bytes.len(), 6);
        assert_eq!(bytes[0], 0);
        assert_eq!(Advertisement::decode(&bytes, AdvertLayout::Compact).unwrap(), adv);
    }

    #[test]
    fn test_unknown_sentinel_is_disabled() {
        let payload = [0x55, 3, 1, 0, 0, 0];
        let adv = Advertisement::decode(&payload, AdvertLayout::Compact).unwrap();
        assert!(!adv.enabled);
        assert_eq!(adv.vstate, 1);
    }

    #[test]
    fn test_short_payload_rejected() {
        assert!(Advertisement::decode(&[127, 1, 0, 0], AdvertLayout::Full).is_err());
        assert_eq!(Advertisement::peek_node(&[127, 9]), Some(NodeId(9)));
        assert_eq!(Advertisement::peek_node(&[127]), None);
    }

    #[test]
    fn test_hex_bytes() {
        assert_eq!(hex_bytes(&[0x7f, 0x05, 0x00]), "0x7f 0x05 0x00");
    }
}
