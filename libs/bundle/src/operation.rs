//! Raw, ledger-ready operations.

use serde::{Serialize, Serializer};
use stepchain_abi::{hex, Address, Bytes, SolValue, U256};

/// One resolved operation.
///
/// Creations carry no target (the ledger assigns the address) and the init
/// code as payload; calls carry the resolved target and the encoded call data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOperation {
    pub is_create: bool,
    pub target: Option<Address>,
    #[serde(serialize_with = "serialize_hex")]
    pub payload: Vec<u8>,
    pub resource_limit: u64,
}

impl RawOperation {
    pub fn create(init_code: Vec<u8>, resource_limit: u64) -> Self {
        Self {
            is_create: true,
            target: None,
            payload: init_code,
            resource_limit,
        }
    }

    pub fn call(target: Address, call_data: Vec<u8>, resource_limit: u64) -> Self {
        Self {
            is_create: false,
            target: Some(target),
            payload: call_data,
            resource_limit,
        }
    }

    /// Target as sent to the coordinator; the zero address for creations.
    pub fn target_or_zero(&self) -> Address {
        self.target.unwrap_or(Address::ZERO)
    }

    /// `(bool isCreate, address target, uint256 resourceLimit, bytes payload)`.
    pub(crate) fn members(&self) -> (bool, Address, U256, Bytes) {
        (
            self.is_create,
            self.target_or_zero(),
            U256::from(self.resource_limit),
            Bytes::copy_from_slice(&self.payload),
        )
    }

    /// `abi.encode(isCreate, target, resourceLimit, payload)`.
    pub fn encode(&self) -> Vec<u8> {
        self.members().abi_encode_params()
    }
}

fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode_prefixed(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_encodes_zero_target() {
        let op = RawOperation::create(vec![0x60, 0x80], 21_000);
        let encoded = op.encode();
        // bool, address, uint256, offset, length, one padded data word
        assert_eq!(encoded.len(), 6 * 32);
        assert_eq!(encoded[31], 1);
        assert!(encoded[32..64].iter().all(|b| *b == 0));
        assert_eq!(&encoded[160..162], &[0x60, 0x80]);
    }

    #[test]
    fn test_serializes_payload_as_hex() {
        let op = RawOperation::call(Address::repeat_byte(0x22), vec![0xab], 5);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["payload"], "0xab");
        assert_eq!(json["isCreate"], false);
        assert_eq!(json["resourceLimit"], 5);
    }
}
