//! Misc utils

use ethers::{types::Address, utils::to_checksum};

/// Converts address to checksum address
pub fn as_checksum_addr<S>(val: &Address, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_str(&to_checksum(val, None))
}

/// Converts Option address to checksum
pub fn as_checksum_addr_opt<S>(val: &Option<Address>, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    if let Some(addr) = val {
        s.serialize_str(&to_checksum(addr, None))
    } else {
        s.serialize_none()
    }
}

/// If possible, parses address from the first 20 bytes
pub fn get_address(buf: &[u8]) -> Option<Address> {
    if buf.len() >= 20 {
        Some(Address::from_slice(&buf[0..20]))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_prefix() {
        let addr: Address = "0x95222290DD7278Aa3Ddd389Cc1E1d165CC4BAfe5".parse().unwrap();
        let buf = [addr.as_bytes(), &[0u8; 4]].concat();
        assert_eq!(get_address(&buf), Some(addr));
        assert_eq!(get_address(&buf[..19]), None);
    }

    #[test]
    fn checksum_serialization() {
        #[derive(serde::Serialize)]
        struct Holder {
            #[serde(serialize_with = "as_checksum_addr_opt")]
            addr: Option<Address>,
        }

        let addr: Address = "0x95222290dd7278aa3ddd389cc1e1d165cc4bafe5".parse().unwrap();
        assert_eq!(
            serde_json::to_string(&Holder { addr: Some(addr) }).unwrap(),
            r#"{"addr":"0x95222290DD7278Aa3Ddd389Cc1E1d165CC4BAfe5"}"#
        );
        assert_eq!(serde_json::to_string(&Holder { addr: None }).unwrap(), r#"{"addr":null}"#);
    }
}
