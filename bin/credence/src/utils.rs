use credence_primitives::constants::storage::DATA_DIR;
use dirs::home_dir;
use ethers::types::Address;
use expanded_pathbuf::ExpandedPathBuf;
use pin_utils::pin_mut;
use std::{future::Future, str::FromStr};
use tracing::info;

/// Unwrap path or returns home directory
pub fn unwrap_path_or_home(path: Option<ExpandedPathBuf>) -> eyre::Result<ExpandedPathBuf> {
    if let Some(path) = path {
        Ok(path)
    } else {
        home_dir()
            .map(|h| h.join(DATA_DIR))
            .ok_or_else(|| eyre::eyre!("Get Home directory error"))
            .map(ExpandedPathBuf)
    }
}

/// Parses address from string
pub fn parse_address(s: &str) -> Result<Address, String> {
    Address::from_str(s).map_err(|_| format!("String {s} is not a valid address"))
}

/// Checks the private key is 32 hex encoded bytes, with or without `0x`
pub fn validate_private_key(hex_string: &str) -> Result<String, String> {
    let digits = hex_string.trim_start_matches("0x");

    if digits.chars().count() != 64 {
        return Err("relayer key is not a valid private key".into());
    }
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err("relayer key is not a valid hexadecimal string".into());
    }

    Ok(String::from(hex_string))
}

/// Runs the future to completion or until:
/// - `ctrl-c` is received.
/// - `SIGTERM` is received (unix only).
pub async fn run_until_ctrl_c<F, E>(fut: F) -> Result<(), E>
where
    F: Future<Output = Result<(), E>>,
    E: Send + Sync + 'static + From<std::io::Error>,
{
    let ctrl_c = tokio::signal::ctrl_c();

    let mut stream = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let sigterm = stream.recv();
    pin_mut!(sigterm, ctrl_c, fut);

    tokio::select! {
        _ = ctrl_c => {
            info!("Received ctrl-c signal.");
        },
        _ = sigterm => {
            info!("Received SIGTERM signal.");
        },
        res = fut => res?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_key_validation() {
        let key = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
        assert!(validate_private_key(key).is_ok());
        assert!(validate_private_key(&format!("0x{key}")).is_ok());
        assert!(validate_private_key(&key[1..]).is_err());
        assert!(validate_private_key(&key.replace('c', "z")).is_err());
    }

    #[test]
    fn explicit_path_is_kept() {
        let path = ExpandedPathBuf::from_str("/tmp/credence").unwrap();
        assert_eq!(
            unwrap_path_or_home(Some(path.clone())).unwrap().to_path_buf(),
            path.to_path_buf()
        );
    }
}
