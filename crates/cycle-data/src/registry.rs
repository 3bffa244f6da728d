//! Wallet registry loading.
//!
//! The registry is a plain text file, one wallet per line:
//!
//! ```text
//! # address;display name[;sell]
//! 0x1111111111111111111111111111111111111111;alice
//! 0x2222222222222222222222222222222222222222;bob;sell
//! ```
//!
//! The optional `sell` flag marks a wallet that is already holding the
//! primary token and waits for its sell first. Everything between the first
//! `;` and a trailing `;sell` or `;buy` is the display name, so names may
//! contain `;`. A name that itself ends in `;sell` or `;buy` is read as a flag.
//!
//! Addresses are unique across the registry. A repeated address is dropped
//! with a warning and the first occurrence wins; the wallet book relies on
//! this and does not check again at runtime.

use alloy::primitives::Address;
use eyre::{eyre, Context, Result};
use std::collections::HashSet;
use std::path::Path;

use crate::types::WalletEntry;

/// Reads and parses a registry file.
///
/// # Errors
/// Returns error if the file cannot be read or a line is malformed.
pub fn load_wallets(path: &Path) -> Result<Vec<WalletEntry>> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read wallet registry {}", path.display()))?;

    let wallets = parse_wallets(&content)
        .wrap_err_with(|| format!("invalid wallet registry {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        wallets = wallets.len(),
        "wallet registry loaded"
    );
    Ok(wallets)
}

/// Parses registry text, enforcing address uniqueness.
///
/// # Errors
/// Returns error naming the first malformed line.
pub fn parse_wallets(content: &str) -> Result<Vec<WalletEntry>> {
    let mut seen: HashSet<Address> = HashSet::new();
    let mut wallets = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line_number = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let entry = parse_line(trimmed).wrap_err_with(|| format!("line {line_number}"))?;

        if !seen.insert(entry.address) {
            tracing::warn!(
                line_number,
                address = %entry.address,
                "duplicate wallet address, keeping first entry"
            );
            continue;
        }
        wallets.push(entry);
    }

    Ok(wallets)
}

fn parse_line(line: &str) -> Result<WalletEntry> {
    let (address_text, rest) = line
        .split_once(';')
        .ok_or_else(|| eyre!("expected `address;name`, got `{line}`"))?;
    let address_text = address_text.trim();

    // only a trailing `;buy` or `;sell` is a flag, anything else is part of the name
    let (name, starts_awaiting_sell) = match rest.rsplit_once(';') {
        Some((name, flag)) if flag.trim() == "sell" => (name, true),
        Some((name, flag)) if flag.trim() == "buy" => (name, false),
        _ => (rest, false),
    };
    let name = name.trim();

    if name.is_empty() {
        return Err(eyre!("wallet name is empty"));
    }

    let address = address_text
        .parse::<Address>()
        .map_err(|e| eyre!("invalid address `{address_text}`: {e}"))?;

    Ok(WalletEntry {
        address,
        name: name.to_string(),
        starts_awaiting_sell,
    })
}
