//! Cross-contract correlation: finds the stablecoin leg of a swap.

use alloy::primitives::Address;
use cycle_data::types::{RawLog, Side, TokenConfig};
use rust_decimal::Decimal;

use crate::decoder::decode_transfer;
use crate::fees::scale_units;

/// Stablecoin amount paired with a primary-token transfer of `wallet`.
///
/// Scans `receipt_logs` in emission order and stops at the first stablecoin
/// transfer sent by the wallet (buy) or received by it (sell). Logs from other
/// contracts or with another shape are skipped. `None` when nothing matches.
pub fn correlate(
    receipt_logs: &[RawLog],
    wallet: Address,
    side: Side,
    stable: &TokenConfig,
) -> Option<Decimal> {
    receipt_logs
        .iter()
        .filter_map(|log| decode_transfer(log, stable.transfer_topic).ok())
        .filter(|transfer| transfer.token == stable.address)
        .find(|transfer| match side {
            Side::Buy => transfer.from == wallet,
            Side::Sell => transfer.to == wallet,
        })
        .map(|transfer| scale_units(transfer.amount, u32::from(stable.decimals)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::address_topic;
    use alloy::primitives::{B256, U256};
    use cycle_data::types::{RawData, RawQuantity, ERC20_TRANSFER_TOPIC0};

    const POOL: Address = Address::new([0x50; 20]);
    const WALLET: Address = Address::new([0x11; 20]);

    fn stable() -> TokenConfig {
        TokenConfig {
            address: Address::repeat_byte(0xcc),
            transfer_topic: ERC20_TRANSFER_TOPIC0.parse().unwrap(),
            decimals: 18,
        }
    }

    fn transfer_log(contract: Address, from: Address, to: Address, whole_units: u64) -> RawLog {
        let raw = U256::from(whole_units) * U256::from(10u8).pow(U256::from(18u8));
        RawLog {
            address: format!("{contract:#x}"),
            topics: vec![
                ERC20_TRANSFER_TOPIC0.to_string(),
                address_topic(from),
                address_topic(to),
            ],
            data: RawData::Bytes(raw.to_be_bytes::<32>().to_vec()),
            block_number: RawQuantity::Number(1),
            transaction_hash: format!("{:#x}", B256::repeat_byte(1)),
            log_index: 0,
        }
    }

    #[test]
    fn buy_takes_stable_sent_by_wallet() {
        let logs = vec![
            transfer_log(stable().address, POOL, WALLET, 5),
            transfer_log(stable().address, WALLET, POOL, 100),
        ];
        assert_eq!(
            correlate(&logs, WALLET, Side::Buy, &stable()),
            Some(Decimal::from(100))
        );
    }

    #[test]
    fn sell_takes_stable_received_by_wallet() {
        let logs = vec![
            transfer_log(stable().address, WALLET, POOL, 5),
            transfer_log(stable().address, POOL, WALLET, 80),
        ];
        assert_eq!(
            correlate(&logs, WALLET, Side::Sell, &stable()),
            Some(Decimal::from(80))
        );
    }

    #[test]
    fn first_matching_leg_wins() {
        let logs = vec![
            transfer_log(stable().address, POOL, WALLET, 80),
            transfer_log(stable().address, POOL, WALLET, 3),
        ];
        assert_eq!(
            correlate(&logs, WALLET, Side::Sell, &stable()),
            Some(Decimal::from(80))
        );
    }

    #[test]
    fn other_contracts_are_ignored() {
        let other = Address::repeat_byte(0xdd);
        let logs = vec![transfer_log(other, WALLET, POOL, 100)];
        assert_eq!(correlate(&logs, WALLET, Side::Buy, &stable()), None);
    }

    #[test]
    fn undecodable_logs_are_skipped() {
        let mut broken = transfer_log(stable().address, WALLET, POOL, 1);
        broken.topics.truncate(2);
        let logs = vec![broken, transfer_log(stable().address, WALLET, POOL, 42)];
        assert_eq!(
            correlate(&logs, WALLET, Side::Buy, &stable()),
            Some(Decimal::from(42))
        );
    }
}
