//! `Transfer` decoding, mint/burn classification and output formatting.
//!
//! The event signature hash is the keccak256 of the canonical ABI signature:
//!   keccak256("Transfer(address,address,uint256)")
//!   → 0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef

use alloy_primitives::{Address, B256, U256};
use tiny_keccak::{Hasher, Keccak};

use crate::client::LogEntry;
use crate::config::MonitorConfig;
use crate::error::DecodeError;

/// Canonical ABI signature of the ERC-20 Transfer event.
pub const TRANSFER_SIGNATURE: &str = "Transfer(address,address,uint256)";

/// keccak256 of an event signature string.
pub fn event_signature_hash(signature: &str) -> B256 {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(signature.as_bytes());
    hasher.finalize(&mut output);
    B256::from(output)
}

/// A decoded Transfer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub from: Address,
    pub to: Address,
    /// Raw amount in the token's smallest unit.
    pub amount: U256,
}

/// How a transfer is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    Mint,
    Burn,
    Transfer,
}

impl std::fmt::Display for TransferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mint => write!(f, "mint"),
            Self::Burn => write!(f, "burn"),
            Self::Transfer => write!(f, "transfer"),
        }
    }
}

/// Decodes, classifies and renders Transfer logs for one token.
#[derive(Debug, Clone)]
pub struct TransferFormatter {
    signature: B256,
    mint_source: Address,
    dev_address: Address,
    symbol: String,
    decimals: u8,
    precision: usize,
}

impl TransferFormatter {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            signature: event_signature_hash(TRANSFER_SIGNATURE),
            mint_source: config.mint_source,
            dev_address: config.dev_address,
            symbol: config.token.symbol.clone(),
            decimals: config.token.decimals,
            precision: config.token.precision,
        }
    }

    /// Decode `log` if it is a Transfer event.
    ///
    /// `Ok(None)` for any other event; `Err` when the signature matches but
    /// the indexed addresses or the amount cannot be recovered.
    pub fn decode(&self, log: &LogEntry) -> Result<Option<Transfer>, DecodeError> {
        if log.topics.first() != Some(&self.signature) {
            return Ok(None);
        }
        let topic = |index: usize| {
            log.topics.get(index).copied().ok_or(DecodeError::MissingTopic {
                index,
                len: log.topics.len(),
            })
        };
        let from = Address::from_word(topic(1)?);
        let to = Address::from_word(topic(2)?);
        let amount = parse_amount(&log.data)?;
        Ok(Some(Transfer { from, to, amount }))
    }

    /// Mint/burn rules, evaluated in order; the dev address suppresses both.
    pub fn classify(&self, transfer: &Transfer) -> TransferKind {
        if transfer.from == self.mint_source && transfer.to != self.dev_address {
            TransferKind::Mint
        } else if transfer.to == self.mint_source && transfer.from != self.dev_address {
            TransferKind::Burn
        } else {
            TransferKind::Transfer
        }
    }

    /// Output line for an already-classified transfer.
    pub fn render(&self, transfer: &Transfer, kind: TransferKind) -> String {
        let amount = format_units(transfer.amount, self.decimals, self.precision);
        match kind {
            TransferKind::Mint => {
                format!("{} Mint {amount} {}!!!", transfer.to.to_checksum(None), self.symbol)
            }
            TransferKind::Burn => {
                format!("{} Burn {amount} {}!!!", transfer.from.to_checksum(None), self.symbol)
            }
            TransferKind::Transfer => format!(
                "{} -> {} {amount} {}",
                transfer.from.to_checksum(None),
                transfer.to.to_checksum(None),
                self.symbol
            ),
        }
    }

    /// Classify `log` and render its output line.
    ///
    /// Malformed Transfer logs are reported with a warning here and come
    /// back as [`Classified::Malformed`].
    pub fn classify_and_format(&self, log: &LogEntry) -> Classified {
        match self.decode(log) {
            Ok(Some(transfer)) => {
                let kind = self.classify(&transfer);
                Classified::Event {
                    kind,
                    line: self.render(&transfer, kind),
                }
            }
            Ok(None) => Classified::Ignored,
            Err(e) => {
                tracing::warn!(error = %e, tx = ?log.transaction_hash, "skipping malformed Transfer log");
                Classified::Malformed(e)
            }
        }
    }
}

/// Result of [`TransferFormatter::classify_and_format`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// A Transfer event and the line to print for it.
    Event { kind: TransferKind, line: String },
    /// Not a Transfer event.
    Ignored,
    /// Transfer signature, but the payload could not be decoded.
    Malformed(DecodeError),
}

impl Classified {
    /// The output line, if there is one.
    pub fn line(&self) -> Option<&str> {
        match self {
            Self::Event { line, .. } => Some(line),
            _ => None,
        }
    }
}

/// Big-endian unsigned integer from the whole data payload. Leading zero
/// bytes beyond 32 are tolerated; an empty payload is zero.
fn parse_amount(data: &[u8]) -> Result<U256, DecodeError> {
    let significant = match data.iter().position(|b| *b != 0) {
        Some(start) => &data[start..],
        None => return Ok(U256::ZERO),
    };
    if significant.len() > 32 {
        return Err(DecodeError::AmountOverflow { len: significant.len() });
    }
    Ok(U256::from_be_slice(significant))
}

/// Scale `amount` down by 10^`decimals` and render it with exactly
/// `precision` fractional digits, rounding half-up at the last digit.
///
/// `decimals` must be at most 77.
pub fn format_units(amount: U256, decimals: u8, precision: usize) -> String {
    let ten = U256::from(10u8);
    let decimals = usize::from(decimals);

    if precision >= decimals {
        let unit = ten.pow(U256::from(decimals));
        let int = amount / unit;
        if precision == 0 {
            return int.to_string();
        }
        let frac = (amount % unit).to_string();
        let mut digits = if decimals == 0 {
            String::new()
        } else {
            format!("{frac:0>decimals$}")
        };
        digits.extend(std::iter::repeat('0').take(precision - decimals));
        return format!("{int}.{digits}");
    }

    let divisor = ten.pow(U256::from(decimals - precision));
    let mut scaled = amount / divisor;
    let rem = amount % divisor;
    // rem >= divisor / 2, without overflowing near U256::MAX
    if rem >= divisor - rem {
        scaled += U256::from(1u8);
    }
    if precision == 0 {
        return scaled.to_string();
    }
    let unit = ten.pow(U256::from(precision));
    let int = scaled / unit;
    let frac = (scaled % unit).to_string();
    format!("{int}.{frac:0>precision$}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const HOLDER: Address = address!("d8da6bf26964af9d7eed9e03e53415d37aa96045");
    const OTHER: Address = address!("ab5801a7d398351b8be11c439e05c5b3259aec9b");

    fn wei(s: &str) -> U256 {
        U256::from_str_radix(s, 10).unwrap()
    }

    fn transfer_log(from: Address, to: Address, amount: U256) -> LogEntry {
        LogEntry {
            topics: vec![
                event_signature_hash(TRANSFER_SIGNATURE),
                from.into_word(),
                to.into_word(),
            ],
            data: amount.to_be_bytes::<32>().to_vec(),
            ..Default::default()
        }
    }

    fn formatter() -> TransferFormatter {
        TransferFormatter::new(&MonitorConfig::default())
    }

    #[test]
    fn erc20_transfer_signature() {
        assert_eq!(
            format!("{:x}", event_signature_hash(TRANSFER_SIGNATURE)),
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn one_and_a_half_tokens() {
        assert_eq!(format_units(wei("1500000000000000000"), 18, 5), "1.50000");
    }

    #[test]
    fn format_small_and_zero_amounts() {
        assert_eq!(format_units(U256::ZERO, 18, 5), "0.00000");
        assert_eq!(format_units(wei("1"), 18, 5), "0.00000");
        assert_eq!(format_units(wei("10000000000000"), 18, 5), "0.00001");
        // exactly half of the last digit rounds up
        assert_eq!(format_units(wei("5000000000000"), 18, 5), "0.00001");
        assert_eq!(format_units(wei("4999999999999"), 18, 5), "0.00000");
    }

    #[test]
    fn format_rounds_into_integer_part() {
        assert_eq!(format_units(wei("999999999999999999"), 18, 5), "1.00000");
        assert_eq!(format_units(wei("1234567890123456789012"), 18, 5), "1234.56789");
    }

    #[test]
    fn format_precision_beyond_decimals() {
        assert_eq!(format_units(wei("1500000"), 6, 8), "1.50000000");
        assert_eq!(format_units(wei("42"), 0, 2), "42.00");
        assert_eq!(format_units(wei("42"), 0, 0), "42");
        assert_eq!(format_units(wei("1500000000000000000"), 18, 0), "2");
    }

    #[test]
    fn format_max_amount_does_not_overflow() {
        let out = format_units(U256::MAX, 18, 5);
        assert!(out.starts_with("115792089237316195423570985008687907853269984665640564039457"));
        assert!(out.ends_with(".58401"));
        let out = format_units(U256::MAX, 77, 5);
        assert_eq!(out, "1.15792");
    }

    #[test]
    fn displayed_value_within_half_a_digit() {
        let unit = wei("10000000000000"); // one displayed digit, in wei
        for n in [
            "0",
            "1",
            "7",
            "4999999999999",
            "5000000000000",
            "123456789012345678",
            "1500000000000000000",
            "987654321987654321987654321",
            "340282366920938463463374607431768211455",
        ] {
            let amount = wei(n);
            let shown = format_units(amount, 18, 5);
            let (int, frac) = shown.split_once('.').unwrap();
            let back = wei(&format!("{int}{frac}")) * unit;
            let diff = if back > amount { back - amount } else { amount - back };
            assert!(diff * U256::from(2u8) <= unit, "{n} -> {shown}");
        }
    }

    #[test]
    fn ignores_other_events() {
        let mut log = transfer_log(HOLDER, OTHER, wei("1"));
        // Approval(address,address,uint256)
        log.topics[0] = event_signature_hash("Approval(address,address,uint256)");
        assert_eq!(formatter().classify_and_format(&log), Classified::Ignored);
        assert_eq!(formatter().classify_and_format(&LogEntry::default()), Classified::Ignored);
    }

    #[test]
    fn mint_from_sentinel() {
        let log = transfer_log(Address::ZERO, HOLDER, wei("2000000000000000000"));
        assert_eq!(
            formatter().classify_and_format(&log).line().unwrap(),
            "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045 Mint 2.00000 CROW!!!"
        );
    }

    #[test]
    fn classified_event_carries_kind() {
        let log = transfer_log(HOLDER, Address::ZERO, wei("1"));
        match formatter().classify_and_format(&log) {
            Classified::Event { kind, line } => {
                assert_eq!(kind, TransferKind::Burn);
                assert!(line.contains(" Burn "));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn burn_to_sentinel() {
        let log = transfer_log(HOLDER, Address::ZERO, wei("250000000000000000"));
        assert_eq!(
            formatter().classify_and_format(&log).line().unwrap(),
            "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045 Burn 0.25000 CROW!!!"
        );
    }

    #[test]
    fn plain_transfer() {
        let log = transfer_log(HOLDER, OTHER, wei("1000000000000000000"));
        assert_eq!(
            formatter().classify_and_format(&log).line().unwrap(),
            "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045 -> \
             0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B 1.00000 CROW"
        );
    }

    #[test]
    fn dev_address_suppresses_mint_and_burn() {
        let f = formatter();
        let dev = MonitorConfig::default().dev_address;

        let mint_to_dev = f.decode(&transfer_log(Address::ZERO, dev, wei("1"))).unwrap().unwrap();
        assert_eq!(f.classify(&mint_to_dev), TransferKind::Transfer);

        let burn_from_dev = f.decode(&transfer_log(dev, Address::ZERO, wei("1"))).unwrap().unwrap();
        assert_eq!(f.classify(&burn_from_dev), TransferKind::Transfer);

        let line = f.render(&burn_from_dev, TransferKind::Transfer);
        assert!(line.starts_with(&dev.to_checksum(None)));
        assert!(line.ends_with("-> 0x0000000000000000000000000000000000000000 0.00000 CROW"));
    }

    #[test]
    fn sentinel_to_sentinel_is_a_mint() {
        let f = formatter();
        let t = f.decode(&transfer_log(Address::ZERO, Address::ZERO, wei("1"))).unwrap().unwrap();
        assert_eq!(f.classify(&t), TransferKind::Mint);
    }

    #[test]
    fn missing_recipient_topic_is_malformed() {
        let mut log = transfer_log(HOLDER, OTHER, wei("1"));
        log.topics.truncate(2);
        assert_eq!(
            formatter().decode(&log),
            Err(DecodeError::MissingTopic { index: 2, len: 2 })
        );
        assert_eq!(
            formatter().classify_and_format(&log),
            Classified::Malformed(DecodeError::MissingTopic { index: 2, len: 2 })
        );
    }

    #[test]
    fn amount_payload_edge_cases() {
        let f = formatter();
        let mut log = transfer_log(HOLDER, OTHER, wei("1"));

        log.data.clear();
        assert_eq!(f.decode(&log).unwrap().unwrap().amount, U256::ZERO);

        let mut padded = vec![0u8; 64];
        padded[63] = 7;
        log.data = padded;
        assert_eq!(f.decode(&log).unwrap().unwrap().amount, U256::from(7u8));

        let mut wide = vec![0u8; 33];
        wide[0] = 1;
        log.data = wide;
        assert_eq!(f.decode(&log), Err(DecodeError::AmountOverflow { len: 33 }));
    }

    #[test]
    fn custom_symbol_and_decimals() {
        let mut config = MonitorConfig::default();
        config.token.symbol = "USDC".into();
        config.token.decimals = 6;
        config.token.precision = 2;
        let f = TransferFormatter::new(&config);
        let log = transfer_log(HOLDER, OTHER, wei("1234567"));
        assert!(f.classify_and_format(&log).line().unwrap().ends_with(" 1.23 USDC"));
    }
}
