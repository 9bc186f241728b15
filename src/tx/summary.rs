//! Structured view of a transaction for the presentation layer.

use alloy::primitives::U256;
use serde::Serialize;

use crate::chain::token::decode_transfer;
use crate::chain::{ChainFamily, Payload};
use crate::tx::types::{Execution, Transaction, TxStatus};
use crate::units::{format_amount, Unit, UnitTable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryOutput {
    pub address: String,
    pub amount: String,
    pub is_change: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenSummary {
    pub contract: String,
    pub recipient: String,
    pub amount: String,
}

/// Everything a viewer shows, already formatted in display units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxSummary {
    pub id: String,
    pub status: TxStatus,
    pub family: ChainFamily,
    pub coin: &'static str,
    pub from: Vec<String>,
    pub outputs: Vec<SummaryOutput>,
    pub fee: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_rate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenSummary>,
    pub data_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_contract: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<Execution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent: Option<u64>,
}

/// Rates read best in Gwei on account chains and satoshi per byte on UTXO chains.
fn rate_unit(table: &UnitTable) -> Unit {
    table.lookup("Gwei").unwrap_or_else(|_| table.base())
}

fn display_address(address: &str) -> String {
    if address.trim().is_empty() {
        "(contract creation)".to_string()
    } else {
        address.to_string()
    }
}

/// Recipients and coin amounts as signed. Change flags come from the record.
fn payload_outputs(tx: &Transaction, payload: &Payload, coin: Unit) -> Vec<SummaryOutput> {
    match payload {
        Payload::Account(p) => {
            // token transfers move no coin; the recipient is in the call data
            let address = match (p.token, p.to) {
                (Some(_), _) => decode_transfer(&p.data).map(|(recipient, _)| recipient.to_checksum(None)),
                (None, to) => Some(to.map(|a| a.to_checksum(None)).unwrap_or_default()),
            };
            vec![SummaryOutput {
                address: display_address(&address.unwrap_or_default()),
                amount: format_amount(p.amount, coin),
                is_change: tx.outputs.first().is_some_and(|o| o.is_change),
            }]
        }
        Payload::Utxo(p) => p
            .outputs
            .iter()
            .enumerate()
            .map(|(n, o)| SummaryOutput {
                address: o.address.clone(),
                amount: format_amount(U256::from(o.amount), coin),
                is_change: tx.outputs.get(n).is_some_and(|r| r.is_change),
            })
            .collect(),
    }
}

pub fn format_summary(tx: &Transaction) -> TxSummary {
    let table = UnitTable::for_family(tx.family);
    let coin = table.coin();
    let rate_unit = rate_unit(&table);

    let mut nonce = None;
    let mut chain_id = None;
    let mut token = None;
    let mut data_bytes = 0;
    if let Some(Payload::Account(p)) = &tx.payload {
        nonce = Some(p.nonce);
        chain_id = Some(p.chain_id);
        data_bytes = p.data.len();
        if let (Some(meta), Some(contract)) = (p.token, p.to) {
            token = decode_transfer(&p.data).map(|(recipient, amount)| TokenSummary {
                contract: contract.to_checksum(None),
                recipient: recipient.to_checksum(None),
                amount: format_amount(
                    amount,
                    Unit {
                        name: "token",
                        letter: 't',
                        decimals: meta.decimals,
                    },
                ),
            });
        }
    }

    let outputs = match &tx.payload {
        Some(payload) => payload_outputs(tx, payload, coin),
        None => tx
            .outputs
            .iter()
            .map(|o| SummaryOutput {
                address: display_address(&o.address),
                amount: format_amount(o.amount, coin),
                is_change: o.is_change,
            })
            .collect(),
    };
    let from = match tx.payload.as_ref().map(Payload::view) {
        Some(Ok(view)) => view.senders.into_iter().map(|(address, _)| address).collect(),
        _ => tx.inputs.iter().map(|i| i.address.clone()).collect(),
    };

    TxSummary {
        id: tx.id().to_string(),
        status: tx.status,
        family: tx.family,
        coin: coin.name,
        from,
        outputs,
        fee: format_amount(tx.fee, coin),
        fee_rate: tx
            .fee_rate
            .map(|rate| format!("{} {}", format_amount(rate, rate_unit), rate_unit.name)),
        nonce,
        chain_id,
        token,
        data_bytes,
        created_contract: tx.created_contract.clone(),
        replaces: tx.replaces.as_ref().map(|r| r.original.clone()),
        execution: tx.execution,
        comment: tx.comment.clone(),
        created: tx.timestamps.created,
        sent: tx.timestamps.sent,
    }
}
