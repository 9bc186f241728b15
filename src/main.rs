//! coldtx command-line front end.
//!
//! Thin layer over the library: reads and writes JSON transaction records,
//! builds the engine from a TOML config, and prints summaries.
//!
//! ```text
//! coldtx create --inputs in.json --to ADDR,AMOUNT --fee 50G -o tx.unsigned.json
//! coldtx sign tx.unsigned.json --keys keyaddr.json -o tx.signed.json     (offline)
//! coldtx send tx.signed.json --wait -o tx.sent.json
//! coldtx status tx.sent.json
//! coldtx bump tx.sent.json -o tx.bump.unsigned.json
//! coldtx view tx.signed.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use alloy::primitives::{Address, Bytes};
use clap::{Parser, Subcommand};

use coldtx::broadcast::Broadcaster;
use coldtx::chain::{AddressDeriver, ChainFamily};
use coldtx::config::{load_config, EngineConfig};
use coldtx::keys::{KeyAddrFile, KeySource, RawKeylist};
use coldtx::observability::logging::init_logging;
use coldtx::rpc::{EthRpcClient, NetworkRpc, OfflineRpc};
use coldtx::tx::{format_summary, CallSpec, Input, Output, Transaction, TxEngine};
use coldtx::units::{parse_amount, FeeSpec};

#[derive(Parser)]
#[command(name = "coldtx")]
#[command(about = "Build, sign and send cold-wallet transactions", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a transaction and materialize it (online)
    Create {
        /// JSON array of inputs
        #[arg(long)]
        inputs: PathBuf,
        /// Payment output as ADDRESS,AMOUNT (amount in the coin unit)
        #[arg(long)]
        to: Vec<String>,
        /// Change address
        #[arg(long)]
        change: Option<String>,
        /// Absolute fee ("0.00105") or rate with unit letter ("50G", "20s").
        /// Uses the network estimate when omitted.
        #[arg(long)]
        fee: Option<String>,
        /// ERC-20 transfer as CONTRACT,DECIMALS
        #[arg(long, conflicts_with = "data")]
        token: Option<String>,
        /// Hex contract call data; with no --to it creates a contract
        #[arg(long)]
        data: Option<String>,
        #[arg(long)]
        comment: Option<String>,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Sign an unsigned record (offline)
    Sign {
        record: PathBuf,
        /// Key-address file (JSON)
        #[arg(long)]
        keys: Option<PathBuf>,
        /// Raw keylist, one key per line
        #[arg(long)]
        keylist: Option<PathBuf>,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Broadcast a signed record
    Send {
        record: PathBuf,
        /// Run all checks without submitting
        #[arg(long)]
        simulate: bool,
        /// Wait for confirmation after sending
        #[arg(long)]
        wait: bool,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Check mempool and confirmation state
    Status {
        record: PathBuf,
        #[arg(long)]
        wait: bool,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Create and materialize a higher-fee replacement (online)
    Bump {
        record: PathBuf,
        #[arg(long)]
        fee: Option<String>,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print a transaction summary
    View { record: PathBuf },
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };
    init_logging(&config.logging)?;

    tracing::debug!(
        family = %config.network.family,
        coin = %config.network.coin,
        chain_id = ?config.network.chain_id,
        "Configuration loaded"
    );

    match cli.command {
        Commands::Create {
            inputs,
            to,
            change,
            fee,
            token,
            data,
            comment,
            out,
        } => {
            let engine = online_engine(&config)?;
            let inputs: Vec<Input> = serde_json::from_str(&std::fs::read_to_string(&inputs)?)?;
            let mut outputs = Vec::new();
            for spec in &to {
                let (address, amount) = spec
                    .split_once(',')
                    .ok_or_else(|| format!("expected ADDRESS,AMOUNT, got '{}'", spec))?;
                let unit = match &token {
                    Some(t) => token_unit(t)?,
                    None => engine.units().coin(),
                };
                outputs.push(Output::new(address, parse_amount(amount, unit)?));
            }
            if let Some(address) = change {
                outputs.push(Output::change(address));
            }
            if data.is_some() && outputs.is_empty() {
                // contract creation
                outputs.push(Output::new("", Default::default()));
            }

            let fee_spec = match fee {
                Some(spec) => FeeSpec::parse(&spec, engine.units())?,
                None => FeeSpec::Network,
            };
            let mut draft = engine.create_draft(inputs, outputs, fee_spec)?;
            draft = draft.with_call(call_spec(token.as_deref(), data.as_deref())?);
            if let Some(comment) = comment {
                draft = draft.with_comment(comment);
            }

            let unsigned = engine.materialize(&draft).await?;
            write_record(&unsigned, out.as_deref())?;
        }
        Commands::Sign {
            record,
            keys,
            keylist,
            out,
        } => {
            let engine = TxEngine::new(config.adapter(), OfflineRpc, config.tx_options()?)
                .with_expected_chain_id(config.network.chain_id);
            let tx = engine.reopen(read_record(&record)?)?;

            let kafile = match &keys {
                Some(path) => Some(KeyAddrFile::from_json(
                    path.display().to_string(),
                    &std::fs::read_to_string(path)?,
                )?),
                None => None,
            };
            let mut raw = match &keylist {
                Some(path) => {
                    let deriver: Arc<dyn AddressDeriver> = config.adapter();
                    Some(RawKeylist::parse(
                        path.display().to_string(),
                        &std::fs::read_to_string(path)?,
                        deriver,
                    )?)
                }
                None => None,
            };
            if let (Some(raw), Some(kafile)) = (raw.as_mut(), kafile.as_ref()) {
                raw.remove_duplicates(kafile);
            }

            let mut sources: Vec<&dyn KeySource> = Vec::new();
            if let Some(kafile) = &kafile {
                sources.push(kafile);
            }
            if let Some(raw) = &raw {
                sources.push(raw);
            }
            if sources.is_empty() {
                return Err("no key source given (--keys or --keylist)".into());
            }

            let signed = engine.sign(&tx, &sources)?;
            write_record(&signed, out.as_deref())?;
        }
        Commands::Send {
            record,
            simulate,
            wait,
            out,
        } => {
            let engine = online_engine(&config)?;
            let tx = engine.reopen(read_record(&record)?)?;
            let mut broadcast_config = config.broadcast.clone();
            broadcast_config.simulate_only |= simulate;
            let broadcaster = Broadcaster::new(&engine, broadcast_config);

            let result = broadcaster.broadcast(&tx).await?;
            eprintln!("{}: {}", result.tx.id(), result.outcome.as_str());
            let mut tx = result.tx;
            if wait && !broadcaster.config().simulate_only {
                let (confirmed, report) = broadcaster.wait_for_confirmation(&tx).await?;
                eprintln!("{}", serde_json::to_string(&report)?);
                tx = confirmed;
            }
            write_record(&tx, out.as_deref())?;
        }
        Commands::Status { record, wait, out } => {
            let engine = online_engine(&config)?;
            let tx = engine.reopen(read_record(&record)?)?;
            let broadcaster = Broadcaster::new(&engine, config.broadcast.clone());
            let (tx, report) = if wait {
                broadcaster.wait_for_confirmation(&tx).await?
            } else {
                broadcaster.poll_status(&tx).await?
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            if let Some(path) = out {
                write_record(&tx, Some(&path))?;
            }
        }
        Commands::Bump { record, fee, out } => {
            let engine = online_engine(&config)?;
            let tx = engine.reopen(read_record(&record)?)?;
            let fee_spec = fee.map(|spec| FeeSpec::parse(&spec, engine.units())).transpose()?;
            let draft = engine.bump(&tx, fee_spec)?;
            let unsigned = engine.materialize(&draft).await?;
            write_record(&unsigned, out.as_deref())?;
        }
        Commands::View { record } => {
            let tx = read_record(&record)?;
            println!("{}", serde_json::to_string_pretty(&format_summary(&tx))?);
        }
    }

    Ok(())
}

fn online_engine(config: &EngineConfig) -> CliResult<TxEngine<Arc<dyn NetworkRpc>>> {
    let rpc: Arc<dyn NetworkRpc> = match config.network.family {
        ChainFamily::Account => Arc::new(EthRpcClient::new(&config.rpc)?),
        ChainFamily::Utxo => {
            tracing::warn!("No UTXO node client available, network queries will fail");
            Arc::new(OfflineRpc)
        }
    };
    Ok(TxEngine::new(config.adapter(), rpc, config.tx_options()?)
        .with_expected_chain_id(config.network.chain_id))
}

fn token_unit(spec: &str) -> CliResult<coldtx::units::Unit> {
    let (_, decimals) = spec
        .split_once(',')
        .ok_or_else(|| format!("expected CONTRACT,DECIMALS, got '{}'", spec))?;
    Ok(coldtx::units::Unit {
        name: "token",
        letter: 't',
        decimals: decimals.trim().parse()?,
    })
}

fn call_spec(token: Option<&str>, data: Option<&str>) -> CliResult<CallSpec> {
    if let Some(spec) = token {
        let (contract, decimals) = spec
            .split_once(',')
            .ok_or_else(|| format!("expected CONTRACT,DECIMALS, got '{}'", spec))?;
        return Ok(CallSpec::Token {
            contract: contract.trim().parse::<Address>()?,
            decimals: decimals.trim().parse()?,
        });
    }
    match data {
        Some(hex) => Ok(CallSpec::Data {
            data: hex.trim().parse::<Bytes>()?,
        }),
        None => Ok(CallSpec::None),
    }
}

fn read_record(path: &Path) -> CliResult<Transaction> {
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

fn write_record(tx: &Transaction, out: Option<&Path>) -> CliResult<()> {
    let json = serde_json::to_string_pretty(tx)?;
    match out {
        Some(path) => {
            std::fs::write(path, json + "\n")?;
            tracing::info!(txid = %tx.id(), status = %tx.status, path = %path.display(), "Record written");
        }
        None => println!("{}", json),
    }
    Ok(())
}
