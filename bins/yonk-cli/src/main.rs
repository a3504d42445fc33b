//! yonk — Command-line front end for a Yonk world.
//!
//! World state lives in a JSON snapshot file (`--state`). Each mutating
//! command loads the snapshot, performs one operation through the serialized
//! executor and writes the snapshot back. `--now` pins the clock so runs are
//! reproducible.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use yonk_core::access::Component;
use yonk_core::challenge::{registration_challenge, release_challenge};
use yonk_core::crypto::{self, DeviceKeyPair, DevicePublicKey, Signature};
use yonk_core::traits::{Clock, DecayCalculator, ManualClock, SystemClock};
use yonk_core::types::{
    decode_hex_array, Address, Amount, DecayParams, Hash256, YellTarget, YellTerms,
};
use yonk_core::vectors;
use yonk_decay::LinearDecay;
use yonk_world::{config, Caller, World, WorldSnapshot};

/// Yonk identity and decaying-value transfer tool.
#[derive(Parser)]
#[command(name = "yonk")]
#[command(version, about = "P-256 identities and decaying-value transfers")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// World snapshot file, created on first use.
    #[arg(long, global = true, default_value = "yonk-state.json")]
    state: PathBuf,

    /// Pin the clock to this Unix time instead of reading the system clock.
    #[arg(long, global = true)]
    now: Option<u64>,

    /// Config file applied when a new world is created.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a device key pair.
    Keygen,
    /// Verify a single P-256 signature.
    Verify(VerifyArgs),
    /// Check every vector in a JSONL file, including its high-S twin.
    VerifyVectors(VerifyVectorsArgs),
    /// Evaluate the decay curve.
    ValueAt(ValueAtArgs),
    /// Register a device key as a new identity.
    Register(RegisterArgs),
    /// Create a decaying-value transfer.
    Yell(YellArgs),
    /// Claim a transfer addressed to you.
    Claim(ClaimArgs),
    /// Release an ephemeral escrow slot to your identity.
    Release(ReleaseArgs),
    /// Reclaim an expired transfer you sent.
    Reclaim(ReclaimArgs),
    /// Print world state as JSON.
    Show(ShowArgs),
}

#[derive(Args)]
struct VerifyArgs {
    /// Public key as hex `x || y` (optionally `04`-prefixed).
    #[arg(long)]
    key: String,
    /// Hex `r`.
    #[arg(short)]
    r: String,
    /// Hex `s`.
    #[arg(short)]
    s: String,
    /// Hex 32-byte digest.
    #[arg(long, conflicts_with = "msg", required_unless_present = "msg")]
    hash: Option<String>,
    /// Hex message, hashed with SHA-256.
    #[arg(long)]
    msg: Option<String>,
}

#[derive(Args)]
struct VerifyVectorsArgs {
    /// JSONL file of `{x, y, r, s, hash, valid, msg}` records.
    file: PathBuf,
}

#[derive(Args)]
struct ValueAtArgs {
    /// Decimal or 0x-hex value, up to 256 bits.
    #[arg(long)]
    start: Amount,
    #[arg(long, default_value_t = Amount::ZERO)]
    end: Amount,
    /// Lifetime in seconds.
    #[arg(long)]
    life: u64,
    /// Seconds since creation.
    #[arg(long)]
    elapsed: u64,
}

#[derive(Args)]
struct RegisterArgs {
    /// Hex secret of the device key. A fresh key is generated if omitted.
    #[arg(long)]
    secret: Option<String>,
    /// Controlling address to bind.
    #[arg(long)]
    address: Option<Address>,
    /// Skip the proof of key control.
    #[arg(long)]
    no_proof: bool,
}

#[derive(Args)]
struct YellArgs {
    /// Sender's controlling address.
    #[arg(long)]
    from: Address,
    /// Recipient identity id.
    #[arg(long, conflicts_with = "ephemeral", required_unless_present = "ephemeral")]
    to: Option<u64>,
    /// Public key of a one-time recipient key.
    #[arg(long)]
    ephemeral: Option<String>,
    /// Value at creation, decimal or 0x-hex.
    #[arg(long)]
    start: Amount,
    /// Value at expiry.
    #[arg(long, default_value_t = Amount::ZERO)]
    end: Amount,
    /// Lifetime in seconds.
    #[arg(long)]
    life: u64,
    /// Off-chain data, committed to by its SHA-256.
    #[arg(long, default_value = "")]
    data: String,
}

#[derive(Args)]
struct ClaimArgs {
    /// Claimant's controlling address.
    #[arg(long = "as")]
    caller: Address,
    /// Transfer id.
    id: u64,
}

#[derive(Args)]
struct ReleaseArgs {
    /// Claimant's controlling address.
    #[arg(long = "as")]
    caller: Address,
    /// Hex secret of the one-time key the transfer was addressed to.
    #[arg(long)]
    ephemeral_secret: String,
    /// Claim in the same step.
    #[arg(long)]
    claim: bool,
    /// Transfer id.
    id: u64,
}

#[derive(Args)]
struct ReclaimArgs {
    /// Sender's controlling address.
    #[arg(long = "as")]
    caller: Address,
    /// Transfer id.
    id: u64,
}

#[derive(Args)]
struct ShowArgs {
    /// Show one transfer with its current value.
    #[arg(long, conflicts_with = "identity")]
    transfer: Option<u64>,
    /// Show one identity.
    #[arg(long)]
    identity: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.global.log_level, &cli.global.log_format);

    match cli.command {
        Commands::Keygen => keygen(),
        Commands::Verify(args) => verify(args),
        Commands::VerifyVectors(args) => verify_vectors(args),
        Commands::ValueAt(args) => value_at(args),
        Commands::Register(args) => register(&cli.global, args),
        Commands::Yell(args) => yell(&cli.global, args),
        Commands::Claim(args) => claim(&cli.global, args),
        Commands::Release(args) => release(&cli.global, args),
        Commands::Reclaim(args) => reclaim(&cli.global, args),
        Commands::Show(args) => show(&cli.global, args),
    }
}

/// Initialize tracing.
///
/// `RUST_LOG` overrides the `--log-level` default.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}

// ---------------------------------------------------------------------------
// Stateless commands
// ---------------------------------------------------------------------------

fn keygen() -> Result<()> {
    let kp = DeviceKeyPair::generate();
    let key = kp.public_key();
    println!("secret:  {}", hex::encode(kp.secret_bytes()));
    println!("key:     {key}");
    println!("address: {}", key.address());
    Ok(())
}

fn verify(args: VerifyArgs) -> Result<()> {
    let key = parse_key(&args.key)?;
    let signature = Signature {
        r: parse_hex("r", &args.r)?,
        s: parse_hex("s", &args.s)?,
    };
    let hash = match (&args.hash, &args.msg) {
        (Some(h), _) => Hash256(parse_hex("hash", h)?),
        (None, Some(m)) => crypto::sha256(&hex::decode(m.strip_prefix("0x").unwrap_or(m))?),
        (None, None) => bail!("one of --hash or --msg is required"),
    };
    match crypto::check_signature(&key, &hash, &signature) {
        Ok(()) => {
            println!("valid");
            Ok(())
        }
        Err(e) => bail!("invalid: {e}"),
    }
}

fn verify_vectors(args: VerifyVectorsArgs) -> Result<()> {
    let file = File::open(&args.file)
        .with_context(|| format!("failed to open {}", args.file.display()))?;
    let records = vectors::parse_jsonl(BufReader::new(file))?;

    let mut disagree = 0usize;
    let mut twins_accepted = 0usize;
    let mut hash_mismatch = 0usize;
    for (i, record) in records.iter().enumerate() {
        let outcome = record
            .decode()
            .with_context(|| format!("vector {}", i + 1))?
            .check();
        if !outcome.agrees {
            warn!(vector = i + 1, verdict = ?outcome.verdict, "verdict disagrees with fixture");
            disagree += 1;
        }
        if matches!(outcome.twin_verdict, Some(Ok(()))) {
            warn!(vector = i + 1, "high-S twin accepted");
            twins_accepted += 1;
        }
        if !outcome.hash_matches_msg {
            hash_mismatch += 1;
        }
    }
    println!(
        "{} vectors: {} agree, {} disagree, {} twins accepted, {} hash/msg mismatches",
        records.len(),
        records.len() - disagree,
        disagree,
        twins_accepted,
        hash_mismatch
    );
    if disagree > 0 || twins_accepted > 0 {
        bail!("vector check failed");
    }
    Ok(())
}

fn value_at(args: ValueAtArgs) -> Result<()> {
    let params = DecayParams {
        start_value: args.start,
        end_value: args.end,
        life_seconds: args.life,
        start_timestamp: 0,
    };
    println!("{}", LinearDecay::new().value_at(&params, args.elapsed)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// World commands
// ---------------------------------------------------------------------------

fn register(global: &GlobalArgs, args: RegisterArgs) -> Result<()> {
    let world = open_world(global)?;
    let kp = match &args.secret {
        Some(secret) => parse_secret(secret)?,
        None => {
            let kp = DeviceKeyPair::generate();
            println!("secret: {}", hex::encode(kp.secret_bytes()));
            kp
        }
    };
    let key = kp.public_key();
    let proof = if args.no_proof {
        None
    } else {
        let challenge = registration_challenge(&world.domain(), &key, args.address.as_ref());
        Some(kp.sign_hash(&challenge)?)
    };
    let id = world.register(key, args.address, proof.as_ref())?;
    save_world(&world, &global.state)?;
    println!("identity: {id}");
    Ok(())
}

fn yell(global: &GlobalArgs, args: YellArgs) -> Result<()> {
    let world = open_world(global)?;
    let target = match (args.to, &args.ephemeral) {
        (Some(id), _) => YellTarget::Identity(id),
        (None, Some(key)) => YellTarget::Ephemeral(parse_key(key)?),
        (None, None) => bail!("one of --to or --ephemeral is required"),
    };
    let terms = YellTerms {
        target,
        data_commitment: crypto::sha256(args.data.as_bytes()),
        start_value: args.start,
        end_value: args.end,
        life_seconds: args.life,
    };
    let id = world.yell(&Caller::Address(args.from), &terms)?;
    save_world(&world, &global.state)?;
    println!("transfer: {id}");
    Ok(())
}

fn claim(global: &GlobalArgs, args: ClaimArgs) -> Result<()> {
    let world = open_world(global)?;
    let receipt = world.claim(&Caller::Address(args.caller), args.id)?;
    save_world(&world, &global.state)?;
    println!("payout: {} (returned {})", receipt.payout, receipt.returned);
    Ok(())
}

fn release(global: &GlobalArgs, args: ReleaseArgs) -> Result<()> {
    let world = open_world(global)?;
    let eph = parse_secret(&args.ephemeral_secret)?;
    let claimant = world.resolve(Component::ClaimSystem, &args.caller)?;
    let authorization = eph.sign_hash(&release_challenge(&world.domain(), args.id, claimant))?;
    let caller = Caller::Address(args.caller);

    if args.claim {
        let receipt = world.claim_ephemeral(&caller, args.id, &authorization)?;
        save_world(&world, &global.state)?;
        println!("payout: {} (returned {})", receipt.payout, receipt.returned);
    } else {
        let to = world.release(&caller, args.id, &authorization)?;
        save_world(&world, &global.state)?;
        println!("released to identity {to}");
    }
    Ok(())
}

fn reclaim(global: &GlobalArgs, args: ReclaimArgs) -> Result<()> {
    let world = open_world(global)?;
    let receipt = world.reclaim(&Caller::Address(args.caller), args.id)?;
    save_world(&world, &global.state)?;
    println!("residual: {} (burned {})", receipt.residual, receipt.burned);
    Ok(())
}

fn show(global: &GlobalArgs, args: ShowArgs) -> Result<()> {
    let world = open_world(global)?;
    let out = if let Some(id) = args.transfer {
        let transfer = world
            .transfer(id)
            .with_context(|| format!("unknown transfer {id}"))?;
        serde_json::json!({
            "transfer": transfer,
            "current_value": world.current_value(id)?,
            "escrow": world.escrow_slot(id),
        })
    } else if let Some(id) = args.identity {
        let identity = world
            .identity(id)
            .with_context(|| format!("unknown identity {id}"))?;
        serde_json::json!({
            "identity": identity,
            "address": identity.device_key.address(),
            "pending": world.pending_for(id),
        })
    } else {
        let snapshot = world.snapshot();
        serde_json::json!({
            "domain": snapshot.config.domain,
            "identities": snapshot.identities.len(),
            "transfers": snapshot.transfers.len(),
            "pending": snapshot.transfers.iter().filter(|t| t.status.is_pending()).count(),
            "events": snapshot.events.len(),
            "residual_pool": snapshot.residual_pool.to_string(),
        })
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn clock(now: Option<u64>) -> Arc<dyn Clock> {
    match now {
        Some(now) => Arc::new(ManualClock::new(now)),
        None => Arc::new(SystemClock),
    }
}

/// Load the world from `global.state`, or create it from config if absent.
fn open_world(global: &GlobalArgs) -> Result<World> {
    let clock = clock(global.now);
    if global.state.exists() {
        if global.config.is_some() {
            warn!("state file exists, ignoring --config");
        }
        let json = std::fs::read_to_string(&global.state)
            .with_context(|| format!("failed to read {}", global.state.display()))?;
        let world = World::from_snapshot(WorldSnapshot::from_json(&json)?, clock)?;
        Ok(world)
    } else {
        let config = config::load(global.config.as_deref())?;
        info!(state = %global.state.display(), "creating new world");
        Ok(World::new(config, clock)?)
    }
}

fn save_world(world: &World, path: &Path) -> Result<()> {
    let json = world.snapshot().to_json()?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

fn parse_hex<const N: usize>(field: &str, value: &str) -> Result<[u8; N]> {
    decode_hex_array(value).map_err(|e| anyhow::anyhow!("{field}: {e}"))
}

fn parse_key(value: &str) -> Result<DevicePublicKey> {
    let key: DevicePublicKey = value.parse().map_err(|e| anyhow::anyhow!("key: {e}"))?;
    key.validate().context("key is not a P-256 point")?;
    Ok(key)
}

fn parse_secret(value: &str) -> Result<DeviceKeyPair> {
    Ok(DeviceKeyPair::from_secret_bytes(parse_hex("secret", value)?)?)
}
