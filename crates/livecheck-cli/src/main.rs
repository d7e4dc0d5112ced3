use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use livecheck_core::{
    tune_weights, AuditAccess, ConsentToken, EngineConfig, EvidenceStore, HeuristicMotionModel,
    LabeledSample, LivenessEngine, MlLivenessAdapter, SessionRequest, TuningGrid,
};
use livecheck_signals::frame::LandmarkFrame;
use livecheck_store::SqliteEvidenceStore;

const MASTER_KEY_VAR: &str = "LIVECHECK_MASTER_KEY";

#[derive(Parser)]
#[command(name = "livecheck", version, about = "Face liveness decisions from landmark bursts")]
struct Cli {
    /// TOML configuration; LIVECHECK_* variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a JSON array of landmark frames
    Verify {
        #[arg(long)]
        frames: PathBuf,
        #[arg(long, default_value = "default")]
        policy: String,
        #[arg(long, default_value = "cli")]
        device_id: String,
        #[arg(long)]
        employee_id: Option<String>,
        #[arg(long)]
        consent: Option<String>,
        #[arg(long)]
        device_trust: Option<f64>,
        /// Evidence database; requires LIVECHECK_MASTER_KEY
        #[arg(long)]
        store: Option<PathBuf>,
        /// Remote verifier endpoint for low-confidence fallback
        #[arg(long)]
        remote: Option<String>,
    },
    /// List the configured policies
    Policies,
    /// Grid-search motion/ML weights over a labeled JSON dataset
    Tune {
        #[arg(long)]
        dataset: PathBuf,
        #[arg(long, default_value_t = 0.05)]
        fpr_ceiling: f64,
    },
    /// Create or migrate an evidence database
    InitStore {
        #[arg(long)]
        db: PathBuf,
    },
    /// Allow an audit token to read evidence
    AddAuditor {
        #[arg(long)]
        db: PathBuf,
        token: String,
        #[arg(long, default_value = "auditor")]
        label: String,
    },
    /// Print a stored evidence record
    Audit {
        #[arg(long)]
        db: PathBuf,
        id: String,
        #[arg(long)]
        token: String,
    },
    /// Re-check a stored record's integrity
    CheckEvidence {
        #[arg(long)]
        db: PathBuf,
        id: String,
    },
    /// Delete records past their retention window
    Purge {
        #[arg(long)]
        db: PathBuf,
    },
}

fn master_key() -> Result<[u8; 32], Box<dyn Error>> {
    let raw = std::env::var(MASTER_KEY_VAR)
        .map_err(|_| format!("{} must hold a 64-char hex key", MASTER_KEY_VAR))?;
    let bytes = hex::decode(raw.trim())?;
    if bytes.len() != 32 {
        return Err(format!("{} must decode to 32 bytes", MASTER_KEY_VAR).into());
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

fn open_store(db: &Path) -> Result<SqliteEvidenceStore, Box<dyn Error>> {
    Ok(SqliteEvidenceStore::open(db, master_key()?)?)
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn Error>> {
    Ok(EngineConfig::load_layered(None, path)?)
}

#[cfg(feature = "remote-http")]
fn attach_remote(
    adapter: MlLivenessAdapter,
    remote: Option<String>,
) -> Result<MlLivenessAdapter, Box<dyn Error>> {
    Ok(match remote {
        Some(url) => adapter.with_remote(Arc::new(livecheck_core::ml::HttpRemoteVerifier::new(url))),
        None => adapter,
    })
}

#[cfg(not(feature = "remote-http"))]
fn attach_remote(
    adapter: MlLivenessAdapter,
    remote: Option<String>,
) -> Result<MlLivenessAdapter, Box<dyn Error>> {
    match remote {
        Some(_) => Err("built without the remote-http feature".into()),
        None => Ok(adapter),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.cmd {
        Commands::Verify {
            frames,
            policy,
            device_id,
            employee_id,
            consent,
            device_trust,
            store,
            remote,
        } => {
            let frames: Vec<LandmarkFrame> = serde_json::from_str(&fs::read_to_string(&frames)?)?;
            let window = config.ml.sequence_window;
            let mut engine = LivenessEngine::from_config(config)?;
            if let Some(db) = store {
                engine = engine.with_evidence_store(Arc::new(open_store(&db)?));
            }

            let adapter = engine.adapter(Arc::new(HeuristicMotionModel::new(window)));
            let mut adapter = attach_remote(adapter, remote)?;

            let mut request = SessionRequest::new(device_id, frames).with_policy(policy);
            if let Some(e) = employee_id {
                request = request.with_employee(e);
            }
            if let Some(c) = consent {
                request = request.with_consent(ConsentToken::new(c));
            }
            if let Some(t) = device_trust {
                request = request.with_device_trust(t);
            }

            let outcome = engine.verify(&request, &mut adapter).await?;
            println!("{}", serde_json::to_string_pretty(&outcome.decision)?);
            for hint in outcome.decision.hints() {
                log::info!("hint: {}", hint);
            }
        }
        Commands::Policies => {
            let engine = LivenessEngine::from_config(config)?;
            for p in engine.policies().iter() {
                println!("{}", serde_json::to_string(p)?);
            }
        }
        Commands::Tune {
            dataset,
            fpr_ceiling,
        } => {
            let samples: Vec<LabeledSample> =
                serde_json::from_str(&fs::read_to_string(&dataset)?)?;
            let outcome = tune_weights(&samples, &TuningGrid::with_fpr_ceiling(fpr_ceiling))?;
            log::info!(
                "evaluated {} weight pairs, {} admissible",
                outcome.evaluated,
                outcome.admissible
            );
            println!("{}", serde_json::to_string_pretty(&outcome.best)?);
        }
        Commands::InitStore { db } => {
            let store = open_store(&db)?;
            println!("Initialized evidence store at {} ({} records)", db.display(), store.count()?);
        }
        Commands::AddAuditor { db, token, label } => {
            open_store(&db)?.register_audit_token(&token, &label)?;
            println!("Registered audit token '{}'", label);
        }
        Commands::Audit { db, id, token } => {
            let store = open_store(&db)?;
            match store.get(&id, &AuditAccess::new(token)).await? {
                Some(stored) => {
                    println!("{}", serde_json::to_string_pretty(&stored.record()?)?);
                }
                None => return Err(format!("no evidence with id {}", id).into()),
            }
        }
        Commands::CheckEvidence { db, id } => {
            let ok = open_store(&db)?.verify(&id).await?;
            println!("{}: {}", id, if ok { "intact" } else { "TAMPERED" });
            if !ok {
                std::process::exit(2);
            }
        }
        Commands::Purge { db } => {
            let removed = open_store(&db)?.purge_expired(Utc::now())?;
            println!("Purged {} expired records", removed);
        }
    }
    Ok(())
}
