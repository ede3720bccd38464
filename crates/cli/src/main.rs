mod auth;
mod cli;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};

use ceremony_core::{timefmt::format_duration_ms, Config, StatusSink, TracingStatusSink};
use ceremony_coordination::{CoordinationAdapter, HttpCoordinationAdapter};
use ceremony_dispatch::{dispatch_snapshot, DispatchContext, DispatchOutcome};
use ceremony_finalize::{Finalizer, GistAttestationPublisher};
use ceremony_pipeline::{ContributionPipeline, FakeZkeyContributor};
use ceremony_storage::S3StorageAdapter;

use crate::auth::{IdentityClient, IdentityProfile, StoredSession, TokenStore};
use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    ceremony_core::config::load_dotenv();
    let args = CliArgs::parse();
    let store = TokenStore::new();

    match args.command {
        Command::Login { token } => login(&store, token).await,
        Command::Logout => {
            store.clear().context("failed to clear stored session")?;
            info!("logged out");
            Ok(())
        }
        Command::Contribute { ceremony_id } => {
            let mut config = Config::from_env();
            if let Some(id) = ceremony_id {
                config.ceremony_id = id;
            }
            config.log_summary();
            contribute(&store, config).await
        }
    }
}

async fn login(store: &TokenStore, token: String) -> Result<()> {
    let config = Config::from_env();
    let identity = IdentityClient::new(config.identity.profile_url.clone());
    let profile = identity.fetch_profile(&token).await.context("could not verify token with identity provider")?;
    store.save(&StoredSession { token, username: profile.login.clone() }).context("failed to persist session")?;
    info!(username = %profile.login, "logged in");
    Ok(())
}

/// `contribute(ceremonyId)` (spec.md §4.8).
async fn contribute(store: &TokenStore, config: Config) -> Result<()> {
    let sink: Arc<dyn StatusSink> = Arc::new(TracingStatusSink);

    // 1. Require authenticated identity; require stored OAuth token.
    let session = match store.load() {
        Some(session) => session,
        None => {
            sink.info("not logged in; run `ceremony-cli login --token <TOKEN>` first");
            return Ok(());
        }
    };

    // 2. Reputation gate.
    let identity = IdentityClient::new(config.identity.profile_url.clone());
    let profile = match identity.fetch_profile(&session.token).await {
        Ok(profile) => profile,
        Err(e) => {
            sink.info(&format!("Error: could not verify identity ({e})"));
            return Ok(());
        }
    };
    // 3. Reputation gate; resolve identity-provider user id from token.
    let participant_id = match reputation_gate(&profile, &config.reputation) {
        Ok(id) => id,
        Err(message) => {
            sink.info(&message);
            return Ok(());
        }
    };

    if config.ceremony_id.is_empty() {
        bail!("CEREMONY_ID is not set (pass --ceremony-id or set the environment variable)");
    }

    let coordination: Arc<dyn CoordinationAdapter> = Arc::new(HttpCoordinationAdapter::new(config.coordination.clone()));

    // 4. checkParticipantForCeremony(ceremonyId).
    let eligible = coordination.check_participant_for_ceremony(&config.ceremony_id).await?;
    if !eligible {
        let timeouts = coordination.get_active_timeouts(&config.ceremony_id, &participant_id).await?;
        match timeouts.first() {
            Some(timeout) => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                let remaining = timeout.end_date_ms - now_ms;
                sink.info(&format!("cool-down active; resumes in {}", format_duration_ms(remaining)));
            }
            None => sink.info("cannot participate in this ceremony"),
        }
        return Ok(());
    }

    let ceremony_snapshot = coordination.get_ceremony(&config.ceremony_id).await?;
    let ceremony = match ceremony_snapshot.data {
        Some(ceremony) => ceremony,
        None => {
            sink.info("Error: ceremony document is missing");
            return Ok(());
        }
    };

    let storage = Arc::new(S3StorageAdapter::new(&config.aws));
    let contributor = Arc::new(FakeZkeyContributor);
    let pipeline = Arc::new(ContributionPipeline::new(
        coordination.clone(),
        storage,
        contributor,
        sink.clone(),
        config.aws.bucket_postfix.clone(),
        config.verification.verify_contribution_url.clone(),
    ));

    let publisher = Arc::new(GistAttestationPublisher::new(config.identity.attestation_publish_url.clone()));
    let finalizer = Arc::new(Finalizer::new(publisher));

    let ctx = DispatchContext {
        coordination: coordination.clone(),
        pipeline,
        finalizer,
        sink: sink.clone(),
        ceremony_id: config.ceremony_id.clone(),
        ceremony_prefix: ceremony.prefix.clone(),
        ceremony_name: ceremony.title.clone(),
        contributor_id: participant_id.clone(),
        oauth_token: session.token.clone(),
        queue_observer: std::sync::Mutex::new(None),
    };

    run_session(&ctx, ceremony.circuits).await
}

/// Reputation gate (spec.md §4.8 step 2, §8 scenario 6): below threshold,
/// the caller must stop before any coordination client, pipeline, or
/// subscription is ever constructed.
fn reputation_gate(profile: &IdentityProfile, reputation: &ceremony_core::config::ReputationConfig) -> Result<String, String> {
    if profile.meets_threshold(reputation) {
        Ok(profile.login.clone())
    } else {
        Err(reputation.threshold_explanation())
    }
}

/// Attach C8: subscribe to the participant document and run the dispatch
/// rules against every delivered snapshot until terminal.
async fn run_session(ctx: &DispatchContext, mut circuits: Vec<ceremony_core::Circuit>) -> Result<()> {
    let mut subscription = ctx.coordination.subscribe_participant(&ctx.ceremony_id, &ctx.contributor_id);
    let mut prev: Option<ceremony_core::Participant> = None;

    while let Some(snapshot) = subscription.snapshots.recv().await {
        let current = match snapshot.data {
            Some(current) => current,
            None => {
                error!("participant document disappeared mid-session");
                break;
            }
        };

        // The circuit list is captured once at session start; re-fetch the
        // one circuit this snapshot is bound to so rule 3/4's queue-owner
        // check and the pipeline's zkey indexing see the server's current
        // `waiting_queue`/`completed_contributions`, not a stale copy from
        // before other participants advanced it.
        if let Some(circuit_id) = current.current_circuit(&circuits).map(|c| c.id.clone()) {
            if let Ok(snapshot) = ctx.coordination.get_circuit(&ctx.ceremony_id, &circuit_id).await {
                if let Some(fresh) = snapshot.data {
                    if let Some(slot) = circuits.iter_mut().find(|c| c.id == circuit_id) {
                        *slot = fresh;
                    }
                }
            }
        }

        match dispatch_snapshot(ctx, prev.as_ref(), &current, &circuits).await {
            Ok(DispatchOutcome::Terminate) => break,
            Ok(DispatchOutcome::Continue) => {}
            Err(e @ ceremony_dispatch::DispatchError::InvariantViolation(_)) => {
                ctx.sink.info(&format!("Error: {e}"));
                break;
            }
            Err(e) => {
                // Transient/compute errors: surfaced, session continues —
                // the next redelivered snapshot re-drives the dispatcher.
                ctx.sink.info(&format!("Error: {e}"));
            }
        }

        prev = Some(current);
    }

    subscription.unsubscribe();
    Ok(())
}
