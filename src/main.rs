use std::collections::HashMap;

use anyhow::Result;
use serde_json::json;
use tracing::info;

use pao::{ActionKind, ActionProof, GovernanceConfig, OrgKind, PaoService};

/// Small demonstration node: registers a PAO with a delegated SAO, routes
/// an action through the chain, then migrates the PAO to threshold voting.
#[tokio::main]
async fn main() -> Result<()> {
    pao_common::logging::init_logging(None, "info")?;
    info!(version = pao::version::VERSION, "starting governance core demo");

    let service = PaoService::in_memory();

    let pao = service
        .register(
            OrgKind::Pao,
            None,
            GovernanceConfig::DirectSigner {
                authority: "founder".to_string(),
            },
        )
        .await?;
    let sao = service
        .register(OrgKind::Sao, Some(pao.clone()), GovernanceConfig::Delegated)
        .await?;
    info!(%pao, %sao, "registered organizations");

    // An action on the SAO resolves to the PAO's direct-signer module
    let action = service
        .submit_action(
            &sao,
            ActionKind::Generic,
            "allocate shared storage",
            json!({ "quota_gb": 50 }),
            &ActionProof::unsigned("founder"),
        )
        .await?;
    info!(%action, state = ?service.action_status(&action).await?, "delegated action evaluated");

    // Migrate the PAO to a three-member voting council
    let mut voters = HashMap::new();
    voters.insert("founder".to_string(), 1.0);
    voters.insert("alice".to_string(), 1.0);
    voters.insert("bob".to_string(), 1.0);
    let handle = service
        .begin_transition(
            &pao,
            GovernanceConfig::ThresholdVote {
                voters,
                quorum: 0.5,
                approval_threshold: 0.5,
                voting_window_secs: 86400,
            },
            &ActionProof::unsigned("founder"),
        )
        .await?;
    service.commit_transition(&handle).await?;

    let record = service.lookup(&pao)?;
    info!(%pao, version = record.version, "migration committed");

    Ok(())
}
