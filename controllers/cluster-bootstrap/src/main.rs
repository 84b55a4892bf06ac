//! bigip-bootstrap
//!
//! Reads a bootstrap policy, provisions the BIG-IP instances it describes on
//! OpenStack and forms them into a synchronized device service group.
//! With `--list-instances` it only reports existing instances by group.
//! Exits 0 on success and 1 on any abort.

use anyhow::Context;
use bigip_client::IControlConnector;
use clap::Parser;
use cluster_bootstrap::cli::Cli;
use cluster_bootstrap::lock::{default_holder, from_config};
use cluster_bootstrap::{BootstrapController, BootstrapError, InstanceReport};
use openstack_client::OpenStackClient;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // kube and reqwest both pull in rustls; pick the provider explicitly
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider already installed");
    }

    let cli = Cli::parse();
    let port = cli.management_port;
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e, port);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.list_instances {
        return list_instances(&cli).await;
    }

    let Some(policy_path) = cli.policy.as_ref() else {
        return Err(BootstrapError::InvalidConfig("--policy is required".to_string()).into());
    };
    let policies = cluster_policy::load_policies(policy_path)
        .map_err(BootstrapError::InvalidPolicy)
        .with_context(|| format!("loading policy {}", policy_path.display()))?;
    info!(
        "Loaded {} device group(s) from {}",
        policies.len(),
        policy_path.display()
    );

    let config = cli.bootstrap_config();
    config.validate()?;
    let auth = cli.auth_config()?;

    info!("Configuration:");
    info!("  Keystone: {}", auth.auth_url);
    info!("  Project: {}", auth.project_name);
    info!("  Management port: {}", config.management_port);
    info!("  Lock: {:?}", config.lock);

    let compute = OpenStackClient::connect(&auth)
        .await
        .context("authenticating with OpenStack")?;
    let connector = IControlConnector::new(config.client_options());
    let lock = from_config(&config.lock, default_holder()).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        warn!("Interrupted, cancelling bootstrap");
        on_signal.cancel();
    });

    let controller = BootstrapController::new(
        Arc::new(compute),
        Arc::new(connector),
        Arc::from(lock),
        config,
        cancel,
    )?;
    controller.run_all(&policies).await?;
    Ok(())
}

async fn list_instances(cli: &Cli) -> anyhow::Result<()> {
    let auth = cli.auth_config()?;
    let compute = OpenStackClient::connect(&auth)
        .await
        .context("authenticating with OpenStack")?;
    let report = InstanceReport::collect(&compute)
        .await
        .context("listing appliance instances")?;
    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render());
    }
    Ok(())
}

fn report(e: &anyhow::Error, port: u16) {
    let Some(bootstrap) = e.downcast_ref::<BootstrapError>() else {
        error!("Bootstrap failed: {:#}", e);
        eprintln!("bigip-bootstrap: {:#}", e);
        return;
    };

    error!("Bootstrap failed during {}: {}", bootstrap.step(), bootstrap);
    eprintln!("bigip-bootstrap: {} failed: {}", bootstrap.step(), bootstrap);
    if let BootstrapError::ReadinessTimeout { endpoints, .. } = bootstrap {
        eprintln!("Management interfaces:");
        for (device, address) in endpoints {
            eprintln!("  {}: https://{}:{}", device, address, port);
        }
    }
}
