// SPDX-License-Identifier: Apache-2.0

//! Operator CLI for the entitlement engine.
//!
//! ```text
//! vaultsentry status
//! vaultsentry plans
//! vaultsentry upgrade <basic|premium|premium_plus>
//! vaultsentry start-trial
//! ```
//!
//! The account comes from `VAULTSENTRY_USER`, `VAULTSENTRY_EMAIL` and
//! `VAULTSENTRY_TIER`; the session cookie from `VAULTSENTRY_SESSION_COOKIE`.

use std::process::ExitCode;

use serde_json::json;
use vaultsentry_lib::config::EntitlementConfig;
use vaultsentry_lib::entitlement::{Account, EntitlementService, TransitionError};
use vaultsentry_lib::observability::{self, Sensitive};
use vaultsentry_lib::{metrics, Tier};

const USAGE: &str = "usage: vaultsentry <status|plans|upgrade <tier>|start-trial|metrics>";

fn account_from_env() -> Result<Account, String> {
    let user_id = std::env::var("VAULTSENTRY_USER").unwrap_or_else(|_| "local".to_string());
    let email = std::env::var("VAULTSENTRY_EMAIL").unwrap_or_default();
    let tier = match std::env::var("VAULTSENTRY_TIER") {
        Ok(value) => value.parse::<Tier>().map_err(|e| e.to_string())?,
        Err(_) => Tier::Basic,
    };
    Ok(Account::new(user_id, email, tier))
}

fn print_json(value: &impl serde::Serialize) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

fn print_transition(
    service: &EntitlementService,
    result: Result<vaultsentry_lib::entitlement::TransitionReceipt, TransitionError>,
) -> Result<(), String> {
    match result {
        Ok(receipt) => print_json(&json!({
            "success": true,
            "message": receipt.message,
            "refreshed": receipt.refreshed,
            "status": receipt.snapshot.status,
        })),
        Err(err) => {
            print_json(&json!({
                "success": false,
                "message": err.to_string(),
                "last_error": service.last_error(),
            }))?;
            Err(err.to_string())
        }
    }
}

async fn run(args: &[String]) -> Result<(), String> {
    let config = EntitlementConfig::load().map_err(|e| e.to_string())?;
    observability::init_tracing(config.log_filter.as_deref());

    let account = account_from_env()?;
    let cookie = std::env::var("VAULTSENTRY_SESSION_COOKIE")
        .ok()
        .map(Sensitive::new);
    let service = vaultsentry_lib::connect(&config, account, cookie).map_err(|e| e.to_string())?;

    match args.first().map(String::as_str) {
        Some("status") => {
            let refreshed = service.refresh_status().await;
            print_json(&json!({
                "status": service.status(),
                "can_add_repository": service.can_add_repository(),
                "can_run_scan": service.can_run_scan(),
                "usage_percentage": service.usage_percentage(),
                "trial": service.trial_state(),
                "error": refreshed.err().map(|e| e.to_string()),
            }))
        }
        Some("plans") => {
            let _ = service.refresh_status().await;
            print_json(&service.plans())
        }
        Some("upgrade") => {
            let tier = args
                .get(1)
                .ok_or_else(|| USAGE.to_string())?
                .parse::<Tier>()
                .map_err(|e| e.to_string())?;
            let _ = service.refresh_status().await;
            let result = service.upgrade_tier(tier).await;
            print_transition(&service, result)
        }
        Some("start-trial") => {
            let _ = service.refresh_status().await;
            let result = service.start_trial().await;
            print_transition(&service, result)
        }
        Some("metrics") => print_json(&metrics::snapshot()),
        _ => Err(USAGE.to_string()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{}", message);
            ExitCode::FAILURE
        }
    }
}
