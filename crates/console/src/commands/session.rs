//! Session flows run against the fixture-backed in-memory backend.

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;

use venue_auth::{GuardDecision, NavigationEntry, Role};
use venue_session::{NewProfile, Profile, SessionConfig, SessionOrchestrator};

use super::emit;
use crate::fixtures::Fixtures;

#[derive(Serialize)]
struct GuardCheck<'a> {
    path: &'a str,
    decision: GuardDecision,
}

#[derive(Serialize)]
struct SessionReport<'a> {
    user: &'a Profile,
    landing_route: &'static str,
    landing_title: &'static str,
    menu: &'a [NavigationEntry],
    guards: Vec<GuardCheck<'a>>,
}

async fn start(fixtures: &Fixtures, config: &SessionConfig) -> anyhow::Result<SessionOrchestrator> {
    let (backend, store) = fixtures.install()?;
    let orchestrator = SessionOrchestrator::start(backend, store, config);
    orchestrator.wait_initialized().await;
    Ok(orchestrator)
}

fn report(orchestrator: &SessionOrchestrator, user: &Arc<Profile>, paths: &[String]) -> anyhow::Result<()> {
    let menu = orchestrator.menu();
    let guards = paths
        .iter()
        .map(|path| GuardCheck {
            path,
            decision: orchestrator.guard(path),
        })
        .collect();

    emit(&SessionReport {
        user,
        landing_route: orchestrator.landing_route(),
        landing_title: orchestrator.landing_title(),
        menu: &menu,
        guards,
    })
}

/// Sign in, print what the session would see, then sign out.
pub async fn sign_in(
    fixtures: &Fixtures,
    config: &SessionConfig,
    email: &str,
    password: &str,
    paths: &[String],
) -> anyhow::Result<()> {
    let orchestrator = start(fixtures, config).await?;

    let user = orchestrator
        .sign_in(email, password)
        .await
        .with_context(|| format!("signing in as {email}"))?;
    report(&orchestrator, &user, paths)?;

    orchestrator.sign_out().await?;
    let snapshot = orchestrator.wait_until(|s| !s.is_authenticated()).await;
    tracing::info!(generation = snapshot.generation, "signed out");
    Ok(())
}

pub struct SignUpArgs {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub document_number: i64,
    pub role: Option<Role>,
}

/// Register a new account and print the resulting session.
pub async fn sign_up(fixtures: &Fixtures, config: &SessionConfig, args: SignUpArgs) -> anyhow::Result<()> {
    let orchestrator = start(fixtures, config).await?;

    let fields = NewProfile {
        first_name: args.first_name,
        last_name: args.last_name,
        document_number: args.document_number,
        email: args.email.clone(),
        role: args.role,
        photo_url: None,
    };
    let user = orchestrator
        .sign_up(fields, &args.password)
        .await
        .with_context(|| format!("signing up {}", args.email))?;

    report(&orchestrator, &user, &[])
}
