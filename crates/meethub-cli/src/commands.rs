//! Command handlers. Each one works against a shared `ApiClient`.

use anyhow::{Context, Result};
use futures::future::join_all;
use meethub_core::{ApiClient, ApiRequest, GuardDecision, RegisterRequest, RouteGuard};
use tracing::info;

use crate::cli::{GetArgs, LoginArgs, RegisterArgs};

fn password_or_prompt(password: Option<String>) -> Result<String> {
    match password {
        Some(password) => Ok(password),
        None => rpassword::prompt_password("Password: ").context("Failed to read password"),
    }
}

pub async fn login(client: &ApiClient, args: LoginArgs) -> Result<()> {
    let password = password_or_prompt(args.password)?;
    let user = client
        .login(&args.email, &password)
        .await
        .context("Login failed")?;
    println!("Logged in as {} ({})", user.display_name, user.role.display_name());
    Ok(())
}

pub async fn register(client: &ApiClient, args: RegisterArgs) -> Result<()> {
    let password = password_or_prompt(args.password)?;
    let request = RegisterRequest {
        display_name: args.name,
        email: args.email,
        password,
    };
    let user = client
        .register(&request)
        .await
        .context("Registration failed")?;
    println!("Registered and logged in as {}", user.display_name);
    Ok(())
}

pub fn logout(client: &ApiClient) {
    client.logout();
    println!("Logged out");
}

pub fn status(client: &ApiClient) {
    if !client.is_authenticated() {
        println!("Not logged in");
        return;
    }

    match client.current_user() {
        Some(user) => println!(
            "Logged in as {} <{}>, role {}",
            user.display_name, user.email, user.role
        ),
        None => println!("Logged in (no user profile stored)"),
    }

    let tokens = client.tokens();
    match tokens.token_expires_at() {
        Some(expires_at) if tokens.is_access_token_expired() => {
            println!("Access token expired at {} (refreshed on next request)", expires_at)
        }
        Some(expires_at) => println!("Access token valid until {}", expires_at),
        None => println!("Access token expiry unknown"),
    }
}

pub async fn get(client: &ApiClient, args: GetArgs) -> Result<()> {
    let requests = args.paths.iter().map(|path| {
        let mut request = ApiRequest::get(path.as_str());
        for (key, value) in &args.query {
            request = request.query(key.as_str(), value.as_str());
        }
        client.send(request)
    });
    let results = join_all(requests).await;
    info!(count = results.len(), "Requests finished");

    let mut failed = 0;
    for (path, result) in args.paths.iter().zip(results) {
        match result {
            Ok(response) => {
                let source = if response.from_cache { "cache" } else { "network" };
                println!("== {} ({}, {})", path, response.status, source);
                println!("{}", pretty(&response.body));
            }
            Err(e) => {
                failed += 1;
                eprintln!("== {} failed: {}", path, e);
                if e.requires_login() {
                    eprintln!("   Run `meethub login` to sign in again.");
                }
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} requests failed", failed, args.paths.len());
    }
    Ok(())
}

pub async fn app_config(client: &ApiClient) -> Result<()> {
    let config = client
        .app_config()
        .await
        .context("Failed to load app config")?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub fn guard(client: &ApiClient, guard: &RouteGuard, path: &str) {
    match guard.check(path, client.tokens()) {
        GuardDecision::Allow => println!("{}: allowed", path),
        GuardDecision::RedirectToLogin(to) => println!("{}: not logged in, redirect to {}", path, to),
        GuardDecision::RedirectToUnauthorized(to) => {
            println!("{}: role not allowed, redirect to {}", path, to)
        }
    }
}

/// Pretty-print JSON bodies; anything else is printed as is
fn pretty(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| body.to_string())
}
