//! `herald` command-line entry point.
//!
//! Usage: `herald whoami | login <email> <password> | logout | status`

use std::sync::Arc;

use anyhow::{Context, bail};

use herald_client::store::default_credential_path;
use herald_client::{
    ClientConfig, CredentialStore, FileCredentialStore, HalClient, LoginRequest, SessionManager,
};
use herald_events::{EventBus, InMemoryEventBus, SessionEvent};

const USAGE: &str = "usage: herald whoami | login <email> <password> | logout | status";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    herald_observability::init();

    let config = ClientConfig::from_env().context("invalid HERALD_* configuration")?;
    let path = config
        .credential_path
        .clone()
        .or_else(default_credential_path)
        .context("no data directory for the credential file; set HERALD_CREDENTIAL_PATH")?;

    tracing::info!(api_url = %config.api_url, credential_path = ?path, "starting herald");

    let store: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::open(path));
    let bus: Arc<dyn EventBus<SessionEvent>> = Arc::new(InMemoryEventBus::<SessionEvent>::new());
    let client = HalClient::new(&config, store, bus).context("failed to build HTTP client")?;
    let session = SessionManager::new(client);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["login", email, password] => {
            session.login(&LoginRequest::new(*email, *password)).await?;
            print_session(&session);
        }
        ["logout"] => {
            session.logout().await;
            println!("signed out");
        }
        ["whoami"] => {
            session.bootstrap().await;
            print_session(&session);
        }
        ["status"] => {
            let state = session.client().tokens().state();
            let snapshot = session.bootstrap().await;
            println!("token: {state:?}");
            println!("authenticated: {}", snapshot.is_authenticated());
            if let Some(err) = snapshot.last_error {
                println!("last error: {err}");
            }
        }
        _ => bail!(USAGE),
    }

    session.shutdown().await;
    Ok(())
}

fn print_session(session: &SessionManager) {
    let snapshot = session.snapshot();
    let Some(identity) = snapshot.identity else {
        println!("not signed in");
        if let Some(err) = snapshot.last_error {
            println!("last error: {err}");
        }
        return;
    };

    println!("{} <{}>", identity.name, identity.email);
    println!("id: {}", identity.id);
    if let Some(org) = snapshot.organization {
        println!("organization: {} ({})", org.name, org.id);
    }
    let roles: Vec<&str> = identity.roles.iter().map(|r| r.as_str()).collect();
    let permissions: Vec<&str> = identity.permissions.iter().map(|p| p.as_str()).collect();
    println!("roles: {}", roles.join(", "));
    println!("permissions: {}", permissions.join(", "));
}
