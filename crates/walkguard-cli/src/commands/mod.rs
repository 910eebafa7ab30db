pub mod alert;
pub mod config;
pub mod contact;
pub mod dispatch;
pub mod gateway;
pub mod session;

use std::sync::{Arc, Mutex};

use walkguard_core::{
    AlertEngine, Config, ContactDirectory, Database, Dispatcher, RetryPolicy, SandboxGateway,
    SessionRegistry, SmsGateway, SqliteContactDirectory, TwilioGateway,
};

/// Wired-up application components shared by the commands.
pub(crate) struct App {
    pub db: Arc<Mutex<Database>>,
    pub config: Config,
    pub engine: Arc<AlertEngine>,
    pub sessions: SessionRegistry,
}

/// Open the store and wire the engine the way the process boundary owns it:
/// stores and gateways are passed in, never reached for as globals.
pub(crate) fn build() -> Result<App, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Arc::new(Mutex::new(Database::open()?));

    let contacts: Arc<dyn ContactDirectory> =
        Arc::new(SqliteContactDirectory::new(Arc::clone(&db)));
    let gateway: Arc<dyn SmsGateway> = if config.gateway.test_mode {
        Arc::new(SandboxGateway::new())
    } else {
        Arc::new(TwilioGateway::from_config(&config.gateway)?)
    };
    let dispatcher = Dispatcher::new(
        Arc::clone(&db),
        contacts,
        gateway,
        RetryPolicy::from_config(&config.dispatch),
    );
    let engine = Arc::new(AlertEngine::new(
        Arc::clone(&db),
        dispatcher,
        config.countdown(),
    ));
    let sessions = SessionRegistry::new(Arc::clone(&db));

    Ok(App {
        db,
        config,
        engine,
        sessions,
    })
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
