//! # Walkguard Core Library
//!
//! This library provides the core business logic for Walkguard, a
//! personal-safety companion. It implements a CLI-first philosophy where all
//! operations are available via a standalone CLI binary; any richer surface
//! is a thin layer over the same core library.
//!
//! ## Architecture
//!
//! - **Alert Engine**: The alert state machine. Pending alerts carry one
//!   countdown timer each; every transition is an atomic compare-and-swap
//!   against the durable store, so cancellation races are resolved
//!   deterministically regardless of client connectivity.
//! - **Dispatch**: Fan-out of a triggered alert to all trusted contacts,
//!   with bounded retries, partial-failure accounting, and a restart
//!   recovery sweep.
//! - **Storage**: SQLite-based alert/session/attempt storage and TOML-based
//!   configuration.
//! - **Gateway**: SMS provider binding behind a trait, with a recording
//!   sandbox for development and tests.
//!
//! ## Key Components
//!
//! - [`AlertEngine`]: Alert lifecycle state machine and countdown scheduler
//! - [`SignalIntake`]: Boundary that detection producers submit candidates to
//! - [`Dispatcher`]: Notification fan-out
//! - [`SessionRegistry`]: Walk session tracking
//! - [`Database`]: Durable state
//! - [`Config`]: Application configuration management

pub mod alert;
pub mod contacts;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod gateway;
pub mod intake;
pub mod session;
pub mod storage;

pub use alert::{Alert, AlertEngine, AlertKind, AlertStatus, GeoPoint, RecoverySummary};
pub use contacts::{ContactDirectory, SqliteContactDirectory, StaticContactDirectory, TrustedContact};
pub use dispatch::{
    AttemptOutcome, DispatchOutcome, DispatchReport, Dispatcher, NotificationAttempt, RetryPolicy,
};
pub use error::{ConfigError, CoreError, DatabaseError, GatewayError, Result};
pub use events::{Event, EventRecord};
pub use gateway::{SandboxGateway, SmsGateway, TwilioGateway};
pub use intake::{AlertCandidate, SignalIntake};
pub use session::{SessionRegistry, SessionStatus, WalkSession};
pub use storage::{Config, Database};
