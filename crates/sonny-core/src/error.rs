use thiserror::Error;

/// Crate-wide error taxonomy. Variants map one-to-one onto the error kinds
/// the control loop distinguishes: which ones are fatal at startup, which
/// ones fail a single job, and which ones abort a resurrection before any
/// mutation happens.
#[derive(Debug, Error)]
pub enum SonnyError {
    /// Missing section or key in the INI configuration. Fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// The cache (Redis) was unreachable. Fatal at startup, non-fatal
    /// per-job once the process is running (surfaces as job failure).
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Any failure while talking to the cloud control plane during a
    /// refresh. Non-fatal: sets `api_alive=false` and fails the job.
    #[error("cloud api error: {0}")]
    CloudApi(String),

    /// The port-scan tool itself failed (not "every port closed").
    #[error("probe error: {0}")]
    Probe(String),

    /// One of the resurrection preconditions (spec §4.5 steps 1-6) did
    /// not hold. No mutation has happened when this is raised.
    #[error("resurrection precondition violated: {0}")]
    PreconditionViolation(String),

    /// The placement database failed mid-transaction (begin/update/commit).
    /// Raised during mutation step (a) of resurrection, after every
    /// precondition already passed — unlike [`SonnyError::PreconditionViolation`],
    /// this can occur with some or all of the transaction's statements
    /// already applied.
    #[error("placement db error: {0}")]
    Placement(String),

    /// Per-tenant reconciliation (reboot + port rebind) partially failed.
    /// Carries every tenant-level error encountered; placement rewrite and
    /// cache update already committed by the time this can occur.
    #[error("partial resurrection: {0} of {1} tenants failed")]
    PartialResurrection(usize, usize, Vec<String>),
}

pub type Result<T> = std::result::Result<T, SonnyError>;
