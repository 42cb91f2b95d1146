//! Tuning knobs and their canonical defaults.
//!
//! The controller and the adapters take these as immutable values at
//! construction; nothing reads process-wide mutable state.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay between two controller sweeps. The spread is added as a uniform
/// random jitter so concurrent productions do not poll in lockstep.
pub const DEFAULT_SWEEP_DELAY_SECS: u64 = 180;
pub const DEFAULT_SWEEP_JITTER_SECS: u64 = 120;
/// Sweep cadence once the production is quitting.
pub const DEFAULT_QUIT_DELAY_SECS: u64 = 60;

/// Consecutive sweeps with jobs in UNDEF state before the production quits.
pub const UNDEF_SWEEPS_MAX: u32 = 10;

/// Submission attempts per submit call and delay between attempts.
pub const DEFAULT_SUBMISSION_MAX: u32 = 5;
pub const DEFAULT_SUBMISSION_DELAY_SECS: u64 = 30;

/// Generic grid-command retry budget (status, fetch, copy, ...).
pub const DEFAULT_RETRIES_MAX: u32 = 3;
pub const DEFAULT_RETRIES_DELAY_SECS: u64 = 10;

/// Times a job may be resubmitted before being closed as Failed. Large on
/// purpose: a CE outage can abort every job in flight for hours.
pub const DEFAULT_RESUBMIT_MAX: u32 = 1000;

/// Delegated-credential validity and renewal threshold.
pub const DEFAULT_PROXY_VALIDITY_HOURS: u32 = 24;
pub const DEFAULT_PROXY_RENEW_THRESHOLD_SECS: u64 = 3600;

/// Long-lived credential lifetime registered with the credential store.
pub const DEFAULT_MYPROXY_LIFETIME_HOURS: u32 = 720;
pub const DEFAULT_MYPROXY_SERVER: &str = "myproxy.cnaf.infn.it";
pub const DEFAULT_MYPROXY_PORT: u16 = 7512;
pub const DEFAULT_MYPROXY_PASSWD: &str = "myproxy";

/// Authorization group presented when requesting delegated credentials.
pub const DEFAULT_PROXY_VO: &str = "vo.padme.org";

/// Catalog reconnection budget.
pub const DEFAULT_DB_ATTEMPTS_MAX: u32 = 100;
pub const DEFAULT_DB_ATTEMPTS_DELAY_SECS: u64 = 10;

/// Front-end limits.
pub const MAX_JOBS_PER_PRODUCTION: u32 = 1000;
pub const DEFAULT_FILES_PER_JOB: u32 = 10;
pub const MAX_FILES_PER_JOB: u32 = 1000;
pub const DEFAULT_CE_PORT: u16 = 9619;
pub const DEFAULT_INTER_SUBMIT_DELAY_SECS: u64 = 60;
pub const MAX_INTER_SUBMIT_DELAY_SECS: u64 = 3600;

/// Controller sweep cadence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SweepConfig {
    pub delay: Duration,
    pub jitter: Duration,
    pub quit_delay: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(DEFAULT_SWEEP_DELAY_SECS),
            jitter: Duration::from_secs(DEFAULT_SWEEP_JITTER_SECS),
            quit_delay: Duration::from_secs(DEFAULT_QUIT_DELAY_SECS),
        }
    }
}

/// Per-command retry budgets used by the CE and storage adapters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CeRetryConfig {
    pub submission_max: u32,
    pub submission_delay: Duration,
    pub retries_max: u32,
    pub retries_delay: Duration,
}

impl Default for CeRetryConfig {
    fn default() -> Self {
        Self {
            submission_max: DEFAULT_SUBMISSION_MAX,
            submission_delay: Duration::from_secs(DEFAULT_SUBMISSION_DELAY_SECS),
            retries_max: DEFAULT_RETRIES_MAX,
            retries_delay: Duration::from_secs(DEFAULT_RETRIES_DELAY_SECS),
        }
    }
}

impl CeRetryConfig {
    /// Budget with no inter-attempt sleeps, for tests and fast drain paths.
    pub fn immediate(submission_max: u32, retries_max: u32) -> Self {
        Self {
            submission_max,
            submission_delay: Duration::ZERO,
            retries_max,
            retries_delay: Duration::ZERO,
        }
    }
}

/// Per-job state machine policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FsmConfig {
    /// New submissions allowed per job before it closes as Failed.
    pub resubmit_max: u32,
    /// Whether a Cancelled submission falls through to resubmission when the
    /// production is not quitting.
    pub cancelled_resubmit: bool,
}

impl Default for FsmConfig {
    fn default() -> Self {
        Self {
            resubmit_max: DEFAULT_RESUBMIT_MAX,
            cancelled_resubmit: true,
        }
    }
}

/// Coordinates of the network credential store holding the long-lived
/// credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MyProxyConfig {
    pub server: String,
    pub port: u16,
    pub name: String,
    pub passwd: String,
}

impl MyProxyConfig {
    /// Render as the catalog's `server:port name passwd` proxy_info field.
    pub fn to_proxy_info(&self) -> String {
        format!("{}:{} {} {}", self.server, self.port, self.name, self.passwd)
    }

    /// Parse the catalog's proxy_info field.
    pub fn from_proxy_info(info: &str) -> Option<Self> {
        let mut parts = info.split_whitespace();
        let endpoint = parts.next()?;
        let name = parts.next()?;
        let passwd = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        let (server, port) = endpoint.rsplit_once(':')?;
        Some(Self {
            server: server.to_string(),
            port: port.parse().ok()?,
            name: name.to_string(),
            passwd: passwd.to_string(),
        })
    }
}

/// Two-tier credential configuration for one production.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Where the delegated credential file lives. None means the tool
    /// default location.
    pub proxy_file: Option<std::path::PathBuf>,
    pub validity_hours: u32,
    pub renew_threshold: Duration,
    pub vo: String,
    /// Present when the delegated credential is fetched from a network
    /// credential store instead of re-issued locally.
    pub myproxy: Option<MyProxyConfig>,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            proxy_file: None,
            validity_hours: DEFAULT_PROXY_VALIDITY_HOURS,
            renew_threshold: Duration::from_secs(DEFAULT_PROXY_RENEW_THRESHOLD_SECS),
            vo: DEFAULT_PROXY_VO.to_string(),
            myproxy: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_info_round_trip() {
        let cfg = MyProxyConfig {
            server: "myproxy.cnaf.infn.it".into(),
            port: 7512,
            name: "prod_2019_split".into(),
            passwd: "secret".into(),
        };
        let info = cfg.to_proxy_info();
        assert_eq!(info, "myproxy.cnaf.infn.it:7512 prod_2019_split secret");
        assert_eq!(MyProxyConfig::from_proxy_info(&info), Some(cfg));
    }

    #[test]
    fn proxy_info_rejects_garbage() {
        assert_eq!(MyProxyConfig::from_proxy_info(""), None);
        assert_eq!(MyProxyConfig::from_proxy_info("host name pw"), None);
        assert_eq!(MyProxyConfig::from_proxy_info("host:x name pw"), None);
        assert_eq!(MyProxyConfig::from_proxy_info("host:1 name pw extra"), None);
    }
}
