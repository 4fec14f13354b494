//! Account and provider configuration.
//!
//! A typed builder (fluent `#[must_use]` setters, fallible `build()`) over
//! the persistent, control-plane-owned `Account` record the rest of the
//! crate operates on.

use crate::error::{ConfigError, Result};
use crate::known_servers::ServerRegistry;
use crate::proxy::Socks5Proxy;
use chrono::{DateTime, Utc};
use email_address::EmailAddress;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// How an account authenticates to its IMAP server.
#[derive(Clone, Serialize, Deserialize)]
pub enum AuthMode {
    /// Plain `LOGIN` with a password or app-specific password.
    Password(SecretString),
    /// `AUTHENTICATE XOAUTH2` with an already-issued bearer token. The core
    /// never performs the OAuth2 authorization dance itself — a control
    /// plane hands it a token to use and refresh.
    Bearer(SecretString),
}

impl std::fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMode::Password(_) => write!(f, "Password([REDACTED])"),
            AuthMode::Bearer(_) => write!(f, "Bearer([REDACTED])"),
        }
    }
}

impl AuthMode {
    /// Exposes the underlying secret. Named distinctly from `Debug`/`Display`
    /// so it can never be logged by accident.
    #[must_use]
    pub fn expose_credential(&self) -> &str {
        match self {
            AuthMode::Password(s) | AuthMode::Bearer(s) => s.expose_secret(),
        }
    }
}

/// TLS posture for a [`Provider`]'s connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TlsMode {
    /// Implicit TLS from the first byte (typically port 993).
    Implicit,
    /// Plaintext then `STARTTLS`. Not implemented by the fetcher today;
    /// reserved for providers that require it.
    StartTls,
}

/// A named IMAP endpoint. Read-only to the core — owned and mutated by the
/// control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    /// Human-readable tag, e.g. `"gmail"`, `"outlook"`, `"generic-imap"`.
    pub type_tag: String,
    /// IMAP server hostname.
    pub host: String,
    /// IMAP server port.
    pub port: u16,
    /// TLS posture.
    pub tls: TlsMode,
}

impl Provider {
    /// A generic provider using the host discovered from an email's domain.
    #[must_use]
    pub fn discovered(email: &str) -> Self {
        Self {
            type_tag: "generic-imap".into(),
            host: crate::known_servers::discover_imap_host(email),
            port: 993,
            tls: TlsMode::Implicit,
        }
    }
}

/// Optional proxy configuration for a connection. Currently only SOCKS5 is
/// implemented by the fetcher; HTTP CONNECT tunneling is named in the wire
/// contract but not yet wired to a transport (see `DESIGN.md`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProxyConfig {
    /// SOCKS5 tunnel.
    Socks5(Socks5Proxy),
}

/// Identity of a remote mailbox the core ingests from.
///
/// Created and updated by the control plane; the core only ever reads it and
/// writes back `last_sync_at` / `verified_at`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Account {
    /// Stable numeric id, assigned by the control plane.
    pub id: u64,
    /// Display address used for login and [`crate::resolver`] matching.
    address: EmailAddress,
    /// Authentication mode and credential.
    pub auth: AuthMode,
    /// Provider connection details.
    pub provider: Provider,
    /// Optional proxy tunnel.
    pub proxy: Option<ProxyConfig>,
    /// `true` if any address at `catchall_domain` should route to this account.
    pub is_domain_catchall: bool,
    /// Domain this account catches all mail for, when `is_domain_catchall`.
    pub catchall_domain: Option<String>,
    /// Set by the core after a successful [`crate::fetcher::verify`].
    pub verified_at: Option<DateTime<Utc>>,
    /// Set by the core after each successful scheduler fetch cycle.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Opaque provider-specific settings, passed through unexamined.
    pub settings: serde_json::Value,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("address", &self.address.as_str())
            .field("auth", &self.auth)
            .field("provider", &self.provider)
            .field("is_domain_catchall", &self.is_domain_catchall)
            .field("catchall_domain", &self.catchall_domain)
            .field("verified_at", &self.verified_at)
            .field("last_sync_at", &self.last_sync_at)
            .finish_non_exhaustive()
    }
}

impl Account {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> AccountBuilder {
        AccountBuilder::default()
    }

    /// The account's login/display address.
    #[must_use]
    pub fn address(&self) -> &str {
        self.address.as_str()
    }

    /// `host:port` for the account's provider.
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.provider.host, self.provider.port)
    }

    /// Records a successful [`crate::fetcher::Fetcher::verify`] at `at`.
    pub fn mark_verified(&mut self, at: DateTime<Utc>) {
        self.verified_at = Some(at);
    }

    /// Records a successful scheduler fetch cycle at `at`.
    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        self.last_sync_at = Some(at);
    }
}

/// Builder for [`Account`]: fluent `#[must_use]` setters, fallible `build()`.
#[derive(Default)]
pub struct AccountBuilder {
    id: Option<u64>,
    address: Option<String>,
    auth: Option<AuthMode>,
    provider: Option<Provider>,
    proxy: Option<ProxyConfig>,
    is_domain_catchall: bool,
    catchall_domain: Option<String>,
    settings: Option<serde_json::Value>,
    server_registry: Option<ServerRegistry>,
}

impl AccountBuilder {
    /// Sets the stable numeric id (required).
    #[must_use]
    pub fn id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the login/display address (required).
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Sets password authentication.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = Some(AuthMode::Password(SecretString::from(password.into())));
        self
    }

    /// Sets bearer-token (`XOAUTH2`) authentication.
    #[must_use]
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.auth = Some(AuthMode::Bearer(SecretString::from(token.into())));
        self
    }

    /// Sets the provider explicitly. If omitted, the provider is discovered
    /// from the address's domain at [`build`](Self::build) time.
    #[must_use]
    pub fn provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Sets a registry used to discover the provider host when no explicit
    /// [`provider`](Self::provider) is given.
    #[must_use]
    pub fn server_registry(mut self, registry: ServerRegistry) -> Self {
        self.server_registry = Some(registry);
        self
    }

    /// Sets a SOCKS5 proxy tunnel.
    #[must_use]
    pub fn proxy(mut self, proxy: Socks5Proxy) -> Self {
        self.proxy = Some(ProxyConfig::Socks5(proxy));
        self
    }

    /// Marks this account as a catch-all for `domain`.
    #[must_use]
    pub fn catchall_domain(mut self, domain: impl Into<String>) -> Self {
        self.is_domain_catchall = true;
        self.catchall_domain = Some(domain.into());
        self
    }

    /// Sets opaque provider-specific settings.
    #[must_use]
    pub fn settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Builds the account.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConfig`] if `id` or `address` is
    /// missing, [`ConfigError::InvalidEmailFormat`] if `address` does not
    /// parse, or if neither [`password`](Self::password) nor
    /// [`bearer_token`](Self::bearer_token) was set.
    pub fn build(self) -> Result<Account> {
        let id = self.id.ok_or_else(|| ConfigError::InvalidConfig {
            message: "id is required".into(),
        })?;

        let address_raw = self.address.ok_or_else(|| ConfigError::InvalidConfig {
            message: "address is required".into(),
        })?;

        let address = EmailAddress::parse_with_options(&address_raw, email_address::Options::default())
            .map_err(|_| ConfigError::InvalidEmailFormat {
                email: address_raw.clone(),
            })?;

        let auth = self.auth.ok_or_else(|| ConfigError::InvalidConfig {
            message: "either password or bearer_token is required".into(),
        })?;

        let provider = self.provider.unwrap_or_else(|| match &self.server_registry {
            Some(registry) => Provider {
                type_tag: "generic-imap".into(),
                host: registry.discover(address.as_str()).into_owned(),
                port: 993,
                tls: TlsMode::Implicit,
            },
            None => Provider::discovered(address.as_str()),
        });

        if self.is_domain_catchall && self.catchall_domain.is_none() {
            return Err(ConfigError::InvalidConfig {
                message: "catchall_domain is required when is_domain_catchall is set".into(),
            }
            .into());
        }

        Ok(Account {
            id,
            address,
            auth,
            provider,
            proxy: self.proxy,
            is_domain_catchall: self.is_domain_catchall,
            catchall_domain: self.catchall_domain,
            verified_at: None,
            last_sync_at: None,
            settings: self.settings.unwrap_or(serde_json::Value::Null),
        })
    }
}
