//! Cloud credential resolution.
//!
//! A [`ChainProvider`] asks each provider in turn and keeps the first answer.
//! The standard chain reads the AWS environment variables, then the AWS SDK
//! default chain (shared profile files and `AWS_PROFILE`, web identity,
//! container and instance roles), and finally static keys from the
//! configuration file.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use aws_config::default_provider::credentials::DefaultCredentialsChain;
use aws_config::Region;
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use tracing::debug;

use crate::config::StaticCredentialsConfig;
use crate::error::ShelfError;

pub const ACCESS_KEY_ID_VAR: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
pub const SESSION_TOKEN_VAR: &str = "AWS_SESSION_TOKEN";

#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    /// Object-store options understood by the table reader.
    pub fn storage_options(&self, region: &str) -> Vec<(String, String)> {
        let mut options = vec![
            ("aws_access_key_id".to_string(), self.access_key_id.clone()),
            (
                "aws_secret_access_key".to_string(),
                self.secret_access_key.clone(),
            ),
            ("aws_region".to_string(), region.to_string()),
        ];
        if let Some(token) = &self.session_token {
            options.push(("aws_session_token".to_string(), token.clone()));
        }
        options
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

pub type CredentialFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ShelfError>> + Send + 'a>>;

pub trait CredentialProvider: Send + Sync {
    /// Short provider name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// `Ok(None)` means this provider has nothing to offer.
    fn provide(&self) -> CredentialFuture<'_, Option<AwsCredentials>>;

    fn resolve(&self) -> CredentialFuture<'_, AwsCredentials> {
        Box::pin(async move {
            self.provide().await?.ok_or_else(|| {
                ShelfError::CredentialsUnavailable(format!("no credentials from {}", self.name()))
            })
        })
    }
}

/// Reads `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN`.
pub struct EnvironmentProvider;

impl CredentialProvider for EnvironmentProvider {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn provide(&self) -> CredentialFuture<'_, Option<AwsCredentials>> {
        Box::pin(async { Ok(from_lookup(|key| std::env::var(key).ok())) })
    }
}

fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<AwsCredentials> {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    let access_key_id = non_empty(ACCESS_KEY_ID_VAR)?;
    let secret_access_key = non_empty(SECRET_ACCESS_KEY_VAR)?;
    Some(AwsCredentials::new(
        access_key_id,
        secret_access_key,
        non_empty(SESSION_TOKEN_VAR),
    ))
}

/// Fixed keys, usually from the `[credentials]` section of the config file.
pub struct StaticProvider {
    credentials: Option<AwsCredentials>,
}

impl StaticProvider {
    pub fn new(credentials: AwsCredentials) -> Self {
        Self {
            credentials: Some(credentials),
        }
    }

    pub fn from_config(config: &StaticCredentialsConfig) -> Self {
        let credentials = match (&config.access_key_id, &config.secret_access_key) {
            (Some(id), Some(secret)) => Some(AwsCredentials::new(
                id.clone(),
                secret.clone(),
                config.session_token.clone(),
            )),
            _ => None,
        };
        Self { credentials }
    }
}

impl CredentialProvider for StaticProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    fn provide(&self) -> CredentialFuture<'_, Option<AwsCredentials>> {
        Box::pin(async move { Ok(self.credentials.clone()) })
    }
}

/// Any AWS SDK credential provider, such as the SDK default chain or a
/// profile-file provider.
pub struct SdkProvider {
    name: &'static str,
    inner: SharedCredentialsProvider,
}

impl SdkProvider {
    pub fn new(name: &'static str, provider: impl ProvideCredentials + 'static) -> Self {
        Self {
            name,
            inner: SharedCredentialsProvider::new(provider),
        }
    }

    /// The SDK default chain: environment, shared profile files
    /// (`AWS_PROFILE`), web identity token, ECS container and EC2 instance
    /// metadata.
    pub async fn default_chain(region: &str) -> Self {
        let chain = DefaultCredentialsChain::builder()
            .region(Region::new(region.to_string()))
            .build()
            .await;
        Self::new("aws-default-chain", chain)
    }
}

impl CredentialProvider for SdkProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn provide(&self) -> CredentialFuture<'_, Option<AwsCredentials>> {
        Box::pin(async move {
            match self.inner.provide_credentials().await {
                Ok(creds) => Ok(Some(AwsCredentials::new(
                    creds.access_key_id(),
                    creds.secret_access_key(),
                    creds.session_token().map(str::to_string),
                ))),
                Err(CredentialsError::CredentialsNotLoaded(_)) => Ok(None),
                Err(e) => Err(ShelfError::CredentialsUnavailable(format!("{}: {e}", self.name))),
            }
        })
    }
}

pub struct ChainProvider {
    providers: Vec<Box<dyn CredentialProvider>>,
}

impl ChainProvider {
    pub fn new(providers: Vec<Box<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }

    /// Environment, then the SDK default chain, then the config file's
    /// static keys.
    pub async fn standard(region: &str, config: &StaticCredentialsConfig) -> Self {
        Self::new(vec![
            Box::new(EnvironmentProvider),
            Box::new(SdkProvider::default_chain(region).await),
            Box::new(StaticProvider::from_config(config)),
        ])
    }
}

impl CredentialProvider for ChainProvider {
    fn name(&self) -> &'static str {
        "chain"
    }

    fn provide(&self) -> CredentialFuture<'_, Option<AwsCredentials>> {
        Box::pin(async move {
            for provider in &self.providers {
                if let Some(credentials) = provider.provide().await? {
                    debug!("Credentials resolved by {} provider", provider.name());
                    return Ok(Some(credentials));
                }
            }
            Ok(None)
        })
    }

    fn resolve(&self) -> CredentialFuture<'_, AwsCredentials> {
        Box::pin(async move {
            self.provide().await?.ok_or_else(|| {
                let tried: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
                ShelfError::CredentialsUnavailable(format!(
                    "no provider returned credentials (tried: {})",
                    tried.join(", ")
                ))
            })
        })
    }
}
