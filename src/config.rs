//! Run configuration. [`ApplyConfig`] is the explicit, plain-data configuration of the
//! transaction engine, passed into the planning/apply entry point so the engine stays
//! testable with in-memory collaborators. [`ClientConfig`] carries everything needed to
//! talk to an api server, loaded from the in-cluster service account or a kubeconfig.

pub mod kubeconfig;

pub use self::kubeconfig::KubeConfigError;

use std::time::Duration;

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_FIELD_MANAGER: &str = "atomic-apply";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

const SERVICE_ACCOUNT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const SERVICE_ACCOUNT_CA_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";
const API_SERVER_HOSTNAME: &str = "kubernetes.default.svc";

/// Plain-data configuration of a single apply run.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyConfig {
    /// Fallback namespace for namespaced manifests that declare none. When this is also
    /// `None`, [`DEFAULT_NAMESPACE`] is used.
    pub default_namespace: Option<String>,
    /// Maximum time to wait for all resources to become Current.
    pub timeout: Duration,
    /// Interval between status polls during the wait stage.
    pub poll_interval: Duration,
    /// The fixed actor identity that owns fields written by the forced apply patch.
    pub field_manager: String,
}

impl Default for ApplyConfig {
    fn default() -> ApplyConfig {
        ApplyConfig {
            default_namespace: None,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            field_manager: DEFAULT_FIELD_MANAGER.to_owned(),
        }
    }
}

impl ApplyConfig {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = Some(namespace.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// How the client authenticates to the api server.
#[derive(Debug, Clone, PartialEq)]
pub enum Credentials {
    /// A raw Authorization header value (e.g. `Bearer <token>`).
    Header(String),
    /// Paths to a pem-encoded client certificate and private key.
    PemPath {
        certificate_path: String,
        private_key_path: String,
    },
    /// Base64-embedded pem client certificate and private key, as found in kubeconfig
    /// `client-certificate-data` / `client-key-data`.
    Pem {
        certificate_base64: String,
        private_key_base64: String,
    },
}

impl Credentials {
    pub fn bearer_token(token: impl AsRef<str>) -> Credentials {
        Credentials::Header(format!("Bearer {}", token.as_ref().trim()))
    }

    pub fn basic(username: &str, password: &str) -> Credentials {
        let encoded = base64::encode(format!("{}:{}", username, password));
        Credentials::Header(format!("Basic {}", encoded))
    }

    /// The Authorization header to send, if this credential type uses one.
    pub fn header_value(&self) -> Option<&str> {
        match self {
            Credentials::Header(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

/// Location of the certificate authority data used to verify the api server.
#[derive(Debug, Clone, PartialEq)]
pub enum CAData {
    File(String),
    /// Base64 pem contents, as embedded in a kubeconfig.
    Contents(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_server_endpoint: String,
    pub credentials: Credentials,
    pub ca_data: Option<CAData>,
    pub user_agent: String,
    pub verify_ssl_certs: bool,
}

impl ClientConfig {
    /// Loads connection configuration from the service account mounted into a pod.
    pub fn from_service_account(user_agent: impl Into<String>) -> Result<ClientConfig, std::io::Error> {
        let token = std::fs::read_to_string(SERVICE_ACCOUNT_TOKEN_PATH)?;

        let ca_data = if std::path::Path::new(SERVICE_ACCOUNT_CA_PATH).exists() {
            Some(CAData::File(SERVICE_ACCOUNT_CA_PATH.to_owned()))
        } else {
            None
        };

        Ok(ClientConfig {
            api_server_endpoint: format!("https://{}", API_SERVER_HOSTNAME),
            credentials: Credentials::bearer_token(token),
            ca_data,
            user_agent: user_agent.into(),
            verify_ssl_certs: true,
        })
    }

    /// Loads connection configuration from `$KUBECONFIG` or `~/.kube/config`.
    pub fn from_kubeconfig(user_agent: impl Into<String>) -> Result<ClientConfig, KubeConfigError> {
        kubeconfig::load_from_kubeconfig(user_agent.into())
    }
}
