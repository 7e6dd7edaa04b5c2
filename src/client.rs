//! The http client used for all cluster communication. This wraps a hyper client with
//! the TLS configuration from [`ClientConfig`] and exposes the handful of verbs the
//! engine needs: discovery reads, gets, forced server-side-apply patches, full
//! replacements, and deletes.

mod request;

use crate::config::{CAData, ClientConfig, Credentials};
use crate::k8s_types::ApiResource;

use bytes::Buf;
use http::{Request, Response};
use hyper::client::Client as HyperClient;
use hyper::client::HttpConnector;
use hyper::Body;
use hyper_openssl::HttpsConnector;
use openssl::pkey::PKey;
use openssl::ssl::{SslConnector, SslMethod};
use openssl::x509::X509;
use serde::de::DeserializeOwned;
use serde_json::Value;

use std::io;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug)]
pub enum Error {
    Io(hyper::Error),
    Serde(serde_json::Error),
    Http {
        status: http::StatusCode,
        message: String,
    },
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e as &(dyn std::error::Error + 'static)),
            Error::Serde(e) => Some(e as &(dyn std::error::Error + 'static)),
            Error::Http { .. } => None,
        }
    }
}

impl Error {
    pub fn http(status: http::StatusCode, message: String) -> Error {
        Error::Http { status, message }
    }

    pub fn is_http_status(&self, code: u16) -> bool {
        match self {
            Error::Http { ref status, .. } => status.as_u16() == code,
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(status.as_u16()),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "Io Error: {}", e),
            Error::Serde(ref e) => write!(f, "(De)Serialization error: {}", e),
            Error::Http {
                ref status,
                ref message,
            } => write!(f, "Http Error: status {}: {}", status, message),
        }
    }
}

impl From<hyper::Error> for Error {
    fn from(e: hyper::Error) -> Error {
        Error::Io(e)
    }
}
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Serde(e)
    }
}

impl From<Error> for crate::error::ClusterError {
    fn from(e: Error) -> crate::error::ClusterError {
        crate::error::ClusterError::new(e.status(), e.to_string())
    }
}

/// The `resources` entries of a discovery response. Entries with a `/` in the name are
/// subresources and never match a manifest kind.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ApiResourceInfo {
    pub name: String,
    pub kind: String,
    pub namespaced: bool,
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ApiResourceList {
    #[serde(rename = "groupVersion")]
    pub group_version: String,
    pub resources: Vec<ApiResourceInfo>,
}

struct ClientInner {
    http_client: HyperClient<HttpsConnector<HttpConnector>>,
    config: ClientConfig,
}

#[derive(Clone)]
pub struct Client(Arc<ClientInner>);

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.0.config.api_server_endpoint)
            .finish()
    }
}

impl Client {
    pub fn new(mut config: ClientConfig) -> Result<Client, io::Error> {
        // validated here so request building can assume a parseable endpoint
        if let Err(err) = url::Url::parse(config.api_server_endpoint.as_str()) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "Invalid api server endpoint '{}': {}",
                    config.api_server_endpoint, err
                ),
            ));
        }

        let mut http = HttpConnector::new();
        http.enforce_http(false);

        let mut ssl = SslConnector::builder(SslMethod::tls())?;
        // enable http2 using alpn
        ssl.set_alpn_protos(b"\x02h2\x08http/1.1")?;
        match config.ca_data.take() {
            Some(CAData::Contents(certs)) => {
                // inline CA contents from a kubeconfig need to be decoded and added to
                // the cert store by hand
                let decoded = base64::decode(&certs).map_err(|err| {
                    io::Error::new(
                        io::ErrorKind::Other,
                        format!(
                            "Invalid base64 content of certificate-authority-data: {}",
                            err
                        ),
                    )
                })?;
                let certs = X509::stack_from_pem(decoded.as_slice())?;
                let cert_store = ssl.cert_store_mut();
                for cert in certs {
                    cert_store.add_cert(cert)?;
                }
            }
            Some(CAData::File(path)) => {
                ssl.set_ca_file(path.as_str())?;
            }
            None => {}
        }

        if let Credentials::PemPath {
            ref certificate_path,
            ref private_key_path,
        } = config.credentials
        {
            let cert_pem = std::fs::read(certificate_path)?;
            let key_pem = std::fs::read(private_key_path)?;
            set_client_cert(&mut ssl, &cert_pem, &key_pem)?;
        }

        if let Credentials::Pem {
            ref certificate_base64,
            ref private_key_base64,
        } = config.credentials
        {
            let cert_pem = base64::decode(certificate_base64).map_err(|err| {
                io::Error::new(
                    io::ErrorKind::Other,
                    format!("Invalid base64 content of client-certificate-data: {}", err),
                )
            })?;
            let key_pem = base64::decode(private_key_base64).map_err(|err| {
                io::Error::new(
                    io::ErrorKind::Other,
                    format!("Invalid base64 content of client-key-data: {}", err),
                )
            })?;
            set_client_cert(&mut ssl, &cert_pem, &key_pem)?;
        }

        if config.verify_ssl_certs {
            ssl.set_verify(openssl::ssl::SslVerifyMode::PEER);
        } else {
            log::warn!("TLS certificate verification has been disabled! All connections to the api server will be insecure!");
            ssl.set_verify(openssl::ssl::SslVerifyMode::NONE);
        }

        let https = HttpsConnector::with_connector(http, ssl)?;
        let client = HyperClient::builder().build(https);

        let inner = ClientInner {
            http_client: client,
            config,
        };
        Ok(Client(Arc::new(inner)))
    }

    /// Fetches the discovery listing for a single group/version.
    pub async fn api_resource_list(
        &self,
        group: &str,
        version: &str,
    ) -> Result<ApiResourceList, Error> {
        let req = request::discovery_request(&self.0.config, group, version);
        self.get_response_body(req).await
    }

    /// Gets the requested resource by name, converting a 404 response into `None`.
    pub async fn get_resource(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>, Error> {
        let req = request::get_request(&self.0.config, resource, namespace, name);
        match self.get_response_body::<Value>(req).await {
            Ok(body) => Ok(Some(body)),
            Err(ref e) if e.is_http_status(404) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Submits a forced server-side-apply patch: creates the resource if absent,
    /// otherwise merges the payload and takes ownership of any conflicting fields.
    pub async fn apply_patch(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        payload: &Value,
        field_manager: &str,
    ) -> Result<Value, Error> {
        let req = request::apply_patch_request(
            &self.0.config,
            resource,
            namespace,
            name,
            payload,
            field_manager,
        )?;
        self.get_response_body(req).await
    }

    /// Replaces the entire resource with the given object (PUT).
    pub async fn replace_resource(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        object: &Value,
    ) -> Result<Value, Error> {
        let req = request::replace_request(&self.0.config, resource, namespace, name, object)?;
        self.get_response_body(req).await
    }

    pub async fn delete_resource(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), Error> {
        log::info!("Deleting resource '{}' with type: {}", name, resource);
        let req = request::delete_request(&self.0.config, resource, namespace, name);
        let response = self.get_response(req).await?;

        match response.status().as_u16() {
            200..=299 | 404 | 409 => {
                // 404 means something else already deleted the resource, and 409 is
                // returned when it is already in the process of being deleted
                Ok(())
            }
            other => {
                let status = response.status();
                let message = read_error_message(response).await;
                log::error!(
                    "Delete request for {} : {} failed with status: {}",
                    resource,
                    name,
                    other
                );
                Err(Error::http(status, message))
            }
        }
    }

    async fn get_response(&self, req: Request<Body>) -> Result<Response<Body>, Error> {
        let method = req.method().to_string();
        let uri = req.uri().to_string();
        let start_time = Instant::now();
        log::debug!("Starting {} request to: {}", method, uri);

        let result = self.0.http_client.request(req).await;
        let duration = start_time.elapsed().as_millis();
        match result {
            Ok(resp) => {
                log::debug!(
                    "Response status received for {} to: {}, status: {}, duration: {}ms",
                    method,
                    uri,
                    resp.status().as_u16(),
                    duration
                );
                Ok(resp)
            }
            Err(err) => {
                log::error!("Failed to execute {} request to: {}, err: {}", method, uri, err);
                Err(err.into())
            }
        }
    }

    async fn get_response_body<T: DeserializeOwned>(&self, req: Request<Body>) -> Result<T, Error> {
        let response = self.get_response(req).await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = read_error_message(response).await;
            return Err(Error::http(status, message));
        }

        let body = hyper::body::aggregate(response.into_body()).await?;
        let deserialized = serde_json::from_reader(body.reader())?;
        Ok(deserialized)
    }
}

/// Pulls the `message` out of an api server Status response body, falling back to the
/// raw body text.
async fn read_error_message(response: Response<Body>) -> String {
    match hyper::body::to_bytes(response.into_body()).await {
        Ok(bytes) => {
            if let Ok(status) = serde_json::from_slice::<Value>(bytes.as_ref()) {
                if let Some(message) = status.pointer("/message").and_then(Value::as_str) {
                    return message.to_owned();
                }
            }
            String::from_utf8_lossy(bytes.as_ref()).into_owned()
        }
        Err(err) => format!("failed to read error response body: {}", err),
    }
}

fn set_client_cert(
    ssl: &mut openssl::ssl::SslConnectorBuilder,
    cert_pem: &[u8],
    key_pem: &[u8],
) -> Result<(), io::Error> {
    let cert = X509::from_pem(cert_pem)?;
    let pkey = PKey::private_key_from_pem(key_pem)?;
    ssl.set_certificate(&*cert)?;
    ssl.set_private_key(&*pkey)?;
    ssl.check_private_key()?; // ensures that the provided private key and certificate actually go together
    Ok(())
}
