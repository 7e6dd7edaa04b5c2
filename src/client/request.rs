//! Construction of the http requests sent to the api server. Urls are built from path
//! segments so that resource names never need manual escaping.

use crate::client::Error;
use crate::config::ClientConfig;
use crate::k8s_types::ApiResource;

use http::{header, Method, Request};
use hyper::Body;
use serde_json::Value;
use url::Url;

const APPLY_PATCH_CONTENT_TYPE: &str = "application/apply-patch+yaml";

pub fn discovery_request(client_config: &ClientConfig, group: &str, version: &str) -> Request<Body> {
    let mut url = parse_endpoint(client_config);
    {
        let mut segments = url.path_segments_mut().unwrap();
        if group.is_empty() {
            segments.push("api");
        } else {
            segments.push("apis");
            segments.push(group);
        }
        segments.push(version);
    }
    make_req(url, Method::GET, client_config)
        .body(Body::empty())
        .unwrap()
}

pub fn get_request(
    client_config: &ClientConfig,
    resource: &ApiResource,
    namespace: Option<&str>,
    name: &str,
) -> Request<Body> {
    let url = make_url(client_config, resource, namespace, Some(name));
    make_req(url, Method::GET, client_config)
        .body(Body::empty())
        .unwrap()
}

/// A server-side-apply patch. The `force` flag makes the server hand over ownership of
/// any fields currently managed by another actor instead of returning a conflict.
pub fn apply_patch_request(
    client_config: &ClientConfig,
    resource: &ApiResource,
    namespace: Option<&str>,
    name: &str,
    payload: &Value,
    field_manager: &str,
) -> Result<Request<Body>, Error> {
    let mut url = make_url(client_config, resource, namespace, Some(name));
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("fieldManager", field_manager);
        query.append_pair("force", "true");
    }
    let body = serde_json::to_vec(payload)?;
    let req = make_req(url, Method::PATCH, client_config)
        .header(header::CONTENT_TYPE, APPLY_PATCH_CONTENT_TYPE)
        .body(Body::from(body))
        .unwrap();
    Ok(req)
}

pub fn replace_request(
    client_config: &ClientConfig,
    resource: &ApiResource,
    namespace: Option<&str>,
    name: &str,
    object: &Value,
) -> Result<Request<Body>, Error> {
    let url = make_url(client_config, resource, namespace, Some(name));
    let body = serde_json::to_vec(object)?;
    let req = make_req(url, Method::PUT, client_config)
        .body(Body::from(body))
        .unwrap();
    Ok(req)
}

pub fn delete_request(
    client_config: &ClientConfig,
    resource: &ApiResource,
    namespace: Option<&str>,
    name: &str,
) -> Request<Body> {
    let url = make_url(client_config, resource, namespace, Some(name));
    make_req(url, Method::DELETE, client_config)
        .body(Body::empty())
        .unwrap()
}

fn make_req(url: Url, method: Method, client_config: &ClientConfig) -> http::request::Builder {
    let mut builder = Request::builder()
        .method(method)
        .uri(url.as_str())
        .header(header::USER_AGENT, client_config.user_agent.as_str())
        .header(header::ACCEPT, "application/json");
    if let Some(auth) = client_config.credentials.header_value() {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder
}

fn parse_endpoint(client_config: &ClientConfig) -> Url {
    // the endpoint was validated when the config was loaded
    Url::parse(client_config.api_server_endpoint.as_str()).unwrap()
}

fn make_url(
    client_config: &ClientConfig,
    resource: &ApiResource,
    namespace: Option<&str>,
    name: Option<&str>,
) -> Url {
    let mut url = parse_endpoint(client_config);
    {
        let mut segments = url.path_segments_mut().unwrap();

        if resource.group.is_empty() {
            segments.push("api");
        } else {
            segments.push("apis");
            segments.push(resource.group.as_str());
        }
        segments.push(resource.version.as_str());
        if let Some(ns) = namespace {
            segments.push("namespaces");
            segments.push(ns);
        }
        segments.push(resource.plural_kind.as_str());

        if let Some(n) = name {
            segments.push(n);
        }
    }
    url
}
