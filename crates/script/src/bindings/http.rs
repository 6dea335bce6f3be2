//! `http.get` / `http.post` bindings over a blocking reqwest client.
//!
//! Calls block the run until the whole body is read. There is no timeout
//! unless one is configured.

use std::time::Duration;

use mlua::{Lua, LuaSerdeExt, Table, Value};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use xlsx2json_config::HttpSettings;

use super::{coerce_string, reply};

pub(crate) fn build_client(settings: &HttpSettings) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(settings.user_agent.clone())
        .timeout(settings.timeout_secs.map(Duration::from_secs))
        .build()
}

/// Header list as passed from scripts: `[{"Name": "value"}, ...]`.
///
/// Every key of every object is applied in order; a later key replaces an
/// earlier one of the same name.
pub fn parse_headers(headers: &[serde_json::Map<String, serde_json::Value>]) -> Result<HeaderMap, String> {
    let mut map = HeaderMap::new();
    for header in headers {
        for (key, value) in header {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => return Err(format!("header {:?} has non-scalar value {}", key, other)),
            };
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| format!("header {:?}, {}", key, e))?;
            let value = HeaderValue::from_str(&text).map_err(|e| format!("header {:?}, {}", key, e))?;
            map.insert(name, value);
        }
    }
    Ok(map)
}

fn headers_arg(lua: &Lua, value: Value) -> Result<HeaderMap, String> {
    if value.is_nil() {
        return Ok(HeaderMap::new());
    }
    let objects: Vec<serde_json::Map<String, serde_json::Value>> =
        lua.from_value(value).map_err(|e| e.to_string())?;
    parse_headers(&objects)
}

/// GET `uri` and return the body bytes.
pub fn get(client: &Client, uri: &str, headers: HeaderMap) -> Result<Vec<u8>, String> {
    let request = client.get(uri).headers(headers);
    send(request, "GET", uri)
}

/// POST `payload` as `mime_type` to `uri` and return the body bytes.
/// Extra headers are applied after Content-Type and may override it.
pub fn post(client: &Client, uri: &str, mime_type: &str, payload: Vec<u8>, headers: HeaderMap) -> Result<Vec<u8>, String> {
    let content_type = HeaderValue::from_str(mime_type)
        .map_err(|e| format!("Can't create a POST request for {}, {}", uri, e))?;
    let mut all = HeaderMap::new();
    all.insert(CONTENT_TYPE, content_type);
    for (name, value) in headers.iter() {
        all.insert(name.clone(), value.clone());
    }
    let request = client.post(uri).headers(all).body(payload);
    send(request, "POST", uri)
}

fn send(request: reqwest::blocking::RequestBuilder, method: &str, uri: &str) -> Result<Vec<u8>, String> {
    let response = request.send().map_err(|e| {
        if e.is_builder() {
            format!("Can't create a {} request for {}, {}", method, uri, e)
        } else {
            format!("Can't connect to {}, {}", uri, e)
        }
    })?;
    log::debug!("{} {} -> {}", method, uri, response.status());
    let body = response
        .bytes()
        .map_err(|e| format!("Can't read response {}, {}", uri, e))?;
    Ok(body.to_vec())
}

/// Build the `http` table sharing one client across calls.
pub(crate) fn table(lua: &Lua, settings: &HttpSettings) -> mlua::Result<Table> {
    let client = build_client(settings).map_err(mlua::Error::external)?;
    let http = lua.create_table()?;

    // http.get(uri, headers?)
    {
        let client = client.clone();
        let get_fn = lua.create_function(move |lua, (uri, headers): (Value, Value)| {
            let uri = coerce_string(&uri);
            let result = headers_arg(lua, headers)
                .map_err(|e| format!("Failed to translate headers, {}, {}", uri, e))
                .and_then(|headers| get(&client, &uri, headers))
                .and_then(|body| lua.create_string(&body).map_err(|e| e.to_string()));
            reply(lua, result)
        })?;
        http.set("get", get_fn)?;
    }

    // http.post(uri, mimeType, payload, headers?)
    {
        let post_fn = lua.create_function(
            move |lua, (uri, mime_type, payload, headers): (Value, Value, Value, Value)| {
                let uri = coerce_string(&uri);
                let mime_type = coerce_string(&mime_type);
                let payload = super::coerce_bytes(&payload);
                let result = headers_arg(lua, headers)
                    .map_err(|e| format!("Failed to translate headers for {}, {}", uri, e))
                    .and_then(|headers| post(&client, &uri, &mime_type, payload, headers))
                    .and_then(|body| lua.create_string(&body).map_err(|e| e.to_string()));
                reply(lua, result)
            },
        )?;
        http.set("post", post_fn)?;
    }

    Ok(http)
}
