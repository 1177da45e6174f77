//! REST model store
//!
//! Maps the store contract onto JSON over HTTP: list and item GETs, form-
//! encoded POST/PUT, DELETE for removal, DELETE on the collection path for
//! `clear`. Collection paths derive from the lower-cased plural model name
//! (explicit or defaulted from the singular); successful create/update
//! responses are merged back into the instance so server-assigned fields
//! (a generated id, normalized values) become visible locally.

use async_trait::async_trait;
use bridle_core::{
    map_from_json, Error, Instance, ModelType, Query, Result, Store, Value, ValueMap,
};
use indexmap::IndexMap;
use reqwest::{StatusCode, Url};
use tracing::debug;

/// Model store over a REST backend
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
}

impl RestStore {
    /// Create a store for the given base URL. A missing trailing slash is
    /// normalized on.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn collection_url(&self, model: &ModelType, query: &Query) -> Result<Url> {
        self.build_url(model, None, query)
    }

    fn item_url(&self, model: &ModelType, key: &str, query: &Query) -> Result<Url> {
        self.build_url(model, Some(key), query)
    }

    fn build_url(&self, model: &ModelType, key: Option<&str>, query: &Query) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::Configuration(format!("invalid base URL: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| Error::Configuration("base URL cannot have segments".to_string()))?;
            segments.pop_if_empty().push(&model.meta().collection_name());
            match key {
                Some(key) => segments.push(key),
                // Collection paths carry a trailing slash
                None => segments.push(""),
            };
        }
        for (name, value) in query {
            url.query_pairs_mut().append_pair(name, &form_value(value));
        }
        Ok(url)
    }

    /// Issue a request and interpret the response per the wire contract
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<serde_json::Value> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Request(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Request(e.to_string()))?;
        interpret_response(status, &body)
    }

    fn decode(&self, model: &ModelType, json: &serde_json::Value) -> Result<Instance> {
        let fields = map_from_json(json)
            .ok_or_else(|| Error::Parse("expected a JSON object".to_string()))?;
        model.get_or_create(fields, true)
    }

    /// Merge a successful create/update response body into the instance
    fn merge(&self, instance: &Instance, json: &serde_json::Value) -> Result<()> {
        if let Some(fields) = map_from_json(json) {
            instance.update(fields)?;
        }
        Ok(())
    }

    fn require_key(instance: &Instance) -> Result<String> {
        instance
            .cache_key()
            .ok_or_else(|| Error::NotFound("instance has no primary key".to_string()))
    }
}

#[async_trait(?Send)]
impl Store for RestStore {
    async fn get(&self, model: &ModelType, query: &Query) -> Result<Vec<Instance>> {
        let url = self.collection_url(model, query)?;
        debug!(url = %url, "GET collection");
        let json = self.send(self.client.get(url)).await?;
        let items = json
            .as_array()
            .ok_or_else(|| Error::Parse("expected a JSON array".to_string()))?;
        items.iter().map(|item| self.decode(model, item)).collect()
    }

    async fn get_by_id(&self, model: &ModelType, id: &Value, query: &Query) -> Result<Instance> {
        let key = id
            .as_key()
            .ok_or_else(|| Error::NotFound("empty primary key".to_string()))?;
        let url = self.item_url(model, &key, query)?;
        debug!(url = %url, "GET item");
        let json = self.send(self.client.get(url)).await?;
        self.decode(model, &json)
    }

    async fn create(&self, instance: &Instance, query: &Query) -> Result<()> {
        let url = self.collection_url(instance.model(), query)?;
        debug!(url = %url, "POST item");
        let form = form_fields(&instance.fields());
        let json = self.send(self.client.post(url).form(&form)).await?;
        self.merge(instance, &json)
    }

    async fn update(&self, instance: &Instance, query: &Query) -> Result<()> {
        let key = Self::require_key(instance)?;
        let url = self.item_url(instance.model(), &key, query)?;
        debug!(url = %url, "PUT item");
        let form = form_fields(&instance.fields());
        let json = self.send(self.client.put(url).form(&form)).await?;
        self.merge(instance, &json)
    }

    async fn remove(&self, instance: &Instance, query: &Query) -> Result<()> {
        let key = Self::require_key(instance)?;
        let url = self.item_url(instance.model(), &key, query)?;
        debug!(url = %url, "DELETE item");
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn clear(&self, model: &ModelType, query: &Query) -> Result<()> {
        let url = self.collection_url(model, query)?;
        debug!(url = %url, "DELETE collection");
        self.send(self.client.delete(url)).await?;
        Ok(())
    }
}

/// Map a response to the contract's error kinds: 2xx parses as JSON (empty
/// body reads as null), 404 is NotFound, a structured 4xx/5xx body with
/// `error` and `validation_errors` is a ValidationError carrying the field
/// map verbatim, anything else is a RequestError.
fn interpret_response(status: StatusCode, body: &str) -> Result<serde_json::Value> {
    if status.is_success() {
        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        return serde_json::from_str(body).map_err(|e| Error::Parse(e.to_string()));
    }
    if status == StatusCode::NOT_FOUND {
        return Err(Error::NotFound(body.trim().to_string()));
    }
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let message = json.get("error").and_then(|v| v.as_str());
        let errors = json.get("validation_errors").and_then(|v| v.as_object());
        if let (Some(message), Some(errors)) = (message, errors) {
            let fields: IndexMap<String, String> = errors
                .iter()
                .map(|(field, msg)| (field.clone(), msg.as_str().unwrap_or_default().to_string()))
                .collect();
            return Err(Error::Validation {
                message: message.to_string(),
                fields,
            });
        }
    }
    Err(Error::Request(format!("HTTP {status}: {body}")))
}

/// Url-encoded form rendition of a field map; null fields are omitted
fn form_fields(fields: &ValueMap) -> Vec<(String, String)> {
    fields
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| (name.clone(), form_value(value)))
        .collect()
}

fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_json().to_string(),
    }
}
