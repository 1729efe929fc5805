//! Runtime configuration for a conversation run

use std::collections::HashMap;

use url::Url;

use crate::{Error, Result};

/// Default conversation service endpoint
pub const DEFAULT_URL: &str = "wss://flow.api.speechmatics.com/v1/flow";

/// Default bytes of input audio per websocket frame
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Everything a conversation run needs, validated
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket endpoint of the conversation service
    pub url: Url,
    /// Auth token for the service
    pub api_key: String,
    /// Conversation template to start from
    pub template_id: String,
    /// Variables substituted into the template
    pub template_variables: HashMap<String, String>,
    /// Bytes of input audio per websocket frame
    pub chunk_size: usize,
}

impl Config {
    /// Assemble and validate a configuration
    ///
    /// # Errors
    ///
    /// Returns error if the url does not parse, the api key is missing or
    /// empty, or the chunk size is zero
    pub fn new(
        url: &str,
        api_key: Option<String>,
        template_id: String,
        vars: Vec<(String, String)>,
        chunk_size: usize,
    ) -> Result<Self> {
        let url = Url::parse(url)?;

        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("api key is required (set FLOW_API_KEY)".to_string()))?;

        if chunk_size == 0 {
            return Err(Error::Config("chunk size must be non-zero".to_string()));
        }

        Ok(Self {
            url,
            api_key,
            template_id,
            template_variables: vars.into_iter().collect(),
            chunk_size,
        })
    }
}

/// Parse a `KEY=VALUE` template variable for clap
///
/// # Errors
///
/// Returns error text if the argument has no `=` or an empty key
pub fn parse_var(arg: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{arg}`"))?;
    if key.is_empty() {
        return Err(format!("empty variable name in `{arg}`"));
    }
    Ok((key.to_string(), value.to_string()))
}
