use std::time::Duration;

use anyhow::Result;
use reqwest::blocking::Client;

use crate::errors::TransportError;
use crate::request::RequestPayload;

/// One request in, raw bytes or a transport error out. The scraping engine
/// depends on this capability without caring which HTTP client provides it;
/// tests substitute scripted implementations.
pub trait Transport {
    fn send(&self, payload: &RequestPayload) -> Result<Vec<u8>, TransportError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpTransport { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, payload: &RequestPayload) -> Result<Vec<u8>, TransportError> {
        let mut request = self.client.post(&payload.url);
        for (name, value) in &payload.headers {
            request = request.header(*name, value);
        }

        let response = request.json(&payload.body).send().map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::ConnectionFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus(status.as_u16()));
        }

        let bytes = response.bytes().map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::ConnectionFailed(e.to_string())
            }
        })?;
        Ok(bytes.to_vec())
    }
}
